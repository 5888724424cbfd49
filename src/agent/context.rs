//! Per-turn dynamic context: current time, user location and user id

use chrono::{DateTime, Local, TimeZone};

use crate::core::Config;

/// Supplies the dynamic half of the system instructions for a turn
pub trait ContextProvider: Send + Sync {
    fn dynamic_context(&self, session_id: &str) -> String;
}

/// Context built from the local clock and the configured coordinates.
/// The session id doubles as the user id.
#[derive(Debug, Clone)]
pub struct SystemContext {
    pub lat: f64,
    pub lon: f64,
}

impl SystemContext {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.location.lat, config.location.lon)
    }

    /// Render the context for a fixed instant
    pub fn render_at<Tz: TimeZone>(&self, now: &DateTime<Tz>, user_id: &str) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "The current date and time is {}., Location of the user= lat={}&lon={} ,User id: {}",
            now.format("%A, %d %B %Y at %I:%M %p"),
            self.lat,
            self.lon,
            user_id
        )
    }
}

impl ContextProvider for SystemContext {
    fn dynamic_context(&self, session_id: &str) -> String {
        self.render_at(&Local::now(), session_id)
    }
}

/// Fixed context text, mostly for tests
#[derive(Debug, Clone, Default)]
pub struct StaticContext(pub String);

impl ContextProvider for StaticContext {
    fn dynamic_context(&self, _session_id: &str) -> String {
        self.0.clone()
    }
}

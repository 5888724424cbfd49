//! Configuration management for Careline
//!
//! Supports environment variables, config files, and runtime overrides.
//!
//! Config file location: ~/.config/careline/config.toml

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::error::{CarelineError, Result};

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a healthcare assistant.
Your role is:
1. Assist the users with their health related issues. You can look up information on diseases to help the user properly.
2. Talk to the user like a professional but in a soft and cheering tone, since the user is ill and needs support.
3. If the user wants, book the user's appointment with a doctor.
4. You must call only one tool at a time.
5. For questions about a disease or symptom, use search_disease_info and also search_duckduckgo.

While booking an appointment, follow this flow:
User: Tell me about the doctors available in my area.
Assistant: Calls find_nearby_hospitals to get the hospitals.
Tool: Hospitals near the user.
Assistant: Calls get_doctors_information for those hospitals.
Tool: The doctors available.
Assistant: Tells the user about the doctors and their time slots, asks which doctor to book and confirms.
User: Says which doctors to book.
Assistant: Calls book_appointment."#;

/// Main configuration for Careline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Ollama configuration
    #[serde(default)]
    pub ollama: OllamaConfig,
    /// Model configuration
    #[serde(default)]
    pub models: ModelConfig,
    /// Agent configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// History compaction configuration
    #[serde(default)]
    pub compaction: CompactionConfig,
    /// Session persistence configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// User location injected into the system context
    #[serde(default)]
    pub location: LocationConfig,
    /// Built-in tool configuration
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Host address (default: localhost)
    pub host: String,
    /// Port number (default: 11434)
    pub port: u16,
    /// HTTP request timeout in seconds
    pub timeout_secs: u64,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model used for the conversation and tool calling
    pub chat: String,
    /// Model used to condense old history into the rolling summary
    pub summary: String,
}

/// Agent behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Static persona/policy text placed at the top of every model call
    pub system_prompt: String,
    /// Maximum tool round-trips within one turn
    /// Default: 10
    pub max_tool_rounds: usize,
    /// Upper bound for one inference or summary call
    pub inference_timeout_secs: u64,
    /// Upper bound for one tool invocation
    pub tool_timeout_secs: u64,
    /// Whether to show debug output
    pub debug: bool,
}

/// Compaction thresholds
///
/// The token estimate is `ceil(chars / chars_per_token) + extra_tokens_per_message * count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Estimated tokens above which history is compacted
    pub threshold_tokens: usize,
    pub chars_per_token: usize,
    pub extra_tokens_per_message: usize,
    /// Word cap given to the summarizer
    pub summary_max_words: usize,
}

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding one JSON file per session
    pub directory: PathBuf,
}

/// Coordinates of the user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub lat: f64,
    pub lon: f64,
}

/// Built-in tool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Proximity search endpoint for hospitals
    pub hospital_endpoint: String,
    /// Access token for the proximity search
    #[serde(default)]
    pub hospital_token: Option<String>,
    /// Where offered appointment options are recorded
    pub booking_file: PathBuf,
    /// Instant-answer web search endpoint
    pub web_search_endpoint: String,
    /// Retrieval service answering disease questions; the tool reports an error when unset
    #[serde(default)]
    pub disease_info_endpoint: Option<String>,
    /// Doctor directory keyed by specialty
    #[serde(default)]
    pub doctors: HashMap<String, Vec<DoctorEntry>>,
}

/// One doctor in the directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorEntry {
    pub name: String,
    pub hospital: String,
    pub time_slots: String,
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().map(|v| v == "true" || v == "1")
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: env::var("OLLAMA_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("OLLAMA_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(11434),
            timeout_secs: 120,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        let chat = env::var("CARELINE_MODEL").unwrap_or_else(|_| "qwen3:8b".to_string());
        Self {
            summary: env::var("CARELINE_SUMMARY_MODEL").unwrap_or_else(|_| chat.clone()),
            chat,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tool_rounds: 10,
            inference_timeout_secs: 120,
            tool_timeout_secs: 30,
            debug: env_flag("CARELINE_DEBUG").unwrap_or(false),
        }
    }
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            threshold_tokens: 4000,
            chars_per_token: 3,
            extra_tokens_per_message: 60,
            summary_max_words: 200,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let directory = env::var("CARELINE_SESSION_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Config::data_dir().join("sessions"));
        Self { directory }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            lat: env::var("CARELINE_LAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(16.27939453125),
            lon: env::var("CARELINE_LON")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(80.58837890625),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let mut doctors = HashMap::new();
        doctors.insert(
            "general physician".to_string(),
            vec![DoctorEntry {
                name: "Dr. Mehra".to_string(),
                hospital: "City Hospital".to_string(),
                time_slots: "Morning 9 am to 12 pm and evening 4 pm to 7 pm".to_string(),
            }],
        );

        Self {
            hospital_endpoint:
                "https://bhuvan-app1.nrsc.gov.in/api/api_proximity/curl_hos_pos_prox.php"
                    .to_string(),
            hospital_token: env::var("BHUVAN_ACCESS_TOKEN").ok(),
            booking_file: Config::data_dir().join("bookings.json"),
            web_search_endpoint: "https://api.duckduckgo.com/".to_string(),
            disease_info_endpoint: env::var("CARELINE_DISEASE_ENDPOINT").ok(),
            doctors,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("careline")
    }

    /// Get the config file path
    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Directory for sessions and bookings
    pub fn data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("careline")
    }

    /// Load configuration from file, environment, and defaults
    /// Priority: CLI args > config file > env vars > defaults
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();

        if let Ok(config) = Self::load_from_file() {
            return config;
        }

        Self::default()
    }

    /// Load configuration from file only
    pub fn load_from_file() -> Result<Self> {
        let config_path = Self::config_file();

        if !config_path.exists() {
            return Err(CarelineError::config("Config file not found"));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| CarelineError::config(format!("Failed to read config: {}", e)))?;

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text; missing sections fall back to defaults
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| CarelineError::config(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_file();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                CarelineError::config(format!("Failed to create config dir: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| CarelineError::config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&config_path, content)
            .map_err(|e| CarelineError::config(format!("Failed to write config: {}", e)))?;

        Ok(config_path)
    }

    /// Get the full Ollama API URL
    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.ollama.host, self.ollama.port)
    }

    /// Generate a default config file content for display
    pub fn default_config_toml() -> String {
        toml::to_string_pretty(&Config::default())
            .unwrap_or_else(|_| String::from("# Error generating config"))
    }
}

impl AgentConfig {
    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.ollama.port, 11434);
        assert_eq!(config.agent.max_tool_rounds, 10);
        assert_eq!(config.compaction.threshold_tokens, 4000);
        assert_eq!(config.compaction.chars_per_token, 3);
        assert_eq!(config.compaction.extra_tokens_per_message, 60);
        assert_eq!(config.compaction.summary_max_words, 200);
        assert_eq!(config.tools.web_search_endpoint, "https://api.duckduckgo.com/");
    }

    #[test]
    fn test_ollama_url() {
        let mut config = Config::default();
        config.ollama.host = "localhost".to_string();
        config.ollama.port = 11434;
        assert_eq!(config.ollama_url(), "http://localhost:11434");
    }

    #[test]
    fn test_config_round_trip() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("threshold_tokens"));

        let parsed = Config::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.agent.max_tool_rounds, config.agent.max_tool_rounds);
        assert_eq!(parsed.tools.doctors, config.tools.doctors);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed = Config::from_toml("[compaction]\nthreshold_tokens = 100\n").unwrap();
        assert_eq!(parsed.compaction.threshold_tokens, 100);
        assert_eq!(parsed.compaction.chars_per_token, 3);
        assert_eq!(parsed.agent.max_tool_rounds, 10);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("agent = [").unwrap_err();
        assert!(matches!(err, CarelineError::Config(_)));
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::config_dir();
        assert!(dir.to_string_lossy().contains("careline"));
    }
}

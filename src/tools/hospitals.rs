//! Nearby hospital lookup
//!
//! Queries a proximity search service for hospitals around the user.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::core::{CarelineError, Config, Result};
use crate::tools::registry::Tool;

const NO_RESULTS: &str = "radius is too small to search for hospitals";

#[derive(Debug, Deserialize)]
struct NearbyArgs {
    lat: f64,
    lon: f64,
    radius: u64,
}

/// Tool that finds hospitals within a radius of a point
pub struct NearbyHospitalsTool {
    client: Client,
    endpoint: String,
    token: Option<String>,
}

impl NearbyHospitalsTool {
    /// Create the tool from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.agent.tool_timeout_secs))
            .build()
            .map_err(|e| CarelineError::with_context("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: config.tools.hospital_endpoint.clone(),
            token: config.tools.hospital_token.clone(),
        })
    }

    /// Turn the raw service body into the text handed back to the model
    fn interpret(body: &str) -> String {
        let body = body.trim();
        if body.is_empty() || body == "false" {
            NO_RESULTS.to_string()
        } else {
            format!("hospitals found {}", body)
        }
    }
}

#[async_trait]
impl Tool for NearbyHospitalsTool {
    fn name(&self) -> &str {
        "find_nearby_hospitals"
    }

    fn description(&self) -> &str {
        "Get the nearest hospitals for the user. Try a radius of 1000 first; if no hospitals are \
         found try 3000, then larger radii."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "lat": {
                    "type": "number",
                    "description": "Latitude of the user's location"
                },
                "lon": {
                    "type": "number",
                    "description": "Longitude of the user's location"
                },
                "radius": {
                    "type": "integer",
                    "description": "Search radius in meters. Smaller means closer hospitals; use a smaller radius when the case is urgent"
                }
            },
            "required": ["lat", "lon", "radius"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let args: NearbyArgs = serde_json::from_value(args)
            .map_err(|e| CarelineError::tool(format!("Invalid arguments: {}", e)))?;

        let mut params = vec![
            ("theme", "hospital".to_string()),
            ("lat", args.lat.to_string()),
            ("lon", args.lon.to_string()),
            ("buffer", args.radius.to_string()),
        ];
        if let Some(ref token) = self.token {
            params.push(("token", token.clone()));
        }

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| CarelineError::tool(format!("Hospital lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CarelineError::tool(format!(
                "Hospital lookup returned {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CarelineError::tool(format!("Hospital lookup failed: {}", e)))?;

        Ok(Self::interpret(&body))
    }
}

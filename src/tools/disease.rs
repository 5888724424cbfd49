//! Disease information lookup
//!
//! The retrieval backend (vector store, embeddings) lives outside this crate and is
//! reached through [`DiseaseKnowledgeBase`]. The bundled source is a plain HTTP
//! service answering `GET <endpoint>?q=<query>` with text passages.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{CarelineError, Config, Result};
use crate::tools::registry::Tool;

#[derive(Debug, Deserialize)]
struct DiseaseArgs {
    query: String,
}

/// Source of reference passages about diseases and symptoms
#[async_trait]
pub trait DiseaseKnowledgeBase: Send + Sync {
    /// Passages relevant to `query`; empty when nothing matches
    async fn search(&self, query: &str) -> Result<String>;
}

/// Retrieval service reached over HTTP
pub struct HttpKnowledgeBase {
    client: Client,
    endpoint: String,
}

impl HttpKnowledgeBase {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CarelineError::with_context("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl DiseaseKnowledgeBase for HttpKnowledgeBase {
    async fn search(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| CarelineError::tool(format!("Disease lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CarelineError::tool(format!(
                "Disease lookup returned {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| CarelineError::tool(format!("Disease lookup failed: {}", e)))
    }
}

/// Tool that answers disease questions from a knowledge base
pub struct DiseaseInfoTool {
    source: Option<Arc<dyn DiseaseKnowledgeBase>>,
}

impl DiseaseInfoTool {
    pub fn new(source: Arc<dyn DiseaseKnowledgeBase>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Use the configured retrieval endpoint, if there is one
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = match config.tools.disease_info_endpoint {
            Some(ref endpoint) => Some(Arc::new(HttpKnowledgeBase::new(
                endpoint.clone(),
                config.agent.tool_timeout(),
            )?) as Arc<dyn DiseaseKnowledgeBase>),
            None => None,
        };
        Ok(Self { source })
    }
}

#[async_trait]
impl Tool for DiseaseInfoTool {
    fn name(&self) -> &str {
        "search_disease_info"
    }

    fn description(&self) -> &str {
        "Search reference material about a particular health issue or disease. Phrase the \
         query precisely so the most relevant information comes back."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The disease, symptom or health issue to look up"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let args: DiseaseArgs = serde_json::from_value(args)
            .map_err(|e| CarelineError::tool(format!("Invalid arguments: {}", e)))?;

        let Some(ref source) = self.source else {
            return Err(CarelineError::tool(
                "No disease knowledge base is configured; try search_duckduckgo instead",
            ));
        };

        let passages = source.search(args.query.trim()).await?;
        if passages.trim().is_empty() {
            return Ok(format!("No information found for '{}'", args.query.trim()));
        }
        Ok(passages)
    }
}

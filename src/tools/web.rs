//! Web search
//!
//! DuckDuckGo Instant Answer lookup; needs no API key.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::core::{CarelineError, Config, Result};
use crate::tools::registry::Tool;

const MAX_RESULTS: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchArgs {
    query: String,
}

#[derive(Debug, Default, Deserialize)]
struct InstantAnswer {
    #[serde(rename = "AbstractText", default)]
    abstract_text: String,
    #[serde(rename = "AbstractURL", default)]
    abstract_url: String,
    #[serde(rename = "RelatedTopics", default)]
    related_topics: Vec<Topic>,
}

// Either a single result or a named group of results
#[derive(Debug, Deserialize)]
struct Topic {
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "Topics", default)]
    topics: Vec<Topic>,
}

/// One search hit handed back to the model
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub url: String,
    pub snippet: String,
}

/// Tool that searches the web
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
}

impl WebSearchTool {
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.agent.tool_timeout_secs))
            .user_agent(concat!("careline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CarelineError::with_context("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: config.tools.web_search_endpoint.clone(),
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&format=json&no_redirect=1&no_html=1",
            self.endpoint,
            urlencoding::encode(query)
        )
    }

    /// Flatten an instant answer into at most `MAX_RESULTS` hits, abstract first
    fn collect_hits(answer: InstantAnswer) -> Vec<SearchHit> {
        fn flatten(topics: Vec<Topic>, hits: &mut Vec<SearchHit>) {
            for topic in topics {
                if let (Some(url), Some(snippet)) = (topic.first_url, topic.text) {
                    hits.push(SearchHit { url, snippet });
                }
                flatten(topic.topics, hits);
            }
        }

        let mut hits = Vec::new();
        if !answer.abstract_text.is_empty() {
            hits.push(SearchHit {
                url: answer.abstract_url,
                snippet: answer.abstract_text,
            });
        }
        flatten(answer.related_topics, &mut hits);
        hits.truncate(MAX_RESULTS);
        hits
    }

    fn render(query: &str, hits: &[SearchHit]) -> String {
        if hits.is_empty() {
            return format!("No web results found for '{}'", query);
        }

        hits.iter()
            .enumerate()
            .map(|(i, hit)| format!("{}. {}\n   {}", i + 1, hit.snippet, hit.url))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "search_duckduckgo"
    }

    fn description(&self) -> &str {
        "Search the web using DuckDuckGo. Use it together with search_disease_info for \
         questions about diseases and symptoms."
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to search for"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String> {
        let args: SearchArgs = serde_json::from_value(args)
            .map_err(|e| CarelineError::tool(format!("Invalid arguments: {}", e)))?;

        let query = args.query.trim();
        if query.is_empty() {
            return Err(CarelineError::tool("Search query is empty"));
        }

        let response = self
            .client
            .get(self.search_url(query))
            .send()
            .await
            .map_err(|e| CarelineError::tool(format!("Web search failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(CarelineError::tool(format!(
                "Web search returned {}",
                response.status()
            )));
        }

        let answer: InstantAnswer = response
            .json()
            .await
            .map_err(|e| CarelineError::tool(format!("Unreadable search response: {}", e)))?;

        Ok(Self::render(query, &Self::collect_hits(answer)))
    }
}

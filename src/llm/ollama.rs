//! Ollama client implementation
//!
//! Async HTTP client for the Ollama chat API with tool calling and streaming support.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::{CarelineError, Config, Message, Result, Role, ToolCall, ToolDefinition};
use crate::llm::traits::{
    summary_instruction, GenerateOptions, ModelGateway, StreamCallback, TokenUsage,
};

/// Ollama API client
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    chat_model: String,
    summary_model: String,
    summary_max_words: usize,
}

/// Ollama chat request
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
    stream: bool,
}

/// Ollama message format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

/// Ollama tool call format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

/// Ollama function in tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// Ollama generation options
#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// One NDJSON line of a chat response; the non-streaming response has the same shape
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

/// Accumulates streamed NDJSON chunks into one assistant message
#[derive(Debug, Default)]
struct StreamAssembler {
    buffer: Vec<u8>,
    content: String,
    tool_calls: Vec<ToolCall>,
    usage: Option<TokenUsage>,
}

impl StreamAssembler {
    /// Feed raw bytes; complete lines are parsed immediately.
    ///
    /// Lines are decoded only once complete, so a character split across
    /// network chunks is reassembled before decoding.
    fn push(&mut self, bytes: &[u8], on_token: Option<&StreamCallback>) -> Result<()> {
        self.buffer.extend_from_slice(bytes);

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            self.process_raw_line(&line[..newline_pos], on_token)?;
        }
        Ok(())
    }

    fn process_raw_line(&mut self, line: &[u8], on_token: Option<&StreamCallback>) -> Result<()> {
        let line = std::str::from_utf8(line)
            .map_err(|e| CarelineError::upstream(format!("Stream chunk is not UTF-8: {}", e)))?;
        self.process_line(line.trim(), on_token)
    }

    fn process_line(&mut self, line: &str, on_token: Option<&StreamCallback>) -> Result<()> {
        if line.is_empty() {
            return Ok(());
        }

        let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| {
            CarelineError::upstream(format!("Malformed stream chunk: {}: {}", e, line))
        })?;
        self.absorb(chunk, on_token)
    }

    fn absorb(&mut self, chunk: ChatChunk, on_token: Option<&StreamCallback>) -> Result<()> {
        if let Some(error) = chunk.error {
            return Err(CarelineError::upstream(error));
        }

        if let Some(msg) = chunk.message {
            if !msg.content.is_empty() {
                if let Some(callback) = on_token {
                    callback(&msg.content);
                }
                self.content.push_str(&msg.content);
            }

            for tc in msg.tool_calls.unwrap_or_default() {
                self.tool_calls.push(ToolCall::new(
                    ToolCall::generate_id(),
                    tc.function.name,
                    tc.function.arguments,
                ));
            }
        }

        if chunk.done {
            if let (Some(prompt), Some(completion)) = (chunk.prompt_eval_count, chunk.eval_count) {
                self.usage = Some(TokenUsage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: prompt + completion,
                });
            }
        }
        Ok(())
    }

    /// Flush any trailing partial line and build the message
    fn finish(mut self, on_token: Option<&StreamCallback>) -> Result<Message> {
        let rest = std::mem::take(&mut self.buffer);
        self.process_raw_line(&rest, on_token)?;

        if let Some(usage) = &self.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "ollama usage"
            );
        }

        Ok(Message::assistant_with_tools(self.content, self.tool_calls))
    }
}

impl OllamaClient {
    /// Create a new Ollama client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.ollama.timeout_secs))
            .build()
            .map_err(|e| CarelineError::with_context("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            base_url: config.ollama_url(),
            chat_model: config.models.chat.clone(),
            summary_model: config.models.summary.clone(),
            summary_max_words: config.compaction.summary_max_words,
        })
    }

    /// Convert internal Message to Ollama format
    fn to_ollama_message(msg: &Message) -> OllamaMessage {
        let tool_calls = if msg.tool_calls.is_empty() {
            None
        } else {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|tc| OllamaToolCall {
                        function: OllamaFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OllamaMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            tool_calls,
            tool_name: match msg.role {
                Role::Tool => msg.tool_name.clone(),
                _ => None,
            },
        }
    }

    /// Send a chat request and check the HTTP status
    async fn send(&self, request: &ChatRequest<'_>) -> Result<reqwest::Response> {
        debug!(
            model = request.model,
            messages = request.messages.len(),
            tools = request.tools.map(|t| t.len()).unwrap_or(0),
            stream = request.stream,
            "ollama chat request"
        );

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    CarelineError::upstream(format!(
                        "Cannot connect to Ollama at {}. Is it running?",
                        self.base_url
                    ))
                } else if e.is_timeout() {
                    CarelineError::upstream("Ollama request timed out")
                } else {
                    CarelineError::upstream(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 404 && error_text.contains("not found") {
                return Err(CarelineError::ModelNotFound(request.model.to_string()));
            }

            return Err(CarelineError::upstream(format!(
                "Ollama API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        tools: &[ToolDefinition],
        options: Option<GenerateOptions>,
        on_token: Option<&StreamCallback>,
    ) -> Result<Message> {
        let request = ChatRequest {
            model,
            messages: messages.iter().map(Self::to_ollama_message).collect(),
            tools: if tools.is_empty() { None } else { Some(tools) },
            options: options.map(|opts| OllamaOptions {
                temperature: opts.temperature,
                num_predict: opts.max_tokens,
            }),
            stream: on_token.is_some(),
        };

        let response = self.send(&request).await?;
        let mut assembler = StreamAssembler::default();

        if on_token.is_none() {
            let body = response
                .text()
                .await
                .map_err(|e| CarelineError::upstream(format!("Failed to read response: {}", e)))?;
            let chunk: ChatChunk = serde_json::from_str(&body).map_err(|e| {
                CarelineError::upstream(format!("Failed to parse response: {}", e))
            })?;
            assembler.absorb(chunk, None)?;
            return assembler.finish(None);
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes =
                chunk.map_err(|e| CarelineError::upstream(format!("Stream error: {}", e)))?;
            assembler.push(&bytes, on_token)?;
        }

        assembler.finish(on_token)
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct ModelsResponse {
            models: Vec<ModelInfo>,
        }

        #[derive(Deserialize)]
        struct ModelInfo {
            name: String,
        }

        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(CarelineError::upstream("Failed to list models"));
        }

        let models: ModelsResponse = response.json().await?;
        Ok(models.models.into_iter().map(|m| m.name).collect())
    }

    /// Check that the configured models are pulled
    pub async fn check_models(&self) -> Result<()> {
        let available = self.list_models().await?;
        for model in [&self.chat_model, &self.summary_model] {
            let found = available
                .iter()
                .any(|m| m == model || m.split(':').next() == model.split(':').next());
            if !found {
                warn!(model = %model, "model not available");
                return Err(CarelineError::ModelNotFound(model.clone()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ModelGateway for OllamaClient {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        on_token: Option<&StreamCallback>,
    ) -> Result<Message> {
        self.chat(&self.chat_model, messages, tools, None, on_token)
            .await
    }

    async fn summarize(&self, anchor: &Message, summary: &Message) -> Result<String> {
        let messages = vec![
            anchor.clone(),
            summary.clone(),
            Message::system(summary_instruction(self.summary_max_words)),
        ];

        let response = self
            .chat(
                &self.summary_model,
                &messages,
                &[],
                Some(GenerateOptions {
                    temperature: Some(0.2),
                    ..Default::default()
                }),
                None,
            )
            .await?;

        Ok(response.content.trim().to_string())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_client_creation() {
        let mut config = Config::default();
        config.ollama.host = "localhost".to_string();
        config.ollama.port = 11434;
        let client = OllamaClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_tool_message_conversion() {
        let msg = Message::tool("call_1", "evaluate_expression", "4");
        let ollama_msg = OllamaClient::to_ollama_message(&msg);
        assert_eq!(ollama_msg.role, "tool");
        assert_eq!(ollama_msg.content, "4");
        assert_eq!(ollama_msg.tool_name.as_deref(), Some("evaluate_expression"));
    }

    #[test]
    fn test_stream_assembler_splits_lines_across_chunks() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: StreamCallback = Box::new(move |t: &str| sink.lock().unwrap().push(t.to_string()));

        let mut assembler = StreamAssembler::default();
        assembler
            .push(
                br#"{"message":{"role":"assistant","content":"The ans"},"done":false}
{"message":{"role":"assistant","content":"wer"#,
                Some(&callback),
            )
            .unwrap();
        assembler
            .push(
                br#" is 4."},"done":false}
{"message":{"role":"assistant","content":""},"done":true,"prompt_eval_count":10,"eval_count":3}"#,
                Some(&callback),
            )
            .unwrap();

        let message = assembler.finish(Some(&callback)).unwrap();
        assert_eq!(message.content, "The answer is 4.");
        assert!(!message.has_tool_calls());
        assert_eq!(*seen.lock().unwrap(), vec!["The ans", "wer is 4."]);
    }

    #[test]
    fn test_stream_assembler_keeps_characters_split_across_chunks() {
        let seen = Arc::new(Mutex::new(String::new()));
        let sink = seen.clone();
        let callback: StreamCallback = Box::new(move |t: &str| sink.lock().unwrap().push_str(t));

        let line = "{\"message\":{\"role\":\"assistant\",\"content\":\"నమస్తే\"},\"done\":false}\n";
        let start = line.find("నమ").unwrap();
        let (head, tail) = line.as_bytes().split_at(start + 1);

        let mut assembler = StreamAssembler::default();
        assembler.push(head, Some(&callback)).unwrap();
        assembler.push(tail, Some(&callback)).unwrap();

        let message = assembler.finish(Some(&callback)).unwrap();
        assert_eq!(message.content, "నమస్తే");
        assert_eq!(*seen.lock().unwrap(), "నమస్తే");
    }

    #[test]
    fn test_invalid_utf8_line_is_upstream_error() {
        let mut assembler = StreamAssembler::default();
        let err = assembler.push(b"{\"done\":\xff}\n", None).unwrap_err();
        assert!(err.is_upstream());
    }

    #[test]
    fn test_stream_assembler_collects_tool_calls() {
        let mut assembler = StreamAssembler::default();
        assembler
            .push(
                br#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"evaluate_expression","arguments":{"expr":"2+2"}}}]},"done":true}
"#,
                None,
            )
            .unwrap();

        let message = assembler.finish(None).unwrap();
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "evaluate_expression");
        assert_eq!(message.tool_calls[0].arguments["expr"], "2+2");
        assert!(message.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_stream_error_line_is_upstream_error() {
        let mut assembler = StreamAssembler::default();
        let err = assembler
            .push(b"{\"error\":\"model overloaded\"}\n", None)
            .unwrap_err();
        assert!(err.is_upstream());

        let mut assembler = StreamAssembler::default();
        let err = assembler.push(b"not json\n", None).unwrap_err();
        assert!(err.is_upstream());
    }
}

//! Orchestration graph
//!
//! Routes one user turn through compaction, inference and tool rounds:
//!
//! ```text
//! START -> CHECK_BUDGET -> (COMPACT -> CHECK_BUDGET)* -> INFER
//!       -> (TOOLS -> CHECK_BUDGET -> INFER)* -> DONE
//! ```
//!
//! State is loaded into a working copy at the start of a turn and saved only
//! when the turn reaches `DONE`. A failed or cancelled turn leaves the stored
//! session as it was.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, warn};

use crate::agent::compaction::CompactionPolicy;
use crate::agent::context::{ContextProvider, SystemContext};
use crate::agent::events::{ChatEvent, ChatStream};
use crate::agent::session::{FileSessionStore, SessionLeases, SessionStore};
use crate::agent::state::ConversationState;
use crate::core::{CarelineError, Config, Message, Result, ToolDefinition};
use crate::llm::{ModelGateway, OllamaClient, StreamCallback};
use crate::tools::ToolRegistry;

/// Answer used when the tool-round cap is hit and the model still has no text
pub const EXHAUSTED_REPLY: &str = "I'm sorry, I could not complete that request.";

/// Answer used when the model returns neither text nor tool calls
pub const EMPTY_REPLY: &str = "I apologize, but I couldn't generate a response.";

/// Where the graph goes next
#[derive(Debug, Clone, PartialEq)]
pub enum NextStep {
    /// History is over budget; fold the oldest block into the summary
    Compact,
    /// Ask the model for the next assistant message
    Infer,
    /// Run the tool calls carried by this assistant message
    Tools(Message),
    /// The model wants more tools but the round cap is reached
    Exhausted,
    /// Final assistant message
    Done(Message),
}

impl NextStep {
    /// Route before every inference
    pub fn check_budget(policy: &CompactionPolicy, state: &ConversationState) -> Self {
        if !state.is_empty() && policy.needs_compaction(&state.messages) {
            NextStep::Compact
        } else {
            NextStep::Infer
        }
    }

    /// Route an inference result, given the tool rounds already run this turn
    pub fn after_inference(reply: Message, rounds: usize, max_rounds: usize) -> Self {
        if !reply.has_tool_calls() {
            NextStep::Done(reply)
        } else if rounds >= max_rounds {
            NextStep::Exhausted
        } else {
            NextStep::Tools(reply)
        }
    }
}

/// The conversation orchestration engine
pub struct ChatGraph {
    gateway: Arc<dyn ModelGateway>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    context: Arc<dyn ContextProvider>,
    policy: CompactionPolicy,
    static_system: String,
    max_tool_rounds: usize,
    inference_timeout: Duration,
    leases: SessionLeases,
}

impl ChatGraph {
    /// Assemble a graph from its collaborators
    pub fn new(
        config: &Config,
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        context: Arc<dyn ContextProvider>,
    ) -> Self {
        Self {
            gateway,
            tools,
            store,
            context,
            policy: CompactionPolicy::from_config(&config.compaction),
            static_system: config.agent.system_prompt.clone(),
            max_tool_rounds: config.agent.max_tool_rounds,
            inference_timeout: config.agent.inference_timeout(),
            leases: SessionLeases::new(),
        }
    }

    /// Build the production graph: Ollama, built-in tools, file sessions
    pub fn from_config(config: &Config) -> Result<Self> {
        let gateway = Arc::new(OllamaClient::from_config(config)?);
        let tools = Arc::new(ToolRegistry::with_defaults(config)?);
        let store = Arc::new(FileSessionStore::new(config.session.directory.clone()));
        let context = Arc::new(SystemContext::from_config(config));

        Ok(Self::new(config, gateway, tools, store, context))
    }

    pub fn gateway_name(&self) -> &str {
        self.gateway.name()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    pub fn policy(&self) -> &CompactionPolicy {
        &self.policy
    }

    /// Stored state of a session, if it has one
    pub async fn session(&self, session_id: &str) -> Result<Option<ConversationState>> {
        self.store.load(session_id).await
    }

    /// Run one turn to completion and return the final answer.
    ///
    /// Fragments of the answer are passed to `on_token` as they are produced.
    pub async fn run_turn(
        &self,
        session_id: &str,
        user_input: &str,
        on_token: Option<&StreamCallback>,
    ) -> Result<String> {
        let _lease = self.leases.acquire(session_id).await;

        let mut state = self.store.load(session_id).await?.unwrap_or_default();
        state.set_system(
            self.static_system.clone(),
            self.context.dynamic_context(session_id),
        );
        state.push(Message::user(user_input));

        info!(session_id, history = state.len(), "turn started");

        let answer = self.drive(&mut state, on_token).await?;
        self.store.save(session_id, &state).await?;

        info!(
            session_id,
            history = state.len(),
            summary_chars = state.summary.len(),
            "turn finished"
        );
        Ok(answer)
    }

    /// Run one turn in the background, streaming its events.
    ///
    /// The stream ends with exactly one `Done` or `Error`. Dropping it
    /// abandons the turn and nothing is saved.
    pub fn stream_turn(
        self: &Arc<Self>,
        session_id: impl Into<String>,
        user_input: impl Into<String>,
    ) -> ChatStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let graph = Arc::clone(self);
        let session_id = session_id.into();
        let user_input = user_input.into();

        tokio::spawn(async move {
            let sink = tx.clone();
            let on_token: StreamCallback = Box::new(move |fragment: &str| {
                let _ = sink.send(ChatEvent::Token(fragment.to_string()));
            });

            tokio::select! {
                result = graph.run_turn(&session_id, &user_input, Some(&on_token)) => {
                    let event = match result {
                        Ok(_) => ChatEvent::Done,
                        Err(e) => {
                            error!(session_id = %session_id, error = %e, "turn failed");
                            ChatEvent::Error(e.to_string())
                        }
                    };
                    let _ = tx.send(event);
                }
                _ = tx.closed() => {
                    warn!(session_id = %session_id, "stream dropped, turn abandoned");
                }
            }
        });

        UnboundedReceiverStream::new(rx)
    }

    /// Drive the graph from CHECK_BUDGET to DONE on a working copy
    async fn drive(
        &self,
        state: &mut ConversationState,
        on_token: Option<&StreamCallback>,
    ) -> Result<String> {
        let definitions = self.tools.definitions();
        let mut rounds = 0;
        let mut step = NextStep::check_budget(&self.policy, state);

        loop {
            step = match step {
                NextStep::Compact => {
                    let summarizer = self.gateway.as_ref();
                    self.bounded("summary", self.policy.compact_step(state, summarizer))
                        .await?;
                    NextStep::check_budget(&self.policy, state)
                }
                NextStep::Infer => {
                    let reply = self.infer(state, &definitions, on_token).await?;
                    NextStep::after_inference(reply, rounds, self.max_tool_rounds)
                }
                NextStep::Tools(reply) => {
                    rounds += 1;
                    debug!(round = rounds, calls = reply.tool_calls.len(), "running tools");
                    let results = self.tools.execute_all(&reply.tool_calls).await;
                    state.push(reply);
                    state.extend(results);
                    NextStep::check_budget(&self.policy, state)
                }
                NextStep::Exhausted => {
                    warn!(rounds, "tool round cap reached");
                    let reply = self.infer(state, &[], on_token).await?;
                    let text = if reply.content.trim().is_empty() {
                        emit(on_token, EXHAUSTED_REPLY);
                        EXHAUSTED_REPLY.to_string()
                    } else {
                        reply.content
                    };
                    state.push(Message::assistant(text.clone()));
                    return Ok(text);
                }
                NextStep::Done(mut reply) => {
                    if reply.content.trim().is_empty() {
                        emit(on_token, EMPTY_REPLY);
                        reply.content = EMPTY_REPLY.to_string();
                    }
                    let text = reply.content.clone();
                    state.push(reply);
                    return Ok(text);
                }
            };
        }
    }

    async fn infer(
        &self,
        state: &ConversationState,
        tools: &[ToolDefinition],
        on_token: Option<&StreamCallback>,
    ) -> Result<Message> {
        let view = state.model_view();
        debug!(
            model = self.gateway.name(),
            messages = view.len(),
            tools = tools.len(),
            "inference"
        );
        self.bounded("inference", self.gateway.generate(&view, tools, on_token))
            .await
    }

    /// Bound a model call by the inference timeout
    async fn bounded<T>(&self, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.inference_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(CarelineError::upstream(format!(
                "{} timed out after {}s",
                what,
                self.inference_timeout.as_secs()
            ))),
        }
    }
}

fn emit(on_token: Option<&StreamCallback>, text: &str) {
    if let Some(callback) = on_token {
        callback(text);
    }
}

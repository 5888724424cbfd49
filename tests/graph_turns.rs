//! End-to-end turns through the orchestration graph
//!
//! Drives `ChatGraph` with a scripted model gateway so every route of the
//! graph can be exercised without an Ollama server.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use careline::agent::graph::{EMPTY_REPLY, EXHAUSTED_REPLY};
use careline::agent::{
    ChatEvent, ChatGraph, CompactionPolicy, ConversationState, FileSessionStore,
    MemorySessionStore, SessionStore, StaticContext,
};
use careline::core::{CarelineError, Config, Message, Result, Role, ToolCall, ToolDefinition};
use careline::llm::{ModelGateway, StreamCallback};
use careline::tools::math::EvaluateExpressionTool;
use careline::tools::ToolRegistry;
use serde_json::json;
use tokio_stream::StreamExt;

/// One scripted model response
struct Step {
    delay: Duration,
    reply: Result<Message>,
}

impl Step {
    fn text(content: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Ok(Message::assistant(content)),
        }
    }

    fn calls(calls: Vec<ToolCall>) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Ok(Message::assistant_with_tools("", calls)),
        }
    }

    fn fail(message: &str) -> Self {
        Self {
            delay: Duration::ZERO,
            reply: Err(CarelineError::upstream(message)),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Gateway that replays a script and records what it was asked
#[derive(Default)]
struct ScriptedGateway {
    script: Mutex<VecDeque<Step>>,
    views: Mutex<Vec<Vec<Message>>>,
    tool_counts: Mutex<Vec<usize>>,
    summaries: AtomicUsize,
}

impl ScriptedGateway {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into()),
            ..Default::default()
        })
    }

    fn views(&self) -> Vec<Vec<Message>> {
        self.views.lock().unwrap().clone()
    }

    fn tool_counts(&self) -> Vec<usize> {
        self.tool_counts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        on_token: Option<&StreamCallback>,
    ) -> Result<Message> {
        self.views.lock().unwrap().push(messages.to_vec());
        self.tool_counts.lock().unwrap().push(tools.len());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Step::fail("script exhausted"));

        if !step.delay.is_zero() {
            tokio::time::sleep(step.delay).await;
        }

        let reply = step.reply?;
        if let Some(callback) = on_token {
            for fragment in reply.content.split_inclusive(' ') {
                callback(fragment);
            }
        }
        Ok(reply)
    }

    async fn summarize(&self, anchor: &Message, _summary: &Message) -> Result<String> {
        let n = self.summaries.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("summary #{} ({} chars)", n, anchor.content.len()))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn math_tools() -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(EvaluateExpressionTool::new());
    Arc::new(registry)
}

fn build(
    config: &Config,
    gateway: Arc<ScriptedGateway>,
    store: Arc<dyn SessionStore>,
) -> Arc<ChatGraph> {
    Arc::new(ChatGraph::new(
        config,
        gateway,
        math_tools(),
        store,
        Arc::new(StaticContext("ctx".to_string())),
    ))
}

fn tokens(events: &[ChatEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            ChatEvent::Token(fragment) => Some(fragment.as_str()),
            _ => None,
        })
        .collect()
}

fn add_call(id: &str, expr: &str) -> ToolCall {
    ToolCall::new(id, "evaluate_expression", json!({ "expr": expr }))
}

#[tokio::test]
async fn test_two_plus_two_scenario() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![
        Step::calls(vec![add_call("c1", "2+2")]),
        Step::text("The answer is 4."),
    ]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway.clone(), store.clone());

    let events: Vec<ChatEvent> = graph.stream_turn("abc", "What is 2+2?").collect().await;

    assert_eq!(tokens(&events), "The answer is 4.");
    assert_eq!(events.last(), Some(&ChatEvent::Done));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    // Both inferences saw the tool schema; the second saw the tool result
    assert_eq!(gateway.tool_counts(), vec![1, 1]);
    let views = gateway.views();
    assert_eq!(views.len(), 2);
    assert_eq!(
        views[0][0].content,
        format!("{}\nctx", config.agent.system_prompt)
    );
    assert_eq!(views[0][1].content, "Long term memory with the user:\n");
    let result = views[1].last().unwrap();
    assert_eq!(result.role, Role::Tool);
    assert_eq!(result.tool_call_id.as_deref(), Some("c1"));
    assert_eq!(result.content, "4");

    let state = store.load("abc").await.unwrap().unwrap();
    let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
    );
    assert_eq!(state.messages[0].content, "What is 2+2?");
    assert_eq!(state.messages[3].content, "The answer is 4.");
}

#[tokio::test]
async fn test_tool_results_correlate_in_order() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![
        Step::calls(vec![
            add_call("c1", "1+1"),
            ToolCall::new("c2", "web_search", json!({ "query": "fever" })),
            add_call("c3", "3*3"),
        ]),
        Step::text("Done."),
    ]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway, store.clone());

    let answer = graph.run_turn("abc", "compute", None).await.unwrap();
    assert_eq!(answer, "Done.");

    let state = store.load("abc").await.unwrap().unwrap();
    let results: Vec<&Message> = state.messages.iter().filter(|m| m.role == Role::Tool).collect();
    let ids: Vec<&str> = results
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
    assert_eq!(results[0].content, "2");
    assert!(results[1].content.starts_with("Error: unknown tool"));
    assert_eq!(results[2].content, "9");
}

#[tokio::test]
async fn test_upstream_failure_persists_nothing() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![
        Step::text("Hello!"),
        Step::fail("connection refused"),
    ]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway, store.clone());

    tokio_test::assert_ok!(graph.run_turn("abc", "hi", None).await);
    let before = store.load("abc").await.unwrap().unwrap();

    let events: Vec<ChatEvent> = graph.stream_turn("abc", "are you there?").collect().await;
    match events.last() {
        Some(ChatEvent::Error(message)) => assert!(message.contains("connection refused")),
        other => panic!("expected an error event, got {:?}", other),
    }
    assert!(!events.contains(&ChatEvent::Done));

    let after = store.load("abc").await.unwrap().unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_tool_round_cap_ends_with_fallback() {
    let mut config = Config::default();
    config.agent.max_tool_rounds = 2;
    let gateway = ScriptedGateway::new(vec![
        Step::calls(vec![add_call("c1", "1")]),
        Step::calls(vec![add_call("c2", "2")]),
        Step::calls(vec![add_call("c3", "3")]),
        Step::text(""),
    ]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway.clone(), store.clone());

    let events: Vec<ChatEvent> = graph.stream_turn("abc", "loop forever").collect().await;
    assert_eq!(tokens(&events), EXHAUSTED_REPLY);
    assert_eq!(events.last(), Some(&ChatEvent::Done));

    // The final call is made without tool schemas
    assert_eq!(gateway.tool_counts(), vec![1, 1, 1, 0]);

    let state = store.load("abc").await.unwrap().unwrap();
    assert_eq!(state.len(), 6);
    let last = state.last_message().unwrap();
    assert_eq!(last.content, EXHAUSTED_REPLY);
    assert!(!last.has_tool_calls());
}

#[tokio::test]
async fn test_tool_round_cap_keeps_model_text() {
    let mut config = Config::default();
    config.agent.max_tool_rounds = 1;
    let gateway = ScriptedGateway::new(vec![
        Step::calls(vec![add_call("c1", "1")]),
        Step::calls(vec![add_call("c2", "2")]),
        Step::text("Best I can do."),
    ]);
    let graph = build(&config, gateway, Arc::new(MemorySessionStore::new()));

    let answer = graph.run_turn("abc", "loop", None).await.unwrap();
    assert_eq!(answer, "Best I can do.");
}

#[tokio::test]
async fn test_empty_reply_is_replaced() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![Step::text("")]);
    let graph = build(&config, gateway, Arc::new(MemorySessionStore::new()));

    let answer = graph.run_turn("abc", "hello?", None).await.unwrap();
    assert_eq!(answer, EMPTY_REPLY);
}

#[tokio::test]
async fn test_compaction_runs_before_inference() {
    let mut config = Config::default();
    config.compaction.threshold_tokens = 200;
    config.compaction.chars_per_token = 3;
    config.compaction.extra_tokens_per_message = 60;

    let store = Arc::new(MemorySessionStore::new());
    let mut seeded = ConversationState::default();
    for i in 0..6 {
        let role_msg = if i % 2 == 0 {
            Message::user("x".repeat(100))
        } else {
            Message::assistant("y".repeat(100))
        };
        seeded.push(role_msg);
    }
    store.save("abc", &seeded).await.unwrap();

    let gateway = ScriptedGateway::new(vec![Step::text("ok")]);
    let graph = build(&config, gateway.clone(), store.clone());
    graph.run_turn("abc", "hi", None).await.unwrap();

    // Seven messages, of which the oldest five had to go
    assert_eq!(gateway.summaries.load(Ordering::SeqCst), 5);

    let view = &gateway.views()[0];
    let policy = CompactionPolicy::from_config(&config.compaction);
    assert!(policy.estimate_tokens(&view[2..]) <= 200);
    assert_eq!(view[1].content, "Long term memory with the user:\nsummary #5 (100 chars)");
    assert_eq!(view.last().unwrap().content, "hi");

    let state = store.load("abc").await.unwrap().unwrap();
    assert_eq!(state.summary, "summary #5 (100 chars)");
    assert_eq!(state.len(), 3);
}

#[tokio::test]
async fn test_tool_results_are_compacted_before_next_inference() {
    let mut config = Config::default();
    config.compaction.threshold_tokens = 150;
    config.compaction.chars_per_token = 3;
    config.compaction.extra_tokens_per_message = 60;

    let gateway = ScriptedGateway::new(vec![
        Step::calls(vec![add_call("c1", "2+2")]),
        Step::text("The answer is 4."),
    ]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway.clone(), store.clone());

    // The question alone fits; question, call and result together do not
    graph.run_turn("abc", "What is 2+2?", None).await.unwrap();
    assert_eq!(gateway.summaries.load(Ordering::SeqCst), 1);

    let views = gateway.views();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0][1].content, "Long term memory with the user:\n");
    assert_eq!(
        views[1][1].content,
        "Long term memory with the user:\nsummary #1 (12 chars)"
    );
    assert!(views[1].iter().all(|m| m.content != "What is 2+2?"));
    assert_eq!(views[1].last().unwrap().tool_call_id.as_deref(), Some("c1"));

    let state = store.load("abc").await.unwrap().unwrap();
    assert_eq!(state.summary, "summary #1 (12 chars)");
    let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Assistant, Role::Tool, Role::Assistant]);
}

/// Store that loads nothing and refuses every save
struct FailingSaveStore;

#[async_trait]
impl SessionStore for FailingSaveStore {
    async fn load(&self, _session_id: &str) -> Result<Option<ConversationState>> {
        Ok(None)
    }

    async fn save(&self, _session_id: &str, _state: &ConversationState) -> Result<()> {
        Err(CarelineError::session("disk full"))
    }
}

#[tokio::test]
async fn test_save_failure_ends_stream_with_error() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![Step::text("Take some rest.")]);
    let graph = build(&config, gateway, Arc::new(FailingSaveStore));

    let events: Vec<ChatEvent> = graph.stream_turn("abc", "I have a cold").collect().await;
    match events.last() {
        Some(ChatEvent::Error(message)) => assert!(message.contains("disk full")),
        other => panic!("expected an error event, got {:?}", other),
    }
    assert!(!events.contains(&ChatEvent::Done));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_same_session_turns_do_not_interleave() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![
        Step::text("first").slow(Duration::from_millis(50)),
        Step::text("second").slow(Duration::from_millis(50)),
    ]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway, store.clone());

    let (a, b) = tokio::join!(
        graph.run_turn("abc", "one", None),
        graph.run_turn("abc", "two", None)
    );
    tokio_test::assert_ok!(a);
    tokio_test::assert_ok!(b);

    // The second turn started from the first turn's saved state
    let state = store.load("abc").await.unwrap().unwrap();
    let roles: Vec<Role> = state.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![Step::text("a"), Step::text("b")]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway.clone(), store.clone());

    graph.run_turn("alice", "I am Alice", None).await.unwrap();
    graph.run_turn("bob", "I am Bob", None).await.unwrap();

    let bob_view = &gateway.views()[1];
    assert!(bob_view.iter().all(|m| m.content != "I am Alice"));
    assert_eq!(store.load("alice").await.unwrap().unwrap().len(), 2);
    assert_eq!(store.load("bob").await.unwrap().unwrap().len(), 2);
}

#[tokio::test]
async fn test_dropping_stream_abandons_turn() {
    let config = Config::default();
    let gateway = ScriptedGateway::new(vec![
        Step::text("too late").slow(Duration::from_secs(5)),
        Step::text("ok"),
    ]);
    let store = Arc::new(MemorySessionStore::new());
    let graph = build(&config, gateway, store.clone());

    let stream = graph.stream_turn("abc", "slow question");
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(stream);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.load("abc").await.unwrap().is_none());

    // The lease was released with the abandoned turn
    let answer = tokio::time::timeout(
        Duration::from_secs(1),
        graph.run_turn("abc", "quick question", None),
    )
    .await
    .expect("lease still held")
    .unwrap();
    assert_eq!(answer, "ok");
}

#[tokio::test]
async fn test_inference_timeout_is_upstream_error() {
    let mut config = Config::default();
    config.agent.inference_timeout_secs = 1;
    let gateway = ScriptedGateway::new(vec![Step::text("late").slow(Duration::from_secs(5))]);
    let graph = build(&config, gateway, Arc::new(MemorySessionStore::new()));

    let err = tokio_test::assert_err!(graph.run_turn("abc", "hi", None).await);
    assert!(err.is_upstream());
    assert!(err.to_string().contains("timed out"));
}

#[tokio::test]
async fn test_file_sessions_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();

    let gateway = ScriptedGateway::new(vec![Step::text("Noted.")]);
    let graph = build(
        &config,
        gateway,
        Arc::new(FileSessionStore::new(dir.path())),
    );
    graph.run_turn("user/1", "I am allergic to penicillin", None).await.unwrap();
    drop(graph);

    let gateway = ScriptedGateway::new(vec![Step::text("Yes, penicillin.")]);
    let graph = build(
        &config,
        gateway.clone(),
        Arc::new(FileSessionStore::new(dir.path())),
    );
    graph.run_turn("user/1", "What am I allergic to?", None).await.unwrap();

    let view = &gateway.views()[0];
    assert!(view
        .iter()
        .any(|m| m.role == Role::User && m.content == "I am allergic to penicillin"));
    assert_eq!(view.len(), 2 + 3);
}

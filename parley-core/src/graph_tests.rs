use super::*;
use crate::engine::{UpdatePayload, INTERRUPT_NODE};
use crate::store::MemoryConversationStore;
use crate::test_utils::{ApprovalTool, EchoTool, MockChatModel};
use crate::tool::ToolError;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize, JsonSchema)]
struct MultiplyInput {
    a: i64,
    b: i64,
}

struct Multiply;

impl Tool for Multiply {
    type Input = MultiplyInput;

    fn name(&self) -> &str {
        "multiply"
    }

    fn description(&self) -> &str {
        "Multiply two integers"
    }

    async fn execute(
        &self,
        input: Self::Input,
        _resume: Option<String>,
    ) -> Result<ToolOutput, ToolError> {
        Ok((input.a * input.b).to_string().into())
    }
}

struct Broken;

impl Tool for Broken {
    type Input = Value;

    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn execute(
        &self,
        _input: Self::Input,
        _resume: Option<String>,
    ) -> Result<ToolOutput, ToolError> {
        Err("disk on fire".into())
    }
}

fn config(thread: &str) -> RunConfig {
    RunConfig::new(thread, thread, "tester")
}

async fn collect(graph: &ReactGraph, input: EngineInput, config: RunConfig) -> Vec<EngineEvent> {
    let stream = graph.stream(input, config).await.unwrap();
    stream
        .map(|event| event.expect("engine event"))
        .collect()
        .await
}

fn update_messages(events: &[EngineEvent], node: &str) -> Vec<RawMessage> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Updates(updates) => Some(updates),
            _ => None,
        })
        .flatten()
        .filter(|update| update.node == node)
        .flat_map(|update| update.complete_messages().cloned().collect::<Vec<_>>())
        .collect()
}

fn token_text(events: &[EngineEvent]) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::Tokens(token) => token.chunk.as_ai().map(|ai| ai.content.text()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_builder_requires_model_and_store() {
    let missing_model = ReactGraph::builder()
        .store(Arc::new(MemoryConversationStore::new()))
        .build();
    assert!(matches!(missing_model, Err(GraphBuildError::NoModel)));

    let missing_store = ReactGraph::builder().model(MockChatModel::new()).build();
    assert!(matches!(missing_store, Err(GraphBuildError::NoStore)));

    let duplicate = ReactGraph::builder()
        .model(MockChatModel::new())
        .store(Arc::new(MemoryConversationStore::new()))
        .add_tool(EchoTool)
        .add_tool(EchoTool)
        .build();
    assert!(matches!(duplicate, Err(GraphBuildError::DuplicateTool(name)) if name == "echo"));
}

#[tokio::test]
async fn test_plain_answer_streams_tokens_and_saves_once() {
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(MockChatModel::new().with_text("Hello there friend"))
        .store(store.clone())
        .build()
        .unwrap();

    let cfg = config("t1");
    let events = collect(&graph, EngineInput::human_turn("hi"), cfg.clone()).await;

    assert_eq!(token_text(&events), "Hello there friend");
    let replies = update_messages(&events, AGENT_NODE);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].content().text(), "Hello there friend");

    let ai = replies[0].as_ai().unwrap();
    assert_eq!(
        ai.additional_kwargs.get("ai_call_id"),
        Some(&Value::String(cfg.ai_call_id.clone()))
    );
    assert!(cfg.ai_call_id.starts_with("ai_call_"));

    assert_eq!(store.checkpoint_count("t1"), 1);
    let state = store.get_state("t1").await.unwrap().unwrap();
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0], RawMessage::human("hi"));
    assert!(state.pending.is_empty());
    assert_eq!(state.metadata.user_id.as_deref(), Some("tester"));
}

#[tokio::test]
async fn test_tool_round_trip() {
    let store = Arc::new(MemoryConversationStore::new());
    let model = MockChatModel::new()
        .with_tool_call_id("multiply", json!({"a": 15, "b": 24}), "call_1")
        .with_text("15 times 24 is 360");
    let graph = ReactGraph::builder()
        .model(model.clone())
        .add_tool(Multiply)
        .store(store.clone())
        .system_prompt("You are a calculator.")
        .build()
        .unwrap();

    let events = collect(&graph, EngineInput::human_turn("What is 15 * 24?"), config("t2")).await;

    let tool_messages = update_messages(&events, TOOLS_NODE);
    assert_eq!(tool_messages, vec![RawMessage::Tool(ToolMessage {
        content: MessageContent::Text("360".to_string()),
        tool_call_id: "call_1".to_string(),
        name: Some("multiply".to_string()),
        id: None,
    })]);

    let mirrored = events.iter().any(|event| matches!(
        event,
        EngineEvent::Tokens(token) if matches!(token.chunk, RawMessage::Tool(_))
    ));
    assert!(mirrored);

    let replies = update_messages(&events, AGENT_NODE);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[1].content().text(), "15 times 24 is 360");

    assert_eq!(model.call_count(), 2);
    let second = &model.requests()[1];
    assert_eq!(second.system_prompt.as_deref(), Some("You are a calculator."));
    assert_eq!(second.tools.len(), 1);
    assert_eq!(second.messages.len(), 3);

    assert_eq!(store.checkpoint_count("t2"), 1);
    assert_eq!(store.get_state("t2").await.unwrap().unwrap().messages.len(), 4);
}

#[tokio::test]
async fn test_unknown_and_failing_tools_report_errors() {
    let graph = ReactGraph::builder()
        .model(
            MockChatModel::new()
                .with_tool_call_id("missing", json!({}), "call_a")
                .with_tool_call_id("broken", json!({}), "call_b")
                .with_text("sorry"),
        )
        .add_tool(Broken)
        .store(Arc::new(MemoryConversationStore::new()))
        .build()
        .unwrap();

    let events = collect(&graph, EngineInput::human_turn("go"), config("t3")).await;
    let results: Vec<String> = update_messages(&events, TOOLS_NODE)
        .iter()
        .map(|m| m.content().text())
        .collect();

    assert_eq!(
        results,
        vec![
            "Error: tool 'missing' not found".to_string(),
            "Error: disk on fire".to_string()
        ]
    );
}

#[tokio::test]
async fn test_interrupt_saves_pending_task_then_resumes() {
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(
            MockChatModel::new()
                .with_tool_call_id("approve", json!({"action": "transfer"}), "call_ok")
                .with_text("Transfer done"),
        )
        .add_tool(ApprovalTool)
        .store(store.clone())
        .build()
        .unwrap();

    let first = collect(&graph, EngineInput::human_turn("send money"), config("t4")).await;
    let interrupt = first.iter().find_map(|event| match event {
        EngineEvent::Updates(updates) => updates.iter().find(|u| u.node == INTERRUPT_NODE),
        _ => None,
    });
    match interrupt.map(|u| &u.payload) {
        Some(UpdatePayload::Interrupts(list)) => {
            assert_eq!(list[0].value, json!("Approve transfer?"));
        }
        other => panic!("expected interrupt update, got {:?}", other),
    }

    let snapshot = graph.get_state(&config("t4")).await.unwrap();
    assert!(snapshot.is_interrupted());
    assert_eq!(snapshot.tasks[0].tool_calls[0].id.as_deref(), Some("call_ok"));

    let second = collect(&graph, EngineInput::Resume("yes".to_string()), config("t4")).await;
    let tool_messages = update_messages(&second, TOOLS_NODE);
    assert_eq!(tool_messages[0].content().text(), "transfer: yes");
    assert_eq!(tool_messages[0].tool_call_id(), Some("call_ok"));
    assert_eq!(token_text(&second), "Transfer done");

    assert_eq!(store.checkpoint_count("t4"), 2);
    let state = store.get_state("t4").await.unwrap().unwrap();
    assert!(!state.is_interrupted());
}

#[tokio::test]
async fn test_resume_without_pending_task_fails() {
    let graph = ReactGraph::builder()
        .model(MockChatModel::new())
        .store(Arc::new(MemoryConversationStore::new()))
        .build()
        .unwrap();

    let result = graph
        .stream(EngineInput::Resume("yes".to_string()), config("t5"))
        .await;
    assert!(matches!(result, Err(EngineError::NothingToResume(thread)) if thread == "t5"));
}

#[tokio::test]
async fn test_recursion_limit() {
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(
            MockChatModel::new()
                .with_tool_call("echo", json!({"text": "a"}))
                .with_tool_call("echo", json!({"text": "b"}))
                .with_text("never"),
        )
        .add_tool(EchoTool)
        .store(store.clone())
        .max_steps(2)
        .build()
        .unwrap();

    let events: Vec<_> = graph
        .stream(EngineInput::human_turn("loop"), config("t6"))
        .await
        .unwrap()
        .collect()
        .await;

    assert!(matches!(
        events.last(),
        Some(Err(EngineError::RecursionLimit(2)))
    ));
    assert_eq!(store.checkpoint_count("t6"), 0);
}

#[tokio::test]
async fn test_dropped_stream_saves_nothing() {
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(MockChatModel::new().with_text("one two three"))
        .store(store.clone())
        .build()
        .unwrap();

    let mut stream = graph
        .stream(EngineInput::human_turn("hi"), config("t7"))
        .await
        .unwrap();
    let first = stream.next().await;
    assert!(matches!(first, Some(Ok(EngineEvent::Tokens(_)))));
    drop(stream);

    assert_eq!(store.checkpoint_count("t7"), 0);
}

#[tokio::test]
async fn test_second_turn_extends_history() {
    let store = Arc::new(MemoryConversationStore::new());
    let model = MockChatModel::new().with_text("first").with_text("second");
    let graph = ReactGraph::builder()
        .model(model.clone())
        .store(store.clone())
        .build()
        .unwrap();

    collect(&graph, EngineInput::human_turn("a"), config("t8")).await;
    collect(&graph, EngineInput::human_turn("b"), config("t8")).await;

    assert_eq!(model.requests()[1].messages.len(), 3);
    assert_eq!(store.checkpoint_count("t8"), 2);
    assert_eq!(store.get_state("t8").await.unwrap().unwrap().messages.len(), 4);
}

#[test]
fn test_merge_chunk_concatenates_and_appends() {
    let mut reply = AiMessage::default();
    merge_chunk(&mut reply, AiMessage::text("Hel").with_id("msg_1"));
    merge_chunk(&mut reply, AiMessage::text("lo"));
    merge_chunk(
        &mut reply,
        AiMessage::default().with_tool_call("echo", json!({"text": "x"}), "c1"),
    );

    assert_eq!(reply.content.text(), "Hello");
    assert_eq!(reply.id.as_deref(), Some("msg_1"));
    assert_eq!(reply.tool_calls.len(), 1);
}

#[tokio::test]
async fn test_model_receives_tool_argument_schema() {
    let model = MockChatModel::new().with_text("ok");
    let graph = ReactGraph::builder()
        .model(model.clone())
        .add_tool(EchoTool)
        .add_tool(Multiply)
        .store(Arc::new(MemoryConversationStore::new()))
        .build()
        .unwrap();

    collect(&graph, EngineInput::human_turn("hi"), config("t9")).await;

    let tools = &model.requests()[0].tools;
    let echo = tools.iter().find(|spec| spec.name == "echo").unwrap();
    assert_eq!(echo.parameters["type"], json!("object"));
    assert_eq!(echo.parameters["properties"]["text"]["type"], json!("string"));
    assert_eq!(echo.parameters["required"], json!(["text"]));

    let multiply = tools.iter().find(|spec| spec.name == "multiply").unwrap();
    assert_eq!(multiply.parameters["properties"]["a"]["type"], json!("integer"));
    assert_eq!(multiply.parameters["properties"]["b"]["type"], json!("integer"));
}

#[tokio::test]
async fn test_concurrent_turns_on_one_thread_keep_both() {
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(MockChatModel::new().with_text("a").with_text("b"))
        .store(store.clone())
        .build()
        .unwrap();

    let first = graph
        .stream(EngineInput::human_turn("first"), config("t10"))
        .await
        .unwrap();
    let second = graph
        .stream(EngineInput::human_turn("second"), config("t10"))
        .await
        .unwrap();
    let (first, second): (Vec<_>, Vec<_>) =
        futures::join!(first.collect(), second.collect());
    assert!(first.iter().chain(second.iter()).all(Result::is_ok));

    let texts: Vec<String> = store
        .get_state("t10")
        .await
        .unwrap()
        .unwrap()
        .messages
        .iter()
        .map(|m| m.content().text())
        .collect();
    assert_eq!(texts, vec!["first", "a", "second", "b"]);
    assert_eq!(store.checkpoint_count("t10"), 2);
}

#[tokio::test]
async fn test_turns_on_other_threads_do_not_wait() {
    let store = Arc::new(MemoryConversationStore::new());
    let graph = ReactGraph::builder()
        .model(MockChatModel::new().with_text("one two").with_text("three"))
        .store(store.clone())
        .build()
        .unwrap();

    let mut held = graph
        .stream(EngineInput::human_turn("x"), config("t11"))
        .await
        .unwrap();
    assert!(matches!(held.next().await, Some(Ok(EngineEvent::Tokens(_)))));

    collect(&graph, EngineInput::human_turn("y"), config("t12")).await;
    assert_eq!(store.checkpoint_count("t12"), 1);

    while held.next().await.is_some() {}
    assert_eq!(store.checkpoint_count("t11"), 1);
}

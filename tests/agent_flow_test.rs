//! 端到端流程：注册表 -> Agent -> ReAct 执行 -> 对话存储 / TAO 日志 / 错误处理

use std::sync::Arc;

use async_trait::async_trait;
use tao_agent::config::AgentSection;
use tao_agent::core::{AgentFactory, SessionRegistry, SessionState};
use tao_agent::llm::{LlmError, MockLanguageModel};
use tao_agent::memory::{
    ConversationMessage, DurableStore, InMemoryStore, MessageType, SummaryProducer, MAX_MESSAGES,
};
use tao_agent::react::{list_sessions, load_session_logs, StepType};
use tao_agent::{AgentConfig, AgentDeps, ResearchAgent};
use tokio_util::sync::CancellationToken;

struct FailingSummarizer;

#[async_trait]
impl SummaryProducer for FailingSummarizer {
    async fn summarize(&self, _messages: &[ConversationMessage]) -> Result<String, LlmError> {
        Err(LlmError::Request("Rate limit exceeded".into()))
    }
}

#[tokio::test]
async fn test_registry_run_persists_history_and_logs() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DurableStore> = Arc::new(InMemoryStore::new());
    let llm = Arc::new(MockLanguageModel::with_replies([
        "Thought: count\nAction: word_counter\nAction Input: {\"text\": \"one two three\"}",
        "Thought: I now know the final answer\nFinal Answer: three words",
    ]));
    let deps = AgentDeps::new(llm, store.clone()).with_log_dir(dir.path());
    let registry = SessionRegistry::new(AgentFactory::new(deps.clone(), AgentSection::default()));

    let (session_id, agent) = registry.get_or_create(Some("flow")).await.unwrap();
    let result = agent
        .lock()
        .await
        .run("how many words in 'one two three'?", None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.output, "three words");
    assert_eq!(result.intermediate_steps[0].observation, "Word count: 3");
    assert_eq!(agent.lock().await.state(), SessionState::Completed);

    // 新实例从同一存储加载历史
    let reopened = ResearchAgent::new(AgentConfig::new(&session_id).unwrap(), &deps).await;
    let kinds: Vec<_> = reopened.memory().messages().iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MessageType::Human, MessageType::Ai]);

    assert_eq!(list_sessions(dir.path()).unwrap(), vec!["flow"]);
    let logs = load_session_logs(dir.path(), "flow", None).unwrap();
    let types: Vec<_> = logs.iter().map(|l| l.step_type).collect();
    assert_eq!(
        types,
        vec![StepType::Action, StepType::Observation, StepType::FinalAnswer]
    );
}

#[tokio::test]
async fn test_summarizer_failure_is_routed_through_error_handler() {
    let dir = tempfile::tempdir().unwrap();
    let deps = AgentDeps::new(Arc::new(MockLanguageModel::new()), Arc::new(InMemoryStore::new()))
        .with_summarizer(Arc::new(FailingSummarizer))
        .with_log_dir(dir.path());
    let mut agent = ResearchAgent::new(AgentConfig::new("busy").unwrap(), &deps).await;

    for i in 0..MAX_MESSAGES / 2 {
        let result = agent
            .run(&format!("question {i}"), None, CancellationToken::new())
            .await
            .unwrap();
        assert!(!result.is_error());
    }
    assert_eq!(agent.memory().len(), MAX_MESSAGES);

    let result = agent
        .run("one more", None, CancellationToken::new())
        .await
        .unwrap();
    let error = result.error.unwrap();
    assert_eq!(error.error_type, "RateLimitError");
    assert_eq!(agent.state(), SessionState::Error);
    assert_eq!(agent.memory().len(), MAX_MESSAGES);
    assert!(agent.error_handler().can_retry());
}

#[tokio::test]
async fn test_nested_error_returns_fallback_and_keeps_context() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(MockLanguageModel::new());
    llm.push_failure("Request timeout after 30s");
    let deps = AgentDeps::new(llm, Arc::new(InMemoryStore::new())).with_log_dir(dir.path());
    let mut agent = ResearchAgent::new(AgentConfig::new("nested").unwrap(), &deps).await;

    let first = agent.run("q", None, CancellationToken::new()).await.unwrap();
    let first_error = first.error.unwrap();
    assert_eq!(agent.state(), SessionState::Error);
    let context_before = agent.error_handler().state_machine().error_context().cloned();

    let fallback = agent
        .error_handler_mut()
        .handle_llm_error(&LlmError::Request("API key invalid".into()));
    assert_eq!(fallback.error_type, "LLMAPIError");
    assert!(!fallback.is_retryable);
    assert!(fallback.message.starts_with("Unexpected error in LLM error handling"));
    assert_eq!(
        agent.error_handler().state_machine().error_context().cloned(),
        context_before
    );
    assert_ne!(first_error.error_type, "LLMAPIError");

    assert!(agent.error_handler_mut().clear_error());
    assert_eq!(agent.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_failed_compaction_keeps_turn_out_of_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let seeded: Vec<_> = (0..MAX_MESSAGES - 1)
        .map(|i| ConversationMessage::human(format!("old {i}")))
        .collect();
    let payload = serde_json::json!({ "messages": seeded, "timestamp": "2024-01-01T00:00:00+00:00" });
    store
        .set("chat_history:edge", serde_json::to_vec(&payload).unwrap(), 0)
        .await
        .unwrap();

    let deps = AgentDeps::new(Arc::new(MockLanguageModel::new()), store.clone())
        .with_summarizer(Arc::new(FailingSummarizer))
        .with_log_dir(dir.path());
    let mut agent = ResearchAgent::new(AgentConfig::new("edge").unwrap(), &deps).await;
    assert_eq!(agent.memory().len(), MAX_MESSAGES - 1);

    let result = agent
        .run("new question", None, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.error.unwrap().error_type, "RateLimitError");
    assert_eq!(agent.memory().len(), MAX_MESSAGES - 1);
    assert_eq!(agent.memory().messages().last().unwrap().content, "old 18");

    let reopened = ResearchAgent::new(AgentConfig::new("edge").unwrap(), &deps).await;
    assert_eq!(reopened.memory().len(), MAX_MESSAGES - 1);
    assert!(reopened
        .memory()
        .messages()
        .iter()
        .all(|m| m.content != "new question"));
}

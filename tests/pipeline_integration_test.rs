//! 流水线集成测试：用 MockLlmClient 驱动完整的 Orchestrator

use std::sync::Arc;
use std::time::Duration;

use adpilot::agent::build_orchestrator;
use adpilot::config::AppConfig;
use adpilot::core::{Orchestrator, PipelineStage, SessionMode, CANCELLED_NOTICE};
use adpilot::llm::{LlmClient, LlmError, MockLlmClient, RoleClient};
use adpilot::memory::{Message, Role};
use adpilot::pipeline::prompts::{
    DATA_QUERY_PROMPT, ERROR_HANDLER_PROMPT, FINAL_RESPONDER_PROMPT, PLANNER_PROMPT,
    REASONING_PROMPT,
};
use adpilot::pipeline::{
    parse_plan, EventSink, GuardrailChecker, PipelineEvent, PlanGenerator, ReasoningWorker,
    RejectionResponder, Synthesizer, WorkerKind, WorkerRegistry,
};
use adpilot::tools::{DataSource, MockAdsApi, QueryObject, RetrievalError, Row};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

const PASS: &str = r#"{"passed": true}"#;

fn config(classifier: &str) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.guardrails.classifier = classifier.to_string();
    cfg
}

fn orchestrator(cfg: &AppConfig, mock: &Arc<MockLlmClient>) -> Orchestrator {
    build_orchestrator(cfg, mock.clone(), Arc::new(MockAdsApi::new(3).with_seed(7)))
}

/// 永远不可用的数据源
struct OfflineSource;

#[async_trait]
impl DataSource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    async fn fetch(&self, _query: &QueryObject) -> Result<Vec<Row>, RetrievalError> {
        Err(RetrievalError::Unavailable("warehouse offline".into()))
    }
}

fn plan_json(tasks: &[(&str, &str)]) -> String {
    let tasks: Vec<serde_json::Value> = tasks
        .iter()
        .enumerate()
        .map(|(i, (desc, agent))| {
            serde_json::json!({
                "id": (i + 1).to_string(),
                "description": desc,
                "assignedAgent": agent
            })
        })
        .collect();
    serde_json::json!({"objective": "Analyze ads", "tasks": tasks}).to_string()
}

async fn run(orch: &mut Orchestrator, input: &str) -> (String, Vec<PipelineEvent>) {
    let (sink, mut rx) = EventSink::channel();
    let answer = orch
        .handle_request(input, &sink, &CancellationToken::new())
        .await;
    drop(sink);
    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    (answer, events)
}

fn titles(events: &[PipelineEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) => Some(p.title.clone()),
            PipelineEvent::Completed { .. } => None,
        })
        .collect()
}

fn system_prompt(call: &[Message]) -> &str {
    call.first()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .unwrap_or_default()
}

fn calls_for(mock: &MockLlmClient, prompt: &str) -> Vec<Vec<Message>> {
    mock.calls()
        .into_iter()
        .filter(|c| system_prompt(c) == prompt)
        .collect()
}

#[tokio::test]
async fn test_over_long_input_never_reaches_classifier_or_planner() {
    let cfg = config("llm");
    let mock = Arc::new(MockLlmClient::scripted(["Please shorten your question."]));
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, events) = run(&mut orch, &"a".repeat(5001)).await;

    assert_eq!(answer, "Please shorten your question.");
    // 唯一的调用来自 error-handler
    let calls = mock.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(system_prompt(&calls[0]), ERROR_HANDLER_PROMPT);
    assert!(calls[0][1].content.contains("too long"));
    assert_eq!(
        titles(&events),
        vec!["Safety Check".to_string(), "Request Not Completed".to_string()]
    );
    assert_eq!(orch.state().stage, PipelineStage::Failed);
}

#[tokio::test]
async fn test_pii_rejected_locally() {
    let cfg = config("llm");
    let mock = Arc::new(MockLlmClient::scripted(["We never process personal data."]));
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, events) = run(&mut orch, "Email the report to bob@example.com").await;

    assert_eq!(answer, "We never process personal data.");
    assert_eq!(mock.call_count(), 1);
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Completed { response }) if response == &answer
    ));
}

#[test]
fn test_fenced_and_bare_plans_are_identical() {
    let bare = plan_json(&[("Fetch spend by format", "data-query"), ("Explain", "reasoning")]);
    let fenced = format!("Here is the plan:\n```json\n{}\n```", bare);

    let a = parse_plan(&bare, 3).unwrap();
    let b = parse_plan(&fenced, 3).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.tasks[0].assigned_worker, WorkerKind::DataQuery);
}

#[tokio::test]
async fn test_empty_plan_is_explained_without_running_workers() {
    let cfg = config("llm");
    let mock = Arc::new(MockLlmClient::scripted([
        PASS,
        r#"{"objective": "x", "tasks": []}"#,
        "I could not plan that.",
    ]));
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, events) = run(&mut orch, "show me ad performance").await;

    assert_eq!(answer, "I could not plan that.");
    assert_eq!(mock.call_count(), 3);
    let handler = calls_for(&mock, ERROR_HANDLER_PROMPT);
    assert!(handler[0][1].content.contains("Planning failed"));
    assert!(!titles(&events).iter().any(|t| t.starts_with("Executing")));
}

#[tokio::test]
async fn test_tasks_run_sequentially_in_plan_order() {
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(plan_json(&[("a", "reasoning"), ("b", "reasoning"), ("c", "reasoning")]));
    mock.push_delayed("A", Duration::from_millis(30));
    mock.push_delayed("B", Duration::from_millis(10));
    mock.push_ok("C");
    mock.push_ok("Summary");
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, _) = run(&mut orch, "compare campaigns").await;

    assert_eq!(answer, "Summary");
    let results = &orch.state().accumulated_results;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], "Step 1 Result (reasoning):\nA");
    assert_eq!(results[1], "Step 2 Result (reasoning):\nB");
    assert_eq!(results[2], "Step 3 Result (reasoning):\nC");

    // 第三步的输入包含前两步结果
    let worker_calls = calls_for(&mock, REASONING_PROMPT);
    let third_input = &worker_calls[2].last().unwrap().content;
    assert!(third_input.contains("Current Task: c"));
    assert!(third_input.contains("Step 1 Result (reasoning):\nA"));
    assert!(third_input.contains("Step 2 Result (reasoning):\nB"));
}

#[tokio::test]
async fn test_failed_step_stops_the_plan() {
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(plan_json(&[("a", "reasoning"), ("b", "reasoning"), ("c", "reasoning")]));
    mock.push_ok("A");
    mock.push_err(LlmError::Transport("timeout".into()));
    mock.push_ok("Step two broke, sorry.");
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, events) = run(&mut orch, "compare campaigns").await;

    assert_eq!(answer, "Step two broke, sorry.");
    assert_eq!(calls_for(&mock, REASONING_PROMPT).len(), 2);
    let titles = titles(&events);
    assert!(titles.contains(&"Step 2 Failed".to_string()));
    assert!(!titles.contains(&"Executing Step 3".to_string()));
    assert!(!titles.contains(&"Synthesizing".to_string()));
    let handler = calls_for(&mock, ERROR_HANDLER_PROMPT);
    assert!(handler[0][1].content.contains("Step 2 (reasoning) failed"));
}

#[tokio::test]
async fn test_every_failure_still_yields_an_answer() {
    // 分类器与 error-handler 都失败：仍返回固定说明
    let cfg = config("llm");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_err(LlmError::Transport("down".into()));
    mock.push_err(LlmError::Transport("down".into()));
    let mut orch = orchestrator(&cfg, &mock);
    let (answer, _) = run(&mut orch, "how did my ads do").await;
    assert!(answer.contains("unable to verify input"));

    // 汇总阶段失败
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(plan_json(&[("a", "reasoning")]));
    mock.push_ok("A");
    mock.push_err(LlmError::Model("overloaded".into()));
    mock.push_ok("The summary could not be written.");
    let mut orch = orchestrator(&cfg, &mock);
    let (answer, _) = run(&mut orch, "how did my ads do").await;
    assert_eq!(answer, "The summary could not be written.");

    // 汇总返回空白
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(plan_json(&[("a", "reasoning")]));
    mock.push_ok("A");
    mock.push_ok("   ");
    mock.push_ok("");
    let mut orch = orchestrator(&cfg, &mock);
    let (answer, _) = run(&mut orch, "how did my ads do").await;
    assert!(!answer.trim().is_empty());
}

#[tokio::test]
async fn test_two_step_event_order() {
    let cfg = config("llm");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(PASS);
    mock.push_ok(plan_json(&[
        ("Spend by ad format", "data-query"),
        ("Explain the result", "reasoning"),
    ]));
    mock.push_ok(r#"{"groupBy": "ad_format", "metrics": ["spend", "ctr"], "sortBy": "spend", "sortOrder": "desc"}"#);
    mock.push_ok("Video leads on spend.");
    mock.push_ok("Video ads received the most spend.");
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, events) = run(&mut orch, "Which ad format got the most spend?").await;

    assert_eq!(answer, "Video ads received the most spend.");
    assert_eq!(
        titles(&events),
        vec![
            "Safety Check",
            "Planning",
            "Plan Generated",
            "Executing Step 1",
            "Step 1 Complete",
            "Executing Step 2",
            "Step 2 Complete",
            "Synthesizing",
        ]
    );
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::Completed { response }) if response == &answer
    ));

    let agents: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Progress(p) => Some(p.agent.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(agents[3], "data-query");
    assert_eq!(agents[5], "reasoning");

    let step_one = &orch.state().accumulated_results[0];
    assert!(step_one.contains("QUERY GENERATED"));
    assert!(step_one.contains("DATA RETRIEVED (mock-ads-api)"));
    assert_eq!(orch.transcript().len(), 2);
}

#[tokio::test]
async fn test_clear_resets_role_histories() {
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    for _ in 0..2 {
        mock.push_ok(plan_json(&[("a", "reasoning")]));
        mock.push_ok("A");
        mock.push_ok("Done");
    }
    let mut orch = orchestrator(&cfg, &mock);

    run(&mut orch, "first").await;
    orch.clear();
    assert!(orch.transcript().is_empty());
    run(&mut orch, "second").await;

    let planner_calls = calls_for(&mock, PLANNER_PROMPT);
    assert_eq!(planner_calls.len(), 2);
    assert_eq!(planner_calls[1].len(), 2);
    assert_eq!(planner_calls[1][1].content, "second");
}

#[tokio::test]
async fn test_stateful_keeps_history_and_stateless_drops_it() {
    for (mode, expected_len) in [(SessionMode::Stateful, 4), (SessionMode::Stateless, 2)] {
        let mut cfg = config("none");
        cfg.app.mode = mode;
        let mock = Arc::new(MockLlmClient::new());
        for _ in 0..2 {
            mock.push_ok(plan_json(&[("a", "reasoning")]));
            mock.push_ok("A");
            mock.push_ok("Done");
        }
        let mut orch = orchestrator(&cfg, &mock);

        run(&mut orch, "first").await;
        run(&mut orch, "second").await;

        let planner_calls = calls_for(&mock, PLANNER_PROMPT);
        assert_eq!(planner_calls[1].len(), expected_len, "mode {:?}", mode);
    }
}

#[tokio::test]
async fn test_cancellation_ends_request_with_notice() {
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_delayed(plan_json(&[("a", "reasoning")]), Duration::from_secs(5));
    let mut orch = orchestrator(&cfg, &mock);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let (sink, mut rx) = EventSink::channel();
    let answer = orch.handle_request("slow request", &sink, &cancel).await;
    drop(sink);

    assert_eq!(answer, CANCELLED_NOTICE);
    assert_eq!(mock.call_count(), 1);
    let mut last = None;
    while let Some(ev) = rx.recv().await {
        last = Some(ev);
    }
    assert!(matches!(
        last,
        Some(PipelineEvent::Completed { response }) if response == CANCELLED_NOTICE
    ));
    assert!(orch.transcript().is_empty());
}

#[tokio::test]
async fn test_planner_call_error_is_explained() {
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_err(LlmError::Transport("connection reset".into()));
    mock.push_ok("Planning is unavailable right now.");
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, events) = run(&mut orch, "show me ad performance").await;

    assert_eq!(answer, "Planning is unavailable right now.");
    assert_eq!(calls_for(&mock, PLANNER_PROMPT).len(), 1);
    let handler = calls_for(&mock, ERROR_HANDLER_PROMPT);
    assert_eq!(handler.len(), 1);
    assert!(handler[0][1]
        .content
        .contains("Planning failed: planner call failed"));
    let titles = titles(&events);
    assert!(!titles.contains(&"Plan Generated".to_string()));
    assert_eq!(titles.last().map(String::as_str), Some("Request Not Completed"));
    assert_eq!(orch.state().stage, PipelineStage::Failed);
}

#[tokio::test]
async fn test_unusable_query_still_reaches_synthesis() {
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(plan_json(&[
        ("Spend by ad format", "data-query"),
        ("Explain the result", "reasoning"),
    ]));
    mock.push_ok("SELECT * FROM ads");
    mock.push_ok("No usable data was retrieved.");
    mock.push_ok("I could not fetch the numbers, here is what I know.");
    let mut orch = orchestrator(&cfg, &mock);

    let (answer, events) = run(&mut orch, "Which ad format got the most spend?").await;

    assert_eq!(answer, "I could not fetch the numbers, here is what I know.");
    let results = &orch.state().accumulated_results;
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[0],
        "Step 1 Result (data-query):\nFailed to generate valid query: SELECT * FROM ads"
    );
    let titles = titles(&events);
    assert!(titles.contains(&"Step 1 Complete".to_string()));
    assert!(titles.contains(&"Synthesizing".to_string()));
    assert!(calls_for(&mock, ERROR_HANDLER_PROMPT).is_empty());

    // 第二步与汇总都能看到降级文本
    let reasoning = calls_for(&mock, REASONING_PROMPT);
    assert!(reasoning[0]
        .last()
        .unwrap()
        .content
        .contains("Failed to generate valid query"));
    let synth = calls_for(&mock, FINAL_RESPONDER_PROMPT);
    assert!(synth[0]
        .last()
        .unwrap()
        .content
        .contains("Failed to generate valid query"));
}

#[tokio::test]
async fn test_retrieval_error_aborts_the_plan() {
    let cfg = config("none");
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(plan_json(&[
        ("Spend by ad format", "data-query"),
        ("Explain the result", "reasoning"),
    ]));
    mock.push_ok(r#"{"groupBy": "ad_format", "metrics": ["spend"]}"#);
    mock.push_ok("The data warehouse is offline.");
    let mut orch = build_orchestrator(&cfg, mock.clone(), Arc::new(OfflineSource));

    let (answer, events) = run(&mut orch, "Which ad format got the most spend?").await;

    assert_eq!(answer, "The data warehouse is offline.");
    assert_eq!(calls_for(&mock, DATA_QUERY_PROMPT).len(), 1);
    assert!(calls_for(&mock, REASONING_PROMPT).is_empty());
    let titles = titles(&events);
    assert!(titles.contains(&"Step 1 Failed".to_string()));
    assert!(!titles.contains(&"Executing Step 2".to_string()));
    assert!(!titles.contains(&"Synthesizing".to_string()));
    let handler = calls_for(&mock, ERROR_HANDLER_PROMPT);
    assert!(handler[0][1].content.contains("Step 1 (data-query) failed"));
    assert!(handler[0][1].content.contains("warehouse offline"));
    assert!(orch.state().accumulated_results.is_empty());
}

#[tokio::test]
async fn test_task_without_registered_worker_fails() {
    let mock = Arc::new(MockLlmClient::new());
    mock.push_ok(plan_json(&[("Spend by ad format", "data-query")]));
    mock.push_ok("That kind of question is not supported here.");

    let llm: Arc<dyn LlmClient> = mock.clone();
    let role = |name: &str, prompt: &str| RoleClient::new(name, llm.clone(), prompt, 20);
    let mut workers = WorkerRegistry::new();
    workers.register(ReasoningWorker::new(role("reasoning", REASONING_PROMPT)));
    let mut orch = Orchestrator::new(
        GuardrailChecker::new(5000),
        PlanGenerator::new(role("planner", PLANNER_PROMPT), 3),
        workers,
        Synthesizer::new(role("final-responder", FINAL_RESPONDER_PROMPT)),
        RejectionResponder::new(role("error-handler", ERROR_HANDLER_PROMPT)),
    );

    let (answer, events) = run(&mut orch, "Which ad format got the most spend?").await;

    assert_eq!(answer, "That kind of question is not supported here.");
    assert_eq!(mock.call_count(), 2);
    assert!(titles(&events).contains(&"Step 1 Failed".to_string()));
    let handler = calls_for(&mock, ERROR_HANDLER_PROMPT);
    assert!(handler[0][1]
        .content
        .contains("no worker registered for 'data-query'"));
}

//! Headless Agent 运行时
//!
//! 供 REPL 与 HTTP API 调用的无界面逻辑：
//! create_llm_from_config 按 API Key 选择后端，build_orchestrator 为一个会话装配全部角色，
//! create_session_manager 把两者组合成会话管理器，process_message / process_message_stream
//! 对单条用户输入跑完整流水线。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{load_config, AppConfig};
use crate::core::{Orchestrator, OrchestratorFactory, SessionManager};
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient, RoleClient};
use crate::pipeline::events::{
    AGENT_ERROR_HANDLER, AGENT_FINAL_RESPONDER, AGENT_GUARDRAILS, AGENT_PLANNER,
};
use crate::pipeline::prompts::{
    load_prompt, DATA_QUERY_PROMPT, ERROR_HANDLER_PROMPT, FINAL_RESPONDER_PROMPT,
    GUARDRAILS_PROMPT, PLANNER_PROMPT, REASONING_PROMPT,
};
use crate::pipeline::responder::GENERIC_APOLOGY;
use crate::pipeline::{
    DataQueryWorker, GuardrailChecker, PipelineEvent, PlanGenerator, ProgressEvent,
    ReasoningWorker, RejectionResponder, Synthesizer, WorkerKind, WorkerRegistry,
};
use crate::tools::{DataSource, MockAdsApi};

/// 根据配置与环境变量创建 LLM 客户端
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    // 有 DeepSeek Key 或（配置为 deepseek 且仅有 OpenAI Key 时也走 DeepSeek 兼容端点）
    let use_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok()
        || (provider == "deepseek" && std::env::var("OPENAI_API_KEY").is_ok());
    let use_openai = std::env::var("OPENAI_API_KEY").is_ok() && provider != "deepseek";

    if use_deepseek {
        let client = create_deepseek_client(deepseek_model(cfg));
        tracing::info!("Using DeepSeek LLM");
        Arc::new(client)
    } else if use_openai {
        let model = cfg
            .llm
            .openai
            .model
            .clone()
            .unwrap_or_else(|| "gpt-4o-mini".to_string());
        let base = cfg.llm.base_url.as_deref();
        tracing::info!("Using OpenAI LLM ({})", model);
        Arc::new(OpenAiClient::new(
            base,
            &model,
            std::env::var("OPENAI_API_KEY").ok().as_deref(),
        ))
    } else {
        tracing::warn!("No API key set or provider unknown, using Mock LLM");
        Arc::new(MockLlmClient::new())
    }
}

/// [llm.deepseek].model 优先，其次 [llm].model；都未设置时交给 create_deepseek_client 读环境变量
fn deepseek_model(cfg: &AppConfig) -> Option<&str> {
    cfg.llm
        .deepseek
        .model
        .as_deref()
        .or(cfg.llm.model.as_deref())
}

/// 为一个会话装配 Orchestrator：每个角色一个独立历史的 RoleClient，共享同一个 LLM 后端
pub fn build_orchestrator(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    source: Arc<dyn DataSource>,
) -> Orchestrator {
    let turns = cfg.app.max_context_turns;
    let role = |name: &str, default_prompt: &str| {
        RoleClient::new(name, llm.clone(), load_prompt(name, default_prompt), turns)
    };

    let guardrails = GuardrailChecker::from_config(
        &cfg.guardrails,
        Some(role(AGENT_GUARDRAILS, GUARDRAILS_PROMPT)),
    );
    let planner = PlanGenerator::new(role(AGENT_PLANNER, PLANNER_PROMPT), cfg.planner.max_tasks);

    let mut workers = WorkerRegistry::new();
    workers.register(ReasoningWorker::new(role(
        WorkerKind::Reasoning.as_str(),
        REASONING_PROMPT,
    )));
    workers.register(DataQueryWorker::new(
        role(WorkerKind::DataQuery.as_str(), DATA_QUERY_PROMPT),
        source,
    ));

    Orchestrator::new(
        guardrails,
        planner,
        workers,
        Synthesizer::new(role(AGENT_FINAL_RESPONDER, FINAL_RESPONDER_PROMPT)),
        RejectionResponder::new(role(AGENT_ERROR_HANDLER, ERROR_HANDLER_PROMPT)),
    )
    .with_mode(cfg.app.mode)
    .with_transcript_turns(turns)
}

/// 创建会话管理器：LLM 后端与数据源在所有会话间共享，角色历史按会话隔离
pub fn create_session_manager(config_path: Option<PathBuf>) -> SessionManager {
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let llm = create_llm_from_config(&cfg);
    let source: Arc<dyn DataSource> = Arc::new(MockAdsApi::new(cfg.data.rows));
    session_manager_from_parts(cfg, llm, source)
}

/// 用给定后端创建会话管理器（测试与嵌入场景）
pub fn session_manager_from_parts(
    cfg: AppConfig,
    llm: Arc<dyn LlmClient>,
    source: Arc<dyn DataSource>,
) -> SessionManager {
    let ttl = cfg.app.session_ttl_secs;
    let factory: OrchestratorFactory =
        Arc::new(move || build_orchestrator(&cfg, llm.clone(), source.clone()));
    SessionManager::new(factory, ttl)
}

/// 处理单条用户消息（不关心进度），返回最终回复文本
pub async fn process_message(
    manager: &SessionManager,
    session_id: &str,
    user_input: &str,
) -> String {
    let rx = manager.submit(session_id, user_input).await;
    drain(rx, None).await
}

/// 流式处理单条用户消息：进度事件推送到 event_tx，返回最终回复文本
pub async fn process_message_stream(
    manager: &SessionManager,
    session_id: &str,
    user_input: &str,
    event_tx: mpsc::UnboundedSender<ProgressEvent>,
) -> String {
    let rx = manager.submit(session_id, user_input).await;
    drain(rx, Some(&event_tx)).await
}

async fn drain(
    mut rx: mpsc::UnboundedReceiver<PipelineEvent>,
    event_tx: Option<&mpsc::UnboundedSender<ProgressEvent>>,
) -> String {
    let mut response = None;
    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Progress(progress) => {
                if let Some(tx) = event_tx {
                    let _ = tx.send(progress);
                }
            }
            PipelineEvent::Completed { response: r } => response = Some(r),
        }
    }
    response.unwrap_or_else(|| {
        tracing::error!("Event channel closed without a final response");
        GENERIC_APOLOGY.to_string()
    })
}

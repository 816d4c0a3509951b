//! Orchestrator：单个会话的主控流程
//!
//! 护栏 -> 计划 -> 逐个执行任务 -> 汇总，每个阶段前后发进度事件。任一阶段的错误只在
//! `handle_request` 顶层捕获一次，交给 RejectionResponder 生成说明，因此调用方永远拿到非空文本。
//!
//! 每个 LLM / 检索调用都与 CancellationToken 赛跑，取消后请求以简短提示结束。
//! 同一个 Orchestrator 不支持并发请求（需要 `&mut self`），由 SessionManager 用 Mutex 串行化。

use std::future::Future;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::core::{ConversationState, PipelineError, PipelineStage, SynthesisError, TaskError};
use crate::memory::{ConversationMemory, Message};
use crate::pipeline::events::{
    AGENT_ERROR_HANDLER, AGENT_FINAL_RESPONDER, AGENT_GUARDRAILS, AGENT_PLANNER,
};
use crate::pipeline::{
    EventSink, GuardrailChecker, PlanGenerator, RejectionResponder, Synthesizer, WorkerRegistry,
};

pub const CANCELLED_NOTICE: &str = "The request was cancelled before it finished.";

/// 部署模式：stateless 每次请求前清空所有角色历史；stateful 保留到显式 clear
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Stateful,
    Stateless,
}

async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, PipelineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        out = fut => Ok(out),
    }
}

pub struct Orchestrator {
    guardrails: GuardrailChecker,
    planner: PlanGenerator,
    workers: WorkerRegistry,
    synthesizer: Synthesizer,
    responder: RejectionResponder,
    mode: SessionMode,
    state: ConversationState,
    /// 面向用户的问答记录（输入 + 最终回复），也作为护栏分类器的上下文
    transcript: ConversationMemory,
}

impl Orchestrator {
    pub fn new(
        guardrails: GuardrailChecker,
        planner: PlanGenerator,
        workers: WorkerRegistry,
        synthesizer: Synthesizer,
        responder: RejectionResponder,
    ) -> Self {
        Self {
            guardrails,
            planner,
            workers,
            synthesizer,
            responder,
            mode: SessionMode::default(),
            state: ConversationState::default(),
            transcript: ConversationMemory::new(20),
        }
    }

    pub fn with_mode(mut self, mode: SessionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_transcript_turns(mut self, max_turns: usize) -> Self {
        self.transcript = ConversationMemory::new(max_turns);
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn transcript(&self) -> &[Message] {
        self.transcript.messages()
    }

    /// 处理一条用户输入；永不返回错误，失败时返回说明文本。
    /// 事件通道最后一条总是 `Completed`，内容与返回值相同。
    pub async fn handle_request(
        &mut self,
        input: &str,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> String {
        tracing::info!(
            chars = input.chars().count(),
            mode = ?self.mode,
            "Starting request handling"
        );
        if self.mode == SessionMode::Stateless {
            self.clear();
        }
        self.state.begin(input);

        let answer = match self.run_pipeline(input, events, cancel).await {
            Ok(answer) => {
                self.state.stage = PipelineStage::Done;
                tracing::info!("Request completed");
                self.transcript.push_exchange(input, answer.clone());
                answer
            }
            Err(PipelineError::Cancelled) => {
                self.state.stage = PipelineStage::Failed;
                tracing::warn!("Request cancelled");
                CANCELLED_NOTICE.to_string()
            }
            Err(err) => {
                self.state.stage = PipelineStage::Failed;
                tracing::error!(stage = err.stage(), error = %err, "Execution failed");
                events.progress(
                    AGENT_ERROR_HANDLER,
                    "Request Not Completed",
                    "Preparing an explanation...",
                );
                let answer = self.responder.respond(input, &err.to_string()).await;
                self.transcript.push_exchange(input, answer.clone());
                answer
            }
        };

        events.completed(answer.clone());
        answer
    }

    async fn run_pipeline(
        &mut self,
        input: &str,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        // 1. 护栏
        self.state.stage = PipelineStage::GuardrailCheck;
        events.progress(
            AGENT_GUARDRAILS,
            "Safety Check",
            "Validating input safety and relevance...",
        );
        let verdict = until_cancelled(
            cancel,
            self.guardrails.validate_input(input, self.transcript.messages()),
        )
        .await?;
        if !verdict.passed {
            return Err(PipelineError::GuardrailViolation {
                kind: verdict.violation,
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "request did not pass input checks".to_string()),
            });
        }

        // 2. 计划
        self.state.stage = PipelineStage::Planning;
        events.progress(
            AGENT_PLANNER,
            "Planning",
            "Analyzing request and creating execution plan...",
        );
        let plan = until_cancelled(cancel, self.planner.generate_plan(input)).await??;
        events.progress(AGENT_PLANNER, "Plan Generated", plan.summary());
        let task_count = plan.tasks.len();
        self.state.current_plan = Some(plan);

        // 3. 逐个执行；任何一步失败即终止整个计划
        for index in 0..task_count {
            self.execute_task(index, events, cancel).await?;
        }

        // 4. 汇总
        self.state.stage = PipelineStage::Synthesizing;
        events.progress(
            AGENT_FINAL_RESPONDER,
            "Synthesizing",
            "Generating final answer...",
        );
        let answer = until_cancelled(
            cancel,
            self.synthesizer
                .synthesize(self.state.objective(), &self.state.accumulated_results),
        )
        .await??;

        if !self.guardrails.validate_output(&answer).passed {
            return Err(SynthesisError::EmptyOutput.into());
        }
        Ok(answer)
    }

    async fn execute_task(
        &mut self,
        index: usize,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.state.active_task_index = index;
        self.state.stage = PipelineStage::Executing(index);
        let step = index + 1;

        let (worker_kind, description) = match self.state.task_mut(index) {
            Some(task) => {
                task.start();
                (task.assigned_worker, task.description.clone())
            }
            None => return Ok(()),
        };

        tracing::info!(step, worker = %worker_kind, "Executing step");
        events.progress(
            worker_kind.as_str(),
            format!("Executing Step {step}"),
            format!("Task: {description}"),
        );

        let task_input = self.format_task_input(&description);
        let outcome = match self.workers.get(worker_kind) {
            Some(worker) => until_cancelled(cancel, worker.execute(&task_input)).await,
            None => Ok(Err(TaskError::UnknownWorker(worker_kind))),
        };

        let result = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                if let Some(task) = self.state.task_mut(index) {
                    task.fail();
                }
                events.progress(
                    worker_kind.as_str(),
                    format!("Step {step} Failed"),
                    source.to_string(),
                );
                return Err(PipelineError::TaskExecution {
                    step,
                    worker: worker_kind,
                    source,
                });
            }
            Err(cancelled) => {
                if let Some(task) = self.state.task_mut(index) {
                    task.fail();
                }
                return Err(cancelled);
            }
        };

        events.progress(
            worker_kind.as_str(),
            format!("Step {step} Complete"),
            result.clone(),
        );
        self.state
            .accumulated_results
            .push(format!("Step {step} Result ({worker_kind}):\n{result}"));
        if let Some(task) = self.state.task_mut(index) {
            task.complete(result);
        }
        Ok(())
    }

    fn format_task_input(&self, description: &str) -> String {
        format!(
            "Current Task: {}\n\nGlobal Context:\nUser Input: \"{}\"\nOverall Objective: {}\n\nPrevious Steps Output:\n{}",
            description,
            self.state.pending_input,
            self.state.objective(),
            self.state.accumulated_results.join("\n\n")
        )
    }

    /// 清空所有角色历史、问答记录与会话状态
    pub fn clear(&mut self) {
        self.planner.clear_history();
        self.workers.clear_histories();
        self.synthesizer.clear_history();
        self.transcript.clear();
        self.state = ConversationState::default();
    }
}

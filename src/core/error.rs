//! 流水线错误分类
//!
//! 护栏到汇总各阶段抛出的错误都只在 Orchestrator 顶层被捕获一次，统一交给 RejectionResponder
//! 转成面向用户的说明；本层不做任何自动重试。

use thiserror::Error;

use crate::llm::LlmError;
use crate::pipeline::{ViolationKind, WorkerKind};
use crate::tools::RetrievalError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("planner call failed: {0}")]
    Completion(LlmError),

    #[error("failed to parse plan JSON: {0}")]
    MalformedOutput(String),

    #[error("invalid plan structure: no tasks")]
    EmptyTasks,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("worker invocation failed: {0}")]
    WorkerInvocationFailed(#[from] LlmError),

    #[error("data retrieval failed: {0}")]
    RetrievalFailed(#[from] RetrievalError),

    #[error("no worker registered for '{0}'")]
    UnknownWorker(WorkerKind),

    #[error("worker returned an empty result")]
    EmptyResult,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("final responder call failed: {0}")]
    Completion(LlmError),

    #[error("final responder returned an empty answer")]
    EmptyOutput,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Guardrail Violation: {reason}")]
    GuardrailViolation {
        kind: Option<ViolationKind>,
        reason: String,
    },

    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    #[error("Step {step} ({worker}) failed: {source}")]
    TaskExecution {
        step: usize,
        worker: WorkerKind,
        #[source]
        source: TaskError,
    },

    #[error("Final response generation failed: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("Request cancelled")]
    Cancelled,
}

impl PipelineError {
    /// 日志中的阶段名
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::GuardrailViolation { .. } => "guardrail",
            PipelineError::Planning(_) => "planning",
            PipelineError::TaskExecution { .. } => "execution",
            PipelineError::Synthesis(_) => "synthesis",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_failing_phase() {
        let err = PipelineError::TaskExecution {
            step: 2,
            worker: WorkerKind::DataQuery,
            source: TaskError::RetrievalFailed(RetrievalError::Unavailable("db".into())),
        };
        assert_eq!(
            err.to_string(),
            "Step 2 (data-query) failed: data retrieval failed: data source unavailable: db"
        );
        assert_eq!(err.stage(), "execution");

        let err: PipelineError = PlanningError::EmptyTasks.into();
        assert_eq!(err.to_string(), "Planning failed: invalid plan structure: no tasks");
    }
}

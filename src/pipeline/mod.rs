//! 编排流水线的各环节：护栏、计划、worker、汇总、失败说明，以及进度事件协议

pub mod events;
pub mod guardrails;
pub mod json;
pub mod planner;
pub mod prompts;
pub mod responder;
pub mod synthesizer;
pub mod workers;

pub use events::{EventSink, PipelineEvent, ProgressEvent};
pub use guardrails::{FailurePolicy, GuardrailChecker, GuardrailVerdict, ViolationKind};
pub use json::{extract_json_object, parse_json_lenient};
pub use planner::{parse_plan, Plan, PlanGenerator, Task, TaskStatus, WorkerKind};
pub use responder::RejectionResponder;
pub use synthesizer::Synthesizer;
pub use workers::{DataQueryWorker, ReasoningWorker, Worker, WorkerRegistry};

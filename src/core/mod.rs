//! 核心编排层：错误分类、会话状态、主控流程、会话管理与取消监管

pub mod error;
pub mod orchestrator;
pub mod session;
pub mod session_supervisor;
pub mod state;

pub use error::{PipelineError, PlanningError, SynthesisError, TaskError};
pub use orchestrator::{Orchestrator, SessionMode, CANCELLED_NOTICE};
pub use session::{OrchestratorFactory, SessionId, SessionManager};
pub use session_supervisor::SessionSupervisor;
pub use state::{ConversationState, PipelineStage};

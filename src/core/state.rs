//! 会话状态与阶段
//!
//! Idle -> GuardrailCheck -> Planning -> Executing(i) -> Synthesizing -> Done，任一阶段出错进入 Failed。
//! ConversationState 每次请求开始时重置；跨请求保留的只有各角色历史（stateful 模式）。

use serde::Serialize;

use crate::pipeline::{Plan, Task};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", content = "task", rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    GuardrailCheck,
    Planning,
    /// 正在执行的任务下标（从 0 开始）
    Executing(usize),
    Synthesizing,
    Done,
    Failed,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConversationState {
    pub pending_input: String,
    pub current_plan: Option<Plan>,
    pub active_task_index: usize,
    /// 各步结果，顺序与执行顺序一致
    pub accumulated_results: Vec<String>,
    pub stage: PipelineStage,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            pending_input: String::new(),
            current_plan: None,
            active_task_index: 0,
            accumulated_results: Vec::new(),
            stage: PipelineStage::Idle,
        }
    }
}

impl ConversationState {
    /// 新请求开始：丢弃上一轮的 plan 与结果
    pub fn begin(&mut self, input: &str) {
        *self = Self {
            pending_input: input.to_string(),
            ..Self::default()
        };
    }

    pub fn task_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.current_plan.as_mut().and_then(|p| p.tasks.get_mut(index))
    }

    pub fn objective(&self) -> &str {
        self.current_plan
            .as_ref()
            .map(|p| p.objective.as_str())
            .unwrap_or_default()
    }
}

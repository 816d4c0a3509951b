//! 最终回复：目标 + 按执行顺序拼接的各步结果 -> 一次 final-responder 调用

use crate::core::SynthesisError;
use crate::llm::RoleClient;

pub fn build_synthesis_input(objective: &str, results: &[String]) -> String {
    format!(
        "Original Objective: {}\n\nExecution Results:\n{}\n\nPlease summarize this into a final answer for the user.",
        objective,
        results.join("\n\n")
    )
}

pub struct Synthesizer {
    role: RoleClient,
}

impl Synthesizer {
    pub fn new(role: RoleClient) -> Self {
        Self { role }
    }

    pub async fn synthesize(
        &self,
        objective: &str,
        results: &[String],
    ) -> Result<String, SynthesisError> {
        self.role
            .process(&build_synthesis_input(objective, results))
            .await
            .map_err(SynthesisError::Completion)
    }

    pub fn clear_history(&self) {
        self.role.clear_history();
    }
}

//! 拒绝/失败说明：把原始输入与失败原因交给 error-handler 角色生成礼貌说明
//!
//! 永不失败：LLM 出错或返回空文本时，退回固定道歉文案（仍然非空）。

use crate::llm::RoleClient;

pub const GENERIC_APOLOGY: &str = "I apologize, but I cannot process your request at this time.";

pub fn fallback_message(reason: &str) -> String {
    format!(
        "I apologize, but I cannot process your request right now ({}).",
        reason.trim_end_matches('.')
    )
}

pub struct RejectionResponder {
    role: RoleClient,
}

impl RejectionResponder {
    pub fn new(role: RoleClient) -> Self {
        Self { role }
    }

    pub async fn respond(&self, failed_input: &str, reason: &str) -> String {
        let context = format!(
            "User Input: \"{}\"\nRejection Reason: \"{}\"",
            failed_input, reason
        );
        match self.role.complete_once(&context).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                tracing::warn!("Error handler returned empty text, using generic apology");
                GENERIC_APOLOGY.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "Error handler failed, using canned apology");
                fallback_message(reason)
            }
        }
    }
}

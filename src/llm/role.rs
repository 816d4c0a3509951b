//! 角色客户端：一个逻辑角色（planner / reasoning / data-query / final-responder / guardrails / error-handler）
//! 对应一个 RoleClient，持有自己的 system prompt 与累计历史。
//!
//! - `process`：带历史调用，成功后把本轮 user + assistant 追加进历史；失败不改动历史
//! - `complete_once`：一次性调用，不读也不写历史（错误解释、分类器）
//! - `complete_with_history`：使用调用方给出的历史（分类器判断追问是否相关）

use std::sync::{Arc, Mutex, PoisonError};

use crate::llm::{LlmClient, LlmError};
use crate::memory::{ConversationMemory, Message};

pub struct RoleClient {
    name: String,
    system_prompt: String,
    llm: Arc<dyn LlmClient>,
    history: Mutex<ConversationMemory>,
}

impl RoleClient {
    pub fn new(
        name: impl Into<String>,
        llm: Arc<dyn LlmClient>,
        system_prompt: impl Into<String>,
        max_turns: usize,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            llm,
            history: Mutex::new(ConversationMemory::new(max_turns)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn process(&self, input: &str) -> Result<String, LlmError> {
        tracing::debug!(role = %self.name, "Processing input");
        let history = self.history();
        let output = self.call(&history, input).await?;
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_exchange(input, output.clone());
        Ok(output)
    }

    pub async fn complete_once(&self, input: &str) -> Result<String, LlmError> {
        self.call(&[], input).await
    }

    pub async fn complete_with_history(
        &self,
        history: &[Message],
        input: &str,
    ) -> Result<String, LlmError> {
        self.call(history, input).await
    }

    pub fn history(&self) -> Vec<Message> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .messages()
            .to_vec()
    }

    pub fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn call(&self, history: &[Message], input: &str) -> Result<String, LlmError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.system_prompt.clone()));
        messages.extend_from_slice(history);
        messages.push(Message::user(input));

        self.llm.complete(&messages).await.map_err(|e| {
            tracing::warn!(role = %self.name, error = %e, "Completion failed");
            e
        })
    }
}

impl std::fmt::Debug for RoleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleClient")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：给定完整消息序列（system + 历史 + 新一轮），
//! 返回生成文本，或以 LlmError 失败。客户端本身无状态，历史由 RoleClient 维护。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 文本生成失败：网络/传输层，或模型侧拒绝/异常
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("model returned no text")]
    EmptyResponse,
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;
}

//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按脚本依次返回预置结果（可带延迟、可为错误），脚本耗尽后回显最后一条 User 消息；
//! 同时记录每次调用收到的完整消息序列，便于断言调用次数与历史内容。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role};

struct ScriptedReply {
    result: Result<String, LlmError>,
    delay: Option<Duration>,
}

/// Mock 客户端：脚本回复 + 调用记录
#[derive(Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定文本
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mock = Self::new();
        for reply in replies {
            mock.push_ok(reply);
        }
        mock
    }

    pub fn push_ok(&self, text: impl Into<String>) -> &Self {
        self.push(Ok(text.into()), None)
    }

    pub fn push_err(&self, err: LlmError) -> &Self {
        self.push(Err(err), None)
    }

    pub fn push_delayed(&self, text: impl Into<String>, delay: Duration) -> &Self {
        self.push(Ok(text.into()), Some(delay))
    }

    fn push(&self, result: Result<String, LlmError>, delay: Option<Duration>) -> &Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(ScriptedReply { result, delay });
        }
        self
    }

    /// 所有调用收到的消息序列（按调用顺序）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(reply) => {
                if let Some(delay) = reply.delay {
                    tokio::time::sleep(delay).await;
                }
                reply.result
            }
            None => {
                let last_user = messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                Ok(format!("Echo from Mock: {}", last_user))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_then_echo() {
        let mock = MockLlmClient::scripted(["first"]);
        mock.push_err(LlmError::Transport("down".into()));

        let msgs = vec![Message::system("sys"), Message::user("hello")];
        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(
            mock.complete(&msgs).await,
            Err(LlmError::Transport("down".into()))
        );
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Echo from Mock: hello");
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.calls()[0], msgs);
    }
}

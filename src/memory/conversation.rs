//! 短期记忆：角色对话历史
//!
//! 每个 RoleClient 持有一份 ConversationMemory：成功调用后追加 user + assistant 一对消息，
//! 超过 max_turns 轮时丢弃最旧的一对；clear 后下一次调用等同于全新会话。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 按轮次保存的对话历史（一轮 = user + assistant）
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    max_turns: usize,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// 记录一次完整交互；只有成功的调用才会走到这里
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
        self.prune();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 按整轮丢弃，保证历史永远以 user 开头
    fn prune(&mut self) {
        let keep = self.max_turns * 2;
        if self.messages.len() > keep {
            let excess = self.messages.len() - keep;
            self.messages.drain(..excess + excess % 2);
        }
    }

    pub fn turns(&self) -> usize {
        self.messages.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

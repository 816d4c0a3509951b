//! 记忆层：各角色的短期对话历史

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};

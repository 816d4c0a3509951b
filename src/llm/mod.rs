//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock），以及按角色持有历史的 RoleClient

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod role;
pub mod traits;

pub use deepseek::create_deepseek_client;
pub use mock::MockLlmClient;
pub use openai::OpenAiClient;
pub use role::RoleClient;
pub use traits::{LlmClient, LlmError};

//! AdPilot - 带护栏的营销数据分析多角色流水线
//!
//! 模块划分：
//! - **agent**: 无头运行时（供 REPL / HTTP API 调用），从配置装配会话
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、会话状态、Orchestrator 主控流程、会话管理与取消
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与按角色的历史
//! - **memory**: 消息与有界对话历史
//! - **observability**: 日志初始化
//! - **pipeline**: 护栏、计划、worker、汇总、失败说明与进度事件
//! - **tools**: 数据检索（QueryObject 与模拟广告数据 API）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod pipeline;
pub mod tools;

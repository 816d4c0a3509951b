//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ADPILOT__*` 覆盖（双下划线表示嵌套，如 `ADPILOT__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::SessionMode;
use crate::pipeline::guardrails::default_unsafe_patterns;
use crate::pipeline::FailurePolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub guardrails: GuardrailsSection,
    pub planner: PlannerSection,
    pub data: DataSection,
}

/// [app] 段：应用名、部署模式、历史轮数、会话过期时间
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    #[serde(default)]
    pub mode: SessionMode,
    /// 每个角色历史保留轮数
    #[serde(default = "default_max_context_turns")]
    pub max_context_turns: usize,
    /// 空闲会话过期时间（秒）
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            mode: SessionMode::default(),
            max_context_turns: default_max_context_turns(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

fn default_max_context_turns() -> usize {
    20
}

fn default_session_ttl_secs() -> u64 {
    3600
}

/// [llm] 段：后端选择
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    /// 未设置时 DeepSeek 模型取 `DEEPSEEK_MODEL`，再退回 deepseek-chat
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmDeepSeekSection,
    #[serde(default)]
    pub openai: LlmOpenAiSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            deepseek: LlmDeepSeekSection::default(),
            openai: LlmOpenAiSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmDeepSeekSection {
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmOpenAiSection {
    pub model: Option<String>,
}

/// [guardrails] 段：本地规则与分类器失败策略
#[derive(Debug, Clone, Deserialize)]
pub struct GuardrailsSection {
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// 越狱/注入短语（大小写不敏感的子串匹配）
    #[serde(default = "default_unsafe_patterns")]
    pub unsafe_patterns: Vec<String>,
    /// llm：启用 LLM 分类器；none：只用本地规则
    #[serde(default = "default_classifier")]
    pub classifier: String,
    #[serde(default = "default_on_unparseable_verdict")]
    pub on_unparseable_verdict: FailurePolicy,
    #[serde(default = "default_on_classifier_error")]
    pub on_classifier_error: FailurePolicy,
}

impl Default for GuardrailsSection {
    fn default() -> Self {
        Self {
            max_input_chars: default_max_input_chars(),
            unsafe_patterns: default_unsafe_patterns(),
            classifier: default_classifier(),
            on_unparseable_verdict: default_on_unparseable_verdict(),
            on_classifier_error: default_on_classifier_error(),
        }
    }
}

fn default_max_input_chars() -> usize {
    5000
}

fn default_classifier() -> String {
    "llm".to_string()
}

fn default_on_unparseable_verdict() -> FailurePolicy {
    FailurePolicy::Open
}

fn default_on_classifier_error() -> FailurePolicy {
    FailurePolicy::Closed
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    /// 单个计划的任务上限，超出部分被截断
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_tasks: default_max_tasks(),
        }
    }
}

fn default_max_tasks() -> usize {
    3
}

/// [data] 段：模拟广告数据
#[derive(Debug, Clone, Deserialize)]
pub struct DataSection {
    #[serde(default = "default_rows")]
    pub rows: usize,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            rows: default_rows(),
        }
    }
}

fn default_rows() -> usize {
    10
}

/// 从 config 目录加载配置，环境变量 ADPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ADPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ADPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.mode, SessionMode::Stateful);
        assert_eq!(cfg.app.max_context_turns, 20);
        assert_eq!(cfg.guardrails.max_input_chars, 5000);
        assert_eq!(cfg.guardrails.on_unparseable_verdict, FailurePolicy::Open);
        assert_eq!(cfg.guardrails.on_classifier_error, FailurePolicy::Closed);
        assert_eq!(cfg.planner.max_tasks, 3);
        assert_eq!(cfg.data.rows, 10);
        assert!(cfg.llm.model.is_none());
    }

    #[test]
    fn test_explicit_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
mode = "stateless"

[guardrails]
max_input_chars = 200
classifier = "none"
on_classifier_error = "open"

[planner]
max_tasks = 5
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.mode, SessionMode::Stateless);
        assert_eq!(cfg.guardrails.max_input_chars, 200);
        assert_eq!(cfg.guardrails.classifier, "none");
        assert_eq!(cfg.guardrails.on_classifier_error, FailurePolicy::Open);
        assert_eq!(cfg.guardrails.on_unparseable_verdict, FailurePolicy::Open);
        assert_eq!(cfg.planner.max_tasks, 5);
    }
}

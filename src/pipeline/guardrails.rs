//! 输入/输出护栏
//!
//! 输入检查顺序：长度 -> 越狱/注入短语 -> PII（邮箱、电话、卡号）-> 可选的 LLM 分类器。
//! 前三项是纯本地规则，命中即返回，不会触发任何 LLM 调用。
//!
//! 分类器有两类失败，各自由配置决定放行（open）还是拦截（closed）：
//! - 返回内容无法解析为结构化判定：默认 open，分类器抖动不应挡住所有流量
//! - 调用本身出错（网络等）：默认 closed，原因固定为 "unable to verify input."

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::GuardrailsSection;
use crate::llm::RoleClient;
use crate::memory::Message;
use crate::pipeline::json::parse_json_lenient;

pub const UNVERIFIED_REASON: &str = "unable to verify input.";
pub const UNINTERPRETABLE_REASON: &str = "unable to interpret the input classification.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ViolationKind {
    Safety,
    Pii,
    Relevance,
    Length,
}

impl ViolationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationKind::Safety => "SAFETY",
            ViolationKind::Pii => "PII",
            ViolationKind::Relevance => "RELEVANCE",
            ViolationKind::Length => "LENGTH",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次请求内的护栏判定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardrailVerdict {
    pub passed: bool,
    pub reason: Option<String>,
    pub violation: Option<ViolationKind>,
}

impl GuardrailVerdict {
    pub fn pass() -> Self {
        Self {
            passed: true,
            reason: None,
            violation: None,
        }
    }

    pub fn reject(violation: Option<ViolationKind>, reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason.into()),
            violation,
        }
    }
}

/// 分类器失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// 视为通过
    Open,
    /// 视为拦截
    Closed,
}

#[derive(Deserialize)]
struct ClassifierVerdict {
    passed: bool,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    violation: Option<String>,
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("valid email regex")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("valid phone regex"))
}

fn card_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b").expect("valid card regex")
    })
}

pub fn default_unsafe_patterns() -> Vec<String> {
    vec![
        "ignore previous instructions".into(),
        "ignore all previous instructions".into(),
        "system override".into(),
        "forget your instructions".into(),
        "prompt injection".into(),
    ]
}

/// 护栏检查器：本地规则 + 可选 LLM 分类器
pub struct GuardrailChecker {
    max_input_chars: usize,
    unsafe_patterns: Vec<String>,
    classifier: Option<RoleClient>,
    on_unparseable_verdict: FailurePolicy,
    on_classifier_error: FailurePolicy,
}

impl GuardrailChecker {
    /// 仅本地规则（不调用 LLM）
    pub fn new(max_input_chars: usize) -> Self {
        Self {
            max_input_chars,
            unsafe_patterns: default_unsafe_patterns(),
            classifier: None,
            on_unparseable_verdict: FailurePolicy::Open,
            on_classifier_error: FailurePolicy::Closed,
        }
    }

    /// 从配置创建；`classifier` 只有在配置启用 llm 分类时才会被使用
    pub fn from_config(config: &GuardrailsSection, classifier: Option<RoleClient>) -> Self {
        let mut checker = Self::new(config.max_input_chars)
            .with_unsafe_patterns(config.unsafe_patterns.clone())
            .with_policies(config.on_unparseable_verdict, config.on_classifier_error);
        if config.classifier.eq_ignore_ascii_case("llm") {
            if let Some(c) = classifier {
                checker = checker.with_classifier(c);
            }
        }
        checker
    }

    pub fn with_classifier(mut self, classifier: RoleClient) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_unsafe_patterns(mut self, patterns: Vec<String>) -> Self {
        self.unsafe_patterns = patterns.into_iter().map(|p| p.to_lowercase()).collect();
        self
    }

    pub fn with_policies(
        mut self,
        on_unparseable_verdict: FailurePolicy,
        on_classifier_error: FailurePolicy,
    ) -> Self {
        self.on_unparseable_verdict = on_unparseable_verdict;
        self.on_classifier_error = on_classifier_error;
        self
    }

    pub async fn validate_input(&self, input: &str, history: &[Message]) -> GuardrailVerdict {
        if let Some(verdict) = self.heuristic_check(input) {
            tracing::warn!(violation = ?verdict.violation, "Guardrail blocked input");
            return verdict;
        }

        match &self.classifier {
            Some(classifier) => self.classify(classifier, input, history).await,
            None => GuardrailVerdict::pass(),
        }
    }

    /// 本地规则；命中返回拒绝判定，否则 None
    pub fn heuristic_check(&self, input: &str) -> Option<GuardrailVerdict> {
        if input.chars().count() > self.max_input_chars {
            return Some(GuardrailVerdict::reject(
                Some(ViolationKind::Length),
                format!(
                    "Input is too long. Please keep it under {} characters.",
                    self.max_input_chars
                ),
            ));
        }

        let lower = input.to_lowercase();
        if self.unsafe_patterns.iter().any(|p| lower.contains(p.as_str())) {
            return Some(GuardrailVerdict::reject(
                Some(ViolationKind::Safety),
                "Request rejected due to safety policy (potential prompt injection).",
            ));
        }

        let pii = if email_re().is_match(input) {
            Some("an email address")
        } else if phone_re().is_match(input) {
            Some("a phone number")
        } else if card_re().is_match(input) {
            Some("payment card details")
        } else {
            None
        };
        pii.map(|what| {
            GuardrailVerdict::reject(
                Some(ViolationKind::Pii),
                format!(
                    "Input contains what looks like {what}. Please remove personal information."
                ),
            )
        })
    }

    async fn classify(
        &self,
        classifier: &RoleClient,
        input: &str,
        history: &[Message],
    ) -> GuardrailVerdict {
        let raw = match classifier.complete_with_history(history, input).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    policy = ?self.on_classifier_error,
                    "Guardrail classifier call failed"
                );
                return match self.on_classifier_error {
                    FailurePolicy::Open => GuardrailVerdict::pass(),
                    FailurePolicy::Closed => GuardrailVerdict::reject(None, UNVERIFIED_REASON),
                };
            }
        };

        match parse_json_lenient::<ClassifierVerdict>(&raw) {
            Ok(v) if v.passed => GuardrailVerdict::pass(),
            Ok(v) => {
                let kind = match v.violation.as_deref().map(str::to_ascii_uppercase).as_deref() {
                    Some("SAFETY") => ViolationKind::Safety,
                    Some("PII") => ViolationKind::Pii,
                    _ => ViolationKind::Relevance,
                };
                let reason = v.reason.filter(|r| !r.trim().is_empty()).unwrap_or_else(|| {
                    "Input does not seem related to marketing or ads data analysis.".to_string()
                });
                tracing::warn!(violation = %kind, "Guardrail classifier rejected input");
                GuardrailVerdict::reject(Some(kind), reason)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    policy = ?self.on_unparseable_verdict,
                    "Unparseable guardrail verdict"
                );
                match self.on_unparseable_verdict {
                    FailurePolicy::Open => GuardrailVerdict::pass(),
                    FailurePolicy::Closed => GuardrailVerdict::reject(None, UNINTERPRETABLE_REASON),
                }
            }
        }
    }

    /// 输出侧检查：目前只拒绝空输出
    pub fn validate_output(&self, output: &str) -> GuardrailVerdict {
        if output.trim().is_empty() {
            GuardrailVerdict::reject(None, "Empty output received.")
        } else {
            GuardrailVerdict::pass()
        }
    }
}

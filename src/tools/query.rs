//! 结构化查询对象：data-query worker 让 LLM 生成的 JSON，交给 DataSource 执行
//!
//! 字段上限（1 个 groupBy、2 个 filter、6 个 metric）只在 prompt 中约束，这里只做检查与告警，不拒绝。
//! 反序列化对字段形状宽松：只要顶层是 JSON 对象就能得到 QueryObject，
//! 形状不符的字段按最接近的含义接收（单值当作列表、大小写不敏感），实在无法解释的部分丢弃并告警。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const MAX_GROUP_BY: usize = 1;
pub const MAX_FILTERS: usize = 2;
pub const MAX_METRICS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortOrder::Asc),
            "desc" | "descending" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

/// {field, operator, value} 过滤条件；value 可能是字符串也可能是数字，缺失时为 null
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    pub field: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

fn default_operator() -> String {
    "equals".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryObject {
    #[serde(
        default,
        deserialize_with = "lenient_strings",
        serialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub group_by: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_filters",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub filters: Vec<QueryFilter>,
    #[serde(
        default,
        deserialize_with = "lenient_strings",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub metrics: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort_by: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_sort_order",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort_order: Option<SortOrder>,
}

impl QueryObject {
    /// 从 JSON 对象构造；各字段都宽松解析，因此只有非对象输入会失败
    pub fn from_json_object(map: Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(map))
    }

    /// 超出 prompt 约束的地方（仅用于日志）
    pub fn advisory_violations(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.group_by.len() > MAX_GROUP_BY {
            out.push(format!(
                "{} groupBy fields (max {})",
                self.group_by.len(),
                MAX_GROUP_BY
            ));
        }
        if self.filters.len() > MAX_FILTERS {
            out.push(format!(
                "{} filters (max {})",
                self.filters.len(),
                MAX_FILTERS
            ));
        }
        if self.metrics.len() > MAX_METRICS {
            out.push(format!(
                "{} metrics (max {})",
                self.metrics.len(),
                MAX_METRICS
            ));
        }
        out
    }
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// 字符串、字符串数组、逗号分隔字符串都接受
fn lenient_strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let out = match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().filter_map(scalar_to_string).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        other => scalar_to_string(other).into_iter().collect(),
    };
    Ok(out)
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::Array(items) => items.into_iter().find_map(scalar_to_string),
        other => scalar_to_string(other),
    })
}

fn lenient_sort_order<'de, D: Deserializer<'de>>(d: D) -> Result<Option<SortOrder>, D::Error> {
    let raw = Value::deserialize(d)?;
    let order = raw.as_str().and_then(SortOrder::parse);
    if order.is_none() && !raw.is_null() {
        tracing::warn!(sort_order = %raw, "Ignoring unrecognised sortOrder");
    }
    Ok(order)
}

/// 单个对象当作一个 filter；无法解释的元素丢弃
fn lenient_filters<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<QueryFilter>, D::Error> {
    let items = match Value::deserialize(d)? {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<QueryFilter>(item.clone()) {
            Ok(filter) => Some(filter),
            Err(e) => {
                tracing::warn!(filter = %item, error = %e, "Dropping uninterpretable filter");
                None
            }
        })
        .collect())
}

/// 单个 groupBy 序列化为字符串，多个时为数组
fn one_or_many<S: Serializer>(values: &[String], s: S) -> Result<S::Ok, S::Error> {
    match values {
        [single] => s.serialize_str(single),
        many => many.serialize(s),
    }
}

//! 数据检索能力：DataSource trait 与 Mock 广告数据 API
//!
//! MockAdsApi 不访问任何后端，按查询对象生成 rows：groupBy 维度、请求的 metrics（按指标族给出合理随机值）、
//! 常用上下文维度与 group_key，并按 sortBy / sortOrder 排序。

use std::cmp::Ordering;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::tools::QueryObject;

/// 单行结果（字段名 -> 值），保持插入顺序无关紧要，序列化后交给 LLM 阅读
pub type Row = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("data source unavailable: {0}")]
    Unavailable(String),
}

/// 数据检索 trait：按查询对象返回有序 rows
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, query: &QueryObject) -> Result<Vec<Row>, RetrievalError>;
}

const AD_FORMATS: [&str; 3] = ["VIDEO", "IMAGE", "CAROUSEL"];
const CAMPAIGN_OBJECTIVES: [&str; 3] = ["SALES", "LEADS", "TRAFFIC"];
const CAMPAIGN_NAMES: [&str; 3] = ["Alpha", "Beta", "Gamma"];

/// Mock 营销数据 API
#[derive(Debug, Clone)]
pub struct MockAdsApi {
    rows: usize,
    seed: Option<u64>,
}

impl MockAdsApi {
    pub fn new(rows: usize) -> Self {
        Self { rows, seed: None }
    }

    /// 固定随机种子，测试用
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for MockAdsApi {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl DataSource for MockAdsApi {
    fn name(&self) -> &str {
        "mock-ads-api"
    }

    async fn fetch(&self, query: &QueryObject) -> Result<Vec<Row>, RetrievalError> {
        tracing::info!(
            group_by = ?query.group_by,
            metrics = query.metrics.len(),
            "Generating mock rows"
        );
        let rows = match self.seed {
            Some(seed) => generate_rows(&mut StdRng::seed_from_u64(seed), query, self.rows),
            None => generate_rows(&mut rand::rng(), query, self.rows),
        };
        Ok(rows)
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn metric_value<R: Rng>(rng: &mut R, metric: &str) -> Value {
    if metric.contains("spend") {
        Value::from(round_to(rng.random_range(0.0..5000.0), 2))
    } else if metric.contains("roas") {
        Value::from(round_to(rng.random_range(1.0..6.0), 2))
    } else if metric.contains("cpm") {
        Value::from(round_to(rng.random_range(5.0..25.0), 2))
    } else if metric.contains("ctr") {
        Value::from(round_to(rng.random_range(0.0..0.05), 4))
    } else if metric.contains("clicks") {
        Value::from(rng.random_range(0..1000u64))
    } else if metric.contains("impressions") {
        Value::from(rng.random_range(0..50_000u64))
    } else if metric == "ad_id" {
        Value::from(format!("ad_{}", rng.random_range(0..10_000u32)))
    } else if metric == "ad_name" {
        Value::from(format!("Ad_Creative_{}", rng.random_range(0..100u32)))
    } else {
        Value::from(0)
    }
}

fn group_value<R: Rng>(rng: &mut R, dimension: &str, index: usize) -> Value {
    let pick =
        |rng: &mut R, options: &[&str]| options[rng.random_range(0..options.len())].to_string();
    match dimension {
        "ad_format" => Value::from(pick(rng, &AD_FORMATS)),
        "campaign_objective" => Value::from(pick(rng, &CAMPAIGN_OBJECTIVES)),
        other => Value::from(format!("{}_{}", other, index + 1)),
    }
}

fn generate_rows<R: Rng>(rng: &mut R, query: &QueryObject, count: usize) -> Vec<Row> {
    let mut rows: Vec<Row> = (0..count)
        .map(|i| {
            let mut row = Row::new();
            for dim in &query.group_by {
                row.insert(dim.clone(), group_value(rng, dim, i));
            }
            for metric in &query.metrics {
                row.insert(metric.clone(), metric_value(rng, metric));
            }

            if !row.contains_key("ad_name") {
                row.insert("ad_name".into(), metric_value(rng, "ad_name"));
            }
            if !row.contains_key("campaign_name") {
                let name = CAMPAIGN_NAMES[rng.random_range(0..CAMPAIGN_NAMES.len())];
                row.insert("campaign_name".into(), Value::from(format!("Campaign_{name}")));
            }
            if !row.contains_key("adset_name") {
                row.insert(
                    "adset_name".into(),
                    Value::from(format!("AdSet_{}", rng.random_range(0..10u32))),
                );
            }
            if !row.contains_key("ad_status") {
                let status = if rng.random_bool(0.9) { "ACTIVE" } else { "INACTIVE" };
                row.insert("ad_status".into(), Value::from(status));
            }

            let ad_id = row
                .get("ad_id")
                .and_then(Value::as_str)
                .unwrap_or("row")
                .to_string();
            row.insert("group_key".into(), Value::from(format!("{ad_id}_{i}")));
            row
        })
        .collect();

    if let Some(sort_by) = &query.sort_by {
        let descending = query.sort_order == Some(crate::tools::SortOrder::Desc);
        let key = |row: &Row| row.get(sort_by).and_then(Value::as_f64).unwrap_or(0.0);
        rows.sort_by(|a, b| {
            let ord = key(a).partial_cmp(&key(b)).unwrap_or(Ordering::Equal);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        });
    }

    rows
}

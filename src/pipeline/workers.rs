//! 任务 worker：reasoning（纯文本推理）与 data-query（生成查询 -> 检索 -> 合并结果）
//!
//! 所有 worker 实现 Worker trait，由 WorkerRegistry 按 WorkerKind 注册与查找。
//! data-query 的两类失败处理刻意不对称：查询 JSON 解析失败返回降级文本（任务仍算成功），
//! 检索失败则作为任务失败向上传播。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::TaskError;
use crate::llm::RoleClient;
use crate::pipeline::json::parse_json_lenient;
use crate::pipeline::WorkerKind;
use crate::tools::{DataSource, QueryObject};

#[async_trait]
pub trait Worker: Send + Sync {
    fn kind(&self) -> WorkerKind;

    async fn execute(&self, task_input: &str) -> Result<String, TaskError>;

    /// 清空该 worker 持有的角色历史
    fn clear_history(&self) {}
}

/// 推理 worker：直通 reasoning 角色，只要求输出非空
pub struct ReasoningWorker {
    role: RoleClient,
}

impl ReasoningWorker {
    pub fn new(role: RoleClient) -> Self {
        Self { role }
    }
}

#[async_trait]
impl Worker for ReasoningWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Reasoning
    }

    async fn execute(&self, task_input: &str) -> Result<String, TaskError> {
        let output = self.role.process(task_input).await?;
        if output.trim().is_empty() {
            return Err(TaskError::EmptyResult);
        }
        Ok(output)
    }

    fn clear_history(&self) {
        self.role.clear_history();
    }
}

/// 数据查询 worker：LLM 生成 QueryObject，DataSource 执行，返回「查询 + 数据」文本
pub struct DataQueryWorker {
    role: RoleClient,
    source: Arc<dyn DataSource>,
}

impl DataQueryWorker {
    pub fn new(role: RoleClient, source: Arc<dyn DataSource>) -> Self {
        Self { role, source }
    }
}

#[async_trait]
impl Worker for DataQueryWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::DataQuery
    }

    async fn execute(&self, task_input: &str) -> Result<String, TaskError> {
        let raw = self.role.process(task_input).await?;

        let parsed = match parse_json_lenient::<Value>(&raw) {
            Ok(Value::Object(map)) => {
                QueryObject::from_json_object(map).map_err(|e| e.to_string())
            }
            Ok(other) => Err(format!("expected a JSON object, got {}", json_kind(&other))),
            Err(e) => Err(e.to_string()),
        };
        let query = match parsed {
            Ok(q) => q,
            Err(e) => {
                tracing::warn!(error = %e, "Data query worker produced an unparseable query");
                return Ok(format!("Failed to generate valid query: {}", raw));
            }
        };
        for violation in query.advisory_violations() {
            tracing::warn!(%violation, "Query exceeds advisory limits");
        }

        let rows = self.source.fetch(&query).await?;
        tracing::info!(source = self.source.name(), rows = rows.len(), "Data retrieved");

        let query_json =
            serde_json::to_string_pretty(&query).unwrap_or_else(|_| "{}".to_string());
        let rows_json = serde_json::to_string_pretty(&rows).unwrap_or_else(|_| "[]".to_string());
        Ok(format!(
            "QUERY GENERATED:\n{}\n\nDATA RETRIEVED ({}):\n{}",
            query_json,
            self.source.name(),
            rows_json
        ))
    }

    fn clear_history(&self) {
        self.role.clear_history();
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// worker 注册表：按 WorkerKind 存储 Arc<dyn Worker>
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<WorkerKind, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, worker: impl Worker + 'static) {
        self.register_arc(Arc::new(worker));
    }

    pub fn register_arc(&mut self, worker: Arc<dyn Worker>) {
        self.workers.insert(worker.kind(), worker);
    }

    pub fn get(&self, kind: WorkerKind) -> Option<Arc<dyn Worker>> {
        self.workers.get(&kind).cloned()
    }

    pub fn clear_histories(&self) {
        for worker in self.workers.values() {
            worker.clear_history();
        }
    }
}

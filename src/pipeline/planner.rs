//! Plan 生成：让 planner 角色把用户目标拆成有序任务列表，并解析为 Plan
//!
//! 解析规则：直接解析 / 退回第一个配平的 `{...}` 片段；两者都失败为 MalformedOutput；
//! `tasks` 缺失或为空为 EmptyTasks。任务数超过上限时截断并告警。

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::PlanningError;
use crate::llm::RoleClient;
use crate::pipeline::json::parse_json_lenient;

/// 任务可指派的 worker（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerKind {
    Reasoning,
    DataQuery,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Reasoning => "reasoning",
            WorkerKind::DataQuery => "data-query",
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub description: String,
    pub assigned_worker: WorkerKind,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, worker: WorkerKind) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assigned_worker: worker,
            status: TaskStatus::Pending,
            result: None,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    pub fn complete(&mut self, result: impl Into<String>) {
        self.status = TaskStatus::Completed;
        self.result = Some(result.into());
    }

    /// 失败的任务保留在 Plan 中，便于审计与错误说明
    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub objective: String,
    pub tasks: Vec<Task>,
}

impl Plan {
    /// "Plan Generated" 事件正文
    pub fn summary(&self) -> String {
        let tasks: Vec<String> = self
            .tasks
            .iter()
            .map(|t| format!("- {}", t.description))
            .collect();
        format!("Objective: {}\nTasks:\n{}", self.objective, tasks.join("\n"))
    }
}

#[derive(Deserialize)]
struct RawPlan {
    #[serde(default)]
    objective: String,
    #[serde(default)]
    tasks: Option<Vec<RawTask>>,
}

#[derive(Deserialize)]
struct RawTask {
    #[serde(default)]
    id: Option<Value>,
    description: String,
    #[serde(rename = "assignedAgent", alias = "assigned_agent", alias = "agent")]
    assigned_agent: WorkerKind,
}

fn normalize_id(id: Option<Value>, index: usize) -> String {
    match id {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => (index + 1).to_string(),
    }
}

/// 解析 planner 输出为 Plan；所有任务初始为 Pending
pub fn parse_plan(text: &str, max_tasks: usize) -> Result<Plan, PlanningError> {
    let raw: RawPlan = parse_json_lenient(text)
        .map_err(|e| PlanningError::MalformedOutput(e.to_string()))?;

    let mut raw_tasks = raw.tasks.unwrap_or_default();
    if raw_tasks.is_empty() {
        return Err(PlanningError::EmptyTasks);
    }
    if raw_tasks.len() > max_tasks {
        tracing::warn!(
            tasks = raw_tasks.len(),
            max_tasks,
            "Planner exceeded task cap, truncating"
        );
        raw_tasks.truncate(max_tasks);
    }

    let tasks = raw_tasks
        .into_iter()
        .enumerate()
        .map(|(i, t)| Task::new(normalize_id(t.id, i), t.description, t.assigned_agent))
        .collect();

    Ok(Plan {
        objective: raw.objective.trim().to_string(),
        tasks,
    })
}

/// Plan 生成器：持有 planner 角色（带历史）与任务上限
pub struct PlanGenerator {
    role: RoleClient,
    max_tasks: usize,
}

impl PlanGenerator {
    pub fn new(role: RoleClient, max_tasks: usize) -> Self {
        Self {
            role,
            max_tasks: max_tasks.max(1),
        }
    }

    pub async fn generate_plan(&self, objective: &str) -> Result<Plan, PlanningError> {
        let raw = self
            .role
            .process(objective)
            .await
            .map_err(PlanningError::Completion)?;

        let mut plan = parse_plan(&raw, self.max_tasks)?;
        if plan.objective.is_empty() {
            plan.objective = objective.trim().to_string();
        }
        tracing::info!(tasks = plan.tasks.len(), "Plan generated");
        Ok(plan)
    }

    pub fn clear_history(&self) {
        self.role.clear_history();
    }
}

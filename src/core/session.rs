//! 会话管理
//!
//! 每个会话拥有独立的 Orchestrator（角色历史互不共享）与取消监管。
//! 同一会话的请求经 `tokio::sync::Mutex` 串行执行；不同会话可以并发。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex, RwLock};

use crate::core::{Orchestrator, SessionSupervisor};
use crate::memory::Message;
use crate::pipeline::{EventSink, PipelineEvent};

pub type SessionId = String;

/// 新会话的 Orchestrator 构造器
pub type OrchestratorFactory = Arc<dyn Fn() -> Orchestrator + Send + Sync>;

struct SessionEntry {
    orchestrator: Arc<Mutex<Orchestrator>>,
    supervisor: Arc<SessionSupervisor>,
    last_active: Instant,
}

impl SessionEntry {
    fn is_idle(&self) -> bool {
        self.orchestrator.try_lock().is_ok()
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    factory: OrchestratorFactory,
    session_timeout: Duration,
}

impl SessionManager {
    pub fn new(factory: OrchestratorFactory, session_timeout_secs: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            factory,
            session_timeout: Duration::from_secs(session_timeout_secs),
        }
    }

    pub fn new_session_id() -> SessionId {
        format!("session_{}", uuid::Uuid::new_v4())
    }

    /// 获取或创建会话，返回其 Orchestrator 与监管者
    async fn touch(&self, session_id: &str) -> (Arc<Mutex<Orchestrator>>, Arc<SessionSupervisor>) {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::info!(session_id, "Creating session");
            SessionEntry {
                orchestrator: Arc::new(Mutex::new((self.factory)())),
                supervisor: Arc::new(SessionSupervisor::new()),
                last_active: Instant::now(),
            }
        });
        entry.last_active = Instant::now();
        (entry.orchestrator.clone(), entry.supervisor.clone())
    }

    /// 提交一条输入，立即返回该请求的事件通道。
    ///
    /// 请求在后台任务中排队执行；通道以 `Completed` 结束后关闭。
    pub async fn submit(
        &self,
        session_id: &str,
        input: impl Into<String>,
    ) -> mpsc::UnboundedReceiver<PipelineEvent> {
        let input = input.into();
        let (orchestrator, supervisor) = self.touch(session_id).await;
        let (sink, rx) = EventSink::channel();
        let session_id = session_id.to_string();

        tokio::spawn(async move {
            let mut orchestrator = orchestrator.lock().await;
            let cancel = supervisor.begin_request();
            tracing::debug!(%session_id, "Request dequeued");
            orchestrator.handle_request(&input, &sink, &cancel).await;
        });

        rx
    }

    /// 清空会话的所有历史；会等待正在执行的请求结束
    pub async fn clear(&self, session_id: &str) -> bool {
        let orchestrator = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(entry) => entry.orchestrator.clone(),
                None => return false,
            }
        };
        orchestrator.lock().await.clear();
        tracing::info!(session_id, "Session cleared");
        true
    }

    /// 取消会话中正在执行的请求
    pub async fn cancel(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        match sessions.get(session_id) {
            Some(entry) => {
                entry.supervisor.cancel();
                true
            }
            None => false,
        }
    }

    /// 会话的问答记录；会话不存在时为空
    pub async fn history(&self, session_id: &str) -> Vec<Message> {
        let orchestrator = {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                Some(entry) => entry.orchestrator.clone(),
                None => return Vec::new(),
            }
        };
        let guard = orchestrator.lock().await;
        guard.transcript().to_vec()
    }

    /// 清理过期且空闲的会话，返回清理数量
    pub async fn cleanup_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, s)| s.last_active.elapsed() > self.session_timeout && s.is_idle())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            if let Some(entry) = sessions.remove(id) {
                entry.supervisor.shutdown();
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired sessions removed");
        }
        expired.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

//! 进度事件协议：一次请求产生一条有序事件通道
//!
//! 通道里依次是若干 `Progress`，最后恰好一个 `Completed`（含最终回复）；发送端随请求结束而 drop，
//! 接收端因此自然结束，不存在需要手动注销的观察者。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub const AGENT_GUARDRAILS: &str = "guardrails";
pub const AGENT_PLANNER: &str = "planner";
pub const AGENT_FINAL_RESPONDER: &str = "final-responder";
pub const AGENT_ERROR_HANDLER: &str = "error-handler";

/// 单条进度事件，发出后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub agent: String,
    pub title: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        agent: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            title: title.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// 通道中的元素：进度或终态结果（可序列化为 NDJSON 行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Completed { response: String },
}

/// 事件发送端；未接观察者时所有发送都是空操作，接收端已断开时静默丢弃
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn progress(&self, agent: &str, title: impl Into<String>, content: impl Into<String>) {
        self.send(PipelineEvent::Progress(ProgressEvent::new(
            agent, title, content,
        )));
    }

    pub fn completed(&self, response: impl Into<String>) {
        self.send(PipelineEvent::Completed {
            response: response.into(),
        });
    }

    fn send(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_delivers_in_order_and_closes_on_drop() {
        let (sink, mut rx) = EventSink::channel();
        sink.progress(AGENT_GUARDRAILS, "Safety Check", "checking");
        sink.completed("done");
        drop(sink);

        match rx.recv().await {
            Some(PipelineEvent::Progress(ev)) => assert_eq!(ev.title, "Safety Check"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            rx.recv().await,
            Some(PipelineEvent::Completed {
                response: "done".into()
            })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_event_json_shape() {
        let ev = PipelineEvent::Progress(ProgressEvent::new("planner", "Planning", "..."));
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["agent"], "planner");
        assert!(json.get("timestamp").is_some());

        let done = serde_json::to_value(PipelineEvent::Completed {
            response: "ok".into(),
        })
        .unwrap();
        assert_eq!(done, serde_json::json!({"type": "completed", "response": "ok"}));
    }

    #[test]
    fn test_detached_sink_is_noop() {
        EventSink::default().progress("planner", "Planning", "x");
    }
}

//! 会话监管：当前请求的取消令牌
//!
//! 每个请求开始时领取一个新的子 token；`cancel` 只取消正在运行的请求，之后的请求不受影响。
//! `shutdown` 取消根 token，该会话所有现在与将来的请求都会立即结束。

use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct SessionSupervisor {
    root: CancellationToken,
    current: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        let root = CancellationToken::new();
        let current = Mutex::new(root.child_token());
        Self { root, current }
    }

    /// 为新请求创建 token，并替换掉上一个请求的 token
    pub fn begin_request(&self) -> CancellationToken {
        let token = self.root.child_token();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }

    /// 取消当前请求（客户端断开 / 用户点击停止）
    pub fn cancel(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    pub fn shutdown(&self) {
        self.root.cancel();
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_only_affects_current_request() {
        let supervisor = SessionSupervisor::new();
        let first = supervisor.begin_request();
        supervisor.cancel();
        assert!(first.is_cancelled());

        let second = supervisor.begin_request();
        assert!(!second.is_cancelled());
    }

    #[test]
    fn test_shutdown_cancels_future_requests() {
        let supervisor = SessionSupervisor::new();
        supervisor.shutdown();
        assert!(supervisor.begin_request().is_cancelled());
    }
}

//! 优雅关闭
//!
//! Ctrl+C / SIGTERM 取消根 token；网关停止接受连接，每个会话的驱动持有派生 token，
//! 随之退出并取消等待中的拉取请求。

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
    FatalError(String),
}

/// 进程级关闭信号
#[derive(Default)]
pub struct ShutdownManager {
    root: CancellationToken,
    reason: Mutex<Option<ShutdownReason>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 根 token（网关 accept 循环使用）
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// 会话驱动使用的派生 token：根 token 取消时一并取消，单独取消不影响其它会话
    pub fn session_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// 只记录第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                tracing::info!(reason = ?reason, "shutdown requested");
                *slot = Some(reason);
            }
        }
        self.root.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.root.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

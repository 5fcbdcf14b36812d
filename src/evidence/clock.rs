//! 时钟抽象
//!
//! 证据缓冲区与静默计时器只通过 Clock 读取当前时间（Unix 秒，f64），便于测试中手动推进时间。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 当前时间来源
pub trait Clock: Send + Sync {
    /// 当前时间（Unix 秒）
    fn now(&self) -> f64;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// 手动时钟：测试中用 advance / set 控制时间
#[derive(Debug, Clone)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// 共享时钟句柄
pub type SharedClock = Arc<dyn Clock>;

/// 默认系统时钟句柄
pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

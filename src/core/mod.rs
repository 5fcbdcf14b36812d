//! 核心层：错误与恢复、周期阶段与观察模式、优雅关闭

pub mod error;
pub mod recovery;
pub mod shutdown;
pub mod state;

pub use error::{RecoveryAction, TutorError};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{CyclePhase, ObservationCadence, ObservationMode};

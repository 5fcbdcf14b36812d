//! 状态定义：周期阶段与观察模式
//!
//! CyclePhase 是周期控制器的固定四阶段状态机（外加 Idle）；ObservationMode 决定会话驱动的轮询节奏。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 周期阶段：IDLE → OBSERVING → ANALYZING → DECIDING → ACTING → IDLE
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Observing,
    Analyzing,
    Deciding,
    Acting,
}

impl CyclePhase {
    /// 状态机的下一个阶段；Acting 之后回到 Idle
    pub fn next(self) -> Self {
        match self {
            CyclePhase::Idle => CyclePhase::Observing,
            CyclePhase::Observing => CyclePhase::Analyzing,
            CyclePhase::Analyzing => CyclePhase::Deciding,
            CyclePhase::Deciding => CyclePhase::Acting,
            CyclePhase::Acting => CyclePhase::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Observing => "observing",
            CyclePhase::Analyzing => "analyzing",
            CyclePhase::Deciding => "deciding",
            CyclePhase::Acting => "acting",
        }
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 观察模式（由 set_observation_mode 控制能力修改）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObservationMode {
    /// 频繁检查
    Active,
    /// 低频检查
    Passive,
    /// 干预中，持续检查
    Intervention,
}

impl ObservationMode {
    pub fn default_interval(&self) -> Duration {
        match self {
            ObservationMode::Active => Duration::from_secs(3),
            ObservationMode::Passive => Duration::from_secs(10),
            ObservationMode::Intervention => Duration::from_secs(1),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationMode::Active => "active",
            ObservationMode::Passive => "passive",
            ObservationMode::Intervention => "intervention",
        }
    }
}

impl std::fmt::Display for ObservationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 当前观察模式与轮询间隔
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObservationCadence {
    pub mode: ObservationMode,
    pub interval: Duration,
}

impl Default for ObservationCadence {
    fn default() -> Self {
        Self {
            mode: ObservationMode::Active,
            interval: Duration::from_secs(5),
        }
    }
}

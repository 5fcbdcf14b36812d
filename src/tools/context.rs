//! 能力执行上下文：一个工具循环周期内所有能力共享
//!
//! CycleScratch 收集本周期内的动作（说了什么、记了什么、结束裁决），周期结束时转成 CycleRecord。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cognitive::SessionContext;
use crate::negotiator::ResourceNegotiator;
use crate::storage::ProfileStore;
use crate::transport::Outbound;

/// end_observation_cycle 的 next_action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    Wait,
    Speak,
    /// 立即开始下一个周期
    ObserveAgain,
}

/// 控制能力给出的周期结束裁决
#[derive(Clone, Debug, PartialEq)]
pub struct CycleEnd {
    pub next_action: NextAction,
    pub reasoning: String,
}

/// speak 能力实际说出的话
#[derive(Clone, Debug, PartialEq)]
pub struct SpokenMessage {
    pub text: String,
    pub tone: String,
}

/// 本周期内的动作痕迹
#[derive(Clone, Debug, Default)]
pub struct CycleScratch {
    pub spoken: Vec<SpokenMessage>,
    pub model_notes: Vec<String>,
    pub profile_updated: bool,
    pub logged: Vec<String>,
    /// 本周期读到的转写与白板（用于组装 Observation）
    pub heard: Option<String>,
    pub seen: Option<String>,
    pub end: Option<CycleEnd>,
}

/// 能力可以访问的协作方与参数
#[derive(Clone, Debug)]
pub struct ToolSettings {
    /// get_audio_transcript 的默认回看秒数
    pub transcript_window: f64,
    pub pull_timeout: Duration,
    /// wait_for_event 允许的最长等待
    pub max_wait: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            transcript_window: 30.0,
            pull_timeout: Duration::from_secs(5),
            max_wait: Duration::from_secs(30),
        }
    }
}

/// wait_for_event 超时后仍需在执行器超时前返回结果的余量
const WAIT_HEADROOM: Duration = Duration::from_secs(1);

impl ToolSettings {
    /// 把 max_wait 收紧到单次能力调用超时之内，wait_for_event 总能先于执行器超时返回
    pub fn within_call_timeout(mut self, capability_timeout: Duration) -> Self {
        let budget = if capability_timeout > WAIT_HEADROOM * 2 {
            capability_timeout - WAIT_HEADROOM
        } else {
            capability_timeout / 2
        };
        self.max_wait = self.max_wait.min(budget);
        self
    }
}

pub struct ToolContext {
    pub session: Arc<SessionContext>,
    pub negotiator: Arc<ResourceNegotiator>,
    pub outbound: Arc<dyn Outbound>,
    pub profiles: Arc<dyn ProfileStore>,
    pub settings: ToolSettings,
    pub cycle: u64,
    scratch: Mutex<CycleScratch>,
}

impl ToolContext {
    pub fn new(
        session: Arc<SessionContext>,
        negotiator: Arc<ResourceNegotiator>,
        outbound: Arc<dyn Outbound>,
        profiles: Arc<dyn ProfileStore>,
        settings: ToolSettings,
        cycle: u64,
    ) -> Self {
        Self {
            session,
            negotiator,
            outbound,
            profiles,
            settings,
            cycle,
            scratch: Mutex::new(CycleScratch::default()),
        }
    }

    pub fn scratch(&self) -> MutexGuard<'_, CycleScratch> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cycle_end(&self) -> Option<CycleEnd> {
        self.scratch().end.clone()
    }

    pub fn into_scratch(self) -> CycleScratch {
        self.scratch.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

//! CycleRecord（内心独白）：每个周期一条、只追加的审计记录
//!
//! 失败的周期同样写入记录（failed = true + failure），保证审计轨迹完整；对学生而言等同于 wait。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Analysis, Decision, Observation};
use crate::core::CyclePhase;

/// 周期的驱动方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveMode {
    /// 固定四阶段 + 规则决策
    Rules,
    /// 推理方通过能力调用驱动
    Tools,
}

/// 失败原因
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleFailure {
    /// 失败发生的阶段
    pub phase: CyclePhase,
    /// TutorError::code()
    pub code: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub session_id: String,
    pub cycle: u64,
    pub timestamp: DateTime<Utc>,
    pub mode: DriveMode,
    pub triggers: Vec<String>,
    pub observation: Option<Observation>,
    pub analysis: Option<Analysis>,
    pub decision: Decision,
    pub failed: bool,
    pub failure: Option<CycleFailure>,
}

impl CycleRecord {
    pub fn completed(
        session_id: impl Into<String>,
        cycle: u64,
        triggers: Vec<String>,
        observation: Observation,
        analysis: Analysis,
        decision: Decision,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            cycle,
            timestamp: Utc::now(),
            mode: DriveMode::Rules,
            triggers,
            observation: Some(observation),
            analysis: Some(analysis),
            decision,
            failed: false,
            failure: None,
        }
    }

    /// 工具循环周期：没有独立的分析阶段
    pub fn from_tools(
        session_id: impl Into<String>,
        cycle: u64,
        triggers: Vec<String>,
        observation: Observation,
        decision: Decision,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            cycle,
            timestamp: Utc::now(),
            mode: DriveMode::Tools,
            triggers,
            observation: Some(observation),
            analysis: None,
            decision,
            failed: false,
            failure: None,
        }
    }

    /// 失败周期：决定固定为 wait，原因写入 reasoning
    pub fn aborted(
        session_id: impl Into<String>,
        cycle: u64,
        triggers: Vec<String>,
        failure: CycleFailure,
    ) -> Self {
        let decision = Decision::wait(format!("cycle aborted: {}", failure.reason), 0.0);
        Self {
            session_id: session_id.into(),
            cycle,
            timestamp: Utc::now(),
            mode: DriveMode::Rules,
            triggers,
            observation: None,
            analysis: None,
            decision,
            failed: true,
            failure: Some(failure),
        }
    }

    pub fn with_observation(mut self, observation: Option<Observation>) -> Self {
        self.observation = observation;
        self
    }

    pub fn with_analysis(mut self, analysis: Option<Analysis>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_mode(mut self, mode: DriveMode) -> Self {
        self.mode = mode;
        self
    }

    /// 动作执行失败：保留原决定，只标记失败
    pub fn mark_failed(mut self, failure: CycleFailure) -> Self {
        self.failed = true;
        self.failure = Some(failure);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;

    #[test]
    fn test_aborted_record_is_wait() {
        let rec = CycleRecord::aborted(
            "s",
            3,
            vec!["silence_4.0s".to_string()],
            CycleFailure {
                phase: CyclePhase::Observing,
                code: "request_timeout".to_string(),
                reason: "whiteboard timed out".to_string(),
            },
        );
        assert!(rec.failed);
        assert_eq!(rec.decision.action, ActionKind::Wait);
        assert!(rec.decision.reasoning.contains("whiteboard timed out"));
        assert!(rec.observation.is_none());
    }
}

//! 控制类能力：影响工具循环本身（等待、观察节奏、结束周期）

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{ObservationMode, TutorError};
use crate::tools::context::{CycleEnd, NextAction, ToolContext};
use crate::tools::registry::{Capability, CapabilityClass};
use crate::tools::schema::{parse_args, schema_of};

/// 条件复查间隔：静默需要按时间判断，不能只靠唤醒
const WAIT_POLL: Duration = Duration::from_millis(250);

/// set_observation_mode 接受的最长轮询间隔
const MAX_OBSERVATION_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum WaitEvent {
    Speech,
    WhiteboardChange,
    Silence,
    AnyActivity,
}

#[derive(Deserialize, schemars::JsonSchema)]
struct WaitArgs {
    /// 等待的事件；为空时等同 any_activity
    #[serde(default)]
    events: Vec<WaitEvent>,
    /// 最长等待秒数（默认 30，受服务端上限约束）
    #[serde(default)]
    timeout_seconds: Option<f64>,
    /// 至少等待的秒数，期间的事件不算
    #[serde(default)]
    min_wait_seconds: Option<f64>,
}

/// 推理方给出的秒数：非法值取默认，超过上限的按上限
fn secs(value: Option<f64>, default: Duration, cap: Duration) -> Duration {
    match value.filter(|v| v.is_finite() && *v >= 0.0) {
        Some(v) if v >= cap.as_secs_f64() => cap,
        Some(v) => Duration::try_from_secs_f64(v).unwrap_or(cap),
        None => default.min(cap),
    }
}

/// wait_for_event
pub struct WaitForEvent;

impl WaitForEvent {
    fn check(ctx: &ToolContext, events: &[WaitEvent], speech_mark: f64, board_mark: u64) -> Option<WaitEvent> {
        let spoke = ctx.session.last_speech_time() > speech_mark;
        let drew = ctx.session.whiteboard().version > board_mark;
        let silent = ctx.session.silence_duration() >= ctx.session.silence_threshold();
        events.iter().copied().find(|e| match e {
            WaitEvent::Speech => spoke,
            WaitEvent::WhiteboardChange => drew,
            WaitEvent::Silence => silent,
            WaitEvent::AnyActivity => spoke || drew,
        })
    }
}

#[async_trait]
impl Capability for WaitForEvent {
    fn name(&self) -> &str {
        "wait_for_event"
    }

    fn description(&self) -> &str {
        "Wait until the student speaks, changes the whiteboard, goes silent, or the timeout elapses. Use this instead of speaking when the student is working."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Control
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<WaitArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: WaitArgs = parse_args(self.name(), args)?;
        let events = if args.events.is_empty() {
            vec![WaitEvent::AnyActivity]
        } else {
            args.events
        };
        let timeout = secs(args.timeout_seconds, Duration::from_secs(30), ctx.settings.max_wait);
        let min_wait = secs(args.min_wait_seconds, Duration::ZERO, timeout);

        let start = tokio::time::Instant::now();
        let deadline = start + timeout;
        if !min_wait.is_zero() {
            tokio::time::sleep(min_wait).await;
        }
        let speech_mark = ctx.session.last_speech_time();
        let board_mark = ctx.session.whiteboard().version;

        let triggered = loop {
            if ctx.session.is_closed() {
                break None;
            }
            // silence 在等待开始时就满足也算
            if let Some(e) = Self::check(ctx, &events, speech_mark, board_mark) {
                break Some(e);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break None;
            }
            ctx.session
                .wait_for_activity(WAIT_POLL.min(deadline - now))
                .await;
        };

        Ok(json!({
            "triggered": triggered.is_some(),
            "event": triggered,
            "timeout_reached": triggered.is_none(),
            "wait_duration": start.elapsed().as_secs_f64(),
        }))
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct ModeArgs {
    mode: ObservationMode,
    /// 自定义轮询间隔秒数；缺省用模式默认值
    #[serde(default)]
    interval_seconds: Option<f64>,
}

/// set_observation_mode
pub struct SetObservationMode;

impl SetObservationMode {
    fn invalid(&self, reason: &str) -> TutorError {
        TutorError::InvalidArguments {
            capability: self.name().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Capability for SetObservationMode {
    fn name(&self) -> &str {
        "set_observation_mode"
    }

    fn description(&self) -> &str {
        "Change how often you observe: active (student working, default 3s), passive (student idle, 10s), intervention (just spoke, 1s)."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Control
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ModeArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: ModeArgs = parse_args(self.name(), args)?;
        let interval = match args.interval_seconds {
            Some(v) if !v.is_finite() || v <= 0.0 => {
                return Err(self.invalid("interval_seconds must be positive"));
            }
            Some(v) => match Duration::try_from_secs_f64(v) {
                Ok(d) if d <= MAX_OBSERVATION_INTERVAL => Some(d),
                _ => {
                    return Err(self.invalid(&format!(
                        "interval_seconds must be at most {}",
                        MAX_OBSERVATION_INTERVAL.as_secs()
                    )))
                }
            },
            None => None,
        };
        let cadence = ctx.session.set_cadence(args.mode, interval);
        tracing::debug!(mode = cadence.mode.as_str(), interval = ?cadence.interval, "observation cadence changed");
        Ok(json!({
            "mode": cadence.mode,
            "interval_seconds": cadence.interval.as_secs_f64(),
        }))
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct EndArgs {
    next_action: NextAction,
    /// 结束本周期的理由
    #[serde(default)]
    reasoning: String,
}

/// end_observation_cycle：工具循环看到此能力成功后停止迭代
pub struct EndObservationCycle;

#[async_trait]
impl Capability for EndObservationCycle {
    fn name(&self) -> &str {
        "end_observation_cycle"
    }

    fn description(&self) -> &str {
        "End the current observation cycle. next_action: wait (let the student work), speak (you already spoke), observe_again (start another cycle right away)."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Control
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<EndArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: EndArgs = parse_args(self.name(), args)?;
        if args.next_action == NextAction::ObserveAgain {
            ctx.session.request_continue();
        }
        ctx.scratch().end = Some(CycleEnd {
            next_action: args.next_action,
            reasoning: args.reasoning.clone(),
        });
        Ok(json!({
            "cycle_ended": true,
            "next_action": args.next_action,
            "reasoning": args.reasoning,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::harness;

    #[tokio::test]
    async fn test_end_cycle_sets_scratch_and_continue() {
        let h = harness();
        let out = EndObservationCycle
            .invoke(&h.ctx, json!({"next_action": "observe_again", "reasoning": "board changed"}))
            .await
            .unwrap();
        assert_eq!(out["cycle_ended"], true);
        assert_eq!(h.ctx.cycle_end().unwrap().next_action, NextAction::ObserveAgain);
        assert!(h.session.take_continue_request());
    }

    #[tokio::test]
    async fn test_end_cycle_rejects_unknown_action() {
        let h = harness();
        let err = EndObservationCycle
            .invoke(&h.ctx, json!({"next_action": "dance"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::InvalidArguments { .. }));
        assert!(h.ctx.cycle_end().is_none());
    }

    #[tokio::test]
    async fn test_set_mode_uses_default_interval() {
        let h = harness();
        let out = SetObservationMode
            .invoke(&h.ctx, json!({"mode": "passive"}))
            .await
            .unwrap();
        assert_eq!(out["interval_seconds"], 10.0);
        assert_eq!(h.session.cadence().mode, ObservationMode::Passive);

        let err = SetObservationMode
            .invoke(&h.ctx, json!({"mode": "active", "interval_seconds": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::InvalidArguments { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_activity() {
        let h = harness();
        let out = WaitForEvent
            .invoke(&h.ctx, json!({"events": ["speech"], "timeout_seconds": 2}))
            .await
            .unwrap();
        assert_eq!(out["triggered"], false);
        assert_eq!(out["timeout_reached"], true);
        assert!(out["wait_duration"].as_f64().unwrap() >= 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_wakes_on_speech() {
        let h = harness();
        let session = h.session.clone();
        let clock = h.clock.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            clock.advance(1.0);
            session.ingest_transcript("I think it's 12", None);
        });
        let out = WaitForEvent
            .invoke(&h.ctx, json!({"events": ["speech", "whiteboard_change"], "timeout_seconds": 10}))
            .await
            .unwrap();
        assert_eq!(out["triggered"], true);
        assert_eq!(out["event"], "speech");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_timeout_is_capped() {
        let mut h = harness();
        h.ctx.settings.max_wait = Duration::from_secs(1);
        let out = WaitForEvent
            .invoke(&h.ctx, json!({"events": ["speech"], "timeout_seconds": 600}))
            .await
            .unwrap();
        let waited = out["wait_duration"].as_f64().unwrap();
        assert!((1.0..2.0).contains(&waited));
    }

    #[tokio::test]
    async fn test_set_mode_rejects_oversized_interval() {
        let h = harness();
        for huge in [1e30, 1e6] {
            let err = SetObservationMode
                .invoke(&h.ctx, json!({"mode": "active", "interval_seconds": huge}))
                .await
                .unwrap_err();
            assert!(matches!(err, TutorError::InvalidArguments { .. }));
        }
        assert_eq!(h.session.cadence(), crate::core::ObservationCadence::default());

        let out = SetObservationMode
            .invoke(&h.ctx, json!({"mode": "passive", "interval_seconds": 300}))
            .await
            .unwrap();
        assert_eq!(out["interval_seconds"], 300.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_with_enormous_timeout_uses_cap() {
        let mut h = harness();
        h.ctx.settings.max_wait = Duration::from_secs(2);
        let out = WaitForEvent
            .invoke(
                &h.ctx,
                json!({"events": ["speech"], "timeout_seconds": 1e30, "min_wait_seconds": 1e30}),
            )
            .await
            .unwrap();
        assert_eq!(out["timeout_reached"], true);
        let waited = out["wait_duration"].as_f64().unwrap();
        assert!((2.0..3.0).contains(&waited));
    }

    #[test]
    fn test_secs_bounds() {
        let cap = Duration::from_secs(10);
        assert_eq!(secs(Some(f64::MAX), Duration::ZERO, cap), cap);
        assert_eq!(secs(Some(f64::NAN), Duration::from_secs(3), cap), Duration::from_secs(3));
        assert_eq!(secs(Some(-1.0), Duration::from_secs(30), cap), cap);
        assert_eq!(secs(Some(2.5), Duration::ZERO, cap), Duration::from_millis(2500));
    }
}

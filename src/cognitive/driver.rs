//! 会话驱动：定时器 + 新证据唤醒 → 周期
//!
//! 规则模式每个节拍调用 CycleController::tick；工具模式按观察节奏轮询，
//! 触发条件成立（或上个周期要求 observe_again）且满足最小间隔时跑一个工具循环周期。
//! 会话关闭、全局关闭或传输断开时退出。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::cognitive::controller::{CycleController, TickOutcome};
use crate::cognitive::session::SessionContext;
use crate::cognitive::triggers::TriggerDetector;
use crate::models::CycleRecord;
use crate::tool_loop::ToolLoop;

/// observe_again 之后的节奏
const OBSERVE_AGAIN_INTERVAL: Duration = Duration::from_secs(2);

/// 周期引擎
pub enum Engine {
    Rules(Arc<CycleController>),
    Tools {
        tool_loop: Arc<ToolLoop>,
        detector: Arc<TriggerDetector>,
        min_interval: Duration,
        question_window: f64,
    },
}

/// 驱动退出原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverExit {
    SessionClosed,
    Shutdown,
    /// 传输断开
    Terminated(String),
}

pub struct SessionDriver {
    session: Arc<SessionContext>,
    engine: Engine,
    tick_interval: Duration,
    shutdown: CancellationToken,
    on_record: Option<Box<dyn Fn(&CycleRecord) + Send + Sync>>,
}

impl SessionDriver {
    pub fn new(
        session: Arc<SessionContext>,
        engine: Engine,
        tick_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            session,
            engine,
            tick_interval,
            shutdown,
            on_record: None,
        }
    }

    /// 每条周期记录的回调（网关用来推送 cycle 消息）
    pub fn on_record(mut self, f: impl Fn(&CycleRecord) + Send + Sync + 'static) -> Self {
        self.on_record = Some(Box::new(f));
        self
    }

    pub async fn run(self) -> DriverExit {
        let session_id = self.session.session_id().to_string();
        tracing::info!(session = %session_id, "session driver started");
        let exit = match &self.engine {
            Engine::Rules(controller) => self.run_rules(controller).await,
            Engine::Tools {
                tool_loop,
                detector,
                min_interval,
                question_window,
            } => {
                self.run_tools(tool_loop, detector, *min_interval, *question_window)
                    .await
            }
        };
        tracing::info!(session = %session_id, exit = ?exit, "session driver stopped");
        exit
    }

    /// 等待下一个节拍或新证据；返回 None 表示继续
    async fn wait(&self, interval: Duration) -> Option<DriverExit> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Some(DriverExit::Shutdown),
            _ = self.session.wait_for_activity(interval) => {
                self.session.is_closed().then_some(DriverExit::SessionClosed)
            }
        }
    }

    async fn run_rules(&self, controller: &CycleController) -> DriverExit {
        loop {
            if let Some(exit) = self.wait(self.tick_interval).await {
                return exit;
            }
            if let TickOutcome::Cycle(record) = controller.tick().await {
                self.publish(&record);
                if is_transport_failure(&record) {
                    return self.terminate(&record);
                }
            }
        }
    }

    async fn run_tools(
        &self,
        tool_loop: &ToolLoop,
        detector: &TriggerDetector,
        min_interval: Duration,
        question_window: f64,
    ) -> DriverExit {
        let mut last_cycle: Option<Instant> = None;
        let mut observe_again = false;
        loop {
            let interval = if observe_again {
                OBSERVE_AGAIN_INTERVAL.min(self.session.cadence().interval)
            } else {
                self.session.cadence().interval
            };
            if let Some(exit) = self.wait(interval).await {
                return exit;
            }
            if last_cycle.is_some_and(|t| t.elapsed() < min_interval) {
                continue;
            }

            let continue_requested = self.session.take_continue_request();
            let (fire, reasons) = detector.check_triggers(&self.session.trigger_state(question_window));
            if !fire && !continue_requested {
                observe_again = false;
                continue;
            }
            let mut triggers: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
            if continue_requested {
                triggers.push("observe_again".to_string());
            }

            last_cycle = Some(Instant::now());
            let outcome = tool_loop.run_cycle(triggers).await;
            self.publish(&outcome.record);
            if outcome.terminate {
                return self.terminate(&outcome.record);
            }
            observe_again = self.session.take_continue_request();
            if observe_again {
                // 留给下一轮作为触发原因
                self.session.request_continue();
            }
        }
    }

    fn publish(&self, record: &CycleRecord) {
        if let Some(f) = &self.on_record {
            f(record);
        }
    }

    fn terminate(&self, record: &CycleRecord) -> DriverExit {
        let reason = record
            .failure
            .as_ref()
            .map(|f| f.reason.clone())
            .unwrap_or_default();
        tracing::warn!(session = %self.session.session_id(), reason = %reason, "transport lost, closing session");
        self.session.close();
        DriverExit::Terminated(reason)
    }
}

fn is_transport_failure(record: &CycleRecord) -> bool {
    record.failure.as_ref().is_some_and(|f| f.code == "transport")
}

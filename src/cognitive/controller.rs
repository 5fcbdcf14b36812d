//! 周期控制器：IDLE → OBSERVING → ANALYZING → DECIDING → ACTING → IDLE
//!
//! 每个会话一个控制器，同一时刻最多一个周期在运行：周期进行中到达的 tick 被推迟，
//! 在周期回到 IDLE 后补跑一次。任一阶段失败都会中止周期、回到 IDLE，
//! 会话状态不会被部分修改，失败原因写入 CycleRecord。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::actions::{ActionContext, ActionRouter};
use crate::cognitive::analyzer::Analyzer;
use crate::cognitive::composer::{ComposeRequest, ResponseComposer};
use crate::cognitive::decision::{DecisionInput, InterventionPolicy};
use crate::cognitive::events::{emit, CycleEvent, EventSender};
use crate::cognitive::session::SessionContext;
use crate::cognitive::triggers::{TriggerDetector, TriggerReason, TriggerState};
use crate::config::AppConfig;
use crate::core::{CyclePhase, TutorError};
use crate::models::{truncate_field, truncate_field_tail, Analysis, CycleFailure, CycleRecord, Decision, Observation};
use crate::negotiator::ResourceNegotiator;
use crate::storage::{ProfileStore, RecordSink};
use crate::transport::ResourceKind;

/// 生成回复时回看的转写秒数
const RESPONSE_TRANSCRIPT_WINDOW: f64 = 30.0;

/// 控制器参数（从 AppConfig 取出）
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    pub min_interval: Duration,
    pub observation_window: f64,
    pub question_window: f64,
    pub pull_whiteboard: bool,
    pub pull_timeout: Duration,
    pub whiteboard_cache_secs: f64,
}

impl ControllerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_interval: config.cycle.min_interval(),
            observation_window: config.evidence.observation_window_secs,
            question_window: config.triggers.question_window_secs,
            pull_whiteboard: config.cycle.pull_whiteboard,
            pull_timeout: config.cycle.pull_timeout(),
            whiteboard_cache_secs: config.cycle.whiteboard_cache_secs,
        }
    }
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 控制器依赖的协作方
#[derive(Clone)]
pub struct Collaborators {
    pub analyzer: Arc<dyn Analyzer>,
    pub composer: Arc<dyn ResponseComposer>,
    pub actions: Arc<dyn ActionRouter>,
    pub profiles: Arc<dyn ProfileStore>,
    pub sink: Arc<dyn RecordSink>,
    pub negotiator: Arc<ResourceNegotiator>,
}

/// tick 的结果
#[derive(Debug)]
pub enum TickOutcome {
    /// 距上个周期不足最小间隔
    RateLimited,
    /// 已有周期在运行，本次 tick 被推迟
    Deferred,
    /// 触发条件均不成立
    NoTrigger,
    /// 跑完了一个周期（可能失败）
    Cycle(Box<CycleRecord>),
}

impl TickOutcome {
    pub fn record(&self) -> Option<&CycleRecord> {
        match self {
            TickOutcome::Cycle(r) => Some(r),
            _ => None,
        }
    }
}

/// 阶段失败：附带已完成的部分
struct PhaseFailure {
    phase: CyclePhase,
    error: TutorError,
    observation: Option<Observation>,
    analysis: Option<Analysis>,
}

impl PhaseFailure {
    fn at(phase: CyclePhase, error: TutorError) -> Self {
        Self {
            phase,
            error,
            observation: None,
            analysis: None,
        }
    }
}

/// OBSERVING 阶段的产出
struct Observed {
    observation: Observation,
    whiteboard_version: u64,
    pulled_whiteboard: Option<String>,
}

pub struct CycleController {
    session: Arc<SessionContext>,
    detector: Arc<TriggerDetector>,
    policy: InterventionPolicy,
    deps: Collaborators,
    settings: ControllerSettings,
    phase: Mutex<CyclePhase>,
    in_flight: tokio::sync::Mutex<()>,
    deferred: AtomicBool,
    last_cycle_at: Mutex<Option<Instant>>,
    cycle_counter: Arc<AtomicU64>,
    events: Option<EventSender>,
}

impl CycleController {
    pub fn new(
        session: Arc<SessionContext>,
        detector: Arc<TriggerDetector>,
        policy: InterventionPolicy,
        deps: Collaborators,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            session,
            detector,
            policy,
            deps,
            settings,
            phase: Mutex::new(CyclePhase::Idle),
            in_flight: tokio::sync::Mutex::new(()),
            deferred: AtomicBool::new(false),
            last_cycle_at: Mutex::new(None),
            cycle_counter: Arc::new(AtomicU64::new(0)),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// 与工具循环共用周期编号
    pub fn with_cycle_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.cycle_counter = counter;
        self
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycle_counter.load(Ordering::SeqCst)
    }

    pub fn has_deferred_tick(&self) -> bool {
        self.deferred.load(Ordering::SeqCst)
    }

    /// 组装触发检测器的输入
    pub fn trigger_state(&self) -> TriggerState {
        self.session.trigger_state(self.settings.question_window)
    }

    /// 定时器或显式事件到来：限流、重叠检查、触发检测，必要时跑一个周期
    pub async fn tick(&self) -> TickOutcome {
        let _guard = match self.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.deferred.store(true, Ordering::SeqCst);
                tracing::debug!(session = %self.session.session_id(), "cycle in flight, tick deferred");
                return TickOutcome::Deferred;
            }
        };

        let mut outcome = self.tick_idle().await;
        // 周期进行中被推迟的 tick 合并为一次补跑
        if self.deferred.swap(false, Ordering::SeqCst) {
            if let Some(remaining) = self.rate_limit_remaining() {
                tokio::time::sleep(remaining).await;
            }
            let replay = self.tick_idle().await;
            if replay.record().is_some() {
                outcome = replay;
            }
        }
        outcome
    }

    async fn tick_idle(&self) -> TickOutcome {
        if self.rate_limit_remaining().is_some() {
            return TickOutcome::RateLimited;
        }
        let (fire, reasons) = self.detector.check_triggers(&self.trigger_state());
        if !fire {
            return TickOutcome::NoTrigger;
        }
        TickOutcome::Cycle(Box::new(self.run_cycle(reasons).await))
    }

    fn rate_limit_remaining(&self) -> Option<Duration> {
        let last = *self.last_cycle_at.lock().unwrap_or_else(PoisonError::into_inner);
        let elapsed = last?.elapsed();
        (elapsed < self.settings.min_interval).then(|| self.settings.min_interval - elapsed)
    }

    fn set_phase(&self, cycle: u64, phase: CyclePhase) {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner) = phase;
        if phase != CyclePhase::Idle {
            tracing::debug!(cycle, phase = %phase, "phase");
            emit(self.events.as_ref(), CycleEvent::PhaseChanged { cycle, phase });
        }
    }

    /// 跑一个完整周期并返回记录；记录已追加到会话并交给 RecordSink
    pub async fn run_cycle(&self, reasons: Vec<TriggerReason>) -> CycleRecord {
        *self.last_cycle_at.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let triggers: Vec<String> = reasons.iter().map(|r| r.to_string()).collect();
        let session_id = self.session.session_id().to_string();
        tracing::info!(cycle, session = %session_id, triggers = ?triggers, "cycle start");
        emit(
            self.events.as_ref(),
            CycleEvent::CycleStarted {
                cycle,
                triggers: triggers.clone(),
            },
        );

        let record = match self.run_phases(cycle, &triggers).await {
            Ok((record, observed)) => {
                self.session.commit_cycle(
                    record.clone(),
                    observed.whiteboard_version,
                    observed.pulled_whiteboard,
                );
                record
            }
            Err(failure) => {
                tracing::warn!(
                    cycle,
                    phase = %failure.phase,
                    code = failure.error.code(),
                    error = %failure.error,
                    "cycle aborted"
                );
                emit(
                    self.events.as_ref(),
                    CycleEvent::CycleFailed {
                        cycle,
                        phase: failure.phase,
                        code: failure.error.code().to_string(),
                        reason: failure.error.to_string(),
                    },
                );
                let record = CycleRecord::aborted(
                    session_id,
                    cycle,
                    triggers,
                    CycleFailure {
                        phase: failure.phase,
                        code: failure.error.code().to_string(),
                        reason: failure.error.to_string(),
                    },
                )
                .with_observation(failure.observation)
                .with_analysis(failure.analysis);
                self.session.append_record(record.clone());
                record
            }
        };
        self.set_phase(cycle, CyclePhase::Idle);

        if let Err(e) = self.deps.sink.append(&record).await {
            tracing::error!(cycle, error = %e, "failed to persist cycle record");
        }
        emit(
            self.events.as_ref(),
            CycleEvent::CycleFinished {
                cycle,
                action: record.decision.action.to_string(),
                failed: record.failed,
            },
        );
        tracing::info!(cycle, action = %record.decision.action, failed = record.failed, "cycle end");
        record
    }

    async fn run_phases(
        &self,
        cycle: u64,
        triggers: &[String],
    ) -> Result<(CycleRecord, Observed), PhaseFailure> {
        // OBSERVING
        self.set_phase(cycle, CyclePhase::Observing);
        let observed = self
            .observe(cycle, triggers)
            .await
            .map_err(|e| PhaseFailure::at(CyclePhase::Observing, e))?;
        let observation = observed.observation.clone();

        // ANALYZING
        self.set_phase(cycle, CyclePhase::Analyzing);
        let analysis = self
            .analyze(&observation)
            .await
            .map_err(|e| PhaseFailure {
                observation: Some(observation.clone()),
                ..PhaseFailure::at(CyclePhase::Analyzing, e)
            })?;
        tracing::info!(
            cycle,
            state = ?analysis.student_state,
            confidence = analysis.confidence,
            explicit_question = analysis.explicit_question,
            "analysis"
        );

        // DECIDING
        self.set_phase(cycle, CyclePhase::Deciding);
        let decision = self
            .decide(cycle, &observation, &analysis)
            .await
            .map_err(|e| PhaseFailure {
                observation: Some(observation.clone()),
                analysis: Some(analysis.clone()),
                ..PhaseFailure::at(CyclePhase::Deciding, e)
            })?;

        // ACTING
        self.set_phase(cycle, CyclePhase::Acting);
        let ctx = ActionContext {
            session_id: self.session.session_id().to_string(),
            student_id: self.session.student_id().to_string(),
            cycle,
        };
        let mut record = CycleRecord::completed(
            self.session.session_id(),
            cycle,
            triggers.to_vec(),
            observation,
            analysis,
            decision.clone(),
        );
        if let Err(e) = self.deps.actions.execute(&decision, &ctx).await {
            tracing::error!(cycle, action = %decision.action, error = %e, "action execution failed");
            record = record.mark_failed(CycleFailure {
                phase: CyclePhase::Acting,
                code: e.code().to_string(),
                reason: e.to_string(),
            });
        }
        Ok((record, observed))
    }

    async fn observe(&self, cycle: u64, triggers: &[String]) -> Result<Observed, TutorError> {
        let audio = truncate_field_tail(self.session.joined_transcript(self.settings.observation_window));
        let latest = self
            .session
            .latest_utterance(self.settings.question_window)
            .unwrap_or_default();
        let silence = self.session.silence_duration();
        let snapshot = self.session.whiteboard();

        let fresh = snapshot
            .age
            .map(|age| age <= self.settings.whiteboard_cache_secs)
            .unwrap_or(false);
        let (visual, pulled) = if fresh || !self.settings.pull_whiteboard {
            (snapshot.description.clone(), None)
        } else {
            emit(
                self.events.as_ref(),
                CycleEvent::PullIssued {
                    cycle,
                    resource: ResourceKind::Whiteboard.to_string(),
                },
            );
            let data = self
                .deps
                .negotiator
                .request(
                    ResourceKind::Whiteboard,
                    json!({"analyze": true}),
                    Some(self.settings.pull_timeout),
                )
                .await?;
            let description = truncate_field(whiteboard_description(&data));
            (description.clone(), Some(description))
        };

        let mut context = Map::new();
        context.insert("silence_duration".to_string(), json!(silence));
        context.insert(
            "is_speaking".to_string(),
            json!(silence < self.session.silence_threshold()),
        );
        context.insert("latest_utterance".to_string(), json!(latest));
        context.insert("whiteboard_changed".to_string(), json!(snapshot.changed));
        context.insert("triggers".to_string(), json!(triggers));
        if let Some(topic) = self.session.topic() {
            context.insert("topic".to_string(), json!(topic));
        }

        let observation = Observation::new(visual, audio, context);
        observation.validate()?;
        tracing::info!(
            cycle,
            visual = %preview(&observation.visual, 50),
            audio = %preview(&observation.audio, 100),
            silence,
            "observation"
        );
        Ok(Observed {
            observation,
            whiteboard_version: snapshot.version,
            pulled_whiteboard: pulled,
        })
    }

    async fn analyze(&self, observation: &Observation) -> Result<Analysis, TutorError> {
        let profile = self.deps.profiles.load(self.session.student_id()).await?.view();
        let analysis = self.deps.analyzer.analyze(observation, &profile).await?;
        Ok(analysis.normalized())
    }

    async fn decide(
        &self,
        cycle: u64,
        observation: &Observation,
        analysis: &Analysis,
    ) -> Result<Decision, TutorError> {
        // 档案在 DECIDING 开始时读取
        let profile = self.deps.profiles.load(self.session.student_id()).await?.view();
        let topic = self.session.topic();
        let silence = observation.silence_duration().unwrap_or(0.0);
        let verdict = self.policy.decide(&DecisionInput {
            analysis,
            silence_duration: silence,
            profile: &profile,
            topic: topic.as_deref(),
        });
        emit(
            self.events.as_ref(),
            CycleEvent::Decided {
                cycle,
                rule: verdict.rule.to_string(),
                action: verdict.action.to_string(),
                reasoning: verdict.reasoning.clone(),
            },
        );

        let text = if verdict.action == crate::models::ActionKind::Speak {
            let transcript = self.session.joined_transcript(RESPONSE_TRANSCRIPT_WINDOW);
            Some(
                self.deps
                    .composer
                    .compose(&ComposeRequest {
                        verdict: &verdict,
                        analysis,
                        transcript: &transcript,
                        topic: topic.as_deref(),
                    })
                    .await,
            )
        } else {
            None
        };
        let decision = verdict.into_decision(text);
        tracing::info!(cycle, action = %decision.action, reasoning = %decision.reasoning, "decision");
        Ok(decision)
    }
}

/// 白板响应里的描述字段（客户端可能用 description / analysis / text）
fn whiteboard_description(data: &Value) -> String {
    ["description", "analysis", "text"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| data.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn preview(s: &str, max: usize) -> String {
    if s.is_empty() {
        return "(none)".to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ClientActionRouter;
    use crate::cognitive::analyzer::HeuristicAnalyzer;
    use crate::cognitive::composer::TemplateComposer;
    use crate::config::{EvidenceSection, TriggersSection};
    use crate::evidence::ManualClock;
    use crate::models::{ActionKind, StudentState};
    use crate::storage::{MemoryProfileStore, MemoryRecordSink};
    use crate::transport::{RecordingOutbound, ResponseEnvelope};
    use async_trait::async_trait;

    struct Fixture {
        clock: Arc<ManualClock>,
        session: Arc<SessionContext>,
        out: Arc<RecordingOutbound>,
        sink: Arc<MemoryRecordSink>,
        negotiator: Arc<ResourceNegotiator>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1000.0));
        let session = Arc::new(SessionContext::new(
            "sess",
            "s1",
            Some("algebra".to_string()),
            &EvidenceSection::default(),
            clock.clone(),
        ));
        let out = Arc::new(RecordingOutbound::new());
        let negotiator = Arc::new(ResourceNegotiator::new(out.clone(), Duration::from_secs(5)));
        Fixture {
            clock,
            session,
            out,
            sink: Arc::new(MemoryRecordSink::default()),
            negotiator,
        }
    }

    fn controller_with(f: &Fixture, analyzer: Arc<dyn Analyzer>, settings: ControllerSettings) -> CycleController {
        let detector = Arc::new(TriggerDetector::new(&TriggersSection::default()).unwrap());
        let profiles = Arc::new(MemoryProfileStore::default());
        CycleController::new(
            f.session.clone(),
            detector,
            InterventionPolicy::default(),
            Collaborators {
                analyzer,
                composer: Arc::new(TemplateComposer),
                actions: Arc::new(ClientActionRouter::new(f.out.clone(), profiles.clone())),
                profiles,
                sink: f.sink.clone(),
                negotiator: f.negotiator.clone(),
            },
            settings,
        )
    }

    fn no_pull() -> ControllerSettings {
        ControllerSettings {
            pull_whiteboard: false,
            min_interval: Duration::ZERO,
            ..ControllerSettings::default()
        }
    }

    fn heuristic() -> Arc<dyn Analyzer> {
        Arc::new(HeuristicAnalyzer::new(Arc::new(
            TriggerDetector::new(&TriggersSection::default()).unwrap(),
        )))
    }

    /// 固定返回同一个 Analysis
    struct FixedAnalyzer(Analysis);

    #[async_trait]
    impl Analyzer for FixedAnalyzer {
        async fn analyze(
            &self,
            _observation: &Observation,
            _profile: &crate::models::ProfileView,
        ) -> Result<Analysis, TutorError> {
            Ok(self.0.clone())
        }
    }

    /// 第一次调用时阻塞，直到收到放行信号
    struct GateAnalyzer {
        gate: tokio::sync::Notify,
        entered: tokio::sync::Notify,
    }

    #[async_trait]
    impl Analyzer for GateAnalyzer {
        async fn analyze(
            &self,
            _observation: &Observation,
            _profile: &crate::models::ProfileView,
        ) -> Result<Analysis, TutorError> {
            self.entered.notify_one();
            self.gate.notified().await;
            Ok(Analysis::new(StudentState::Engaged, 0.9))
        }
    }

    #[tokio::test]
    async fn test_question_cycle_speaks_and_records() {
        let f = fixture();
        let c = controller_with(&f, heuristic(), no_pull());
        f.session.ingest_transcript("How do I solve for x?", None);

        let outcome = c.tick().await;
        let record = outcome.record().unwrap();
        assert_eq!(record.decision.action, ActionKind::Speak);
        assert!(record.triggers.contains(&"explicit_question".to_string()));
        assert_eq!(f.out.sent_of_type("ai_response").len(), 1);
        assert_eq!(f.session.record_count(), 1);
        assert_eq!(f.sink.records().len(), 1);
        assert_eq!(c.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_no_trigger_stays_idle() {
        let f = fixture();
        let c = controller_with(&f, heuristic(), no_pull());
        // 先跑掉 initial_analysis
        let first = c.tick().await;
        assert!(first.record().is_some());
        f.session.ingest_transcript("carry the one", None);
        assert!(matches!(c.tick().await, TickOutcome::NoTrigger));
        assert_eq!(f.session.record_count(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit() {
        let f = fixture();
        let settings = ControllerSettings {
            min_interval: Duration::from_secs(60),
            ..no_pull()
        };
        let c = controller_with(&f, heuristic(), settings);
        assert!(c.tick().await.record().is_some());
        f.session.ingest_transcript("what is a fraction?", None);
        assert!(matches!(c.tick().await, TickOutcome::RateLimited));
    }

    #[tokio::test]
    async fn test_pull_timeout_aborts_without_mutation() {
        let f = fixture();
        let settings = ControllerSettings {
            pull_timeout: Duration::from_millis(20),
            ..ControllerSettings {
                pull_whiteboard: true,
                ..no_pull()
            }
        };
        let c = controller_with(&f, heuristic(), settings);
        f.session.update_whiteboard("old", true);
        f.clock.advance(60.0);

        let record = c.tick().await.record().cloned().unwrap();
        assert!(record.failed);
        assert_eq!(record.decision.action, ActionKind::Wait);
        let failure = record.failure.unwrap();
        assert_eq!(failure.phase, CyclePhase::Observing);
        assert_eq!(failure.code, "request_timeout");
        // 白板变化未被确认，下个周期仍能看到
        assert!(f.session.whiteboard().changed);
        assert_eq!(f.negotiator.pending_count(), 0);
        assert!(f.out.sent_of_type("ai_response").is_empty());
    }

    #[tokio::test]
    async fn test_oversized_whiteboard_push_still_completes_cycle() {
        let f = fixture();
        let c = controller_with(&f, heuristic(), no_pull());
        f.session.update_whiteboard("7".repeat(40_000), true);

        let record = c.tick().await.record().cloned().unwrap();
        assert!(!record.failed);
        assert_eq!(f.session.record_count(), 1);
        // 变化已确认，不会再次触发 whiteboard_change
        assert!(!f.session.whiteboard().changed);
    }

    #[tokio::test]
    async fn test_pulled_whiteboard_feeds_observation() {
        let f = fixture();
        let settings = ControllerSettings {
            pull_whiteboard: true,
            ..no_pull()
        };
        let c = Arc::new(controller_with(&f, heuristic(), settings));
        let c2 = c.clone();
        let handle = tokio::spawn(async move { c2.tick().await });
        while f.out.sent_of_type("request").is_empty() {
            tokio::task::yield_now().await;
        }
        let req = f.out.sent_of_type("request").remove(0);
        assert_eq!(req["resource"], "whiteboard");
        f.negotiator.resolve(ResponseEnvelope {
            request_id: req["request_id"].as_str().unwrap().to_string(),
            data: serde_json::json!({"description": "2x + 3 = 7"}),
        });
        let outcome = handle.await.unwrap();
        let record = outcome.record().unwrap();
        assert!(!record.failed);
        assert_eq!(record.observation.as_ref().unwrap().visual, "2x + 3 = 7");
        assert_eq!(f.session.whiteboard().description, "2x + 3 = 7");
    }

    #[tokio::test]
    async fn test_minor_error_updates_model_silently() {
        let f = fixture();
        let analysis = Analysis::new(StudentState::Engaged, 0.9)
            .with_error(crate::models::ErrorType::Computational, crate::models::ErrorSeverity::Minor);
        let c = controller_with(&f, Arc::new(FixedAnalyzer(analysis)), no_pull());
        let record = c.tick().await.record().cloned().unwrap();
        assert_eq!(record.decision.action, ActionKind::UpdateModel);
        assert!(f.out.sent().is_empty());
    }

    #[tokio::test]
    async fn test_action_failure_recorded_session_continues() {
        let f = fixture();
        f.out.set_failing(true);
        let c = controller_with(&f, heuristic(), no_pull());
        f.session.ingest_transcript("can you help me?", None);
        let record = c.tick().await.record().cloned().unwrap();
        assert!(record.failed);
        assert_eq!(record.decision.action, ActionKind::Speak);
        assert_eq!(record.failure.unwrap().code, "action_execution_failure");

        f.out.set_failing(false);
        f.session.ingest_transcript("what is 3 times 4?", None);
        let record = c.tick().await.record().cloned().unwrap();
        assert!(!record.failed);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_deferred_and_replayed() {
        let f = fixture();
        let gate = Arc::new(GateAnalyzer {
            gate: tokio::sync::Notify::new(),
            entered: tokio::sync::Notify::new(),
        });
        let c = Arc::new(controller_with(&f, gate.clone(), no_pull()));

        let c1 = c.clone();
        let first = tokio::spawn(async move { c1.tick().await });
        gate.entered.notified().await;
        assert_eq!(c.phase(), CyclePhase::Analyzing);

        f.session.ingest_transcript("is that right?", None);
        assert!(matches!(c.tick().await, TickOutcome::Deferred));
        assert!(c.has_deferred_tick());

        // 放行第一个周期，补跑的周期再放行一次
        gate.gate.notify_one();
        gate.entered.notified().await;
        gate.gate.notify_one();
        let outcome = first.await.unwrap();
        assert_eq!(outcome.record().unwrap().cycle, 2);
        assert_eq!(f.session.record_count(), 2);
        assert!(!c.has_deferred_tick());
        let cycles: Vec<u64> = f.session.records().iter().map(|r| r.cycle).collect();
        assert_eq!(cycles, vec![1, 2]);
    }
}

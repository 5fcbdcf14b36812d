//! 工具执行循环
//!
//! 推理方每轮请求一次能力调用 -> 按名分发（单次超时）-> 结果回写 -> 下一轮；
//! end_observation_cycle 成功后停止，达到 max_iterations 则强制 wait。
//! 未注册的能力、参数错误、拉取超时都以结构化错误负载回写给推理方，只有传输断开或取消会中止周期。
//! 周期结果转成 CycleRecord（mode = tools），与规则驱动的周期共用记录与存储。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::cognitive::events::{emit, CycleEvent, EventSender};
use crate::cognitive::SessionContext;
use crate::config::AppConfig;
use crate::core::{CyclePhase, RecoveryAction, RecoveryEngine, TutorError};
use crate::llm::{LlmClient, Message};
use crate::models::{CycleFailure, CycleRecord, Decision, Observation};
use crate::negotiator::ResourceNegotiator;
use crate::storage::{ProfileStore, RecordSink};
use crate::tool_loop::planner::{parse_reasoner_output, ReasonerOutput};
use crate::tools::{
    capability_call_schema_json, CapabilityClass, CapabilityExecutor, CapabilityRegistry,
    CycleScratch, NextAction, ToolContext, ToolSettings,
};
use crate::transport::Outbound;

/// 能力结果预览最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

const FORMAT_REMINDER: &str = "Reply with exactly one capability call as JSON: {\"tool\": \"<name>\", \"args\": {...}}. \
     Call end_observation_cycle when you are done.";

/// 工具循环参数
#[derive(Clone, Debug)]
pub struct ToolLoopSettings {
    pub max_iterations: usize,
    pub capability_timeout: Duration,
    /// 带入下一周期的历史消息条数
    pub history_messages: usize,
    /// 周期开始时快照转写的窗口（秒）
    pub observation_window: f64,
    pub tools: ToolSettings,
}

impl ToolLoopSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_iterations: config.tool_loop.max_iterations.max(1),
            capability_timeout: Duration::from_secs(config.tool_loop.capability_timeout_secs),
            history_messages: config.tool_loop.history_messages,
            observation_window: config.evidence.observation_window_secs,
            tools: ToolSettings {
                transcript_window: config.evidence.transcript_retention_secs,
                pull_timeout: config.cycle.pull_timeout(),
                ..ToolSettings::default()
            },
        }
    }
}

impl Default for ToolLoopSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// 能力执行需要的协作方
#[derive(Clone)]
pub struct ToolCollaborators {
    pub negotiator: Arc<ResourceNegotiator>,
    pub outbound: Arc<dyn Outbound>,
    pub profiles: Arc<dyn ProfileStore>,
    pub sink: Arc<dyn RecordSink>,
}

/// 一个工具循环周期的结果
#[derive(Debug)]
pub struct ToolCycleOutcome {
    pub record: CycleRecord,
    pub iterations: usize,
    /// end_observation_cycle 给出的下一步
    pub next_action: Option<NextAction>,
    /// 传输断开：会话应当结束
    pub terminate: bool,
}

/// 循环结束的方式
enum LoopExit {
    Ended,
    Capped,
    Aborted {
        phase: CyclePhase,
        error: TutorError,
        terminate: bool,
    },
}

pub struct ToolLoop {
    session: Arc<SessionContext>,
    llm: Arc<dyn LlmClient>,
    executor: CapabilityExecutor,
    recovery: RecoveryEngine,
    deps: ToolCollaborators,
    settings: ToolLoopSettings,
    system_prompt: String,
    history: Mutex<Vec<Message>>,
    cycle_counter: Arc<AtomicU64>,
    events: Option<EventSender>,
}

impl ToolLoop {
    pub fn new(
        session: Arc<SessionContext>,
        llm: Arc<dyn LlmClient>,
        registry: CapabilityRegistry,
        deps: ToolCollaborators,
        mut settings: ToolLoopSettings,
    ) -> Self {
        settings.tools = settings.tools.within_call_timeout(settings.capability_timeout);
        let system_prompt = build_system_prompt(&registry);
        Self {
            session,
            llm,
            executor: CapabilityExecutor::new(registry, settings.capability_timeout),
            recovery: RecoveryEngine::new(),
            deps,
            settings,
            system_prompt,
            history: Mutex::new(Vec::new()),
            cycle_counter: Arc::new(AtomicU64::new(0)),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: EventSender) -> Self {
        self.events = Some(tx);
        self
    }

    /// 与规则控制器共用周期编号
    pub fn with_cycle_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.cycle_counter = counter;
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn settings(&self) -> &ToolLoopSettings {
        &self.settings
    }

    pub fn executor(&self) -> &CapabilityExecutor {
        &self.executor
    }

    /// 当前保留的历史消息
    pub fn history(&self) -> Vec<Message> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 跑一个工具循环周期：记录已追加到会话并交给 RecordSink
    pub async fn run_cycle(&self, triggers: Vec<String>) -> ToolCycleOutcome {
        let cycle = self.cycle_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = self.session.session_id().to_string();
        tracing::info!(cycle, session = %session_id, triggers = ?triggers, "tool cycle start");
        emit(
            self.events.as_ref(),
            CycleEvent::CycleStarted {
                cycle,
                triggers: triggers.clone(),
            },
        );

        let board_version = self.session.whiteboard().version;
        let snapshot = self.snapshot(&triggers);
        let ctx = ToolContext::new(
            Arc::clone(&self.session),
            Arc::clone(&self.deps.negotiator),
            Arc::clone(&self.deps.outbound),
            Arc::clone(&self.deps.profiles),
            self.settings.tools.clone(),
            cycle,
        );

        let mut messages = self.history();
        messages.push(Message::user(self.cycle_prompt(cycle, &triggers)));
        let (exit, iterations) = self.iterate(&ctx, cycle, &mut messages).await;
        self.keep_history(messages);

        let scratch = ctx.into_scratch();
        let next_action = scratch.end.as_ref().map(|e| e.next_action);
        let observation = observation_from(snapshot, &scratch);
        let decision = decision_from(&scratch, &exit, self.settings.max_iterations);
        let mut record = CycleRecord::from_tools(session_id, cycle, triggers, observation, decision);

        let mut terminate = false;
        match exit {
            LoopExit::Ended => self.session.commit_cycle(record.clone(), board_version, None),
            LoopExit::Capped => {
                let error = TutorError::IterationCapExceeded(self.settings.max_iterations);
                tracing::warn!(cycle, error = %error, "tool loop hit iteration cap");
                record = record.mark_failed(failure(CyclePhase::Deciding, &error));
                self.session.commit_cycle(record.clone(), board_version, None);
            }
            LoopExit::Aborted {
                phase,
                error,
                terminate: t,
            } => {
                terminate = t;
                tracing::warn!(cycle, phase = %phase, code = error.code(), error = %error, "tool cycle aborted");
                emit(
                    self.events.as_ref(),
                    CycleEvent::CycleFailed {
                        cycle,
                        phase,
                        code: error.code().to_string(),
                        reason: error.to_string(),
                    },
                );
                record = record.mark_failed(failure(phase, &error));
                self.session.append_record(record.clone());
            }
        }

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
        tracing::info!(cycle, action = %record.decision.action, failed = record.failed, iterations, "tool cycle end");
        ToolCycleOutcome {
            record,
            iterations,
            next_action,
            terminate,
        }
    }

    async fn iterate(
        &self,
        ctx: &ToolContext,
        cycle: u64,
        messages: &mut Vec<Message>,
    ) -> (LoopExit, usize) {
        for iteration in 1..=self.settings.max_iterations {
            if self.session.is_closed() {
                let error = TutorError::RequestCancelled("session closed".to_string());
                return (abort(CyclePhase::Deciding, error, false), iteration - 1);
            }

            let mut full = Vec::with_capacity(messages.len() + 1);
            full.push(Message::system(self.system_prompt.clone()));
            full.extend(messages.iter().cloned());
            let output = match self.llm.complete(&full).await {
                Ok(o) => o,
                Err(e) => return (abort(CyclePhase::Deciding, TutorError::from(e), false), iteration),
            };
            messages.push(Message::assistant(output.clone()));

            let call = match parse_reasoner_output(&output) {
                ReasonerOutput::Call(call) => call,
                ReasonerOutput::Text(text) => {
                    tracing::debug!(cycle, iteration, text = %preview(&text), "reasoner replied without a capability call");
                    messages.push(Message::user(FORMAT_REMINDER));
                    continue;
                }
            };

            emit(
                self.events.as_ref(),
                CycleEvent::CapabilityCall {
                    cycle,
                    capability: call.tool.clone(),
                    args: call.args.clone(),
                },
            );
            let class = self.executor.get(&call.tool).map(|c| c.class());
            match self.executor.execute(ctx, &call.tool, call.args).await {
                Ok(result) => {
                    let text = result.to_string();
                    emit(
                        self.events.as_ref(),
                        CycleEvent::CapabilityResult {
                            cycle,
                            capability: call.tool.clone(),
                            ok: true,
                            preview: preview(&text),
                        },
                    );
                    messages.push(Message::user(format!("Result of {}: {}", call.tool, text)));
                }
                Err(error) => {
                    emit(
                        self.events.as_ref(),
                        CycleEvent::CapabilityResult {
                            cycle,
                            capability: call.tool.clone(),
                            ok: false,
                            preview: error.to_string(),
                        },
                    );
                    let phase = phase_of(class);
                    match self.recovery.handle(&error) {
                        RecoveryAction::ReportToReasoner(hint) => {
                            messages.push(Message::user(error_feedback(&call.tool, &error, &hint)));
                        }
                        // 拉取超时是推理方可以应对的观察结果
                        RecoveryAction::AbortCycle if matches!(error, TutorError::RequestTimeout { .. }) => {
                            let hint = format!("The client did not provide {} in time", call.tool);
                            messages.push(Message::user(error_feedback(&call.tool, &error, &hint)));
                        }
                        RecoveryAction::AbortCycle => return (abort(phase, error, false), iteration),
                        RecoveryAction::TerminateSession => return (abort(phase, error, true), iteration),
                        RecoveryAction::ForceWait => return (LoopExit::Capped, iteration),
                    }
                }
            }

            if ctx.cycle_end().is_some() {
                return (LoopExit::Ended, iteration);
            }
        }
        (LoopExit::Capped, self.settings.max_iterations)
    }

    /// 周期开始时的本地证据快照（不拉取）
    fn snapshot(&self, triggers: &[String]) -> Observation {
        let board = self.session.whiteboard();
        let mut context = Map::new();
        context.insert("silence_duration".into(), json!(self.session.silence_duration()));
        context.insert("whiteboard_changed".into(), json!(board.changed));
        context.insert("triggers".into(), json!(triggers));
        context.insert("observation_mode".into(), json!(self.session.cadence().mode));
        if let Some(topic) = self.session.topic() {
            context.insert("topic".into(), json!(topic));
        }
        Observation::new(
            board.description,
            self.session.joined_transcript(self.settings.observation_window),
            context,
        )
    }

    fn cycle_prompt(&self, cycle: u64, triggers: &[String]) -> String {
        let board = self.session.whiteboard();
        let cadence = self.session.cadence();
        let silence = self.session.silence_duration();
        let speaking = silence < self.session.silence_threshold();
        format!(
            "Observation cycle {cycle}.\n\
             Triggers: {}\n\
             Topic: {}\n\
             Student speaking: {speaking} (silent for {silence:.1}s)\n\
             Whiteboard changed since last cycle: {}\n\
             Observation mode: {} every {:.1}s\n\n\
             Gather what you need, act only if it helps the student, then call end_observation_cycle.",
            if triggers.is_empty() { "none".to_string() } else { triggers.join(", ") },
            self.session.topic().unwrap_or_else(|| "unknown".to_string()),
            board.changed,
            cadence.mode,
            cadence.interval.as_secs_f64(),
        )
    }

    fn keep_history(&self, messages: Vec<Message>) {
        let n = self.settings.history_messages;
        let skip = messages.len().saturating_sub(n);
        *self.history.lock().unwrap_or_else(PoisonError::into_inner) =
            messages.into_iter().skip(skip).collect();
    }
}

/// 推理方的 system prompt：角色、调用格式与全部能力
pub fn build_system_prompt(registry: &CapabilityRegistry) -> String {
    format!(
        "You are a patient tutor silently observing a student who works on a shared whiteboard and thinks out loud.\n\
         Most of the time the right move is to keep watching. Speak only when the student asks a question, \
         is clearly stuck, or makes an error worth pointing out; prefer questions over answers.\n\n\
         Each turn, output exactly one capability call as JSON:\n\
         {{\"tool\": \"<name>\", \"args\": {{...}}}}\n\
         Call format schema:\n{}\n\n\
         Capabilities:\n{}\n\
         Always finish a cycle with end_observation_cycle.",
        capability_call_schema_json(),
        registry.prompt_section(),
    )
}

fn abort(phase: CyclePhase, error: TutorError, terminate: bool) -> LoopExit {
    LoopExit::Aborted {
        phase,
        error,
        terminate,
    }
}

fn phase_of(class: Option<CapabilityClass>) -> CyclePhase {
    match class {
        Some(CapabilityClass::Observation) => CyclePhase::Observing,
        Some(CapabilityClass::Action) => CyclePhase::Acting,
        Some(CapabilityClass::Control) | None => CyclePhase::Deciding,
    }
}

fn failure(phase: CyclePhase, error: &TutorError) -> CycleFailure {
    CycleFailure {
        phase,
        code: error.code().to_string(),
        reason: error.to_string(),
    }
}

fn error_feedback(capability: &str, error: &TutorError, hint: &str) -> String {
    let mut payload = error.to_payload();
    payload["capability"] = Value::String(capability.to_string());
    payload["hint"] = Value::String(hint.to_string());
    format!("Error from {capability}: {payload}")
}

fn observation_from(mut snapshot: Observation, scratch: &CycleScratch) -> Observation {
    if let Some(seen) = scratch.seen.as_ref().filter(|s| !s.is_empty()) {
        snapshot.visual = seen.clone();
    }
    if let Some(heard) = scratch.heard.as_ref().filter(|s| !s.is_empty()) {
        snapshot.audio = heard.clone();
    }
    snapshot
}

/// speak 优先于 update_model；都没有则为 wait
fn decision_from(scratch: &CycleScratch, exit: &LoopExit, max_iterations: usize) -> Decision {
    let reasoning = match (exit, scratch.end.as_ref()) {
        (_, Some(end)) if !end.reasoning.is_empty() => end.reasoning.clone(),
        (LoopExit::Capped, _) => format!("No decision within {max_iterations} capability calls"),
        (LoopExit::Aborted { error, .. }, _) => format!("cycle aborted: {error}"),
        _ => "Reasoner ended the cycle".to_string(),
    };
    let confidence = match exit {
        LoopExit::Ended => 1.0,
        _ => 0.0,
    };
    if !scratch.spoken.is_empty() {
        let text = scratch
            .spoken
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        Decision::speak(reasoning, confidence, None, text)
    } else if !scratch.model_notes.is_empty() {
        Decision::update_model(format!("{reasoning} ({})", scratch.model_notes.join("; ")), confidence)
    } else {
        Decision::wait(reasoning, confidence)
    }
}

fn preview(s: &str) -> String {
    if s.chars().count() > RESULT_PREVIEW_CHARS {
        format!("{}...", s.chars().take(RESULT_PREVIEW_CHARS).collect::<String>())
    } else {
        s.to_string()
    }
}

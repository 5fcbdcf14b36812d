//! 会话上下文：每个会话独立的证据缓冲、静默计时、白板缓存与周期记录
//!
//! 摄入路径（网关收到 transcript / speech_activity / whiteboard）只追加或覆盖缓存；
//! 周期只读取并在结束时一次性提交。所有锁都是短临界区，从不跨 await 持有。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::cognitive::triggers::TriggerState;
use crate::config::EvidenceSection;
use crate::core::{ObservationCadence, ObservationMode};
use crate::evidence::{SharedClock, SilenceTracker, TranscriptBuffer, TranscriptEntry};
use crate::models::{truncate_field, ActionKind, CycleRecord, StudentState};

/// 白板缓存
#[derive(Clone, Debug, Default)]
pub struct WhiteboardState {
    pub description: String,
    /// 最近一次更新的时钟读数；None 表示从未收到
    pub updated_at: Option<f64>,
    /// 每次检测到变化加一
    pub version: u64,
}

/// 周期开始时读取的白板快照
#[derive(Clone, Debug)]
pub struct WhiteboardSnapshot {
    pub description: String,
    /// 距上次更新的秒数；从未收到时为 None
    pub age: Option<f64>,
    pub version: u64,
    /// 自上个提交的周期以来是否变化
    pub changed: bool,
}

/// 会话状态概要（get_session_status 能力）
#[derive(Clone, Debug, serde::Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub student_id: String,
    pub topic: Option<String>,
    pub cycles: usize,
    pub interventions: usize,
    pub silence_duration: f64,
    pub observation_mode: ObservationMode,
    pub last_action: Option<ActionKind>,
}

pub struct SessionContext {
    session_id: String,
    student_id: String,
    topic: Mutex<Option<String>>,
    clock: SharedClock,
    transcript: Mutex<TranscriptBuffer>,
    silence: Mutex<SilenceTracker>,
    whiteboard: Mutex<WhiteboardState>,
    /// 最近一次提交的周期所看到的白板版本
    acknowledged_version: Mutex<u64>,
    records: Mutex<Vec<CycleRecord>>,
    cadence: Mutex<ObservationCadence>,
    /// 新证据到达时唤醒驱动循环
    activity: Notify,
    /// 工具循环请求立即进入下一周期
    continue_requested: AtomicBool,
    closed: CancellationToken,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionContext {
    pub fn new(
        session_id: impl Into<String>,
        student_id: impl Into<String>,
        topic: Option<String>,
        evidence: &EvidenceSection,
        clock: SharedClock,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            student_id: student_id.into(),
            topic: Mutex::new(topic),
            transcript: Mutex::new(TranscriptBuffer::new(
                evidence.transcript_retention_secs,
                clock.clone(),
            )),
            silence: Mutex::new(SilenceTracker::new(
                evidence.silence_threshold_secs,
                clock.clone(),
            )),
            clock,
            whiteboard: Mutex::new(WhiteboardState::default()),
            acknowledged_version: Mutex::new(0),
            records: Mutex::new(Vec::new()),
            cadence: Mutex::new(ObservationCadence::default()),
            activity: Notify::new(),
            continue_requested: AtomicBool::new(false),
            closed: CancellationToken::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn student_id(&self) -> &str {
        &self.student_id
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn topic(&self) -> Option<String> {
        lock(&self.topic).clone()
    }

    pub fn set_topic(&self, topic: Option<String>) {
        *lock(&self.topic) = topic;
    }

    // ---- 摄入路径 ----

    /// 新的转写片段；timestamp 缺省为当前时钟。转写即语音，静默计时同时重置。
    pub fn ingest_transcript(&self, text: &str, timestamp: Option<f64>) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let ts = timestamp.unwrap_or_else(|| self.clock.now());
        lock(&self.transcript).append(text, ts);
        lock(&self.silence).update(true);
        self.activity.notify_one();
    }

    /// VAD 信号
    pub fn record_speech_activity(&self, has_speech: bool) {
        lock(&self.silence).update(has_speech);
    }

    /// 客户端推送或拉取得到的白板描述；changed 为 true 时版本加一并唤醒驱动循环。
    /// 超长描述在写入缓存时截断，周期读到的快照总能通过校验。
    pub fn update_whiteboard(&self, description: impl Into<String>, changed: bool) {
        let description = truncate_field(description.into());
        {
            let mut wb = lock(&self.whiteboard);
            wb.description = description;
            wb.updated_at = Some(self.clock.now());
            if changed {
                wb.version += 1;
            }
        }
        if changed {
            self.activity.notify_one();
        }
    }

    // ---- 周期读取 ----

    pub fn recent_transcript(&self, window: f64) -> Vec<TranscriptEntry> {
        lock(&self.transcript).recent(window)
    }

    pub fn joined_transcript(&self, window: f64) -> String {
        lock(&self.transcript).joined_text(window)
    }

    pub fn latest_utterance(&self, window: f64) -> Option<String> {
        lock(&self.transcript).latest(window).map(|e| e.text)
    }

    pub fn silence_duration(&self) -> f64 {
        lock(&self.silence).duration()
    }

    pub fn silence_threshold(&self) -> f64 {
        lock(&self.silence).threshold()
    }

    pub fn last_speech_time(&self) -> f64 {
        lock(&self.silence).last_speech_time()
    }

    pub fn transcript_len(&self) -> usize {
        lock(&self.transcript).len()
    }

    /// 触发检测器的输入快照
    pub fn trigger_state(&self, question_window: f64) -> TriggerState {
        TriggerState {
            silence_duration: self.silence_duration(),
            silence_threshold: self.silence_threshold(),
            whiteboard_changed: self.whiteboard().changed,
            recent_transcript: self.recent_transcript(question_window),
            last_student_state: self.last_student_state(),
            has_prior_cycles: self.record_count() > 0,
        }
    }

    pub fn whiteboard(&self) -> WhiteboardSnapshot {
        let acknowledged = *lock(&self.acknowledged_version);
        let wb = lock(&self.whiteboard);
        WhiteboardSnapshot {
            description: wb.description.clone(),
            age: wb.updated_at.map(|t| (self.clock.now() - t).max(0.0)),
            version: wb.version,
            changed: wb.version > acknowledged,
        }
    }

    pub fn records(&self) -> Vec<CycleRecord> {
        lock(&self.records).clone()
    }

    pub fn record_count(&self) -> usize {
        lock(&self.records).len()
    }

    pub fn last_record(&self) -> Option<CycleRecord> {
        lock(&self.records).last().cloned()
    }

    /// 最近一个带分析结果的周期得出的学生状态
    pub fn last_student_state(&self) -> Option<StudentState> {
        lock(&self.records)
            .iter()
            .rev()
            .find_map(|r| r.analysis.as_ref().map(|a| a.student_state))
    }

    pub fn status(&self) -> SessionStatus {
        let (cycles, interventions, last_action) = {
            let records = lock(&self.records);
            (
                records.len(),
                records.iter().filter(|r| r.decision.is_speak() && !r.failed).count(),
                records.last().map(|r| r.decision.action),
            )
        };
        SessionStatus {
            session_id: self.session_id.clone(),
            student_id: self.student_id.clone(),
            topic: self.topic(),
            cycles,
            interventions,
            silence_duration: self.silence_duration(),
            observation_mode: self.cadence().mode,
            last_action,
        }
    }

    // ---- 周期提交 ----

    /// 追加一条记录（失败周期只调用这个）
    pub fn append_record(&self, record: CycleRecord) {
        lock(&self.records).push(record);
    }

    /// 成功周期的一次性提交：记录、白板确认版本与拉取得到的白板描述
    pub fn commit_cycle(
        &self,
        record: CycleRecord,
        observed_version: u64,
        pulled_whiteboard: Option<String>,
    ) {
        if let Some(description) = pulled_whiteboard {
            let mut wb = lock(&self.whiteboard);
            // 拉取期间客户端可能推送了更新的白板，不覆盖
            if wb.version == observed_version {
                wb.description = description;
                wb.updated_at = Some(self.clock.now());
            }
        }
        {
            let mut ack = lock(&self.acknowledged_version);
            *ack = (*ack).max(observed_version);
        }
        self.append_record(record);
    }

    // ---- 节奏与唤醒 ----

    pub fn cadence(&self) -> ObservationCadence {
        *lock(&self.cadence)
    }

    pub fn set_cadence(&self, mode: ObservationMode, interval: Option<Duration>) -> ObservationCadence {
        let cadence = ObservationCadence {
            mode,
            interval: interval.unwrap_or_else(|| mode.default_interval()),
        };
        *lock(&self.cadence) = cadence;
        cadence
    }

    pub fn notify_activity(&self) {
        self.activity.notify_one();
    }

    /// 等待新证据或超时；返回是否被唤醒
    pub async fn wait_for_activity(&self, timeout: Duration) -> bool {
        tokio::select! {
            _ = self.activity.notified() => true,
            _ = tokio::time::sleep(timeout) => false,
            _ = self.closed.cancelled() => false,
        }
    }

    pub fn request_continue(&self) {
        self.continue_requested.store(true, Ordering::SeqCst);
    }

    pub fn take_continue_request(&self) -> bool {
        self.continue_requested.swap(false, Ordering::SeqCst)
    }

    // ---- 生命周期 ----

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

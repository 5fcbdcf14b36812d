//! 触发检测器
//!
//! 纯函数：按固定顺序评估一组相互独立的谓词，任一成立即触发，返回所有成立谓词（按评估顺序）。
//! 最小周期间隔由调用方（CycleController）负责，检测器本身无状态、无副作用。

use regex::{Regex, RegexBuilder};

use crate::config::TriggersSection;
use crate::core::TutorError;
use crate::evidence::TranscriptEntry;
use crate::models::StudentState;

/// 触发原因
#[derive(Clone, Debug, PartialEq)]
pub enum TriggerReason {
    /// 静默达到阈值，携带静默秒数
    Silence(f64),
    WhiteboardChange,
    ExplicitQuestion,
    ErrorPattern,
    Stuck,
    /// 会话尚无任何周期
    InitialAnalysis,
}

impl TriggerReason {
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerReason::Silence(d) => write!(f, "silence_{:.1}s", d),
            TriggerReason::WhiteboardChange => f.write_str("whiteboard_change"),
            TriggerReason::ExplicitQuestion => f.write_str("explicit_question"),
            TriggerReason::ErrorPattern => f.write_str("error_pattern"),
            TriggerReason::Stuck => f.write_str("stuck"),
            TriggerReason::InitialAnalysis => f.write_str("initial_analysis"),
        }
    }
}

/// 检测器的输入快照；由控制器从 SessionContext 组装
#[derive(Clone, Debug, Default)]
pub struct TriggerState {
    pub silence_duration: f64,
    pub silence_threshold: f64,
    /// 自上个周期以来白板是否发生变化
    pub whiteboard_changed: bool,
    /// 提问检测窗口内的转写（时间升序）
    pub recent_transcript: Vec<TranscriptEntry>,
    /// 上个周期分析出的学生状态
    pub last_student_state: Option<StudentState>,
    pub has_prior_cycles: bool,
}

pub struct TriggerDetector {
    question_phrases: Vec<String>,
    error_patterns: Vec<Regex>,
    stuck_phrases: Vec<String>,
    initial_analysis: bool,
}

impl TriggerDetector {
    pub fn new(config: &TriggersSection) -> Result<Self, TutorError> {
        let error_patterns = config
            .error_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| TutorError::Config(format!("invalid error pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            question_phrases: lowercase_all(&config.question_phrases),
            error_patterns,
            stuck_phrases: lowercase_all(&config.stuck_phrases),
            initial_analysis: config.initial_analysis,
        })
    }

    /// 评估全部谓词；返回 (是否触发, 成立的原因列表)
    pub fn check_triggers(&self, state: &TriggerState) -> (bool, Vec<TriggerReason>) {
        let mut reasons = Vec::new();

        if state.silence_duration >= state.silence_threshold {
            reasons.push(TriggerReason::Silence(state.silence_duration));
        }
        if state.whiteboard_changed {
            reasons.push(TriggerReason::WhiteboardChange);
        }
        if self.has_explicit_question(&state.recent_transcript) {
            reasons.push(TriggerReason::ExplicitQuestion);
        }
        if self.has_error_pattern(&state.recent_transcript) {
            reasons.push(TriggerReason::ErrorPattern);
        }
        if self.looks_stuck(state) {
            reasons.push(TriggerReason::Stuck);
        }
        if self.initial_analysis && !state.has_prior_cycles {
            reasons.push(TriggerReason::InitialAnalysis);
        }

        (!reasons.is_empty(), reasons)
    }

    pub fn should_trigger(&self, state: &TriggerState) -> bool {
        self.check_triggers(state).0
    }

    /// 只看最新一条：问号或提问短语
    pub fn is_question(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        lower.contains('?') || self.question_phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    pub fn matches_error_pattern(&self, text: &str) -> bool {
        self.error_patterns.iter().any(|re| re.is_match(text))
    }

    pub fn contains_stuck_phrase(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.stuck_phrases.iter().any(|p| lower.contains(p.as_str()))
    }

    fn has_explicit_question(&self, transcript: &[TranscriptEntry]) -> bool {
        transcript
            .last()
            .map(|entry| self.is_question(&entry.text))
            .unwrap_or(false)
    }

    fn has_error_pattern(&self, transcript: &[TranscriptEntry]) -> bool {
        transcript.iter().any(|e| self.matches_error_pattern(&e.text))
    }

    fn looks_stuck(&self, state: &TriggerState) -> bool {
        matches!(
            state.last_student_state,
            Some(StudentState::Stuck) | Some(StudentState::Confused)
        ) || state
            .recent_transcript
            .iter()
            .any(|e| self.contains_stuck_phrase(&e.text))
    }
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> TriggerDetector {
        TriggerDetector::new(&TriggersSection::default()).unwrap()
    }

    fn state(entries: &[&str]) -> TriggerState {
        TriggerState {
            silence_duration: 0.0,
            silence_threshold: 3.0,
            recent_transcript: entries
                .iter()
                .enumerate()
                .map(|(i, t)| TranscriptEntry::new(*t, i as f64))
                .collect(),
            has_prior_cycles: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_no_trigger_on_quiet_progress() {
        let d = detector();
        let (fire, reasons) = d.check_triggers(&state(&["so x equals three"]));
        assert!(!fire);
        assert!(reasons.is_empty());
    }

    #[test]
    fn test_silence_threshold_inclusive() {
        let d = detector();
        let mut s = state(&[]);
        s.silence_duration = 3.0;
        let (fire, reasons) = d.check_triggers(&s);
        assert!(fire);
        assert_eq!(reasons, vec![TriggerReason::Silence(3.0)]);
        assert_eq!(reasons[0].to_string(), "silence_3.0s");
    }

    #[test]
    fn test_explicit_question_uses_latest_entry() {
        let d = detector();
        assert!(d.should_trigger(&state(&["ok", "How do I solve for x"])));
        assert!(d.should_trigger(&state(&["is this right?"])));
        // 更早的提问已被后面的话覆盖
        let (_, reasons) = d.check_triggers(&state(&["what is this?", "never mind, got it"]));
        assert!(!reasons.contains(&TriggerReason::ExplicitQuestion));
    }

    #[test]
    fn test_reasons_in_evaluation_order() {
        let d = detector();
        let mut s = state(&["oops I'm stuck, can you help?"]);
        s.silence_duration = 10.0;
        s.whiteboard_changed = true;
        s.has_prior_cycles = false;
        let (fire, reasons) = d.check_triggers(&s);
        assert!(fire);
        let labels: Vec<String> = reasons.iter().map(|r| r.label()).collect();
        assert_eq!(
            labels,
            vec![
                "silence_10.0s",
                "whiteboard_change",
                "explicit_question",
                "error_pattern",
                "stuck",
                "initial_analysis"
            ]
        );
    }

    #[test]
    fn test_stuck_from_previous_state() {
        let d = detector();
        let mut s = state(&[]);
        s.last_student_state = Some(StudentState::Confused);
        assert_eq!(d.check_triggers(&s).1, vec![TriggerReason::Stuck]);
    }

    #[test]
    fn test_initial_analysis_can_be_disabled() {
        let cfg = TriggersSection {
            initial_analysis: false,
            ..TriggersSection::default()
        };
        let d = TriggerDetector::new(&cfg).unwrap();
        let mut s = state(&[]);
        s.has_prior_cycles = false;
        assert!(!d.should_trigger(&s));
    }

    #[test]
    fn test_detector_is_pure() {
        let d = detector();
        let mut s = state(&["that's wrong", "what is a fraction"]);
        s.silence_duration = 4.25;
        let first = d.check_triggers(&s);
        for _ in 0..10 {
            assert_eq!(d.check_triggers(&s), first);
        }
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let cfg = TriggersSection {
            error_patterns: vec!["(unclosed".to_string()],
            ..TriggersSection::default()
        };
        assert!(matches!(
            TriggerDetector::new(&cfg),
            Err(TutorError::Config(_))
        ));
    }
}

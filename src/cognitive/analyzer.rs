//! ANALYZING 阶段：Observation + 档案字段 → Analysis
//!
//! 核心只定义契约（Analyzer trait）。HeuristicAnalyzer 是离线可用的规则实现；
//! LlmAnalyzer 让推理方输出 JSON 形式的 Analysis，解析失败时回退到启发式结果。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::schema_for;

use crate::cognitive::triggers::TriggerDetector;
use crate::core::TutorError;
use crate::llm::{LlmClient, Message};
use crate::models::{Analysis, ErrorSeverity, ErrorType, Observation, ProfileView, StudentState};
use crate::tool_loop::planner::extract_json_block;

/// 静默超过该秒数视为卡住
const STUCK_SILENCE_SECS: f64 = 5.0;

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        observation: &Observation,
        profile: &ProfileView,
    ) -> Result<Analysis, TutorError>;
}

/// 启发式分析：提问短语 / 错误模式 / 卡住短语 / 静默时长
pub struct HeuristicAnalyzer {
    detector: Arc<TriggerDetector>,
}

impl HeuristicAnalyzer {
    pub fn new(detector: Arc<TriggerDetector>) -> Self {
        Self { detector }
    }

    pub fn analyze_sync(&self, observation: &Observation) -> Analysis {
        let latest = observation
            .context
            .get("latest_utterance")
            .and_then(|v| v.as_str())
            .unwrap_or(&observation.audio);
        let silence = observation.silence_duration().unwrap_or(0.0);

        let mut analysis = Analysis::new(StudentState::Engaged, 0.5)
            .with_question(!latest.trim().is_empty() && self.detector.is_question(latest));

        if self.detector.matches_error_pattern(&observation.audio) {
            analysis = analysis.with_error(ErrorType::Computational, ErrorSeverity::Minor);
            analysis.confidence = 0.75;
        }
        if self.detector.contains_stuck_phrase(&observation.audio) {
            analysis.student_state = StudentState::Confused;
            analysis.confidence = analysis.confidence.max(0.6);
        }
        if silence > STUCK_SILENCE_SECS {
            analysis.student_state = StudentState::Stuck;
            analysis.confidence = analysis.confidence.max(0.7);
        }
        analysis
    }
}

#[async_trait]
impl Analyzer for HeuristicAnalyzer {
    async fn analyze(
        &self,
        observation: &Observation,
        _profile: &ProfileView,
    ) -> Result<Analysis, TutorError> {
        Ok(self.analyze_sync(observation))
    }
}

/// 推理方驱动的分析
pub struct LlmAnalyzer {
    llm: Arc<dyn LlmClient>,
    fallback: HeuristicAnalyzer,
}

impl LlmAnalyzer {
    pub fn new(llm: Arc<dyn LlmClient>, detector: Arc<TriggerDetector>) -> Self {
        Self {
            llm,
            fallback: HeuristicAnalyzer::new(detector),
        }
    }

    fn system_prompt() -> String {
        let schema = serde_json::to_string_pretty(&schema_for!(Analysis)).unwrap_or_default();
        format!(
            "You are an expert tutor silently observing a student working on a problem.\n\
             Assess the student's state from the observation. Do not address the student.\n\
             Reply with a single JSON object matching this schema:\n{schema}"
        )
    }

    fn user_prompt(observation: &Observation, profile: &ProfileView) -> String {
        format!(
            "Whiteboard: {}\nRecent speech: {}\nSilence: {:.1}s\nPatience level: {:?}\nKnown struggle topics: {}",
            observation.visual,
            if observation.audio.is_empty() { "(none)" } else { observation.audio.as_str() },
            observation.silence_duration().unwrap_or(0.0),
            profile.patience_level,
            profile.known_struggle_topics.join(", "),
        )
    }
}

#[async_trait]
impl Analyzer for LlmAnalyzer {
    async fn analyze(
        &self,
        observation: &Observation,
        profile: &ProfileView,
    ) -> Result<Analysis, TutorError> {
        let messages = vec![
            Message::system(Self::system_prompt()),
            Message::user(Self::user_prompt(observation, profile)),
        ];
        let output = self.llm.complete(&messages).await?;
        let parsed = extract_json_block(&output)
            .and_then(|json| serde_json::from_str::<Analysis>(json).ok());
        match parsed {
            Some(analysis) => Ok(analysis.normalized()),
            None => {
                tracing::warn!(output = %output.chars().take(200).collect::<String>(), "unparseable analysis, using heuristics");
                Ok(self.fallback.analyze_sync(observation))
            }
        }
    }
}

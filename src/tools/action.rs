//! 动作类能力（有副作用）
//!
//! 对客户端的输出统一经 Outbound 发送；档案写入经 ProfileStore。发送失败映射为 ActionExecutionFailure。

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::TutorError;
use crate::models::{CompetencyLevel, HintPreference, LearningStyle, PatienceLevel};
use crate::tools::context::{SpokenMessage, ToolContext};
use crate::tools::registry::{Capability, CapabilityClass};
use crate::tools::schema::{parse_args, schema_of};

/// concept_mastery 不低于此值视为已掌握
const MASTERED_AT: f64 = 0.8;
/// concept_mastery 不高于此值视为薄弱
const STRUGGLING_AT: f64 = 0.4;

async fn send(ctx: &ToolContext, message: Value) -> Result<(), TutorError> {
    ctx.outbound
        .send_json(message)
        .await
        .map_err(|e| TutorError::ActionExecutionFailure(e.to_string()))
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum Tone {
    Encouraging,
    #[default]
    Neutral,
    Questioning,
    Excited,
}

impl Tone {
    fn as_str(&self) -> &'static str {
        match self {
            Tone::Encouraging => "encouraging",
            Tone::Neutral => "neutral",
            Tone::Questioning => "questioning",
            Tone::Excited => "excited",
        }
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct SpeakArgs {
    /// 要对学生说的话，简短自然
    text: String,
    #[serde(default)]
    tone: Tone,
}

/// speak
pub struct Speak;

#[async_trait]
impl Capability for Speak {
    fn name(&self) -> &str {
        "speak"
    }

    fn description(&self) -> &str {
        "Speak to the student. Use sparingly: only when the student asks, is stuck, or made an error worth addressing."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Action
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<SpeakArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: SpeakArgs = parse_args(self.name(), args)?;
        let text = args.text.trim();
        if text.is_empty() {
            return Err(TutorError::InvalidArguments {
                capability: self.name().to_string(),
                reason: "text must not be empty".to_string(),
            });
        }
        send(
            ctx,
            json!({
                "type": "ai_response",
                "text": text,
                "tone": args.tone.as_str(),
                "speak": true,
                "cycle": ctx.cycle,
            }),
        )
        .await?;
        ctx.scratch().spoken.push(SpokenMessage {
            text: text.to_string(),
            tone: args.tone.as_str().to_string(),
        });
        Ok(json!({"spoken": true, "text": text, "tone": args.tone.as_str()}))
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct ModelArgs {
    /// 对理解程度的估计变化（-1..1）
    #[serde(default)]
    understanding_delta: Option<f64>,
    #[serde(default)]
    frustration_delta: Option<f64>,
    #[serde(default)]
    engagement_delta: Option<f64>,
    /// 概念 → 掌握度（0..1）
    #[serde(default)]
    concept_mastery: BTreeMap<String, f64>,
    /// 观察笔记
    #[serde(default)]
    note: Option<String>,
}

/// update_student_model
pub struct UpdateStudentModel;

#[async_trait]
impl Capability for UpdateStudentModel {
    fn name(&self) -> &str {
        "update_student_model"
    }

    fn description(&self) -> &str {
        "Record what you learned about the student (understanding, frustration, engagement, concept mastery) without speaking."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Action
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ModelArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: ModelArgs = parse_args(self.name(), args)?;
        let mut changes = serde_json::Map::new();
        let mut parts = Vec::new();
        for (key, delta) in [
            ("understanding", args.understanding_delta),
            ("frustration", args.frustration_delta),
            ("engagement", args.engagement_delta),
        ] {
            if let Some(d) = delta.filter(|d| d.is_finite()) {
                let d = d.clamp(-1.0, 1.0);
                changes.insert(format!("{key}_delta"), json!(d));
                parts.push(format!("{key} {d:+.2}"));
            }
        }

        let mut profile = ctx.profiles.load(ctx.session.student_id()).await?;
        for (concept, mastery) in &args.concept_mastery {
            if !mastery.is_finite() {
                continue;
            }
            let level = if *mastery >= MASTERED_AT {
                CompetencyLevel::Mastered
            } else if *mastery <= STRUGGLING_AT {
                CompetencyLevel::Struggling
            } else {
                CompetencyLevel::Unknown
            };
            profile.set_competency(concept, level);
            parts.push(format!("{concept}={mastery:.2}"));
        }
        if !args.concept_mastery.is_empty() {
            changes.insert("concept_mastery".to_string(), json!(args.concept_mastery));
        }
        if let Some(note) = args.note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            parts.push(note.to_string());
            changes.insert("note".to_string(), json!(note));
        }
        if parts.is_empty() {
            return Ok(json!({"updated": false, "changes": {}}));
        }

        let summary = parts.join("; ");
        profile.add_note(summary.clone());
        ctx.profiles.save(&profile).await?;
        ctx.scratch().model_notes.push(summary);
        Ok(json!({"updated": true, "changes": changes}))
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct ProfileUpdateArgs {
    #[serde(default)]
    learning_style: Option<LearningStyle>,
    #[serde(default)]
    patience_level: Option<PatienceLevel>,
    /// 干预前等待的基础秒数（>= 0）
    #[serde(default)]
    optimal_intervention_delay: Option<f64>,
    #[serde(default)]
    hint_preference: Option<HintPreference>,
    /// 鼓励频率（0..1）
    #[serde(default)]
    encouragement_frequency: Option<f64>,
    /// 追加的薄弱主题
    #[serde(default)]
    struggle_topic: Option<String>,
}

/// update_student_profile
pub struct UpdateStudentProfile;

#[async_trait]
impl Capability for UpdateStudentProfile {
    fn name(&self) -> &str {
        "update_student_profile"
    }

    fn description(&self) -> &str {
        "Update the student's long-term pedagogical profile (learning style, patience, intervention delay, hint preference)."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Action
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ProfileUpdateArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: ProfileUpdateArgs = parse_args(self.name(), args)?;
        if let Some(d) = args.optimal_intervention_delay {
            if !d.is_finite() || d < 0.0 {
                return Err(TutorError::InvalidArguments {
                    capability: self.name().to_string(),
                    reason: "optimal_intervention_delay must be a non-negative number".to_string(),
                });
            }
        }

        let mut profile = ctx.profiles.load(ctx.session.student_id()).await?;
        let mut updated = Vec::new();
        let p = &mut profile.pedagogy;
        if let Some(v) = args.learning_style {
            p.learning_style = v;
            updated.push("learning_style");
        }
        if let Some(v) = args.patience_level {
            p.patience_level = v;
            updated.push("patience_level");
        }
        if let Some(v) = args.optimal_intervention_delay {
            p.optimal_intervention_delay = v;
            updated.push("optimal_intervention_delay");
        }
        if let Some(v) = args.hint_preference {
            p.hint_preference = v;
            updated.push("hint_preference");
        }
        if let Some(v) = args.encouragement_frequency.filter(|v| v.is_finite()) {
            p.encouragement_frequency = v.clamp(0.0, 1.0);
            updated.push("encouragement_frequency");
        }
        if let Some(topic) = args.struggle_topic.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            profile.set_competency(topic, CompetencyLevel::Struggling);
            updated.push("known_struggle_topics");
        }
        if updated.is_empty() {
            return Ok(json!({"updated": false, "fields": []}));
        }

        profile.updated_at = chrono::Utc::now();
        ctx.profiles.save(&profile).await?;
        ctx.scratch().profile_updated = true;
        tracing::info!(student_id = %profile.student_id, fields = ?updated, "student profile updated");
        Ok(json!({"updated": true, "fields": updated}))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum HintType {
    Highlight,
    Diagram,
    Formula,
    Example,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum HintPosition {
    #[default]
    Corner,
    Center,
    NearProblem,
}

#[derive(Deserialize, schemars::JsonSchema)]
struct VisualHintArgs {
    hint_type: HintType,
    /// 提示内容（文本、公式或图示描述）
    content: String,
    #[serde(default)]
    position: HintPosition,
}

/// send_visual_hint
pub struct SendVisualHint;

#[async_trait]
impl Capability for SendVisualHint {
    fn name(&self) -> &str {
        "send_visual_hint"
    }

    fn description(&self) -> &str {
        "Show a non-intrusive visual hint on the student's screen without speaking."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Action
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<VisualHintArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: VisualHintArgs = parse_args(self.name(), args)?;
        send(
            ctx,
            json!({
                "type": "visual_hint",
                "hint_type": args.hint_type,
                "content": args.content,
                "position": args.position,
                "cycle": ctx.cycle,
            }),
        )
        .await?;
        Ok(json!({"sent": true, "hint_type": args.hint_type, "position": args.position}))
    }
}

/// clear_visual_hint
pub struct ClearVisualHint;

#[async_trait]
impl Capability for ClearVisualHint {
    fn name(&self) -> &str {
        "clear_visual_hint"
    }

    fn description(&self) -> &str {
        "Remove any visual hint currently shown to the student."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Action
    }

    async fn invoke(&self, ctx: &ToolContext, _args: Value) -> Result<Value, TutorError> {
        send(ctx, json!({"type": "clear_visual_hint", "cycle": ctx.cycle})).await?;
        Ok(json!({"cleared": true}))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum DrawKind {
    Text,
    Arrow,
    Circle,
    Underline,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, schemars::JsonSchema)]
struct Point {
    x: f64,
    y: f64,
}

impl Default for Point {
    fn default() -> Self {
        Self { x: 50.0, y: 50.0 }
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct DrawArgs {
    action: DrawKind,
    #[serde(default)]
    content: Option<String>,
    /// 画布百分比坐标（默认居中）
    #[serde(default)]
    position: Point,
    #[serde(default = "default_color")]
    color: String,
}

fn default_color() -> String {
    "blue".to_string()
}

/// draw_on_whiteboard
pub struct DrawOnWhiteboard;

#[async_trait]
impl Capability for DrawOnWhiteboard {
    fn name(&self) -> &str {
        "draw_on_whiteboard"
    }

    fn description(&self) -> &str {
        "Draw an annotation on the shared whiteboard (text, arrow, circle, underline)."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Action
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<DrawArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: DrawArgs = parse_args(self.name(), args)?;
        if matches!(args.action, DrawKind::Text) && args.content.as_deref().map_or(true, str::is_empty) {
            return Err(TutorError::InvalidArguments {
                capability: self.name().to_string(),
                reason: "text drawing requires content".to_string(),
            });
        }
        send(
            ctx,
            json!({
                "type": "whiteboard_draw",
                "action": args.action,
                "content": args.content,
                "position": args.position,
                "color": args.color,
                "cycle": ctx.cycle,
            }),
        )
        .await?;
        Ok(json!({"drawn": true, "action": args.action}))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
enum LogCategory {
    Hypothesis,
    Decision,
    Observation,
    Error,
}

impl LogCategory {
    fn tag(&self) -> &'static str {
        match self {
            LogCategory::Hypothesis => "HYPOTHESIS",
            LogCategory::Decision => "DECISION",
            LogCategory::Observation => "OBSERVATION",
            LogCategory::Error => "ERROR",
        }
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct LogArgs {
    category: LogCategory,
    message: String,
}

/// log_observation：推理方的思路记录，发往客户端调试面板
pub struct LogObservation;

#[async_trait]
impl Capability for LogObservation {
    fn name(&self) -> &str {
        "log_observation"
    }

    fn description(&self) -> &str {
        "Log your reasoning (hypothesis, decision, observation, error) for debugging. Not shown to the student."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Action
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<LogArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: LogArgs = parse_args(self.name(), args)?;
        let line = format!("[{}] {}", args.category.tag(), args.message);
        tracing::info!(session_id = %ctx.session.session_id(), cycle = ctx.cycle, "{}", line);
        send(
            ctx,
            json!({
                "type": "debug",
                "message": line,
                "timestamp": ctx.session.now(),
            }),
        )
        .await?;
        ctx.scratch().logged.push(line);
        Ok(json!({"logged": true}))
    }
}

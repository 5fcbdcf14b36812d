//! 观察类能力（只读）
//!
//! 转写与会话状态读本地缓冲；白板与摄像头通过 ResourceNegotiator 向客户端拉取。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::TutorError;
use crate::tools::context::ToolContext;
use crate::tools::registry::{Capability, CapabilityClass};
use crate::tools::schema::{parse_args, schema_of};
use crate::transport::ResourceKind;

#[derive(Deserialize, schemars::JsonSchema)]
struct TranscriptArgs {
    /// 回看多少秒的转写（默认 30）
    #[serde(default)]
    seconds: Option<f64>,
    /// 为 true 时先向客户端拉取尚未转写的音频片段
    #[serde(default)]
    refresh: bool,
}

/// get_audio_transcript
pub struct GetAudioTranscript;

#[async_trait]
impl Capability for GetAudioTranscript {
    fn name(&self) -> &str {
        "get_audio_transcript"
    }

    fn description(&self) -> &str {
        "Get recent speech transcripts from the student. Returns text of what the student said recently."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<TranscriptArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: TranscriptArgs = parse_args(self.name(), args)?;
        let seconds = args
            .seconds
            .filter(|s| s.is_finite() && *s > 0.0)
            .unwrap_or(ctx.settings.transcript_window);

        if args.refresh {
            let data = ctx
                .negotiator
                .request(ResourceKind::Audio, json!({"seconds": seconds}), Some(ctx.settings.pull_timeout))
                .await?;
            if let Some(text) = data.get("text").and_then(Value::as_str) {
                ctx.session.ingest_transcript(text, None);
            }
        }

        let entries = ctx.session.recent_transcript(seconds);
        let joined = entries
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        ctx.scratch().heard = Some(joined.clone());
        Ok(json!({
            "transcripts": entries,
            "text": joined,
            "has_speech": !entries.is_empty(),
            "silence_duration": ctx.session.silence_duration(),
        }))
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct WhiteboardArgs {
    /// true: 返回内容分析；false: 只检查是否变化
    #[serde(default = "default_true")]
    analyze: bool,
}

fn default_true() -> bool {
    true
}

/// get_whiteboard
pub struct GetWhiteboard;

#[async_trait]
impl Capability for GetWhiteboard {
    fn name(&self) -> &str {
        "get_whiteboard"
    }

    fn description(&self) -> &str {
        "Get the current whiteboard to see what the student is working on. Returns a description of the content and whether it changed."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<WhiteboardArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: WhiteboardArgs = parse_args(self.name(), args)?;
        let data = ctx
            .negotiator
            .request(
                ResourceKind::Whiteboard,
                json!({"analyze": args.analyze}),
                Some(ctx.settings.pull_timeout),
            )
            .await?;
        let has_changes = data.get("has_changes").and_then(Value::as_bool).unwrap_or(false);
        let description = ["description", "analysis", "text"]
            .iter()
            .find_map(|k| data.get(*k).and_then(Value::as_str))
            .map(str::to_string);

        match &description {
            Some(d) => ctx.session.update_whiteboard(d.clone(), has_changes),
            None if has_changes => {
                let previous = ctx.session.whiteboard().description;
                ctx.session.update_whiteboard(previous, true);
            }
            None => {}
        }
        let current = ctx.session.whiteboard();
        ctx.scratch().seen = Some(current.description.clone());

        let mut result = json!({
            "has_content": !current.description.is_empty(),
            "has_changes": has_changes,
            "last_change": data.get("last_change").cloned().unwrap_or(Value::Null),
        });
        if args.analyze {
            result["analysis"] = json!(current.description);
        }
        Ok(result)
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct CameraArgs {
    /// 摄像头标识（默认 student_face）
    #[serde(default = "default_camera")]
    camera_id: String,
    #[serde(default)]
    analyze_emotion: bool,
}

fn default_camera() -> String {
    "student_face".to_string()
}

/// get_camera_feed
pub struct GetCameraFeed;

#[async_trait]
impl Capability for GetCameraFeed {
    fn name(&self) -> &str {
        "get_camera_feed"
    }

    fn description(&self) -> &str {
        "Get the student's camera feed to observe facial expressions and body language."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<CameraArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: CameraArgs = parse_args(self.name(), args)?;
        let data = ctx
            .negotiator
            .request(
                ResourceKind::Camera,
                json!({"camera_id": args.camera_id, "analyze_emotion": args.analyze_emotion}),
                Some(ctx.settings.pull_timeout),
            )
            .await?;
        let mut result = json!({
            "available": data.get("available").and_then(Value::as_bool).unwrap_or(false),
            "camera_id": args.camera_id,
        });
        if args.analyze_emotion {
            result["emotion"] = data.get("emotion").cloned().unwrap_or(Value::Null);
        }
        if let Some(d) = data.get("description") {
            result["description"] = d.clone();
        }
        Ok(result)
    }
}

/// get_session_status
pub struct GetSessionStatus;

#[async_trait]
impl Capability for GetSessionStatus {
    fn name(&self) -> &str {
        "get_session_status"
    }

    fn description(&self) -> &str {
        "Get current session status including silence duration, number of cycles and interventions, and observation mode."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    async fn invoke(&self, ctx: &ToolContext, _args: Value) -> Result<Value, TutorError> {
        let status = ctx.session.status();
        let whiteboard = ctx.session.whiteboard();
        let mut value = serde_json::to_value(&status)
            .map_err(|e| TutorError::ActionExecutionFailure(format!("encode status: {e}")))?;
        value["student_is_speaking"] = json!(status.silence_duration < ctx.session.silence_threshold());
        value["time_since_whiteboard_change"] = json!(whiteboard.age);
        value["transcript_count"] = json!(ctx.session.transcript_len());
        value["cycle"] = json!(ctx.cycle);
        Ok(value)
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct ProfileArgs {
    /// 附带最近的观察笔记
    #[serde(default)]
    include_history: bool,
}

/// 附带的最近笔记条数
const PROFILE_HISTORY_NOTES: usize = 5;

/// get_student_profile
pub struct GetStudentProfile;

#[async_trait]
impl Capability for GetStudentProfile {
    fn name(&self) -> &str {
        "get_student_profile"
    }

    fn description(&self) -> &str {
        "Get the student's pedagogical profile including learning style, patience level, intervention delay and known struggle topics."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<ProfileArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: ProfileArgs = parse_args(self.name(), args)?;
        let profile = ctx.profiles.load(ctx.session.student_id()).await?;
        let topic = ctx.session.topic();
        let p = &profile.pedagogy;
        let mut out = json!({
            "student_id": profile.student_id,
            "learning_style": p.learning_style,
            "patience_level": p.patience_level,
            "optimal_intervention_delay": p.optimal_intervention_delay,
            "effective_intervention_delay": profile.view().effective_intervention_delay(topic.as_deref()),
            "hint_preference": p.hint_preference,
            "encouragement_frequency": p.encouragement_frequency,
            "known_struggle_topics": profile.known_struggle_topics,
            "competencies": profile.competencies,
        });
        if args.include_history {
            let skip = profile.notes.len().saturating_sub(PROFILE_HISTORY_NOTES);
            out["recent_notes"] = json!(profile.notes[skip..]);
        }
        Ok(out)
    }
}

/// get_observation_mode
pub struct GetObservationMode;

#[async_trait]
impl Capability for GetObservationMode {
    fn name(&self) -> &str {
        "get_observation_mode"
    }

    fn description(&self) -> &str {
        "Get the current observation mode and polling interval."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    async fn invoke(&self, ctx: &ToolContext, _args: Value) -> Result<Value, TutorError> {
        let cadence = ctx.session.cadence();
        Ok(json!({
            "mode": cadence.mode,
            "interval_seconds": cadence.interval.as_secs_f64(),
        }))
    }
}

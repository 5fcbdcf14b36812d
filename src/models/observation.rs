//! Observation：每个周期新建的证据快照，创建后不再修改

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::TutorError;

/// 单个字段的最大长度（防止客户端塞入整张 base64 图片）
pub const MAX_FIELD_CHARS: usize = 16_000;

/// 截断到 MAX_FIELD_CHARS 个字符，保留开头
pub fn truncate_field(mut text: String) -> String {
    if let Some((idx, _)) = text.char_indices().nth(MAX_FIELD_CHARS) {
        text.truncate(idx);
    }
    text
}

/// 截断到 MAX_FIELD_CHARS 个字符，保留结尾（转写越新越重要）
pub fn truncate_field_tail(text: String) -> String {
    let count = text.chars().count();
    if count <= MAX_FIELD_CHARS {
        return text;
    }
    text.chars().skip(count - MAX_FIELD_CHARS).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// 白板描述
    pub visual: String,
    /// 最近语音转写
    pub audio: String,
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl Observation {
    pub fn new(visual: impl Into<String>, audio: impl Into<String>, context: Map<String, Value>) -> Self {
        Self {
            visual: visual.into(),
            audio: audio.into(),
            context,
            timestamp: Utc::now(),
        }
    }

    pub fn silence_duration(&self) -> Option<f64> {
        self.context.get("silence_duration").and_then(Value::as_f64)
    }

    /// 基本形状校验：silence_duration 必须存在且为非负有限数，文本字段长度受限
    pub fn validate(&self) -> Result<(), TutorError> {
        match self.silence_duration() {
            Some(d) if d.is_finite() && d >= 0.0 => {}
            Some(d) => {
                return Err(TutorError::MalformedObservation(format!(
                    "silence_duration out of range: {d}"
                )))
            }
            None => {
                return Err(TutorError::MalformedObservation(
                    "missing silence_duration in context".to_string(),
                ))
            }
        }
        if self.visual.chars().count() > MAX_FIELD_CHARS {
            return Err(TutorError::MalformedObservation("visual field too long".to_string()));
        }
        if self.audio.chars().count() > MAX_FIELD_CHARS {
            return Err(TutorError::MalformedObservation("audio field too long".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(silence: Value) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("silence_duration".to_string(), silence);
        m
    }

    #[test]
    fn test_validate_ok() {
        let obs = Observation::new("x = 2", "hmm", ctx(serde_json::json!(1.5)));
        assert!(obs.validate().is_ok());
        assert_eq!(obs.silence_duration(), Some(1.5));
    }

    #[test]
    fn test_validate_rejects_missing_or_negative_silence() {
        let obs = Observation::new("", "", Map::new());
        assert!(matches!(obs.validate(), Err(TutorError::MalformedObservation(_))));
        let obs = Observation::new("", "", ctx(serde_json::json!(-1.0)));
        assert!(matches!(obs.validate(), Err(TutorError::MalformedObservation(_))));
    }

    #[test]
    fn test_validate_rejects_oversized_visual() {
        let obs = Observation::new("a".repeat(MAX_FIELD_CHARS + 1), "", ctx(serde_json::json!(0.0)));
        assert!(obs.validate().is_err());
    }

    #[test]
    fn test_truncate_field_respects_char_boundaries() {
        let long = "é".repeat(MAX_FIELD_CHARS + 10);
        let head = truncate_field(long.clone());
        assert_eq!(head.chars().count(), MAX_FIELD_CHARS);
        let tail = truncate_field_tail(format!("ab{}", "分".repeat(MAX_FIELD_CHARS)));
        assert_eq!(tail.chars().count(), MAX_FIELD_CHARS);
        assert!(tail.starts_with('分'));
        assert_eq!(truncate_field("short".to_string()), "short");
        let obs = Observation::new(head, tail, ctx(serde_json::json!(0.0)));
        assert!(obs.validate().is_ok());
    }
}

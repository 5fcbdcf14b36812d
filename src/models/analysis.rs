//! Analysis：Observation 经推理方（或启发式）分析后的学生状态

use serde::{Deserialize, Serialize};

/// 学生当前状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StudentState {
    Engaged,
    Confused,
    Stuck,
    MakingProgress,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    #[default]
    None,
    Conceptual,
    Computational,
    Notation,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    #[default]
    None,
    Minor,
    Moderate,
    Critical,
}

/// 分析结果；confidence 总在 [0, 1]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Analysis {
    pub student_state: StudentState,
    #[serde(default)]
    pub error_detected: bool,
    #[serde(default)]
    pub error_type: ErrorType,
    #[serde(default)]
    pub error_severity: ErrorSeverity,
    #[serde(default)]
    pub explicit_question: bool,
    #[serde(default)]
    pub confidence: f64,
}

impl Analysis {
    pub fn new(student_state: StudentState, confidence: f64) -> Self {
        Self {
            student_state,
            error_detected: false,
            error_type: ErrorType::None,
            error_severity: ErrorSeverity::None,
            explicit_question: false,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_question(mut self, explicit_question: bool) -> Self {
        self.explicit_question = explicit_question;
        self
    }

    pub fn with_error(mut self, error_type: ErrorType, severity: ErrorSeverity) -> Self {
        self.error_detected = severity != ErrorSeverity::None;
        self.error_type = error_type;
        self.error_severity = severity;
        self
    }

    /// 外部推理方返回的值可能越界，统一夹到 [0, 1]
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if self.error_severity != ErrorSeverity::None {
            self.error_detected = true;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_analysis() {
        let a: Analysis = serde_json::from_str(
            r#"{"student_state": "making_progress", "error_severity": "critical", "confidence": 1.4}"#,
        )
        .unwrap();
        let a = a.normalized();
        assert_eq!(a.student_state, StudentState::MakingProgress);
        assert!(a.error_detected);
        assert_eq!(a.confidence, 1.0);
        assert!(!a.explicit_question);
    }
}

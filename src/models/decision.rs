//! Decision：一个周期的行动决定
//!
//! response_text 当且仅当 action == Speak 时存在，由构造函数保证。

use serde::{Deserialize, Serialize};

/// 行动类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Wait,
    Speak,
    UpdateModel,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Wait => "wait",
            ActionKind::Speak => "speak",
            ActionKind::UpdateModel => "update_model",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 干预策略
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Socratic,
    Direct,
    Hint,
    Example,
    Scaffolding,
    Analogical,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Socratic => "socratic",
            Strategy::Direct => "direct",
            Strategy::Hint => "hint",
            Strategy::Example => "example",
            Strategy::Scaffolding => "scaffolding",
            Strategy::Analogical => "analogical",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: ActionKind,
    pub reasoning: String,
    pub confidence: f64,
    pub strategy: Option<Strategy>,
    pub response_text: Option<String>,
    pub fallback_plan: String,
}

impl Decision {
    pub fn wait(reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            action: ActionKind::Wait,
            reasoning: reasoning.into(),
            confidence: confidence.clamp(0.0, 1.0),
            strategy: None,
            response_text: None,
            fallback_plan: String::new(),
        }
    }

    pub fn update_model(reasoning: impl Into<String>, confidence: f64) -> Self {
        Self {
            action: ActionKind::UpdateModel,
            ..Self::wait(reasoning, confidence)
        }
    }

    pub fn speak(
        reasoning: impl Into<String>,
        confidence: f64,
        strategy: Option<Strategy>,
        response_text: impl Into<String>,
    ) -> Self {
        Self {
            action: ActionKind::Speak,
            strategy,
            response_text: Some(response_text.into()),
            ..Self::wait(reasoning, confidence)
        }
    }

    pub fn with_fallback_plan(mut self, plan: impl Into<String>) -> Self {
        self.fallback_plan = plan.into();
        self
    }

    pub fn is_speak(&self) -> bool {
        self.action == ActionKind::Speak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_keep_text_invariant() {
        let s = Decision::speak("q", 0.9, Some(Strategy::Socratic), "What do you think?");
        assert!(s.is_speak());
        assert!(s.response_text.is_some());

        let w = Decision::wait("nothing", 0.4);
        assert_eq!(w.action, ActionKind::Wait);
        assert!(w.response_text.is_none());

        let u = Decision::update_model("minor", 1.7);
        assert_eq!(u.action, ActionKind::UpdateModel);
        assert!(u.response_text.is_none());
        assert_eq!(u.confidence, 1.0);
    }

    #[test]
    fn test_action_serializes_snake_case() {
        let json = serde_json::to_value(ActionKind::UpdateModel).unwrap();
        assert_eq!(json, "update_model");
    }
}

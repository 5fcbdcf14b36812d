//! 干预决策算法
//!
//! 有序规则链，第一条命中的规则胜出，之后的规则不再评估。规则顺序本身就是行为：
//! RULE_ORDER 是规则名的常量，测试会断言 RULES 与之逐项一致。

use crate::models::{ActionKind, Analysis, Decision, ErrorSeverity, ProfileView, StudentState, Strategy};

/// speak 决定缺少回复文本时的兜底句子
pub const FALLBACK_RESPONSE: &str = "I notice you might need some help. What are you working on?";

/// 规则名，按评估顺序
pub const RULE_ORDER: [&str; 6] = [
    "explicit_question",
    "critical_error_in_progress",
    "prolonged_silence",
    "low_confidence",
    "minor_error",
    "default_wait",
];

/// DECIDING 阶段的全部输入
#[derive(Clone, Debug)]
pub struct DecisionInput<'a> {
    pub analysis: &'a Analysis,
    pub silence_duration: f64,
    pub profile: &'a ProfileView,
    /// 当前主题（用于薄弱主题折扣）
    pub topic: Option<&'a str>,
}

/// 规则给出的裁决；speak 的文本由 ResponseComposer 另行生成
#[derive(Clone, Debug, PartialEq)]
pub struct Verdict {
    pub rule: &'static str,
    pub action: ActionKind,
    pub reasoning: String,
    pub confidence: f64,
    pub strategy: Option<Strategy>,
    pub fallback_plan: String,
}

impl Verdict {
    /// 组装最终 Decision；speak 没有文本时使用 FALLBACK_RESPONSE
    pub fn into_decision(self, response_text: Option<String>) -> Decision {
        let decision = match self.action {
            ActionKind::Speak => {
                let text = response_text
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_RESPONSE.to_string());
                Decision::speak(self.reasoning, self.confidence, self.strategy, text)
            }
            ActionKind::UpdateModel => Decision::update_model(self.reasoning, self.confidence),
            ActionKind::Wait => Decision::wait(self.reasoning, self.confidence),
        };
        decision.with_fallback_plan(self.fallback_plan)
    }
}

/// 规则评估时可见的上下文
struct RuleContext<'a> {
    input: &'a DecisionInput<'a>,
    effective_delay: f64,
    confidence_threshold: f64,
}

struct Rule {
    name: &'static str,
    applies: fn(&RuleContext<'_>) -> bool,
    verdict: fn(&RuleContext<'_>) -> Verdict,
}

const RULES: [Rule; 6] = [
    Rule {
        name: "explicit_question",
        applies: |c| c.input.analysis.explicit_question,
        verdict: |_| Verdict {
            rule: "explicit_question",
            action: ActionKind::Speak,
            reasoning: "Student asked an explicit question".to_string(),
            confidence: 0.9,
            strategy: Some(Strategy::Socratic),
            fallback_plan: "If the student is still unsure, offer a worked example".to_string(),
        },
    },
    Rule {
        name: "critical_error_in_progress",
        applies: |c| {
            c.input.analysis.error_severity == ErrorSeverity::Critical
                && c.input.analysis.student_state == StudentState::MakingProgress
        },
        verdict: |_| Verdict {
            rule: "critical_error_in_progress",
            action: ActionKind::Speak,
            reasoning: "Critical error while the student keeps building on it".to_string(),
            confidence: 0.85,
            strategy: Some(Strategy::Direct),
            fallback_plan: "Point at the faulty step and ask the student to re-check it".to_string(),
        },
    },
    Rule {
        name: "prolonged_silence",
        applies: |c| c.input.silence_duration >= 2.0 * c.effective_delay,
        verdict: |c| Verdict {
            rule: "prolonged_silence",
            action: ActionKind::Speak,
            reasoning: format!(
                "Prolonged silence: {:.1}s (intervention delay {:.1}s)",
                c.input.silence_duration, c.effective_delay
            ),
            confidence: 0.7,
            strategy: Some(Strategy::Hint),
            fallback_plan: "Ask an open question about the current step".to_string(),
        },
    },
    Rule {
        name: "low_confidence",
        applies: |c| c.input.analysis.confidence < c.confidence_threshold,
        verdict: |c| Verdict {
            rule: "low_confidence",
            action: ActionKind::Wait,
            reasoning: format!(
                "Insufficient confidence to act ({:.2} < {:.2})",
                c.input.analysis.confidence, c.confidence_threshold
            ),
            confidence: c.input.analysis.confidence,
            strategy: None,
            fallback_plan: "Keep observing".to_string(),
        },
    },
    Rule {
        name: "minor_error",
        applies: |c| c.input.analysis.error_severity == ErrorSeverity::Minor,
        verdict: |c| Verdict {
            rule: "minor_error",
            action: ActionKind::UpdateModel,
            reasoning: format!(
                "Minor {:?} error noted, not interrupting",
                c.input.analysis.error_type
            )
            .to_lowercase(),
            confidence: c.input.analysis.confidence,
            strategy: None,
            fallback_plan: "Revisit if the error repeats".to_string(),
        },
    },
    Rule {
        name: "default_wait",
        applies: |_| true,
        verdict: |c| Verdict {
            rule: "default_wait",
            action: ActionKind::Wait,
            reasoning: "Student appears to be working, continue observing".to_string(),
            confidence: c.input.analysis.confidence,
            strategy: None,
            fallback_plan: "Keep observing".to_string(),
        },
    },
];

/// 干预策略：持有置信度阈值，决策本身是纯函数
#[derive(Clone, Debug)]
pub struct InterventionPolicy {
    confidence_threshold: f64,
}

impl Default for InterventionPolicy {
    fn default() -> Self {
        Self::new(0.7)
    }
}

impl InterventionPolicy {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// 规则名（按评估顺序）
    pub fn rule_names() -> Vec<&'static str> {
        RULES.iter().map(|r| r.name).collect()
    }

    pub fn decide(&self, input: &DecisionInput<'_>) -> Verdict {
        let ctx = RuleContext {
            input,
            effective_delay: input.profile.effective_intervention_delay(input.topic),
            confidence_threshold: self.confidence_threshold,
        };
        for rule in RULES.iter() {
            if (rule.applies)(&ctx) {
                let verdict = (rule.verdict)(&ctx);
                tracing::debug!(rule = rule.name, action = %verdict.action, "decision rule matched");
                return verdict;
            }
        }
        // default_wait 恒成立，不会走到这里
        (RULES[RULES.len() - 1].verdict)(&ctx)
    }
}

//! 教学分析类能力（只读、纯计算）
//!
//! 推理方在决定是否介入前用它们核对学生的算式、估计困惑程度、判断是否提问或卡住，
//! 并据此得到建议的干预策略。转写与静默时长等参数缺省时从会话缓冲读取。

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::TutorError;
use crate::models::Strategy;
use crate::tools::context::ToolContext;
use crate::tools::registry::{Capability, CapabilityClass};
use crate::tools::schema::{parse_args, schema_of};

/// 判定答案正确的绝对误差
const ANSWER_TOLERANCE: f64 = 1e-4;
/// 表达式最大长度（字符）
const MAX_EXPRESSION_CHARS: usize = 256;
/// 括号与一元运算的最大嵌套深度
const MAX_NESTING: usize = 32;

const CONFUSION_PHRASES: &[&str] = &[
    "i don't understand",
    "i'm confused",
    "what does this mean",
    "i don't get it",
    "huh",
    "wait",
    "um",
    "uh",
    "hmm",
    "i'm not sure",
    "i think maybe",
    "is this right",
    "i don't know",
];

const HESITATION_WORDS: &[&str] = &["um", "uh", "hmm", "err"];

const QUESTION_PHRASES: &[&str] = &[
    "how do i",
    "what is",
    "what does",
    "why is",
    "why does",
    "can you help",
    "could you help",
    "i need help",
    "help me",
    "can you explain",
    "could you explain",
];

const QUESTION_WORDS: &[&str] = &["who", "what", "where", "when", "why", "how"];

const STUCK_PHRASES: &[&str] = &[
    "i'm stuck",
    "i can't figure this out",
    "i don't know what to do",
    "where do i start",
    "i give up",
];

/// 静默超过该秒数视为长时间静默
const LONG_SILENCE_SECS: f64 = 10.0;
/// 白板超过该秒数未变视为停滞
const STALE_WHITEBOARD_SECS: f64 = 15.0;
const STUCK_THRESHOLD: f64 = 0.4;

// ---- 算式求值 ----

#[derive(Clone, Copy, Debug, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid number: {text}"))?;
                tokens.push(Token::Num(value));
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            '*' | '×' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' | '÷' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            other => return Err(format!("Unsupported character: {other:?}")),
        }
    }
    Ok(tokens)
}

/// 递归下降求值：加减 < 乘除 < 一元正负 < 乘方（右结合）
struct Evaluator {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Evaluator {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err("Expression is nested too deeply".to_string());
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op @ (Token::Plus | Token::Minus)) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == Token::Plus { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(op @ (Token::Star | Token::Slash)) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op == Token::Slash {
                if rhs == 0.0 {
                    return Err("Division by zero".to_string());
                }
                value /= rhs;
            } else {
                value *= rhs;
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(-v)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.enter()?;
                let v = self.unary()?;
                self.depth -= 1;
                Ok(v)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if self.peek() == Some(Token::Caret) {
            self.pos += 1;
            self.enter()?;
            let exponent = self.unary()?;
            self.depth -= 1;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(v)) => Ok(v),
            Some(Token::LParen) => {
                self.enter()?;
                let v = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(v),
                    _ => Err("Invalid expression syntax: missing ')'".to_string()),
                }
            }
            Some(t) => Err(format!("Invalid expression syntax: unexpected {t:?}")),
            None => Err("Invalid expression syntax: unexpected end of expression".to_string()),
        }
    }
}

/// 只支持数字、四则运算、乘方与括号；不执行任何代码
pub fn evaluate_expression(expression: &str) -> Result<f64, String> {
    if expression.chars().count() > MAX_EXPRESSION_CHARS {
        return Err("Expression is too long".to_string());
    }
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err("Invalid expression syntax: empty expression".to_string());
    }
    let mut eval = Evaluator {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = eval.expr()?;
    if let Some(t) = eval.peek() {
        return Err(format!("Invalid expression syntax: unexpected {t:?}"));
    }
    if !value.is_finite() {
        return Err("Evaluation error: result is not finite".to_string());
    }
    Ok(value)
}

/// 核对算式与学生答案
pub fn verify_calculation(expression: &str, student_answer: &str) -> Value {
    let answer = student_answer.trim();
    let correct_answer = match evaluate_expression(expression.trim()) {
        Ok(v) => v,
        Err(error) => {
            return json!({"valid": false, "correct": false, "error": error});
        }
    };
    match answer.parse::<f64>().ok().filter(|v| v.is_finite()) {
        Some(student_value) => {
            let difference = (correct_answer - student_value).abs();
            json!({
                "valid": true,
                "correct_answer": correct_answer,
                "student_answer": student_value,
                "correct": difference < ANSWER_TOLERANCE,
                "difference": difference,
            })
        }
        None => json!({
            "valid": true,
            "correct_answer": correct_answer,
            "student_answer": answer,
            "correct": false,
            "error": "Student answer is not a number",
        }),
    }
}

// ---- 转写分析 ----

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfusionLevel {
    Low,
    Medium,
    High,
}

impl ConfusionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfusionLevel::Low => "low",
            ConfusionLevel::Medium => "medium",
            ConfusionLevel::High => "high",
        }
    }

    fn from_score(score: f64) -> Self {
        if score < 0.2 {
            ConfusionLevel::Low
        } else if score < 0.5 {
            ConfusionLevel::Medium
        } else {
            ConfusionLevel::High
        }
    }
}

fn count_all(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().map(|n| haystack.matches(n).count()).sum()
}

fn found<'a>(haystack: &str, needles: &[&'a str]) -> Vec<&'a str> {
    needles.iter().copied().filter(|n| haystack.contains(n)).collect()
}

/// 困惑度：提示短语每个 0.3、犹豫词每个 0.1、问号每个 0.2，上限 1.0
pub fn assess_confusion_level(transcript: &str) -> Value {
    let lower = transcript.to_lowercase();
    let indicator_count = count_all(&lower, CONFUSION_PHRASES);
    let hesitation_count = count_all(&lower, HESITATION_WORDS);
    let question_count = transcript.matches('?').count();

    let score = if transcript.split_whitespace().next().is_none() {
        0.0
    } else {
        (indicator_count as f64 * 0.3 + hesitation_count as f64 * 0.1 + question_count as f64 * 0.2).min(1.0)
    };
    json!({
        "confusion_score": score,
        "confusion_level": ConfusionLevel::from_score(score).as_str(),
        "indicator_count": indicator_count,
        "hesitation_count": hesitation_count,
        "question_count": question_count,
        "indicators_found": found(&lower, CONFUSION_PHRASES),
    })
}

pub fn detect_question(transcript: &str) -> Value {
    let lower = transcript.to_lowercase();
    let has_question_mark = transcript.contains('?');
    let has_question_indicator = QUESTION_PHRASES.iter().any(|p| lower.contains(p));
    let trimmed = lower.trim();
    let starts_with_question_word = QUESTION_WORDS.iter().any(|w| trimmed.starts_with(w));
    let confidence = if has_question_mark {
        0.9
    } else if has_question_indicator {
        0.7
    } else {
        0.5
    };
    json!({
        "is_question": has_question_mark || has_question_indicator || starts_with_question_word,
        "has_question_mark": has_question_mark,
        "has_question_indicator": has_question_indicator,
        "starts_with_question_word": starts_with_question_word,
        "confidence": confidence,
    })
}

/// 卡住：明确表述 0.5、长时间静默 0.3、白板停滞 0.3、同一长词出现超过三次 0.2；
/// 得分超过 0.4 视为卡住
pub fn detect_stuck_pattern(transcript: &str, silence_duration: f64, whiteboard_unchanged: f64) -> Value {
    let lower = transcript.to_lowercase();
    let has_stuck_indicator = STUCK_PHRASES.iter().any(|p| lower.contains(p));
    let long_silence = silence_duration > LONG_SILENCE_SECS;
    let unchanged_whiteboard = whiteboard_unchanged > STALE_WHITEBOARD_SECS;

    let mut freq = std::collections::HashMap::new();
    for word in lower.split_whitespace().filter(|w| w.chars().count() > 3) {
        *freq.entry(word).or_insert(0usize) += 1;
    }
    let has_repetition = freq.values().any(|&n| n > 3);

    let mut score: f64 = 0.0;
    if has_stuck_indicator {
        score += 0.5;
    }
    if long_silence {
        score += 0.3;
    }
    if unchanged_whiteboard {
        score += 0.3;
    }
    if has_repetition {
        score += 0.2;
    }
    let score = score.min(1.0);
    json!({
        "is_stuck": score > STUCK_THRESHOLD,
        "stuck_score": score,
        "has_stuck_indicator": has_stuck_indicator,
        "long_silence": long_silence,
        "unchanged_whiteboard": unchanged_whiteboard,
        "has_repetition": has_repetition,
        "indicators_found": found(&lower, STUCK_PHRASES),
    })
}

pub fn suggest_strategy(
    confusion: ConfusionLevel,
    is_question: bool,
    is_stuck: bool,
    error_detected: bool,
) -> Strategy {
    use ConfusionLevel::*;
    match (confusion, is_question, is_stuck, error_detected) {
        (_, true, _, _) => Strategy::Direct,
        (High, _, true, _) => Strategy::Scaffolding,
        (Low, _, _, true) => Strategy::Socratic,
        (Medium | High, _, _, true) => Strategy::Hint,
        (High, _, false, _) => Strategy::Example,
        _ => Strategy::Socratic,
    }
}

/// 缺省时取会话最近窗口内的转写
fn transcript_or_recent(ctx: &ToolContext, transcript: Option<String>) -> String {
    transcript.unwrap_or_else(|| ctx.session.joined_transcript(ctx.settings.transcript_window))
}

fn non_negative(v: Option<f64>) -> Option<f64> {
    v.filter(|s| s.is_finite() && *s >= 0.0)
}

// ---- 能力 ----

#[derive(Deserialize, schemars::JsonSchema)]
struct VerifyArgs {
    /// 要计算的算式，例如 "(5 + 3) * 2"
    expression: String,
    /// 学生给出的答案
    student_answer: String,
}

/// verify_calculation
pub struct VerifyCalculation;

#[async_trait]
impl Capability for VerifyCalculation {
    fn name(&self) -> &str {
        "verify_calculation"
    }

    fn description(&self) -> &str {
        "Verify whether an arithmetic calculation is correct. Evaluates the expression (+ - * / ^ and parentheses) and compares it with the student's answer."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<VerifyArgs>()
    }

    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: VerifyArgs = parse_args(self.name(), args)?;
        let result = verify_calculation(&args.expression, &args.student_answer);
        tracing::debug!(expression = %args.expression, correct = %result["correct"], "calculation verified");
        Ok(result)
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct TranscriptOnlyArgs {
    /// 要分析的转写；省略时使用最近的会话转写
    #[serde(default)]
    transcript: Option<String>,
}

/// assess_confusion_level
pub struct AssessConfusionLevel;

#[async_trait]
impl Capability for AssessConfusionLevel {
    fn name(&self) -> &str {
        "assess_confusion_level"
    }

    fn description(&self) -> &str {
        "Analyze student speech for confusion indicators. Returns a confusion score (0-1) and level (low/medium/high)."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<TranscriptOnlyArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: TranscriptOnlyArgs = parse_args(self.name(), args)?;
        Ok(assess_confusion_level(&transcript_or_recent(ctx, args.transcript)))
    }
}

/// detect_question
pub struct DetectQuestion;

#[async_trait]
impl Capability for DetectQuestion {
    fn name(&self) -> &str {
        "detect_question"
    }

    fn description(&self) -> &str {
        "Detect whether the student asked a question, explicitly or implicitly (e.g. 'I need help with this')."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<TranscriptOnlyArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: TranscriptOnlyArgs = parse_args(self.name(), args)?;
        Ok(detect_question(&transcript_or_recent(ctx, args.transcript)))
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct StuckArgs {
    /// 省略时使用最近的会话转写
    #[serde(default)]
    transcript: Option<String>,
    /// 学生静默的秒数；省略时取会话当前值
    #[serde(default)]
    silence_duration: Option<f64>,
    /// 白板未变化的秒数；省略时取距上次白板更新的时间
    #[serde(default)]
    whiteboard_unchanged_duration: Option<f64>,
}

/// detect_stuck_pattern
pub struct DetectStuckPattern;

#[async_trait]
impl Capability for DetectStuckPattern {
    fn name(&self) -> &str {
        "detect_stuck_pattern"
    }

    fn description(&self) -> &str {
        "Detect whether the student appears stuck, from stuck phrases, long silence, an unchanged whiteboard and repeated words."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<StuckArgs>()
    }

    async fn invoke(&self, ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: StuckArgs = parse_args(self.name(), args)?;
        let silence = non_negative(args.silence_duration).unwrap_or_else(|| ctx.session.silence_duration());
        let unchanged = non_negative(args.whiteboard_unchanged_duration)
            .unwrap_or_else(|| ctx.session.whiteboard().age.unwrap_or(0.0));
        let transcript = transcript_or_recent(ctx, args.transcript);
        Ok(detect_stuck_pattern(&transcript, silence, unchanged))
    }
}

#[derive(Deserialize, schemars::JsonSchema)]
struct StrategyArgs {
    confusion_level: ConfusionLevel,
    #[serde(default)]
    is_question: bool,
    #[serde(default)]
    is_stuck: bool,
    /// 学生的作答中是否发现错误
    #[serde(default)]
    error_detected: bool,
}

/// suggest_intervention_strategy
pub struct SuggestInterventionStrategy;

#[async_trait]
impl Capability for SuggestInterventionStrategy {
    fn name(&self) -> &str {
        "suggest_intervention_strategy"
    }

    fn description(&self) -> &str {
        "Suggest a teaching strategy (direct, scaffolding, socratic, hint, example) from the confusion level and whether the student asked, is stuck, or made an error."
    }

    fn class(&self) -> CapabilityClass {
        CapabilityClass::Observation
    }

    fn parameters_schema(&self) -> Value {
        schema_of::<StrategyArgs>()
    }

    async fn invoke(&self, _ctx: &ToolContext, args: Value) -> Result<Value, TutorError> {
        let args: StrategyArgs = parse_args(self.name(), args)?;
        let strategy = suggest_strategy(args.confusion_level, args.is_question, args.is_stuck, args.error_detected);
        Ok(json!({"strategy": strategy.as_str()}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::harness;

    #[test]
    fn test_verify_correct_and_incorrect_answers() {
        let ok = verify_calculation("2 + 2", "4");
        assert_eq!(ok["valid"], true);
        assert_eq!(ok["correct"], true);
        assert_eq!(ok["correct_answer"], 4.0);

        let wrong = verify_calculation("2 + 2", "5");
        assert_eq!(wrong["correct"], false);
        assert_eq!(wrong["student_answer"], 5.0);
        assert_eq!(wrong["difference"], 1.0);

        assert_eq!(verify_calculation("(5 + 3) * 2", "16")["correct"], true);
        assert_eq!(verify_calculation("3 * 7", " 21 ")["correct"], true);
        assert_eq!(verify_calculation("1 / 3", "0.33333")["correct"], true);
    }

    #[test]
    fn test_verify_reports_bad_input() {
        let not_number = verify_calculation("2 + 2", "four");
        assert_eq!(not_number["valid"], true);
        assert_eq!(not_number["correct"], false);
        assert_eq!(not_number["error"], "Student answer is not a number");

        assert_eq!(verify_calculation("2 + abc", "4")["valid"], false);
        assert_eq!(verify_calculation("(2 + 2", "4")["valid"], false);
        assert_eq!(verify_calculation("", "0")["valid"], false);
        let div = verify_calculation("5 / (2 - 2)", "0");
        assert_eq!(div["valid"], false);
        assert_eq!(div["error"], "Division by zero");
        assert_eq!(verify_calculation("10 ^ 400", "0")["valid"], false);
    }

    #[test]
    fn test_evaluate_precedence() {
        assert_eq!(evaluate_expression("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate_expression("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate_expression("2 ** 3").unwrap(), 8.0);
        assert_eq!(evaluate_expression("-2 ^ 2").unwrap(), -4.0);
        assert_eq!(evaluate_expression("2 ^ -1").unwrap(), 0.5);
        assert_eq!(evaluate_expression("-(3 - 5)").unwrap(), 2.0);
        assert_eq!(evaluate_expression("6 ÷ 3 × 2").unwrap(), 4.0);

        let deep = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert!(evaluate_expression(&deep).is_err());
    }

    #[test]
    fn test_confusion_levels() {
        let low = assess_confusion_level("I solved this problem by adding two and two");
        assert_eq!(low["confusion_level"], "low");
        assert!(low["confusion_score"].as_f64().unwrap() < 0.2);

        let medium = assess_confusion_level("Um, I think maybe this is right? I'm not sure");
        assert_ne!(medium["confusion_level"], "low");
        assert!(medium["hesitation_count"].as_u64().unwrap() > 0);

        let high = assess_confusion_level("I don't understand this at all. Um, what does this mean? I'm confused");
        assert_eq!(high["confusion_level"], "high");
        assert!(high["confusion_score"].as_f64().unwrap() > 0.5);
        assert!(!high["indicators_found"].as_array().unwrap().is_empty());

        assert_eq!(assess_confusion_level("")["confusion_score"], 0.0);
    }

    #[test]
    fn test_question_detection() {
        let q = detect_question("What is two plus two?");
        assert_eq!(q["is_question"], true);
        assert_eq!(q["has_question_mark"], true);
        assert_eq!(q["starts_with_question_word"], true);
        assert_eq!(q["confidence"], 0.9);

        let help = detect_question("Can you help me with this");
        assert_eq!(help["is_question"], true);
        assert_eq!(help["has_question_indicator"], true);
        assert_eq!(help["confidence"], 0.7);

        assert_eq!(detect_question("How do I solve this problem")["starts_with_question_word"], true);
        assert_eq!(detect_question("I need help with this")["is_question"], true);
        assert_eq!(detect_question("I solved the problem correctly")["is_question"], false);
        assert_eq!(detect_question("I think x equals 5")["is_question"], false);
    }

    #[test]
    fn test_stuck_detection() {
        let fine = detect_stuck_pattern("I'm working through this problem step by step", 2.0, 5.0);
        assert_eq!(fine["is_stuck"], false);

        let said = detect_stuck_pattern("I'm stuck and don't know what to do", 5.0, 10.0);
        assert_eq!(said["is_stuck"], true);
        assert_eq!(said["has_stuck_indicator"], true);

        let quiet = detect_stuck_pattern("", 15.0, 20.0);
        assert_eq!(quiet["is_stuck"], true);
        assert_eq!(quiet["long_silence"], true);
        assert_eq!(quiet["unchanged_whiteboard"], true);

        let looping = detect_stuck_pattern("maybe this maybe this maybe this maybe this", 5.0, 5.0);
        assert_eq!(looping["has_repetition"], true);
        assert_eq!(looping["is_stuck"], false);
    }

    #[test]
    fn test_strategy_selection() {
        use ConfusionLevel::*;
        assert_eq!(suggest_strategy(Low, true, false, false), Strategy::Direct);
        assert_eq!(suggest_strategy(High, false, true, false), Strategy::Scaffolding);
        assert_eq!(suggest_strategy(Low, false, false, true), Strategy::Socratic);
        assert_eq!(suggest_strategy(High, false, false, true), Strategy::Hint);
        assert_eq!(suggest_strategy(Medium, false, false, true), Strategy::Hint);
        assert_eq!(suggest_strategy(Low, false, true, false), Strategy::Socratic);
        assert_eq!(suggest_strategy(High, false, false, false), Strategy::Example);
        assert_eq!(suggest_strategy(Medium, false, false, false), Strategy::Socratic);
    }

    #[tokio::test]
    async fn test_capabilities_read_session_defaults() {
        let h = harness();
        h.session.ingest_transcript("I'm stuck, where do I start?", None);
        h.clock.advance(12.0);

        let stuck = DetectStuckPattern.invoke(&h.ctx, json!({})).await.unwrap();
        assert_eq!(stuck["has_stuck_indicator"], true);
        assert_eq!(stuck["long_silence"], true);
        assert_eq!(stuck["is_stuck"], true);

        let question = DetectQuestion.invoke(&h.ctx, json!({})).await.unwrap();
        assert_eq!(question["has_question_mark"], true);

        let explicit = AssessConfusionLevel
            .invoke(&h.ctx, json!({"transcript": "I solved it by adding 2 and 2"}))
            .await
            .unwrap();
        assert_eq!(explicit["confusion_level"], "low");
    }

    #[tokio::test]
    async fn test_capability_argument_errors() {
        let h = harness();
        let err = VerifyCalculation
            .invoke(&h.ctx, json!({"expression": "2 + 2"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_arguments");

        let err = SuggestInterventionStrategy
            .invoke(&h.ctx, json!({"confusion_level": "extreme"}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_arguments");

        let ok = SuggestInterventionStrategy
            .invoke(&h.ctx, json!({"confusion_level": "high", "is_stuck": true}))
            .await
            .unwrap();
        assert_eq!(ok["strategy"], "scaffolding");
    }
}

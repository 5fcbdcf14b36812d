//! speak 决定的回复文本生成
//!
//! 生成失败不会让周期失败：LlmComposer 出错或返回空文本时使用 FALLBACK_RESPONSE。

use std::sync::Arc;

use async_trait::async_trait;

use crate::cognitive::decision::{Verdict, FALLBACK_RESPONSE};
use crate::llm::{LlmClient, Message};
use crate::models::{Analysis, Strategy};

/// 生成回复时可用的信息
#[derive(Clone, Debug)]
pub struct ComposeRequest<'a> {
    pub verdict: &'a Verdict,
    pub analysis: &'a Analysis,
    /// 最近 30 秒的转写
    pub transcript: &'a str,
    pub topic: Option<&'a str>,
}

#[async_trait]
pub trait ResponseComposer: Send + Sync {
    async fn compose(&self, request: &ComposeRequest<'_>) -> String;
}

/// 固定模板，按策略选句子（离线 / 测试）
#[derive(Default)]
pub struct TemplateComposer;

#[async_trait]
impl ResponseComposer for TemplateComposer {
    async fn compose(&self, request: &ComposeRequest<'_>) -> String {
        let text = match request.verdict.strategy {
            Some(Strategy::Socratic) => "Good question! What do you already know that might help here?",
            Some(Strategy::Direct) => "Let's pause for a second and double-check that last step together.",
            Some(Strategy::Hint) => "Take your time. Which part of the problem are you looking at right now?",
            Some(Strategy::Example) => "Let's try a smaller example first and see what happens.",
            Some(Strategy::Scaffolding) => "Let's break this into smaller steps. What's the first thing to do?",
            Some(Strategy::Analogical) => "Does this remind you of a problem you've solved before?",
            None => FALLBACK_RESPONSE,
        };
        text.to_string()
    }
}

/// 由推理方生成 1-2 句的回复
pub struct LlmComposer {
    llm: Arc<dyn LlmClient>,
}

impl LlmComposer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

const COMPOSER_SYSTEM_PROMPT: &str = "You are a patient, supportive math tutor.\n\
Generate a brief, helpful response based on the student's current state.\n\
Use Socratic questioning when appropriate. Be encouraging but concise.\n\
Keep responses to 1-2 sentences.";

#[async_trait]
impl ResponseComposer for LlmComposer {
    async fn compose(&self, request: &ComposeRequest<'_>) -> String {
        let strategy = request
            .verdict
            .strategy
            .map(|s| s.as_str())
            .unwrap_or("any");
        let transcript = if request.transcript.trim().is_empty() {
            "No recent speech"
        } else {
            request.transcript
        };
        let user = format!(
            "Student state: {:?}\nIntervention reason: {}\nStrategy: {}\nTopic: {}\nRecent transcript: {}\n\nGenerate a short, helpful response:",
            request.analysis.student_state,
            request.verdict.reasoning,
            strategy,
            request.topic.unwrap_or("unknown"),
            transcript,
        );
        let messages = vec![Message::system(COMPOSER_SYSTEM_PROMPT), Message::user(user)];
        match self.llm.complete(&messages).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => FALLBACK_RESPONSE.to_string(),
            Err(e) => {
                tracing::error!(error = %e, "response generation failed, using fallback");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

//! Mock LLM 客户端（用于测试与离线演示，无需 API）
//!
//! 按顺序回放预设输出；脚本用完后返回 fallback（默认结束本周期的 end_observation_cycle 调用）。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message};

const DEFAULT_FALLBACK: &str =
    r#"{"tool": "end_observation_cycle", "args": {"next_action": "wait", "reasoning": "mock: nothing to do"}}"#;

pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: String,
    /// 每次调用收到的消息（测试断言用）
    calls: Mutex<Vec<Vec<Message>>>,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new(Vec::<String>::new())
    }
}

impl MockLlmClient {
    pub fn new<S: Into<String>>(outputs: impl IntoIterator<Item = S>) -> Self {
        Self {
            script: Mutex::new(outputs.into_iter().map(|s| Ok(s.into())).collect()),
            fallback: DEFAULT_FALLBACK.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 脚本耗尽后一直返回同一输出
    pub fn repeating(output: impl Into<String>) -> Self {
        Self {
            fallback: output.into(),
            ..Self::default()
        }
    }

    pub fn push_error(&self, err: LlmError) {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(Err(err));
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn last_call(&self) -> Option<Vec<Message>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(messages.to_vec());
        let next = self
            .script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

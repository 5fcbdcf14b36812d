//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};

use crate::config::LlmSection;

/// 按配置创建 LLM 客户端：provider = "openai" 时走 OpenAI 兼容端点，其它一律使用 Mock
pub fn create_llm_from_config(section: &LlmSection) -> Arc<dyn LlmClient> {
    match section.provider.as_str() {
        "openai" => {
            let api_key = std::env::var(&section.api_key_env).ok();
            if api_key.is_none() {
                tracing::warn!(env = %section.api_key_env, "API key not set, requests will fail");
            }
            Arc::new(OpenAiClient::new(
                section.base_url.as_deref(),
                &section.model,
                api_key,
                section.temperature,
            ))
        }
        other => {
            tracing::info!(provider = %other, "Using mock reasoner");
            Arc::new(MockLlmClient::default())
        }
    }
}

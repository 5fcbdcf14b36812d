//! LLM 客户端抽象
//!
//! 推理方（分析、回复生成、工具循环）都通过 LlmClient::complete 调用；后端可以是 OpenAI 兼容端点或脚本化 Mock。

use async_trait::async_trait;
use thiserror::Error;

use super::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Empty response")]
    EmptyResponse,

    #[error("Malformed output: {0}")]
    Malformed(String),
}

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

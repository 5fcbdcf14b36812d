//! 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 TutorError 决定 AbortCycle / ReportToReasoner / ForceWait / TerminateSession。
//! 单个周期内的失败永远不会终止会话，只有传输层断开才会。

use std::time::Duration;

use thiserror::Error;

use crate::llm::LlmError;

/// 认知核心运行中可能出现的错误
#[derive(Error, Debug)]
pub enum TutorError {
    /// 拉取请求在超时内未得到响应（可恢复，周期中止）
    #[error("Request timeout: {resource} ({request_id}) after {timeout:?}")]
    RequestTimeout {
        request_id: String,
        resource: String,
        timeout: Duration,
    },

    /// 会话关闭时仍在等待的请求
    #[error("Request cancelled: {0}")]
    RequestCancelled(String),

    /// 工具循环收到未注册的能力名（作为结构化错误回传给推理方）
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid arguments for {capability}: {reason}")]
    InvalidArguments { capability: String, reason: String },

    /// 组装出的 Observation 未通过基本校验
    #[error("Malformed observation: {0}")]
    MalformedObservation(String),

    /// Action Router 执行 speak / update_model 失败
    #[error("Action execution failed: {0}")]
    ActionExecutionFailure(String),

    /// 工具循环超过迭代上限（强制以 wait 结束）
    #[error("Iteration cap exceeded: {0}")]
    IterationCapExceeded(usize),

    #[error("Capability timeout: {0}")]
    CapabilityTimeout(String),

    /// 传输层错误（断开连接会终止会话）
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Reasoner error: {0}")]
    Reasoner(#[from] LlmError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<rusqlite::Error> for TutorError {
    fn from(e: rusqlite::Error) -> Self {
        TutorError::Storage(e.to_string())
    }
}

impl TutorError {
    /// 稳定的错误码，用于回传给推理方与写入 CycleRecord
    pub fn code(&self) -> &'static str {
        match self {
            TutorError::RequestTimeout { .. } => "request_timeout",
            TutorError::RequestCancelled(_) => "request_cancelled",
            TutorError::UnknownCapability(_) => "unknown_capability",
            TutorError::InvalidArguments { .. } => "invalid_arguments",
            TutorError::MalformedObservation(_) => "malformed_observation",
            TutorError::ActionExecutionFailure(_) => "action_execution_failure",
            TutorError::IterationCapExceeded(_) => "iteration_cap_exceeded",
            TutorError::CapabilityTimeout(_) => "capability_timeout",
            TutorError::Transport(_) => "transport",
            TutorError::Reasoner(_) => "reasoner",
            TutorError::Storage(_) => "storage",
            TutorError::Config(_) => "config",
        }
    }

    /// 回传给推理方的结构化错误负载
    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
        })
    }
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 中止当前周期，回到 IDLE（记录失败）
    AbortCycle,
    /// 将错误作为工具结果回传给推理方，循环继续
    ReportToReasoner(String),
    /// 强制以 wait 结束当前周期
    ForceWait,
    /// 终止会话（仅传输层断开）
    TerminateSession,
}

//! 错误恢复引擎
//!
//! 根据 TutorError 类型返回 RecoveryAction，供周期控制器与工具循环决定是中止周期、回传错误、强制 wait 还是结束会话。

use crate::core::{RecoveryAction, TutorError};

/// 将错误映射为可执行动作
#[derive(Debug, Default, Clone, Copy)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &TutorError) -> RecoveryAction {
        match err {
            TutorError::UnknownCapability(name) => RecoveryAction::ReportToReasoner(format!(
                "Capability '{name}' is not registered. Use one of the listed capabilities."
            )),
            TutorError::InvalidArguments { capability, reason } => RecoveryAction::ReportToReasoner(
                format!("Arguments for '{capability}' are invalid: {reason}"),
            ),
            TutorError::CapabilityTimeout(name) => {
                RecoveryAction::ReportToReasoner(format!("Capability '{name}' timed out"))
            }
            // 工具内部的动作失败也回传，由推理方决定是否重试
            TutorError::ActionExecutionFailure(msg) => {
                RecoveryAction::ReportToReasoner(format!("Action failed: {msg}"))
            }
            TutorError::IterationCapExceeded(_) => RecoveryAction::ForceWait,
            TutorError::Transport(_) => RecoveryAction::TerminateSession,
            TutorError::RequestTimeout { .. }
            | TutorError::RequestCancelled(_)
            | TutorError::MalformedObservation(_)
            | TutorError::Reasoner(_)
            | TutorError::Storage(_)
            | TutorError::Config(_) => RecoveryAction::AbortCycle,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_recovery_unknown_capability() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&TutorError::UnknownCapability("fly".to_string()));
        match action {
            RecoveryAction::ReportToReasoner(msg) => assert!(msg.contains("fly")),
            other => panic!("Expected ReportToReasoner, got {:?}", other),
        }
    }

    #[test]
    fn test_recovery_request_timeout_aborts_cycle() {
        let engine = RecoveryEngine::new();
        let err = TutorError::RequestTimeout {
            request_id: "req_1".to_string(),
            resource: "whiteboard".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(engine.handle(&err), RecoveryAction::AbortCycle);
        assert_eq!(err.code(), "request_timeout");
    }

    #[test]
    fn test_recovery_iteration_cap_forces_wait() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&TutorError::IterationCapExceeded(10)),
            RecoveryAction::ForceWait
        );
    }

    #[test]
    fn test_recovery_transport_terminates_session() {
        let engine = RecoveryEngine::new();
        assert_eq!(
            engine.handle(&TutorError::Transport("closed".to_string())),
            RecoveryAction::TerminateSession
        );
    }

    #[test]
    fn test_recovery_reasoner_error() {
        let engine = RecoveryEngine::new();
        let err = TutorError::Reasoner(LlmError::EmptyResponse);
        assert_eq!(engine.handle(&err), RecoveryAction::AbortCycle);
    }

    #[test]
    fn test_error_payload_shape() {
        let payload = TutorError::UnknownCapability("x".to_string()).to_payload();
        assert_eq!(payload["error"], "unknown_capability");
        assert!(payload["message"].as_str().unwrap().contains("x"));
    }
}

//! 能力执行器
//!
//! 持有 CapabilityRegistry 与单次调用超时，execute(name, args) 在超时内分发，
//! 超时转为 CapabilityTimeout；每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::TutorError;
use crate::tools::context::ToolContext;
use crate::tools::registry::{Capability, CapabilityRegistry};

pub struct CapabilityExecutor {
    registry: CapabilityRegistry,
    timeout: Duration,
}

impl CapabilityExecutor {
    pub fn new(registry: CapabilityRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// 执行指定能力；未注册返回 UnknownCapability，超时返回 CapabilityTimeout
    pub async fn execute(
        &self,
        ctx: &ToolContext,
        name: &str,
        args: Value,
    ) -> Result<Value, TutorError> {
        let start = Instant::now();
        let preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.dispatch(ctx, name, args)).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(e)) => e.code(),
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "session_id": ctx.session.session_id(),
            "cycle": ctx.cycle,
            "capability": name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": preview,
        });
        tracing::info!(audit = %audit, "capability");

        match result {
            Ok(r) => r,
            Err(_) => Err(TutorError::CapabilityTimeout(name.to_string())),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.registry.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.registry.names()
    }
}

pub(crate) fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::CapabilityClass;
    use crate::tools::test_support::harness;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl Capability for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        fn class(&self) -> CapabilityClass {
            CapabilityClass::Control
        }
        async fn invoke(&self, _ctx: &ToolContext, _args: Value) -> Result<Value, TutorError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_timeout() {
        let h = harness();
        let mut registry = CapabilityRegistry::new();
        registry.register(Slow);
        let exec = CapabilityExecutor::new(registry, Duration::from_secs(2));
        let err = exec.execute(&h.ctx, "slow", Value::Null).await.unwrap_err();
        assert!(matches!(err, TutorError::CapabilityTimeout(ref n) if n == "slow"));
    }

    #[tokio::test]
    async fn test_execute_unknown_capability() {
        let h = harness();
        let exec = CapabilityExecutor::new(CapabilityRegistry::with_defaults(), Duration::from_secs(2));
        let err = exec
            .execute(&h.ctx, "teleport", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::UnknownCapability(ref n) if n == "teleport"));
        assert!(h.outbound.sent().is_empty());
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = serde_json::json!({"text": "x".repeat(500)});
        let p = args_preview(&long);
        assert!(p.ends_with("..."));
        assert_eq!(p.chars().count(), 203);
    }
}

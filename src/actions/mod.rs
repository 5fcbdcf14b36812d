//! Action Router：执行 ACTING 阶段的 Decision
//!
//! speak 经传输层发送 ai_response；update_model 只写长期档案（追加笔记），不打扰学生；wait 什么也不做。
//! 档案写入只发生在这里和工具循环的 update_* 能力中。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::core::TutorError;
use crate::models::{ActionKind, Decision};
use crate::storage::ProfileStore;
use crate::transport::Outbound;

/// 执行动作所需的会话信息
#[derive(Clone, Debug)]
pub struct ActionContext {
    pub session_id: String,
    pub student_id: String,
    pub cycle: u64,
}

#[async_trait]
pub trait ActionRouter: Send + Sync {
    async fn execute(&self, decision: &Decision, ctx: &ActionContext) -> Result<(), TutorError>;
}

pub struct ClientActionRouter {
    outbound: Arc<dyn Outbound>,
    profiles: Arc<dyn ProfileStore>,
}

impl ClientActionRouter {
    pub fn new(outbound: Arc<dyn Outbound>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { outbound, profiles }
    }
}

#[async_trait]
impl ActionRouter for ClientActionRouter {
    async fn execute(&self, decision: &Decision, ctx: &ActionContext) -> Result<(), TutorError> {
        match decision.action {
            ActionKind::Speak => {
                let text = decision.response_text.as_deref().ok_or_else(|| {
                    TutorError::ActionExecutionFailure("speak decision without text".to_string())
                })?;
                let message = json!({
                    "type": "ai_response",
                    "text": text,
                    "strategy": decision.strategy.map(|s| s.as_str()),
                    "cycle": ctx.cycle,
                });
                self.outbound
                    .send_json(message)
                    .await
                    .map_err(|e| TutorError::ActionExecutionFailure(format!("speak: {e}")))?;
                tracing::info!(cycle = ctx.cycle, session = %ctx.session_id, "intervention delivered");
            }
            ActionKind::UpdateModel => {
                self.profiles
                    .append_note(&ctx.student_id, &decision.reasoning)
                    .await
                    .map_err(|e| TutorError::ActionExecutionFailure(format!("update_model: {e}")))?;
                tracing::info!(cycle = ctx.cycle, student = %ctx.student_id, "student model updated");
            }
            ActionKind::Wait => {}
        }
        Ok(())
    }
}

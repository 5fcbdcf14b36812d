//! 周期过程事件：推送给调试面板（网关发送为 {"type": "debug", "event": ...}）

use serde::Serialize;

use crate::core::CyclePhase;

/// 单个周期内的过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CycleEvent {
    /// 触发检测通过，周期开始
    CycleStarted { cycle: u64, triggers: Vec<String> },
    /// 进入新阶段
    PhaseChanged { cycle: u64, phase: CyclePhase },
    /// 向客户端拉取资源
    PullIssued { cycle: u64, resource: String },
    /// 规则决策结果
    Decided {
        cycle: u64,
        rule: String,
        action: String,
        reasoning: String,
    },
    /// 工具循环中的一次能力调用
    CapabilityCall {
        cycle: u64,
        capability: String,
        args: serde_json::Value,
    },
    /// 能力调用结果预览
    CapabilityResult {
        cycle: u64,
        capability: String,
        ok: bool,
        preview: String,
    },
    /// 周期结束（含失败）
    CycleFinished {
        cycle: u64,
        action: String,
        failed: bool,
    },
    /// 周期失败
    CycleFailed {
        cycle: u64,
        phase: CyclePhase,
        code: String,
        reason: String,
    },
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<CycleEvent>;

/// 事件通道可选；发送失败（接收方已关闭）直接忽略
pub(crate) fn emit(tx: Option<&EventSender>, event: CycleEvent) {
    if let Some(tx) = tx {
        let _ = tx.send(event);
    }
}

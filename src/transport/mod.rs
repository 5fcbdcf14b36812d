//! 传输边界：认知核心只通过 Outbound 向客户端发送一条 JSON 消息
//!
//! WebSocket 分帧、连接生命周期由网关负责；测试中用 RecordingOutbound 捕获发出的消息。

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::TutorError;

/// 向远端发送一条消息
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send_json(&self, message: Value) -> Result<(), TutorError>;
}

/// 可拉取的资源种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Audio,
    Whiteboard,
    Camera,
    Status,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Audio => "audio",
            ResourceKind::Whiteboard => "whiteboard",
            ResourceKind::Camera => "camera",
            ResourceKind::Status => "status",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求信封（核心 → 客户端）：{type: "request", request_id, resource, params}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "request")]
pub struct RequestEnvelope {
    pub request_id: String,
    pub resource: ResourceKind,
    pub params: Value,
}

/// 响应信封（客户端 → 核心）：{type: "response", request_id, data}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "response")]
pub struct ResponseEnvelope {
    pub request_id: String,
    #[serde(default)]
    pub data: Value,
}

/// 基于 mpsc 的 Outbound：网关的写任务消费 String 并写入 WebSocket
pub struct ChannelOutbound {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelOutbound {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Outbound for ChannelOutbound {
    async fn send_json(&self, message: Value) -> Result<(), TutorError> {
        self.tx
            .send(message.to_string())
            .map_err(|_| TutorError::Transport("connection closed".to_string()))
    }
}

/// 记录所有发出消息的 Outbound（测试 / 演示）
#[derive(Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<Value>>,
    /// 为 true 时 send_json 返回 Transport 错误
    fail: std::sync::atomic::AtomicBool,
    notify: tokio::sync::Notify,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// 按 type 字段筛选
    pub fn sent_of_type(&self, ty: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|m| m.get("type").and_then(Value::as_str) == Some(ty))
            .collect()
    }

    /// 等待下一条消息发出
    pub async fn wait_for_message(&self) {
        self.notify.notified().await;
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send_json(&self, message: Value) -> Result<(), TutorError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TutorError::Transport("send failed".to_string()));
        }
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(message);
        self.notify.notify_waiters();
        Ok(())
    }
}

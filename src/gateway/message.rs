//! 网关消息协议
//!
//! 客户端 → 核心：hello 打开会话，之后推送 transcript / speech_activity / whiteboard，
//! 并对拉取请求回复 response。核心 → 客户端：welcome、请求信封、动作消息（ai_response 等，由能力直接发送）、
//! cycle（周期记录）、debug（过程事件）、pong、error。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cognitive::CycleEvent;
use crate::models::{CycleRecord, DriveMode};
use crate::transport::ResponseEnvelope;

/// 客户端消息
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 打开会话
    Hello {
        student_id: String,
        #[serde(default)]
        topic: Option<String>,
    },
    /// 一段语音转写
    Transcript {
        text: String,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    /// VAD 信号
    SpeechActivity { is_speaking: bool },
    /// 白板推送
    Whiteboard {
        description: String,
        #[serde(default = "default_changed")]
        changed: bool,
    },
    /// 拉取请求的响应
    Response {
        request_id: String,
        #[serde(default)]
        data: Value,
    },
    /// 切换学习主题
    Topic { topic: Option<String> },
    Ping {
        #[serde(default)]
        timestamp: Option<i64>,
    },
}

fn default_changed() -> bool {
    true
}

impl ClientMessage {
    pub fn into_response(self) -> Option<ResponseEnvelope> {
        match self {
            ClientMessage::Response { request_id, data } => Some(ResponseEnvelope { request_id, data }),
            _ => None,
        }
    }
}

/// 核心发往客户端的消息（动作消息由能力 / ActionRouter 直接构造）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        session_id: String,
        drive_mode: DriveMode,
        capabilities: Vec<String>,
    },
    Cycle { record: Box<CycleRecord> },
    Debug { event: CycleEvent },
    Pong { timestamp: Option<i64> },
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_messages() {
        let hello: ClientMessage =
            serde_json::from_value(json!({"type": "hello", "student_id": "s1", "topic": "algebra"})).unwrap();
        assert_eq!(
            hello,
            ClientMessage::Hello {
                student_id: "s1".into(),
                topic: Some("algebra".into())
            }
        );

        let wb: ClientMessage =
            serde_json::from_value(json!({"type": "whiteboard", "description": "x = 2"})).unwrap();
        assert!(matches!(wb, ClientMessage::Whiteboard { changed: true, .. }));

        let resp: ClientMessage = serde_json::from_value(
            json!({"type": "response", "request_id": "req_1_ab", "data": {"description": "y"}}),
        )
        .unwrap();
        let env = resp.into_response().unwrap();
        assert_eq!(env.request_id, "req_1_ab");
        assert_eq!(env.data["description"], "y");
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(serde_json::from_value::<ClientMessage>(json!({"type": "teleport"})).is_err());
    }

    #[test]
    fn test_server_message_shape() {
        let v: Value = serde_json::from_str(&ServerMessage::error("parse_error", "bad").to_json()).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["code"], "parse_error");
        let pong: Value = serde_json::from_str(&ServerMessage::Pong { timestamp: Some(5) }.to_json()).unwrap();
        assert_eq!(pong["type"], "pong");
    }
}

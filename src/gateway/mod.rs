//! WebSocket 网关
//!
//! 一个连接对应一个会话。客户端先发 hello 打开会话，随后推送证据（转写、语音活动、白板），
//! 并对核心发出的拉取请求回复 response。核心通过同一连接下发动作消息、周期记录与调试事件。
//!
//! - **hub**: 监听、连接生命周期、消息分发
//! - **message**: 线上消息格式
//! - **session**: 会话装配（引擎选择、协作方注入）与拆除

mod hub;
mod message;
mod session;

pub use hub::Hub;
pub use message::{ClientMessage, ServerMessage};
pub use session::{SessionFactory, SessionHandle};

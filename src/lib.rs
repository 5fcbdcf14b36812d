//! OAIT - 观察式 AI 导师的认知核心
//!
//! 模块划分：
//! - **evidence**: 时钟、转写滑动窗口、静默跟踪
//! - **cognitive**: 会话上下文、触发检测、分析、干预决策、回复生成、周期控制器与会话驱动
//! - **negotiator**: 拉取协议（请求 / 响应关联、超时、取消）
//! - **tools**: 能力注册表与能力实现（观察 / 动作 / 控制）
//! - **tool_loop**: 推理方驱动的工具执行循环
//! - **actions**: 规则模式下的动作执行
//! - **storage**: 学生档案与周期记录存储
//! - **transport**: 发往客户端的出站通道
//! - **gateway**: WebSocket 网关（feature = "gateway"）
//! - **config** / **core** / **llm** / **models** / **observability**

pub mod actions;
pub mod cognitive;
pub mod config;
pub mod core;
pub mod evidence;
#[cfg(feature = "gateway")]
pub mod gateway;
pub mod llm;
pub mod models;
pub mod negotiator;
pub mod observability;
pub mod storage;
pub mod tool_loop;
pub mod tools;
pub mod transport;

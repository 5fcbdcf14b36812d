//! 认知核心：会话上下文、触发检测、分析、决策、回复生成、周期控制与会话驱动

pub mod analyzer;
pub mod composer;
pub mod controller;
pub mod decision;
pub mod driver;
pub mod events;
pub mod session;
pub mod triggers;

pub use analyzer::{Analyzer, HeuristicAnalyzer, LlmAnalyzer};
pub use composer::{ComposeRequest, LlmComposer, ResponseComposer, TemplateComposer};
pub use controller::{Collaborators, ControllerSettings, CycleController, TickOutcome};
pub use decision::{DecisionInput, InterventionPolicy, Verdict, FALLBACK_RESPONSE, RULE_ORDER};
pub use driver::{DriverExit, Engine, SessionDriver};
pub use events::{CycleEvent, EventSender};
pub use session::{SessionContext, SessionStatus, WhiteboardSnapshot};
pub use triggers::{TriggerDetector, TriggerReason, TriggerState};

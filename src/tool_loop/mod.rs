//! 工具循环驱动：推理方通过能力调用完成一个观察周期

pub mod loop_;
pub mod planner;

pub use loop_::{build_system_prompt, ToolCollaborators, ToolCycleOutcome, ToolLoop, ToolLoopSettings};
pub use planner::{extract_json_block, parse_reasoner_output, CapabilityCall, ReasonerOutput};

pub mod action;
pub mod context;
pub mod control;
pub mod executor;
pub mod observation;
pub mod pedagogical;
pub mod registry;
pub mod schema;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::{CycleEnd, CycleScratch, NextAction, SpokenMessage, ToolContext, ToolSettings};
pub use executor::CapabilityExecutor;
pub use registry::{Capability, CapabilityClass, CapabilityEntry, CapabilityRegistry};
pub use schema::capability_call_schema_json;

//! 能力测试共用的上下文

use std::sync::Arc;
use std::time::Duration;

use crate::cognitive::SessionContext;
use crate::config::EvidenceSection;
use crate::evidence::ManualClock;
use crate::negotiator::ResourceNegotiator;
use crate::storage::MemoryProfileStore;
use crate::tools::context::{ToolContext, ToolSettings};
use crate::transport::RecordingOutbound;

pub(crate) struct Harness {
    pub ctx: ToolContext,
    pub session: Arc<SessionContext>,
    pub outbound: Arc<RecordingOutbound>,
    pub profiles: Arc<MemoryProfileStore>,
    pub negotiator: Arc<ResourceNegotiator>,
    pub clock: ManualClock,
}

pub(crate) fn harness() -> Harness {
    let clock = ManualClock::new(1_000.0);
    let session = Arc::new(SessionContext::new(
        "session-1",
        "student-1",
        Some("fractions".to_string()),
        &EvidenceSection::default(),
        Arc::new(clock.clone()),
    ));
    let outbound = Arc::new(RecordingOutbound::new());
    let profiles = Arc::new(MemoryProfileStore::default());
    let negotiator = Arc::new(ResourceNegotiator::new(
        outbound.clone(),
        Duration::from_secs(5),
    ));
    let settings = ToolSettings {
        pull_timeout: Duration::from_secs(1),
        ..ToolSettings::default()
    };
    let ctx = ToolContext::new(
        session.clone(),
        negotiator.clone(),
        outbound.clone(),
        profiles.clone(),
        settings,
        1,
    );
    Harness {
        ctx,
        session,
        outbound,
        profiles,
        negotiator,
        clock,
    }
}

//! 拉取协议与工具循环的集成行为

use std::sync::Arc;
use std::time::Duration;

use oait::cognitive::SessionContext;
use oait::config::EvidenceSection;
use oait::core::TutorError;
use oait::evidence::ManualClock;
use oait::llm::MockLlmClient;
use oait::models::ActionKind;
use oait::negotiator::ResourceNegotiator;
use oait::storage::{MemoryProfileStore, MemoryRecordSink};
use oait::tool_loop::{ToolCollaborators, ToolLoop, ToolLoopSettings};
use oait::tools::CapabilityRegistry;
use oait::transport::{RecordingOutbound, ResourceKind, ResponseEnvelope};
use serde_json::json;

/// 等待出站表里出现第 n 个请求并返回其 request_id
async fn nth_request_id(outbound: &RecordingOutbound, n: usize) -> String {
    loop {
        let requests = outbound.sent_of_type("request");
        if let Some(req) = requests.get(n) {
            return req["request_id"].as_str().unwrap().to_string();
        }
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_concurrent_requests_resolve_out_of_order() {
    let outbound = Arc::new(RecordingOutbound::new());
    let negotiator = Arc::new(ResourceNegotiator::new(outbound.clone(), Duration::from_secs(5)));

    let n1 = negotiator.clone();
    let audio = tokio::spawn(async move { n1.request(ResourceKind::Audio, json!({}), None).await });
    let first = nth_request_id(&outbound, 0).await;
    let n2 = negotiator.clone();
    let board = tokio::spawn(async move { n2.request(ResourceKind::Whiteboard, json!({}), None).await });
    let second = nth_request_id(&outbound, 1).await;
    assert_ne!(first, second);
    assert_eq!(negotiator.pending_count(), 2);

    assert!(negotiator.resolve(ResponseEnvelope {
        request_id: second,
        data: json!({"description": "x + 2 = 5"}),
    }));
    assert!(negotiator.resolve(ResponseEnvelope {
        request_id: first,
        data: json!({"transcript": "hmm"}),
    }));

    assert_eq!(board.await.unwrap().unwrap()["description"], "x + 2 = 5");
    assert_eq!(audio.await.unwrap().unwrap()["transcript"], "hmm");
    assert_eq!(negotiator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_late_response_is_discarded() {
    let outbound = Arc::new(RecordingOutbound::new());
    let negotiator = ResourceNegotiator::new(outbound.clone(), Duration::from_secs(5));

    let err = negotiator
        .request(ResourceKind::Whiteboard, json!({}), Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, TutorError::RequestTimeout { .. }));

    let late = nth_request_id(&outbound, 0).await;
    assert!(!negotiator.resolve(ResponseEnvelope {
        request_id: late,
        data: json!({"description": "too late"}),
    }));
    assert_eq!(negotiator.pending_count(), 0);
}

#[tokio::test]
async fn test_teardown_cancels_pending_pull() {
    let outbound = Arc::new(RecordingOutbound::new());
    let negotiator = Arc::new(ResourceNegotiator::new(outbound.clone(), Duration::from_secs(30)));
    let n = negotiator.clone();
    let pending = tokio::spawn(async move { n.request(ResourceKind::Camera, json!({}), None).await });
    nth_request_id(&outbound, 0).await;

    negotiator.cancel_all();
    assert!(matches!(pending.await.unwrap(), Err(TutorError::RequestCancelled(_))));
    assert!(matches!(
        negotiator.request(ResourceKind::Audio, json!({}), None).await,
        Err(TutorError::RequestCancelled(_))
    ));
}

struct ToolHarness {
    session: Arc<SessionContext>,
    outbound: Arc<RecordingOutbound>,
    sink: Arc<MemoryRecordSink>,
}

fn tool_harness() -> ToolHarness {
    ToolHarness {
        session: Arc::new(SessionContext::new(
            "sess-tools",
            "student-tools",
            None,
            &EvidenceSection::default(),
            Arc::new(ManualClock::new(500.0)),
        )),
        outbound: Arc::new(RecordingOutbound::new()),
        sink: Arc::new(MemoryRecordSink::default()),
    }
}

fn tool_loop(h: &ToolHarness, llm: Arc<MockLlmClient>, max_iterations: usize) -> ToolLoop {
    ToolLoop::new(
        h.session.clone(),
        llm,
        CapabilityRegistry::with_defaults(),
        ToolCollaborators {
            negotiator: Arc::new(ResourceNegotiator::new(h.outbound.clone(), Duration::from_secs(1))),
            outbound: h.outbound.clone(),
            profiles: Arc::new(MemoryProfileStore::default()),
            sink: h.sink.clone(),
        },
        ToolLoopSettings {
            max_iterations,
            ..ToolLoopSettings::default()
        },
    )
}

#[tokio::test]
async fn test_unregistered_capability_does_not_end_session() {
    let h = tool_harness();
    let llm = Arc::new(MockLlmClient::new([
        r#"{"tool": "summon_tutor", "args": {"urgent": true}}"#,
        r#"{"tool": "log_observation", "args": {"message": "student is working", "category": "observation"}}"#,
        r#"{"tool": "end_observation_cycle", "args": {"next_action": "wait", "reasoning": "no need to step in"}}"#,
    ]));
    let tl = tool_loop(&h, llm.clone(), 10);

    let out = tl.run_cycle(vec!["initial_analysis".into()]).await;
    assert_eq!(out.iterations, 3);
    assert!(!out.terminate);
    assert!(!out.record.failed);
    assert_eq!(out.record.decision.action, ActionKind::Wait);
    assert!(!h.session.is_closed());

    let calls = llm.last_call().unwrap();
    assert!(calls.iter().any(|m| m.content.contains("unknown_capability")));
    assert!(h
        .outbound
        .sent_of_type("debug")
        .iter()
        .any(|m| m.to_string().contains("[OBSERVATION] student is working")));
    assert_eq!(h.sink.records().len(), 1);
}

#[tokio::test]
async fn test_iteration_cap_defaults_to_wait() {
    let h = tool_harness();
    let llm = Arc::new(MockLlmClient::repeating(r#"{"tool": "get_observation_mode", "args": {}}"#));
    let tl = tool_loop(&h, llm.clone(), 4);

    let out = tl.run_cycle(vec![]).await;
    assert_eq!(llm.call_count(), 4);
    assert_eq!(out.record.decision.action, ActionKind::Wait);
    assert_eq!(out.record.failure.as_ref().unwrap().code, "iteration_cap_exceeded");
    assert!(h.outbound.sent_of_type("ai_response").is_empty());
    assert_eq!(h.session.record_count(), 1);
}

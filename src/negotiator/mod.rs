//! 资源协商器（拉取协议）
//!
//! 推理侧只在需要时向客户端索取证据：生成唯一 request_id，登记 PendingRequest，发送请求信封，
//! 然后挂起直到响应按 id 匹配到达或超时。响应只按 request_id 路由，与到达顺序无关；
//! 未知或已结束的 id 的响应被静默丢弃。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::core::TutorError;
use crate::transport::{Outbound, RequestEnvelope, ResourceKind, ResponseEnvelope};

/// 进行中的拉取请求
pub struct PendingRequest {
    pub request_id: String,
    pub resource: ResourceKind,
    pub created_at: Instant,
    resolver: oneshot::Sender<Value>,
}

type PendingTable = Arc<Mutex<HashMap<String, PendingRequest>>>;

/// 等待方被取消（future 被 drop）时也要从表中移除条目
struct PendingGuard {
    table: PendingTable,
    request_id: String,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.request_id);
    }
}

pub struct ResourceNegotiator {
    outbound: Arc<dyn Outbound>,
    pending: PendingTable,
    default_timeout: Duration,
    counter: AtomicU64,
    /// 会话结束时取消，所有等待中的请求返回 RequestCancelled
    cancel: CancellationToken,
}

impl ResourceNegotiator {
    pub fn new(outbound: Arc<dyn Outbound>, default_timeout: Duration) -> Self {
        Self {
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            default_timeout,
            counter: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// 当前未完成的请求数
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// 发送请求并等待响应数据；timeout 为 None 时使用默认超时
    pub async fn request(
        &self,
        resource: ResourceKind,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, TutorError> {
        if self.cancel.is_cancelled() {
            return Err(TutorError::RequestCancelled(resource.to_string()));
        }
        let timeout = timeout.unwrap_or(self.default_timeout);
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let request_id = format!("req_{}_{}", seq, uuid::Uuid::new_v4().simple());

        let (tx, rx) = oneshot::channel();
        self.lock().insert(
            request_id.clone(),
            PendingRequest {
                request_id: request_id.clone(),
                resource,
                created_at: Instant::now(),
                resolver: tx,
            },
        );
        let _guard = PendingGuard {
            table: Arc::clone(&self.pending),
            request_id: request_id.clone(),
        };

        let envelope = RequestEnvelope {
            request_id: request_id.clone(),
            resource,
            params,
        };
        let message = serde_json::to_value(&envelope)
            .map_err(|e| TutorError::Transport(format!("encode request: {e}")))?;
        self.outbound.send_json(message).await?;
        tracing::debug!(request_id = %request_id, resource = %resource, "pull request sent");

        tokio::select! {
            result = tokio::time::timeout(timeout, rx) => match result {
                Ok(Ok(data)) => Ok(data),
                // resolver 被丢弃：cancel_all 清空了表
                Ok(Err(_)) => Err(TutorError::RequestCancelled(request_id)),
                Err(_) => {
                    tracing::warn!(request_id = %request_id, resource = %resource, ?timeout, "pull request timed out");
                    Err(TutorError::RequestTimeout {
                        request_id,
                        resource: resource.to_string(),
                        timeout,
                    })
                }
            },
            _ = self.cancel.cancelled() => Err(TutorError::RequestCancelled(request_id)),
        }
    }

    /// 路由一个响应；返回是否匹配到等待中的请求。未知 / 迟到的响应被丢弃，不报错。
    pub fn resolve(&self, response: ResponseEnvelope) -> bool {
        let pending = self.lock().remove(&response.request_id);
        match pending {
            Some(p) => {
                tracing::debug!(
                    request_id = %p.request_id,
                    resource = %p.resource,
                    elapsed_ms = p.created_at.elapsed().as_millis() as u64,
                    "pull response matched"
                );
                // 等待方可能恰好在此刻超时，发送失败同样视为迟到
                p.resolver.send(response.data).is_ok()
            }
            None => {
                tracing::debug!(request_id = %response.request_id, "discarding unmatched response");
                false
            }
        }
    }

    /// 会话结束：取消全部等待中的请求，之后的 request 立即失败
    pub fn cancel_all(&self) {
        self.cancel.cancel();
        let drained = {
            let mut table = self.lock();
            let n = table.len();
            table.clear();
            n
        };
        if drained > 0 {
            tracing::info!(cancelled = drained, "cancelled outstanding pull requests");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingRequest>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingOutbound;

    fn negotiator(timeout_ms: u64) -> (Arc<ResourceNegotiator>, Arc<RecordingOutbound>) {
        let out = Arc::new(RecordingOutbound::new());
        let neg = Arc::new(ResourceNegotiator::new(
            out.clone(),
            Duration::from_millis(timeout_ms),
        ));
        (neg, out)
    }

    fn request_ids(out: &RecordingOutbound) -> Vec<String> {
        out.sent_of_type("request")
            .iter()
            .map(|m| m["request_id"].as_str().unwrap().to_string())
            .collect()
    }

    async fn wait_sent(out: &RecordingOutbound, n: usize) {
        while out.sent().len() < n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_request_resolves_with_data() {
        let (neg, out) = negotiator(1000);
        let n2 = neg.clone();
        let handle = tokio::spawn(async move {
            n2.request(ResourceKind::Whiteboard, serde_json::json!({"analyze": true}), None)
                .await
        });
        wait_sent(&out, 1).await;
        let id = request_ids(&out).remove(0);
        assert_eq!(out.sent()[0]["resource"], "whiteboard");
        assert_eq!(out.sent()[0]["params"]["analyze"], true);
        assert!(neg.resolve(ResponseEnvelope {
            request_id: id,
            data: serde_json::json!({"description": "x + 2 = 5"}),
        }));
        let data = handle.await.unwrap().unwrap();
        assert_eq!(data["description"], "x + 2 = 5");
        assert_eq!(neg.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_resolve_out_of_order() {
        let (neg, out) = negotiator(1000);
        let a = {
            let n = neg.clone();
            tokio::spawn(async move { n.request(ResourceKind::Audio, Value::Null, None).await })
        };
        wait_sent(&out, 1).await;
        let b = {
            let n = neg.clone();
            tokio::spawn(async move { n.request(ResourceKind::Status, Value::Null, None).await })
        };
        wait_sent(&out, 2).await;
        let ids = request_ids(&out);
        assert_ne!(ids[0], ids[1]);

        // 先回复后发出的请求
        assert!(neg.resolve(ResponseEnvelope {
            request_id: ids[1].clone(),
            data: serde_json::json!("second"),
        }));
        assert!(neg.resolve(ResponseEnvelope {
            request_id: ids[0].clone(),
            data: serde_json::json!("first"),
        }));
        assert_eq!(a.await.unwrap().unwrap(), serde_json::json!("first"));
        assert_eq!(b.await.unwrap().unwrap(), serde_json::json!("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_purges_and_late_response_is_discarded() {
        let (neg, out) = negotiator(50);
        let err = neg
            .request(ResourceKind::Camera, Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::RequestTimeout { .. }));
        assert_eq!(neg.pending_count(), 0);

        let id = request_ids(&out).remove(0);
        // 迟到的响应：不匹配任何请求，也不 panic
        assert!(!neg.resolve(ResponseEnvelope {
            request_id: id,
            data: serde_json::json!({}),
        }));
    }

    #[tokio::test]
    async fn test_unknown_response_is_ignored() {
        let (neg, _out) = negotiator(50);
        assert!(!neg.resolve(ResponseEnvelope {
            request_id: "nope".to_string(),
            data: Value::Null,
        }));
    }

    #[tokio::test]
    async fn test_cancel_all_fails_outstanding_requests() {
        let (neg, out) = negotiator(10_000);
        let n = neg.clone();
        let handle =
            tokio::spawn(async move { n.request(ResourceKind::Audio, Value::Null, None).await });
        wait_sent(&out, 1).await;
        neg.cancel_all();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, TutorError::RequestCancelled(_)));
        assert_eq!(neg.pending_count(), 0);

        let err = neg
            .request(ResourceKind::Audio, Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::RequestCancelled(_)));
    }

    #[tokio::test]
    async fn test_send_failure_removes_pending_entry() {
        let (neg, out) = negotiator(1000);
        out.set_failing(true);
        let err = neg
            .request(ResourceKind::Whiteboard, Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Transport(_)));
        assert_eq!(neg.pending_count(), 0);
    }
}

//! Hub：WebSocket 服务端
//!
//! 每个连接一个会话：hello 之后把客户端推送写入会话证据缓冲，把 response 交给协商器；
//! 写任务消费 mpsc 通道并定期发送心跳。连接断开时拆除会话（取消等待中的拉取）。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use super::message::{ClientMessage, ServerMessage};
use super::session::{SessionFactory, SessionHandle};
use crate::cognitive::SessionStatus;
use crate::core::TutorError;

/// 活跃会话的状态索引
type SessionIndex = Arc<RwLock<HashMap<String, Arc<crate::cognitive::SessionContext>>>>;

pub struct Hub {
    factory: Arc<SessionFactory>,
    sessions: SessionIndex,
}

impl Hub {
    pub fn new(factory: SessionFactory) -> Self {
        Self {
            factory: Arc::new(factory),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn statuses(&self) -> Vec<SessionStatus> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.status())
            .collect()
    }

    /// 监听并服务连接，直到 shutdown 被取消
    pub async fn serve(&self, shutdown: CancellationToken) -> Result<(), TutorError> {
        let bind_addr = self.factory.config().gateway.bind_addr.clone();
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| TutorError::Config(format!("invalid bind address {bind_addr}: {e}")))?;
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| TutorError::Transport(format!("failed to bind {addr}: {e}")))?;
        tracing::info!("Gateway listening on ws://{}", addr);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let factory = Arc::clone(&self.factory);
                        let sessions = Arc::clone(&self.sessions);
                        let shutdown = shutdown.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, factory, sessions, shutdown).await {
                                tracing::error!("Connection error from {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => tracing::error!("Accept error: {}", e),
                },
            }
        }
        tracing::info!("Gateway stopped accepting connections");
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    factory: Arc<SessionFactory>,
    sessions: SessionIndex,
    shutdown: CancellationToken,
) -> Result<(), TutorError> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| TutorError::Transport(format!("WebSocket handshake failed: {e}")))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tracing::info!("New WebSocket connection from {}", peer);

    let heartbeat = Duration::from_secs(factory.config().gateway.heartbeat_secs.max(1));
    let writer = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat);
        ticker.tick().await;
        loop {
            tokio::select! {
                msg = rx.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if ws_tx.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let mut handle: Option<SessionHandle> = None;
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = ws_rx.next() => msg,
        };
        let text = match msg {
            Some(Ok(WsMessage::Text(text))) => text,
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        let message: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                let _ = tx.send(ServerMessage::error("parse_error", e.to_string()).to_json());
                continue;
            }
        };

        if let ClientMessage::Hello { student_id, topic } = &message {
            if handle.is_some() {
                let _ = tx.send(ServerMessage::error("already_open", "session already open").to_json());
                continue;
            }
            let opened = factory.open(student_id, topic.clone(), tx.clone(), shutdown.child_token());
            sessions
                .write()
                .await
                .insert(opened.session_id().to_string(), Arc::clone(&opened.session));
            handle = Some(opened);
            continue;
        }
        if let ClientMessage::Ping { timestamp } = &message {
            let _ = tx.send(ServerMessage::Pong { timestamp: *timestamp }.to_json());
            continue;
        }

        let Some(h) = handle.as_ref() else {
            let _ = tx.send(ServerMessage::error("no_session", "send hello first").to_json());
            continue;
        };
        if h.is_finished() {
            break;
        }
        dispatch(h, message);
    }

    if let Some(h) = handle {
        sessions.write().await.remove(h.session_id());
        let session_id = h.session_id().to_string();
        let exit = h.teardown().await;
        tracing::info!(session = %session_id, exit = ?exit, "session closed");
    }
    drop(tx);
    let _ = writer.await;
    tracing::info!("WebSocket connection closed: {}", peer);
    Ok(())
}

/// 客户端推送写入会话；ingestion 只追加，不触碰周期内的状态
fn dispatch(handle: &SessionHandle, message: ClientMessage) {
    let session = &handle.session;
    match message {
        ClientMessage::Transcript { text, timestamp } => session.ingest_transcript(&text, timestamp),
        ClientMessage::SpeechActivity { is_speaking } => session.record_speech_activity(is_speaking),
        ClientMessage::Whiteboard { description, changed } => session.update_whiteboard(description, changed),
        ClientMessage::Topic { topic } => session.set_topic(topic),
        response @ ClientMessage::Response { .. } => {
            if let Some(envelope) = response.into_response() {
                handle.negotiator.resolve(envelope);
            }
        }
        ClientMessage::Hello { .. } | ClientMessage::Ping { .. } => {}
    }
}

//! 会话装配与拆除
//!
//! SessionFactory 持有跨会话共享的只读协作方（配置、LLM、存储、触发检测器）；
//! 每个连接的 hello 打开一个 SessionHandle：独立的 SessionContext、协商器、周期引擎与驱动任务。
//! 会话之间不共享可变状态。

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::message::ServerMessage;
use crate::actions::ClientActionRouter;
use crate::cognitive::{
    Analyzer, Collaborators, ControllerSettings, CycleController, DriverExit, Engine,
    HeuristicAnalyzer, InterventionPolicy, LlmAnalyzer, LlmComposer, ResponseComposer,
    SessionContext, SessionDriver, TemplateComposer, TriggerDetector,
};
use crate::config::AppConfig;
use crate::core::TutorError;
use crate::evidence::{system_clock, SharedClock};
use crate::llm::LlmClient;
use crate::models::DriveMode;
use crate::negotiator::ResourceNegotiator;
use crate::storage::{ProfileStore, RecordSink};
use crate::tool_loop::{ToolCollaborators, ToolLoop, ToolLoopSettings};
use crate::tools::CapabilityRegistry;
use crate::transport::{ChannelOutbound, Outbound};

/// 跨会话共享的协作方
pub struct SessionFactory {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    profiles: Arc<dyn ProfileStore>,
    sink: Arc<dyn RecordSink>,
    detector: Arc<TriggerDetector>,
    clock: SharedClock,
}

impl SessionFactory {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        profiles: Arc<dyn ProfileStore>,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, TutorError> {
        config.validate()?;
        let detector = Arc::new(TriggerDetector::new(&config.triggers)?);
        Ok(Self {
            config,
            llm,
            profiles,
            sink,
            detector,
            clock: system_clock(),
        })
    }

    /// 替换时钟（测试用）
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 打开会话并启动驱动任务；所有发往客户端的消息写入 tx
    pub fn open(
        &self,
        student_id: &str,
        topic: Option<String>,
        tx: mpsc::UnboundedSender<String>,
        shutdown: CancellationToken,
    ) -> SessionHandle {
        let session_id = format!("sess_{}", uuid::Uuid::new_v4().simple());
        let session = Arc::new(SessionContext::new(
            session_id.clone(),
            student_id,
            topic,
            &self.config.evidence,
            self.clock.clone(),
        ));
        let outbound: Arc<dyn Outbound> = Arc::new(ChannelOutbound::new(tx.clone()));
        let negotiator = Arc::new(ResourceNegotiator::new(
            Arc::clone(&outbound),
            self.config.cycle.pull_timeout(),
        ));

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        let debug_tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if debug_tx.send(ServerMessage::Debug { event }.to_json()).is_err() {
                    break;
                }
            }
        });

        let counter = Arc::new(AtomicU64::new(0));
        let drive_mode = self.config.cycle.drive_mode;
        let capabilities = CapabilityRegistry::with_defaults();
        let capability_names = capabilities.names();
        let engine = match drive_mode {
            DriveMode::Rules => {
                let controller = CycleController::new(
                    Arc::clone(&session),
                    Arc::clone(&self.detector),
                    InterventionPolicy::new(self.config.cycle.confidence_threshold),
                    Collaborators {
                        analyzer: self.analyzer(),
                        composer: self.composer(),
                        actions: Arc::new(ClientActionRouter::new(
                            Arc::clone(&outbound),
                            Arc::clone(&self.profiles),
                        )),
                        profiles: Arc::clone(&self.profiles),
                        sink: Arc::clone(&self.sink),
                        negotiator: Arc::clone(&negotiator),
                    },
                    ControllerSettings::from_config(&self.config),
                )
                .with_events(event_tx)
                .with_cycle_counter(counter);
                Engine::Rules(Arc::new(controller))
            }
            DriveMode::Tools => {
                let tool_loop = ToolLoop::new(
                    Arc::clone(&session),
                    Arc::clone(&self.llm),
                    capabilities,
                    ToolCollaborators {
                        negotiator: Arc::clone(&negotiator),
                        outbound: Arc::clone(&outbound),
                        profiles: Arc::clone(&self.profiles),
                        sink: Arc::clone(&self.sink),
                    },
                    ToolLoopSettings::from_config(&self.config),
                )
                .with_events(event_tx)
                .with_cycle_counter(counter);
                Engine::Tools {
                    tool_loop: Arc::new(tool_loop),
                    detector: Arc::clone(&self.detector),
                    min_interval: self.config.cycle.min_interval(),
                    question_window: self.config.triggers.question_window_secs,
                }
            }
        };

        let record_tx = tx.clone();
        let driver = SessionDriver::new(
            Arc::clone(&session),
            engine,
            self.config.cycle.tick_interval(),
            shutdown,
        )
        .on_record(move |record| {
            let _ = record_tx.send(
                ServerMessage::Cycle {
                    record: Box::new(record.clone()),
                }
                .to_json(),
            );
        });
        let task = tokio::spawn(driver.run());

        let _ = tx.send(
            ServerMessage::Welcome {
                session_id: session_id.clone(),
                drive_mode,
                capabilities: capability_names,
            }
            .to_json(),
        );
        tracing::info!(session = %session_id, student = %student_id, mode = ?drive_mode, "session opened");

        SessionHandle {
            session,
            negotiator,
            task,
        }
    }

    /// mock 推理方时使用启发式分析，否则走 LLM（解析失败回退启发式）
    fn analyzer(&self) -> Arc<dyn Analyzer> {
        if self.uses_mock() {
            Arc::new(HeuristicAnalyzer::new(Arc::clone(&self.detector)))
        } else {
            Arc::new(LlmAnalyzer::new(Arc::clone(&self.llm), Arc::clone(&self.detector)))
        }
    }

    fn composer(&self) -> Arc<dyn ResponseComposer> {
        if self.uses_mock() {
            Arc::new(TemplateComposer)
        } else {
            Arc::new(LlmComposer::new(Arc::clone(&self.llm)))
        }
    }

    fn uses_mock(&self) -> bool {
        self.config.llm.provider != "openai"
    }
}

/// 一个已打开的会话
pub struct SessionHandle {
    pub session: Arc<SessionContext>,
    pub negotiator: Arc<ResourceNegotiator>,
    task: JoinHandle<DriverExit>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        self.session.session_id()
    }

    /// 驱动任务是否已退出（例如传输断开）
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 拆除：关闭会话、取消等待中的拉取、等待驱动任务退出
    pub async fn teardown(self) -> Option<DriverExit> {
        self.session.close();
        self.negotiator.cancel_all();
        match self.task.await {
            Ok(exit) => Some(exit),
            Err(e) => {
                tracing::error!(session = %self.session.session_id(), error = %e, "driver task failed");
                None
            }
        }
    }
}

//! OAIT 网关入口：加载配置、初始化日志与存储，启动 WebSocket 服务直到收到关闭信号
//!
//! 运行方式：
//! ```bash
//! cargo run -- config/default.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use oait::config::load_config;
use oait::core::ShutdownManager;
use oait::gateway::{Hub, SessionFactory};
use oait::llm::create_llm_from_config;
use oait::observability;
use oait::storage::open_storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    observability::init(&cfg.app.log_filter);

    let (profiles, sink) = open_storage(&cfg.storage).context("Failed to open storage")?;
    let llm = create_llm_from_config(&cfg.llm);
    tracing::info!(provider = %cfg.llm.provider, mode = ?cfg.cycle.drive_mode, "Starting {}", cfg.app.name);

    let factory = SessionFactory::new(cfg, llm, profiles, sink).context("Failed to build session factory")?;
    let hub = Hub::new(factory);

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    hub.serve(shutdown.token()).await.context("Gateway failed")?;

    tracing::info!(
        reason = ?shutdown.reason(),
        "Shutting down, {} session(s) still closing",
        hub.session_count().await
    );
    Ok(())
}

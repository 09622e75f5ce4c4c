//! 网关进程入口
//!
//! 加载配置、初始化日志、起 HTTP 服务。配置文件路径可由第一个命令行
//! 参数指定，缺省读工作目录下的 codexcast.json，文件不存在时全用
//! 内置默认值。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use codexcast::config::GatewayConfig;
use codexcast::server::{router, AppState};
use codexcast::translator::FsSkillResolver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codexcast=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("codexcast.json"));
    let config = GatewayConfig::load(&config_path);

    tracing::info!("[STARTUP] Listening on http://{}/messages", config.listen_addr);
    tracing::info!("[STARTUP] Target backend: {}", config.target_url);
    tracing::info!(
        "[STARTUP] Default model: {} (supported: {})",
        config.default_model,
        config.supported_models.join(", ")
    );

    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(config, Arc::new(FsSkillResolver::default()));

    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("failed to bind {listen_addr}"))?;
    axum::serve(listener, router(state))
        .await
        .context("server terminated")?;
    Ok(())
}

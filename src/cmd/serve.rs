//! HTTP API server command — `foundry serve`.

use anyhow::Result;

use foundry::config::FoundryConfig;
use foundry::controller::RunController;
use foundry::server::{ServerConfig, start_server};

pub async fn cmd_serve(config: &FoundryConfig, port: Option<u16>, dev: bool) -> Result<()> {
    let controller = RunController::from_config(config)?;

    start_server(
        ServerConfig {
            host: config.server.host.clone(),
            port: port.unwrap_or(config.server.port),
            dev_mode: dev,
        },
        controller,
    )
    .await
}

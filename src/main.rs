//! jsonmock - mock REST API server backed by a single JSON document.

use jsonmock::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ServerConfig::load()?;

    // Start server
    jsonmock::start_server(config).await?;

    Ok(())
}

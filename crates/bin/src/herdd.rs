//! herdd - Authoritative herding game server

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("herdd - Herding Game Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Port: {}", config.server.port);
    info!("  Field: {}x{}", config.field.width, config.field.depth);
    info!(
        "  Tick: {} Hz, snapshots: {} Hz",
        config.server.tick_rate(),
        config.server.snapshot_rate()
    );
    info!("  Flock: {} sheep", config.round.sheep_count);

    server::run(config).await?;

    Ok(())
}

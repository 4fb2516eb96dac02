use anyhow::Context;
use clap::Parser;
use classic_server::{
    config::Config,
    level::Level,
    lobby::Lobby,
    server::Server,
};
use mimalloc::MiMalloc;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Runs a classic protocol server with a flat lobby world.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Path to a TOML config file. Defaults are used for anything missing.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides `server.bind` from the config.
    #[arg(long)]
    bind: Option<SocketAddr>,
}

const LOBBY_SIZE: (i16, i16, i16) = (128, 64, 128);

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    tracing_subscriber::fmt()
        .with_max_level(config.logging.max_level())
        .init();

    let (width, height, length) = LOBBY_SIZE;
    let lobby = Arc::new(Lobby::new(Level::flat(width, height, length)));
    let server = Server::bind(&config, lobby).await?;
    tracing::info!("Started {}", config.server.name);

    server.run().await
}

use std::sync::Arc;

use clap::Parser;
use log::LevelFilter;
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use tonic::transport::Server;
use tracing::{info, warn};

use homelog::server::{shutdown_signal, HomeLogServer, LogServer, ServerConfig};
use homelog::storage::Log;

#[derive(Debug, Parser)]
#[command(
    name = "HOMELOG Server",
    about = "Durable segmented commit log served over gRPC",
    version
)]
struct Args {
    /// Configuration file; HOMELOG_* environment variables override it
    #[clap(short, long)]
    config: Option<String>,

    /// Server host
    #[clap(long)]
    host: Option<String>,

    /// Server port
    #[clap(long)]
    port: Option<u16>,

    /// Directory holding the log segments
    #[clap(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir.into();
    }

    let level = config.log_level.parse().unwrap_or(LevelFilter::Info);
    TermLogger::init(
        level,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let server_addr = config.listen_addr()?;
    let log = Arc::new(Log::open(&config.data_dir, config.log.clone())?);
    let (lowest_offset, highest_offset) = (log.lowest_offset()?, log.highest_offset()?);
    info!(
        addr=%server_addr,
        data_dir=%config.data_dir.display(),
        lowest_offset=lowest_offset,
        highest_offset=highest_offset,
        "homelog-starting"
    );

    let homelog = HomeLogServer::new(log.clone())
        .with_poll_interval(config.consume_poll_interval());

    Server::builder()
        .add_service(LogServer::new(homelog))
        .serve_with_shutdown(server_addr, shutdown_signal(tokio::signal::ctrl_c()))
        .await?;

    // Tailing consumers may still hold the log; their drop closes it instead.
    match Arc::try_unwrap(log) {
        Ok(log) => log.close()?,
        Err(_) => warn!("log still shared at shutdown, closing on drop"),
    }
    info!("homelog-stopped");

    Ok(())
}

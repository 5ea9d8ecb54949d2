use clap::Parser;
use log::info;
use server::config::CoordinatorConfig;
use server::network::Server;
use server::world::FlatLevel;
use shared::BlockState;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "20")]
    tick_rate: u32,

    /// Maximum concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Coordinator config file (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configuration-phase watchdog bound
    #[arg(long)]
    config_timeout_secs: Option<u64>,

    /// Height of the flat ground
    #[arg(long, default_value = "63")]
    ground: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => CoordinatorConfig::load(path)?,
        None => CoordinatorConfig::default(),
    };
    if let Some(secs) = args.config_timeout_secs {
        config.completion.watchdog_timeout_ms = secs.saturating_mul(1000);
    }
    config.validate()?;

    let tick_rate = args.tick_rate.max(1);
    let tick_duration = Duration::from_secs_f64(1.0 / tick_rate as f64);

    // A lava pool next to spawn so unsafe-position handling can be exercised.
    let mut level = FlatLevel::new(args.ground);
    for x in 4..7 {
        for z in 4..7 {
            level.set_block(x, args.ground, z, BlockState::Lava);
        }
    }

    info!("Starting server...");
    info!(
        "Watchdog bound: {:?}, tick rate: {} Hz",
        config.watchdog_timeout(),
        tick_rate
    );

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, tick_duration, args.max_clients, config, level).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

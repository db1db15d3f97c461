use std::sync::Arc;

use clap::Parser;
use station_gateway::app::AppState;
use station_gateway::config::{CliOverrides, StationCfg};
use station_gateway::http;
use station_gateway::influx::InfluxSink;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "station-gateway")]
#[command(about = "Ruuvi Station gateway API receiver writing to InfluxDB")]
#[command(version)]
struct Args {
    /// Extra TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Bind address or hostname, overrides HOST
    #[arg(long)]
    host: Option<String>,

    /// Listener port, overrides PORT
    #[arg(short, long)]
    port: Option<u16>,

    /// Print the resolved bind address and exit
    #[arg(long)]
    print_bind: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let overrides = CliOverrides {
        host: args.host,
        port: args.port,
    };
    let cfg = StationCfg::load(args.config, &overrides)?;
    if args.print_bind {
        println!("{}", cfg.http.bind());
        return Ok(());
    }
    cfg.validate()?;

    tracing::info!(
        influx_url = %cfg.influx.url,
        org = %cfg.influx.org,
        bucket = %cfg.influx.bucket,
        "configuration loaded"
    );

    let cfg = Arc::new(cfg);
    let sink = Arc::new(InfluxSink::new(&cfg.influx)?);
    let state = AppState::new(cfg.clone(), sink);

    http::serve(state).await?;
    Ok(())
}

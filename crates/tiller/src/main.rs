use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, debug, info, warn};
use tokio::net::TcpListener;

use tiller::adapter::{Adapter, EchoAdapter};
use tiller::api::{AppState, create_router};
use tiller::config::TillerConfig;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.common);

    let mut config = TillerConfig::load(cli.common.config.as_deref())?;

    match cli.command {
        Command::Serve(cmd) => {
            if let Some(host) = cmd.host {
                config.host = host;
            }
            if let Some(port) = cmd.port {
                config.port = port;
            }
            serve(config)
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Tiller - session event bus and turn scheduler for coding agents.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Reduce output to only errors
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    /// Increase logging verbosity (stackable)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Enable debug logging (equivalent to -vv)
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the server
    Serve(ServeCommand),
}

#[derive(Debug, Args)]
struct ServeCommand {
    /// Bind host (overrides config)
    #[arg(long)]
    host: Option<String>,
    /// Bind port (overrides config)
    #[arg(long, short)]
    port: Option<u16>,
}

fn init_logging(opts: &CommonOpts) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let level = if opts.quiet {
        LevelFilter::Error
    } else if opts.debug {
        LevelFilter::Debug
    } else {
        match opts.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tiller={level},tower_http={level}")));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    // Also init env_logger for compatibility with log crate users.
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.filter_level(level);
    builder.try_init().ok();
}

fn build_adapter(name: &str) -> Result<Arc<dyn Adapter>> {
    match name {
        "echo" => Ok(Arc::new(EchoAdapter)),
        other => bail!("unknown adapter: {other}"),
    }
}

#[tokio::main]
async fn serve(config: TillerConfig) -> Result<()> {
    info!("starting tiller server");
    debug!("config: {config:#?}");

    let adapter = build_adapter(&config.adapter)?;
    info!("using adapter: {}", adapter.name());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    let state = AppState::new(config, adapter);
    let bridges = state.bridges.clone();
    let app = create_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .context("binding to address")?;
    info!("listening on http://{addr}");

    let shutdown_signal = async move {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to install Ctrl+C handler: {err}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    warn!("failed to install signal handler: {err}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        info!("shutdown signal received");
        bridges.shutdown();
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("running server")?;

    info!("shutdown complete");
    Ok(())
}

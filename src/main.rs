use axum::serve;
use clap::{Parser, Subcommand};
use healthd::collectors::Collector;
use healthd::config::{Config, ConfigError};
use healthd::http::{self, HttpAppState};
use healthd::metrics::Metrics;
use healthd::probe::Prober;
use healthd::state::ProcessInfo;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "./healthd.yaml";

#[derive(Parser, Debug)]
#[command(name = "healthd")]
#[command(version)]
struct Cli {
    /// Config file; ./healthd.yaml is used when present, built-in defaults otherwise
    #[arg(long, global = true)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the healthz endpoint (default)
    Serve {
        /// Version string reported in every snapshot
        #[arg(long)]
        version_string: Option<String>,
    },
    /// Poll a healthz endpoint with retry and backoff, print the snapshot
    Probe {
        url: String,
        #[arg(long)]
        attempts: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let cfg = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let ok = match cli.command.unwrap_or(Command::Serve {
        version_string: None,
    }) {
        Command::Serve { version_string } => {
            let version = version_string.unwrap_or_else(|| cfg.version_or_default());
            run_server(cfg, version).await
        }
        Command::Probe { url, attempts } => run_probe(cfg, url, attempts).await,
    };
    if !ok {
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from_file(path),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load_from_file(DEFAULT_CONFIG_PATH)
        }
        None => Ok(Config::default()),
    }
}

async fn run_server(cfg: Config, version: String) -> bool {
    let process = Arc::new(ProcessInfo::new(SystemTime::now(), version));
    info!(
        listen = %cfg.listen,
        healthz_path = %cfg.healthz_path,
        version = %process.version(),
        started = %humantime::format_rfc3339_seconds(process.started_at()),
        "starting healthd"
    );

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            return false;
        }
    };

    let addr: SocketAddr = match cfg.listen.parse() {
        Ok(addr) => addr,
        Err(err) => {
            error!(error = %err, listen = %cfg.listen, "invalid listen address");
            return false;
        }
    };
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, "failed to start HTTP server");
            return false;
        }
    };

    let app = http::build_router(
        &cfg.healthz_path,
        HttpAppState {
            metrics,
            collector: Arc::new(Collector::new(cfg.proc_root.clone(), cfg.disk_path.clone())),
            process,
        },
    );

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let http_task = tokio::spawn(async move {
        let server = serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });
        if let Err(err) = server.await {
            error!(error = %err, "HTTP server error");
            return false;
        }
        true
    });

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to wait for Ctrl+C");
    }
    info!("received Ctrl+C, shutting down");

    let _ = shutdown_tx.send(true);
    http_task.await.unwrap_or(false)
}

async fn run_probe(cfg: Config, url: String, attempts: Option<u32>) -> bool {
    let prober = Prober::from_config(&cfg.probe);
    let attempts = attempts.unwrap_or(cfg.probe.max_attempts);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    match prober.probe_with_retry_until(&url, attempts, cancel_rx).await {
        Ok(snapshot) => match serde_json::to_string_pretty(&snapshot) {
            Ok(text) => {
                println!("{text}");
                true
            }
            Err(err) => {
                error!(error = %err, "failed to encode snapshot");
                false
            }
        },
        Err(err) => {
            error!(url = %url, error = %err, "healthz probe failed");
            false
        }
    }
}

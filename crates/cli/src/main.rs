use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use imock_api::InProcApi;
use imock_core::StoreSnapshot;
use imock_reload::{spawn_watcher, ReloadController, WatchConfig};
use imock_server::{ChaosConfig, Server, ServerConfig, DEFAULT_CHAOS_PERCENT, DEFAULT_PORT};
use imock_store::Store;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "imock", version, about = "Instant mock REST API from a JSON file")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve every top-level key of a JSON file as a REST resource
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Dataset file (a JSON object)
    file: PathBuf,
    #[arg(short = 'p', long = "port", env = "IMOCK_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    #[arg(long = "host", env = "IMOCK_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Reload the dataset when the file changes
    #[arg(short = 'w', long = "watch", action = ArgAction::SetTrue)]
    watch: bool,
    /// Randomly delay and fail requests
    #[arg(long = "chaos", action = ArgAction::SetTrue)]
    chaos: bool,
    /// Failure probability in chaos mode (0-100)
    #[arg(long = "chaos-percent", env = "IMOCK_CHAOS_PERCENT", default_value_t = DEFAULT_CHAOS_PERCENT)]
    chaos_percent: u8,
    #[arg(long = "no-cors", action = ArgAction::SetTrue)]
    no_cors: bool,
    /// Do not print the request log
    #[arg(long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

/// Quiet dependencies, imock crates at info. `IMOCK_LOG` replaces it entirely.
const DEFAULT_LOG_FILTER: &str =
    "warn,imock=info,imock_store=info,imock_api=info,imock_reload=info,imock_server=info";

fn log_filter(env: Option<&str>) -> tracing_subscriber::EnvFilter {
    env.and_then(|s| tracing_subscriber::EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn init_tracing() {
    let env = std::env::var("IMOCK_LOG").ok();
    tracing_subscriber::fmt().with_env_filter(log_filter(env.as_deref())).with_target(true).init();
}

fn describe_metrics() {
    metrics::describe_counter!("store_ingest_total", "Datasets swapped into the store");
    metrics::describe_gauge!("store_resources", "Resources after the last ingest");
    metrics::describe_gauge!("store_records", "Records after the last ingest");
    metrics::describe_counter!("store_write_total", "Record writes by op");
    metrics::describe_histogram!("query_list_ms", "List pipeline latency");
    metrics::describe_counter!("reload_total", "Reload attempts by outcome");
    metrics::describe_counter!("chaos_injected_total", "Synthetic faults by status");
    metrics::describe_histogram!("chaos_delay_ms", "Injected chaos delay");
    metrics::describe_counter!("http_requests_total", "Served requests by method and status");
    metrics::describe_histogram!("http_request_ms", "Request latency");
}

/// Prometheus endpoint on `IMOCK_METRICS_ADDR` (host:port), off when unset.
fn init_metrics() {
    let Ok(addr) = std::env::var("IMOCK_METRICS_ADDR") else { return };
    let sock = match addr.parse::<SocketAddr>() {
        Ok(sock) => sock,
        Err(_) => {
            warn!(addr = %addr, "invalid IMOCK_METRICS_ADDR; expected host:port");
            return;
        }
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
        Ok(()) => {
            describe_metrics();
            info!(%sock, "metrics: prometheus exporter listening");
        }
        Err(e) => warn!(error = %e, "metrics: exporter install failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
    }
}

async fn load_store(path: &Path) -> Result<Store> {
    let bytes = tokio::fs::read(path).await.with_context(|| format!("reading {}", path.display()))?;
    let raw = imock_reload::parse_dataset(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Store::from_dataset(raw))
}

async fn serve(args: ServeArgs) -> Result<()> {
    let store = Arc::new(load_store(&args.file).await?);

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("binding {}:{}", args.host, args.port))?;
    let config = ServerConfig {
        bind: listener.local_addr().context("reading bound address")?,
        chaos: args.chaos.then(|| ChaosConfig::new(args.chaos_percent)),
        cors: !args.no_cors,
        ..ServerConfig::default()
    };

    let server = Server::new(Arc::new(InProcApi::new(store.clone())), &config);
    if !args.quiet {
        tokio::spawn(print_requests(server.subscribe_log()));
    }

    let watcher = if args.watch {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let controller = Arc::new(ReloadController::new(store.clone()).with_observer(tx));
        let handle = spawn_watcher(WatchConfig::from_env(&args.file), controller)
            .with_context(|| format!("watching {}", args.file.display()))?;
        tokio::spawn(async move {
            while let Some(status) = rx.recv().await {
                println!("{} │ {}", clock(), status);
            }
        });
        Some(handle)
    } else {
        None
    };

    println!("{}", banner(&args, &store.dump(), &config));

    server.serve(listener, shutdown_signal()).await.context("server failed")?;
    if let Some(handle) = watcher {
        handle.stop().await;
    }
    Ok(())
}

async fn print_requests(mut rx: broadcast::Receiver<imock_server::RequestLog>) {
    loop {
        match rx.recv().await {
            Ok(entry) => println!("{} │ {}", clock(), entry),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "request log lagging"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn clock() -> String { chrono::Local::now().format("%H:%M:%S").to_string() }

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler failed");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler failed");
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
    info!("shutdown requested");
}

fn display_url(config: &ServerConfig) -> String {
    let addr = config.bind;
    if addr.ip().is_unspecified() {
        format!("http://localhost:{}", addr.port())
    } else {
        format!("http://{}", addr)
    }
}

fn banner(args: &ServeArgs, snapshot: &StoreSnapshot, config: &ServerConfig) -> String {
    let url = display_url(config);
    let mut features = Vec::new();
    if args.watch {
        features.push("watch".to_string());
    }
    if let Some(chaos) = config.chaos {
        features.push(format!("chaos {}%", chaos.fail_percent()));
    }
    if config.cors {
        features.push("cors".to_string());
    }

    let mut out = String::new();
    out.push_str(&format!("\n  imock serving {}\n", args.file.display()));
    out.push_str(&format!("  {} resources, {} items\n", snapshot.resources.len(), snapshot.record_count()));
    out.push_str(&format!("  {}\n", url));
    if !features.is_empty() {
        out.push_str(&format!("  features: {}\n", features.join(", ")));
    }
    out.push_str("\n  Endpoints:\n");
    for (name, items) in snapshot.resources.iter() {
        out.push_str(&format!("    {}/{}  ({} items)\n", url, name, items.len()));
    }
    out.push_str(&format!("    {}/health\n    {}/db\n", url, url));
    out.push_str("\n  Query: ?q=term  ?field=value  ?_sort=field&_order=desc  ?_page=1&_limit=10\n");
    out
}

//! # Tandem Server
//!
//! Main binary. Runs the signaling coordinator, the client and bridge
//! WebSockets, the health endpoint, optional static assets, and optionally
//! the translation collaborator, all in a single process.

use clap::Parser;
use std::net::SocketAddr;
use tandem_common::config::ConfigOverrides;
use tandem_signaling::SignalingServer;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tandem", version, about = "Signaling relay for peer-to-peer video calls")]
struct Args {
    /// Address to bind (overrides `server.host`).
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides `server.port`).
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Directory of browser assets to serve at `/`.
    #[arg(long)]
    static_dir: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn overrides(self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host,
            port: self.port,
            static_dir: self.static_dir,
            log_json: self.log_json.then_some(true),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = tandem_common::config::init(args.overrides())?;

    // Initialize tracing (structured logging)
    init_tracing(config.logging.json);

    tracing::info!("Starting Tandem v{}", env!("CARGO_PKG_VERSION"));

    // === Signaling coordinator ===
    let signaling = SignalingServer::start(&config.signaling);
    let app = tandem_server::build_app(&signaling, config);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;

    tracing::info!("Signaling listening on ws://{local}/signal");
    tracing::info!("Bridge listening on ws://{local}/bridge");

    // === Translation collaborator ===
    let _collaborator = tandem_server::collaborator::launch(
        &config.collaborator,
        &tandem_server::bridge_url(local.port()),
    )?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Tandem stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if json {
        builder.json().init();
    } else {
        builder.with_thread_ids(true).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

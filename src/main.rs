use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slipway::auth::TokenCodec;
use slipway::config::ServerConfig;
use slipway::github::{GitHubApi, HttpIdentityProvider};
use slipway::orchestrator::HttpOrchestrator;
use slipway::repos::RepoHome;
use slipway::server::{AppState, create_router};
use slipway::store::{ReleaseStore, SqliteStore};

#[derive(Parser)]
#[command(name = "slipway")]
#[command(about = "Source-to-deploy delivery server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Serve {
        /// Configuration file (TOML); environment and flags override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(long, short)]
        port: Option<u16>,

        /// Data directory for database, repositories and release artifacts
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Public base URL for webhook callbacks
        #[arg(long)]
        public_base_url: Option<String>,
    },

    /// Report a ref update to the server; installed as the repository update
    /// hook and invoked by git receive-pack, not interactively
    ReceiveHook {
        #[arg(long)]
        refname: String,

        #[arg(long)]
        oldrev: String,

        #[arg(long)]
        newrev: String,
    },
}

async fn run_serve(config: ServerConfig) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;

    let store = SqliteStore::new(config.db_path())?;
    store.initialize()?;

    let tokens = TokenCodec::from_config(&config.auth)?;
    let repos = RepoHome::new(config.data_dir.join("git"), std::env::current_exe()?);
    let orchestrator = HttpOrchestrator::new(&config.orchestrator)?;
    let github = GitHubApi::new(&config.github)?;
    let identity = HttpIdentityProvider::new(&config.identity)?;

    let state = Arc::new(AppState {
        store: Arc::new(store),
        tokens,
        repos,
        orchestrator: Arc::new(orchestrator),
        github: Arc::new(github),
        identity: Arc::new(identity),
        config,
    });

    let app = create_router(state.clone());
    let addr = state.config.socket_addr()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("slipway=info".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            data_dir,
            public_base_url,
        } => {
            let mut config = ServerConfig::load(config.as_deref())?.with_env_overrides()?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(url) = public_base_url {
                config.public_base_url = Some(url);
            }
            config.validate()?;

            run_serve(config).await?;
        }
        Commands::ReceiveHook {
            refname,
            oldrev,
            newrev,
        } => {
            slipway::hook::run(&refname, &oldrev, &newrev).await?;
        }
    }

    Ok(())
}

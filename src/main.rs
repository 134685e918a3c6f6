use anyhow::{Context as _, Result};
use arc_swap::ArcSwap;
use clap::{CommandFactory as _, Parser, Subcommand};
use ghgate_auth::{
    CopilotAuth, CopilotTokenExchanger, DeviceFlowClient, DeviceFlowService, TokenCache,
    http::build_http_client,
};
use ghgate_config::{Config, ConfigWatcher, LogConfig, LogFormat};
use ghgate_proxy::AppState;
use ghgate_store::SqliteCredentialStore;
use ghgate_types::{Credential, CredentialStore, attr};
use std::{path::PathBuf, sync::Arc};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(
    name = "ghgate",
    version,
    about = "ghgate: GitHub device-flow credentials and a Copilot API gateway"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    /// SQLite database path (default: ~/.ghgate/credentials.db).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Override the listening port (default: 8018).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },
    /// Authorize a stored credential with the GitHub device flow.
    Login {
        credential_id: String,
        /// Print the verification URL instead of opening a browser.
        #[arg(long)]
        no_browser: bool,
    },
    /// Manage stored credentials.
    #[command(subcommand)]
    Credential(CredentialCommand),
    /// Print a Copilot API token for an authorized credential.
    Token { credential_id: String },
    /// Show authorization status for every stored credential.
    Status,
    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand, Debug)]
enum CredentialCommand {
    /// Create a credential and print its id.
    Add {
        /// Display name.
        #[arg(default_value = "")]
        name: String,
        /// OAuth client id override for this credential.
        #[arg(long)]
        client_id: Option<String>,
        /// OAuth scope override for this credential.
        #[arg(long)]
        scope: Option<String>,
    },
    /// List stored credentials.
    List,
    /// Delete a credential.
    Remove { credential_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "ghgate", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::load(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("config error: {e}"))?;
    let _guard = init_tracing(&config.log);

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(cli.config, config, port, host, cli.db).await,
        Commands::Login {
            credential_id,
            no_browser,
        } => cmd_login(config, cli.db, &credential_id, no_browser).await,
        Commands::Credential(cmd) => cmd_credential(config, cli.db, cmd).await,
        Commands::Token { credential_id } => cmd_token(config, cli.db, &credential_id).await,
        Commands::Status => cmd_status(config, cli.db).await,
        Commands::Completions { .. } => Ok(()),
    }
}

async fn cmd_serve(
    config_path: Option<PathBuf>,
    mut config: Config,
    port: Option<u16>,
    host: Option<String>,
    db: Option<PathBuf>,
) -> Result<()> {
    if let Some(p) = port {
        config.port = p;
    }
    if let Some(h) = host {
        config.host = h;
    }
    let addr = config.listen_addr();
    let store = open_store(db, &config).await?;

    let shared = match config_path {
        Some(path) => {
            let watcher = ConfigWatcher::new(path)
                .map_err(|e| anyhow::anyhow!("config error: {e}"))?;
            let watcher = Arc::new(watcher);
            let shared = watcher.arc();
            shared.store(Arc::new(config));
            watcher.watch();
            shared
        }
        None => Arc::new(ArcSwap::from_pointee(config)),
    };

    let state = AppState::new(shared, store);
    let app = ghgate_proxy::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "ghgate listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn cmd_login(
    config: Config,
    db: Option<PathBuf>,
    credential_id: &str,
    no_browser: bool,
) -> Result<()> {
    let store = open_store(db, &config).await?;
    let http = build_http_client(&config.http);
    let cache = Arc::new(TokenCache::new(config.copilot.refresh_buffer_secs));
    let service = DeviceFlowService::new(
        store,
        DeviceFlowClient::new(http),
        cache,
        Arc::new(ArcSwap::from_pointee(config)),
    );

    ghgate_auth::flow::login(&service, credential_id, |auth| {
        eprintln!("Visit: {}", auth.verification_uri);
        eprintln!("Enter verification code: {}", auth.user_code);
        if !no_browser && let Err(e) = open::that(&auth.verification_uri) {
            eprintln!("Failed to open browser automatically: {e}");
        }
    })
    .await
    .map_err(|e| anyhow::anyhow!("login failed: {e}"))?;

    eprintln!("credential {credential_id} authorized");
    Ok(())
}

async fn cmd_credential(config: Config, db: Option<PathBuf>, cmd: CredentialCommand) -> Result<()> {
    let store = open_store(db, &config).await?;
    match cmd {
        CredentialCommand::Add {
            name,
            client_id,
            scope,
        } => {
            let mut credential = Credential::new(ghgate_store::new_credential_id(), name);
            if let Some(client_id) = client_id {
                credential = credential.with_attribute(attr::CLIENT_ID, client_id);
            }
            if let Some(scope) = scope {
                credential = credential.with_attribute(attr::SCOPE, scope);
            }
            store.put(&credential).await?;
            println!("{}", credential.id);
        }
        CredentialCommand::List => {
            for credential in store.list().await? {
                println!("{}\t{}", credential.id, credential.name);
            }
        }
        CredentialCommand::Remove { credential_id } => {
            if store.remove(&credential_id).await? {
                eprintln!("credential {credential_id} removed");
            } else {
                anyhow::bail!("credential not found: {credential_id}");
            }
        }
    }
    Ok(())
}

async fn cmd_token(config: Config, db: Option<PathBuf>, credential_id: &str) -> Result<()> {
    let store = open_store(db, &config).await?;
    let http = build_http_client(&config.http);
    let cache = Arc::new(TokenCache::new(config.copilot.refresh_buffer_secs));
    let auth = CopilotAuth::new(
        store,
        CopilotTokenExchanger::new(http, cache, config.copilot.token_url.clone()),
    );
    let token = auth.copilot_token(credential_id).await?;
    eprintln!(
        "expires_at={} source={:?} endpoint={}",
        token.expires_at,
        token.source,
        token.api_endpoint.as_deref().unwrap_or(&config.copilot.api_base_url)
    );
    println!("{}", token.token);
    Ok(())
}

async fn cmd_status(config: Config, db: Option<PathBuf>) -> Result<()> {
    let store = open_store(db, &config).await?;
    for credential in store.list().await? {
        let status = match credential.typed() {
            Ok(attrs) if attrs.is_authorized() => "authorized",
            Ok(_) => "not authorized",
            Err(_) => "invalid attributes",
        };
        println!("{}\t{}\t{status}", credential.id, credential.name);
    }
    Ok(())
}

async fn open_store(db: Option<PathBuf>, config: &Config) -> Result<Arc<dyn CredentialStore>> {
    let path = db
        .or_else(|| config.db.clone())
        .unwrap_or_else(default_db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite://{}", path.display());
    let store = SqliteCredentialStore::new(&url)
        .await
        .map_err(|e| anyhow::anyhow!("database error: {e}"))?;
    Ok(Arc::new(store))
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".ghgate").join("credentials.db")
}

/// Install the global subscriber. `RUST_LOG` overrides `log.level`.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let text = (log.format == LogFormat::Text)
        .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let json = (log.format == LogFormat::Json)
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));

    let (file, guard) = match log.file.as_deref() {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path.file_name().map_or_else(
                || std::ffi::OsString::from("ghgate.log"),
                std::ffi::OsStr::to_os_string,
            );
            let appender = tracing_appender::rolling::daily(
                dir.unwrap_or_else(|| std::path::Path::new(".")),
                name,
            );
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(file)
        .init();
    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

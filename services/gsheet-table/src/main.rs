//! gsheet-table
//!
//! Command-line host for the Google Sheets credential manager:
//! 1. Keeps auth settings (method, OAuth client, tokens) in a JSON file
//! 2. Runs the loopback PKCE sign-in in the system browser
//! 3. Renders a `gsheet` block as a markdown table, reading either the
//!    public CSV export or the Sheets values API

mod block;
mod config;
mod error;
mod render;
mod table;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use google_auth::{
    AUTHORIZATION_TIMEOUT, AuthMethod, CredentialManager, ManagerOptions, SettingsStore,
    SystemClock,
};
use tokio::io::AsyncReadExt;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::render::PreparedBlock;

#[derive(Parser, Debug)]
#[command(name = "gsheet-table", version, about = "Render Google Sheets ranges as tables.")]
struct Cli {
    /// Config file (defaults to GSHEET_CONFIG, then ./gsheet-table.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the auth method, client and token state.
    Status,
    /// Change the auth method or the OAuth client.
    Configure {
        /// `public-csv` or `oauth-desktop`.
        #[arg(long)]
        method: Option<AuthMethod>,
        /// Desktop OAuth client id.
        #[arg(long)]
        client_id: Option<String>,
        /// Desktop OAuth client secret. Pass an empty string to clear it.
        #[arg(long)]
        client_secret: Option<String>,
    },
    /// Sign in through the system browser.
    SignIn,
    /// Forget stored tokens. The OAuth client is kept.
    SignOut,
    /// Check that a usable access token can be obtained.
    TestConnection,
    /// Render a gsheet block as a markdown table.
    Render {
        /// File holding the block text; stdin when omitted.
        file: Option<PathBuf>,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;

    let store = SettingsStore::load(config.settings_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load settings from {}",
                config.settings_path.display()
            )
        })?;

    let manager = CredentialManager::with_options(
        store,
        http,
        ManagerOptions {
            endpoints: config.endpoints.to_endpoints(),
            clock: std::sync::Arc::new(SystemClock),
            authorization_timeout: AUTHORIZATION_TIMEOUT,
            client_secret: config.client_secret.clone(),
        },
    );

    run(cli.command, &manager).await
}

async fn run(command: Command, manager: &CredentialManager) -> Result<ExitCode> {
    match command {
        Command::Status => {
            let settings = manager.settings().await;
            println!("method:        {}", settings.auth_method);
            println!(
                "client id:     {}",
                if settings.has_client_id() { "set" } else { "missing" }
            );
            println!(
                "client secret: {}",
                if settings.client_secret.is_empty() { "none" } else { "set" }
            );
            println!("signed in:     {}", manager.is_authenticated().await);
            Ok(ExitCode::SUCCESS)
        }
        Command::Configure {
            method,
            client_id,
            client_secret,
        } => {
            if let Some(method) = method {
                manager.set_auth_method(method).await?;
            }
            if client_id.is_some() || client_secret.is_some() {
                let current = manager.settings().await;
                manager
                    .set_client(
                        client_id.as_deref().unwrap_or(&current.client_id),
                        client_secret.as_deref().unwrap_or(&current.client_secret),
                    )
                    .await?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::SignIn => {
            let opener = |url: &str| -> google_auth::Result<()> {
                eprintln!("Opening the browser for Google sign-in. If it does not open, visit:\n{url}");
                webbrowser::open(url).map_err(|e| google_auth::Error::Browser(e.to_string()))
            };
            match manager.start_interactive_authorization(&opener).await {
                Ok(()) => {
                    println!("Signed in.");
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Sign-in failed: {e}");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Command::SignOut => {
            manager.sign_out().await?;
            println!("Signed out.");
            Ok(ExitCode::SUCCESS)
        }
        Command::TestConnection => match manager.test_connection().await {
            Ok(()) => {
                println!("OK");
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                eprintln!("{e}");
                Ok(ExitCode::FAILURE)
            }
        },
        Command::Render { file } => {
            let source = read_block(file).await?;
            render_block(&source, manager).await
        }
    }
}

async fn read_block(file: Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut source = String::new();
            tokio::io::stdin()
                .read_to_string(&mut source)
                .await
                .context("failed to read block from stdin")?;
            Ok(source)
        }
    }
}

async fn render_block(source: &str, manager: &CredentialManager) -> Result<ExitCode> {
    let result = async {
        let block = PreparedBlock::prepare(source, &manager.endpoints().docs_base)?;
        println!("[Open in Google Sheets]({})\n", block.edit_url());
        block.fetch_table(manager).await
    }
    .await;

    match result {
        Ok(table) => {
            print!("{}", table.render_markdown());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(error = %e, "failed to render block");
            eprintln!("Error loading sheet: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

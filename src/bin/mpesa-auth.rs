use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mpesa_auth::observability::metrics::render_metrics;
use mpesa_auth::utils::config_loader;
use mpesa_auth::utils::logging::{self, LogLevel};
use mpesa_auth::TokenManager;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML config; MPESA_* variables are used when omitted
    #[arg(short, long, env = "MPESA_CONFIG")]
    config: Option<String>,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
    /// print prometheus metrics after the command
    #[arg(long)]
    metrics: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a usable access token
    Token,
    /// Print the Authorization header
    Header,
    /// Print token expiry details as JSON
    Info,
    /// Force a new token from the provider
    Refresh,
    /// Drop the in-memory and cached token
    Clear,
    /// Exit non-zero when no token can be obtained
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load config, init logging
    // -------------------------------

    let args = Args::parse();
    let config = config_loader::run(args.config.as_deref())?;
    logging::init_logging(&logging::resolve_logging_config(Some(&config), args.log_level));

    // -------------------------------
    // 2. Build token manager
    // -------------------------------

    let manager = TokenManager::from_config(config)?;
    info!("token manager ready, cache key '{}'", manager.cache_key());

    // -------------------------------
    // 3. Run command
    // -------------------------------

    match args.command {
        Command::Token => println!("{}", manager.get_access_token().await?),
        Command::Header => {
            let headers = manager.authorization_header().await?;
            for (name, value) in headers.iter() {
                println!("{}: {}", name, value.to_str().context("header is not printable")?);
            }
        }
        Command::Info => {
            let token_info = manager.token_info().await?;
            println!("{}", serde_json::to_string_pretty(&token_info)?);
        }
        Command::Refresh => println!("{}", manager.generate_access_token().await?),
        Command::Clear => {
            manager.clear_cache().await;
            println!("token cache cleared");
        }
        Command::Check => {
            if !manager.test_connection().await {
                anyhow::bail!("could not obtain an access token");
            }
            println!("ok");
        }
    }

    if args.metrics {
        print!("{}", render_metrics().await?);
    }
    Ok(())
}

mod orders;
mod webhook;


use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::orders::OrderCommands;

#[derive(Debug, Parser)]
#[command(name = "glowcart-cli")]
#[command(about = "Glowcart payment webhook operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run pending database migrations
    Migrate,
    /// Print the signature header for a webhook payload
    Sign {
        /// JSON payload to sign
        #[arg(long)]
        file: PathBuf,
        /// Unix timestamp to sign with (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,
        /// Sign the live-mode component instead of the test-mode one
        #[arg(long)]
        live: bool,
        #[arg(long, env = "GLOWCART_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Deliver a signed payload to a running webhook endpoint
    Send {
        /// Endpoint URL (e.g. http://localhost:3000/api/webhook)
        #[arg(long)]
        url: String,
        /// JSON payload to deliver
        #[arg(long)]
        file: PathBuf,
        #[arg(long, env = "GLOWCART_WEBHOOK_BASIC_USER", default_value = "paymongo")]
        user: String,
        #[arg(
            long,
            env = "GLOWCART_WEBHOOK_BASIC_PASSWORD",
            hide_env_values = true,
            default_value = ""
        )]
        password: String,
        #[arg(long)]
        timestamp: Option<i64>,
        #[arg(long)]
        live: bool,
        #[arg(long, env = "GLOWCART_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Inspect or seed orders
    Order {
        #[command(subcommand)]
        command: OrderCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Migrate) => {
            let pool = connect().await?;
            let applied = glowcart_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Some(Commands::Sign {
            file,
            timestamp,
            live,
            secret,
        }) => {
            let body = std::fs::read(&file)?;
            println!(
                "{}",
                webhook::signature_header(&body, &secret, timestamp, live)
            );
        }
        Some(Commands::Send {
            url,
            file,
            user,
            password,
            timestamp,
            live,
            secret,
        }) => {
            let body = std::fs::read(&file)?;
            let header = webhook::signature_header(&body, &secret, timestamp, live);
            webhook::run_send(&url, body, &header, &user, &password).await?;
        }
        Some(Commands::Order { command }) => {
            let pool = connect().await?;
            orders::run_order_command(pool, command).await?;
        }
        None => println!("glowcart-cli: run with --help for available commands"),
    }

    Ok(())
}

async fn connect() -> anyhow::Result<sqlx::PgPool> {
    let config = glowcart_core::load_app_config()?;
    let pool_config = glowcart_db::PoolConfig::from_app_config(&config);
    Ok(glowcart_db::connect_pool(&config.database_url, pool_config).await?)
}

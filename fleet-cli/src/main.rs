//! Operator entrypoint.
//!
//! Usage:
//!   fleetctl init    - Create the schema and seed the root user
//!   fleetctl serve   - Run the control plane (API server + janitor)
//!   fleetctl status  - Probe a running server's health endpoint

use clap::{Parser, Subcommand};
use fleet_api::{ApiConfig, AppState};
use fleet_core::types::UserRole;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(about = "Proxy fleet control plane")]
#[command(version)]
struct Cli {
    /// Database URL (default: env DATABASE_URL, then sqlite://fleet.db)
    #[arg(long)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and seed the root user from
    /// ROOT_EMAIL / ROOT_PASSWORD
    Init,

    /// Start the API server and background janitor
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on (default: env PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show server status
    Status {
        /// API server URL
        #[arg(short, long, default_value = "http://localhost:8080")]
        api_url: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run_command(cli).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let database_url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite://fleet.db".to_string());

    match cli.command {
        Commands::Init => {
            let pool = fleet_db::connect(&database_url).await?;
            fleet_db::init_schema(&pool).await?;
            seed_root_user(&pool).await?;
            println!("Database schema initialized.");
            Ok(())
        }

        Commands::Serve { host, port } => {
            let port = port
                .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
                .unwrap_or(8080);
            let jwt_secret = std::env::var("JWT_SECRET")
                .map_err(|_| "JWT_SECRET environment variable is required")?;
            let sync_secret = std::env::var("SYNC_SHARED_SECRET").ok();

            let pool = fleet_db::connect(&database_url).await?;
            fleet_db::init_schema(&pool).await?;
            seed_root_user(&pool).await?;

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let janitor = fleet_db::services::Janitor::new(pool.clone());
            let jobs = janitor.spawn(shutdown_rx);

            let state = AppState::new(pool, jwt_secret, sync_secret);
            let config = ApiConfig {
                host,
                port,
                enable_cors: true,
            };

            let result = tokio::select! {
                result = fleet_api::run_server(config, state) => result,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                    Ok(())
                }
            };

            let _ = shutdown_tx.send(true);
            for job in jobs {
                job.abort();
            }
            result
        }

        Commands::Status { api_url } => {
            let response = reqwest::Client::new()
                .get(format!("{api_url}/api/v1/health"))
                .send()
                .await?
                .json::<serde_json::Value>()
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
    }
}

/// Seed the root account on first start when ROOT_EMAIL / ROOT_PASSWORD
/// are provided and no user exists yet.
async fn seed_root_user(pool: &SqlitePool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (Ok(email), Ok(password)) = (std::env::var("ROOT_EMAIL"), std::env::var("ROOT_PASSWORD"))
    else {
        return Ok(());
    };

    if fleet_db::repos::user::count(pool).await? > 0 {
        return Ok(());
    }

    let hash = fleet_db::services::auth::hash_password(&password)?;
    fleet_db::repos::user::insert(pool, "root", &email, &hash, UserRole::Root).await?;
    tracing::info!(%email, "seeded root user");
    Ok(())
}

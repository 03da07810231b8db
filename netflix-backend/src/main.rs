use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use netflix_backend::prelude::*;

/// netflix-backend - account and token API for the Netflix clone
#[derive(Parser)]
#[command(name = "netflix-backend")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Service config file (skips the default search path)
    #[arg(long, global = true, env = "NETFLIX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,
    /// Apply pending database migrations
    Migrate,
    /// Create a staff account with every permission
    Createsuperuser {
        /// Login handle
        #[arg(long)]
        username: String,
        /// Email address
        #[arg(long)]
        email: String,
        /// Password
        #[arg(long, env = "NETFLIX_SUPERUSER_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete refresh token records that have expired
    FlushExpiredTokens,
    /// Validate settings without starting the server
    Check {
        /// Also report production hazards
        #[arg(long)]
        deploy: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("\nCaused by: {cause}");
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let base_dir = std::env::current_dir().context("Failed to resolve the working directory")?;
    let settings = Settings::from_process_env(&base_dir)?;

    init_tracing(&config, settings.debug)?;
    tracing::info!(
        debug = settings.debug,
        database = %settings.database.describe(),
        "Settings resolved"
    );

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config, settings).await,
        Commands::Migrate => migrate(config, settings).await,
        Commands::Createsuperuser {
            username,
            email,
            password,
        } => {
            let state = state(config, settings).await?;
            let user = state
                .accounts()
                .create_superuser(&username, &email, &password)
                .await
                .context("Superuser not created")?;
            println!("Superuser created: {} <{}>", user.username, user.email);
            Ok(())
        }
        Commands::FlushExpiredTokens => {
            let state = state(config, settings).await?;
            let flushed = state.accounts().flush_expired_tokens().await?;
            println!("Flushed {flushed} expired refresh tokens");
            Ok(())
        }
        Commands::Check { deploy } => {
            check(&settings, deploy);
            Ok(())
        }
    }
}

async fn state(config: Config, settings: Settings) -> Result<AppState> {
    AppState::builder()
        .config(config)
        .settings(settings)
        .build()
        .await
}

async fn serve(config: Config, settings: Settings) -> anyhow::Result<()> {
    if !settings.debug {
        for warning in settings.deployment_warnings() {
            tracing::warn!("{}", warning);
        }
    }

    let state = state(config.clone(), settings).await?;
    let db = state.db().clone();

    Server::new(config).serve(application(state)).await?;
    db.close().await;

    Ok(())
}

async fn migrate(config: Config, settings: Settings) -> anyhow::Result<()> {
    let db = Database::connect(&settings.database, &config.database).await?;
    db.migrate().await?;
    db.close().await;
    println!("Migrations applied to {}", settings.database.describe());
    Ok(())
}

fn check(settings: &Settings, deploy: bool) {
    let issues = if deploy {
        settings.deployment_warnings()
    } else {
        Vec::new()
    };

    if issues.is_empty() {
        println!("System check identified no issues.");
        return;
    }
    println!("System check identified some issues:\n\nWARNINGS:");
    for issue in &issues {
        println!("  - {issue}");
    }
    println!("\nSystem check identified {} issue(s).", issues.len());
}

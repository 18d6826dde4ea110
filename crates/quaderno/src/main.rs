use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod completion;
mod config;
mod dashboard;
mod db;
mod error;
mod html;
mod planner;
mod progress;
mod reminders;
mod reports;
mod schedule;
mod server;
mod types;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "quaderno")]
#[command(about = "Study planner: subjects, tasks, study blocks, progress and reminders")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Reconcile one account's reminders and list them
    Reminders {
        /// Account id
        #[arg(short, long)]
        user: String,
    },

    /// Ask the scheduling endpoint for a generated schedule
    Schedule {
        /// Base URL of the deployment
        #[arg(long)]
        url: String,

        /// Bearer token for the request
        #[arg(long)]
        token: String,
    },
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level))
        .add_directive("hyper=warn".parse()?)
        .add_directive("tower_http=warn".parse()?);

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level)?;
    let config = Config::from_env()?;

    match args.command {
        // Default to serve if no command specified
        None => server::serve(config, 8080).await?,
        Some(Commands::Serve { port }) => server::serve(config, port).await?,
        Some(Commands::Reminders { user }) => {
            let conn = db::init_db(&config.db_path, &config.migrations_dir)?;
            let profile = db::get_profile(&conn, &user)?
                .with_context(|| format!("No profile for account {user}"))?;
            let board = server::load_reminder_board(&conn, &user, &profile, &config)?;

            info!(
                upcoming = board.upcoming.len(),
                past = board.past.len(),
                "Reminders"
            );
            for reminder in &board.upcoming {
                info!(
                    remind_at = %reminder.remind_at,
                    task = reminder.task_id.as_deref().unwrap_or("-"),
                    message = reminder.message.as_deref().unwrap_or(""),
                    "Upcoming"
                );
            }
            for reminder in &board.past {
                info!(
                    remind_at = %reminder.remind_at,
                    status = %reminder.status,
                    "Past"
                );
            }
        }
        Some(Commands::Schedule { url, token }) => {
            let client = reqwest::Client::new();
            let payload = serde_json::json!({ "requested_at": chrono::Utc::now() });
            let response = schedule::request_schedule(&client, &url, &token, &payload).await?;
            info!(response = %response, "Schedule generated");
        }
    }

    Ok(())
}

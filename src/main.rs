use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "leadcall")]
#[command(version, about = "Lead capture orchestrator with AI voice interviews")]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./leadcall.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server (lead API, voice webhooks, widget)
    Serve {
        /// Port to serve on
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// SQLite database path
        #[arg(long)]
        db_path: Option<PathBuf>,

        /// Enable dev mode (permissive CORS, opens the demo page)
        #[arg(long)]
        dev: bool,
    },
    /// Create and seed the SQLite lead database
    Init {
        /// Database path
        #[arg(long, default_value = cmd::init::DEFAULT_DB_PATH)]
        db_path: PathBuf,
    },
    /// Place an outbound call from the terminal
    Call {
        /// Destination number in E.164 form, e.g. +14155552671
        phone: String,

        /// Name the assistant greets the lead with
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print leads as JSON
    Leads {
        /// Show one lead with its answers
        #[arg(long)]
        id: Option<String>,
    },
}

/// Console logging plus an optional daily-rolling file under `LEADCALL_LOG_DIR`.
fn init_tracing(verbose: bool, json: bool) -> Option<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    let (file, guard) = match std::env::var("LEADCALL_LOG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "leadcall.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.verbose, cli.log_json);

    let config = cmd::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            db_path,
            dev,
        } => cmd::cmd_serve(config, port, host, db_path, dev).await?,
        Commands::Init { db_path } => cmd::cmd_init(&db_path).await?,
        Commands::Call { phone, name } => cmd::cmd_call(&config, &phone, name.as_deref()).await?,
        Commands::Leads { id } => cmd::cmd_leads(&config, id.as_deref()).await?,
    }

    Ok(())
}

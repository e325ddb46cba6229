//! AgriTech assistant CLI - main entry point

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use agritech_bot::commands::{self, ForgetArgs, IngestArgs};
use agritech_bot::{metrics, Config};

#[derive(Parser)]
#[command(name = "agritech_bot")]
#[command(
    about = "Telegram agronomy assistant with retrieval-augmented answers",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Path to config.yml (defaults to ./config.yml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR", global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot
    Serve,

    /// Answer one question and print the reply
    Ask {
        /// Question text
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the turn trace
        #[arg(long, default_value_t = false)]
        trace: bool,
    },

    /// Chunk, embed and store documents in the knowledge base
    Ingest {
        /// Text or Markdown files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target collection (overrides config)
        #[arg(long)]
        collection: Option<String>,
    },

    /// Delete passages by id, or the whole collection when no ids are given
    Forget {
        /// Point ids to delete
        #[arg(long, num_args = 1..)]
        ids: Vec<String>,

        /// Delete every passage ingested from this file name
        #[arg(long = "source")]
        sources: Vec<String>,

        /// Target collection (overrides config)
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("agritech_bot=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    let config = Config::load(cli.config.as_deref())?;
    execute_command(&config, cli.command).await
}

async fn execute_command(config: &Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve => {
            commands::serve_run(config).await?;
        }
        Commands::Ask { question, trace } => {
            let report = commands::ask_run(config, &question.join(" ")).await?;
            if trace {
                eprintln!("outcome: {:?}", report.outcome);
                eprintln!("trace: {:?}", report.trace);
                if !report.degraded.is_empty() {
                    eprintln!("degraded: {:?}", report.degraded);
                }
            }
            println!("{}", report.answer.text);
        }
        Commands::Ingest { files, collection } => {
            let result = commands::ingest_run(config, IngestArgs { files, collection }).await?;
            for id in &result.ids {
                println!("{}", id);
            }
            eprintln!(
                "Stored {} passages from {} files",
                result.ids.len(),
                result.files
            );
        }
        Commands::Forget {
            ids,
            sources,
            collection,
        } => {
            let args = ForgetArgs {
                ids,
                sources,
                collection,
            };
            commands::forget_run(config, args).await?;
        }
    }
    Ok(())
}

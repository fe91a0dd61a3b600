use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod clear;

use crate::core::config::AppConfig;
use clear::Target;

#[derive(Subcommand)]
enum Command {
    /// Start an interactive chat session
    Chat {
        /// Track a local file at startup (repeatable)
        #[arg(long)]
        file: Vec<PathBuf>,

        /// Resume from a saved session archive (.zip)
        #[arg(long)]
        history: Option<PathBuf>,

        /// Save the session to this archive on exit (.zip)
        #[arg(long)]
        save: Option<PathBuf>,

        /// Disable the execution sandbox
        #[arg(long, action, default_value = "false")]
        no_code_interpreter: bool,
    },
    /// Delete uploaded files from the remote store
    ClearFiles {
        /// Object ids to leave in place (repeatable)
        #[arg(long)]
        keep: Vec<String>,
    },
    /// Delete vector stores
    ClearVectorStores {
        #[arg(long)]
        keep: Vec<String>,
    },
    /// Delete execution containers
    ClearContainers {
        #[arg(long)]
        keep: Vec<String>,
    },
    /// Delete files, vector stores, and containers in one go
    ClearAll {
        #[arg(long)]
        keep: Vec<String>,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

pub async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Cli::parse();
    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Chat {
            file,
            history,
            save,
            no_code_interpreter,
        }) => {
            chat::run(&config, file, history, save, !no_code_interpreter).await?;
        }
        Some(Command::ClearFiles { keep }) => {
            clear::run(&config, Target::Files, &keep).await?;
        }
        Some(Command::ClearVectorStores { keep }) => {
            clear::run(&config, Target::VectorStores, &keep).await?;
        }
        Some(Command::ClearContainers { keep }) => {
            clear::run(&config, Target::Containers, &keep).await?;
        }
        Some(Command::ClearAll { keep }) => {
            clear::run(&config, Target::Files, &keep).await?;
            clear::run(&config, Target::VectorStores, &keep).await?;
            clear::run(&config, Target::Containers, &keep).await?;
        }
        None => {}
    }

    Ok(())
}

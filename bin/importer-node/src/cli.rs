//! The importer CLI.

use anyhow::Result;
use chain_importer_cli::LogConfig;
use clap::{Parser, Subcommand};

use crate::command::ImportCommand;

/// Subcommands for the CLI.
#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Commands {
    /// Runs the block importer against in-memory demonstration collaborators.
    #[command(alias = "i")]
    Import(ImportCommand),
}

/// The importer CLI.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub subcommand: Commands,
    /// Global logging configuration.
    #[command(flatten)]
    pub logs: LogConfig,
}

impl Cli {
    /// Runs the CLI.
    pub(crate) fn run(self) -> Result<()> {
        self.logs.init_tracing_subscriber(None).map_err(|e| anyhow::anyhow!(e))?;

        match self.subcommand {
            Commands::Import(import) => Self::run_until_ctrl_c(import.run()),
        }
    }

    /// Runs `fut` to completion, or until ctrl-c is pressed.
    pub(crate) fn run_until_ctrl_c<F>(fut: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        let rt = Self::tokio_runtime().map_err(|e| anyhow::anyhow!(e))?;
        rt.block_on(async move {
            tokio::select! {
                res = fut => res,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!(target: "cli", "received ctrl-c, shutting down");
                    Ok(())
                }
            }
        })
    }

    /// Creates a new default multi-threaded tokio runtime with all features enabled.
    pub(crate) fn tokio_runtime() -> Result<tokio::runtime::Runtime, std::io::Error> {
        tokio::runtime::Builder::new_multi_thread().enable_all().build()
    }
}

//! The importer node binary.

mod cli;
mod command;

use clap::Parser;

fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run()
}

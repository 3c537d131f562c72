use facegate::{config::Config, menu};

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facegate")]
#[command(about = "Menu-driven face registration and verification")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "configs/facegate.toml")]
    config: PathBuf,

    /// Enable debug logging with file/line info
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = Config::load_from_path(&cli.config)?;
    menu::run(&config)?;

    Ok(())
}

fn setup_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}

//! imgvals command-line entry point.

use anyhow::Result;
use clap::Parser;
use imgvals_cli::cli;
use imgvals_cli::core::{FailureClass, classify, user_friendly_error};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let config = cli.build_config();
    init_logging(&config.log_level);

    match cli.execute_with_config(config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            let code = if classify(&e) == FailureClass::Cancelled {
                130
            } else {
                1
            };
            user_friendly_error(e).display();
            std::process::exit(code);
        }
    }
}

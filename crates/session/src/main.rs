// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use caffeine_session::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&cli);

    if let Err(e) = caffeine_session::cli::run(cli).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdout carries command output.
    match cli.log_format.as_str() {
        "json" => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).json().init();
        }
        _ => {
            fmt::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
        }
    }
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use vaultsmith::commands::{self, Cli};
use vaultsmith::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `read` and `kubeconfig` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    debug!("Using Vault at {}", config.vault_addr);

    commands::run(cli, &config).await
}

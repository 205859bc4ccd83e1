// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Command line surface.

pub mod cert;
pub mod kubeconfig;
pub mod read;
pub mod setup;
pub mod token;

use crate::config::Config;
use crate::vault::{HttpVaultClient, VaultApi};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "vaultsmith")]
#[command(about = "Manage the Vault PKI of a Kubernetes cluster and issue its certificates")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or update the backends, roles, policies and init tokens of a cluster
    Setup(setup::SetupArgs),
    /// Remove everything `setup` manages for a cluster
    Delete(setup::DeleteArgs),
    /// Ensure a private key and have Vault sign a certificate for it
    Cert(cert::CertArgs),
    /// Issue a certificate and emit a kubeconfig using it
    Kubeconfig(kubeconfig::KubeconfigArgs),
    /// Read a secret, or one of its fields
    Read(read::ReadArgs),
    /// Renew the token in VAULT_TOKEN
    RenewToken,
}

/// Run a parsed command against the Vault described by `config`.
pub async fn run(cli: Cli, config: &Config) -> anyhow::Result<()> {
    let vault: Arc<dyn VaultApi> = Arc::new(HttpVaultClient::new(config)?);
    execute(cli.command, vault, config).await
}

pub async fn execute(
    command: Commands,
    vault: Arc<dyn VaultApi>,
    config: &Config,
) -> anyhow::Result<()> {
    match command {
        Commands::Setup(args) => setup::run_setup(vault, &args).await,
        Commands::Delete(args) => setup::run_delete(vault, &args).await,
        Commands::Cert(args) => cert::run_cert(vault.as_ref(), &args).await,
        Commands::Kubeconfig(args) => kubeconfig::run_kubeconfig(vault.as_ref(), &args).await,
        Commands::Read(args) => read::run_read(vault.as_ref(), &args).await,
        Commands::RenewToken => token::run_renew_token(vault.as_ref(), config).await,
    }
}

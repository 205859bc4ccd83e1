// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{init_tokens, DEFAULT_SERVICE_ACCOUNT_KEY_BITS};
use crate::reconcile::{ClusterTopology, Reconciler, TopologyOptions, Validity};
use crate::vault::{parse_duration, VaultApi};
use anyhow::Context;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn parse_validity(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Cluster identifier, used as the prefix of every managed path
    pub cluster_id: String,

    /// Print the changes that would be made without making them
    #[arg(long)]
    pub dry_run: bool,

    /// Pin the etcd init token to this value
    #[arg(long, value_name = "TOKEN")]
    pub init_token_etcd: Option<String>,

    /// Pin the master init token to this value
    #[arg(long, value_name = "TOKEN")]
    pub init_token_master: Option<String>,

    /// Pin the worker init token to this value
    #[arg(long, value_name = "TOKEN")]
    pub init_token_worker: Option<String>,

    /// Pin the init token granting all node policies to this value
    #[arg(long, value_name = "TOKEN")]
    pub init_token_all: Option<String>,

    /// Maximum validity of the CA certificates
    #[arg(long, default_value = "175320h", value_parser = parse_validity)]
    pub max_validity_ca: Duration,

    /// Maximum validity of component certificates
    #[arg(long, default_value = "720h", value_parser = parse_validity)]
    pub max_validity_components: Duration,

    /// Maximum validity of admin certificates
    #[arg(long, default_value = "8760h", value_parser = parse_validity)]
    pub max_validity_admin: Duration,

    /// Maximum validity of init tokens
    #[arg(long, default_value = "43800h", value_parser = parse_validity)]
    pub max_validity_init_tokens: Duration,

    /// Size of a newly generated service account key
    #[arg(long, default_value_t = DEFAULT_SERVICE_ACCOUNT_KEY_BITS)]
    pub service_account_key_bits: usize,
}

impl SetupArgs {
    pub fn topology_options(&self) -> TopologyOptions {
        let mut options = TopologyOptions::new(&self.cluster_id);
        options.validity = Validity {
            ca: self.max_validity_ca,
            components: self.max_validity_components,
            admin: self.max_validity_admin,
            init_tokens: self.max_validity_init_tokens,
        };
        options.service_account_key_bits = self.service_account_key_bits;

        let pinned = [
            (init_tokens::ETCD, &self.init_token_etcd),
            (init_tokens::MASTER, &self.init_token_master),
            (init_tokens::WORKER, &self.init_token_worker),
            (init_tokens::ALL, &self.init_token_all),
        ];
        for (role, token) in pinned {
            if let Some(token) = token {
                options = options.with_init_token(role, token.clone());
            }
        }
        options
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Cluster identifier
    pub cluster_id: String,
}

pub async fn run_setup(vault: Arc<dyn VaultApi>, args: &SetupArgs) -> anyhow::Result<()> {
    let topology =
        ClusterTopology::new(&args.topology_options()).context("Invalid setup options")?;
    let reconciler = Reconciler::new(vault, topology);

    if args.dry_run {
        let plan = reconciler.plan().await?;
        if plan.is_empty() {
            info!("Cluster '{}' is up to date", args.cluster_id);
        }
        for change in &plan {
            println!("{}", change);
        }
        return Ok(());
    }

    reconciler
        .ensure()
        .await
        .with_context(|| format!("Failed to set up cluster '{}'", args.cluster_id))
}

pub async fn run_delete(vault: Arc<dyn VaultApi>, args: &DeleteArgs) -> anyhow::Result<()> {
    let topology = ClusterTopology::new(&TopologyOptions::new(&args.cluster_id))
        .context("Invalid cluster id")?;
    Reconciler::new(vault, topology)
        .delete()
        .await
        .with_context(|| format!("Failed to delete cluster '{}'", args.cluster_id))
}

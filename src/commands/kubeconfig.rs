// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::commands::cert::CertArgs;
use crate::pki::{build_kubeconfig, emit, render};
use crate::vault::VaultApi;
use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use url::Url;

#[derive(Args, Debug, Clone)]
pub struct KubeconfigArgs {
    #[command(flatten)]
    pub cert: CertArgs,

    /// URL of the Kubernetes API server
    #[arg(long)]
    pub api_url: Url,

    /// Cluster and context name; defaults to the first segment of the role path
    #[arg(long)]
    pub cluster_name: Option<String>,

    /// Write the kubeconfig here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl KubeconfigArgs {
    pub fn cluster_name(&self) -> String {
        self.cluster_name.clone().unwrap_or_else(|| {
            self.cert
                .role
                .trim_start_matches('/')
                .split('/')
                .next()
                .unwrap_or_default()
                .to_string()
        })
    }
}

pub async fn run_kubeconfig(vault: &dyn VaultApi, args: &KubeconfigArgs) -> anyhow::Result<()> {
    let cert = args.cert.to_cert()?;
    cert.issue(vault)
        .await
        .with_context(|| format!("Failed to issue certificate for '{}'", cert.common_name))?;

    let kubeconfig = build_kubeconfig(&cert, &args.cluster_name(), &args.api_url)?;
    emit(&render(&kubeconfig)?, args.output.as_deref())?;
    Ok(())
}

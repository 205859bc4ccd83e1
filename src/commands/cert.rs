// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::pki::{Cert, KeySpec, KeyType};
use crate::vault::VaultApi;
use anyhow::Context;
use clap::Args;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct CertArgs {
    /// Signing path of the role, e.g. c1/pki/k8s/sign/kubelet
    pub role: String,

    /// Common name of the certificate
    pub common_name: String,

    /// Destination prefix; writes <DEST>.pem, <DEST>-key.pem and <DEST>-ca.pem
    pub destination: PathBuf,

    /// Comma separated IP subject alternative names
    #[arg(long, value_delimiter = ',')]
    pub ip_sans: Vec<IpAddr>,

    /// Comma separated DNS subject alternative names
    #[arg(long, value_delimiter = ',')]
    pub san_hosts: Vec<String>,

    /// Private key type (rsa or ecdsa)
    #[arg(long, default_value = "rsa")]
    pub key_type: KeyType,

    /// Private key size in bits
    #[arg(long, default_value_t = 2048)]
    pub key_bit_size: usize,

    /// Owner of the written files, by name or uid
    #[arg(long)]
    pub owner: Option<String>,

    /// Group of the written files, by name or gid
    #[arg(long)]
    pub group: Option<String>,
}

impl CertArgs {
    pub fn to_cert(&self) -> anyhow::Result<Cert> {
        let mut cert = Cert::new(&self.role, &self.common_name, &self.destination);
        cert.ip_sans = self.ip_sans.clone();
        cert.san_hosts = self
            .san_hosts
            .iter()
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .collect();
        cert.key = KeySpec::new(self.key_type, self.key_bit_size)?;
        cert.owner = self.owner.clone();
        cert.group = self.group.clone();
        Ok(cert)
    }
}

pub async fn run_cert(vault: &dyn VaultApi, args: &CertArgs) -> anyhow::Result<()> {
    let cert = args.to_cert()?;
    let summary = cert
        .issue(vault)
        .await
        .with_context(|| format!("Failed to issue certificate for '{}'", args.common_name))?;

    info!(
        common_name = %summary.common_name,
        dns_names = ?summary.dns_names,
        ip_addresses = ?summary.ip_addresses,
        not_after = summary.not_after,
        "Certificate written to {}",
        cert.cert_path().display()
    );
    Ok(())
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubeconfig documents built from issued certificate files.

use crate::constants::modes;
use crate::error::{Result, VaultsmithError};
use crate::pki::cert::Cert;
use crate::pki::ownership::set_mode;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use kube::config::Kubeconfig;
use serde_json::json;
use std::fs;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use tracing::info;
use url::Url;

fn encode_file(path: &Path) -> Result<String> {
    fs::read(path)
        .map(|bytes| STANDARD.encode(bytes))
        .map_err(|e| VaultsmithError::filesystem(path, e))
}

/// Build a kubeconfig with one cluster, one user named after the certificate's
/// common name and one context binding them.
pub fn build_kubeconfig(cert: &Cert, cluster_name: &str, api_url: &Url) -> Result<Kubeconfig> {
    if cluster_name.trim().is_empty() {
        return Err(VaultsmithError::Validation(
            "kubeconfig cluster name must not be empty".to_string(),
        ));
    }

    let ca = encode_file(&cert.ca_path())?;
    let client_certificate = encode_file(&cert.cert_path())?;
    let client_key = encode_file(&cert.key_path())?;
    let user = cert.common_name.as_str();

    let document = json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{
            "name": cluster_name,
            "cluster": {
                "server": api_url.as_str().trim_end_matches('/'),
                "certificate-authority-data": ca,
            },
        }],
        "users": [{
            "name": user,
            "user": {
                "client-certificate-data": client_certificate,
                "client-key-data": client_key,
            },
        }],
        "contexts": [{
            "name": cluster_name,
            "context": {
                "cluster": cluster_name,
                "user": user,
            },
        }],
        "current-context": cluster_name,
    });

    serde_json::from_value(document)
        .map_err(|e| VaultsmithError::KubeconfigError(format!("invalid kubeconfig: {}", e)))
}

pub fn render(kubeconfig: &Kubeconfig) -> Result<String> {
    serde_yaml::to_string(kubeconfig)
        .map_err(|e| VaultsmithError::KubeconfigError(format!("failed to serialize: {}", e)))
}

/// Write a document to `output`, owner-readable only, or to stdout when unset.
pub fn emit(document: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(modes::PRIVATE_KEY)
                .open(path)
                .map_err(|e| VaultsmithError::filesystem(path, e))?;
            file.write_all(document.as_bytes())
                .map_err(|e| VaultsmithError::filesystem(path, e))?;
            // `mode` only applies on creation
            set_mode(path, modes::PRIVATE_KEY)?;
            info!("Wrote {}", path.display());
            Ok(())
        }
        None => std::io::stdout()
            .write_all(document.as_bytes())
            .map_err(|e| VaultsmithError::filesystem("<stdout>", e)),
    }
}

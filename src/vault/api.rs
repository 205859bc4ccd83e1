// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The Vault operations consumed by the reconciler and the certificate issuer.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Body of `POST sys/mounts/<path>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub config: MountConfigInput,
}

/// Lease settings sent when mounting or tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfigInput {
    pub default_lease_ttl: String,
    pub max_lease_ttl: String,
}

/// Effective lease settings of a mount, in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountConfigOutput {
    #[serde(default)]
    pub default_lease_ttl: u64,
    #[serde(default)]
    pub max_lease_ttl: u64,
}

/// One entry of `GET sys/mounts`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountOutput {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: MountConfigOutput,
}

/// Response of a logical read or write
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Secret {
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Secret {
    /// String value of a data field, if present and a string.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }
}

/// Body of `POST auth/token/create-orphan`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenCreateRequest {
    pub policies: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    pub renewable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
}

/// The `auth` block returned when a token is created or renewed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenAuth {
    pub client_token: String,
    #[serde(default)]
    pub accessor: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub lease_duration: u64,
    #[serde(default)]
    pub renewable: bool,
}

/// The `data` block returned by a token lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenInfo {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub renewable: bool,
    #[serde(default)]
    pub ttl: u64,
}

/// Client for the subset of the Vault HTTP API this tool manages.
///
/// Implementations must map "not found" on reads to `Ok(None)` and report every
/// other failure as an error; the reconciler relies on that to tell absence from
/// transient I/O problems.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// All mounts keyed by path, with the trailing slash Vault reports.
    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>>;
    async fn mount(&self, path: &str, input: &MountInput) -> Result<()>;
    async fn unmount(&self, path: &str) -> Result<()>;
    async fn mount_config(&self, path: &str) -> Result<MountConfigOutput>;
    async fn tune_mount(&self, path: &str, config: &MountConfigInput) -> Result<()>;

    async fn read(&self, path: &str) -> Result<Option<Secret>>;
    async fn write(&self, path: &str, data: &Map<String, Value>) -> Result<Option<Secret>>;
    async fn delete(&self, path: &str) -> Result<()>;

    async fn get_policy(&self, name: &str) -> Result<Option<String>>;
    async fn put_policy(&self, name: &str, rules: &str) -> Result<()>;
    async fn delete_policy(&self, name: &str) -> Result<()>;

    async fn create_orphan_token(&self, request: &TokenCreateRequest) -> Result<TokenAuth>;
    async fn revoke_orphan(&self, token: &str) -> Result<()>;
    async fn lookup_token(&self, token: &str) -> Result<TokenInfo>;
    async fn renew_token(&self, token: &str) -> Result<TokenAuth>;
}

/// Find a mount by path, ignoring leading and trailing slashes.
pub async fn find_mount(vault: &dyn VaultApi, path: &str) -> Result<Option<MountOutput>> {
    let wanted = path.trim_matches('/');
    let mounts = vault.list_mounts().await?;
    Ok(mounts
        .into_iter()
        .find(|(p, _)| p.trim_matches('/') == wanted)
        .map(|(_, m)| m))
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Mounted secret engines: PKI backends with their root CA, and generic storage.

use crate::error::{Result, VaultsmithError};
use crate::reconcile::{ChangeAction, PlannedChange, ResourceKind};
use crate::vault::api::{find_mount, MountConfigInput, MountConfigOutput, MountInput, VaultApi};
use crate::vault::duration::format_duration;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiBackend {
    pub path: String,
    pub description: String,
    pub default_lease_ttl: Duration,
    pub max_lease_ttl: Duration,
    /// Common name of the internally generated root CA
    pub ca_common_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericBackend {
    pub path: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Pki(PkiBackend),
    Generic(GenericBackend),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountDrift {
    Missing,
    /// Mounted with another engine type, carrying the live type
    WrongKind(String),
    LeaseMismatch,
    InSync,
}

/// Observed state of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendState {
    pub mount: MountDrift,
    pub root_ca_missing: bool,
}

impl BackendState {
    pub fn needs_change(&self) -> bool {
        self.mount != MountDrift::InSync || self.root_ca_missing
    }
}

impl Backend {
    pub fn pki(path: impl Into<String>, default_lease_ttl: Duration, max_lease_ttl: Duration) -> Self {
        let path = path.into();
        Backend::Pki(PkiBackend {
            description: format!("Kubernetes {} PKI", path),
            ca_common_name: path.clone(),
            path,
            default_lease_ttl,
            max_lease_ttl,
        })
    }

    pub fn generic(path: impl Into<String>) -> Self {
        let path = path.into();
        Backend::Generic(GenericBackend {
            description: format!("Kubernetes {} secrets", path),
            path,
        })
    }

    pub fn path(&self) -> &str {
        match self {
            Backend::Pki(pki) => &pki.path,
            Backend::Generic(generic) => &generic.path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Backend::Pki(_) => "pki",
            Backend::Generic(_) => "generic",
        }
    }

    /// Vault reports generic mounts as `kv`.
    fn accepts_kind(&self, live: &str) -> bool {
        match self {
            Backend::Pki(_) => live == "pki",
            Backend::Generic(_) => live == "generic" || live == "kv",
        }
    }

    fn lease_config(&self) -> MountConfigInput {
        let (default_lease, max_lease) = match self {
            Backend::Pki(pki) => (pki.default_lease_ttl, pki.max_lease_ttl),
            Backend::Generic(_) => (Duration::ZERO, Duration::ZERO),
        };
        MountConfigInput {
            default_lease_ttl: format_duration(default_lease),
            max_lease_ttl: format_duration(max_lease),
        }
    }

    fn mount_input(&self) -> MountInput {
        let description = match self {
            Backend::Pki(pki) => pki.description.clone(),
            Backend::Generic(generic) => generic.description.clone(),
        };
        MountInput {
            kind: self.kind().to_string(),
            description,
            config: self.lease_config(),
        }
    }

    /// Observe the live mount without changing anything.
    #[instrument(skip(self, vault), fields(mount = %self.path()))]
    pub async fn check(&self, vault: &dyn VaultApi) -> Result<BackendState> {
        let Some(live) = find_mount(vault, self.path()).await? else {
            return Ok(BackendState {
                mount: MountDrift::Missing,
                root_ca_missing: matches!(self, Backend::Pki(_)),
            });
        };

        if !self.accepts_kind(&live.kind) {
            return Ok(BackendState {
                mount: MountDrift::WrongKind(live.kind),
                root_ca_missing: false,
            });
        }

        match self {
            Backend::Pki(pki) => {
                let config = vault.mount_config(&pki.path).await?;
                let mount = if lease_matches(pki, &config) {
                    MountDrift::InSync
                } else {
                    MountDrift::LeaseMismatch
                };
                let root_ca_missing = !has_root_ca(vault, &pki.path).await?;
                Ok(BackendState {
                    mount,
                    root_ca_missing,
                })
            }
            Backend::Generic(_) => Ok(BackendState {
                mount: MountDrift::InSync,
                root_ca_missing: false,
            }),
        }
    }

    pub fn planned_changes(&self, state: &BackendState) -> Vec<PlannedChange> {
        let mut changes = Vec::new();
        let action = match state.mount {
            MountDrift::Missing => Some(ChangeAction::Create),
            MountDrift::WrongKind(_) => Some(ChangeAction::Conflict),
            MountDrift::LeaseMismatch => Some(ChangeAction::Update),
            MountDrift::InSync => None,
        };
        if let Some(action) = action {
            changes.push(PlannedChange::new(ResourceKind::Mount, action, self.path()));
        }
        if state.root_ca_missing {
            changes.push(PlannedChange::new(
                ResourceKind::RootCa,
                ChangeAction::Create,
                self.path(),
            ));
        }
        changes
    }

    /// Mount or tune the backend and make sure a PKI backend has its root CA.
    #[instrument(skip(self, vault), fields(mount = %self.path(), kind = self.kind()))]
    pub async fn ensure(&self, vault: &dyn VaultApi) -> Result<()> {
        let state = self.check(vault).await?;

        match &state.mount {
            MountDrift::Missing => {
                info!("Mounting {} backend", self.kind());
                vault.mount(self.path(), &self.mount_input()).await?;
            }
            MountDrift::WrongKind(live) => {
                return Err(VaultsmithError::Conflict(format!(
                    "mount '{}' has type '{}', expected '{}'",
                    self.path(),
                    live,
                    self.kind()
                )));
            }
            MountDrift::LeaseMismatch => {
                info!("Tuning lease settings");
                vault.tune_mount(self.path(), &self.lease_config()).await?;
            }
            MountDrift::InSync => debug!("Mount is up to date"),
        }

        if let (Backend::Pki(pki), true) = (self, state.root_ca_missing) {
            generate_root_ca(vault, pki).await?;
        }

        Ok(())
    }

    /// Unmount the backend. An absent mount is not an error.
    #[instrument(skip(self, vault), fields(mount = %self.path()))]
    pub async fn delete(&self, vault: &dyn VaultApi) -> Result<()> {
        match find_mount(vault, self.path()).await? {
            None => {
                debug!("Mount already absent");
                Ok(())
            }
            Some(live) if !self.accepts_kind(&live.kind) => Err(VaultsmithError::Conflict(format!(
                "refusing to unmount '{}' of unmanaged type '{}'",
                self.path(),
                live.kind
            ))),
            Some(_) => {
                info!("Unmounting backend");
                vault.unmount(self.path()).await
            }
        }
    }
}

fn lease_matches(pki: &PkiBackend, live: &MountConfigOutput) -> bool {
    live.default_lease_ttl == pki.default_lease_ttl.as_secs()
        && live.max_lease_ttl == pki.max_lease_ttl.as_secs()
}

async fn has_root_ca(vault: &dyn VaultApi, mount: &str) -> Result<bool> {
    let secret = vault.read(&format!("{}/cert/ca", mount)).await?;
    Ok(secret
        .as_ref()
        .and_then(|s| s.field("certificate"))
        .is_some_and(|pem| !pem.trim().is_empty()))
}

async fn generate_root_ca(vault: &dyn VaultApi, pki: &PkiBackend) -> Result<()> {
    info!("Generating root CA '{}'", pki.ca_common_name);
    let mut data = Map::new();
    data.insert("common_name".to_string(), json!(pki.ca_common_name));
    data.insert("ttl".to_string(), Value::String(format_duration(pki.max_lease_ttl)));
    vault
        .write(&format!("{}/root/generate/internal", pki.path), &data)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockVault;
    use crate::vault::api::MountOutput;

    fn make_pki() -> Backend {
        Backend::pki(
            "c1/pki/k8s",
            Duration::from_secs(720 * 3600),
            Duration::from_secs(175_320 * 3600),
        )
    }

    #[tokio::test]
    async fn test_missing_pki_backend_is_mounted_with_root_ca() {
        let vault = MockVault::new();
        let backend = make_pki();

        let state = backend.check(&vault).await.unwrap();
        assert_eq!(state.mount, MountDrift::Missing);
        assert!(state.root_ca_missing);

        backend.ensure(&vault).await.unwrap();

        let mount = vault.mount_entry("c1/pki/k8s").unwrap();
        assert_eq!(mount.kind, "pki");
        assert_eq!(mount.config.default_lease_ttl, 720 * 3600);
        assert_eq!(mount.config.max_lease_ttl, 175_320 * 3600);
        assert!(vault.ca_pem("c1/pki/k8s").is_some());
        assert!(!backend.check(&vault).await.unwrap().needs_change());
    }

    #[tokio::test]
    async fn test_second_ensure_makes_no_mutating_calls() {
        let vault = MockVault::new();
        let backend = make_pki();
        backend.ensure(&vault).await.unwrap();
        vault.clear_calls();

        backend.ensure(&vault).await.unwrap();
        assert!(vault.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_lease_mismatch_is_tuned_in_place() {
        let vault = MockVault::new();
        let backend = make_pki();
        backend.ensure(&vault).await.unwrap();

        let mut mount = vault.mount_entry("c1/pki/k8s").unwrap();
        mount.config.max_lease_ttl = 3600;
        vault.set_mount("c1/pki/k8s", mount);
        assert_eq!(
            backend.check(&vault).await.unwrap().mount,
            MountDrift::LeaseMismatch
        );

        vault.clear_calls();
        backend.ensure(&vault).await.unwrap();
        assert_eq!(vault.calls_for("tune_mount").len(), 1);
        assert!(vault.calls_for("mount").is_empty());
        assert_eq!(
            vault.mount_entry("c1/pki/k8s").unwrap().config.max_lease_ttl,
            175_320 * 3600
        );
    }

    #[tokio::test]
    async fn test_wrong_kind_is_a_conflict_without_mutation() {
        let vault = MockVault::new();
        vault.set_mount(
            "c1/pki/k8s",
            MountOutput {
                kind: "kv".to_string(),
                description: String::new(),
                config: MountConfigOutput::default(),
            },
        );
        let backend = make_pki();

        let state = backend.check(&vault).await.unwrap();
        assert_eq!(state.mount, MountDrift::WrongKind("kv".to_string()));
        assert_eq!(
            backend.planned_changes(&state)[0].action,
            ChangeAction::Conflict
        );

        let err = backend.ensure(&vault).await.unwrap_err();
        assert!(err.is_conflict());
        assert!(vault.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_generic_backend_accepts_kv_type() {
        let vault = MockVault::new();
        let backend = Backend::generic("c1/secrets");
        backend.ensure(&vault).await.unwrap();

        assert_eq!(vault.mount_entry("c1/secrets").unwrap().kind, "kv");
        let state = backend.check(&vault).await.unwrap();
        assert!(!state.needs_change());
        assert!(backend.planned_changes(&state).is_empty());
    }

    #[tokio::test]
    async fn test_missing_root_ca_is_regenerated() {
        let vault = MockVault::new();
        let backend = make_pki();
        vault
            .mount(
                "c1/pki/k8s",
                &MountInput {
                    kind: "pki".to_string(),
                    description: String::new(),
                    config: backend.lease_config(),
                },
            )
            .await
            .unwrap();

        let state = backend.check(&vault).await.unwrap();
        assert_eq!(state.mount, MountDrift::InSync);
        assert!(state.root_ca_missing);

        backend.ensure(&vault).await.unwrap();
        assert_eq!(vault.calls_for("mount").len(), 1);
        assert!(vault.ca_pem("c1/pki/k8s").is_some());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let vault = MockVault::new();
        let backend = make_pki();
        backend.ensure(&vault).await.unwrap();

        backend.delete(&vault).await.unwrap();
        assert!(vault.mount_entry("c1/pki/k8s").is_none());

        vault.clear_calls();
        backend.delete(&vault).await.unwrap();
        assert!(vault.mutating_calls().is_empty());
    }
}

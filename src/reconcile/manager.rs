// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Walks a cluster topology in dependency order to converge, plan or tear it down.

use crate::error::{ErrorList, Result};
use crate::reconcile::{ClusterTopology, PlannedChange, ResourceKind};
use crate::vault::api::VaultApi;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

pub struct Reconciler {
    vault: Arc<dyn VaultApi>,
    topology: ClusterTopology,
}

impl Reconciler {
    pub fn new(vault: Arc<dyn VaultApi>, topology: ClusterTopology) -> Self {
        Self { vault, topology }
    }

    pub fn topology(&self) -> &ClusterTopology {
        &self.topology
    }

    /// Converge every managed resource.
    ///
    /// Failures are collected rather than returned early, so one broken backend does
    /// not keep the others from converging. Resources that live inside a backend which
    /// failed in this pass are skipped.
    #[instrument(skip(self), fields(cluster = %self.topology.cluster_id))]
    pub async fn ensure(&self) -> Result<()> {
        let vault = self.vault.as_ref();
        let topology = &self.topology;
        let mut errors = ErrorList::new();
        let mut failed_mounts = BTreeSet::new();

        info!("Ensuring {} backends", topology.backends.len());
        for backend in &topology.backends {
            if !record(&mut errors, backend.path(), backend.ensure(vault).await) {
                failed_mounts.insert(backend.path().to_string());
            }
        }

        for role in &topology.roles {
            if failed_mounts.contains(&role.mount) {
                debug!("Skipping role {}, backend failed", role.path());
                continue;
            }
            record(&mut errors, role.path(), role.ensure(vault).await);
        }

        let secrets_available = !failed_mounts.contains(&topology.secrets_mount());
        if secrets_available {
            let key = &topology.service_account_key;
            record(&mut errors, &key.path, key.ensure(vault).await);
        }

        for policy in &topology.policies {
            record(&mut errors, &policy.name, policy.ensure(vault).await);
        }

        if secrets_available {
            for init_token in &topology.init_tokens {
                record(
                    &mut errors,
                    init_token.token_role_name(),
                    init_token.ensure(vault).await,
                );
            }
        } else {
            warn!(
                "Skipping service account key and init tokens, {} is unavailable",
                topology.secrets_mount()
            );
        }

        if errors.is_empty() {
            info!("Cluster is converged");
        }
        errors.into_result()
    }

    /// Whether `ensure` would change anything. Stops at the first drift found.
    #[instrument(skip(self), fields(cluster = %self.topology.cluster_id))]
    pub async fn ensure_dry_run(&self) -> Result<bool> {
        Ok(!self.collect_changes(true).await?.is_empty())
    }

    /// Every change `ensure` would make, in the order it would make them.
    #[instrument(skip(self), fields(cluster = %self.topology.cluster_id))]
    pub async fn plan(&self) -> Result<Vec<PlannedChange>> {
        self.collect_changes(false).await
    }

    async fn collect_changes(&self, first_only: bool) -> Result<Vec<PlannedChange>> {
        let vault = self.vault.as_ref();
        let topology = &self.topology;
        let mut changes = Vec::new();
        let done = |changes: &Vec<PlannedChange>| first_only && !changes.is_empty();

        for backend in &topology.backends {
            let state = backend.check(vault).await?;
            changes.extend(backend.planned_changes(&state));
            if done(&changes) {
                return Ok(changes);
            }
        }

        for role in &topology.roles {
            let drift = role.check(vault).await?;
            changes.extend(role.planned_change(ResourceKind::Role, drift));
            if done(&changes) {
                return Ok(changes);
            }
        }

        let key = &topology.service_account_key;
        changes.extend(key.planned_change(key.check(vault).await?));
        if done(&changes) {
            return Ok(changes);
        }

        for policy in &topology.policies {
            let drift = policy.check(vault).await?;
            changes.extend(policy.planned_change(drift));
            if done(&changes) {
                return Ok(changes);
            }
        }

        for init_token in &topology.init_tokens {
            let state = init_token.check(vault).await?;
            changes.extend(init_token.planned_changes(&state));
            if done(&changes) {
                return Ok(changes);
            }
        }

        debug!("Found {} pending changes", changes.len());
        Ok(changes)
    }

    /// Remove every managed resource, tokens first and mounts last.
    #[instrument(skip(self), fields(cluster = %self.topology.cluster_id))]
    pub async fn delete(&self) -> Result<()> {
        let vault = self.vault.as_ref();
        let topology = &self.topology;
        let mut errors = ErrorList::new();

        for init_token in topology.init_tokens.iter().rev() {
            record(
                &mut errors,
                init_token.token_role_name(),
                init_token.delete(vault).await,
            );
        }
        for policy in topology.policies.iter().rev() {
            record(&mut errors, &policy.name, policy.delete(vault).await);
        }
        for role in topology.roles.iter().rev() {
            record(&mut errors, role.path(), role.delete(vault).await);
        }
        let key = &topology.service_account_key;
        record(&mut errors, &key.path, key.delete(vault).await);
        for backend in topology.backends.iter().rev() {
            record(&mut errors, backend.path(), backend.delete(vault).await);
        }

        if errors.is_empty() {
            info!("Cluster topology deleted");
        }
        errors.into_result()
    }
}

/// Log and collect a failed resource. Returns true on success.
fn record<T>(errors: &mut ErrorList, resource: impl Display, result: Result<T>) -> bool {
    if let Err(e) = &result {
        error!("Failed to reconcile {}: {}", resource, e);
    }
    errors.collect(result)
}

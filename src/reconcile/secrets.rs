// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Service account signing key kept in the generic backend.

use crate::constants::fields;
use crate::error::Result;
use crate::pki::key::generate_rsa_pem;
use crate::reconcile::{Drift, PlannedChange, ResourceKind};
use crate::vault::api::VaultApi;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

/// Generated once when missing and never rotated by a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAccountKey {
    pub path: String,
    pub bits: usize,
}

impl ServiceAccountKey {
    pub fn new(secrets_mount: &str, bits: usize) -> Self {
        Self {
            path: format!("{}/service-accounts", secrets_mount),
            bits,
        }
    }

    #[instrument(skip(self, vault), fields(path = %self.path))]
    pub async fn check(&self, vault: &dyn VaultApi) -> Result<Drift> {
        let present = vault
            .read(&self.path)
            .await?
            .as_ref()
            .and_then(|s| s.field(fields::SERVICE_ACCOUNT_KEY))
            .is_some_and(|key| !key.trim().is_empty());
        Ok(if present { Drift::InSync } else { Drift::Missing })
    }

    pub fn planned_change(&self, drift: Drift) -> Option<PlannedChange> {
        PlannedChange::from_drift(ResourceKind::ServiceAccountKey, drift, &self.path)
    }

    #[instrument(skip(self, vault), fields(path = %self.path))]
    pub async fn ensure(&self, vault: &dyn VaultApi) -> Result<Drift> {
        let drift = self.check(vault).await?;
        if !drift.is_drift() {
            debug!("Service account key present");
            return Ok(drift);
        }

        info!("Generating {} bit service account key", self.bits);
        let pem = generate_rsa_pem(self.bits)?;
        let mut data = Map::new();
        data.insert(fields::SERVICE_ACCOUNT_KEY.to_string(), Value::String(pem));
        vault.write(&self.path, &data).await?;
        Ok(drift)
    }

    pub async fn delete(&self, vault: &dyn VaultApi) -> Result<()> {
        if vault.read(&self.path).await?.is_none() {
            return Ok(());
        }
        info!("Deleting service account key {}", self.path);
        vault.delete(&self.path).await
    }
}

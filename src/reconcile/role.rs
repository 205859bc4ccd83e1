// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Named role definitions: PKI signing roles and token roles.

use crate::error::Result;
use crate::reconcile::{Drift, PlannedChange, ResourceKind};
use crate::vault::api::VaultApi;
use crate::vault::duration::parse_duration;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

/// A role stored at `<mount>/roles/<name>` and replaced wholesale on drift.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub mount: String,
    pub name: String,
    pub attributes: Map<String, Value>,
}

impl Role {
    pub fn new(mount: impl Into<String>, name: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            mount: mount.into(),
            name: name.into(),
            attributes,
        }
    }

    pub fn path(&self) -> String {
        format!("{}/roles/{}", self.mount, self.name)
    }

    #[instrument(skip(self, vault), fields(role = %self.path()))]
    pub async fn check(&self, vault: &dyn VaultApi) -> Result<Drift> {
        let drift = match vault.read(&self.path()).await? {
            None => Drift::Missing,
            Some(live) if attributes_match(&self.attributes, &live.data) => Drift::InSync,
            Some(_) => Drift::Changed,
        };
        Ok(drift)
    }

    pub fn planned_change(&self, kind: ResourceKind, drift: Drift) -> Option<PlannedChange> {
        PlannedChange::from_drift(kind, drift, self.path())
    }

    /// Write the full role when it is missing or any desired attribute differs.
    #[instrument(skip(self, vault), fields(role = %self.path()))]
    pub async fn ensure(&self, vault: &dyn VaultApi) -> Result<Drift> {
        let drift = self.check(vault).await?;
        match drift {
            Drift::InSync => debug!("Role is up to date"),
            Drift::Missing | Drift::Changed => {
                info!("Writing role ({:?})", drift);
                vault.write(&self.path(), &self.attributes).await?;
            }
        }
        Ok(drift)
    }

    #[instrument(skip(self, vault), fields(role = %self.path()))]
    pub async fn delete(&self, vault: &dyn VaultApi) -> Result<()> {
        if vault.read(&self.path()).await?.is_none() {
            debug!("Role already absent");
            return Ok(());
        }
        info!("Deleting role");
        vault.delete(&self.path()).await
    }
}

/// Every desired attribute must be present live with an equivalent value.
/// Live attributes that were never desired are ignored.
pub fn attributes_match(desired: &Map<String, Value>, live: &Map<String, Value>) -> bool {
    desired.iter().all(|(key, want)| {
        live.get(key)
            .is_some_and(|have| attribute_matches(want, have))
    })
}

/// Compare a desired value with what Vault reads back: durations come back as
/// seconds and comma separated lists as arrays.
pub fn attribute_matches(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::String(want), Value::Number(have)) => match (parse_duration(want), have.as_u64()) {
            (Ok(want), Some(have)) => want.as_secs() == have,
            _ => false,
        },
        (Value::String(want), Value::Array(have)) => {
            let want: Vec<&str> = want
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            want.len() == have.len()
                && want
                    .iter()
                    .zip(have)
                    .all(|(w, h)| h.as_str() == Some(*w))
        }
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len()
                && want
                    .iter()
                    .zip(have)
                    .all(|(w, h)| attribute_matches(w, h))
        }
        _ => desired == live,
    }
}

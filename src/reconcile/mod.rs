// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Declarative reconciliation of a cluster's Vault topology.
//!
//! Every managed resource splits into a read-only `check` that observes live state and
//! an `ensure` that acts on the result of that same `check`, so a dry run and a real
//! run always see the same drift.

pub mod backend;
pub mod init_token;
pub mod manager;
pub mod policy;
pub mod role;
pub mod secrets;
pub mod topology;

pub use backend::{Backend, BackendState, MountDrift};
pub use init_token::{InitToken, InitTokenState};
pub use manager::Reconciler;
pub use policy::{Policy, PolicyRule};
pub use role::Role;
pub use secrets::ServiceAccountKey;
pub use topology::{ClusterTopology, TopologyOptions, Validity};

use std::fmt;

/// Result of comparing one desired resource with what Vault holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drift {
    InSync,
    Missing,
    Changed,
}

impl Drift {
    pub fn is_drift(self) -> bool {
        self != Drift::InSync
    }

    fn action(self) -> Option<ChangeAction> {
        match self {
            Drift::InSync => None,
            Drift::Missing => Some(ChangeAction::Create),
            Drift::Changed => Some(ChangeAction::Update),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Mount,
    RootCa,
    Role,
    ServiceAccountKey,
    Policy,
    TokenRole,
    InitToken,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Mount => "mount",
            ResourceKind::RootCa => "root CA",
            ResourceKind::Role => "role",
            ResourceKind::ServiceAccountKey => "service account key",
            ResourceKind::Policy => "policy",
            ResourceKind::TokenRole => "token role",
            ResourceKind::InitToken => "init token",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    /// Live state cannot be converged without destroying data
    Conflict,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeAction::Create => "create",
            ChangeAction::Update => "update",
            ChangeAction::Conflict => "conflict",
        };
        f.write_str(name)
    }
}

/// One change `ensure` would make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedChange {
    pub kind: ResourceKind,
    pub action: ChangeAction,
    pub id: String,
}

impl PlannedChange {
    pub fn new(kind: ResourceKind, action: ChangeAction, id: impl Into<String>) -> Self {
        Self {
            kind,
            action,
            id: id.into(),
        }
    }

    /// The change implied by a drift, if any.
    pub fn from_drift(kind: ResourceKind, drift: Drift, id: impl Into<String>) -> Option<Self> {
        drift.action().map(|action| Self::new(kind, action, id))
    }
}

impl fmt::Display for PlannedChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.action, self.kind, self.id)
    }
}

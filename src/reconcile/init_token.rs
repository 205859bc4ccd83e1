// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Bootstrap tokens handed to new cluster members.
//!
//! Each init token is an orphan token carrying only a creator policy, which allows it
//! to mint tokens from the matching token role. The current value is kept in the
//! cluster's generic backend. Operators may pin a value; replacing the stored value
//! always revokes the token it replaces first.

use crate::constants::{fields, DEFAULT_POLICY};
use crate::error::{Result, VaultsmithError};
use crate::reconcile::policy::SIGN_CAPABILITIES;
use crate::reconcile::{Drift, PlannedChange, Policy, PolicyRule, ResourceKind, Role};
use crate::vault::api::{TokenCreateRequest, VaultApi};
use crate::vault::duration::format_duration;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

const TOKEN_ROLES_MOUNT: &str = "auth/token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitToken {
    pub cluster_id: String,
    pub role: String,
    /// Policies granted to tokens created through the token role
    pub policies: Vec<String>,
    /// Period of tokens created through the token role
    pub token_period: Duration,
    /// Period of the init token itself
    pub init_token_period: Duration,
    pub secrets_mount: String,
    /// Operator pinned value
    pub expected: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitTokenState {
    pub token_role: Drift,
    pub creator_policy: Drift,
    /// `Changed` when the stored value differs from the pinned one
    pub token: Drift,
}

impl InitTokenState {
    pub fn needs_change(&self) -> bool {
        self.token_role.is_drift() || self.creator_policy.is_drift() || self.token.is_drift()
    }
}

impl InitToken {
    pub fn token_role_name(&self) -> String {
        format!("{}-{}", self.cluster_id, self.role)
    }

    pub fn token_role(&self) -> Role {
        let mut allowed = self.policies.clone();
        allowed.push(DEFAULT_POLICY.to_string());

        let mut attributes = Map::new();
        attributes.insert("period".to_string(), json!(format_duration(self.token_period)));
        attributes.insert("orphan".to_string(), json!(true));
        attributes.insert("allowed_policies".to_string(), json!(allowed.join(",")));
        attributes.insert(
            "path_suffix".to_string(),
            json!(format!("{}/{}", self.cluster_id, self.role)),
        );
        Role::new(TOKEN_ROLES_MOUNT, self.token_role_name(), attributes)
    }

    pub fn creator_policy(&self) -> Policy {
        Policy::new(
            format!("{}/{}-creator", self.cluster_id, self.role),
            vec![PolicyRule::new(
                format!("auth/token/create/{}", self.token_role_name()),
                SIGN_CAPABILITIES,
            )],
        )
    }

    pub fn secret_path(&self) -> String {
        format!("{}/init_token_{}", self.secrets_mount, self.role)
    }

    pub async fn stored_token(&self, vault: &dyn VaultApi) -> Result<Option<String>> {
        let secret = vault.read(&self.secret_path()).await?;
        Ok(secret
            .as_ref()
            .and_then(|s| s.field(fields::INIT_TOKEN))
            .filter(|t| !t.is_empty())
            .map(str::to_string))
    }

    #[instrument(skip(self, vault), fields(init_token = %self.token_role_name()))]
    pub async fn check(&self, vault: &dyn VaultApi) -> Result<InitTokenState> {
        let token_role = self.token_role().check(vault).await?;
        let creator_policy = self.creator_policy().check(vault).await?;
        let token = match (self.stored_token(vault).await?, &self.expected) {
            (None, _) => Drift::Missing,
            (Some(stored), Some(expected)) if stored != *expected => Drift::Changed,
            _ => Drift::InSync,
        };
        Ok(InitTokenState {
            token_role,
            creator_policy,
            token,
        })
    }

    pub fn planned_changes(&self, state: &InitTokenState) -> Vec<PlannedChange> {
        [
            self.token_role()
                .planned_change(ResourceKind::TokenRole, state.token_role),
            self.creator_policy().planned_change(state.creator_policy),
            PlannedChange::from_drift(ResourceKind::InitToken, state.token, self.secret_path()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Converge role, creator policy and stored token. Returns the token now stored.
    #[instrument(skip(self, vault), fields(init_token = %self.token_role_name()))]
    pub async fn ensure(&self, vault: &dyn VaultApi) -> Result<String> {
        self.token_role().ensure(vault).await?;
        self.creator_policy().ensure(vault).await?;

        let current = match self.stored_token(vault).await? {
            Some(token) => token,
            None => {
                let token = self.create_token(vault).await?;
                self.store(vault, &token).await?;
                token
            }
        };

        match &self.expected {
            Some(expected) if *expected != current => {
                PinTransaction {
                    init_token: self,
                    current,
                    expected,
                }
                .commit(vault)
                .await?;
                Ok(expected.clone())
            }
            _ => {
                debug!("Init token is up to date");
                Ok(current)
            }
        }
    }

    async fn create_token(&self, vault: &dyn VaultApi) -> Result<String> {
        let role = self.token_role();
        if vault.read(&role.path()).await?.is_none() {
            return Err(VaultsmithError::TokenRoleNotFound(role.path()));
        }

        let auth = vault
            .create_orphan_token(&TokenCreateRequest {
                policies: vec![self.creator_policy().name],
                display_name: format!("{}/{}", self.cluster_id, self.role),
                renewable: true,
                period: Some(format_duration(self.init_token_period)),
            })
            .await?;
        info!("Created init token");
        Ok(auth.client_token)
    }

    async fn store(&self, vault: &dyn VaultApi, token: &str) -> Result<()> {
        let mut data = Map::new();
        data.insert(fields::INIT_TOKEN.to_string(), Value::String(token.to_string()));
        vault.write(&self.secret_path(), &data).await?;
        Ok(())
    }

    /// Revoke the stored token and remove the role and creator policy.
    #[instrument(skip(self, vault), fields(init_token = %self.token_role_name()))]
    pub async fn delete(&self, vault: &dyn VaultApi) -> Result<()> {
        if let Some(token) = self.stored_token(vault).await? {
            match vault.revoke_orphan(&token).await {
                Ok(()) => info!("Revoked init token"),
                Err(e) if is_dead_token(&e) => debug!("Init token was already invalid"),
                Err(e) => return Err(e),
            }
            vault.delete(&self.secret_path()).await?;
        }
        self.token_role().delete(vault).await?;
        self.creator_policy().delete(vault).await
    }
}

/// Replaces the stored token with a pinned value, revoking the current token first.
struct PinTransaction<'a> {
    init_token: &'a InitToken,
    current: String,
    expected: &'a str,
}

impl PinTransaction<'_> {
    async fn commit(self, vault: &dyn VaultApi) -> Result<()> {
        self.revoke_current(vault).await?;
        self.init_token.store(vault, self.expected).await?;
        info!("Pinned init token to the expected value");
        Ok(())
    }

    /// A token Vault no longer knows is as good as revoked. Anything else aborts the pin.
    async fn revoke_current(&self, vault: &dyn VaultApi) -> Result<()> {
        let Err(revoke_err) = vault.revoke_orphan(&self.current).await else {
            info!("Revoked previous init token");
            return Ok(());
        };

        match vault.lookup_token(&self.current).await {
            Err(lookup_err) if is_dead_token(&lookup_err) => {
                warn!(
                    "Previous init token could not be revoked but is no longer valid: {}",
                    revoke_err
                );
                Ok(())
            }
            _ => Err(VaultsmithError::RevocationFailed {
                role: self.init_token.token_role_name(),
                message: revoke_err.to_string(),
            }),
        }
    }
}

/// Only an explicit invalid-token answer counts; a 403 may just mean missing permissions.
fn is_dead_token(err: &VaultsmithError) -> bool {
    match err {
        VaultsmithError::ApiError { status: 400, .. } => true,
        VaultsmithError::ApiError { message, .. } => {
            let message = message.to_ascii_lowercase();
            message.contains("bad token") || message.contains("invalid token")
        }
        _ => false,
    }
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! ACL policies rendered from (path, capabilities) rules.

use crate::error::Result;
use crate::reconcile::{Drift, PlannedChange, ResourceKind};
use crate::vault::api::VaultApi;
use tracing::{debug, info, instrument};

pub const SIGN_CAPABILITIES: &[&str] = &["create", "read", "update"];
pub const READ_CAPABILITIES: &[&str] = &["read"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub path: String,
    pub capabilities: Vec<String>,
}

impl PolicyRule {
    pub fn new(path: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            path: path.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn render(&self) -> String {
        let capabilities = self
            .capabilities
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "path \"{}\" {{\n  capabilities = [{}]\n}}\n",
            self.path, capabilities
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub name: String,
    pub rules: Vec<PolicyRule>,
}

impl Policy {
    pub fn new(name: impl Into<String>, rules: Vec<PolicyRule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// The policy document in Vault's HCL syntax.
    pub fn render(&self) -> String {
        self.rules
            .iter()
            .map(PolicyRule::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn exists(&self, vault: &dyn VaultApi) -> Result<bool> {
        Ok(vault.get_policy(&self.name).await?.is_some())
    }

    /// Vault has no structured read for policies, so the stored text is compared.
    #[instrument(skip(self, vault), fields(policy = %self.name))]
    pub async fn check(&self, vault: &dyn VaultApi) -> Result<Drift> {
        let drift = match vault.get_policy(&self.name).await? {
            None => Drift::Missing,
            Some(stored) if stored == self.render() => Drift::InSync,
            Some(_) => Drift::Changed,
        };
        Ok(drift)
    }

    pub fn planned_change(&self, drift: Drift) -> Option<PlannedChange> {
        PlannedChange::from_drift(ResourceKind::Policy, drift, &self.name)
    }

    #[instrument(skip(self, vault), fields(policy = %self.name))]
    pub async fn ensure(&self, vault: &dyn VaultApi) -> Result<Drift> {
        let drift = self.check(vault).await?;
        if drift.is_drift() {
            self.write(vault).await?;
        } else {
            debug!("Policy is up to date");
        }
        Ok(drift)
    }

    pub async fn write(&self, vault: &dyn VaultApi) -> Result<()> {
        info!("Writing policy {}", self.name);
        vault.put_policy(&self.name, &self.render()).await
    }

    #[instrument(skip(self, vault), fields(policy = %self.name))]
    pub async fn delete(&self, vault: &dyn VaultApi) -> Result<()> {
        if !self.exists(vault).await? {
            debug!("Policy already absent");
            return Ok(());
        }
        info!("Deleting policy");
        vault.delete_policy(&self.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockVault;

    fn make_policy() -> Policy {
        Policy::new(
            "c1/worker",
            vec![
                PolicyRule::new("c1/pki/k8s/sign/kubelet", SIGN_CAPABILITIES),
                PolicyRule::new("c1/secrets/service-accounts", READ_CAPABILITIES),
            ],
        )
    }

    #[test]
    fn test_render_hcl() {
        let expected = "path \"c1/pki/k8s/sign/kubelet\" {\n  capabilities = [\"create\", \"read\", \"update\"]\n}\n\npath \"c1/secrets/service-accounts\" {\n  capabilities = [\"read\"]\n}\n";
        assert_eq!(make_policy().render(), expected);
    }

    #[tokio::test]
    async fn test_missing_policy_is_written_once() {
        let vault = MockVault::new();
        let policy = make_policy();

        assert!(!policy.exists(&vault).await.unwrap());
        assert_eq!(policy.ensure(&vault).await.unwrap(), Drift::Missing);
        assert!(policy.exists(&vault).await.unwrap());

        vault.clear_calls();
        assert_eq!(policy.ensure(&vault).await.unwrap(), Drift::InSync);
        assert!(vault.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_edited_policy_is_regenerated() {
        let vault = MockVault::new();
        let policy = make_policy();
        policy.ensure(&vault).await.unwrap();

        vault.set_policy("c1/worker", "path \"*\" {\n  capabilities = [\"sudo\"]\n}\n");
        assert_eq!(policy.check(&vault).await.unwrap(), Drift::Changed);

        policy.ensure(&vault).await.unwrap();
        assert_eq!(vault.policy("c1/worker").unwrap(), policy.render());
    }

    #[tokio::test]
    async fn test_delete_policy_is_idempotent() {
        let vault = MockVault::new();
        let policy = make_policy();
        policy.ensure(&vault).await.unwrap();

        policy.delete(&vault).await.unwrap();
        vault.clear_calls();
        policy.delete(&vault).await.unwrap();
        assert!(vault.mutating_calls().is_empty());
    }
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The fixed set of backends, roles, policies and tokens managed for one cluster.

use crate::constants::{init_tokens, mounts, validity, DEFAULT_SERVICE_ACCOUNT_KEY_BITS};
use crate::error::{Result, VaultsmithError};
use crate::pki::{KeySpec, KeyType};
use crate::reconcile::policy::{READ_CAPABILITIES, SIGN_CAPABILITIES};
use crate::reconcile::{Backend, InitToken, Policy, PolicyRule, Role, ServiceAccountKey};
use crate::vault::duration::format_duration;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Maximum validity periods for issued material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    pub ca: Duration,
    pub components: Duration,
    pub admin: Duration,
    pub init_tokens: Duration,
}

impl Default for Validity {
    fn default() -> Self {
        Self {
            ca: Duration::from_secs(validity::CA_SECS),
            components: Duration::from_secs(validity::COMPONENTS_SECS),
            admin: Duration::from_secs(validity::ADMIN_SECS),
            init_tokens: Duration::from_secs(validity::INIT_TOKENS_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopologyOptions {
    pub cluster_id: String,
    pub validity: Validity,
    /// Pinned init token per role (`etcd`, `master`, `worker`, `all`)
    pub init_tokens: BTreeMap<String, String>,
    pub service_account_key_bits: usize,
}

impl TopologyOptions {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            validity: Validity::default(),
            init_tokens: BTreeMap::new(),
            service_account_key_bits: DEFAULT_SERVICE_ACCOUNT_KEY_BITS,
        }
    }

    pub fn with_init_token(mut self, role: &str, token: impl Into<String>) -> Self {
        self.init_tokens.insert(role.to_string(), token.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ClusterTopology {
    pub cluster_id: String,
    pub backends: Vec<Backend>,
    pub roles: Vec<Role>,
    pub service_account_key: ServiceAccountKey,
    pub policies: Vec<Policy>,
    pub init_tokens: Vec<InitToken>,
}

pub fn validate_cluster_id(cluster_id: &str) -> Result<()> {
    if cluster_id.is_empty() {
        return Err(VaultsmithError::Validation(
            "cluster id must not be empty".to_string(),
        ));
    }
    if cluster_id.contains('/') || cluster_id.contains("..") || cluster_id.chars().any(char::is_whitespace) {
        return Err(VaultsmithError::Validation(format!(
            "cluster id '{}' must not contain '/', '..' or whitespace",
            cluster_id
        )));
    }
    Ok(())
}

impl ClusterTopology {
    pub fn new(options: &TopologyOptions) -> Result<Self> {
        let id = options.cluster_id.as_str();
        validate_cluster_id(id)?;

        let known_roles = [
            init_tokens::ETCD,
            init_tokens::MASTER,
            init_tokens::WORKER,
            init_tokens::ALL,
        ];
        if let Some(unknown) = options
            .init_tokens
            .keys()
            .find(|role| !known_roles.contains(&role.as_str()))
        {
            return Err(VaultsmithError::Validation(format!(
                "unknown init token role '{}'",
                unknown
            )));
        }
        if let Some((role, _)) = options.init_tokens.iter().find(|(_, t)| t.trim().is_empty()) {
            return Err(VaultsmithError::Validation(format!(
                "pinned init token for '{}' must not be empty",
                role
            )));
        }

        KeySpec::new(KeyType::Rsa, options.service_account_key_bits)?;

        let validity = options.validity;
        let pki = |name: &str| pki_path(id, name);
        let secrets = format!("{}/{}", id, mounts::SECRETS);

        let backends = vec![
            Backend::pki(pki(mounts::ETCD_K8S), validity.components, validity.ca),
            Backend::pki(pki(mounts::ETCD_OVERLAY), validity.components, validity.ca),
            Backend::pki(pki(mounts::K8S), validity.components, validity.ca),
            Backend::pki(pki(mounts::K8S_API_PROXY), validity.components, validity.ca),
            Backend::generic(secrets.clone()),
        ];

        let service_account_key =
            ServiceAccountKey::new(&secrets, options.service_account_key_bits);
        let roles = build_roles(id, &validity);
        let policies = build_policies(id, &service_account_key.path);

        let init_tokens = [
            (init_tokens::ETCD, vec![format!("{}/etcd", id)]),
            (init_tokens::MASTER, vec![format!("{}/master", id)]),
            (init_tokens::WORKER, vec![format!("{}/worker", id)]),
            (
                init_tokens::ALL,
                vec![
                    format!("{}/etcd", id),
                    format!("{}/master", id),
                    format!("{}/worker", id),
                ],
            ),
        ]
        .into_iter()
        .map(|(role, policies)| InitToken {
            cluster_id: id.to_string(),
            role: role.to_string(),
            policies,
            token_period: validity.components,
            init_token_period: validity.init_tokens,
            secrets_mount: secrets.clone(),
            expected: options.init_tokens.get(role).cloned(),
        })
        .collect();

        Ok(Self {
            cluster_id: id.to_string(),
            backends,
            roles,
            service_account_key,
            policies,
            init_tokens,
        })
    }

    /// Mount path of the generic backend.
    pub fn secrets_mount(&self) -> String {
        format!("{}/{}", self.cluster_id, mounts::SECRETS)
    }

    pub fn pki_mount(&self, name: &str) -> String {
        pki_path(&self.cluster_id, name)
    }
}

fn pki_path(cluster_id: &str, name: &str) -> String {
    format!("{}/pki/{}", cluster_id, name)
}

fn attributes(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Roles that accept any name, for servers and generic clients.
fn open_role(ttl: Duration, server: bool, client: bool) -> Map<String, Value> {
    attributes(json!({
        "ttl": format_duration(ttl),
        "max_ttl": format_duration(ttl),
        "allow_any_name": true,
        "allow_ip_sans": true,
        "allow_localhost": server,
        "enforce_hostnames": false,
        "server_flag": server,
        "client_flag": client,
        "use_csr_common_name": false,
        "use_csr_sans": false,
    }))
}

/// Roles whose certificates identify one Kubernetes component.
fn component_role(
    ttl: Duration,
    domains: &str,
    organization: Option<&str>,
    server: bool,
) -> Map<String, Value> {
    let mut role = attributes(json!({
        "ttl": format_duration(ttl),
        "max_ttl": format_duration(ttl),
        "allowed_domains": domains,
        "allow_bare_domains": true,
        "allow_glob_domains": domains.contains('*'),
        "allow_subdomains": false,
        "allow_any_name": false,
        "allow_ip_sans": server,
        "allow_localhost": false,
        "enforce_hostnames": false,
        "server_flag": server,
        "client_flag": true,
        "use_csr_common_name": false,
        "use_csr_sans": false,
    }));
    if let Some(organization) = organization {
        role.insert("organization".to_string(), json!(organization));
    }
    role
}

fn build_roles(id: &str, validity: &Validity) -> Vec<Role> {
    let components = validity.components;
    let mut roles = Vec::new();

    for etcd in [mounts::ETCD_K8S, mounts::ETCD_OVERLAY] {
        let mount = pki_path(id, etcd);
        roles.push(Role::new(&mount, "client", open_role(components, false, true)));
        roles.push(Role::new(&mount, "server", open_role(components, true, true)));
    }

    let k8s = pki_path(id, mounts::K8S);
    roles.push(Role::new(
        &k8s,
        "admin",
        component_role(validity.admin, "admin", Some("system:masters"), false),
    ));
    roles.push(Role::new(&k8s, "kube-apiserver", open_role(components, true, true)));
    roles.push(Role::new(
        &k8s,
        "kubelet",
        component_role(
            components,
            "kubelet,system:node,system:node:*",
            Some("system:nodes"),
            true,
        ),
    ));
    for component in ["kube-scheduler", "kube-controller-manager", "kube-proxy"] {
        roles.push(Role::new(
            &k8s,
            component,
            component_role(
                components,
                &format!("{},system:{}", component, component),
                None,
                false,
            ),
        ));
    }

    roles.push(Role::new(
        pki_path(id, mounts::K8S_API_PROXY),
        "kube-apiserver",
        open_role(components, false, true),
    ));

    roles
}

fn sign_rule(id: &str, mount: &str, role: &str) -> PolicyRule {
    PolicyRule::new(
        format!("{}/sign/{}", pki_path(id, mount), role),
        SIGN_CAPABILITIES,
    )
}

fn build_policies(id: &str, service_account_key_path: &str) -> Vec<Policy> {
    let etcd = Policy::new(
        format!("{}/etcd", id),
        vec![
            sign_rule(id, mounts::ETCD_K8S, "server"),
            sign_rule(id, mounts::ETCD_OVERLAY, "server"),
        ],
    );

    let master = Policy::new(
        format!("{}/master", id),
        vec![
            sign_rule(id, mounts::K8S, "kube-apiserver"),
            sign_rule(id, mounts::K8S, "kube-scheduler"),
            sign_rule(id, mounts::K8S, "kube-controller-manager"),
            sign_rule(id, mounts::K8S, "kube-proxy"),
            sign_rule(id, mounts::K8S, "kubelet"),
            sign_rule(id, mounts::K8S, "admin"),
            sign_rule(id, mounts::ETCD_K8S, "client"),
            sign_rule(id, mounts::ETCD_OVERLAY, "client"),
            sign_rule(id, mounts::K8S_API_PROXY, "kube-apiserver"),
            PolicyRule::new(service_account_key_path, READ_CAPABILITIES),
        ],
    );

    let worker = Policy::new(
        format!("{}/worker", id),
        vec![
            sign_rule(id, mounts::K8S, "kubelet"),
            sign_rule(id, mounts::K8S, "kube-proxy"),
            sign_rule(id, mounts::ETCD_OVERLAY, "client"),
        ],
    );

    vec![etcd, master, worker]
}

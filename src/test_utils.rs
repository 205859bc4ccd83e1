// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test utilities: an in-memory Vault that records every call.

use crate::error::{Result, VaultsmithError};
use crate::vault::api::{
    MountConfigInput, MountConfigOutput, MountInput, MountOutput, Secret, TokenAuth,
    TokenCreateRequest, TokenInfo, VaultApi,
};
use crate::vault::duration::parse_duration;
use async_trait::async_trait;
use rcgen::{
    BasicConstraints, CertificateParams, CertificateSigningRequestParams, DnType, IsCa, Issuer,
    KeyPair, KeyUsagePurpose,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Role fields Vault reads back as seconds
const DURATION_FIELDS: &[&str] = &["ttl", "max_ttl", "period"];
/// Role fields Vault reads back as arrays
const LIST_FIELDS: &[&str] = &["allowed_domains", "organization", "allowed_policies"];

const MUTATING_OPS: &[&str] = &[
    "mount",
    "unmount",
    "tune_mount",
    "write",
    "delete",
    "put_policy",
    "delete_policy",
    "create_orphan_token",
    "revoke_orphan",
    "renew_token",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub path: String,
}

impl Call {
    pub fn is_mutating(&self) -> bool {
        MUTATING_OPS.contains(&self.op)
    }
}

#[derive(Debug, Clone)]
pub struct MockToken {
    pub display_name: String,
    pub policies: Vec<String>,
    pub renewable: bool,
    pub revoked: bool,
}

struct MockCa {
    cert_pem: String,
    key_pem: String,
}

struct Failure {
    op: &'static str,
    path: String,
    status: u16,
    message: &'static str,
}

#[derive(Default)]
struct State {
    mounts: BTreeMap<String, MountOutput>,
    data: BTreeMap<String, Map<String, Value>>,
    policies: BTreeMap<String, String>,
    tokens: BTreeMap<String, MockToken>,
    cas: BTreeMap<String, MockCa>,
    write_overrides: BTreeMap<String, Map<String, Value>>,
    failures: Vec<Failure>,
    calls: Vec<Call>,
    next_token: u64,
}

impl State {
    /// Record a call and return the injected failure for it, if any.
    fn record(&mut self, op: &'static str, path: &str) -> Result<()> {
        self.calls.push(Call {
            op,
            path: path.to_string(),
        });
        if let Some(failure) = self.failures.iter().find(|f| f.op == op && f.path == path) {
            return Err(api_error(failure.status, path, failure.message));
        }
        Ok(())
    }

    /// Longest mount that contains `path`.
    fn mount_for(&self, path: &str) -> Option<String> {
        self.mounts
            .keys()
            .filter(|m| path == m.as_str() || path.starts_with(&format!("{}/", m)))
            .max_by_key(|m| m.len())
            .cloned()
    }
}

/// In-memory stand-in for a Vault server.
///
/// Role reads are normalised the way Vault does it: durations come back as seconds
/// and comma separated lists as arrays. Generic mounts report their type as `kv`.
pub struct MockVault {
    state: Mutex<State>,
}

impl Default for MockVault {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVault {
    pub fn new() -> Self {
        let mut state = State::default();
        state.mounts.insert(
            "cubbyhole".to_string(),
            MountOutput {
                kind: "cubbyhole".to_string(),
                description: "per-token private secret storage".to_string(),
                config: MountConfigOutput::default(),
            },
        );
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn calls_for(&self, op: &str) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.op == op)
            .cloned()
            .collect()
    }

    pub fn mutating_calls(&self) -> Vec<Call> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.is_mutating())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Tokens passed to `revoke_orphan`, including failed attempts.
    pub fn revocations(&self) -> Vec<String> {
        self.calls_for("revoke_orphan")
            .into_iter()
            .map(|c| c.path)
            .collect()
    }

    /// Make every future `op` on `path` fail with a 500.
    pub fn fail_on(&self, op: &'static str, path: &str) {
        self.fail_with(op, path, 500, "injected failure");
    }

    pub fn fail_with(&self, op: &'static str, path: &str, status: u16, message: &'static str) {
        self.lock().failures.push(Failure {
            op,
            path: path.to_string(),
            status,
            message,
        });
    }

    /// Answer writes to `path` with `data` instead of the normal behaviour.
    pub fn override_write(&self, path: &str, data: Value) {
        if let Value::Object(map) = data {
            self.lock().write_overrides.insert(path.to_string(), map);
        }
    }

    pub fn token(&self, token: &str) -> Option<MockToken> {
        self.lock().tokens.get(token).cloned()
    }

    pub fn is_live(&self, token: &str) -> bool {
        self.token(token).is_some_and(|t| !t.revoked)
    }

    pub fn seed_token(&self, token: &str, policies: &[&str]) {
        self.lock().tokens.insert(
            token.to_string(),
            MockToken {
                display_name: token.to_string(),
                policies: policies.iter().map(|p| p.to_string()).collect(),
                renewable: true,
                revoked: false,
            },
        );
    }

    pub fn stored(&self, path: &str) -> Option<Map<String, Value>> {
        self.lock().data.get(path).cloned()
    }

    /// Overwrite one field of stored data, bypassing normalisation.
    pub fn set_field(&self, path: &str, key: &str, value: Value) {
        self.lock()
            .data
            .entry(path.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub fn remove_data(&self, path: &str) {
        self.lock().data.remove(path);
    }

    pub fn mount_entry(&self, path: &str) -> Option<MountOutput> {
        self.lock().mounts.get(path).cloned()
    }

    pub fn set_mount(&self, path: &str, mount: MountOutput) {
        self.lock().mounts.insert(path.to_string(), mount);
    }

    pub fn policy(&self, name: &str) -> Option<String> {
        self.lock().policies.get(name).cloned()
    }

    pub fn set_policy(&self, name: &str, rules: &str) {
        self.lock()
            .policies
            .insert(name.to_string(), rules.to_string());
    }

    pub fn remove_policy(&self, name: &str) {
        self.lock().policies.remove(name);
    }

    pub fn ca_pem(&self, mount: &str) -> Option<String> {
        self.lock().cas.get(mount).map(|ca| ca.cert_pem.clone())
    }

    /// Create a CA for a mount directly, as if generated out of band.
    pub fn seed_ca(&self, mount: &str) {
        let ca = generate_ca(mount).unwrap();
        self.lock().cas.insert(mount.to_string(), ca);
    }
}

fn api_error(status: u16, path: &str, message: &str) -> VaultsmithError {
    VaultsmithError::ApiError {
        status,
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn normalize(data: &Map<String, Value>) -> Map<String, Value> {
    data.iter()
        .map(|(key, value)| {
            let normalized = match value {
                Value::String(s) if DURATION_FIELDS.contains(&key.as_str()) => parse_duration(s)
                    .map(|d| json!(d.as_secs()))
                    .unwrap_or_else(|_| value.clone()),
                Value::String(s) if LIST_FIELDS.contains(&key.as_str()) => Value::Array(
                    s.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(|p| json!(p))
                        .collect(),
                ),
                _ => value.clone(),
            };
            (key.clone(), normalized)
        })
        .collect()
}

fn ttl_secs(path: &str, value: &str) -> Result<u64> {
    parse_duration(value)
        .map(|d| d.as_secs())
        .map_err(|e| api_error(400, path, &e.to_string()))
}

fn generate_ca(common_name: &str) -> Result<MockCa> {
    let mut params = CertificateParams::default();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let key = KeyPair::generate().map_err(|e| api_error(500, common_name, &e.to_string()))?;
    let cert = params
        .self_signed(&key)
        .map_err(|e| api_error(500, common_name, &e.to_string()))?;

    Ok(MockCa {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

fn sign_csr(ca: &MockCa, path: &str, data: &Map<String, Value>) -> Result<String> {
    let csr_pem = data
        .get("csr")
        .and_then(Value::as_str)
        .ok_or_else(|| api_error(400, path, "missing csr"))?;
    let mut csr = CertificateSigningRequestParams::from_pem(csr_pem)
        .map_err(|e| api_error(400, path, &format!("invalid csr: {}", e)))?;

    if let Some(cn) = data.get("common_name").and_then(Value::as_str) {
        csr.params.distinguished_name.push(DnType::CommonName, cn);
    }

    let ca_key = KeyPair::from_pem(&ca.key_pem).map_err(|e| api_error(500, path, &e.to_string()))?;
    let issuer = Issuer::from_ca_cert_pem(&ca.cert_pem, &ca_key)
        .map_err(|e| api_error(500, path, &e.to_string()))?;
    let cert = csr
        .signed_by(&issuer)
        .map_err(|e| api_error(500, path, &e.to_string()))?;

    Ok(cert.pem())
}

#[async_trait]
impl VaultApi for MockVault {
    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>> {
        let mut state = self.lock();
        state.record("list_mounts", "sys/mounts")?;
        Ok(state
            .mounts
            .iter()
            .map(|(path, mount)| (format!("{}/", path), mount.clone()))
            .collect())
    }

    async fn mount(&self, path: &str, input: &MountInput) -> Result<()> {
        let mut state = self.lock();
        state.record("mount", path)?;
        if state.mounts.contains_key(path) {
            return Err(api_error(
                400,
                path,
                &format!("path is already in use at {}/", path),
            ));
        }

        let kind = match input.kind.as_str() {
            "generic" => "kv".to_string(),
            other => other.to_string(),
        };
        let config = MountConfigOutput {
            default_lease_ttl: ttl_secs(path, &input.config.default_lease_ttl)?,
            max_lease_ttl: ttl_secs(path, &input.config.max_lease_ttl)?,
        };
        state.mounts.insert(
            path.to_string(),
            MountOutput {
                kind,
                description: input.description.clone(),
                config,
            },
        );
        Ok(())
    }

    async fn unmount(&self, path: &str) -> Result<()> {
        let mut state = self.lock();
        state.record("unmount", path)?;
        state.mounts.remove(path);
        state.cas.remove(path);
        let prefix = format!("{}/", path);
        state.data.retain(|k, _| !k.starts_with(&prefix));
        Ok(())
    }

    async fn mount_config(&self, path: &str) -> Result<MountConfigOutput> {
        let mut state = self.lock();
        state.record("mount_config", path)?;
        state
            .mounts
            .get(path)
            .map(|m| m.config)
            .ok_or_else(|| api_error(400, path, "cannot fetch sysview for path"))
    }

    async fn tune_mount(&self, path: &str, config: &MountConfigInput) -> Result<()> {
        let mut state = self.lock();
        state.record("tune_mount", path)?;
        let default_lease_ttl = ttl_secs(path, &config.default_lease_ttl)?;
        let max_lease_ttl = ttl_secs(path, &config.max_lease_ttl)?;
        let mount = state
            .mounts
            .get_mut(path)
            .ok_or_else(|| api_error(400, path, "no mount at path"))?;
        mount.config = MountConfigOutput {
            default_lease_ttl,
            max_lease_ttl,
        };
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>> {
        let mut state = self.lock();
        state.record("read", path)?;

        if let Some(mount) = path.strip_suffix("/cert/ca") {
            if !state.mounts.contains_key(mount) {
                return Ok(None);
            }
            let certificate = state
                .cas
                .get(mount)
                .map(|ca| ca.cert_pem.clone())
                .unwrap_or_default();
            let mut data = Map::new();
            data.insert("certificate".to_string(), json!(certificate));
            return Ok(Some(Secret { data }));
        }

        Ok(state.data.get(path).cloned().map(|data| Secret { data }))
    }

    async fn write(&self, path: &str, data: &Map<String, Value>) -> Result<Option<Secret>> {
        let mut state = self.lock();
        state.record("write", path)?;

        if let Some(data) = state.write_overrides.get(path) {
            return Ok(Some(Secret { data: data.clone() }));
        }

        if path.starts_with("auth/token/roles/") {
            let mut stored = normalize(data);
            stored.entry("renewable").or_insert(json!(true));
            state.data.insert(path.to_string(), stored);
            return Ok(None);
        }

        let mount = state
            .mount_for(path)
            .ok_or_else(|| api_error(404, path, "no handler for route"))?;
        let rest = path[mount.len()..].trim_start_matches('/');

        if rest == "root/generate/internal" {
            let common_name = data
                .get("common_name")
                .and_then(Value::as_str)
                .unwrap_or(mount.as_str())
                .to_string();
            let ca = generate_ca(&common_name)?;
            let mut response = Map::new();
            response.insert("certificate".to_string(), json!(ca.cert_pem));
            response.insert("issuing_ca".to_string(), json!(ca.cert_pem));
            state.cas.insert(mount, ca);
            return Ok(Some(Secret { data: response }));
        }

        if let Some(role) = rest.strip_prefix("sign/") {
            if !state.data.contains_key(&format!("{}/roles/{}", mount, role)) {
                return Err(api_error(400, path, &format!("unknown role: {}", role)));
            }
            let ca = state
                .cas
                .get(&mount)
                .ok_or_else(|| api_error(400, path, "no default issuer currently configured"))?;
            let certificate = sign_csr(ca, path, data)?;
            let mut response = Map::new();
            response.insert("certificate".to_string(), json!(certificate));
            response.insert("issuing_ca".to_string(), json!(ca.cert_pem));
            response.insert("ca_chain".to_string(), json!([ca.cert_pem]));
            response.insert("serial_number".to_string(), json!("4f:2a:00:01"));
            return Ok(Some(Secret { data: response }));
        }

        if rest.starts_with("roles/") {
            let mut stored = normalize(data);
            stored.entry("key_type").or_insert(json!("rsa"));
            stored.entry("no_store").or_insert(json!(false));
            state.data.insert(path.to_string(), stored);
        } else {
            state.data.insert(path.to_string(), data.clone());
        }
        Ok(None)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let mut state = self.lock();
        state.record("delete", path)?;
        state.data.remove(path);
        Ok(())
    }

    async fn get_policy(&self, name: &str) -> Result<Option<String>> {
        let mut state = self.lock();
        state.record("get_policy", name)?;
        Ok(state.policies.get(name).cloned())
    }

    async fn put_policy(&self, name: &str, rules: &str) -> Result<()> {
        let mut state = self.lock();
        state.record("put_policy", name)?;
        state.policies.insert(name.to_string(), rules.to_string());
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        state.record("delete_policy", name)?;
        state.policies.remove(name);
        Ok(())
    }

    async fn create_orphan_token(&self, request: &TokenCreateRequest) -> Result<TokenAuth> {
        let mut state = self.lock();
        state.record("create_orphan_token", &request.display_name)?;
        state.next_token += 1;
        let token = format!("s.mock{:04}", state.next_token);
        let lease_duration = match &request.period {
            Some(period) => ttl_secs("auth/token/create-orphan", period)?,
            None => 2_764_800,
        };

        state.tokens.insert(
            token.clone(),
            MockToken {
                display_name: request.display_name.clone(),
                policies: request.policies.clone(),
                renewable: request.renewable,
                revoked: false,
            },
        );

        Ok(TokenAuth {
            client_token: token,
            accessor: format!("accessor-{}", state.next_token),
            policies: request.policies.clone(),
            lease_duration,
            renewable: request.renewable,
        })
    }

    async fn revoke_orphan(&self, token: &str) -> Result<()> {
        let mut state = self.lock();
        state.record("revoke_orphan", token)?;
        match state.tokens.get_mut(token) {
            Some(t) if !t.revoked => {
                t.revoked = true;
                Ok(())
            }
            _ => Err(api_error(400, "auth/token/revoke-orphan", "invalid token")),
        }
    }

    async fn lookup_token(&self, token: &str) -> Result<TokenInfo> {
        let mut state = self.lock();
        state.record("lookup_token", token)?;
        match state.tokens.get(token) {
            Some(t) if !t.revoked => Ok(TokenInfo {
                display_name: t.display_name.clone(),
                policies: t.policies.clone(),
                renewable: t.renewable,
                ttl: 2_764_800,
            }),
            _ => Err(api_error(403, "auth/token/lookup", "bad token")),
        }
    }

    async fn renew_token(&self, token: &str) -> Result<TokenAuth> {
        let mut state = self.lock();
        state.record("renew_token", token)?;
        match state.tokens.get(token) {
            Some(t) if !t.revoked && t.renewable => Ok(TokenAuth {
                client_token: token.to_string(),
                accessor: String::new(),
                policies: t.policies.clone(),
                lease_duration: 2_764_800,
                renewable: true,
            }),
            Some(t) if !t.revoked => Err(api_error(
                400,
                "auth/token/renew",
                "lease is not renewable",
            )),
            _ => Err(api_error(403, "auth/token/renew", "bad token")),
        }
    }
}

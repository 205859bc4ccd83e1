// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! HTTP implementation of [`VaultApi`] against Vault's `/v1` API.

use crate::config::Config;
use crate::error::{Result, VaultsmithError};
use crate::vault::api::{
    MountConfigInput, MountConfigOutput, MountInput, MountOutput, Secret, TokenAuth,
    TokenCreateRequest, TokenInfo, VaultApi,
};
use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

const TOKEN_HEADER: &str = "X-Vault-Token";

pub struct HttpVaultClient {
    http: reqwest::Client,
    address: Url,
    token: String,
}

impl HttpVaultClient {
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_token(config.vault_addr.clone(), config.vault_token.clone())
    }

    pub fn with_token(address: Url, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("vaultsmith/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            address,
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut base = self.address.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(&format!("v1/{}", path.trim_start_matches('/')))
            .map_err(|e| VaultsmithError::Validation(format!("invalid Vault path '{}': {}", path, e)))
    }

    /// Send a request and return the decoded body. A 404 becomes `Ok(None)` when
    /// `missing_ok` is set, an empty or 204 body is always `Ok(None)`.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        missing_ok: bool,
    ) -> Result<Option<Value>> {
        let url = self.endpoint(path)?;
        debug!("{} {}", method, path);

        let mut request = self.http.request(method, url).header(TOKEN_HEADER, &self.token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::NOT_FOUND && missing_ok {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(VaultsmithError::ApiError {
                status: status.as_u16(),
                path: path.to_string(),
                message: error_message(&text),
            });
        }
        if status == StatusCode::NO_CONTENT || text.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&text)?))
    }

    async fn send_expecting<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        block: &str,
    ) -> Result<T> {
        let value = self
            .send(method, path, body, false)
            .await?
            .and_then(|mut v| v.get_mut(block).map(Value::take))
            .filter(|v| !v.is_null())
            .ok_or_else(|| malformed(path, block))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Join Vault's `errors` array, falling back to the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("errors").and_then(Value::as_array).map(|errors| {
                errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ")
            })
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

fn malformed(path: &str, block: &str) -> VaultsmithError {
    VaultsmithError::ApiError {
        status: 200,
        path: path.to_string(),
        message: format!("response has no '{}' block", block),
    }
}

/// Newer Vault versions wrap responses in `data` and repeat them at the top level.
fn unwrap_data(mut value: Value) -> Value {
    match value.get_mut("data") {
        Some(data) if data.is_object() => data.take(),
        _ => value,
    }
}

#[async_trait]
impl VaultApi for HttpVaultClient {
    async fn list_mounts(&self) -> Result<BTreeMap<String, MountOutput>> {
        let value = self
            .send(Method::GET, "sys/mounts", None, false)
            .await?
            .map(unwrap_data)
            .ok_or_else(|| malformed("sys/mounts", "data"))?;

        let Value::Object(entries) = value else {
            return Err(malformed("sys/mounts", "data"));
        };

        let mut mounts = BTreeMap::new();
        for (path, entry) in entries {
            if entry.get("type").is_some() {
                mounts.insert(path, serde_json::from_value(entry)?);
            }
        }
        Ok(mounts)
    }

    async fn mount(&self, path: &str, input: &MountInput) -> Result<()> {
        let body = serde_json::to_value(input)?;
        self.send(Method::POST, &format!("sys/mounts/{}", path), Some(&body), false)
            .await?;
        Ok(())
    }

    async fn unmount(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("sys/mounts/{}", path), None, true)
            .await?;
        Ok(())
    }

    async fn mount_config(&self, path: &str) -> Result<MountConfigOutput> {
        let tune_path = format!("sys/mounts/{}/tune", path);
        let value = self
            .send(Method::GET, &tune_path, None, false)
            .await?
            .map(unwrap_data)
            .ok_or_else(|| malformed(&tune_path, "data"))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn tune_mount(&self, path: &str, config: &MountConfigInput) -> Result<()> {
        let body = serde_json::to_value(config)?;
        self.send(
            Method::POST,
            &format!("sys/mounts/{}/tune", path),
            Some(&body),
            false,
        )
        .await?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Option<Secret>> {
        match self.send(Method::GET, path, None, true).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, path: &str, data: &Map<String, Value>) -> Result<Option<Secret>> {
        let body = Value::Object(data.clone());
        match self.send(Method::POST, path, Some(&body), false).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None, true).await?;
        Ok(())
    }

    async fn get_policy(&self, name: &str) -> Result<Option<String>> {
        let Some(value) = self
            .send(Method::GET, &format!("sys/policy/{}", name), None, true)
            .await?
        else {
            return Ok(None);
        };

        Ok(unwrap_data(value)
            .get("rules")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn put_policy(&self, name: &str, rules: &str) -> Result<()> {
        let body = json!({ "policy": rules });
        self.send(Method::PUT, &format!("sys/policy/{}", name), Some(&body), false)
            .await?;
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<()> {
        self.send(Method::DELETE, &format!("sys/policy/{}", name), None, true)
            .await?;
        Ok(())
    }

    async fn create_orphan_token(&self, request: &TokenCreateRequest) -> Result<TokenAuth> {
        let body = serde_json::to_value(request)?;
        self.send_expecting(Method::POST, "auth/token/create-orphan", Some(&body), "auth")
            .await
    }

    async fn revoke_orphan(&self, token: &str) -> Result<()> {
        let body = json!({ "token": token });
        self.send(Method::POST, "auth/token/revoke-orphan", Some(&body), false)
            .await?;
        Ok(())
    }

    async fn lookup_token(&self, token: &str) -> Result<TokenInfo> {
        let body = json!({ "token": token });
        self.send_expecting(Method::POST, "auth/token/lookup", Some(&body), "data")
            .await
    }

    async fn renew_token(&self, token: &str) -> Result<TokenAuth> {
        let body = json!({ "token": token });
        self.send_expecting(Method::POST, "auth/token/renew", Some(&body), "auth")
            .await
    }
}

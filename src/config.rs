// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use std::env;
use url::Url;

use crate::constants::DEFAULT_VAULT_ADDR;

/// Vault connection settings loaded from environment variables
#[derive(Clone)]
pub struct Config {
    pub vault_addr: Url,
    pub vault_token: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let addr = env::var("VAULT_ADDR").unwrap_or_else(|_| DEFAULT_VAULT_ADDR.to_string());
        let token = env::var("VAULT_TOKEN").context("VAULT_TOKEN environment variable not set")?;
        Self::new(&addr, token)
    }

    pub fn new(addr: &str, vault_token: String) -> Result<Self> {
        let vault_addr =
            Url::parse(addr).with_context(|| format!("VAULT_ADDR '{}' is not a valid URL", addr))?;
        anyhow::ensure!(!vault_token.trim().is_empty(), "Vault token must not be empty");

        Ok(Config {
            vault_addr,
            vault_token,
        })
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("vault_addr", &self.vault_addr.as_str())
            .field("vault_token", &"[REDACTED]")
            .finish()
    }
}

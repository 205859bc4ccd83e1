// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::config::Config;
use crate::vault::{renew_token, VaultApi};
use anyhow::Context;

pub async fn run_renew_token(vault: &dyn VaultApi, config: &Config) -> anyhow::Result<()> {
    renew_token(vault, &config.vault_token)
        .await
        .context("Failed to renew Vault token")?;
    Ok(())
}

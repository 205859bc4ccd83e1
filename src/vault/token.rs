// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Token renewal for long-running cluster members.

use crate::error::{Result, VaultsmithError};
use crate::vault::api::{TokenAuth, VaultApi};
use tracing::{info, instrument};

/// Renew a token after checking that Vault considers it renewable.
#[instrument(skip(vault, token))]
pub async fn renew_token(vault: &dyn VaultApi, token: &str) -> Result<TokenAuth> {
    let info = vault.lookup_token(token).await?;

    if !info.renewable {
        let name = if info.display_name.is_empty() {
            "token".to_string()
        } else {
            info.display_name
        };
        return Err(VaultsmithError::TokenNotRenewable(name));
    }

    let auth = vault.renew_token(token).await?;
    info!("Renewed token, new lease {}s", auth.lease_duration);
    Ok(auth)
}

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::pki::emit;
use crate::vault::{Secret, VaultApi};
use anyhow::{anyhow, Context};
use clap::Args;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Path of the secret, e.g. c1/secrets/service-accounts
    pub path: String,

    /// Print only this field
    #[arg(long)]
    pub field: Option<String>,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Render a whole secret as JSON, or a single field verbatim.
pub fn render_secret(secret: &Secret, field: Option<&str>) -> anyhow::Result<String> {
    let Some(field) = field else {
        let mut json = serde_json::to_string_pretty(&secret.data)?;
        json.push('\n');
        return Ok(json);
    };

    match secret.data.get(field) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(value) => Ok(format!("{}\n", value)),
        None => Err(anyhow!("Field '{}' not found", field)),
    }
}

pub async fn run_read(vault: &dyn VaultApi, args: &ReadArgs) -> anyhow::Result<()> {
    let secret = vault
        .read(&args.path)
        .await?
        .with_context(|| format!("No secret at '{}'", args.path))?;
    let document = render_secret(&secret, args.field.as_deref())
        .with_context(|| format!("Failed to read '{}'", args.path))?;
    emit(&document, args.output.as_deref())?;
    Ok(())
}

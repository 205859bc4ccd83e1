// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Go-style duration strings as accepted and returned by Vault.

use crate::error::{Result, VaultsmithError};
use std::time::Duration;

/// Parse a duration such as `720h`, `1h30m`, `45s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(VaultsmithError::Validation(
            "duration cannot be empty".to_string(),
        ));
    }

    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut number = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }

        let multiplier = match c {
            'h' => 3600,
            'm' => 60,
            's' => 1,
            _ => {
                return Err(VaultsmithError::Validation(format!(
                    "invalid unit '{}' in duration '{}'",
                    c, input
                )))
            }
        };
        let value: u64 = number.parse().map_err(|_| {
            VaultsmithError::Validation(format!("missing value before '{}' in '{}'", c, input))
        })?;
        total = value
            .checked_mul(multiplier)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| VaultsmithError::Validation(format!("duration '{}' overflows", input)))?;
        number.clear();
    }

    if !number.is_empty() {
        return Err(VaultsmithError::Validation(format!(
            "duration '{}' is missing a unit",
            input
        )));
    }

    Ok(Duration::from_secs(total))
}

/// Render a duration the way it is sent to Vault.
pub fn format_duration(duration: Duration) -> String {
    format!("{}s", duration.as_secs())
}

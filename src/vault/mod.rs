// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Vault API access: the client contract, its HTTP implementation and token helpers.

pub mod api;
pub mod client;
pub mod duration;
pub mod token;

pub use api::{find_mount, Secret, VaultApi};
pub use client::HttpVaultClient;
pub use duration::{format_duration, parse_duration};
pub use token::renew_token;

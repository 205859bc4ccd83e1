// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Mount names below `<cluster>/pki/` and `<cluster>/`
pub mod mounts {
    pub const ETCD_K8S: &str = "etcd-k8s";
    pub const ETCD_OVERLAY: &str = "etcd-overlay";
    pub const K8S: &str = "k8s";
    pub const K8S_API_PROXY: &str = "k8s-api-proxy";
    pub const SECRETS: &str = "secrets";
}

/// Default validity periods, in seconds
pub mod validity {
    /// 20 years
    pub const CA_SECS: u64 = 175_320 * 3600;
    /// 30 days
    pub const COMPONENTS_SECS: u64 = 720 * 3600;
    /// 1 year
    pub const ADMIN_SECS: u64 = 8_760 * 3600;
    /// 5 years
    pub const INIT_TOKENS_SECS: u64 = 43_800 * 3600;
}

/// Field names used for values stored in the generic backend
pub mod fields {
    pub const INIT_TOKEN: &str = "init_token";
    pub const SERVICE_ACCOUNT_KEY: &str = "key";
}

/// Unix modes for materialized certificate files
pub mod modes {
    pub const DIRECTORY: u32 = 0o755;
    pub const PRIVATE_KEY: u32 = 0o600;
    pub const CERTIFICATE: u32 = 0o644;
}

/// Init token roles managed per cluster
pub mod init_tokens {
    pub const ETCD: &str = "etcd";
    pub const MASTER: &str = "master";
    pub const WORKER: &str = "worker";
    pub const ALL: &str = "all";
}

/// Policy attached to every token alongside its role policies
pub const DEFAULT_POLICY: &str = "default";

pub const DEFAULT_VAULT_ADDR: &str = "http://127.0.0.1:8200";

pub const DEFAULT_SERVICE_ACCOUNT_KEY_BITS: usize = 4096;

// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local certificate material: keys, signed certificates and kubeconfig documents.

pub mod cert;
pub mod key;
pub mod kubeconfig;
pub mod ownership;

pub use cert::{Cert, CertificateSummary};
pub use key::{KeySpec, KeyState, KeyType};
pub use kubeconfig::{build_kubeconfig, emit, render};
pub use ownership::Ownership;

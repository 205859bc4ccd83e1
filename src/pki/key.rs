// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Private key generation and inspection.

use crate::error::{Result, VaultsmithError};
use rcgen::{KeyPair, PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::RsaPrivateKey;
use std::fmt;
use std::str::FromStr;

const RSA_MIN_BITS: usize = 2048;
const RSA_MAX_BITS: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ecdsa,
}

impl FromStr for KeyType {
    type Err = VaultsmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyType::Rsa),
            "ecdsa" | "ec" => Ok(KeyType::Ecdsa),
            other => Err(VaultsmithError::Validation(format!(
                "unsupported key type '{}', expected 'rsa' or 'ecdsa'",
                other
            ))),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Rsa => f.write_str("rsa"),
            KeyType::Ecdsa => f.write_str("ecdsa"),
        }
    }
}

/// Desired key type and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub key_type: KeyType,
    pub bits: usize,
}

impl Default for KeySpec {
    fn default() -> Self {
        Self {
            key_type: KeyType::Rsa,
            bits: RSA_MIN_BITS,
        }
    }
}

impl KeySpec {
    pub fn new(key_type: KeyType, bits: usize) -> Result<Self> {
        let spec = Self { key_type, bits };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        let valid = match self.key_type {
            KeyType::Rsa => (RSA_MIN_BITS..=RSA_MAX_BITS).contains(&self.bits) && self.bits % 8 == 0,
            KeyType::Ecdsa => self.bits == 256 || self.bits == 384,
        };
        if valid {
            Ok(())
        } else {
            Err(VaultsmithError::Validation(format!(
                "invalid {} key size {}",
                self.key_type, self.bits
            )))
        }
    }

    /// Generate a PKCS#8 PEM encoded key.
    pub fn generate(&self) -> Result<String> {
        self.validate()?;
        match self.key_type {
            KeyType::Rsa => generate_rsa_pem(self.bits),
            KeyType::Ecdsa => generate_ecdsa_pem(self.bits),
        }
    }
}

/// What is on disk compared to the desired key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Missing,
    WrongType(KeyType),
    WrongSize(usize),
    /// Present but not a key we can read
    Invalid,
    Ok,
}

impl KeyState {
    pub fn needs_regeneration(self) -> bool {
        self != KeyState::Ok
    }
}

pub fn inspect_key(pem: Option<&str>, spec: &KeySpec) -> KeyState {
    let Some(pem) = pem else {
        return KeyState::Missing;
    };
    match detect_key(pem) {
        None => KeyState::Invalid,
        Some((key_type, _)) if key_type != spec.key_type => KeyState::WrongType(key_type),
        Some((_, bits)) if bits != spec.bits => KeyState::WrongSize(bits),
        Some(_) => KeyState::Ok,
    }
}

/// Type and size of a PEM encoded private key.
pub fn detect_key(pem: &str) -> Option<(KeyType, usize)> {
    if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
        return Some((KeyType::Rsa, key.size() * 8));
    }
    if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
        return Some((KeyType::Rsa, key.size() * 8));
    }

    let key_pair = KeyPair::from_pem(pem).ok()?;
    let algorithm = key_pair.algorithm();
    if algorithm == &PKCS_ECDSA_P256_SHA256 {
        Some((KeyType::Ecdsa, 256))
    } else if algorithm == &PKCS_ECDSA_P384_SHA384 {
        Some((KeyType::Ecdsa, 384))
    } else {
        None
    }
}

pub fn generate_rsa_pem(bits: usize) -> Result<String> {
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| VaultsmithError::KeyGeneration(format!("rsa {}: {}", bits, e)))?;
    let pem = key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| VaultsmithError::KeyGeneration(format!("encoding rsa key: {}", e)))?;
    Ok(pem.to_string())
}

pub fn generate_ecdsa_pem(bits: usize) -> Result<String> {
    let algorithm = match bits {
        256 => &PKCS_ECDSA_P256_SHA256,
        384 => &PKCS_ECDSA_P384_SHA384,
        other => {
            return Err(VaultsmithError::KeyGeneration(format!(
                "unsupported ecdsa curve size {}",
                other
            )))
        }
    };
    let key_pair = KeyPair::generate_for(algorithm)
        .map_err(|e| VaultsmithError::KeyGeneration(format!("ecdsa {}: {}", bits, e)))?;
    Ok(key_pair.serialize_pem())
}

/// Load a key for signing requests. PKCS#1 RSA keys are converted to PKCS#8 first.
pub fn load_key_pair(pem: &str) -> Result<KeyPair> {
    let converted;
    let pem = match RsaPrivateKey::from_pkcs1_pem(pem) {
        Ok(key) => {
            converted = key
                .to_pkcs8_pem(LineEnding::LF)
                .map_err(|e| VaultsmithError::MaterialIntegrity(format!("converting key: {}", e)))?;
            converted.as_str()
        }
        Err(_) => pem,
    };
    KeyPair::from_pem(pem)
        .map_err(|e| VaultsmithError::MaterialIntegrity(format!("unreadable private key: {}", e)))
}

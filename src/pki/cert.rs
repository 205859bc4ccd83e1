// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local key ownership and certificate issuance through a Vault signing role.
//!
//! For a destination `D` the issuer manages `D-key.pem`, `D.pem` and `D-ca.pem` in
//! the parent directory of `D`. The private key never leaves the host: a CSR is sent
//! to Vault and the signed result is verified against the key before any certificate
//! file is replaced.

use crate::constants::modes;
use crate::error::{Result, VaultsmithError};
use crate::pki::key::{inspect_key, load_key_pair, KeySpec, KeyState};
use crate::pki::ownership::{ensure_directory, set_mode, Ownership};
use crate::vault::api::{Secret, VaultApi};
use rcgen::{string::Ia5String, CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use serde_json::{json, Map, Value};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::{parse_x509_pem, Pem};
use x509_parser::prelude::X509Certificate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cert {
    /// Signing path, e.g. `c1/pki/k8s/sign/kubelet`
    pub role: String,
    pub common_name: String,
    pub ip_sans: Vec<IpAddr>,
    pub san_hosts: Vec<String>,
    pub key: KeySpec,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub destination: PathBuf,
}

impl Cert {
    pub fn new(
        role: impl Into<String>,
        common_name: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            role: role.into(),
            common_name: common_name.into(),
            ip_sans: Vec::new(),
            san_hosts: Vec::new(),
            key: KeySpec::default(),
            owner: None,
            group: None,
            destination: destination.into(),
        }
    }

    pub fn key_path(&self) -> PathBuf {
        with_suffix(&self.destination, "-key.pem")
    }

    pub fn cert_path(&self) -> PathBuf {
        with_suffix(&self.destination, ".pem")
    }

    pub fn ca_path(&self) -> PathBuf {
        with_suffix(&self.destination, "-ca.pem")
    }

    pub fn directory(&self) -> PathBuf {
        self.destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn validate(&self) -> Result<()> {
        if self.role.trim_matches('/').is_empty() {
            return Err(VaultsmithError::Validation("signing role is required".to_string()));
        }
        if self.common_name.trim().is_empty() {
            return Err(VaultsmithError::Validation("common name is required".to_string()));
        }
        if self.destination.file_name().is_none() {
            return Err(VaultsmithError::Validation(format!(
                "destination '{}' must name a file prefix",
                self.destination.display()
            )));
        }
        self.key.validate()
    }

    fn ownership(&self) -> Result<Ownership> {
        Ownership::resolve(self.owner.as_deref(), self.group.as_deref())
    }

    /// Make sure a key of the configured type and size exists. Returns what was found.
    #[instrument(skip(self), fields(destination = %self.destination.display()))]
    pub fn ensure_key(&self) -> Result<KeyState> {
        self.validate()?;
        let ownership = self.ownership()?;
        let directory = self.directory();
        ensure_directory(&directory, modes::DIRECTORY)?;

        let key_path = self.key_path();
        let existing = match fs::read_to_string(&key_path) {
            Ok(pem) => Some(pem),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(VaultsmithError::filesystem(&key_path, e)),
        };

        let state = inspect_key(existing.as_deref(), &self.key);
        match state {
            KeyState::Ok => debug!("Private key is up to date"),
            KeyState::Missing => {
                info!("Generating {} {} bit private key", self.key.key_type, self.key.bits);
                write_private_key(&key_path, &self.key.generate()?)?;
            }
            other => {
                info!(
                    "Replacing private key ({:?}) with {} {} bit key",
                    other, self.key.key_type, self.key.bits
                );
                let pem = self.key.generate()?;
                fs::remove_file(&key_path).map_err(|e| VaultsmithError::filesystem(&key_path, e))?;
                write_private_key(&key_path, &pem)?;
            }
        }

        set_mode(&key_path, modes::PRIVATE_KEY)?;
        ownership.apply(&directory)?;
        ownership.apply(&key_path)?;
        Ok(state)
    }

    /// Have Vault sign a CSR for the local key and write the certificate files.
    #[instrument(skip(self, vault), fields(role = %self.role, common_name = %self.common_name))]
    pub async fn request_certificate(&self, vault: &dyn VaultApi) -> Result<CertificateSummary> {
        self.validate()?;
        let ownership = self.ownership()?;

        let key_path = self.key_path();
        let key_pem =
            fs::read_to_string(&key_path).map_err(|e| VaultsmithError::filesystem(&key_path, e))?;
        let key_pair = load_key_pair(&key_pem)?;
        let csr = self.build_csr(&key_pair)?;

        let response = vault
            .write(&self.role, &self.sign_request(csr))
            .await?
            .ok_or_else(|| {
                VaultsmithError::MaterialIntegrity(format!("empty response from {}", self.role))
            })?;
        let material = SignedMaterial::from_response(&response)?;
        let summary = material.verify(&key_pair)?;

        let cert_path = self.cert_path();
        let ca_path = self.ca_path();
        let staged_cert = stage(&cert_path, &material.certificate)?;
        let staged_ca = match stage(&ca_path, &material.ca) {
            Ok(staged) => staged,
            Err(e) => {
                let _ = fs::remove_file(&staged_cert);
                return Err(e);
            }
        };
        commit_staged(&[(staged_cert, cert_path.clone()), (staged_ca, ca_path)])?;

        ownership.apply_recursive(&self.directory())?;
        info!(
            "Wrote certificate for '{}' to {}",
            summary.common_name,
            cert_path.display()
        );
        Ok(summary)
    }

    /// Ensure the key, then request a certificate for it.
    pub async fn issue(&self, vault: &dyn VaultApi) -> Result<CertificateSummary> {
        self.ensure_key()?;
        self.request_certificate(vault).await
    }

    fn build_csr(&self, key_pair: &KeyPair) -> Result<String> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, self.common_name.as_str());
        params.distinguished_name = dn;

        for host in &self.san_hosts {
            let name = Ia5String::try_from(host.clone()).map_err(|e| {
                VaultsmithError::Validation(format!("invalid host name '{}': {}", host, e))
            })?;
            params.subject_alt_names.push(SanType::DnsName(name));
        }
        params
            .subject_alt_names
            .extend(self.ip_sans.iter().copied().map(SanType::IpAddress));

        let csr = params.serialize_request(key_pair).map_err(|e| {
            VaultsmithError::MaterialIntegrity(format!("failed to create CSR: {}", e))
        })?;
        csr.pem().map_err(|e| {
            VaultsmithError::MaterialIntegrity(format!("failed to serialize CSR: {}", e))
        })
    }

    fn sign_request(&self, csr: String) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("csr".to_string(), Value::String(csr));
        data.insert("common_name".to_string(), json!(self.common_name));
        if !self.ip_sans.is_empty() {
            let ips: Vec<String> = self.ip_sans.iter().map(IpAddr::to_string).collect();
            data.insert("ip_sans".to_string(), json!(ips.join(",")));
        }
        if !self.san_hosts.is_empty() {
            data.insert("alt_names".to_string(), json!(self.san_hosts.join(",")));
        }
        data.insert("format".to_string(), json!("pem"));
        data
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn write_private_key(path: &Path, pem: &str) -> Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(modes::PRIVATE_KEY)
        .open(path)
        .map_err(|e| VaultsmithError::filesystem(path, e))?;
    file.write_all(pem.as_bytes())
        .map_err(|e| VaultsmithError::filesystem(path, e))
}

/// Write next to the target so the final rename stays on one filesystem.
fn stage(path: &Path, contents: &str) -> Result<PathBuf> {
    let staged = with_suffix(path, ".tmp");
    fs::write(&staged, contents).map_err(|e| VaultsmithError::filesystem(&staged, e))?;
    set_mode(&staged, modes::CERTIFICATE)?;
    Ok(staged)
}

/// Rename staged files into place in order. On failure the staged files not yet
/// moved are removed; files already renamed stay.
fn commit_staged(files: &[(PathBuf, PathBuf)]) -> Result<()> {
    for (i, (staged, target)) in files.iter().enumerate() {
        if let Err(e) = fs::rename(staged, target) {
            for (pending, _) in &files[i..] {
                let _ = fs::remove_file(pending);
            }
            return Err(VaultsmithError::filesystem(target, e));
        }
    }
    Ok(())
}

/// Leaf certificate and CA bundle from a signing response
struct SignedMaterial {
    certificate: String,
    ca: String,
}

impl SignedMaterial {
    fn from_response(response: &Secret) -> Result<Self> {
        let certificate = response
            .field("certificate")
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                VaultsmithError::MaterialIntegrity("signing response has no certificate".to_string())
            })?;

        let chain: Vec<&str> = response
            .data
            .get("ca_chain")
            .and_then(Value::as_array)
            .map(|chain| chain.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let ca = if chain.is_empty() {
            response
                .field("issuing_ca")
                .filter(|c| !c.trim().is_empty())
                .ok_or_else(|| {
                    VaultsmithError::MaterialIntegrity(
                        "signing response has no issuing CA".to_string(),
                    )
                })?
                .to_string()
        } else {
            chain.join("\n")
        };

        Ok(Self {
            certificate: ensure_trailing_newline(certificate),
            ca: ensure_trailing_newline(&ca),
        })
    }

    /// Parse everything and check that the leaf was issued for our key.
    fn verify(&self, key_pair: &KeyPair) -> Result<CertificateSummary> {
        let (_, pem) = parse_x509_pem(self.certificate.as_bytes()).map_err(|e| {
            VaultsmithError::MaterialIntegrity(format!("certificate is not PEM: {}", e))
        })?;
        let leaf = pem.parse_x509().map_err(|e| {
            VaultsmithError::MaterialIntegrity(format!("certificate does not parse: {}", e))
        })?;

        if &*leaf.public_key().subject_public_key.data != key_pair.public_key_raw() {
            return Err(VaultsmithError::MaterialIntegrity(
                "certificate was not issued for the local private key".to_string(),
            ));
        }

        let mut ca_count = 0;
        for pem in Pem::iter_from_buffer(self.ca.as_bytes()) {
            let pem = pem.map_err(|e| {
                VaultsmithError::MaterialIntegrity(format!("CA bundle is not PEM: {}", e))
            })?;
            pem.parse_x509().map_err(|e| {
                VaultsmithError::MaterialIntegrity(format!("CA certificate does not parse: {}", e))
            })?;
            ca_count += 1;
        }
        if ca_count == 0 {
            return Err(VaultsmithError::MaterialIntegrity(
                "CA bundle is empty".to_string(),
            ));
        }

        CertificateSummary::from_certificate(&leaf)
    }
}

fn ensure_trailing_newline(pem: &str) -> String {
    let mut pem = pem.trim_end().to_string();
    pem.push('\n');
    pem
}

/// Identity carried by an issued certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub common_name: String,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
    /// Expiry as a unix timestamp
    pub not_after: i64,
}

impl CertificateSummary {
    pub fn from_pem(pem: &str) -> Result<Self> {
        let (_, pem) = parse_x509_pem(pem.as_bytes()).map_err(|e| {
            VaultsmithError::MaterialIntegrity(format!("certificate is not PEM: {}", e))
        })?;
        let cert = pem.parse_x509().map_err(|e| {
            VaultsmithError::MaterialIntegrity(format!("certificate does not parse: {}", e))
        })?;
        Self::from_certificate(&cert)
    }

    fn from_certificate(cert: &X509Certificate<'_>) -> Result<Self> {
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        let san = cert.subject_alternative_name().map_err(|e| {
            VaultsmithError::MaterialIntegrity(format!("invalid SAN extension: {}", e))
        })?;
        if let Some(san) = san {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            common_name,
            dns_names,
            ip_addresses,
            not_after: cert.validity().not_after.timestamp(),
        })
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

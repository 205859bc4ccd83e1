// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultsmithError {
    #[error("Vault request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Vault returned {status} for '{path}': {message}")]
    ApiError {
        status: u16,
        path: String,
        message: String,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("Token is not renewable: {0}")]
    TokenNotRenewable(String),

    #[error("Token role not found: {0}")]
    TokenRoleNotFound(String),

    #[error("Failed to revoke previous init token for '{role}': {message}")]
    RevocationFailed { role: String, message: String },

    #[error("Certificate material invalid: {0}")]
    MaterialIntegrity(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build kubeconfig: {0}")]
    KubeconfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("{0}")]
    Multiple(ErrorList),
}

impl VaultsmithError {
    pub fn filesystem(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// HTTP status of a Vault API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiError { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, VaultsmithError>;

/// Collects errors from independent resources so one failure does not hide the rest.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<VaultsmithError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: VaultsmithError) {
        self.errors.push(error);
    }

    /// Record the error of a failed result. Returns true when the result was Ok.
    pub fn collect<T>(&mut self, result: Result<T>) -> bool {
        match result {
            Ok(_) => true,
            Err(e) => {
                self.push(e);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[VaultsmithError] {
        &self.errors
    }

    /// A single error is returned unwrapped so callers can still match on its kind.
    pub fn into_result(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(VaultsmithError::Multiple(self)),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n\t* {}", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_empty_is_ok() {
        assert!(ErrorList::new().into_result().is_ok());
    }

    #[test]
    fn test_error_list_single_error_is_unwrapped() {
        let mut errors = ErrorList::new();
        errors.push(VaultsmithError::Conflict("mount c1/secrets".to_string()));

        let err = errors.into_result().unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_error_list_multiple_errors_keep_all_messages() {
        let mut errors = ErrorList::new();
        assert!(!errors.collect::<()>(Err(VaultsmithError::Conflict("a".to_string()))));
        assert!(errors.collect(Ok(())));
        errors.push(VaultsmithError::Validation("b".to_string()));

        let err = errors.into_result().unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("2 errors occurred:"));
        assert!(message.contains("Conflict: a"));
        assert!(message.contains("Invalid configuration: b"));
    }

    #[test]
    fn test_filesystem_error_names_path() {
        let err = VaultsmithError::filesystem(
            "/etc/vaultsmith/kubelet-key.pem",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("/etc/vaultsmith/kubelet-key.pem"));
    }

    #[test]
    fn test_status_only_for_api_errors() {
        let err = VaultsmithError::ApiError {
            status: 403,
            path: "sys/mounts".to_string(),
            message: "permission denied".to_string(),
        };
        assert_eq!(err.status(), Some(403));
        assert_eq!(VaultsmithError::Conflict("x".to_string()).status(), None);
    }
}

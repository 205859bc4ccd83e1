// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Result, VaultsmithError};
use nix::unistd::{chown, Gid, Group, Uid, User};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tracing::debug;

/// Owner and group applied to materialized files. Unset parts are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: Option<Uid>,
    pub gid: Option<Gid>,
}

impl Ownership {
    /// Resolve numeric ids or names through the system user and group databases.
    pub fn resolve(owner: Option<&str>, group: Option<&str>) -> Result<Self> {
        let uid = owner.map(resolve_user).transpose()?;
        let gid = group.map(resolve_group).transpose()?;
        Ok(Self { uid, gid })
    }

    pub fn is_empty(&self) -> bool {
        self.uid.is_none() && self.gid.is_none()
    }

    pub fn apply(&self, path: &Path) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        chown(path, self.uid, self.gid)
            .map_err(|errno| VaultsmithError::filesystem(path, errno.into()))
    }

    /// Apply to a directory and everything below it.
    pub fn apply_recursive(&self, path: &Path) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        self.apply(path)?;
        if path.is_dir() {
            let entries = fs::read_dir(path).map_err(|e| VaultsmithError::filesystem(path, e))?;
            for entry in entries {
                let entry = entry.map_err(|e| VaultsmithError::filesystem(path, e))?;
                self.apply_recursive(&entry.path())?;
            }
        }
        debug!("Applied ownership to {}", path.display());
        Ok(())
    }
}

fn resolve_user(owner: &str) -> Result<Uid> {
    if let Ok(id) = owner.parse::<u32>() {
        return Ok(Uid::from_raw(id));
    }
    match User::from_name(owner) {
        Ok(Some(user)) => Ok(user.uid),
        Ok(None) => Err(VaultsmithError::Validation(format!("unknown user '{}'", owner))),
        Err(e) => Err(VaultsmithError::Validation(format!(
            "looking up user '{}': {}",
            owner, e
        ))),
    }
}

fn resolve_group(group: &str) -> Result<Gid> {
    if let Ok(id) = group.parse::<u32>() {
        return Ok(Gid::from_raw(id));
    }
    match Group::from_name(group) {
        Ok(Some(group)) => Ok(group.gid),
        Ok(None) => Err(VaultsmithError::Validation(format!("unknown group '{}'", group))),
        Err(e) => Err(VaultsmithError::Validation(format!(
            "looking up group '{}': {}",
            group, e
        ))),
    }
}

/// Set the permission bits of a path.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .map_err(|e| VaultsmithError::filesystem(path, e))
}

/// Create a directory with the given mode, or correct the mode of an existing one.
pub fn ensure_directory(path: &Path, mode: u32) -> Result<()> {
    if !path.exists() {
        debug!("Creating directory {}", path.display());
        fs::create_dir_all(path).map_err(|e| VaultsmithError::filesystem(path, e))?;
    }
    let current = fs::metadata(path)
        .map_err(|e| VaultsmithError::filesystem(path, e))?
        .permissions()
        .mode()
        & 0o7777;
    if current != mode {
        debug!("Setting mode {:o} on {}", mode, path.display());
        set_mode(path, mode)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{getgid, getuid};

    #[test]
    fn test_numeric_ids_need_no_lookup() {
        let ownership = Ownership::resolve(Some("1234"), Some("5678")).unwrap();
        assert_eq!(ownership.uid, Some(Uid::from_raw(1234)));
        assert_eq!(ownership.gid, Some(Gid::from_raw(5678)));
    }

    #[test]
    fn test_root_names_resolve() {
        let ownership = Ownership::resolve(Some("root"), None).unwrap();
        assert_eq!(ownership.uid, Some(Uid::from_raw(0)));
        assert_eq!(ownership.gid, None);
    }

    #[test]
    fn test_unknown_user_is_a_validation_error() {
        let err = Ownership::resolve(Some("no-such-user-vaultsmith"), None).unwrap_err();
        assert!(matches!(err, VaultsmithError::Validation(_)));
    }

    #[test]
    fn test_apply_current_owner_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/file.pem"), "x").unwrap();

        let ownership = Ownership {
            uid: Some(getuid()),
            gid: Some(getgid()),
        };
        ownership.apply_recursive(dir.path()).unwrap();
    }

    #[test]
    fn test_ensure_directory_creates_and_corrects_mode() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b");

        ensure_directory(&target, 0o755).unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o755);

        set_mode(&target, 0o700).unwrap();
        ensure_directory(&target, 0o755).unwrap();
        let mode = fs::metadata(&target).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o755);
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Install injected SSH public keys for remote pod access.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::policy::AccessPolicy;

/// Resolution rule when several key variables are set at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPrecedence {
    /// The first non-empty candidate in check order wins.
    FirstWins,
    /// The last non-empty candidate in check order wins.
    LastWins,
}

/// Resolve the injected public key from the candidate variables.
///
/// Empty or whitespace-only values count as unset. `None` means no key
/// was injected, which is an informational skip rather than an error.
#[must_use]
pub fn resolve_public_key(
    env: &BTreeMap<String, String>,
    vars: &[String],
    precedence: KeyPrecedence,
) -> Option<String> {
    let mut resolved = None;
    for var in vars {
        let Some(value) = env.get(var) else {
            continue;
        };
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        match precedence {
            KeyPrecedence::FirstWins => return Some(trimmed.to_owned()),
            KeyPrecedence::LastWins => resolved = Some(trimmed.to_owned()),
        }
    }
    resolved
}

/// Append the key to the authorized keys file and lock down permissions.
///
/// The SSH directory is created when absent. No duplicate check is made:
/// re-running provisioning appends the key again.
pub fn install_public_key(policy: &AccessPolicy, key: &str) -> Result<PathBuf> {
    fs::create_dir_all(&policy.ssh_dir)
        .with_context(|| format!("create ssh dir {}", policy.ssh_dir.display()))?;
    set_owner_only(&policy.ssh_dir, 0o700)?;
    let keys_path = policy.ssh_dir.join(&policy.keys_file);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&keys_path)
        .with_context(|| format!("open {}", keys_path.display()))?;
    writeln!(file, "{key}").with_context(|| format!("write {}", keys_path.display()))?;
    set_owner_only(&keys_path, 0o600)?;
    Ok(keys_path)
}

#[cfg(unix)]
fn set_owner_only(path: &std::path::Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("set permissions on {}", path.display()))
}

#[cfg(not(unix))]
fn set_owner_only(_path: &std::path::Path, _mode: u32) -> Result<()> {
    Ok(())
}

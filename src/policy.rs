// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load and validate podprep provisioning policies.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::access::KeyPrecedence;
use crate::login::TOKEN_PLACEHOLDER;

/// Environment variable naming an alternate policy file.
pub const POLICY_PATH_VAR: &str = "PODPREP_POLICY";

/// Provisioning policy for one pod boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepPolicy {
    /// Environment snapshot settings.
    pub snapshot: SnapshotPolicy,
    /// SSH access provisioning settings.
    pub access: AccessPolicy,
    /// SSH daemon start settings.
    pub service: ServicePolicy,
    /// Hub and tracker login settings.
    pub login: LoginPolicy,
}

/// Environment snapshot settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPolicy {
    /// Snapshot file receiving `export NAME="VALUE"` lines.
    pub file: PathBuf,
    /// Login shell script that sources the snapshot.
    pub login_script: PathBuf,
    /// Variable names kept by exact match.
    pub keep_exact: Vec<String>,
    /// Variable name prefixes kept by prefix match.
    pub keep_prefixes: Vec<String>,
}

/// SSH access provisioning settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Directory holding SSH credentials.
    pub ssh_dir: PathBuf,
    /// Authorized keys file name inside the SSH directory.
    pub keys_file: String,
    /// Candidate environment variables carrying the injected public key,
    /// in check order.
    pub key_vars: Vec<String>,
    /// Resolution rule when several candidates are set.
    pub precedence: KeyPrecedence,
}

/// SSH daemon start settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePolicy {
    /// Service manager command used to start the SSH daemon.
    pub command: Vec<String>,
}

/// Hub and tracker login settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPolicy {
    /// Model hub login tool.
    pub hub: LoginTool,
    /// Experiment tracker login tool.
    pub tracker: LoginTool,
}

/// One external login tool gated on a bearer-token variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTool {
    /// Short label used in audit lines.
    pub label: String,
    /// Environment variable holding the bearer token.
    pub token_var: String,
    /// Program to invoke.
    pub program: String,
    /// Arguments; `{token}` is replaced with the token value.
    pub args: Vec<String>,
}

impl PrepPolicy {
    /// Construct the compiled-in default policy.
    ///
    /// When both key variables are set the later candidate wins. Whether
    /// that precedence is intentional is an open product question; the
    /// rule is kept explicit here so a deployment can flip it in TOML.
    #[must_use]
    pub fn builtin() -> Self {
        let home = home_dir();
        Self {
            snapshot: SnapshotPolicy {
                file: PathBuf::from("/etc/pod_environment"),
                login_script: home.join(".bashrc"),
                keep_exact: vec![
                    "_".to_owned(),
                    "PATH".to_owned(),
                    "HF_HOME".to_owned(),
                    "HUGGING_FACE_HUB_TOKEN".to_owned(),
                ],
                keep_prefixes: vec!["RUNPOD_".to_owned()],
            },
            access: AccessPolicy {
                ssh_dir: home.join(".ssh"),
                keys_file: "authorized_keys".to_owned(),
                key_vars: vec!["PUBLIC_KEY".to_owned(), "SSH_PUBLIC_KEY".to_owned()],
                precedence: KeyPrecedence::LastWins,
            },
            service: ServicePolicy {
                command: vec!["service".to_owned(), "ssh".to_owned(), "start".to_owned()],
            },
            login: LoginPolicy {
                hub: LoginTool {
                    label: "hub".to_owned(),
                    token_var: "HUGGING_FACE_HUB_TOKEN".to_owned(),
                    program: "huggingface-cli".to_owned(),
                    args: vec![
                        "login".to_owned(),
                        "--token".to_owned(),
                        TOKEN_PLACEHOLDER.to_owned(),
                        "--add-to-git-credential".to_owned(),
                    ],
                },
                tracker: LoginTool {
                    label: "tracker".to_owned(),
                    token_var: "WANDB_API_KEY".to_owned(),
                    program: "wandb".to_owned(),
                    args: vec!["login".to_owned(), TOKEN_PLACEHOLDER.to_owned()],
                },
            },
        }
    }
}

fn home_dir() -> PathBuf {
    if let Ok(value) = env::var("HOME") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    PathBuf::from("/root")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyToml {
    snapshot: SnapshotToml,
    access: AccessToml,
    service: ServiceToml,
    login: LoginToml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SnapshotToml {
    file: PathBuf,
    login_script: PathBuf,
    keep_exact: Vec<String>,
    keep_prefixes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AccessToml {
    ssh_dir: PathBuf,
    keys_file: String,
    key_vars: Vec<String>,
    precedence: KeyPrecedence,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceToml {
    command: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoginToml {
    hub: LoginToolToml,
    tracker: LoginToolToml,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoginToolToml {
    label: String,
    token_var: String,
    program: String,
    args: Vec<String>,
}

/// Return the policy path named by `PODPREP_POLICY` or a `podprep.toml`
/// in the working directory, when either exists.
#[must_use]
pub fn default_policy_path() -> Option<PathBuf> {
    if let Ok(value) = env::var(POLICY_PATH_VAR) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    if let Ok(cwd) = env::current_dir() {
        let candidate = cwd.join("podprep.toml");
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Load and validate a provisioning policy from disk.
pub fn load_policy(path: &Path) -> Result<PrepPolicy> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read podprep policy {}", path.display()))?;
    let parsed: PolicyToml = toml::from_str(&text)
        .with_context(|| format!("invalid podprep policy TOML in {}", path.display()))?;
    let policy = PrepPolicy {
        snapshot: SnapshotPolicy {
            file: parsed.snapshot.file,
            login_script: parsed.snapshot.login_script,
            keep_exact: parsed.snapshot.keep_exact,
            keep_prefixes: parsed.snapshot.keep_prefixes,
        },
        access: AccessPolicy {
            ssh_dir: parsed.access.ssh_dir,
            keys_file: parsed.access.keys_file,
            key_vars: parsed.access.key_vars,
            precedence: parsed.access.precedence,
        },
        service: ServicePolicy {
            command: parsed.service.command,
        },
        login: LoginPolicy {
            hub: login_tool(parsed.login.hub),
            tracker: login_tool(parsed.login.tracker),
        },
    };
    validate_policy(&policy)?;
    Ok(policy)
}

fn login_tool(parsed: LoginToolToml) -> LoginTool {
    LoginTool {
        label: parsed.label,
        token_var: parsed.token_var,
        program: parsed.program,
        args: parsed.args,
    }
}

/// Validate policy structure before any stage runs.
pub fn validate_policy(policy: &PrepPolicy) -> Result<()> {
    if !policy.snapshot.file.is_absolute() {
        return Err(anyhow!("snapshot.file must be absolute"));
    }
    if policy.snapshot.login_script.as_os_str().is_empty() {
        return Err(anyhow!("snapshot.login_script must not be empty"));
    }
    if policy.snapshot.keep_exact.is_empty() && policy.snapshot.keep_prefixes.is_empty() {
        return Err(anyhow!(
            "snapshot.keep_exact and snapshot.keep_prefixes must not both be empty"
        ));
    }
    for name in &policy.snapshot.keep_exact {
        if name.is_empty() {
            return Err(anyhow!("snapshot.keep_exact entries must not be empty"));
        }
    }
    for prefix in &policy.snapshot.keep_prefixes {
        if prefix.is_empty() {
            return Err(anyhow!("snapshot.keep_prefixes entries must not be empty"));
        }
    }
    if policy.access.ssh_dir.as_os_str().is_empty() {
        return Err(anyhow!("access.ssh_dir must not be empty"));
    }
    if policy.access.keys_file.trim().is_empty() {
        return Err(anyhow!("access.keys_file must not be empty"));
    }
    if policy.access.keys_file.contains('/') {
        return Err(anyhow!("access.keys_file must be a bare file name"));
    }
    if policy.access.key_vars.is_empty() {
        return Err(anyhow!("access.key_vars must not be empty"));
    }
    for var in &policy.access.key_vars {
        if var.trim().is_empty() {
            return Err(anyhow!("access.key_vars entries must not be empty"));
        }
    }
    validate_command("service.command", &policy.service.command)?;
    validate_login_tool("login.hub", &policy.login.hub)?;
    validate_login_tool("login.tracker", &policy.login.tracker)?;
    Ok(())
}

fn validate_command(label: &str, command: &[String]) -> Result<()> {
    let program = command.first().map(String::as_str).unwrap_or("");
    if program.trim().is_empty() {
        return Err(anyhow!("{label} must name a program"));
    }
    Ok(())
}

fn validate_login_tool(label: &str, tool: &LoginTool) -> Result<()> {
    if tool.label.trim().is_empty() {
        return Err(anyhow!("{label}.label must not be empty"));
    }
    if tool.token_var.trim().is_empty() {
        return Err(anyhow!("{label}.token_var must not be empty"));
    }
    if tool.program.trim().is_empty() {
        return Err(anyhow!("{label}.program must not be empty"));
    }
    if !tool.args.iter().any(|arg| arg.contains(TOKEN_PLACEHOLDER)) {
        return Err(anyhow!(
            "{label}.args must contain the {TOKEN_PLACEHOLDER} placeholder"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policy_is_valid() {
        let policy = PrepPolicy::builtin();
        validate_policy(&policy).unwrap();
        assert_eq!(
            policy.access.key_vars,
            vec!["PUBLIC_KEY".to_owned(), "SSH_PUBLIC_KEY".to_owned()]
        );
        assert_eq!(policy.access.precedence, KeyPrecedence::LastWins);
    }

    #[test]
    fn relative_snapshot_path_is_rejected() {
        let mut policy = PrepPolicy::builtin();
        policy.snapshot.file = PathBuf::from("pod_environment");
        let err = validate_policy(&policy).unwrap_err();
        assert!(err.to_string().contains("snapshot.file"));
    }

    #[test]
    fn login_args_require_token_placeholder() {
        let mut policy = PrepPolicy::builtin();
        policy.login.tracker.args = vec!["login".to_owned()];
        let err = validate_policy(&policy).unwrap_err();
        assert!(err.to_string().contains("login.tracker"));
    }
}

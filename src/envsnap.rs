// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Capture allow-listed environment variables into the pod snapshot.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::policy::SnapshotPolicy;

/// Capture the current process environment as an ordered mapping.
#[must_use]
pub fn capture_process_env() -> BTreeMap<String, String> {
    std::env::vars().collect()
}

/// Select the variables the snapshot keeps, in deterministic name order.
///
/// A name is kept when it equals a `keep_exact` entry or starts with a
/// `keep_prefixes` entry. Each matching name appears exactly once.
#[must_use]
pub fn select_exports(
    env: &BTreeMap<String, String>,
    policy: &SnapshotPolicy,
) -> Vec<(String, String)> {
    env.iter()
        .filter(|(name, _)| matches_selection(name, policy))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn matches_selection(name: &str, policy: &SnapshotPolicy) -> bool {
    policy.keep_exact.iter().any(|exact| exact == name)
        || policy
            .keep_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && name.starts_with(prefix.as_str()))
}

/// Render one `export NAME="VALUE"` line.
///
/// Backslash, double quote, dollar and backtick are escaped so a later
/// shell `source` of the snapshot round-trips the value exactly, embedded
/// quotes included.
#[must_use]
pub fn format_export_line(name: &str, value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("export {name}=\"{escaped}\"")
}

/// Append export lines to the snapshot file, creating it when missing.
///
/// Existing lines are never rewritten or deduplicated: the file only grows
/// across the lifetime of the pod.
pub fn write_snapshot(path: &Path, lines: &[String]) -> Result<usize> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open snapshot {}", path.display()))?;
    for line in lines {
        file.write_all(line.as_bytes())
            .with_context(|| format!("write snapshot {}", path.display()))?;
        file.write_all(b"\n")
            .with_context(|| format!("write snapshot {}", path.display()))?;
    }
    Ok(lines.len())
}

/// Append a `source` directive for the snapshot to the login script.
///
/// The append is unconditional; re-running provisioning duplicates the
/// directive.
pub fn append_source_line(login_script: &Path, snapshot: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(login_script)
        .with_context(|| format!("open login script {}", login_script.display()))?;
    writeln!(file, "source {}", snapshot.display())
        .with_context(|| format!("write login script {}", login_script.display()))?;
    Ok(())
}

/// Run the full environment-export stage and return the variable count.
pub fn export_environment(
    env: &BTreeMap<String, String>,
    policy: &SnapshotPolicy,
) -> Result<usize> {
    let selected = select_exports(env, policy);
    let lines: Vec<String> = selected
        .iter()
        .map(|(name, value)| format_export_line(name, value))
        .collect();
    let written = write_snapshot(&policy.file, &lines)?;
    append_source_line(&policy.login_script, &policy.file)?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn policy() -> SnapshotPolicy {
        SnapshotPolicy {
            file: PathBuf::from("/etc/pod_environment"),
            login_script: PathBuf::from("/root/.bashrc"),
            keep_exact: vec!["_".to_owned(), "PATH".to_owned(), "HF_HOME".to_owned()],
            keep_prefixes: vec!["RUNPOD_".to_owned()],
        }
    }

    #[test]
    fn selection_matches_exact_and_prefix_names() {
        let policy = policy();
        assert!(matches_selection("PATH", &policy));
        assert!(matches_selection("_", &policy));
        assert!(matches_selection("RUNPOD_POD_ID", &policy));
        assert!(!matches_selection("HOME", &policy));
        assert!(!matches_selection("PATHS", &policy));
    }

    #[test]
    fn export_line_escapes_shell_metacharacters() {
        assert_eq!(
            format_export_line("PATH", "/usr/bin:/bin"),
            "export PATH=\"/usr/bin:/bin\""
        );
        assert_eq!(
            format_export_line("MOTD", "say \"hi\" for $5 `now`"),
            "export MOTD=\"say \\\"hi\\\" for \\$5 \\`now\\`\""
        );
        assert_eq!(
            format_export_line("WINPATH", "C:\\pods"),
            "export WINPATH=\"C:\\\\pods\""
        );
    }

    #[test]
    fn selection_is_ordered_and_unique() {
        let mut env = BTreeMap::new();
        env.insert("RUNPOD_REGION".to_owned(), "us".to_owned());
        env.insert("PATH".to_owned(), "/usr/bin".to_owned());
        env.insert("HOME".to_owned(), "/root".to_owned());
        let selected = select_exports(&env, &policy());
        let names: Vec<&str> = selected.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["PATH", "RUNPOD_REGION"]);
    }
}

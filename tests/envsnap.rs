// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate environment snapshot export behaviour.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use podprep::envsnap::{append_source_line, export_environment, format_export_line};
use podprep::policy::SnapshotPolicy;
use tempfile::TempDir;

fn snapshot_policy(root: &Path) -> SnapshotPolicy {
    SnapshotPolicy {
        file: root.join("pod_environment"),
        login_script: root.join(".bashrc"),
        keep_exact: vec![
            "_".to_owned(),
            "PATH".to_owned(),
            "HF_HOME".to_owned(),
            "HUGGING_FACE_HUB_TOKEN".to_owned(),
        ],
        keep_prefixes: vec!["RUNPOD_".to_owned()],
    }
}

fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

#[test]
fn matching_variables_are_exported_once_per_invocation() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let policy = snapshot_policy(temp.path());
    let env = env(&[
        ("RUNPOD_REGION", "us"),
        ("PATH", "/usr/bin"),
        ("HF_HOME", "/root/.cache/hf"),
        ("HOME", "/root"),
        ("TERM", "xterm"),
    ]);

    let count = export_environment(&env, &policy)?;
    assert_eq!(count, 3);

    let snapshot = fs::read_to_string(&policy.file).context("read snapshot")?;
    let lines: Vec<&str> = snapshot.lines().collect();
    assert_eq!(
        lines,
        vec![
            "export HF_HOME=\"/root/.cache/hf\"",
            "export PATH=\"/usr/bin\"",
            "export RUNPOD_REGION=\"us\"",
        ]
    );
    Ok(())
}

#[test]
fn snapshot_only_grows_across_invocations() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let policy = snapshot_policy(temp.path());
    let first = env(&[("RUNPOD_POD_ID", "abc")]);
    let second = env(&[("RUNPOD_POD_ID", "abc"), ("PATH", "/usr/bin")]);

    export_environment(&first, &policy)?;
    export_environment(&second, &policy)?;

    let snapshot = fs::read_to_string(&policy.file).context("read snapshot")?;
    let lines: Vec<&str> = snapshot.lines().collect();
    // Appended, never rewritten: the first capture is still present.
    assert_eq!(
        lines,
        vec![
            "export RUNPOD_POD_ID=\"abc\"",
            "export PATH=\"/usr/bin\"",
            "export RUNPOD_POD_ID=\"abc\"",
        ]
    );
    Ok(())
}

#[test]
fn rerunning_duplicates_the_source_directive() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let policy = snapshot_policy(temp.path());
    let env = env(&[("PATH", "/usr/bin")]);

    export_environment(&env, &policy)?;
    export_environment(&env, &policy)?;

    let script = fs::read_to_string(&policy.login_script).context("read login script")?;
    let expected = format!("source {}", policy.file.display());
    let directives: Vec<&str> = script.lines().collect();
    assert_eq!(directives, vec![expected.as_str(), expected.as_str()]);
    Ok(())
}

#[test]
fn values_with_embedded_quotes_round_trip() {
    let line = format_export_line("GREETING", "she said \"hi\"");
    assert_eq!(line, "export GREETING=\"she said \\\"hi\\\"\"");
}

#[test]
fn source_line_targets_the_snapshot_file() -> Result<()> {
    let temp = TempDir::new().expect("tempdir");
    let script = temp.path().join(".bashrc");
    let snapshot = temp.path().join("pod_environment");
    append_source_line(&script, &snapshot)?;
    let contents = fs::read_to_string(&script).context("read login script")?;
    assert_eq!(contents, format!("source {}\n", snapshot.display()));
    Ok(())
}

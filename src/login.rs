// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Run optional bearer-token logins for the hub and tracker.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::policy::LoginTool;

/// Placeholder replaced with the bearer token in login tool arguments.
pub const TOKEN_PLACEHOLDER: &str = "{token}";

/// Result of one login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// No token variable was set; nothing was attempted.
    Skipped,
    /// The external tool exited successfully.
    Succeeded,
    /// The external tool failed; carries its exit code when one exists.
    Failed(Option<i32>),
}

/// Build the argument vector with the token substituted in.
#[must_use]
pub fn login_args(tool: &LoginTool, token: &str) -> Vec<String> {
    tool.args
        .iter()
        .map(|arg| arg.replace(TOKEN_PLACEHOLDER, token))
        .collect()
}

/// Invoke the login tool with the supplied token.
///
/// The external tool's exit status is surfaced, never swallowed. The
/// token value must not appear in logs or audit lines.
pub fn login_with_token(tool: &LoginTool, token: &str) -> Result<LoginOutcome> {
    let args = login_args(tool, token);
    let status = Command::new(&tool.program)
        .args(&args)
        .stdin(Stdio::null())
        .status()
        .with_context(|| format!("invoke {}", tool.program))?;
    if status.success() {
        Ok(LoginOutcome::Succeeded)
    } else {
        Ok(LoginOutcome::Failed(status.code()))
    }
}

/// Run the login when the tool's token variable is set, skip otherwise.
///
/// A missing or blank token is an informational skip, not an error. The
/// hub and tracker logins are independent of each other.
pub fn login_if_token(env: &BTreeMap<String, String>, tool: &LoginTool) -> Result<LoginOutcome> {
    let token = env
        .get(&tool.token_var)
        .map(|value| value.trim().to_owned())
        .filter(|token| !token.is_empty());
    match token {
        Some(token) => login_with_token(tool, &token),
        None => Ok(LoginOutcome::Skipped),
    }
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Start the SSH daemon through the platform service manager.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::process::Command;

use anyhow::{anyhow, Context, Result};

/// Start the SSH daemon with the configured service command.
///
/// Fire-and-forget: the command is attempted exactly once and the caller
/// decides whether a failure aborts anything (during provisioning it does
/// not, since the login stage is independent of remote access).
pub fn start_ssh_daemon(command: &[String]) -> Result<()> {
    let program = command
        .first()
        .filter(|program| !program.trim().is_empty())
        .ok_or_else(|| anyhow!("service command must name a program"))?;
    let status = Command::new(program)
        .args(&command[1..])
        .status()
        .with_context(|| format!("invoke {program}"))?;
    if !status.success() {
        return Err(anyhow!("{program} exited with {status}"));
    }
    Ok(())
}

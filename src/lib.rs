// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Provide shared helpers for the podprep provisioning CLI.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Shared helpers for the podprep pod provisioning CLI.

/// SSH public key resolution and installation helpers.
pub mod access;
/// Environment snapshot helpers.
pub mod envsnap;
/// Terminal wait-state helpers.
pub mod lifecycle;
/// Hub and tracker login helpers.
pub mod login;
/// Provisioning policy loader.
pub mod policy;
/// Sequential provisioning runner.
pub mod provision;
/// SSH daemon start helpers.
pub mod service;

use std::fmt;

/// Outcome marker for one audit transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    /// The stage completed (or was skipped intentionally).
    Ok,
    /// The stage failed.
    Err,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Ok => write!(f, "OK"),
            StepStatus::Err => write!(f, "ERR"),
        }
    }
}

/// Buffered audit transcript used by podprep commands.
#[derive(Debug, Default)]
pub struct PrepAudit {
    lines: Vec<String>,
}

impl PrepAudit {
    /// Create a new empty audit transcript.
    #[must_use]
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Borrow the collected transcript lines.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consume the audit and return the captured lines.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Append a stage acknowledgement line to the transcript.
    pub fn push_step(&mut self, status: StepStatus, stage: &str, detail: Option<&str>) {
        let mut line = format!("{status} {stage}");
        if let Some(detail) = detail {
            line.push(' ');
            line.push_str(detail);
        }
        self.lines.push(line);
    }

    /// Append a plain output line to the transcript.
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

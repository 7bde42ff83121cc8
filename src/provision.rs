// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Run the provisioning stages sequentially with log-and-continue.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use crate::access;
use crate::envsnap;
use crate::login::{self, LoginOutcome};
use crate::policy::PrepPolicy;
use crate::service;
use crate::{PrepAudit, StepStatus};

/// Summary of one provisioning run.
#[derive(Debug, Default)]
pub struct ProvisionSummary {
    /// Human-readable failure reasons, one per failed stage.
    pub failures: Vec<String>,
}

impl ProvisionSummary {
    /// True when every stage completed or skipped cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run the provisioning stages strictly top-to-bottom.
///
/// A stage failure is recorded in the audit transcript and the summary,
/// and the next stage still runs: the stages are independent and a pod
/// with a broken snapshot is still worth an SSH key and a login attempt.
pub fn provision(
    env: &BTreeMap<String, String>,
    policy: &PrepPolicy,
    audit: &mut PrepAudit,
) -> ProvisionSummary {
    let mut summary = ProvisionSummary::default();

    match envsnap::export_environment(env, &policy.snapshot) {
        Ok(count) => {
            let detail = format!(
                "file={} vars={count}",
                policy.snapshot.file.display()
            );
            audit.push_step(StepStatus::Ok, "ENV", Some(detail.as_str()));
        }
        Err(err) => {
            let detail = format!("reason={err:#}");
            audit.push_step(StepStatus::Err, "ENV", Some(detail.as_str()));
            summary.failures.push(err.to_string());
        }
    }

    match access::resolve_public_key(env, &policy.access.key_vars, policy.access.precedence) {
        Some(key) => match access::install_public_key(&policy.access, &key) {
            Ok(keys_path) => {
                let detail = format!("file={}", keys_path.display());
                audit.push_step(StepStatus::Ok, "SSH-KEY", Some(detail.as_str()));
            }
            Err(err) => {
                let detail = format!("reason={err:#}");
                audit.push_step(StepStatus::Err, "SSH-KEY", Some(detail.as_str()));
                summary.failures.push(err.to_string());
            }
        },
        None => {
            audit.push_step(
                StepStatus::Ok,
                "SSH-KEY",
                Some("status=skip reason=no-key-variable"),
            );
        }
    }

    match service::start_ssh_daemon(&policy.service.command) {
        Ok(()) => audit.push_step(StepStatus::Ok, "SSHD", None),
        Err(err) => {
            let detail = format!("reason={err:#}");
            audit.push_step(StepStatus::Err, "SSHD", Some(detail.as_str()));
            summary.failures.push(err.to_string());
        }
    }

    for tool in [&policy.login.hub, &policy.login.tracker] {
        match login::login_if_token(env, tool) {
            Ok(LoginOutcome::Skipped) => {
                let detail = format!(
                    "service={} status=skip reason=no-token var={}",
                    tool.label, tool.token_var
                );
                audit.push_step(StepStatus::Ok, "LOGIN", Some(detail.as_str()));
            }
            Ok(LoginOutcome::Succeeded) => {
                let detail = format!("service={}", tool.label);
                audit.push_step(StepStatus::Ok, "LOGIN", Some(detail.as_str()));
            }
            Ok(LoginOutcome::Failed(code)) => {
                let code = code
                    .map(|code| code.to_string())
                    .unwrap_or_else(|| "signal".to_owned());
                let detail = format!("service={} reason=exit code={code}", tool.label);
                audit.push_step(StepStatus::Err, "LOGIN", Some(detail.as_str()));
                summary
                    .failures
                    .push(format!("{} login exited with {code}", tool.label));
            }
            Err(err) => {
                let detail = format!("service={} reason={err:#}", tool.label);
                audit.push_step(StepStatus::Err, "LOGIN", Some(detail.as_str()));
                summary.failures.push(err.to_string());
            }
        }
    }

    summary
}

// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the podprep provisioning tool.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the podprep pod provisioning tool.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{warn, LevelFilter};
use podprep::access;
use podprep::envsnap;
use podprep::lifecycle;
use podprep::login::{self, LoginOutcome};
use podprep::policy::{default_policy_path, load_policy, PrepPolicy};
use podprep::provision::provision;
use podprep::service;
use podprep::PrepAudit;

#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Pod provisioning for GPU training jobs")]
struct Cli {
    /// Path to the provisioning policy TOML.
    #[arg(long, value_name = "FILE")]
    policy: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run every provisioning stage, then wait for termination.
    Up(UpArgs),
    /// Export the environment snapshot only.
    Env,
    /// Install the injected SSH public key only.
    SshKey,
    /// Start the SSH daemon only.
    Sshd,
    /// Run the hub and tracker logins only.
    Login,
}

#[derive(Debug, Parser)]
struct UpArgs {
    /// Exit after provisioning instead of blocking for termination.
    #[arg(long, default_value_t = false)]
    no_wait: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let policy = resolve_policy(cli.policy)?;
    match cli.command {
        Command::Up(args) => run_up(&policy, args),
        Command::Env => run_env(&policy),
        Command::SshKey => run_ssh_key(&policy),
        Command::Sshd => run_sshd(&policy),
        Command::Login => run_login(&policy),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_level.as_str()));
    builder.format_timestamp_millis();
    let _ = builder.try_init();
}

fn resolve_policy(cli_path: Option<PathBuf>) -> Result<PrepPolicy> {
    if let Some(path) = cli_path {
        return load_policy(&path);
    }
    if let Some(path) = default_policy_path() {
        return load_policy(&path);
    }
    Ok(PrepPolicy::builtin())
}

fn run_up(policy: &PrepPolicy, args: UpArgs) -> Result<()> {
    let env = envsnap::capture_process_env();
    let mut audit = PrepAudit::new();
    let summary = provision(&env, policy, &mut audit);
    for line in audit.lines() {
        println!("{line}");
    }
    for failure in &summary.failures {
        warn!("provisioning stage failed: {failure}");
    }
    if args.no_wait {
        if summary.is_clean() {
            return Ok(());
        }
        return Err(anyhow!(
            "provisioning failed: {} stage(s) failed",
            summary.failures.len()
        ));
    }
    lifecycle::wait_for_termination()
}

fn run_env(policy: &PrepPolicy) -> Result<()> {
    let env = envsnap::capture_process_env();
    let count = envsnap::export_environment(&env, &policy.snapshot)?;
    println!(
        "exported {count} variable(s) to {}",
        policy.snapshot.file.display()
    );
    Ok(())
}

fn run_ssh_key(policy: &PrepPolicy) -> Result<()> {
    let env = envsnap::capture_process_env();
    match access::resolve_public_key(&env, &policy.access.key_vars, policy.access.precedence) {
        Some(key) => {
            let keys_path = access::install_public_key(&policy.access, &key)?;
            println!("installed public key in {}", keys_path.display());
        }
        None => println!("no public key variable set; skipping key install"),
    }
    Ok(())
}

fn run_sshd(policy: &PrepPolicy) -> Result<()> {
    service::start_ssh_daemon(&policy.service.command)?;
    println!("ssh daemon started");
    Ok(())
}

fn run_login(policy: &PrepPolicy) -> Result<()> {
    let env = envsnap::capture_process_env();
    let mut failures = 0usize;
    for tool in [&policy.login.hub, &policy.login.tracker] {
        match login::login_if_token(&env, tool)? {
            LoginOutcome::Skipped => {
                println!("{}: no {} set; skipping login", tool.label, tool.token_var);
            }
            LoginOutcome::Succeeded => println!("{}: logged in", tool.label),
            LoginOutcome::Failed(code) => {
                match code {
                    Some(code) => println!("{}: login exited with code {code}", tool.label),
                    None => println!("{}: login terminated by signal", tool.label),
                }
                failures += 1;
            }
        }
    }
    if failures > 0 {
        return Err(anyhow!("{failures} login(s) failed"));
    }
    Ok(())
}

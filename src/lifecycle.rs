// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Hold the provisioned pod alive until the platform stops it.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::sync::mpsc::channel;

use anyhow::{Context, Result};
use log::info;

/// Block until the hosting platform delivers SIGINT or SIGTERM.
///
/// The pod's main process must stay alive for the platform's health
/// checks once provisioning is done; termination is always external.
/// Blocking on a signal-fed channel keeps the wait interruptible so the
/// process can log a clean shutdown line instead of dying mid-sleep.
pub fn wait_for_termination() -> Result<()> {
    let (tx, rx) = channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("install termination handler")?;
    info!("pod ready; waiting for platform termination");
    rx.recv().context("termination channel closed")?;
    info!("termination signal received; shutting down");
    Ok(())
}

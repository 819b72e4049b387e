#![forbid(unsafe_code)]

//! Startup safety checks shared by the tubescribe binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Refuses to run a binary as root. The scraper writes into user-owned
/// directories and never needs elevated privileges.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!("{process} must not run as root; use a regular user account");
    }
    Ok(())
}

//! Operating modes and their resolution.
//!
//! The mode is resolved once per invocation from the explicit request, the
//! presence of a controlling terminal, and the detach feature. It never
//! changes afterwards.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// How the launch command is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingMode {
    /// Take over the terminal through a pseudo-terminal.
    Interactive,
    /// Spawn, wait and propagate the exit code.
    NonInteractive,
    /// Print the launch command without spawning anything.
    DryRun,
}

impl OperatingMode {
    /// All modes, in CLI listing order.
    pub const ALL: [Self; 3] = [Self::Interactive, Self::NonInteractive, Self::DryRun];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::NonInteractive => "non-interactive",
            Self::DryRun => "dry-run",
        }
    }

    /// Whether the launch command requests a TTY (`-it`).
    ///
    /// Dry-run prints the command a user would paste into a terminal, so it
    /// carries the flags as well.
    pub fn allocates_tty(&self) -> bool {
        !matches!(self, Self::NonInteractive)
    }
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| Error::InvalidMode(s.to_string()))
    }
}

/// Resolves the effective mode.
///
/// - interactive together with detach is a conflict;
/// - an explicit request wins, except that interactive without a terminal
///   degrades to non-interactive with a warning;
/// - with no request, the result is non-interactive.
///
/// # Errors
///
/// Returns [`Error::ConfigConflict`] for interactive plus detach.
pub fn resolve_mode(
    requested: Option<OperatingMode>,
    detach: bool,
    has_terminal: bool,
) -> Result<OperatingMode> {
    match requested {
        Some(OperatingMode::Interactive) if detach => Err(Error::ConfigConflict(
            "detach cannot be combined with interactive mode".to_string(),
        )),
        Some(OperatingMode::Interactive) if !has_terminal => {
            warn!("no controlling terminal, running non-interactive");
            Ok(OperatingMode::NonInteractive)
        }
        Some(mode) => Ok(mode),
        None => Ok(OperatingMode::NonInteractive),
    }
}

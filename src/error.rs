//! Error types for resolution, assembly, build, and launch.

use std::path::PathBuf;

use crate::constants::{EXIT_BUILD_UNCONFIRMED, EXIT_FAILURE, EXIT_SPAWN_FAILED};
use crate::extension::ExtensionError;

/// Result type alias for dockhand operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while composing, building, or launching an image.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Extension resolution or fragment generation failed.
    #[error(transparent)]
    Extension(#[from] ExtensionError),

    /// An extension's host-side precondition failed.
    #[error("precondition of extension '{extension}' failed: {reason}")]
    Precondition { extension: String, reason: String },

    // =========================================================================
    // Build Errors
    // =========================================================================
    /// The engine failed to start the build or reported an error.
    #[error("build failed: {0}")]
    BuildEngine(String),

    /// The build output ended without a success marker.
    #[error("build finished without confirming an image")]
    BuildUnconfirmed,

    /// Failed to materialize the build context.
    #[error("failed to prepare build context at {path}: {reason}")]
    BuildContext { path: PathBuf, reason: String },

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Run was requested before a successful build.
    #[error("no image available to run, build it first")]
    NotBuilt,

    /// The orchestrator is in the wrong state for the operation.
    #[error("image generator is in state '{state}', expected '{expected}'")]
    InvalidState { state: String, expected: String },

    // =========================================================================
    // Launch Errors
    // =========================================================================
    /// The launch command could not be spawned.
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// A launch fragment or command could not be split into words.
    #[error("invalid launch arguments from {origin}: {reason}")]
    InvalidLaunchArgs { origin: String, reason: String },

    /// Terminal setup or relay failed.
    #[error("terminal error: {0}")]
    Terminal(String),

    /// An auxiliary engine command (pull, image removal) failed.
    #[error("engine command '{command}' failed: {reason}")]
    EngineCommand { command: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Two requested features cannot be combined.
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// Unknown operating mode name.
    #[error("invalid mode '{0}', expected one of: interactive, non-interactive, dry-run")]
    InvalidMode(String),

    /// Failed to parse an image reference.
    #[error("invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BuildUnconfirmed => EXIT_BUILD_UNCONFIRMED,
            Self::Spawn { .. } => EXIT_SPAWN_FAILED,
            _ => EXIT_FAILURE,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

//! Container engine client.
//!
//! The engine is an opaque build and run service. [`ContainerEngine`] is
//! the seam the orchestrator talks to; [`DockerCli`] drives the `docker`
//! executable.
//!
//! # Success Detection
//!
//! A build is confirmed, in order of preference, by:
//!
//! 1. the image id the engine writes to `--iidfile`;
//! 2. the legacy builder line `Successfully built <id>`;
//! 3. the BuildKit line `writing image sha256:<id>`.
//!
//! A build that cannot be started or exits non-zero is an engine error; a
//! build that exits zero without any of the above is unconfirmed. The two
//! map to distinct exit codes.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{
    BUILDKIT_SUCCESS_PATTERN, DEFAULT_ENGINE_BINARY, ENGINE_BINARY_ENV, EXIT_FAILURE,
    EXIT_SIGNAL_OFFSET, LEGACY_SUCCESS_PATTERN, builtin_regex,
};
use crate::error::{Error, Result};

// =============================================================================
// Build Request / Outcome
// =============================================================================

/// Parameters of a single image build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build context directory containing the recipe.
    pub context: PathBuf,
    /// Ignore the layer cache.
    pub no_cache: bool,
    /// Always pull the base image.
    pub pull: bool,
    /// Optional tag for the result.
    pub tag: Option<String>,
}

impl BuildRequest {
    /// Request with default options.
    pub fn new(context: impl Into<PathBuf>) -> Self {
        Self {
            context: context.into(),
            no_cache: false,
            pull: false,
            tag: None,
        }
    }
}

/// Result of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Success confirmed; carries the image id.
    Built { image_id: String },
    /// The build could not be started or the engine reported failure.
    EngineError { reason: String },
    /// The output stream ended without a success signal.
    Unconfirmed,
}

// =============================================================================
// Engine Trait
// =============================================================================

/// Build and run service used by the orchestrator.
///
/// Every call is at-most-once: implementations never retry.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Executable placed at the head of launch commands.
    fn program(&self) -> &str;

    /// Builds an image, passing every output line to `on_line`.
    async fn build(
        &self,
        request: &BuildRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> BuildOutcome;

    /// Spawns `argv` with inherited stdio and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the process cannot be started.
    async fn run(&self, argv: &[String]) -> Result<i32>;

    /// Removes (untags) an image.
    async fn remove_image(&self, image_id: &str) -> Result<()>;

    /// Pre-fetches an image.
    async fn pull(&self, reference: &str) -> Result<()>;
}

// =============================================================================
// Marker Scanning
// =============================================================================

static LEGACY_SUCCESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| builtin_regex("LEGACY_SUCCESS_PATTERN", LEGACY_SUCCESS_PATTERN));
static BUILDKIT_SUCCESS: LazyLock<Option<Regex>> =
    LazyLock::new(|| builtin_regex("BUILDKIT_SUCCESS_PATTERN", BUILDKIT_SUCCESS_PATTERN));

/// Extracts an image id from a build output line, if it is a success line.
pub fn scan_success_marker(line: &str) -> Option<String> {
    [&*LEGACY_SUCCESS, &*BUILDKIT_SUCCESS]
        .into_iter()
        .flatten()
        .find_map(|re| re.captures(line))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Maps a process status to a shell-style exit code.
///
/// Termination by signal `n` reports `128 + n`.
pub fn exit_code_from_status(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return EXIT_SIGNAL_OFFSET + signal;
        }
    }
    EXIT_FAILURE
}

// =============================================================================
// Docker CLI
// =============================================================================

/// Engine backed by the `docker` executable.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Uses `$DOCKHAND_DOCKER`, or `docker` from `PATH`.
    pub fn new() -> Self {
        let binary = std::env::var(ENGINE_BINARY_ENV)
            .ok()
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| DEFAULT_ENGINE_BINARY.to_string());
        Self { binary }
    }

    /// Uses an explicit executable path.
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn build_args(request: &BuildRequest, iidfile: &std::path::Path) -> Vec<std::ffi::OsString> {
        let mut args: Vec<std::ffi::OsString> = vec!["build".into(), "--iidfile".into()];
        args.push(iidfile.as_os_str().to_os_string());
        if request.no_cache {
            args.push("--no-cache".into());
        }
        if request.pull {
            args.push("--pull".into());
        }
        if let Some(tag) = &request.tag {
            args.push("-t".into());
            args.push(tag.into());
        }
        args.push(request.context.as_os_str().to_os_string());
        args
    }

    async fn command_output(&self, args: &[&str]) -> Result<()> {
        let command = format!("{} {}", self.binary, args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::EngineCommand {
                command: command.clone(),
                reason: e.to_string(),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(Error::EngineCommand {
                command,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    if tx.send(line.trim_end_matches(['\n', '\r']).to_string()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read build output");
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl ContainerEngine for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    fn program(&self) -> &str {
        &self.binary
    }

    async fn build(
        &self,
        request: &BuildRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> BuildOutcome {
        let iid_dir = match tempfile::tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                return BuildOutcome::EngineError {
                    reason: format!("failed to create iidfile directory: {e}"),
                };
            }
        };
        let iidfile = iid_dir.path().join("iid");

        let mut command = Command::new(&self.binary);
        command
            .args(Self::build_args(request, &iidfile))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(binary = %self.binary, context = %request.context.display(), "Starting build");
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return BuildOutcome::EngineError {
                    reason: format!("failed to start '{}': {e}", self.binary),
                };
            }
        };
        drop(command);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut marker_id = None;
        while let Some(line) = rx.recv().await {
            if marker_id.is_none() {
                marker_id = scan_success_marker(&line);
            }
            on_line(&line);
        }
        for reader in readers {
            let _ = reader.await;
        }

        let status = match child.wait().await {
            Ok(status) => status,
            Err(e) => {
                return BuildOutcome::EngineError {
                    reason: format!("failed to wait for build: {e}"),
                };
            }
        };
        if !status.success() {
            return BuildOutcome::EngineError {
                reason: format!("engine exited with code {}", exit_code_from_status(status)),
            };
        }

        let iid = tokio::fs::read_to_string(&iidfile)
            .await
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match iid.or(marker_id) {
            Some(image_id) => {
                info!(image = %image_id, "Build confirmed");
                BuildOutcome::Built { image_id }
            }
            None => BuildOutcome::Unconfirmed,
        }
    }

    async fn run(&self, argv: &[String]) -> Result<i32> {
        let Some((program, rest)) = argv.split_first() else {
            return Err(Error::Spawn {
                program: String::new(),
                reason: "empty command".to_string(),
            });
        };
        let status = Command::new(program)
            .args(rest)
            .status()
            .await
            .map_err(|e| Error::Spawn {
                program: program.clone(),
                reason: e.to_string(),
            })?;
        Ok(exit_code_from_status(status))
    }

    async fn remove_image(&self, image_id: &str) -> Result<()> {
        self.command_output(&["image", "rm", image_id]).await
    }

    async fn pull(&self, reference: &str) -> Result<()> {
        self.command_output(&["pull", reference]).await
    }
}

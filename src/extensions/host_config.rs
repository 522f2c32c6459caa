//! Host configuration passthrough: SSH agent, git config, X11 and
//! PulseAudio.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::args::ArgBag;
use crate::constants::{XAUTH_PATH, keys};
use crate::error::{Error, Result};
use crate::extension::{Extension, ExtensionError, ExtensionResult};
use crate::host::{self, HostUser};
use crate::launch::shell_quote;

/// Forwards the SSH agent socket when `SSH_AUTH_SOCK` is set.
#[derive(Debug, Default)]
pub struct Ssh;

impl Ssh {
    pub const NAME: &'static str = "ssh";
}

impl Extension for Ssh {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(match std::env::var("SSH_AUTH_SOCK") {
            Ok(sock) if !sock.is_empty() => {
                format!("-e SSH_AUTH_SOCK -v {}", shell_quote(&format!("{sock}:{sock}")))
            }
            _ => String::new(),
        })
    }
}

// =============================================================================
// Git
// =============================================================================

/// Mounts `/etc/gitconfig` and the user's `.gitconfig` read-only.
#[derive(Debug, Default)]
pub struct Git;

impl Git {
    pub const NAME: &'static str = "git";
    /// Overrides the user config path.
    pub const CONFIG_PATH: &'static str = "git_config_path";
    /// Overrides the system config path.
    pub const SYSTEM_CONFIG_PATH: &'static str = "git_config_path_system";

    const SYSTEM_TARGET: &'static str = "/etc/gitconfig";

    fn user_config(args: &ArgBag) -> Option<PathBuf> {
        args.get_string(Self::CONFIG_PATH)
            .map(PathBuf::from)
            .or_else(|| host::home_dir().map(|home| home.join(".gitconfig")))
    }

    fn user_target(args: &ArgBag) -> String {
        if args.is_truthy(keys::USER) {
            let name = args
                .get_string(keys::USER_OVERRIDE_NAME)
                .or_else(host::current_user_name);
            if let Some(name) = name {
                return format!("/home/{name}/.gitconfig");
            }
        }
        "/root/.gitconfig".to_string()
    }
}

impl Extension for Git {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        let system = args
            .get_string(Self::SYSTEM_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::SYSTEM_TARGET));

        let mut mounts = Vec::new();
        if system.exists() {
            mounts.push(read_only_mount(&system, Self::SYSTEM_TARGET));
        }
        if let Some(user) = Self::user_config(args)
            && user.exists()
        {
            mounts.push(read_only_mount(&user, &Self::user_target(args)));
        }
        Ok(mounts.join(" "))
    }
}

fn read_only_mount(host: &Path, target: &str) -> String {
    format!("-v {}", shell_quote(&format!("{}:{target}:ro", host.display())))
}

// =============================================================================
// X11
// =============================================================================

/// X server passthrough through a shared xauth cookie file.
#[derive(Debug, Default)]
pub struct X11;

impl X11 {
    pub const NAME: &'static str = "x11";
}

impl Extension for X11 {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(format!(
            "-e DISPLAY -e TERM -e QT_X11_NO_MITSHM=1 \
             -e XAUTHORITY={XAUTH_PATH} -v {XAUTH_PATH}:{XAUTH_PATH} \
             -v /tmp/.X11-unix:/tmp/.X11-unix \
             -v /etc/localtime:/etc/localtime:ro"
        ))
    }

    /// Creates the cookie file and merges the current display's cookie
    /// into it with wildcard family.
    fn precondition(&self, _args: &ArgBag) -> Result<()> {
        let fail = |reason: String| Error::Precondition {
            extension: Self::NAME.to_string(),
            reason,
        };

        let display = std::env::var("DISPLAY")
            .ok()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| fail("DISPLAY is not set".to_string()))?;

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(XAUTH_PATH)
            .map_err(|e| fail(format!("cannot create {XAUTH_PATH}: {e}")))?;

        let script = format!(
            "xauth nlist {} | sed -e 's/^..../ffff/' | xauth -f {XAUTH_PATH} nmerge -",
            shell_quote(&display)
        );
        debug!(command = %script, "Preparing X authority");
        let status = Command::new("sh")
            .arg("-c")
            .arg(&script)
            .status()
            .map_err(|e| fail(format!("failed to run xauth: {e}")))?;
        if !status.success() {
            return Err(fail(format!(
                "failed setting up XAuthority with command: {script}"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// PulseAudio
// =============================================================================

/// PulseAudio passthrough: the user's pulse socket, `/dev/snd` and the host
/// `audio` group.
#[derive(Debug, Default)]
pub struct Pulse;

impl Pulse {
    pub const NAME: &'static str = "pulse";
    const AUDIO_GROUP: &'static str = "audio";
}

/// Host facts the pulse fragments are rendered from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseHost {
    pub uid: u32,
    /// `$XDG_RUNTIME_DIR`.
    pub runtime_dir: String,
    /// Gid of the host `audio` group.
    pub audio_gid: u32,
}

impl PulseHost {
    /// Reads the invoking user, `$XDG_RUNTIME_DIR` and the `audio` group.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InvalidArgument`] when any of them is
    /// missing.
    pub fn detect() -> ExtensionResult<Self> {
        let fail = |reason: &str| ExtensionError::invalid_argument(Pulse::NAME, reason);
        let uid = HostUser::current()
            .map(|u| u.uid)
            .ok_or_else(|| fail("cannot determine the host user"))?;
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .ok()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| fail("XDG_RUNTIME_DIR is not set"))?;
        let audio_gid = host::group_by_name(Pulse::AUDIO_GROUP)
            .map(|g| g.gid)
            .ok_or_else(|| fail("the host has no 'audio' group"))?;
        Ok(Self {
            uid,
            runtime_dir,
            audio_gid,
        })
    }

    /// Client configuration pointing at the mounted socket.
    pub fn root_snippet(&self) -> String {
        format!(
            "RUN mkdir -p /etc/pulse \\\n \
             && printf '%s\\n' \\\n    \
             'default-server = unix:/run/user/{uid}/pulse/native' \\\n    \
             'autospawn = no' \\\n    \
             'daemon-binary = /bin/true' \\\n    \
             'enable-shm = false' \\\n    \
             > /etc/pulse/client.conf\n",
            uid = self.uid
        )
    }

    pub fn launch_fragment(&self) -> String {
        let user_pulse = format!("/run/user/{}/pulse", self.uid);
        let native = format!("{}/pulse/native", self.runtime_dir);
        format!(
            "-v {} --device /dev/snd -e {} -v {} --group-add {}",
            shell_quote(&format!("{user_pulse}:{user_pulse}")),
            shell_quote(&format!("PULSE_SERVER=unix:{native}")),
            shell_quote(&format!("{native}:{native}")),
            self.audio_gid
        )
    }
}

impl Extension for Pulse {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn root_snippet(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(PulseHost::detect()?.root_snippet())
    }

    fn launch_args(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(PulseHost::detect()?.launch_fragment())
    }
}

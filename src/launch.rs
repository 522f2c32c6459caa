//! Launch command construction.
//!
//! The command is kept as a structured argv and only serialized for
//! display. Extension fragments are opaque text and are split with POSIX
//! shell word rules when the argv is built, so a fragment such as
//! `-v '/a b':/c` yields two words.

use tracing::debug;

use crate::args::ArgBag;
use crate::constants::keys;
use crate::error::{Error, Result};
use crate::mode::OperatingMode;
use crate::resolver::ActiveSet;

/// Fully built launch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    argv: Vec<String>,
}

impl LaunchCommand {
    /// Wraps an argv.
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// Program and arguments.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Executable.
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }

    pub fn into_argv(self) -> Vec<String> {
        self.argv
    }
}

impl std::fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let quoted: Vec<String> = self.argv.iter().map(|a| shell_quote(a)).collect();
        f.write_str(&quoted.join(" "))
    }
}

/// Quotes a word for display in a POSIX shell.
///
/// Words made only of safe characters are left alone.
pub fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | ',' | '+' | '@' | '%')
        });
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Splits text with shell word rules.
///
/// # Errors
///
/// Returns [`Error::InvalidLaunchArgs`] on unbalanced quotes.
pub fn split_words(origin: &str, text: &str) -> Result<Vec<String>> {
    shlex::split(text).ok_or_else(|| Error::InvalidLaunchArgs {
        origin: origin.to_string(),
        reason: format!("unbalanced quoting in '{}'", text.trim()),
    })
}

/// Collects every active extension's launch fragment as argv words, in
/// execution order.
///
/// # Errors
///
/// Propagates fragment failures and quoting errors.
pub fn collect_launch_args(active: &ActiveSet, args: &ArgBag) -> Result<Vec<String>> {
    let mut words = Vec::new();
    for ext in active.iter() {
        let fragment = ext.launch_args(args)?;
        let split = split_words(&format!("extension '{}'", ext.name()), &fragment)?;
        debug!(extension = %ext.name(), words = split.len(), "Collected launch arguments");
        words.extend(split);
    }
    Ok(words)
}

/// Builds `<program> run [--rm] [-it] <extension args...> <image> <command...>`.
///
/// `--rm` is omitted when `nocleanup` is set; `-it` is added for every mode
/// that allocates a TTY. The `image_name` override, when set, replaces
/// `image`.
///
/// # Errors
///
/// Returns [`Error::InvalidLaunchArgs`] if `command` has unbalanced quotes.
pub fn build_launch_command(
    program: &str,
    extension_args: &[String],
    args: &ArgBag,
    mode: OperatingMode,
    image: &str,
    command: &str,
) -> Result<LaunchCommand> {
    let mut argv = vec![program.to_string(), "run".to_string()];

    if !args.is_truthy(keys::NOCLEANUP) {
        argv.push("--rm".to_string());
    }
    if mode.allocates_tty() {
        argv.push("-it".to_string());
    }
    argv.extend_from_slice(extension_args);

    let image = args
        .get_string(keys::IMAGE_NAME)
        .unwrap_or_else(|| image.to_string());
    argv.push(image);
    argv.extend(split_words("command", command)?);

    Ok(LaunchCommand { argv })
}

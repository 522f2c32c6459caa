//! Host directory mounts: `--volume` and `--mount`.
//!
//! Both take `HOST[:CONTAINER[:OPTIONS]]`. The host path is made absolute
//! against the current directory; a missing container path mirrors the
//! host path.

use std::path::{Path, PathBuf};

use super::repeat_flag;
use crate::args::ArgBag;
use crate::extension::{Extension, ExtensionError, ExtensionResult};

/// Parsed `HOST[:CONTAINER[:OPTIONS]]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    pub host: PathBuf,
    pub container: String,
    pub options: Option<String>,
}

impl MountSpec {
    /// Parses a mount spec on behalf of extension `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InvalidArgument`] for an empty host path
    /// or more than three fields.
    pub fn parse(owner: &str, spec: &str) -> ExtensionResult<Self> {
        let fields: Vec<&str> = spec.split(':').collect();
        if fields.len() > 3 || fields[0].is_empty() {
            return Err(ExtensionError::invalid_argument(
                owner,
                format!("'{spec}' is not in the form HOST-DIR[:CONTAINER-DIR[:OPTIONS]]"),
            ));
        }

        let host = absolutize(Path::new(fields[0]));
        let container = match fields.get(1) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => host.display().to_string(),
        };
        let options = fields
            .get(2)
            .filter(|o| !o.is_empty())
            .map(|o| o.to_string());

        Ok(Self {
            host,
            container,
            options,
        })
    }

    /// Value for `-v`.
    pub fn to_volume_arg(&self) -> String {
        let mut out = format!("{}:{}", self.host.display(), self.container);
        if let Some(options) = &self.options {
            out.push(':');
            out.push_str(options);
        }
        out
    }
}

fn absolutize(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    // Lexical only; symlinks are not resolved.
    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other),
        }
    }
    out
}

fn mount_args(owner: &str, args: &ArgBag) -> ExtensionResult<String> {
    let specs = args
        .get_string_list(owner)
        .iter()
        .map(|spec| MountSpec::parse(owner, spec).map(|m| m.to_volume_arg()))
        .collect::<ExtensionResult<Vec<_>>>()?;
    Ok(repeat_flag("-v", &specs))
}

/// `--volume HOST[:CONTAINER[:OPTIONS]]...`.
#[derive(Debug, Default)]
pub struct Volume;

impl Volume {
    pub const NAME: &'static str = "volume";
}

impl Extension for Volume {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        mount_args(Self::NAME, args)
    }
}

/// `--mount HOST[:CONTAINER[:OPTIONS]]...`.
#[derive(Debug, Default)]
pub struct Mount;

impl Mount {
    pub const NAME: &'static str = "mount";
}

impl Extension for Mount {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        mount_args(Self::NAME, args)
    }
}

//! `--bashrc-extensions`: local shell snippets sourced from the container
//! user's `.bashrc`.
//!
//! Each file is copied into the build context under `bashrc_extensions/`
//! and then into `~/.bashrc.d/` of the account the image runs as, in the
//! order given.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::args::ArgBag;
use crate::constants::keys;
use crate::extension::{Extension, ExtensionError, ExtensionResult};
use crate::host::HostUser;
use crate::recipe::{FileContent, validate_user_name};

/// Sources host files from the container bashrc.
#[derive(Debug, Default)]
pub struct BashrcExtensions;

impl BashrcExtensions {
    pub const NAME: &'static str = "bashrc_extensions";

    /// `(host path, file name)` per requested file, in request order.
    fn sources(args: &ArgBag) -> ExtensionResult<Vec<(String, String)>> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for source in args.get_string_list(Self::NAME) {
            let path = Path::new(&source);
            if !path.is_file() {
                return Err(ExtensionError::invalid_argument(
                    Self::NAME,
                    format!("'{source}' is not a file"),
                ));
            }
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| is_plain_file_name(n))
                .ok_or_else(|| {
                    ExtensionError::invalid_argument(
                        Self::NAME,
                        format!("'{source}' has an unsupported file name"),
                    )
                })?;
            if !seen.insert(file_name.clone()) {
                return Err(ExtensionError::invalid_argument(
                    Self::NAME,
                    format!("more than one file is named '{file_name}'"),
                ));
            }
            out.push((source, file_name));
        }
        Ok(out)
    }

    /// Home directory of the account user snippets run as.
    ///
    /// Mirrors the `user` extension: the override gets `/home/<name>`, the
    /// host account keeps its own home, and without a user switch it is
    /// root's.
    fn home_dir(args: &ArgBag) -> ExtensionResult<String> {
        if !args.is_truthy(keys::USER) {
            return Ok("/root".to_string());
        }
        if let Some(name) = args.get_string(keys::USER_OVERRIDE_NAME) {
            validate_user_name(Self::NAME, &name)?;
            return Ok(format!("/home/{name}"));
        }
        Ok(HostUser::current()
            .map(|host| host.home.display().to_string())
            .unwrap_or_else(|| "/root".to_string()))
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl Extension for BashrcExtensions {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn files(&self, args: &ArgBag) -> ExtensionResult<BTreeMap<String, FileContent>> {
        let mut files = BTreeMap::new();
        for (source, file_name) in Self::sources(args)? {
            let content = std::fs::read(&source).map_err(|e| {
                ExtensionError::invalid_argument(Self::NAME, format!("cannot read '{source}': {e}"))
            })?;
            files.insert(format!("{}/{file_name}", Self::NAME), FileContent::Bytes(content));
        }
        Ok(files)
    }

    fn user_snippet(&self, args: &ArgBag) -> ExtensionResult<String> {
        let sources = Self::sources(args)?;
        if sources.is_empty() {
            return Ok(String::new());
        }
        let home = Self::home_dir(args)?;
        if !home.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-')) {
            return Err(ExtensionError::invalid_argument(
                Self::NAME,
                format!("unsupported home directory '{home}'"),
            ));
        }

        let mut out = format!("RUN mkdir -p {home}/.bashrc.d\n");
        for (_, file_name) in &sources {
            out.push_str(&format!(
                "COPY {}/{file_name} {home}/.bashrc.d/{file_name}\n",
                Self::NAME
            ));
        }
        let lines = sources
            .iter()
            .map(|(_, file_name)| {
                format!("    && echo 'source {home}/.bashrc.d/{file_name}' >> {home}/.bashrc")
            })
            .collect::<Vec<_>>()
            .join(" \\\n");
        out.push_str(&format!("RUN true \\\n{lines}\n"));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_file_name() {
        assert!(is_plain_file_name("aliases.sh"));
        assert!(is_plain_file_name("ros-env"));
        assert!(!is_plain_file_name(".bashrc"));
        assert!(!is_plain_file_name("my file"));
        assert!(!is_plain_file_name(""));
    }

    #[test]
    fn test_home_dir_without_user_is_root() {
        assert_eq!(BashrcExtensions::home_dir(&ArgBag::new()).unwrap(), "/root");
    }

    #[test]
    fn test_home_dir_with_override() {
        let args = ArgBag::new()
            .with("user", true)
            .with("user_override_name", "builder");
        assert_eq!(BashrcExtensions::home_dir(&args).unwrap(), "/home/builder");
    }
}

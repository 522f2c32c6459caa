//! Recipe assembly.
//!
//! Concatenates the contributions of the active extensions into one
//! Dockerfile and a map of auxiliary files:
//!
//! ```text
//! # Preamble from extension [a]        ┐ per extension, in order
//! ...                                  ┘
//! FROM <base image>
//! USER root
//! # Snippet from extension [a]         ┐ per extension, in order
//! ...                                  ┘
//! USER <name>                            only when the user feature is on
//! # User Snippet from extension [a]    ┐ per extension, in order
//! ...                                  ┘
//! ```
//!
//! Assembly is a pure function: identical inputs yield byte-identical output.

use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::args::ArgBag;
use crate::constants::{MAX_USER_NAME_LEN, USER_NAME_PATTERN, builtin_regex, keys};
use crate::extension::{ExtensionError, ExtensionResult};
use crate::host;
use crate::resolver::ActiveSet;

/// Content of an auxiliary build-context file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    Text(String),
    Bytes(Vec<u8>),
}

impl FileContent {
    /// Raw bytes as written to disk.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(s) => s.as_bytes(),
            Self::Bytes(b) => b,
        }
    }
}

impl From<String> for FileContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FileContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// An assembled recipe and its auxiliary files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipe {
    /// Dockerfile text.
    pub dockerfile: String,
    /// Relative path -> content. Only validated paths are present.
    pub files: BTreeMap<String, FileContent>,
}

/// Assembles the Dockerfile and file map.
///
/// # Errors
///
/// Propagates the first fragment producer failure.
pub fn assemble(active: &ActiveSet, args: &ArgBag, base_image: &str) -> ExtensionResult<Recipe> {
    Ok(Recipe {
        dockerfile: generate_dockerfile(active, args, base_image)?,
        files: collect_files(active, args)?,
    })
}

/// Builds the Dockerfile text.
///
/// # Errors
///
/// Propagates the first fragment producer failure.
pub fn generate_dockerfile(
    active: &ActiveSet,
    args: &ArgBag,
    base_image: &str,
) -> ExtensionResult<String> {
    let mut out = String::new();

    for ext in active.iter() {
        out.push_str(&format!("# Preamble from extension [{}]\n", ext.name()));
        out.push_str(&ext.preamble(args)?);
        out.push('\n');
    }

    out.push_str(&format!("\nFROM {base_image}\n"));
    out.push_str("USER root\n");

    for ext in active.iter() {
        out.push_str(&format!("# Snippet from extension [{}]\n", ext.name()));
        out.push_str(&ext.root_snippet(args)?);
        out.push('\n');
    }

    if let Some(user) = resolve_user_name(args)? {
        out.push_str(&format!("USER {user}\n"));
    }

    for ext in active.iter() {
        out.push_str(&format!("# User Snippet from extension [{}]\n", ext.name()));
        out.push_str(&ext.user_snippet(args)?);
        out.push('\n');
    }

    Ok(out)
}

/// Name for the user switch directive, or `None` when the user feature is
/// off.
///
/// A truthy `user_override_name` wins over the invoking host user. If the
/// host user cannot be determined no switch is emitted.
///
/// # Errors
///
/// Returns [`ExtensionError::InvalidArgument`] when the override is not a
/// valid user name.
pub fn resolve_user_name(args: &ArgBag) -> ExtensionResult<Option<String>> {
    if !args.is_truthy(keys::USER) {
        return Ok(None);
    }
    if let Some(name) = args.get_string(keys::USER_OVERRIDE_NAME) {
        validate_user_name(keys::USER, &name)?;
        return Ok(Some(name));
    }
    let name = host::current_user_name();
    if name.is_none() {
        warn!("user feature is on but the host user is unknown, skipping USER switch");
    }
    Ok(name)
}

static USER_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| builtin_regex("USER_NAME_PATTERN", USER_NAME_PATTERN));

/// Checks a container user name against the portable charset.
///
/// The name ends up in `USER` directives and shell commands, so anything
/// outside `[A-Za-z0-9._-]` is refused.
///
/// # Errors
///
/// Returns [`ExtensionError::InvalidArgument`] naming `owner`.
pub fn validate_user_name(owner: &str, name: &str) -> ExtensionResult<()> {
    let valid = name.len() <= MAX_USER_NAME_LEN
        && USER_NAME.as_ref().is_some_and(|re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(ExtensionError::invalid_argument(
            owner,
            format!("{name:?} is not a valid user name"),
        ))
    }
}

/// Unions every extension's files, dropping unsafe paths.
///
/// Later extensions win on identical paths. Each rejected path produces one
/// warning and is never written.
///
/// # Errors
///
/// Propagates the first fragment producer failure.
pub fn collect_files(
    active: &ActiveSet,
    args: &ArgBag,
) -> ExtensionResult<BTreeMap<String, FileContent>> {
    let mut files = BTreeMap::new();
    for ext in active.iter() {
        for (path, content) in ext.files(args)? {
            if is_safe_relative_path(&path) {
                files.insert(path, content);
            } else {
                warn!(
                    extension = %ext.name(),
                    path = %path,
                    "Rejecting auxiliary file outside the build context"
                );
            }
        }
    }
    Ok(files)
}

/// Whether `path` stays inside the context root.
///
/// Lexical check: the path must be non-empty and relative, and `..` may
/// never climb above the root (`a/../b` is fine, `a/../../b` is not).
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') {
        return false;
    }
    let mut depth: usize = 0;
    let mut has_normal = false;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) => {
                depth += 1;
                has_normal = true;
            }
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    has_normal && depth > 0
}

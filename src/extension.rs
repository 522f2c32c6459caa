//! # Extension Framework
//!
//! An extension is a named unit that contributes fragments to the build
//! recipe and to the launch command. Extensions are registered statically
//! in an [`ExtensionRegistry`] as `name -> factory`; the resolver creates
//! one fresh instance per active name for a single build and run cycle.
//!
//! Every contribution is a pure function of the [`ArgBag`]. Fragment
//! producers may fail (for example on a malformed `--volume` value), which
//! aborts the invocation before any build activity.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use tracing::debug;

use crate::args::ArgBag;
use crate::constants::MAX_EXTENSION_NAME_LEN;
use crate::recipe::FileContent;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Error type for extension resolution and fragment generation.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// A blacklisted extension was requested or required.
    #[error("extension '{0}' is blacklisted")]
    Blacklisted(String),

    /// No extension with this name is registered.
    #[error("extension '{0}' not found")]
    NotFound(String),

    /// Strict selection is on and a required extension was not requested.
    #[error(
        "extension '{name}' requires missing extension(s) [{}] and strict extension selection is enabled",
        .missing.join(", ")
    )]
    MissingRequired { name: String, missing: Vec<String> },

    /// The ordering constraints among active extensions form a cycle.
    #[error("cyclic dependency among extensions [{}]", .pending.join(", "))]
    CyclicDependency { pending: Vec<String> },

    /// Extension with this name already registered.
    #[error("extension '{0}' already registered")]
    AlreadyRegistered(String),

    /// Extension name exceeds maximum length.
    #[error("extension name exceeds max length of {MAX_EXTENSION_NAME_LEN}")]
    NameTooLong,

    /// Extension name is empty or has characters outside `[a-z0-9_]`.
    #[error("invalid extension name '{0}'")]
    InvalidName(String),

    /// An extension rejected its arguments.
    #[error("invalid arguments for extension '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },
}

/// Result type for extension operations.
pub type ExtensionResult<T> = Result<T, ExtensionError>;

impl ExtensionError {
    /// Shorthand for [`ExtensionError::InvalidArgument`].
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// EXTENSION TRAIT
// ============================================================================

/// Capability contract every extension implements.
///
/// All methods but [`name`](Extension::name) have empty defaults, so an
/// extension only overrides what it contributes.
///
/// # Implementation Notes
///
/// - Extensions MUST be `Send + Sync`.
/// - Fragment methods MUST be deterministic for a given bag.
/// - Host side effects belong in [`precondition`](Extension::precondition),
///   which runs only when the image is about to be launched.
pub trait Extension: Send + Sync {
    /// Extension name (unique registry key).
    fn name(&self) -> &str;

    /// Names this extension must be ordered after, when they are active.
    fn invoke_after(&self, args: &ArgBag) -> BTreeSet<String> {
        let _ = args;
        BTreeSet::new()
    }

    /// Names that must be active whenever this extension is.
    fn required(&self, args: &ArgBag) -> BTreeSet<String> {
        let _ = args;
        BTreeSet::new()
    }

    /// Text placed before the `FROM` line (multi-stage build stages).
    fn preamble(&self, args: &ArgBag) -> ExtensionResult<String> {
        let _ = args;
        Ok(String::new())
    }

    /// Recipe text run as root.
    fn root_snippet(&self, args: &ArgBag) -> ExtensionResult<String> {
        let _ = args;
        Ok(String::new())
    }

    /// Recipe text run after the user switch.
    fn user_snippet(&self, args: &ArgBag) -> ExtensionResult<String> {
        let _ = args;
        Ok(String::new())
    }

    /// Launch command fragment, split with shell word rules.
    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        let _ = args;
        Ok(String::new())
    }

    /// Auxiliary files for the build context, keyed by relative path.
    fn files(&self, args: &ArgBag) -> ExtensionResult<BTreeMap<String, FileContent>> {
        let _ = args;
        Ok(BTreeMap::new())
    }

    /// Host-side setup run right before launch.
    ///
    /// # Errors
    ///
    /// Implementations return [`crate::Error::Precondition`] naming
    /// themselves.
    fn precondition(&self, args: &ArgBag) -> crate::Result<()> {
        let _ = args;
        Ok(())
    }
}

impl std::fmt::Debug for dyn Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Extension").field("name", &self.name()).finish()
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

type Factory = Box<dyn Fn() -> Box<dyn Extension> + Send + Sync>;
type Activation = Box<dyn Fn(&ArgBag) -> bool + Send + Sync>;

struct RegistryEntry {
    factory: Factory,
    activation: Activation,
}

/// Static table of available extensions.
///
/// Activation is a property of the entry, not the instance: it is evaluated
/// before anything is instantiated.
#[derive(Default)]
pub struct ExtensionRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("names", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory activated when the bag holds a truthy value
    /// under the extension's own name.
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or already registered.
    pub fn register<F>(&mut self, name: &str, factory: F) -> ExtensionResult<()>
    where
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        let key = name.to_string();
        self.register_with(name, move |args: &ArgBag| args.is_truthy(&key), factory)
    }

    /// Registers a factory with a custom activation predicate.
    ///
    /// # Errors
    ///
    /// Returns error if the name is invalid or already registered.
    pub fn register_with<A, F>(&mut self, name: &str, activation: A, factory: F) -> ExtensionResult<()>
    where
        A: Fn(&ArgBag) -> bool + Send + Sync + 'static,
        F: Fn() -> Box<dyn Extension> + Send + Sync + 'static,
    {
        validate_name(name)?;
        if self.entries.contains_key(name) {
            return Err(ExtensionError::AlreadyRegistered(name.to_string()));
        }

        debug!(extension = %name, "Registered extension");
        self.entries.insert(
            name.to_string(),
            RegistryEntry {
                factory: Box::new(factory),
                activation: Box::new(activation),
            },
        );
        Ok(())
    }

    /// Whether a name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Evaluates the activation predicate of a registered name.
    pub fn is_active(&self, name: &str, args: &ArgBag) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| (entry.activation)(args))
    }

    /// Names whose activation predicate holds for `args`.
    pub fn active_names(&self, args: &ArgBag) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| (entry.activation)(args))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Creates a fresh instance, or `None` for an unknown name.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn Extension>> {
        self.entries.get(name).map(|entry| (entry.factory)())
    }
}

fn validate_name(name: &str) -> ExtensionResult<()> {
    if name.len() > MAX_EXTENSION_NAME_LEN {
        return Err(ExtensionError::NameTooLong);
    }
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(ExtensionError::InvalidName(name.to_string()));
    }
    Ok(())
}

//! Extension resolution: requirement closure and execution order.
//!
//! ```text
//!   registry + args
//!         │  activation predicates
//!         ▼
//!   work queue ──pop──► blacklist / lookup ──► instantiate ──► required()
//!         ▲                                                      │
//!         └───────────── enqueue missing (non-strict) ◄──────────┘
//!         │
//!         ▼ fixed point
//!   invoke_after() ∩ active ──► Kahn sort (name order) ──► ActiveSet
//! ```
//!
//! Every failure surfaces here, before any build or run activity.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::args::ArgBag;
use crate::constants::keys;
use crate::extension::{Extension, ExtensionError, ExtensionRegistry, ExtensionResult};

/// Resolution switches, usually decoded from the bag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Names that must never become active.
    pub blacklist: BTreeSet<String>,
    /// Fail instead of implicitly adding required extensions.
    pub strict: bool,
}

impl ResolveOptions {
    /// Reads `extension_blacklist` and `strict_extension_selection`.
    pub fn from_args(args: &ArgBag) -> Self {
        Self {
            blacklist: args
                .get_string_list(keys::EXTENSION_BLACKLIST)
                .into_iter()
                .collect(),
            strict: args.is_truthy(keys::STRICT_EXTENSION_SELECTION),
        }
    }
}

/// Ordered, duplicate-free sequence of extension instances.
#[derive(Debug, Default)]
pub struct ActiveSet {
    extensions: Vec<Box<dyn Extension>>,
}

impl ActiveSet {
    /// Wraps instances already in a valid order.
    pub fn from_ordered(extensions: Vec<Box<dyn Extension>>) -> Self {
        Self { extensions }
    }

    /// Names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    /// Whether an extension with this name is active.
    pub fn contains(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e.name() == name)
    }

    /// Iterates instances in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Extension> {
        self.extensions.iter().map(|e| e.as_ref())
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Computes the active set for `args`.
///
/// # Errors
///
/// - [`ExtensionError::Blacklisted`] if an activated or required name is blacklisted
/// - [`ExtensionError::NotFound`] if a required name is not registered
/// - [`ExtensionError::MissingRequired`] in strict mode
/// - [`ExtensionError::CyclicDependency`] if ordering is impossible
pub fn resolve(
    registry: &ExtensionRegistry,
    args: &ArgBag,
    options: &ResolveOptions,
) -> ExtensionResult<ActiveSet> {
    let mut queue: BTreeSet<String> = registry.active_names(args);
    let mut active: BTreeMap<String, Box<dyn Extension>> = BTreeMap::new();

    while let Some(name) = queue.pop_first() {
        if options.blacklist.contains(&name) {
            return Err(ExtensionError::Blacklisted(name));
        }
        let extension = registry
            .instantiate(&name)
            .ok_or_else(|| ExtensionError::NotFound(name.clone()))?;

        let missing: Vec<String> = extension
            .required(args)
            .into_iter()
            .filter(|r| *r != name && !active.contains_key(r) && !queue.contains(r))
            .collect();

        if !missing.is_empty() {
            if options.strict {
                return Err(ExtensionError::MissingRequired { name, missing });
            }
            info!(
                extension = %name,
                added = %missing.join(", "),
                "Adding implicitly required extensions"
            );
            queue.extend(missing);
        }

        debug!(extension = %name, "Activated extension");
        active.insert(name, extension);
    }

    let graph: BTreeMap<String, BTreeSet<String>> = active
        .iter()
        .map(|(name, ext)| {
            let deps = ext
                .invoke_after(args)
                .into_iter()
                .filter(|d| d != name && active.contains_key(d))
                .collect();
            (name.clone(), deps)
        })
        .collect();

    let order = topological_sort(&graph)?;
    let extensions = order
        .into_iter()
        .filter_map(|name| active.remove(&name))
        .collect();

    Ok(ActiveSet { extensions })
}

/// Kahn-style sort: each pass emits every node whose dependencies are all
/// emitted, in name order, then removes them.
///
/// Dependencies not present as nodes are ignored.
///
/// # Errors
///
/// Returns [`ExtensionError::CyclicDependency`] with the sorted names left
/// over when a pass emits nothing.
pub fn topological_sort(graph: &BTreeMap<String, BTreeSet<String>>) -> ExtensionResult<Vec<String>> {
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = graph
        .iter()
        .map(|(name, deps)| {
            let deps = deps
                .iter()
                .map(String::as_str)
                .filter(|d| graph.contains_key(*d))
                .collect();
            (name.as_str(), deps)
        })
        .collect();
    let mut order = Vec::with_capacity(graph.len());

    while !pending.is_empty() {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();

        if ready.is_empty() {
            return Err(ExtensionError::CyclicDependency {
                pending: pending.keys().map(|n| n.to_string()).collect(),
            });
        }

        for name in &ready {
            pending.remove(name);
        }
        for deps in pending.values_mut() {
            for name in &ready {
                deps.remove(name);
            }
        }
        order.extend(ready.into_iter().map(str::to_string));
    }

    Ok(order)
}

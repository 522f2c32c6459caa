//! The argument bag: a flat `option name -> JSON value` map.
//!
//! The front end flattens parsed command-line options into an [`ArgBag`];
//! the resolver, the assembler and every extension read it. Values keep
//! their dynamic shape (a `--volume` option may hold a list of lists), and
//! truthiness follows loose scripting rules so that "unset", "false", "0",
//! "empty string" and "empty list" all mean off.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::keys;
use crate::error::{Error, Result};
use crate::mode::OperatingMode;

/// Returns true when a value counts as "set".
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Immutable-by-convention option map shared with extensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgBag(BTreeMap<String, Value>);

impl ArgBag {
    /// Creates an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Raw value lookup.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the key is present at all, even with a falsy value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether the key is present with a truthy value.
    pub fn is_truthy(&self, key: &str) -> bool {
        self.0.get(key).is_some_and(truthy)
    }

    /// String value, if the key holds a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Scalar value rendered as text, ignoring falsy values.
    ///
    /// Numbers and booleans are formatted, so `{"cpus": 1.5}` and
    /// `{"cpus": "1.5"}` read the same.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            v if !truthy(v) => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// List of strings under `key`, flattening nested lists.
    ///
    /// Options that may be repeated and take several values each arrive as
    /// lists of lists; a single string is treated as a one-element list.
    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(value) = self.0.get(key) {
            flatten_strings(value, &mut out);
        }
        out
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn flatten_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => {
            for item in items {
                flatten_strings(item, out);
            }
        }
        _ => {}
    }
}

impl TryFrom<Value> for ArgBag {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map.into_iter().collect())),
            other => Err(Error::Serialization(format!(
                "argument bag must be a JSON object, got {other}"
            ))),
        }
    }
}

impl From<BTreeMap<String, Value>> for ArgBag {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for ArgBag {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// =============================================================================
// Core Options
// =============================================================================

/// The well-known keys the core itself reads, decoded once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreOptions {
    /// Extensions that must never be activated.
    pub extension_blacklist: Vec<String>,
    /// Fail instead of implicitly adding required extensions.
    pub strict_extension_selection: bool,
    /// Explicitly requested mode, if any.
    pub mode: Option<OperatingMode>,
    /// Tag for the built image and launch override.
    pub image_name: Option<String>,
    pub nocleanup: bool,
    pub nocache: bool,
    pub pull: bool,
    pub persist_image: bool,
    pub detach: bool,
    pub user: bool,
}

impl CoreOptions {
    /// Decodes the core keys from a bag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMode`] if `mode` names no known mode.
    pub fn from_args(args: &ArgBag) -> Result<Self> {
        let mode = match args.get_string(keys::MODE) {
            Some(name) => Some(name.parse()?),
            None => None,
        };
        Ok(Self {
            extension_blacklist: args.get_string_list(keys::EXTENSION_BLACKLIST),
            strict_extension_selection: args.is_truthy(keys::STRICT_EXTENSION_SELECTION),
            mode,
            image_name: args.get_string(keys::IMAGE_NAME),
            nocleanup: args.is_truthy(keys::NOCLEANUP),
            nocache: args.is_truthy(keys::NOCACHE),
            pull: args.is_truthy(keys::PULL),
            persist_image: args.is_truthy(keys::PERSIST_IMAGE),
            detach: args.is_truthy(keys::DETACH),
            user: args.is_truthy(keys::USER),
        })
    }
}

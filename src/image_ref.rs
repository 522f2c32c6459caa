//! Image reference tagging.
//!
//! Parses a simplified Docker image reference
//! (`[host[:port]/]components[:tag]`) so that a derived tag can be built
//! from a base image name, e.g. `ubuntu:22.04` with prefix `dockhand-`
//! becomes `ubuntu:dockhand-22.04`.

use std::sync::LazyLock;

use regex::Regex;

use crate::constants::{DEFAULT_TAG, IMAGE_REFERENCE_PATTERN, MAX_IMAGE_REF_LEN, builtin_regex};
use crate::error::{Error, Result};

static IMAGE_REFERENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| builtin_regex("IMAGE_REFERENCE_PATTERN", IMAGE_REFERENCE_PATTERN));

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, if present.
    pub hostname: Option<String>,
    /// Registry port, if present.
    pub port: Option<String>,
    /// Repository path.
    pub components: String,
    /// Tag, if present.
    pub tag: Option<String>,
}

impl ImageReference {
    /// Parses a reference.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImageReference`] if `reference` is too long
    /// or does not match the reference grammar.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidImageReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };
        if reference.len() > MAX_IMAGE_REF_LEN {
            return Err(invalid("reference too long"));
        }
        let re = IMAGE_REFERENCE
            .as_ref()
            .ok_or_else(|| invalid("reference grammar unavailable"))?;
        let caps = re
            .captures(reference)
            .ok_or_else(|| invalid("not a valid Docker image reference"))?;
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        Ok(Self {
            hostname: group("hostname"),
            port: group("port"),
            components: group("components").unwrap_or_default(),
            tag: group("tag"),
        })
    }

    /// `[host[:port]/]components` without the tag.
    pub fn repository(&self) -> String {
        let mut out = String::new();
        if let Some(host) = &self.hostname {
            out.push_str(host);
            if let Some(port) = &self.port {
                out.push(':');
                out.push_str(port);
            }
            out.push('/');
        }
        out.push_str(&self.components);
        out
    }
}

/// Returns `name` re-tagged as `<repository>:<prefix><tag><suffix>`.
///
/// A missing tag counts as `latest`.
///
/// # Errors
///
/// Returns [`Error::InvalidImageReference`] for an invalid `name`.
pub fn tag_image_name(name: &str, prefix: Option<&str>, suffix: Option<&str>) -> Result<String> {
    let parsed = ImageReference::parse(name)?;
    let tag = parsed.tag.as_deref().unwrap_or(DEFAULT_TAG);
    Ok(format!(
        "{}:{}{}{}",
        parsed.repository(),
        prefix.unwrap_or_default(),
        tag,
        suffix.unwrap_or_default()
    ))
}

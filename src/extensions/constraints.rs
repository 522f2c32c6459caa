//! Resource constraints: shared memory, CPUs and memory.

use std::sync::LazyLock;

use regex::Regex;

use super::single_flag;
use crate::args::ArgBag;
use crate::constants::{MEMORY_FORMAT_PATTERN, builtin_regex};
use crate::extension::{Extension, ExtensionError, ExtensionResult};

static MEMORY_FORMAT: LazyLock<Option<Regex>> =
    LazyLock::new(|| builtin_regex("MEMORY_FORMAT_PATTERN", MEMORY_FORMAT_PATTERN));

/// Checks a memory size such as `512m` or `2g`.
///
/// # Errors
///
/// Returns [`ExtensionError::InvalidArgument`] naming `owner`.
pub fn validate_memory_format(owner: &str, value: &str) -> ExtensionResult<()> {
    let valid = MEMORY_FORMAT
        .as_ref()
        .is_some_and(|re| re.is_match(value));
    if valid {
        Ok(())
    } else {
        Err(ExtensionError::invalid_argument(
            owner,
            format!("'{value}' is not a memory size (e.g. 512m, 2g)"),
        ))
    }
}

/// `--shm-size <size>`.
#[derive(Debug, Default)]
pub struct ShmSize;

impl ShmSize {
    pub const NAME: &'static str = "shm_size";
}

impl Extension for ShmSize {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        if let Some(size) = args.get_string(Self::NAME) {
            validate_memory_format(Self::NAME, &size)?;
        }
        Ok(single_flag(args, "--shm-size", Self::NAME))
    }
}

/// `--cpus <n>`, activated by the `cpus` key.
#[derive(Debug, Default)]
pub struct CpuLimits;

impl CpuLimits {
    pub const NAME: &'static str = "cpu_limits";
    pub const KEY: &'static str = "cpus";

    pub fn is_active(args: &ArgBag) -> bool {
        args.is_truthy(Self::KEY)
    }
}

impl Extension for CpuLimits {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        if let Some(cpus) = args.get_string(Self::KEY)
            && cpus.parse::<f64>().map_or(true, |n| !n.is_finite() || n <= 0.0)
        {
            return Err(ExtensionError::invalid_argument(
                Self::NAME,
                format!("'{cpus}' is not a positive number of CPUs (e.g. 1.5)"),
            ));
        }
        Ok(single_flag(args, "--cpus", Self::KEY))
    }
}

/// `--memory <size>`, activated by the `memory` key.
#[derive(Debug, Default)]
pub struct MemoryLimits;

impl MemoryLimits {
    pub const NAME: &'static str = "memory_limits";
    pub const KEY: &'static str = "memory";

    pub fn is_active(args: &ArgBag) -> bool {
        args.is_truthy(Self::KEY)
    }
}

impl Extension for MemoryLimits {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        if let Some(memory) = args.get_string(Self::KEY) {
            validate_memory_format(Self::NAME, &memory)?;
        }
        Ok(single_flag(args, "--memory", Self::KEY))
    }
}

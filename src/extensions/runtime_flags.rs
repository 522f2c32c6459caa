//! Extensions that only add flags to the launch command.

use std::path::Path;

use tracing::warn;

use super::{repeat_flag, single_flag};
use crate::args::ArgBag;
use crate::extension::{Extension, ExtensionResult};

/// `--detach`.
#[derive(Debug, Default)]
pub struct Detach;

impl Detach {
    pub const NAME: &'static str = "detach";
}

impl Extension for Detach {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok("--detach".to_string())
    }
}

/// `--device <path>` for every listed device present on the host.
#[derive(Debug, Default)]
pub struct Devices;

impl Devices {
    pub const NAME: &'static str = "devices";
}

impl Extension for Devices {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        let present: Vec<String> = args
            .get_string_list(Self::NAME)
            .into_iter()
            .filter(|device| {
                let exists = Path::new(device).exists();
                if !exists {
                    warn!(device = %device, "Device does not exist, skipping");
                }
                exists
            })
            .collect();
        Ok(repeat_flag("--device", &present))
    }
}

/// `--name <name>`.
#[derive(Debug, Default)]
pub struct Name;

impl Name {
    pub const NAME: &'static str = "name";
}

impl Extension for Name {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        Ok(single_flag(args, "--name", Self::NAME))
    }
}

/// `--network <network>`.
#[derive(Debug, Default)]
pub struct Network;

impl Network {
    pub const NAME: &'static str = "network";
}

impl Extension for Network {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        Ok(single_flag(args, "--network", Self::NAME))
    }
}

/// `--expose <port>` for each port.
#[derive(Debug, Default)]
pub struct Expose;

impl Expose {
    pub const NAME: &'static str = "expose";
}

impl Extension for Expose {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        Ok(repeat_flag("--expose", &args.get_string_list(Self::NAME)))
    }
}

/// `-p <mapping>` for each mapping.
#[derive(Debug, Default)]
pub struct Port;

impl Port {
    pub const NAME: &'static str = "port";
}

impl Extension for Port {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        Ok(repeat_flag("-p", &args.get_string_list(Self::NAME)))
    }
}

/// `--privileged`.
#[derive(Debug, Default)]
pub struct Privileged;

impl Privileged {
    pub const NAME: &'static str = "privileged";
}

impl Extension for Privileged {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok("--privileged".to_string())
    }
}

/// `--group-add <group>` for each group.
#[derive(Debug, Default)]
pub struct GroupAdd;

impl GroupAdd {
    pub const NAME: &'static str = "group_add";
}

impl Extension for GroupAdd {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        Ok(repeat_flag("--group-add", &args.get_string_list(Self::NAME)))
    }
}

/// `-e NAME[=VALUE]` and `--env-file <path>`.
#[derive(Debug, Default)]
pub struct Environment;

impl Environment {
    pub const NAME: &'static str = "env";
    pub const ENV_FILE: &'static str = "env_file";

    /// Active when either `env` or `env_file` is set.
    pub fn is_active(args: &ArgBag) -> bool {
        args.is_truthy(Self::NAME) || args.is_truthy(Self::ENV_FILE)
    }
}

impl Extension for Environment {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        let parts = [
            repeat_flag("-e", &args.get_string_list(Self::NAME)),
            repeat_flag("--env-file", &args.get_string_list(Self::ENV_FILE)),
        ];
        Ok(parts
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(" "))
    }
}

/// `--ulimit <type>=<soft>[:<hard>]` for each limit.
#[derive(Debug, Default)]
pub struct Ulimit;

impl Ulimit {
    pub const NAME: &'static str = "ulimit";
}

impl Extension for Ulimit {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, args: &ArgBag) -> ExtensionResult<String> {
        let limits = args.get_string_list(Self::NAME);
        for limit in &limits {
            validate_ulimit(limit)?;
        }
        Ok(repeat_flag("--ulimit", &limits))
    }
}

fn validate_ulimit(limit: &str) -> ExtensionResult<()> {
    let invalid = || {
        crate::extension::ExtensionError::invalid_argument(
            Ulimit::NAME,
            format!("'{limit}' is not in the form TYPE=SOFT[:HARD]"),
        )
    };
    let (kind, values) = limit.split_once('=').ok_or_else(invalid)?;
    if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(invalid());
    }
    let numeric = |s: &str| !s.is_empty() && (s == "-1" || s.chars().all(|c| c.is_ascii_digit()));
    let valid = match values.split_once(':') {
        Some((soft, hard)) => numeric(soft) && numeric(hard),
        None => numeric(values),
    };
    if valid { Ok(()) } else { Err(invalid()) }
}

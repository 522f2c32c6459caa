//! Built-in extensions.
//!
//! | Module | Extensions |
//! |--------|-----------|
//! | [`runtime_flags`] | `detach`, `devices`, `name`, `network`, `expose`, `port`, `privileged`, `group_add`, `env`, `ulimit` |
//! | [`user`] | `user`, `home` |
//! | [`mounts`] | `volume`, `mount` |
//! | [`host_config`] | `ssh`, `git`, `x11`, `pulse` |
//! | [`constraints`] | `shm_size`, `cpu_limits`, `memory_limits` |
//! | [`packages`] | `install_pkgs`, `dev_helpers` |
//! | [`bashrc`] | `bashrc_extensions` |
//!
//! Each extension is activated by a truthy bag value under its own name
//! unless its registration says otherwise.

pub mod bashrc;
pub mod constraints;
pub mod host_config;
pub mod mounts;
pub mod packages;
pub mod runtime_flags;
pub mod user;

use crate::args::ArgBag;
use crate::extension::{Extension, ExtensionRegistry, ExtensionResult};
use crate::launch::shell_quote;

pub use bashrc::BashrcExtensions;
pub use constraints::{CpuLimits, MemoryLimits, ShmSize, validate_memory_format};
pub use host_config::{Git, Pulse, PulseHost, Ssh, X11};
pub use mounts::{Mount, MountSpec, Volume};
pub use packages::{DevHelpers, InstallPkgs};
pub use runtime_flags::{
    Detach, Devices, Environment, Expose, GroupAdd, Name, Network, Port, Privileged, Ulimit,
};
pub use user::{HomeDir, User};

/// Command-line flag for an extension or option name (`group_add` -> `--group-add`).
pub fn name_to_argument(name: &str) -> String {
    format!("--{}", name.replace('_', "-"))
}

/// Registry holding every built-in extension.
///
/// # Errors
///
/// Returns error only if two built-ins share a name.
pub fn builtin_registry() -> ExtensionResult<ExtensionRegistry> {
    let mut registry = ExtensionRegistry::new();
    register_builtins(&mut registry)?;
    Ok(registry)
}

/// Adds every built-in extension to `registry`.
///
/// # Errors
///
/// Returns error if a built-in name is already registered.
pub fn register_builtins(registry: &mut ExtensionRegistry) -> ExtensionResult<()> {
    fn boxed<T: Extension + Default + 'static>() -> Box<dyn Extension> {
        Box::new(T::default())
    }

    registry.register(Detach::NAME, boxed::<Detach>)?;
    registry.register(Devices::NAME, boxed::<Devices>)?;
    registry.register(Name::NAME, boxed::<Name>)?;
    registry.register(Network::NAME, boxed::<Network>)?;
    registry.register(Expose::NAME, boxed::<Expose>)?;
    registry.register(Port::NAME, boxed::<Port>)?;
    registry.register(Privileged::NAME, boxed::<Privileged>)?;
    registry.register(GroupAdd::NAME, boxed::<GroupAdd>)?;
    registry.register_with(Environment::NAME, Environment::is_active, boxed::<Environment>)?;
    registry.register(Ulimit::NAME, boxed::<Ulimit>)?;

    registry.register(User::NAME, boxed::<User>)?;
    registry.register(HomeDir::NAME, boxed::<HomeDir>)?;

    registry.register(Volume::NAME, boxed::<Volume>)?;
    registry.register(Mount::NAME, boxed::<Mount>)?;

    registry.register(Ssh::NAME, boxed::<Ssh>)?;
    registry.register(Git::NAME, boxed::<Git>)?;
    registry.register(X11::NAME, boxed::<X11>)?;
    registry.register(Pulse::NAME, boxed::<Pulse>)?;

    registry.register(ShmSize::NAME, boxed::<ShmSize>)?;
    registry.register_with(CpuLimits::NAME, CpuLimits::is_active, boxed::<CpuLimits>)?;
    registry.register_with(MemoryLimits::NAME, MemoryLimits::is_active, boxed::<MemoryLimits>)?;

    registry.register(InstallPkgs::NAME, boxed::<InstallPkgs>)?;
    registry.register(DevHelpers::NAME, boxed::<DevHelpers>)?;
    registry.register(BashrcExtensions::NAME, boxed::<BashrcExtensions>)?;
    Ok(())
}

/// `<flag> <value>` for every value, quoted, space separated.
pub(crate) fn repeat_flag(flag: &str, values: &[String]) -> String {
    values
        .iter()
        .map(|v| format!("{flag} {}", shell_quote(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `<flag> <value>` when `key` holds a value, else empty.
pub(crate) fn single_flag(args: &ArgBag, flag: &str, key: &str) -> String {
    args.get_string(key)
        .map(|v| format!("{flag} {}", shell_quote(&v)))
        .unwrap_or_default()
}

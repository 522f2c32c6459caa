//! Extra apt packages installed as root: `--install-pkgs` and the
//! `--dev-helpers` tool set.

use std::collections::BTreeSet;

use crate::args::ArgBag;
use crate::extension::{Extension, ExtensionError, ExtensionResult};

/// Installs the sorted, deduplicated package set.
#[derive(Debug, Default)]
pub struct InstallPkgs;

impl InstallPkgs {
    pub const NAME: &'static str = "install_pkgs";
}

/// Tools installed by [`DevHelpers`].
pub const DEV_HELPER_PACKAGES: &[&str] = &["byobu", "emacs"];

fn is_package_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | ':' | '=' | '~'))
}

impl Extension for InstallPkgs {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn root_snippet(&self, args: &ArgBag) -> ExtensionResult<String> {
        let packages: BTreeSet<String> = args.get_string_list(Self::NAME).into_iter().collect();
        if let Some(bad) = packages.iter().find(|p| !is_package_name(p)) {
            return Err(ExtensionError::invalid_argument(
                Self::NAME,
                format!("'{bad}' is not a valid package name"),
            ));
        }
        if packages.is_empty() {
            return Ok(String::new());
        }

        Ok(apt_install(packages))
    }
}

/// Adds the development helpers byobu and emacs.
#[derive(Debug, Default)]
pub struct DevHelpers;

impl DevHelpers {
    pub const NAME: &'static str = "dev_helpers";
}

impl Extension for DevHelpers {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn root_snippet(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(apt_install(DEV_HELPER_PACKAGES.iter().map(|p| p.to_string()).collect()))
    }
}

fn apt_install(packages: BTreeSet<String>) -> String {
    let list = packages.into_iter().collect::<Vec<_>>().join(" \\\n    ");
    format!(
        "RUN apt-get update \\\n \
         && DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends \\\n    \
         {list} \\\n \
         && apt-get clean \\\n \
         && rm -rf /var/lib/apt/lists/*\n"
    )
}

//! Mirror the host user inside the container.
//!
//! `user` creates an account matching the invoking user's uid, gid, name,
//! home directory and shell, so files written to mounted host directories
//! keep their ownership. `home` mounts the host home directory at the same
//! path.
//!
//! With `user_preserve_groups` the account also joins host groups: `true`
//! (or an empty list) selects every group listing the host user as a
//! member, a list selects groups by name. Group creation failures abort the
//! build unless `user_preserve_groups_permissive` is set.

use serde_json::Value;
use tracing::warn;

use crate::args::ArgBag;
use crate::constants::keys;
use crate::extension::{Extension, ExtensionError, ExtensionResult};
use crate::host::{self, HostGroup, HostUser};
use crate::launch::shell_quote;
use crate::recipe::validate_user_name;

const USER_PRESERVE_HOME: &str = "user_preserve_home";
const USER_OVERRIDE_SHELL: &str = "user_override_shell";
const USER_PRESERVE_GROUPS: &str = "user_preserve_groups";
const USER_PRESERVE_GROUPS_PERMISSIVE: &str = "user_preserve_groups_permissive";

/// Account the root snippet creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerAccount {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub home: String,
    /// `None` leaves the image default shell.
    pub shell: Option<String>,
    /// Skip home directory creation (the host home is mounted over it).
    pub preserve_home: bool,
    /// Supplementary groups to recreate and join.
    pub groups: Vec<HostGroup>,
    /// Ignore failures while joining `groups`.
    pub groups_permissive: bool,
}

impl ContainerAccount {
    /// Derives the account from the host user and the bag overrides.
    ///
    /// `groups` starts empty; see [`preserved_groups`].
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::InvalidArgument`] for an invalid
    /// `user_override_name`.
    pub fn from_host(host: &HostUser, args: &ArgBag) -> ExtensionResult<Self> {
        let (name, home) = match args.get_string(keys::USER_OVERRIDE_NAME) {
            Some(name) => {
                validate_user_name(User::NAME, &name)?;
                let home = format!("/home/{name}");
                (name, home)
            }
            None => (host.name.clone(), host.home.display().to_string()),
        };

        let shell = match args.get(USER_OVERRIDE_SHELL).and_then(|v| v.as_str()) {
            Some("") => None,
            Some(shell) => Some(shell.to_string()),
            None => Some(host.shell.clone()).filter(|s| !s.is_empty()),
        };

        Ok(Self {
            name,
            uid: host.uid,
            gid: host.gid,
            gecos: host.gecos.replace(['"', '\\', '`', '$'], ""),
            home,
            shell,
            preserve_home: args.is_truthy(USER_PRESERVE_HOME) || args.is_truthy(HomeDir::NAME),
            groups: Vec::new(),
            groups_permissive: args.is_truthy(USER_PRESERVE_GROUPS_PERMISSIVE),
        })
    }

    /// `&& ...` steps adding the account to each preserved group.
    fn group_steps(&self) -> String {
        let user = shell_quote(&self.name);
        self.groups
            .iter()
            .map(|group| {
                let join = format!(
                    "{{ getent group {gid} >/dev/null || groupadd -g {gid} {name}; }} \\\n    \
                     && usermod -aG \"$(getent group {gid} | cut -f1 -d:)\" {user}",
                    gid = group.gid,
                    name = shell_quote(&group.name),
                );
                if self.groups_permissive {
                    format!(" \\\n && ( {join} || true )")
                } else {
                    format!(" \\\n && {join}")
                }
            })
            .collect()
    }

    /// Dockerfile steps creating the account.
    pub fn snippet(&self) -> String {
        let mut useradd = format!(
            "useradd --no-log-init --no-create-home --uid {uid} --gid {gid} -d {home}",
            uid = self.uid,
            gid = self.gid,
            home = shell_quote(&self.home),
        );
        if !self.gecos.is_empty() {
            useradd.push_str(&format!(" -c \"{}\"", self.gecos));
        }
        if let Some(shell) = &self.shell {
            useradd.push_str(&format!(" -s {}", shell_quote(shell)));
        }
        useradd.push_str(&format!(" {}", shell_quote(&self.name)));

        let mut out = String::new();
        out.push_str(
            "RUN if ! command -v sudo >/dev/null 2>&1; then \\\n    \
             apt-get update && apt-get install -y sudo && apt-get clean; \\\n  \
             fi\n",
        );
        out.push_str(&format!(
            "RUN existing_user_by_uid=$(getent passwd {uid} | cut -f1 -d: || true) \\\n \
             && if [ -n \"$existing_user_by_uid\" ]; then userdel -r \"$existing_user_by_uid\" || true; fi \\\n \
             && existing_user_by_name=$(getent passwd {name} | cut -f1 -d: || true) \\\n \
             && if [ -n \"$existing_user_by_name\" ]; then userdel -r \"$existing_user_by_name\" || true; fi \\\n \
             && existing_group_by_gid=$(getent group {gid} | cut -f1 -d: || true) \\\n \
             && if [ -z \"$existing_group_by_gid\" ]; then groupadd -g {gid} {name}; fi \\\n \
             && {useradd}{groups} \\\n \
             && echo \"{raw_name} ALL=NOPASSWD: ALL\" >> /etc/sudoers.d/dockhand\n",
            uid = self.uid,
            gid = self.gid,
            name = shell_quote(&self.name),
            groups = self.group_steps(),
            raw_name = self.name,
        ));
        if !self.preserve_home {
            out.push_str(&format!(
                "RUN mkdir -p {home} && chown {uid}:{gid} {home}\n",
                home = shell_quote(&self.home),
                uid = self.uid,
                gid = self.gid,
            ));
        }
        out
    }
}

/// Creates a container user matching the host user.
#[derive(Debug, Default)]
pub struct User;

impl User {
    pub const NAME: &'static str = "user";
}

impl Extension for User {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn root_snippet(&self, args: &ArgBag) -> ExtensionResult<String> {
        let host = HostUser::current().ok_or_else(|| {
            ExtensionError::invalid_argument(Self::NAME, "cannot determine the host user")
        })?;
        let mut account = ContainerAccount::from_host(&host, args)?;
        account.groups = preserved_groups(&host.name, args, &host::groups());
        Ok(account.snippet())
    }
}

/// Host groups selected by `user_preserve_groups` for `user`.
///
/// Requested names with no host group are skipped with a warning.
pub fn preserved_groups(user: &str, args: &ArgBag, host_groups: &[HostGroup]) -> Vec<HostGroup> {
    match args.get(USER_PRESERVE_GROUPS) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Vec::new(),
        _ => {}
    }

    let requested: Vec<String> = args
        .get_string_list(USER_PRESERVE_GROUPS)
        .into_iter()
        .filter(|n| !n.is_empty())
        .collect();
    if requested.is_empty() {
        return host_groups
            .iter()
            .filter(|g| g.members.iter().any(|m| m == user))
            .cloned()
            .collect();
    }

    let unmatched: Vec<&str> = requested
        .iter()
        .filter(|n| !host_groups.iter().any(|g| &g.name == *n))
        .map(String::as_str)
        .collect();
    if !unmatched.is_empty() {
        warn!(groups = %unmatched.join(", "), "Skipping groups that do not exist on the host");
    }
    host_groups
        .iter()
        .filter(|g| requested.contains(&g.name))
        .cloned()
        .collect()
}

/// Mounts the host home directory at the same path.
#[derive(Debug, Default)]
pub struct HomeDir;

impl HomeDir {
    pub const NAME: &'static str = "home";
}

impl Extension for HomeDir {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn launch_args(&self, _args: &ArgBag) -> ExtensionResult<String> {
        let home = host::home_dir().ok_or_else(|| {
            ExtensionError::invalid_argument(Self::NAME, "cannot determine the home directory")
        })?;
        let home = home.display().to_string();
        Ok(format!("-v {}", shell_quote(&format!("{home}:{home}"))))
    }
}

//! Host detection: invoking user and terminal capabilities.
//!
//! Extensions that mirror the host into the container (user creation, home
//! and git config mounts) and the mode resolution read these.

use std::io::IsTerminal;
use std::path::PathBuf;

/// The invoking host user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostUser {
    /// Login name.
    pub name: String,
    /// Numeric user id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
    /// Full name (first GECOS field), possibly empty.
    pub gecos: String,
    /// Home directory.
    pub home: PathBuf,
    /// Login shell, possibly empty.
    pub shell: String,
}

impl HostUser {
    /// Looks up the current effective user.
    ///
    /// Returns `None` when the password database has no entry.
    #[cfg(unix)]
    pub fn current() -> Option<Self> {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let uid = unsafe { libc::geteuid() };
        lookup_passwd(uid)
    }

    #[cfg(not(unix))]
    pub fn current() -> Option<Self> {
        let name = std::env::var("USERNAME").ok()?;
        Some(Self {
            name,
            uid: 0,
            gid: 0,
            gecos: String::new(),
            home: dirs::home_dir()?,
            shell: String::new(),
        })
    }
}

/// Name of the invoking user, falling back to `$USER`.
pub fn current_user_name() -> Option<String> {
    HostUser::current()
        .map(|u| u.name)
        .or_else(|| std::env::var("USER").ok())
        .filter(|n| !n.is_empty())
}

/// Home directory of the invoking user.
pub fn home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

/// Whether stdin is attached to a terminal.
pub fn has_terminal() -> bool {
    std::io::stdin().is_terminal()
}

/// Whether stdout is attached to a terminal.
pub fn stdout_is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

// =============================================================================
// Groups
// =============================================================================

/// A host group database entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostGroup {
    pub name: String,
    pub gid: u32,
    /// Supplementary members by login name.
    pub members: Vec<String>,
}

/// Every entry of the host group database, in database order.
#[cfg(unix)]
pub fn groups() -> Vec<HostGroup> {
    use std::ffi::CStr;
    use std::sync::Mutex;

    static GROUP_DB: Mutex<()> = Mutex::new(());
    let _db = GROUP_DB.lock().unwrap_or_else(|e| e.into_inner());

    let text = |ptr: *const libc::c_char| -> String {
        if ptr.is_null() {
            String::new()
        } else {
            // SAFETY: group entries hold NUL-terminated strings.
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        }
    };

    let mut out = Vec::new();
    // SAFETY: the getgrent family is not reentrant. GROUP_DB serializes
    // callers and every entry is copied out before the next getgrent call.
    unsafe {
        libc::setgrent();
        loop {
            let entry = libc::getgrent();
            if entry.is_null() {
                break;
            }
            let entry = &*entry;
            let mut members = Vec::new();
            let mut cursor = entry.gr_mem;
            while !cursor.is_null() && !(*cursor).is_null() {
                members.push(text(*cursor));
                cursor = cursor.add(1);
            }
            out.push(HostGroup {
                name: text(entry.gr_name),
                gid: entry.gr_gid,
                members,
            });
        }
        libc::endgrent();
    }
    out
}

#[cfg(not(unix))]
pub fn groups() -> Vec<HostGroup> {
    Vec::new()
}

/// Host group named `name`.
pub fn group_by_name(name: &str) -> Option<HostGroup> {
    groups().into_iter().find(|g| g.name == name)
}

#[cfg(unix)]
fn lookup_passwd(uid: libc::uid_t) -> Option<HostUser> {
    use std::ffi::CStr;

    const INITIAL_BUF: usize = 1024;
    const MAX_BUF: usize = 1 << 20;

    let mut buf: Vec<libc::c_char> = vec![0; INITIAL_BUF];
    // SAFETY: passwd is plain old data; an all-zero value is valid.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    loop {
        // SAFETY: every pointer refers to live, correctly sized storage.
        let rc = unsafe {
            libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        if rc == libc::ERANGE && buf.len() < MAX_BUF {
            buf.resize(buf.len() * 2, 0);
            continue;
        }
        if rc != 0 || result.is_null() {
            return None;
        }
        break;
    }

    let field = |ptr: *const libc::c_char| -> String {
        if ptr.is_null() {
            String::new()
        } else {
            // SAFETY: getpwuid_r filled pwd with NUL-terminated strings in buf.
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        }
    };

    let gecos = field(pwd.pw_gecos);
    Some(HostUser {
        name: field(pwd.pw_name),
        uid: pwd.pw_uid,
        gid: pwd.pw_gid,
        gecos: gecos.split(',').next().unwrap_or_default().to_string(),
        home: PathBuf::from(field(pwd.pw_dir)),
        shell: field(pwd.pw_shell),
    })
}

//! # Dockhand Constants
//!
//! File names, exit codes, output markers, and well-known argument keys.
//! These constants are the **single source of truth** for values shared
//! between the resolver, the recipe assembler, the engine client, and the
//! command-line front end.
//!
//! ## Modification Guidelines
//!
//! Exit codes and argument keys are part of the observable interface:
//! scripts wrap `dockhand` and branch on its exit status, and extensions
//! read the argument bag by key. Changing any of them is a breaking change.
//!
//! ## Cross-References
//!
//! - [`crate::context`]: Uses the recipe file name
//! - [`crate::engine`]: Uses the success markers and engine binary settings
//! - [`crate::generator`]: Uses exit codes and argument keys
//! - [`crate::extensions`]: Uses argument keys and validation patterns

// =============================================================================
// Build Context
// =============================================================================

/// File name of the recipe inside the build context.
pub const RECIPE_FILE_NAME: &str = "Dockerfile";

/// Prefix of the ephemeral build context directory.
pub const BUILD_CONTEXT_PREFIX: &str = "dockhand-build-";

// =============================================================================
// Image References
// =============================================================================

/// Tag assumed when an image reference carries none.
pub const DEFAULT_TAG: &str = "latest";

// =============================================================================
// Container Engine
// =============================================================================

/// Default container engine executable.
pub const DEFAULT_ENGINE_BINARY: &str = "docker";

/// Environment variable overriding the engine executable.
pub const ENGINE_BINARY_ENV: &str = "DOCKHAND_DOCKER";

/// Legacy builder success line. Capture group 1 is the short image id.
pub const LEGACY_SUCCESS_PATTERN: &str = r"Successfully built ([a-z0-9]{12})";

/// BuildKit success line. Capture group 1 is the full image digest.
pub const BUILDKIT_SUCCESS_PATTERN: &str = r"writing image sha256:([a-f0-9]{12,64})";

/// Prefix applied to every build output line echoed to the user.
pub const BUILD_OUTPUT_PREFIX: &str = "building > ";

/// Marker line printed before the recipe echo.
pub const RECIPE_ECHO_BEGIN: &str = "vvvvvv";

/// Marker line printed after the recipe echo.
pub const RECIPE_ECHO_END: &str = "^^^^^^";

// =============================================================================
// Exit Codes
// =============================================================================
//
// Scripts wrapping dockhand rely on these. A child's own exit code is
// propagated unchanged and may collide with 1 or 2; the distinct codes only
// matter when no child ran.
// =============================================================================

/// Success.
pub const EXIT_SUCCESS: i32 = 0;

/// Build engine error, run before build, precondition or configuration failure.
pub const EXIT_FAILURE: i32 = 1;

/// Build output ended without a success marker.
pub const EXIT_BUILD_UNCONFIRMED: i32 = 2;

/// Launch command could not be spawned.
pub const EXIT_SPAWN_FAILED: i32 = 127;

/// Offset added to a terminating signal number, as shells report it.
pub const EXIT_SIGNAL_OFFSET: i32 = 128;

// =============================================================================
// Validation
// =============================================================================

/// Maximum length of an extension name.
pub const MAX_EXTENSION_NAME_LEN: usize = 64;

/// Maximum image reference length in bytes.
///
/// Registries reject longer references anyway; the bound keeps the tag
/// parser from chewing on garbage input.
pub const MAX_IMAGE_REF_LEN: usize = 512;

/// Accepted memory size format for `--memory` and `--shm-size`.
pub const MEMORY_FORMAT_PATTERN: &str = r"^\d+(b|kb|mb|gb|k|m|g|K|M|G)?$";

/// Simplified image reference grammar: `[host[:port]/]components[:tag]`.
pub const IMAGE_REFERENCE_PATTERN: &str = concat!(
    r"^(?:(?P<hostname>(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9])",
    r"(?:\.(?:[a-zA-Z0-9]|[a-zA-Z0-9][a-zA-Z0-9-]*[a-zA-Z0-9]))+)(?::(?P<port>[0-9]+))?/)?",
    r"(?P<components>[a-zA-Z0-9_.-]+(?:/[a-zA-Z0-9_.-]+)*)",
    r"(?::(?P<tag>[a-zA-Z0-9.-]+))?$",
);

/// Container user names: POSIX portable characters, no leading hyphen.
pub const USER_NAME_PATTERN: &str = r"^[A-Za-z0-9._][A-Za-z0-9._-]*$";

/// Maximum container user name length (`useradd` limit).
pub const MAX_USER_NAME_LEN: usize = 32;

/// Location of the X authority cookie shared with the container.
pub const XAUTH_PATH: &str = "/tmp/.docker.xauth";

// =============================================================================
// Argument Keys
// =============================================================================

/// Well-known argument bag keys read by the core.
///
/// Everything else in the bag is passed through to extensions untouched.
pub mod keys {
    /// Base image, injected by the orchestrator.
    pub const BASE_IMAGE: &str = "base_image";
    /// Extensions that must never be activated.
    pub const EXTENSION_BLACKLIST: &str = "extension_blacklist";
    /// Fail instead of implicitly adding required extensions.
    pub const STRICT_EXTENSION_SELECTION: &str = "strict_extension_selection";
    /// Requested operating mode.
    pub const MODE: &str = "mode";
    /// Tag for the built image; also overrides the image in the launch command.
    pub const IMAGE_NAME: &str = "image_name";
    /// Keep the container after it exits (omit `--rm`).
    pub const NOCLEANUP: &str = "nocleanup";
    /// Build without the engine's layer cache.
    pub const NOCACHE: &str = "nocache";
    /// Always pull the base image during build.
    pub const PULL: &str = "pull";
    /// Keep the built image after run.
    pub const PERSIST_IMAGE: &str = "persist_image";
    /// The user feature switch.
    pub const USER: &str = "user";
    /// Container user name override.
    pub const USER_OVERRIDE_NAME: &str = "user_override_name";
    /// The detach feature switch.
    pub const DETACH: &str = "detach";
}

// =============================================================================
// Pattern Compilation
// =============================================================================

/// Compiles one of the patterns above.
///
/// A pattern that fails to compile is logged and treated as matching
/// nothing; `constants_tests` keeps every pattern compiling.
pub(crate) fn builtin_regex(name: &str, pattern: &str) -> Option<regex::Regex> {
    regex::Regex::new(pattern)
        .inspect_err(|e| tracing::error!(pattern = name, error = %e, "Built-in pattern does not compile"))
        .ok()
}

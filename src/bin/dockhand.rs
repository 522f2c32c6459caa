//! dockhand - compose extensions into an image and launch it.
//!
//! ## Usage
//!
//! ```sh
//! dockhand [OPTIONS] <IMAGE> [COMMAND]...
//! dockhand --user --home --x11 ubuntu:22.04 bash
//! dockhand --mode dry-run --volume ./src:/src -- ubuntu:22.04 make
//! dockhand --list-extensions
//! ```
//!
//! Options taking several values (`--volume`, `--env`, ...) must be
//! terminated with `--` when followed by the image.
//!
//! ## Flow
//!
//! 1. Parse options and flatten them into the argument bag
//! 2. Resolve the operating mode against the terminal and `--detach`
//! 3. Resolve active extensions
//! 4. Build the image, then run the command
//! 5. Remove the image unless `--persist-image` or `--image-name` was given

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dockhand::constants::{EXIT_FAILURE, EXIT_SUCCESS, keys};
use dockhand::launch::shell_quote;
use dockhand::{
    ArgBag, CoreOptions, DockerCli, ImageGenerator, OperatingMode, ResolveOptions,
    builtin_registry, host, name_to_argument, resolve, resolve_mode,
};

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug, Parser, Serialize)]
#[command(
    name = "dockhand",
    version,
    about = "Compose container-build extensions into one image and launch it"
)]
struct Cli {
    /// Base image to build on.
    #[arg(required_unless_present = "list_extensions")]
    image: Option<String>,

    /// Command to run in the container.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    #[serde(skip)]
    command: Vec<String>,

    /// Launch mode.
    #[arg(long, value_parser = ["interactive", "non-interactive", "dry-run"])]
    mode: Option<String>,

    /// Tag for the built image; also used in the launch command.
    #[arg(long)]
    image_name: Option<String>,

    /// Extensions that must never be activated.
    #[arg(long, num_args = 1..)]
    extension_blacklist: Vec<String>,

    /// Fail instead of implicitly adding required extensions.
    #[arg(long)]
    strict_extension_selection: bool,

    /// Build without the layer cache.
    #[arg(long)]
    nocache: bool,

    /// Keep the container after it exits.
    #[arg(long)]
    nocleanup: bool,

    /// Keep the built image after running.
    #[arg(long)]
    persist_image: bool,

    /// Always pull the base image.
    #[arg(long)]
    pull: bool,

    /// Deprecated: use `--mode dry-run`.
    #[arg(long)]
    #[serde(skip)]
    noexecute: bool,

    /// List available extensions and exit.
    #[arg(long)]
    #[serde(skip)]
    list_extensions: bool,

    /// Verbose logging.
    #[arg(short, long)]
    #[serde(skip)]
    verbose: bool,

    // -------------------------------------------------------------------------
    // Extension options
    // -------------------------------------------------------------------------
    /// Run the container in the background.
    #[arg(long)]
    detach: bool,

    /// Host devices to pass through.
    #[arg(long, num_args = 1..)]
    devices: Vec<String>,

    /// Container name.
    #[arg(long)]
    name: Option<String>,

    /// Network to attach to.
    #[arg(long)]
    network: Option<String>,

    /// Ports to expose.
    #[arg(long)]
    expose: Vec<String>,

    /// Port mappings (HOST:CONTAINER).
    #[arg(long)]
    port: Vec<String>,

    /// Give the container extended privileges.
    #[arg(long)]
    privileged: bool,

    /// Additional groups for the container process.
    #[arg(long)]
    group_add: Vec<String>,

    /// Environment variables (NAME[=VALUE]).
    #[arg(long, short = 'e', num_args = 1..)]
    env: Vec<String>,

    /// Environment files.
    #[arg(long, num_args = 1..)]
    env_file: Vec<String>,

    /// Mount the host home directory.
    #[arg(long)]
    home: bool,

    /// Create a container user matching the host user.
    #[arg(long)]
    user: bool,

    /// Container user name.
    #[arg(long)]
    user_override_name: Option<String>,

    /// Do not create the user's home directory.
    #[arg(long)]
    user_preserve_home: bool,

    /// Container user shell; empty for the image default.
    #[arg(long)]
    user_override_shell: Option<String>,

    /// Join the host user's groups; with names, only those groups.
    #[arg(long, num_args = 0..)]
    user_preserve_groups: Option<Vec<String>>,

    /// Ignore failures while joining preserved groups.
    #[arg(long)]
    user_preserve_groups_permissive: bool,

    /// Volumes to mount (HOST-DIR[:CONTAINER-DIR[:OPTIONS]]).
    #[arg(long, num_args = 1..)]
    volume: Vec<String>,

    /// Mounts (HOST-DIR[:CONTAINER-DIR[:OPTIONS]]).
    #[arg(long, num_args = 1..)]
    mount: Vec<String>,

    /// Forward the SSH agent.
    #[arg(long)]
    ssh: bool,

    /// Use the host git configuration.
    #[arg(long)]
    git: bool,

    /// Path of the user git configuration.
    #[arg(long)]
    git_config_path: Option<String>,

    /// Enable X11 forwarding.
    #[arg(long)]
    x11: bool,

    /// Pass through the PulseAudio socket and sound devices.
    #[arg(long)]
    pulse: bool,

    /// Install development helpers (byobu, emacs).
    #[arg(long)]
    dev_helpers: bool,

    /// Files sourced from the container user's bashrc.
    #[arg(long, num_args = 1..)]
    bashrc_extensions: Vec<String>,

    /// Shared memory size (e.g. 512m).
    #[arg(long)]
    shm_size: Option<String>,

    /// CPU limit (e.g. 1.5).
    #[arg(long)]
    cpus: Option<String>,

    /// Memory limit (e.g. 2g).
    #[arg(long)]
    memory: Option<String>,

    /// Ulimits (TYPE=SOFT[:HARD]).
    #[arg(long, num_args = 1..)]
    ulimit: Vec<String>,

    /// Extra apt packages to install.
    #[arg(long, num_args = 1..)]
    install_pkgs: Vec<String>,
}

impl Cli {
    fn to_args(&self) -> dockhand::Result<ArgBag> {
        let mut args = ArgBag::try_from(serde_json::to_value(self)?)?;
        if self.noexecute {
            warn!("--noexecute is deprecated, use --mode dry-run");
            args.insert(keys::MODE, OperatingMode::DryRun.as_str());
        }
        Ok(args)
    }

    fn command_line(&self) -> String {
        self.command
            .iter()
            .map(|word| shell_quote(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Failed to set tracing subscriber");
    }

    let code = run(cli).await;
    ExitCode::from((code & 0xff) as u8)
}

async fn run(cli: Cli) -> i32 {
    let registry = match builtin_registry() {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "failed to register built-in extensions");
            return EXIT_FAILURE;
        }
    };

    if cli.list_extensions {
        for name in registry.names() {
            println!("{name:<16} {}", name_to_argument(name));
        }
        return EXIT_SUCCESS;
    }

    let Some(image) = cli.image.clone() else {
        eprintln!("ERROR! an image is required");
        return EXIT_FAILURE;
    };
    let command = cli.command_line();

    let mut args = match cli.to_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("ERROR! {e}");
            return e.exit_code();
        }
    };

    // Mode: explicit request, else interactive on a terminal unless detached.
    let has_terminal = host::has_terminal();
    let options = match CoreOptions::from_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("ERROR! {e}");
            return e.exit_code();
        }
    };
    let requested = match options.mode {
        Some(OperatingMode::Interactive) if !has_terminal => {
            eprintln!("ERROR! interactive mode requested but no terminal is attached");
            return EXIT_FAILURE;
        }
        Some(mode) => mode,
        None if has_terminal && !options.detach => OperatingMode::Interactive,
        None => OperatingMode::NonInteractive,
    };
    let mode = match resolve_mode(Some(requested), options.detach, has_terminal) {
        Ok(mode) => mode,
        Err(e) => {
            eprintln!("ERROR! {e}");
            return e.exit_code();
        }
    };
    args.insert(keys::MODE, mode.as_str());

    let active = match resolve(&registry, &args, &ResolveOptions::from_args(&args)) {
        Ok(active) => active,
        Err(e) => {
            eprintln!("ERROR! {e}");
            return EXIT_FAILURE;
        }
    };
    info!(extensions = %active.names().join(", "), "Active extensions");

    let mut generator = match ImageGenerator::new(DockerCli::new(), active, &args, &image) {
        Ok(generator) => generator.with_terminal(has_terminal),
        Err(e) => {
            eprintln!("ERROR! {e}");
            return e.exit_code();
        }
    };

    let build_code = generator.build().await;
    if build_code != EXIT_SUCCESS {
        return build_code;
    }

    let run_code = generator.run(&command).await;

    if !options.persist_image && options.image_name.is_none() {
        generator.clear_image().await;
    }
    run_code
}

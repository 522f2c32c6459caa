//! # dockhand
//!
//! **Composable Container Image Builder and Launcher**
//!
//! This crate composes independently authored *extensions* into a single
//! container image and launches it. Each extension contributes fragments of
//! a Dockerfile and of the `docker run` command; the core resolves which
//! extensions are active and in what order, assembles one recipe, builds it
//! and dispatches the launch command.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            dockhand                                 │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                   Extension Resolver                        │    │
//! │  │  activation → required() closure → invoke_after() order     │    │
//! │  │  blacklist │ strict selection │ cycle detection             │    │
//! │  └─────────────────────────────────────────────────────────────┘    │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                   Recipe Assembler                        │      │
//! │  │  preambles → FROM → USER root → snippets → USER → user    │      │
//! │  │  auxiliary files (relative paths only)                    │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! │                              │                                      │
//! │  ┌───────────────────────────┼───────────────────────────────┐      │
//! │  │                Build/Run Orchestrator                     │      │
//! │  │  Unbuilt → Built → Ran      (BuildFailed absorbing)       │      │
//! │  └───────────────────────────┼───────────────────────────────┘      │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                        Launch Modes                                 │
//! │  ┌──────────────┐  ┌────────────────┐  ┌──────────────┐             │
//! │  │ Interactive  │  │ NonInteractive │  │    DryRun    │             │
//! │  │  PTY relay   │  │  spawn + wait  │  │ print only   │             │
//! │  │  SIGWINCH    │  │  exit code     │  │  never spawn │             │
//! │  └──────────────┘  └────────────────┘  └──────────────┘             │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0    | success |
//! | 1    | engine error, run before build, precondition or config failure |
//! | 2    | build output ended without a success marker |
//! | 127  | launch command could not be spawned |
//! | n    | the child's own exit code |
//!
//! # Example
//!
//! ```rust,ignore
//! use dockhand::{ArgBag, DockerCli, ImageGenerator, ResolveOptions, builtin_registry, resolve};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> dockhand::Result<()> {
//!     let registry = builtin_registry()?;
//!     let args = ArgBag::new().with("user", true).with("mode", "dry-run");
//!     let active = resolve(&registry, &args, &ResolveOptions::from_args(&args))?;
//!
//!     let mut generator = ImageGenerator::new(DockerCli::new(), active, &args, "ubuntu:22.04")?;
//!     if generator.build().await == 0 {
//!         std::process::exit(generator.run("bash").await);
//!     }
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod constants;
pub mod context;
pub mod engine;
pub mod error;
pub mod extension;
pub mod extensions;
pub mod generator;
pub mod host;
pub mod image_ref;
pub mod launch;
pub mod mode;
pub mod recipe;
pub mod resolver;
pub mod terminal;

// Re-exports
pub use args::{ArgBag, CoreOptions};
pub use constants::*;
pub use context::BuildContext;
pub use engine::{BuildOutcome, BuildRequest, ContainerEngine, DockerCli};
pub use error::{Error, Result};
pub use extension::{Extension, ExtensionError, ExtensionRegistry, ExtensionResult};
pub use extensions::{builtin_registry, name_to_argument};
pub use generator::{BuildFailure, GeneratorState, ImageGenerator, ImageHandle};
pub use image_ref::{ImageReference, tag_image_name};
pub use launch::LaunchCommand;
pub use mode::{OperatingMode, resolve_mode};
pub use recipe::{FileContent, Recipe};
pub use resolver::{ActiveSet, ResolveOptions, resolve};

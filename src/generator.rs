//! Build and run orchestration.
//!
//! [`ImageGenerator`] owns the resolved extensions, the assembled recipe
//! and the single image it builds. Its lifecycle is a small state machine:
//!
//! ```text
//!   ┌─────────┐  build ok   ┌───────┐  run   ┌─────┐
//!   │ Unbuilt │ ──────────► │ Built │ ─────► │ Ran │
//!   └────┬────┘             └───────┘        └─────┘
//!        │ build failed
//!        ▼
//!   ┌─────────────┐
//!   │ BuildFailed │  (absorbing)
//!   └─────────────┘
//! ```
//!
//! Build is valid only from `Unbuilt`; run only from `Built`. Any other
//! call reports exit code 1 without touching the engine.

use tracing::{debug, info, warn};

use crate::args::{ArgBag, CoreOptions};
use crate::constants::{
    BUILD_OUTPUT_PREFIX, EXIT_SUCCESS, RECIPE_ECHO_BEGIN, RECIPE_ECHO_END, keys,
};
use crate::context::BuildContext;
use crate::engine::{BuildOutcome, BuildRequest, ContainerEngine};
use crate::error::{Error, Result};
use crate::host;
use crate::launch::{LaunchCommand, build_launch_command, collect_launch_args};
use crate::mode::{OperatingMode, resolve_mode};
use crate::recipe::{Recipe, assemble};
use crate::resolver::ActiveSet;
use crate::terminal;

/// Identity of a built image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHandle {
    /// Engine image id.
    pub id: String,
    /// Tag applied at build time, if any.
    pub tag: Option<String>,
}

/// Why a build did not produce an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildFailure {
    /// The engine could not run the build or reported an error.
    Engine(String),
    /// The build output ended without a success signal.
    Unconfirmed,
    /// The build context could not be written.
    Context(String),
}

impl BuildFailure {
    fn to_error(&self) -> Error {
        match self {
            Self::Engine(reason) | Self::Context(reason) => Error::BuildEngine(reason.clone()),
            Self::Unconfirmed => Error::BuildUnconfirmed,
        }
    }
}

/// Lifecycle state of an [`ImageGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorState {
    Unbuilt,
    Built { image: ImageHandle },
    BuildFailed { failure: BuildFailure },
    Ran { image: ImageHandle, exit_code: i32 },
}

impl std::fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unbuilt => write!(f, "unbuilt"),
            Self::Built { .. } => write!(f, "built"),
            Self::BuildFailed { .. } => write!(f, "build-failed"),
            Self::Ran { .. } => write!(f, "ran"),
        }
    }
}

/// Composes, builds and launches one image.
pub struct ImageGenerator<E: ContainerEngine> {
    engine: E,
    active: ActiveSet,
    args: ArgBag,
    recipe: Recipe,
    launch_args: Vec<String>,
    state: GeneratorState,
    has_terminal: Option<bool>,
}

impl<E: ContainerEngine> std::fmt::Debug for ImageGenerator<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageGenerator")
            .field("engine", &self.engine.name())
            .field("active", &self.active.names())
            .field("state", &self.state)
            .finish()
    }
}

impl<E: ContainerEngine> ImageGenerator<E> {
    /// Assembles the recipe for `base_image` and collects the launch
    /// fragments.
    ///
    /// `base_image` is injected into a private copy of `args` under
    /// `base_image` before any extension reads it. Every fragment producer
    /// runs here, so an invalid extension argument fails before the engine
    /// is touched.
    ///
    /// # Errors
    ///
    /// Propagates fragment producer failures.
    pub fn new(engine: E, active: ActiveSet, args: &ArgBag, base_image: &str) -> Result<Self> {
        let mut args = args.clone();
        args.insert(keys::BASE_IMAGE, base_image);
        let recipe = assemble(&active, &args, base_image)?;
        let launch_args = collect_launch_args(&active, &args)?;
        debug!(
            extensions = %active.names().join(", "),
            files = recipe.files.len(),
            launch_args = launch_args.len(),
            "Assembled recipe"
        );
        Ok(Self {
            engine,
            active,
            args,
            recipe,
            launch_args,
            state: GeneratorState::Unbuilt,
            has_terminal: None,
        })
    }

    /// Overrides terminal detection (defaults to checking stdin).
    pub fn with_terminal(mut self, has_terminal: bool) -> Self {
        self.has_terminal = Some(has_terminal);
        self
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn dockerfile(&self) -> &str {
        &self.recipe.dockerfile
    }

    /// Launch words contributed by the active extensions.
    pub fn launch_args(&self) -> &[String] {
        &self.launch_args
    }

    pub fn state(&self) -> &GeneratorState {
        &self.state
    }

    pub fn active(&self) -> &ActiveSet {
        &self.active
    }

    /// Arguments as seen by extensions, including `base_image`.
    pub fn args(&self) -> &ArgBag {
        &self.args
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// The built image, while one exists.
    pub fn image(&self) -> Option<&ImageHandle> {
        match &self.state {
            GeneratorState::Built { image } | GeneratorState::Ran { image, .. } => Some(image),
            _ => None,
        }
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Builds the image, passing progress text to `on_output`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the generator is unbuilt
    /// - [`Error::BuildEngine`] if the engine failed
    /// - [`Error::BuildUnconfirmed`] if success was never signalled
    pub async fn try_build(
        &mut self,
        on_output: &mut (dyn FnMut(&str) + Send),
    ) -> Result<ImageHandle> {
        if self.state != GeneratorState::Unbuilt {
            return Err(Error::InvalidState {
                state: self.state.to_string(),
                expected: GeneratorState::Unbuilt.to_string(),
            });
        }

        let options = CoreOptions::from_args(&self.args)?;
        let context = match BuildContext::materialize(&self.recipe) {
            Ok(context) => context,
            Err(e) => {
                self.state = GeneratorState::BuildFailed {
                    failure: BuildFailure::Context(e.to_string()),
                };
                return Err(e);
            }
        };

        on_output(&format!(
            "Writing dockerfile to {}",
            context.recipe_path().display()
        ));
        on_output(RECIPE_ECHO_BEGIN);
        on_output(&self.recipe.dockerfile);
        on_output(RECIPE_ECHO_END);

        let request = BuildRequest {
            context: context.path().to_path_buf(),
            no_cache: options.nocache,
            pull: options.pull,
            tag: options.image_name.clone(),
        };
        info!(engine = %self.engine.name(), context = %request.context.display(), "Building image");

        let outcome = {
            let mut forward = |line: &str| on_output(&format!("{BUILD_OUTPUT_PREFIX}{line}"));
            self.engine.build(&request, &mut forward).await
        };
        context.close();

        match outcome {
            BuildOutcome::Built { image_id } => {
                let image = ImageHandle {
                    id: image_id,
                    tag: options.image_name,
                };
                info!(image = %image.id, "Image built");
                self.state = GeneratorState::Built {
                    image: image.clone(),
                };
                Ok(image)
            }
            BuildOutcome::EngineError { reason } => {
                warn!(reason = %reason, "Build failed");
                let failure = BuildFailure::Engine(reason);
                let err = failure.to_error();
                self.state = GeneratorState::BuildFailed { failure };
                Err(err)
            }
            BuildOutcome::Unconfirmed => {
                warn!("Build output ended without a success marker");
                self.state = GeneratorState::BuildFailed {
                    failure: BuildFailure::Unconfirmed,
                };
                Err(Error::BuildUnconfirmed)
            }
        }
    }

    /// Builds the image, echoing progress to stdout.
    ///
    /// Returns 0 on success, 1 on engine error, 2 when unconfirmed.
    pub async fn build(&mut self) -> i32 {
        let mut print = |text: &str| println!("{text}");
        match self.try_build(&mut print).await {
            Ok(_) => EXIT_SUCCESS,
            Err(e) => {
                eprintln!("ERROR! {e}");
                e.exit_code()
            }
        }
    }

    // =========================================================================
    // Run
    // =========================================================================

    /// Launch command for `command` in `mode`, using the built image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotBuilt`] before a successful build, and
    /// [`Error::InvalidLaunchArgs`] if `command` has unbalanced quotes.
    pub fn launch_command(&self, command: &str, mode: OperatingMode) -> Result<LaunchCommand> {
        let image = self.image().ok_or(Error::NotBuilt)?;
        build_launch_command(
            self.engine.program(),
            &self.launch_args,
            &self.args,
            mode,
            &image.id,
            command,
        )
    }

    /// Resolves the mode and launches `command`.
    ///
    /// `requested` overrides the `mode` key of the bag. Returns the exit
    /// code to report: 0 for dry-run, otherwise the child's own code.
    ///
    /// # Errors
    ///
    /// - [`Error::NotBuilt`] / [`Error::InvalidState`] outside `Built`
    /// - [`Error::Precondition`] on the first failing precondition
    /// - [`Error::ConfigConflict`] for interactive plus detach
    /// - [`Error::Spawn`] if the command cannot be started
    pub async fn try_run(&mut self, command: &str, requested: Option<OperatingMode>) -> Result<i32> {
        let image = match &self.state {
            GeneratorState::Built { image } => image.clone(),
            GeneratorState::Ran { .. } => {
                return Err(Error::InvalidState {
                    state: self.state.to_string(),
                    expected: "built".to_string(),
                });
            }
            _ => return Err(Error::NotBuilt),
        };

        self.check_preconditions()?;

        let options = CoreOptions::from_args(&self.args)?;
        let has_terminal = self.has_terminal.unwrap_or_else(host::has_terminal);
        let mode = resolve_mode(requested.or(options.mode), options.detach, has_terminal)?;
        let launch = self.launch_command(command, mode)?;
        debug!(mode = %mode, command = %launch, "Dispatching launch command");

        let exit_code = match mode {
            OperatingMode::DryRun => {
                println!("Run this command:\n");
                println!("{launch}");
                EXIT_SUCCESS
            }
            OperatingMode::NonInteractive => {
                println!("Executing command:");
                println!("{launch}");
                self.engine.run(launch.argv()).await?
            }
            OperatingMode::Interactive => {
                info!(command = %launch, "Executing interactive command");
                let argv = launch.into_argv();
                tokio::task::spawn_blocking(move || terminal::run_attached(&argv))
                    .await
                    .map_err(|e| Error::Terminal(format!("relay task failed: {e}")))??
            }
        };

        info!(exit_code, "Run finished");
        self.state = GeneratorState::Ran { image, exit_code };
        Ok(exit_code)
    }

    /// Launches `command` in the mode named by the bag, reporting errors
    /// on stderr.
    pub async fn run(&mut self, command: &str) -> i32 {
        match self.try_run(command, None).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("ERROR! {e}");
                e.exit_code()
            }
        }
    }

    fn check_preconditions(&self) -> Result<()> {
        for ext in self.active.iter() {
            if let Err(e) = ext.precondition(&self.args) {
                let err = match e {
                    Error::Precondition { .. } => e,
                    other => Error::Precondition {
                        extension: ext.name().to_string(),
                        reason: other.to_string(),
                    },
                };
                warn!(extension = %ext.name(), error = %err, "Precondition failed");
                return Err(err);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Removes the built image from the engine.
    ///
    /// Best effort: failures are logged. Returns whether an image was
    /// removed.
    pub async fn clear_image(&mut self) -> bool {
        let Some(image) = self.image().cloned() else {
            return false;
        };
        match self.engine.remove_image(&image.id).await {
            Ok(()) => {
                info!(image = %image.id, "Removed image");
                true
            }
            Err(e) => {
                warn!(image = %image.id, error = %e, "Failed to remove image");
                false
            }
        }
    }
}

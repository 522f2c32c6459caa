//! Shared fixtures: a scripted extension and a recording fake engine.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dockhand::{
    ArgBag, BuildOutcome, BuildRequest, ContainerEngine, Error, Extension, ExtensionRegistry,
    ExtensionResult, FileContent, Result,
};

// =============================================================================
// Test Extension
// =============================================================================

/// Extension whose every contribution is fixed up front.
#[derive(Debug, Clone, Default)]
pub struct TestExtension {
    pub name: String,
    pub after: Vec<String>,
    pub required: Vec<String>,
    pub preamble: String,
    pub root: String,
    pub user: String,
    pub launch: String,
    pub files: Vec<(String, FileContent)>,
    pub precondition_error: Option<String>,
}

impl TestExtension {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn after(mut self, names: &[&str]) -> Self {
        self.after = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn requires(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn snippets(mut self, preamble: &str, root: &str, user: &str) -> Self {
        self.preamble = preamble.to_string();
        self.root = root.to_string();
        self.user = user.to_string();
        self
    }

    pub fn launch(mut self, fragment: &str) -> Self {
        self.launch = fragment.to_string();
        self
    }

    pub fn file(mut self, path: &str, content: impl Into<FileContent>) -> Self {
        self.files.push((path.to_string(), content.into()));
        self
    }

    pub fn failing_precondition(mut self, reason: &str) -> Self {
        self.precondition_error = Some(reason.to_string());
        self
    }
}

impl Extension for TestExtension {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke_after(&self, _args: &ArgBag) -> BTreeSet<String> {
        self.after.iter().cloned().collect()
    }

    fn required(&self, _args: &ArgBag) -> BTreeSet<String> {
        self.required.iter().cloned().collect()
    }

    fn preamble(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(self.preamble.clone())
    }

    fn root_snippet(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(self.root.clone())
    }

    fn user_snippet(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(self.user.clone())
    }

    fn launch_args(&self, _args: &ArgBag) -> ExtensionResult<String> {
        Ok(self.launch.clone())
    }

    fn files(&self, _args: &ArgBag) -> ExtensionResult<BTreeMap<String, FileContent>> {
        Ok(self.files.iter().cloned().collect())
    }

    fn precondition(&self, _args: &ArgBag) -> Result<()> {
        match &self.precondition_error {
            Some(reason) => Err(Error::Precondition {
                extension: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Registry holding clones of `extensions`, each activated by its name.
pub fn registry_of(extensions: &[TestExtension]) -> ExtensionRegistry {
    let mut registry = ExtensionRegistry::new();
    for ext in extensions {
        let template = ext.clone();
        registry
            .register(&ext.name, move || -> Box<dyn Extension> {
                Box::new(template.clone())
            })
            .unwrap();
    }
    registry
}

/// Bag requesting every name in `names`.
pub fn requesting(names: &[&str]) -> ArgBag {
    names
        .iter()
        .fold(ArgBag::new(), |bag, name| bag.with(*name, true))
}

// =============================================================================
// Fake Engine
// =============================================================================

/// Everything the fake engine was asked to do.
#[derive(Debug, Default)]
pub struct EngineCalls {
    pub builds: Vec<BuildRequest>,
    /// Dockerfile found in the context at build time.
    pub recipes_seen: Vec<String>,
    pub runs: Vec<Vec<String>>,
    pub removed: Vec<String>,
}

/// Engine that answers from a script and records calls.
#[derive(Debug, Clone)]
pub struct FakeEngine {
    /// Head of launch commands.
    pub program: String,
    pub outcome: BuildOutcome,
    pub output: Vec<String>,
    pub run_code: i32,
    pub spawn_fails: bool,
    pub calls: Arc<Mutex<EngineCalls>>,
}

impl FakeEngine {
    pub fn succeeding(image_id: &str) -> Self {
        Self {
            program: "docker".to_string(),
            outcome: BuildOutcome::Built {
                image_id: image_id.to_string(),
            },
            output: vec!["Step 1/1 : FROM base".to_string()],
            run_code: 0,
            spawn_fails: false,
            calls: Arc::default(),
        }
    }

    pub fn with_outcome(outcome: BuildOutcome) -> Self {
        Self {
            outcome,
            ..Self::succeeding("unused")
        }
    }

    pub fn exiting_with(mut self, code: i32) -> Self {
        self.run_code = code;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn failing_spawn(mut self) -> Self {
        self.spawn_fails = true;
        self
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, EngineCalls> {
        self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn program(&self) -> &str {
        &self.program
    }

    async fn build(
        &self,
        request: &BuildRequest,
        on_line: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> BuildOutcome {
        let recipe = std::fs::read_to_string(request.context.join("Dockerfile")).unwrap_or_default();
        {
            let mut calls = self.calls.lock().unwrap();
            calls.builds.push(request.clone());
            calls.recipes_seen.push(recipe);
        }
        for line in &self.output {
            on_line(line);
        }
        self.outcome.clone()
    }

    async fn run(&self, argv: &[String]) -> Result<i32> {
        self.calls.lock().unwrap().runs.push(argv.to_vec());
        if self.spawn_fails {
            return Err(Error::Spawn {
                program: argv[0].clone(),
                reason: "No such file or directory".to_string(),
            });
        }
        Ok(self.run_code)
    }

    async fn remove_image(&self, image_id: &str) -> Result<()> {
        self.calls.lock().unwrap().removed.push(image_id.to_string());
        Ok(())
    }

    async fn pull(&self, _reference: &str) -> Result<()> {
        Ok(())
    }
}

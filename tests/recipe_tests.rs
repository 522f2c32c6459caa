//! Tests for recipe assembly and build context materialization.

mod common;

use common::{TestExtension, registry_of, requesting};
use dockhand::{
    ActiveSet, ArgBag, BuildContext, ExtensionError, FileContent, Recipe, ResolveOptions, resolve,
};
use dockhand::recipe::{assemble, generate_dockerfile, resolve_user_name};
use pretty_assertions::assert_eq;

fn two_extensions() -> dockhand::ExtensionRegistry {
    registry_of(&[
        TestExtension::new("x")
            .after(&["y"])
            .snippets("ARG X=1", "RUN echo x-root", "RUN echo x-user"),
        TestExtension::new("y").snippets("", "RUN echo y-root", "RUN echo y-user"),
    ])
}

// =============================================================================
// Dockerfile Layout Tests
// =============================================================================

#[test]
fn test_dockerfile_layout_with_user_switch() {
    let registry = two_extensions();
    let args = requesting(&["x", "y"])
        .with("user", true)
        .with("user_override_name", "alice");
    let active = resolve(&registry, &args, &ResolveOptions::default()).unwrap();

    let dockerfile = generate_dockerfile(&active, &args, "base:tag").unwrap();

    let expected = "\
# Preamble from extension [y]

# Preamble from extension [x]
ARG X=1

FROM base:tag
USER root
# Snippet from extension [y]
RUN echo y-root
# Snippet from extension [x]
RUN echo x-root
USER alice
# User Snippet from extension [y]
RUN echo y-user
# User Snippet from extension [x]
RUN echo x-user
";
    assert_eq!(dockerfile, expected);
}

#[test]
fn test_dockerfile_without_user_feature_has_no_switch() {
    let registry = two_extensions();
    let args = requesting(&["x", "y"]);
    let active = resolve(&registry, &args, &ResolveOptions::default()).unwrap();

    let dockerfile = generate_dockerfile(&active, &args, "ubuntu:22.04").unwrap();

    assert!(dockerfile.contains("\nFROM ubuntu:22.04\nUSER root\n"));
    assert!(!dockerfile.contains("USER alice"));
    assert_eq!(dockerfile.matches("USER ").count(), 1);
}

#[test]
fn test_dockerfile_no_extensions() {
    let active = dockhand::ActiveSet::default();
    let dockerfile = generate_dockerfile(&active, &ArgBag::new(), "alpine").unwrap();
    assert_eq!(dockerfile, "\nFROM alpine\nUSER root\n");
}

#[test]
fn test_assembly_is_deterministic() {
    let registry = two_extensions();
    let args = requesting(&["y", "x"]);

    let first = assemble(
        &resolve(&registry, &args, &ResolveOptions::default()).unwrap(),
        &args,
        "base",
    )
    .unwrap();
    let second = assemble(
        &resolve(&registry, &args, &ResolveOptions::default()).unwrap(),
        &args,
        "base",
    )
    .unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_user_name_override_wins() {
    let args = ArgBag::new()
        .with("user", true)
        .with("user_override_name", "builder");
    assert_eq!(resolve_user_name(&args).unwrap().as_deref(), Some("builder"));
}

#[test]
fn test_user_name_absent_when_feature_off() {
    let args = ArgBag::new().with("user_override_name", "builder");
    assert_eq!(resolve_user_name(&args).unwrap(), None);
}

#[test]
fn test_user_name_override_with_newline_rejected() {
    let args = ArgBag::new()
        .with("user", true)
        .with("user_override_name", "bob\nUSER root");

    let err = resolve_user_name(&args).unwrap_err();
    assert!(matches!(err, ExtensionError::InvalidArgument { .. }));

    let err = generate_dockerfile(&ActiveSet::default(), &args, "base").unwrap_err();
    assert!(err.to_string().contains("not a valid user name"));
}

#[test]
fn test_user_name_override_with_quote_rejected() {
    let args = ArgBag::new()
        .with("user", true)
        .with("user_override_name", "eve\" ALL=(ALL) ALL #");
    assert!(resolve_user_name(&args).is_err());
}

// =============================================================================
// Auxiliary File Tests
// =============================================================================

#[test]
fn test_unsafe_files_dropped() {
    let registry = registry_of(&[TestExtension::new("files")
        .file("ok.txt", "fine")
        .file("nested/dir/conf", "nested")
        .file("/etc/passwd", "absolute")
        .file("../escape", "parent")
        .file("a/../../escape", "climb")]);
    let args = requesting(&["files"]);
    let active = resolve(&registry, &args, &ResolveOptions::default()).unwrap();

    let recipe = assemble(&active, &args, "base").unwrap();

    let paths: Vec<&str> = recipe.files.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["nested/dir/conf", "ok.txt"]);
}

#[test]
fn test_later_extension_wins_on_same_path() {
    let registry = registry_of(&[
        TestExtension::new("first").file("shared.txt", "from first"),
        TestExtension::new("second")
            .after(&["first"])
            .file("shared.txt", "from second"),
    ]);
    let args = requesting(&["first", "second"]);
    let active = resolve(&registry, &args, &ResolveOptions::default()).unwrap();

    let recipe = assemble(&active, &args, "base").unwrap();

    assert_eq!(
        recipe.files.get("shared.txt"),
        Some(&FileContent::from("from second"))
    );
}

// =============================================================================
// Build Context Tests
// =============================================================================

#[test]
fn test_context_materializes_recipe_and_files() {
    let mut recipe = Recipe {
        dockerfile: "FROM scratch\n".to_string(),
        ..Default::default()
    };
    recipe
        .files
        .insert("scripts/setup.sh".to_string(), "#!/bin/sh\n".into());
    recipe
        .files
        .insert("blob.bin".to_string(), vec![0u8, 159, 146, 150].into());

    let context = BuildContext::materialize(&recipe).unwrap();

    let root = context.path().to_path_buf();
    assert_eq!(
        std::fs::read_to_string(context.recipe_path()).unwrap(),
        "FROM scratch\n"
    );
    assert_eq!(
        std::fs::read_to_string(root.join("scripts/setup.sh")).unwrap(),
        "#!/bin/sh\n"
    );
    assert_eq!(
        std::fs::read(root.join("blob.bin")).unwrap(),
        vec![0u8, 159, 146, 150]
    );

    context.close();
    assert!(!root.exists());
}

#[test]
fn test_context_skips_unsafe_paths() {
    let mut recipe = Recipe::default();
    recipe.files.insert("../outside".to_string(), "x".into());
    recipe.files.insert("inside".to_string(), "y".into());

    let context = BuildContext::new().unwrap();
    let written = context.write_recipe(&recipe).unwrap();

    assert_eq!(written, 1);
    assert!(context.path().join("inside").exists());
    assert!(!context.path().parent().unwrap().join("outside").exists());
}

#[test]
fn test_context_directory_prefixed() {
    let context = BuildContext::new().unwrap();
    let name = context.path().file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with(dockhand::BUILD_CONTEXT_PREFIX));
}

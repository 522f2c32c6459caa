//! Tests for extension resolution.
//!
//! Validates requirement closure, strict selection, blacklisting and the
//! deterministic topological order over `invoke_after` edges.

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::{TestExtension, registry_of, requesting};
use dockhand::{ArgBag, ExtensionError, ResolveOptions, resolve};
use dockhand::resolver::topological_sort;

fn strict() -> ResolveOptions {
    ResolveOptions {
        strict: true,
        ..Default::default()
    }
}

fn graph(edges: Vec<(&str, Vec<&str>)>) -> BTreeMap<String, BTreeSet<String>> {
    edges
        .into_iter()
        .map(|(name, deps)| {
            (
                name.to_string(),
                deps.iter().map(|d| d.to_string()).collect(),
            )
        })
        .collect()
}

// =============================================================================
// Requirement Closure Tests
// =============================================================================

#[test]
fn test_required_extension_added_implicitly() {
    let registry = registry_of(&[
        TestExtension::new("a").requires(&["b"]).after(&["b"]),
        TestExtension::new("b"),
    ]);
    let args = requesting(&["a"]);

    let active = resolve(&registry, &args, &ResolveOptions::default()).unwrap();

    assert_eq!(active.names(), vec!["b", "a"]);
}

#[test]
fn test_required_extension_strict_fails() {
    let registry = registry_of(&[
        TestExtension::new("a").requires(&["b"]),
        TestExtension::new("b"),
    ]);
    let args = requesting(&["a"]);

    let err = resolve(&registry, &args, &strict()).unwrap_err();

    match err {
        ExtensionError::MissingRequired { name, missing } => {
            assert_eq!(name, "a");
            assert_eq!(missing, vec!["b".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_strict_passes_when_requirement_requested() {
    let registry = registry_of(&[
        TestExtension::new("a").requires(&["b"]),
        TestExtension::new("b"),
    ]);
    let args = requesting(&["a", "b"]);

    let active = resolve(&registry, &args, &strict()).unwrap();

    assert_eq!(active.len(), 2);
}

#[test]
fn test_transitive_requirements_included_once() {
    let registry = registry_of(&[
        TestExtension::new("a").requires(&["b", "c"]),
        TestExtension::new("b").requires(&["c"]),
        TestExtension::new("c").requires(&["d"]),
        TestExtension::new("d"),
        TestExtension::new("unrelated"),
    ]);
    let args = requesting(&["a"]);

    let active = resolve(&registry, &args, &ResolveOptions::default()).unwrap();
    let mut names = active.names();
    names.sort();

    assert_eq!(names, vec!["a", "b", "c", "d"]);
}

#[test]
fn test_self_requirement_ignored() {
    let registry = registry_of(&[TestExtension::new("a").requires(&["a"]).after(&["a"])]);
    let active = resolve(&registry, &requesting(&["a"]), &strict()).unwrap();
    assert_eq!(active.names(), vec!["a"]);
}

#[test]
fn test_unknown_requirement_not_found() {
    let registry = registry_of(&[TestExtension::new("a").requires(&["ghost"])]);

    let err = resolve(&registry, &requesting(&["a"]), &ResolveOptions::default()).unwrap_err();

    assert!(matches!(err, ExtensionError::NotFound(ref n) if n == "ghost"));
}

#[test]
fn test_nothing_requested_is_empty() {
    let registry = registry_of(&[TestExtension::new("a")]);
    let active = resolve(&registry, &ArgBag::new(), &ResolveOptions::default()).unwrap();
    assert!(active.is_empty());
}

// =============================================================================
// Blacklist Tests
// =============================================================================

#[test]
fn test_blacklisted_request_fails() {
    let registry = registry_of(&[TestExtension::new("a")]);
    let args = requesting(&["a"]).with("extension_blacklist", vec!["a"]);

    let err = resolve(&registry, &args, &ResolveOptions::from_args(&args)).unwrap_err();

    assert!(matches!(err, ExtensionError::Blacklisted(ref n) if n == "a"));
}

#[test]
fn test_blacklisted_requirement_fails() {
    let registry = registry_of(&[
        TestExtension::new("a").requires(&["b"]),
        TestExtension::new("b"),
    ]);
    let args = requesting(&["a"]).with("extension_blacklist", vec!["b"]);

    let err = resolve(&registry, &args, &ResolveOptions::from_args(&args)).unwrap_err();

    assert!(matches!(err, ExtensionError::Blacklisted(ref n) if n == "b"));
}

#[test]
fn test_options_from_args() {
    let args = ArgBag::new()
        .with("extension_blacklist", vec!["x", "y"])
        .with("strict_extension_selection", true);
    let options = ResolveOptions::from_args(&args);

    assert!(options.strict);
    assert!(options.blacklist.contains("x"));
    assert!(options.blacklist.contains("y"));
}

// =============================================================================
// Ordering Tests
// =============================================================================

#[test]
fn test_invoke_after_respected() {
    let registry = registry_of(&[
        TestExtension::new("alpha").after(&["zulu"]),
        TestExtension::new("mike").after(&["alpha"]),
        TestExtension::new("zulu"),
    ]);
    let args = requesting(&["alpha", "mike", "zulu"]);

    let active = resolve(&registry, &args, &ResolveOptions::default()).unwrap();

    assert_eq!(active.names(), vec!["zulu", "alpha", "mike"]);
}

#[test]
fn test_inactive_invoke_after_ignored() {
    let registry = registry_of(&[
        TestExtension::new("a").after(&["b", "not_registered"]),
        TestExtension::new("b"),
    ]);

    let active = resolve(&registry, &requesting(&["a"]), &ResolveOptions::default()).unwrap();

    assert_eq!(active.names(), vec!["a"]);
}

#[test]
fn test_independent_nodes_in_name_order() {
    let registry = registry_of(&[
        TestExtension::new("c"),
        TestExtension::new("a"),
        TestExtension::new("b"),
    ]);
    let args = requesting(&["c", "b", "a"]);

    let first = resolve(&registry, &args, &ResolveOptions::default()).unwrap();
    let second = resolve(&registry, &args, &ResolveOptions::default()).unwrap();

    assert_eq!(first.names(), vec!["a", "b", "c"]);
    assert_eq!(first.names(), second.names());
}

#[test]
fn test_cycle_detected() {
    let registry = registry_of(&[
        TestExtension::new("a").after(&["b"]),
        TestExtension::new("b").after(&["a"]),
        TestExtension::new("c"),
    ]);
    let args = requesting(&["a", "b", "c"]);

    let err = resolve(&registry, &args, &ResolveOptions::default()).unwrap_err();

    match err {
        ExtensionError::CyclicDependency { pending } => assert_eq!(pending, vec!["a", "b"]),
        other => panic!("unexpected error: {other}"),
    }
}

// =============================================================================
// Topological Sort Tests
// =============================================================================

#[test]
fn test_topological_sort_every_edge_respected() {
    let g = graph(vec![
        ("app", vec!["base", "net"]),
        ("base", vec![]),
        ("net", vec!["base"]),
        ("tools", vec!["app"]),
    ]);

    let order = topological_sort(&g).unwrap();
    let pos = |n: &str| order.iter().position(|x| x == n).unwrap();

    for (node, deps) in &g {
        for dep in deps {
            assert!(pos(dep) < pos(node), "{dep} must precede {node}");
        }
    }
    assert_eq!(order.len(), 4);
}

#[test]
fn test_topological_sort_ignores_missing_nodes() {
    let g = graph(vec![("a", vec!["missing"])]);
    assert_eq!(topological_sort(&g).unwrap(), vec!["a"]);
}

#[test]
fn test_topological_sort_reports_pending_subset() {
    let g = graph(vec![
        ("a", vec![]),
        ("b", vec!["c"]),
        ("c", vec!["d"]),
        ("d", vec!["b"]),
    ]);

    let err = topological_sort(&g).unwrap_err();

    match err {
        ExtensionError::CyclicDependency { pending } => {
            assert_eq!(pending, vec!["b", "c", "d"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_cycle_error_message_names_extensions() {
    let err = ExtensionError::CyclicDependency {
        pending: vec!["a".into(), "b".into()],
    };
    assert_eq!(err.to_string(), "cyclic dependency among extensions [a, b]");
}

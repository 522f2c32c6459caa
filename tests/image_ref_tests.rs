//! Tests for image reference parsing and re-tagging.

use dockhand::{Error, ImageReference, tag_image_name};

// =============================================================================
// Tagging Tests
// =============================================================================

#[test]
fn test_tag_plain_name_defaults_to_latest() {
    assert_eq!(
        tag_image_name("image", Some("dockhand-"), Some("-tags")).unwrap(),
        "image:dockhand-latest-tags"
    );
    assert_eq!(tag_image_name("image", None, None).unwrap(), "image:latest");
}

#[test]
fn test_tag_keeps_existing_tag() {
    assert_eq!(
        tag_image_name("ubuntu:22.04", Some("dockhand-"), None).unwrap(),
        "ubuntu:dockhand-22.04"
    );
}

#[test]
fn test_tag_private_registry_with_port() {
    assert_eq!(
        tag_image_name(
            "my.private.registry:5000/user/image:custom-1.2.3",
            Some("dockhand-"),
            Some("-tags")
        )
        .unwrap(),
        "my.private.registry:5000/user/image:dockhand-custom-1.2.3-tags"
    );
}

#[test]
fn test_tag_nested_components() {
    assert_eq!(
        tag_image_name("osrf/ros/desktop", None, Some("-dev")).unwrap(),
        "osrf/ros/desktop:latest-dev"
    );
}

// =============================================================================
// Parse Tests
// =============================================================================

#[test]
fn test_parse_fields() {
    let parsed = ImageReference::parse("registry.example.com:443/team/app:v1").unwrap();

    assert_eq!(parsed.hostname.as_deref(), Some("registry.example.com"));
    assert_eq!(parsed.port.as_deref(), Some("443"));
    assert_eq!(parsed.components, "team/app");
    assert_eq!(parsed.tag.as_deref(), Some("v1"));
    assert_eq!(parsed.repository(), "registry.example.com:443/team/app");
}

#[test]
fn test_parse_without_registry() {
    let parsed = ImageReference::parse("library/ubuntu").unwrap();
    assert_eq!(parsed.hostname, None);
    assert_eq!(parsed.tag, None);
    assert_eq!(parsed.repository(), "library/ubuntu");
}

#[test]
fn test_underscore_in_tag_rejected() {
    assert!(matches!(
        tag_image_name("image:bad_tag", None, None),
        Err(Error::InvalidImageReference { .. })
    ));
}

#[test]
fn test_underscore_in_hostname_rejected() {
    assert!(ImageReference::parse("my_registry.example.com:5000/image:tag").is_err());
}

#[test]
fn test_overlong_reference_rejected() {
    let long = format!("image:{}", "a".repeat(dockhand::MAX_IMAGE_REF_LEN));
    assert!(ImageReference::parse(&long).is_err());
}

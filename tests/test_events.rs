//! Tests for handler registration

use warden::{EventKind, HandlerRegistry, Response};

#[test]
fn test_registry_starts_empty() {
    let registry = HandlerRegistry::new();

    assert!(!registry.has_handler(EventKind::Request));
    assert!(!registry.has_handler(EventKind::Forward));
}

#[test]
fn test_registration_fills_its_slot() {
    let mut registry = HandlerRegistry::new();
    registry.on_request(|_ctx| async move { anyhow::Ok(()) });

    assert!(registry.has_handler(EventKind::Request));
    assert!(!registry.has_handler(EventKind::Forward));
}

#[test]
fn test_forward_registration_is_independent() {
    let mut registry = HandlerRegistry::new();
    registry.on_forward(|response: Response| async move { anyhow::Ok(response) });

    assert!(!registry.has_handler(EventKind::Request));
    assert!(registry.has_handler(EventKind::Forward));
}

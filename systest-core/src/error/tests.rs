use super::*;
use std::time::Duration;

#[test]
fn test_transient_classification() {
    let eof = SystestError::transport("node1", "ssh: unexpected EOF");
    assert!(eof.is_transient());

    let pipe = SystestError::transport("node1", "write: Broken pipe");
    assert!(pipe.is_transient());

    let refused = SystestError::transport("node1", "connection refused");
    assert!(!refused.is_transient());

    // A command that printed EOF is still a plain command failure
    let failed = SystestError::command_failed("node1", "cat x", Some(1), "EOF");
    assert!(!failed.is_transient());
}

#[test]
fn test_mismatch_and_shape_are_distinct() {
    let shape = SystestError::document_shape("vxlan not found in driver info");
    assert!(shape.is_document_shape());
    assert!(!shape.is_verification_mismatch());

    let missing = SystestError::MissingIdentity {
        node: "node1".to_string(),
        identity: "192.168.2.11".to_string(),
    };
    assert!(missing.is_verification_mismatch());
    assert!(!missing.is_document_shape());
    assert_eq!(missing.to_string(), "VTEP 192.168.2.11 not found on node1");
}

#[test]
fn test_setup_failed_wraps_timeout() {
    let timeout = SystestError::Timeout {
        description: "timeout reached trying to run pgrep netplugin on \"node1\"".to_string(),
        duration: Duration::from_secs(10),
    };
    let err = SystestError::setup_failed("restart-data-plane", timeout);

    assert!(err.is_timeout());
    assert_eq!(err.failed_phase(), Some("restart-data-plane"));
    assert!(std::error::Error::source(&err)
        .map(|s| s.to_string().contains("pgrep netplugin"))
        .unwrap_or(false));
}

#[test]
fn test_multiple_errors_format() {
    let err = SystestError::Multiple {
        context: "suite teardown".to_string(),
        errors: vec![
            SystestError::internal("first"),
            SystestError::internal("second"),
        ],
    };
    assert_eq!(
        err.to_string(),
        "Multiple errors in suite teardown: 1. Internal error: first; 2. Internal error: second"
    );
}

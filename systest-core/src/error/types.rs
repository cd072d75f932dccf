//! Core error types for the system-test engine
//!
//! This module contains the main SystestError enum with all error variants
//! and the associated Result type aliases.

use std::time::Duration;
use thiserror::Error;

/// Error type for every operation in the system-test engine
///
/// The variants follow the failure taxonomy the lifecycle manager relies on:
///
/// - **Transport**: the remote-execution channel broke mid-command; retried
///   transparently by the executor when the message carries a truncation
///   signature
/// - **Command**: the remote command ran and exited non-zero; propagated as-is
/// - **Timeout**: a readiness probe never succeeded before its deadline
/// - **Document shape**: the introspection endpoint returned something that
///   does not match the documented fragments
/// - **Mismatch**: the introspection document is well-formed but the fabric
///   state is not what the test expected
#[derive(Error, Debug)]
pub enum SystestError {
    // Remote execution
    #[error("Transport error on {node}: {message}")]
    Transport { node: String, message: String },

    #[error("Command '{command}' failed on {node} (exit {exit_code:?}): {output}")]
    CommandFailed {
        node: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    // Readiness
    #[error("Timed out after {duration:?}: {description}")]
    Timeout {
        description: String,
        duration: Duration,
    },

    // Verification
    #[error("Unexpected introspection document shape: {detail}")]
    DocumentShape { detail: String },

    #[error("VTEP {identity} not found on {node}")]
    MissingIdentity { node: String, identity: String },

    #[error("{token} not found on {node}")]
    MissingToken { node: String, token: String },

    // Output parsing
    #[error("Invalid output from {node}: {output}")]
    Parse { node: String, output: String },

    // Configuration
    #[error("Configuration error in {component}: {message}")]
    ConfigurationError { component: String, message: String },

    // Control plane
    #[error("Control plane request '{request}' failed: {message}")]
    ControlPlane { request: String, message: String },

    // Lifecycle
    #[error("Setup phase '{phase}' failed")]
    SetupFailed {
        phase: String,
        #[source]
        source: Box<SystestError>,
    },

    #[error("Fatal markers in logs on {node}")]
    LogMarkers { node: String, lines: Vec<String> },

    #[error("Node not found: {name}")]
    NodeNotFound { name: String },

    // IO & serialization
    #[error("IO error: {0}")]
    IoError(#[from] Box<std::io::Error>),

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Multiple errors in {context}: {}", format_errors(.errors))]
    Multiple {
        context: String,
        errors: Vec<SystestError>,
    },
}

// Helper function to format multiple errors
pub fn format_errors(errors: &[SystestError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SystestError>;
pub type SystestResult<T> = std::result::Result<T, SystestError>;

//! Constructor methods and classification helpers for SystestError

use super::types::SystestError;

/// Substrings that identify a truncated or dropped remote session.
///
/// SSH and vagrant report these when the connection dies mid-command; the
/// command itself may or may not have run, so only idempotent commands are
/// ever sent through the retrying executor.
pub const TRANSIENT_SIGNATURES: &[&str] = &["EOF", "broken pipe", "connection reset"];

impl SystestError {
    /// Create a configuration error with component and message
    ///
    /// # Examples
    /// ```rust
    /// use systest_core::error::SystestError;
    ///
    /// let err = SystestError::configuration("fabric.fwd_mode", "unknown mode 'vxlan'");
    /// assert!(err.to_string().contains("fabric.fwd_mode"));
    /// ```
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        SystestError::ConfigurationError {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a transport error for a node
    pub fn transport(node: impl Into<String>, message: impl Into<String>) -> Self {
        SystestError::Transport {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create a command failure carrying the captured output
    pub fn command_failed(
        node: impl Into<String>,
        command: impl Into<String>,
        exit_code: Option<i32>,
        output: impl Into<String>,
    ) -> Self {
        SystestError::CommandFailed {
            node: node.into(),
            command: command.into(),
            exit_code,
            output: output.into(),
        }
    }

    /// Create a document shape error
    pub fn document_shape(detail: impl Into<String>) -> Self {
        SystestError::DocumentShape {
            detail: detail.into(),
        }
    }

    /// Wrap an error as the failure of a named lifecycle phase
    pub fn setup_failed(phase: impl Into<String>, source: SystestError) -> Self {
        SystestError::SetupFailed {
            phase: phase.into(),
            source: Box::new(source),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        SystestError::Internal {
            message: message.into(),
        }
    }

    /// Whether this failure is a dropped remote session worth retrying.
    ///
    /// Only transport errors whose message carries one of the
    /// [`TRANSIENT_SIGNATURES`] qualify; a non-zero exit never does.
    pub fn is_transient(&self) -> bool {
        match self {
            SystestError::Transport { message, .. } => {
                let lower = message.to_lowercase();
                TRANSIENT_SIGNATURES
                    .iter()
                    .any(|sig| lower.contains(&sig.to_lowercase()))
            }
            _ => false,
        }
    }

    /// Whether this is an assertion mismatch against well-formed state
    pub fn is_verification_mismatch(&self) -> bool {
        matches!(
            self,
            SystestError::MissingIdentity { .. } | SystestError::MissingToken { .. }
        )
    }

    /// Whether the introspection contract itself was violated
    pub fn is_document_shape(&self) -> bool {
        matches!(self, SystestError::DocumentShape { .. })
    }

    /// Whether this is a readiness timeout, looking through setup wrappers
    pub fn is_timeout(&self) -> bool {
        match self {
            SystestError::Timeout { .. } => true,
            SystestError::SetupFailed { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// Name of the lifecycle phase that failed, if this is a setup failure
    pub fn failed_phase(&self) -> Option<&str> {
        match self {
            SystestError::SetupFailed { phase, .. } => Some(phase.as_str()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SystestError {
    fn from(err: std::io::Error) -> Self {
        SystestError::IoError(Box::new(err))
    }
}

impl From<toml::de::Error> for SystestError {
    fn from(err: toml::de::Error) -> Self {
        SystestError::configuration("toml", err.to_string())
    }
}

impl From<reqwest::Error> for SystestError {
    fn from(err: reqwest::Error) -> Self {
        let request = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        SystestError::ControlPlane {
            request,
            message: err.to_string(),
        }
    }
}

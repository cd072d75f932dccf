//! Error handling for the system-test engine
//!
//! Every fallible operation returns [`SystestResult`]. The variants separate
//! infrastructure trouble (transport, timeout, document shape) from genuine
//! fabric state mismatches so that a failed case can be triaged from the
//! error alone:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Retried by executor │ Propagated to phase │ Verifier        │
//! │  • Transport (EOF)   │ • CommandFailed     │ • DocumentShape │
//! │                      │ • Timeout           │ • MissingIdentity│
//! │                      │ • ControlPlane      │ • MissingToken  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod constructors;
pub mod types;

#[cfg(test)]
mod tests;

pub use constructors::TRANSIENT_SIGNATURES;
pub use types::{format_errors, Result, SystestError, SystestResult};

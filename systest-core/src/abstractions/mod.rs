//! Trait abstractions at the edges of the engine
//!
//! The engine talks to hosts and to the control plane only through these
//! traits, so every lifecycle and verification path can run against the
//! scripted implementations in tests.

pub mod command;
pub mod control_plane;

pub use command::*;
pub use control_plane::*;

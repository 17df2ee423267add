//! Error taxonomy for identity transitions.

use thiserror::Error;

/// Errors surfaced by the identity subsystem.
///
/// A denied consent gate is deliberately not an error; it is reported as
/// [`crate::coordinator::TransitionOutcome::Skipped`].
#[derive(Error, Debug)]
pub enum IdentityError {
    /// Caller violated the operation contract. Raised synchronously before
    /// any mutation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation invoked before initialization completed, or after halt.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Identity or queue store write failed. The in-progress transition is
    /// aborted with the previously committed identity and queue intact.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Result alias for identity operations.
pub type Result<T> = std::result::Result<T, IdentityError>;

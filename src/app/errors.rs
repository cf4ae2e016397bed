// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use thiserror::Error as ThisError;

pub type FarmResult<T> = Result<T, FarmError>;

/// Error taxonomy at the port boundaries. Every terminal failure carries a
/// human-readable message the presentation layer can show as-is.
#[derive(Debug, Clone, ThisError)]
pub enum FarmError {
    /// Authentication was rejected. Terminal, never retried.
    #[error("invalid login: authentication rejected for {username}")]
    InvalidCredentials { username: String },

    /// Transport-level failure (DNS, socket, dropped session). Retried by the
    /// bootstrapper up to its attempt limit, then terminal.
    #[error("could not connect: {0}")]
    Connection(String),

    /// A path operation's target does not exist. Recoverable; callers that
    /// only need existence use [`FarmError::is_not_found`].
    #[error("not found: {0}")]
    NotFound(String),

    /// A queued task's body failed. Isolated to that task.
    #[error("operation failed: {0}")]
    Task(String),

    /// A job descriptor field failed validation; the caller must correct and
    /// resubmit.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Opaque failure from the external scheduler, surfaced verbatim.
    #[error("submission failed: {0}")]
    Submission(String),
}

impl FarmError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FarmError::NotFound(_))
    }
}

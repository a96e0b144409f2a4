//! Engine error types.
//!
//! Every failure surfaced by the engine carries a stable error kind with a
//! numeric code plus a human-readable message. Codes are part of the public
//! contract and must never be renumbered.
//!
//! Error kinds:
//! - `ErrParams` (1) — malformed input (unknown field, bad literal, bad operator)
//! - `ErrConflict` (2) — pk collision on insert-only paths, incompatible reopen
//! - `ErrSQL` (3) — SQL parse error
//! - `ErrQuery` (4) — plan-time error
//! - `ErrNotFound` (5) — get-by-pk miss where presence was required
//! - `ErrLogic` (6) — engine invariant violation (always logged)
//! - `ErrBufferLimit` (7) — too many outstanding result buffers
//! - `ErrIO` (8) — passthrough from the persistence collaborator

use std::fmt;

/// Stable error kinds surfaced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input: unknown field, type mismatch in a literal, bad operator.
    Params,
    /// Primary-key collision on an insert-only path, or incompatible reopen.
    Conflict,
    /// SQL parse failure.
    Sql,
    /// Plan-time failure (e.g. `equal_position` over a non-array field).
    Query,
    /// Get-by-pk miss where the caller required presence.
    NotFound,
    /// Invariant violation inside the engine.
    Logic,
    /// Too many outstanding result buffers for one database handle.
    BufferLimit,
    /// Failure propagated unchanged from the persistence collaborator.
    Io,
}

impl ErrorKind {
    /// Returns the stable numeric code.
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::Params => 1,
            ErrorKind::Conflict => 2,
            ErrorKind::Sql => 3,
            ErrorKind::Query => 4,
            ErrorKind::NotFound => 5,
            ErrorKind::Logic => 6,
            ErrorKind::BufferLimit => 7,
            ErrorKind::Io => 8,
        }
    }

    /// Returns the stable kind name.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Params => "ErrParams",
            ErrorKind::Conflict => "ErrConflict",
            ErrorKind::Sql => "ErrSQL",
            ErrorKind::Query => "ErrQuery",
            ErrorKind::NotFound => "ErrNotFound",
            ErrorKind::Logic => "ErrLogic",
            ErrorKind::BufferLimit => "ErrBufferLimit",
            ErrorKind::Io => "ErrIO",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Engine error with kind and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Creates an error of an arbitrary kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Malformed input.
    pub fn params(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Params, message)
    }

    /// Primary-key or schema conflict.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// SQL parse failure.
    pub fn sql(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Sql, message)
    }

    /// Plan-time failure.
    pub fn query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Query, message)
    }

    /// Required row was not found.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Engine invariant violation. Logged at error level on construction.
    pub fn logic(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(target: "stratadb", "invariant violation: {message}");
        Self::new(ErrorKind::Logic, message)
    }

    /// Result-buffer limit exceeded.
    pub fn buffer_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BufferLimit, message)
    }

    /// Persistence collaborator failure.
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the stable numeric code.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Returns the human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind.name(), self.kind.code(), self.message)
    }
}

impl std::error::Error for Error {}

/// Result type used across the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ErrorKind::Params.code(), 1);
        assert_eq!(ErrorKind::Conflict.code(), 2);
        assert_eq!(ErrorKind::Sql.code(), 3);
        assert_eq!(ErrorKind::Query.code(), 4);
        assert_eq!(ErrorKind::NotFound.code(), 5);
        assert_eq!(ErrorKind::Logic.code(), 6);
        assert_eq!(ErrorKind::BufferLimit.code(), 7);
        assert_eq!(ErrorKind::Io.code(), 8);
    }

    #[test]
    fn test_names_are_stable() {
        assert_eq!(ErrorKind::Params.name(), "ErrParams");
        assert_eq!(ErrorKind::Sql.name(), "ErrSQL");
        assert_eq!(ErrorKind::BufferLimit.name(), "ErrBufferLimit");
        assert_eq!(ErrorKind::Io.name(), "ErrIO");
    }

    #[test]
    fn test_display_carries_code_and_message() {
        let err = Error::params("unknown field 'zzz'");
        let text = format!("{err}");
        assert!(text.contains("ErrParams"));
        assert!(text.contains("(1)"));
        assert!(text.contains("zzz"));
    }
}

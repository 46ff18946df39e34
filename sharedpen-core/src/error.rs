//! Error types for the operation algebra and its supporting structures.

use std::fmt;

use thiserror::Error;

/// Which undo stack an operation targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Undo,
    Redo,
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackKind::Undo => write!(f, "undo"),
            StackKind::Redo => write!(f, "redo"),
        }
    }
}

/// Errors raised by the OT core.
///
/// Length mismatches mean two replicas disagree about the document; the
/// operation in flight must be abandoned rather than patched up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtError {
    /// `compose`/`transform` operands do not line up.
    #[error("base length mismatch: expected {expected}, got {actual}")]
    BaseLengthMismatch { expected: usize, actual: usize },

    /// The operation does not cover the string it is applied to.
    #[error("operation base length {expected} does not match document length {actual}")]
    ApplyLengthMismatch { expected: usize, actual: usize },

    /// An inbound payload could not be decoded into an operation.
    #[error("malformed operation: {0}")]
    MalformedOperation(String),

    /// A span lies (partly) outside the annotation list.
    #[error("span {pos}..{end} exceeds the bounds of a list of length {len}")]
    SpanOutOfBounds { pos: usize, end: usize, len: usize },

    /// Undo/redo requested with nothing on the stack.
    #[error("can not {0}, {0} stack is empty")]
    EmptyStack(StackKind),

    /// Line alignment other than left/center/right.
    #[error("alignment must be \"left\", \"center\", or \"right\", got {0:?}")]
    InvalidAlignment(String),
}

pub type Result<T> = std::result::Result<T, OtError>;

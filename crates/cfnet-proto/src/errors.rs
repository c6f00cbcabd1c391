//! Error types for line encoding and parsing.

use thiserror::Error;

/// Result type for line operations
pub type Result<T> = std::result::Result<T, LineError>;

/// Errors raised while building or reading a negotiation line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    /// The encoded line does not fit its fixed buffer
    #[error("line of {size} bytes exceeds the {limit}-byte limit")]
    TooLong {
        /// Encoded size including the terminator
        size: usize,
        /// Maximum size allowed for this line kind
        limit: usize,
    },

    /// A field contains a line terminator and would split the message
    #[error("field {field} contains a line terminator")]
    EmbeddedNewline {
        /// Name of the offending field
        field: &'static str,
    },

    /// A field that is separated by spaces on the wire contains whitespace
    #[error("field {field} must not contain whitespace")]
    EmbeddedWhitespace {
        /// Name of the offending field
        field: &'static str,
    },

    /// The line does not start with the expected keyword
    #[error("expected line starting with {expected:?}")]
    UnexpectedKeyword {
        /// Keyword the parser was looking for
        expected: &'static str,
    },

    /// The line is structurally invalid
    #[error("malformed line: {reason}")]
    Malformed {
        /// What was wrong
        reason: &'static str,
    },
}

use std::io::ErrorKind::UnexpectedEof;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("The stream is violating the expected format, because: {reason}")]
    FormatError { reason: &'static str },

    #[error("Invalid element count {count} for {field}")]
    InvalidCount { field: &'static str, count: i64 },

    #[error("Unknown node kind tag {0}")]
    UnknownNodeKind(u8),

    #[error("Unknown container format tag {0}")]
    UnknownContainerFormat(u8),

    /// Represents all other cases of `std::io::Error`, including running out of bytes.
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UTF8ConversationError(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
}

impl ParserError {
    /// Running out of bytes is not a format violation, the record may simply not have fully arrived yet.
    pub fn is_eof(&self) -> bool {
        matches!(self, ParserError::IOError(inner) if inner.kind() == UnexpectedEof)
    }
}

pub mod common;
pub mod container;
pub mod header;
pub mod nodes;
pub mod stream;

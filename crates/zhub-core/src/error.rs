//! Error types for zhub-core

use thiserror::Error;

/// Result type alias for codec and schema operations
pub type Result<T> = std::result::Result<T, Error>;

/// Codec and schema error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed schema text, unknown type keyword, duplicate id/name or bad literal
    #[error("schema error: {0}")]
    SchemaError(String),

    /// Cursor exhausted before the datatype was fully read
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Tag byte that names no known datatype
    #[error("unknown datatype: 0x{0:02x}")]
    UnknownDataType(u8),

    /// Bytes that do not form a valid value of the expected type
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Value whose shape does not match the expected type
    #[error("encode error: {0}")]
    EncodeError(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Schema,
    Decode,
    Encode,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SchemaError(_) => ErrorKind::Schema,
            Error::BufferTooSmall { .. } | Error::UnknownDataType(_) | Error::DecodeError(_) => {
                ErrorKind::Decode
            }
            Error::EncodeError(_) => ErrorKind::Encode,
        }
    }

    pub(crate) fn schema(msg: impl Into<String>) -> Self {
        Error::SchemaError(msg.into())
    }

    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        Error::DecodeError(msg.into())
    }

    pub(crate) fn encode(msg: impl Into<String>) -> Self {
        Error::EncodeError(msg.into())
    }
}

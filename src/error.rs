//! Error types for HarborKV
//!
//! Provides a unified error type for all operations. Every command failure
//! is eventually rendered as a RESP error line via [`Error::reply_line`].

use thiserror::Error;

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;

/// Reply message used by every admin-only command on denial
pub const ADMIN_PERMISSION_REQUIRED: &str = "admin permission required to perform the command";

/// Coarse classification of errors surfaced to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed arguments; no side effect
    Parse,
    /// Admin or namespace gate failure; no side effect
    Permission,
    /// Storage, resolution or link failure
    Execution,
    /// Protocol-level semantic failure that may carry a session side effect
    ProtocolSemantic,
    /// Infrastructure failure (I/O, corrupted files)
    Internal,
}

/// Unified error type for HarborKV operations
#[derive(Debug, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Command Errors
    // -------------------------------------------------------------------------
    #[error("{0}")]
    Parse(String),

    #[error("wrong number of arguments")]
    WrongArity,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("{}", ADMIN_PERMISSION_REQUIRED)]
    Permission,

    #[error("{0}")]
    Exec(String),

    // -------------------------------------------------------------------------
    // Authentication Errors
    // -------------------------------------------------------------------------
    #[error("Authentication required.")]
    NoAuth,

    #[error("invalid password")]
    InvalidPassword,

    #[error("Client sent AUTH, but no password is set")]
    NoPasswordConfigured,

    #[error("unsupported protocol version")]
    NoProto,

    // -------------------------------------------------------------------------
    // Collaborator Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Rdb(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    pub fn exec(msg: impl Into<String>) -> Self {
        Error::Exec(msg.into())
    }

    /// Generic syntax error used by most option parsers
    pub fn syntax() -> Self {
        Error::Parse("syntax error".to_string())
    }

    pub fn not_integer() -> Self {
        Error::Parse("value is not an integer or out of range".to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(_) | Error::WrongArity | Error::UnknownCommand(_) => ErrorKind::Parse,
            Error::Permission | Error::NoAuth => ErrorKind::Permission,
            Error::InvalidPassword | Error::NoPasswordConfigured | Error::NoProto => {
                ErrorKind::ProtocolSemantic
            }
            Error::Exec(_) | Error::Storage(_) | Error::Rdb(_) | Error::Config(_) => {
                ErrorKind::Execution
            }
            Error::Io(_) | Error::Serialization(_) | Error::Protocol(_) => ErrorKind::Internal,
        }
    }

    /// Render the error as the text of a RESP error reply (without `-` and CRLF)
    pub fn reply_line(&self) -> String {
        match self {
            Error::NoAuth => format!("NOAUTH {}", self),
            Error::NoProto => format!("NOPROTO {}", self),
            _ => format!("ERR {}", self),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

//! Error types for ftpsync

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol_core::Reply;

/// Errors raised while resolving configuration. Always reported before connecting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown filename encoding: {0}")]
    UnknownEncoding(String),
}

/// Failures of a single remote session primitive.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("login rejected: {0}")]
    Auth(Reply),

    #[error("{path}: not found or access denied ({reply})")]
    NotFoundOrDenied { path: String, reply: Reply },

    /// A refused DELE. Servers report "is a directory" and "permission denied"
    /// with the same reply class, so the two cannot be told apart here.
    #[error("{name}: not a file or access denied ({reply})")]
    NotAFileOrDenied { name: String, reply: Reply },

    #[error("unexpected reply: {0}")]
    Protocol(Reply),

    #[error("malformed reply: {0}")]
    Malformed(String),

    #[error("transfer failed: {0}")]
    Transfer(Reply),

    #[error("timed out waiting for server")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("failed to read {path}: {source}")]
    Local {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("lost track of the remote directory after leaving {dir}: {reason}")]
    CursorLost { dir: String, reason: String },

    #[error("maximum directory depth {limit} exceeded")]
    DepthExceeded { limit: usize },

    #[error("name {0:?} cannot be represented in the session encoding")]
    Encoding(String),
}

impl From<io::Error> for SessionError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SessionError::Timeout,
            _ => SessionError::Io(e),
        }
    }
}

impl SessionError {
    /// True when the control channel can no longer be trusted and the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Connect { .. }
                | SessionError::Timeout
                | SessionError::Io(_)
                | SessionError::Malformed(_)
                | SessionError::CursorLost { .. }
        )
    }
}

/// Top-level deployment failures.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("local distribution directory '{}' not found", .0.display())]
    SourceMissing(PathBuf),

    #[error("remote directory {path} does not exist or is inaccessible: {source}")]
    RemoteRootUnavailable {
        path: String,
        #[source]
        source: SessionError,
    },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("upload incomplete: {failed} entries failed")]
    UploadIncomplete { failed: usize },
}

impl DeployError {
    /// Process exit status for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            DeployError::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_map_to_timeout_variant() {
        let e: SessionError = io::Error::new(io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(e, SessionError::Timeout));
        let e: SessionError = io::Error::new(io::ErrorKind::WouldBlock, "slow").into();
        assert!(matches!(e, SessionError::Timeout));
        let e: SessionError = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(e, SessionError::Io(_)));
    }

    #[test]
    fn test_only_channel_errors_are_fatal() {
        let reply = Reply::new(550, "Permission denied");
        assert!(SessionError::Timeout.is_fatal());
        assert!(!SessionError::NotAFileOrDenied {
            name: "x".into(),
            reply: reply.clone()
        }
        .is_fatal());
        assert!(!SessionError::DepthExceeded { limit: 3 }.is_fatal());
        assert!(!SessionError::Transfer(reply).is_fatal());
    }

    #[test]
    fn test_config_errors_exit_with_two() {
        assert_eq!(DeployError::Config(ConfigError::Missing("FTP_HOST")).exit_code(), 2);
        assert_eq!(DeployError::SourceMissing("dist".into()).exit_code(), 1);
        assert_eq!(DeployError::UploadIncomplete { failed: 1 }.exit_code(), 1);
    }
}

//! Error types
//!
//! [`Error`] is the single error type surfaced by the publish pipeline. The
//! smaller enums ([`HandshakeError`], [`AmfError`], [`ProtocolError`]) are
//! raised inside the RTMP connector and wrapped on the way out.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    /// The container is exhausted. Ends a publish run successfully.
    #[error("end of stream")]
    EndOfStream,

    /// A tag was cut short or a seek left the source
    #[error("malformed tag at offset {offset}: {reason}")]
    MalformedTag { offset: u64, reason: String },

    /// The session is disconnected or could not be set up
    #[error("session unavailable: {0}")]
    SessionUnavailable(String),

    /// The session failed to send a tag
    #[error("dispatch failed: {0}")]
    DispatchFailure(String),

    /// The input file could not be opened
    #[error("cannot open {}: {source}", path.display())]
    OpenSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration (URL, parameters)
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("AMF error: {0}")]
    Amf(#[from] AmfError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A failure after publishing started. The run still counts as finished.
    #[error("publishing stopped: {0}")]
    Interrupted(Box<Error>),
}

/// Coarse classification of a terminal condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Source exhausted
    StreamEnded,
    /// Anything wrong with the local file
    LocalFile,
    /// Anything wrong with the remote session
    Connection,
    /// Bad URL or parameters
    Config,
}

impl ErrorKind {
    /// Process exit status for a run that ended this way
    pub fn exit_code(self) -> u8 {
        match self {
            ErrorKind::StreamEnded => 0,
            ErrorKind::LocalFile => 1,
            ErrorKind::Connection => 2,
            ErrorKind::Config => 3,
        }
    }
}

impl Error {
    /// Build a [`Error::MalformedTag`]
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Error::MalformedTag {
            offset,
            reason: reason.into(),
        }
    }

    /// Mark an error raised by the publish loop
    pub fn interrupted(self) -> Self {
        match self {
            Error::Interrupted(_) | Error::EndOfStream => self,
            other => Error::Interrupted(Box::new(other)),
        }
    }

    /// Whether the error ended a run that had already started publishing
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::Interrupted(_))
    }

    /// Process exit status for a run that ended with this error.
    ///
    /// Only setup failures are non-zero. Once publishing has started, any
    /// termination exits with 0.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Interrupted(_) => 0,
            other => other.kind().exit_code(),
        }
    }

    /// Classify this error for user-facing reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::EndOfStream => ErrorKind::StreamEnded,
            Error::Interrupted(inner) => inner.kind(),
            Error::MalformedTag { .. } | Error::OpenSource { .. } | Error::Io(_) => {
                ErrorKind::LocalFile
            }
            Error::SessionUnavailable(_)
            | Error::DispatchFailure(_)
            | Error::Handshake(_)
            | Error::Amf(_)
            | Error::Protocol(_) => ErrorKind::Connection,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

/// Handshake failures
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unsupported RTMP version {0}")]
    InvalidVersion(u8),

    #[error("handshake not in a state to accept data")]
    InvalidState,
}

/// AMF0 decoding failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmfError {
    #[error("unexpected end of AMF data")]
    UnexpectedEof,

    #[error("unknown AMF0 marker 0x{0:02x}")]
    UnknownMarker(u8),

    #[error("invalid UTF-8 in AMF string")]
    InvalidUtf8,

    #[error("invalid object end marker")]
    InvalidObjectEnd,

    #[error("AMF nesting too deep")]
    NestingTooDeep,
}

/// Chunk stream and command-level failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid chunk size {0}")]
    InvalidChunkSize(u32),

    #[error("message on chunk stream {0} continues an unknown message")]
    MissingChunkHeader(u32),

    #[error("message too large: {0} bytes")]
    MessageTooLarge(u32),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("server rejected {command}: {description}")]
    Rejected {
        command: String,
        description: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::EndOfStream.kind(), ErrorKind::StreamEnded);
        assert_eq!(Error::malformed(13, "short").kind(), ErrorKind::LocalFile);
        assert_eq!(
            Error::SessionUnavailable("gone".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::DispatchFailure("broken pipe".into()).kind(),
            ErrorKind::Connection
        );
        assert_eq!(
            Error::Handshake(HandshakeError::InvalidVersion(1)).kind(),
            ErrorKind::Connection
        );
        assert_eq!(Error::Config("no key".into()).kind(), ErrorKind::Config);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ErrorKind::StreamEnded.exit_code(), 0);
        assert_eq!(ErrorKind::LocalFile.exit_code(), 1);
        assert_eq!(ErrorKind::Connection.exit_code(), 2);
        assert_eq!(ErrorKind::Config.exit_code(), 3);
    }

    #[test]
    fn test_interrupted_exits_cleanly() {
        let err = Error::malformed(40, "payload truncated").interrupted();
        assert!(err.is_interrupted());
        assert_eq!(err.kind(), ErrorKind::LocalFile);
        assert_eq!(err.exit_code(), 0);

        let err = Error::DispatchFailure("broken pipe".into()).interrupted();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(err.exit_code(), 0);

        let err = Error::SessionUnavailable("disconnected".into()).interrupted();
        assert_eq!(err.exit_code(), 0);

        // Wrapping twice keeps a single layer
        assert!(matches!(
            err.interrupted(),
            Error::Interrupted(inner) if matches!(*inner, Error::SessionUnavailable(_))
        ));
        assert!(matches!(Error::EndOfStream.interrupted(), Error::EndOfStream));
    }

    #[test]
    fn test_setup_failures_exit_non_zero() {
        let open = Error::OpenSource {
            path: PathBuf::from("missing.flv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(open.exit_code(), 1);
        assert_eq!(Error::SessionUnavailable("refused".into()).exit_code(), 2);
        assert_eq!(Error::Config("no key".into()).exit_code(), 3);
        assert_eq!(Error::EndOfStream.exit_code(), 0);
    }

    #[test]
    fn test_open_source_message() {
        let err = Error::OpenSource {
            path: PathBuf::from("missing.flv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(err.kind(), ErrorKind::LocalFile);
        assert!(err.to_string().contains("missing.flv"));
    }

    #[test]
    fn test_malformed_display() {
        let err = Error::malformed(42, "payload truncated");
        assert_eq!(
            err.to_string(),
            "malformed tag at offset 42: payload truncated"
        );
    }
}

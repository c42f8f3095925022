//! Error types shared by every part of the crate.

use std::{io, time::Duration};

/// Result type of fallible pipemux operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures that can arise while listening, connecting or exchanging messages.
///
/// The taxonomy is deliberately coarse: transport problems come from the OS pipe layer, protocol
/// problems mean the byte stream itself is corrupt, and serialization problems mean a frame was
/// delivered intact but its payload made no sense to the codec. Serialization failures never tear
/// a connection down on their own; protocol and transport failures do.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying pipe failed: broken stream, refused connection or another OS-level error.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// The peer did not become connectable within the allotted time.
    #[error("connect attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The byte stream violated the framing protocol: a partial header, a zero-length or
    /// oversized frame, or a stream that ended mid-payload.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A frame arrived intact but the codec rejected its payload.
    #[error("serialization failure: {0}")]
    Serialization(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    /// An operation was attempted on a component in the wrong state. This is a programmer error;
    /// pipemux logs it and never raises it from inside its own loops.
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),
}

impl Error {
    /// Returns `true` for errors that indicate the connection is no longer usable.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Serialization(..) | Error::Lifecycle(..))
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    pub(crate) fn lifecycle(msg: impl Into<String>) -> Self {
        Error::Lifecycle(msg.into())
    }
}

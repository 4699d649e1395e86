//! Session errors.
//!
//! Every error here is terminal for the session that produced it. There is
//! no retry path: the error is reported through both streams of the pair and
//! the session handle is released.

use std::fmt;
use std::io;

/// All possible session errors.
///
/// One fault is reported through both streams of a pair and through the
/// handshake signal, so the type is `Clone`. Variants that originate in the
/// cryptographic engine carry the engine's fault rendered as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The Noise backend cannot resolve the protocol pattern.
    Unsupported,

    /// Session creation or handshake initialization failed.
    Creation(String),

    /// Reading an inbound handshake message failed.
    HandshakeRead(String),

    /// Transport-phase encryption of a chunk failed.
    Encrypt(String),

    /// Transport-phase decryption or authentication of a chunk failed.
    Decrypt(String),

    /// A working buffer could not be grown.
    Allocation,

    /// The verification policy rejected the remote identity.
    VerifyRejected,

    /// The verification policy itself failed.
    Verify(String),

    /// A frame length prefix exceeds the maximum frame size.
    FrameTooLarge,

    /// The wire ended in the middle of a frame.
    TruncatedFrame,

    /// A second frame was staged while one was already pending.
    /// Indicates a protocol bug, never normal operation.
    PendingOverflow,

    /// The session was closed or its sibling stream was destroyed.
    SessionClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "noise backend unsupported"),
            Self::Creation(cause) => write!(f, "session creation failed: {cause}"),
            Self::HandshakeRead(cause) => write!(f, "handshake read failed: {cause}"),
            Self::Encrypt(cause) => write!(f, "encrypt failed: {cause}"),
            Self::Decrypt(cause) => write!(f, "decrypt failed: {cause}"),
            Self::Allocation => write!(f, "allocation failed"),
            Self::VerifyRejected => write!(f, "remote identity rejected"),
            Self::Verify(cause) => write!(f, "verification failed: {cause}"),
            Self::FrameTooLarge => write!(f, "frame too large"),
            Self::TruncatedFrame => write!(f, "truncated frame"),
            Self::PendingOverflow => write!(f, "pending input overflow"),
            Self::SessionClosed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Unsupported => io::ErrorKind::Unsupported,
            Error::Allocation => io::ErrorKind::OutOfMemory,
            Error::SessionClosed => io::ErrorKind::BrokenPipe,
            Error::TruncatedFrame => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::InvalidData,
        };
        Self::new(kind, err)
    }
}

//! Quietwire Protocol Core
//!
//! Sans-io core of the quietwire secure duplex transport.
//!
//! This crate provides:
//! - A Noise session adapter with an action-driven handshake surface
//! - Length-prefixed wire framing
//! - The chunking codec bridging arbitrary-size writes to the engine's
//!   bounded message size
//!
//! # Security Invariants
//!
//! - Any handshake, framing, or cipher error is terminal for the session
//! - No partial frame is ever emitted and no partially decrypted frame is
//!   ever delivered
//! - Direct use of `unsafe` is forbidden (#![forbid(unsafe_code)])
//! - Private key material is zeroized on drop

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod chunk;
pub mod error;
pub mod frame;
pub mod noise;

pub use chunk::{CHUNK_PAYLOAD, FRAME_LIMIT, MAX_WRITE_LEN};
pub use error::Error;
pub use frame::FrameDecoder;
pub use noise::{CoreAction, NoiseCore, Role, SplitOutcome, TAG_SIZE};

/// Check whether the cryptographic backend supports the session protocol.
pub fn supported() -> bool {
    NoiseCore::supported()
}

//! Quietwire Secure Streams
//!
//! Async duplex transport over the quietwire protocol core. A call to
//! [`secure_pair`] yields two independent byte conduits carrying one
//! cryptographic session:
//!
//! - [`EncryptStream`]: application plaintext written in, framed wire
//!   bytes read out
//! - [`DecryptStream`]: peer wire bytes written in, reconstructed
//!   plaintext read out
//!
//! Connect the encrypt output of one pair to the decrypt input of the
//! other (over any byte transport) and the handshake runs to completion on
//! its own. Writes made before the handshake settles are buffered and
//! released in order; an optional [`VerifyPolicy`] inspects the session
//! keys before any application data flows.
//!
//! ```no_run
//! use quietwire_stream::{secure_pair, SessionConfig};
//!
//! let client = secure_pair(SessionConfig::initiator());
//! let server = secure_pair(SessionConfig::responder());
//! // pipe client.encrypt -> server.decrypt and server.encrypt -> client.decrypt
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

pub mod config;
pub mod decrypt;
pub mod encrypt;
mod pair;
mod shared;
pub mod verify;

pub use config::{Role, SessionConfig};
pub use decrypt::DecryptStream;
pub use encrypt::EncryptStream;
pub use pair::{secure_pair, HandshakeSignal, SecurePair};
pub use quietwire_core::{supported, Error, CHUNK_PAYLOAD, FRAME_LIMIT, MAX_WRITE_LEN, TAG_SIZE};
pub use verify::{HandshakeKeys, VerifyFuture, VerifyPolicy};

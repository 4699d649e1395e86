//! Noise session core adapter.
//!
//! This module wraps the `snow` library behind the action-driven surface the
//! session streams consume. Handshake operations drive an internal action
//! loop to quiescence and report what happened as [`CoreAction`] values, so
//! callers route messages per session instead of listening on a global bus.
//!
//! # Security Properties
//!
//! - Static keys are generated fresh per session unless the caller supplies
//!   a private key; either way the private key is zeroized on drop
//! - Any handshake or cipher error is terminal
//! - The split fires exactly once, after which only transport operations
//!   are accepted

use snow::params::NoiseParams;
use snow::{Builder, HandshakeState, TransportState};
use zeroize::Zeroizing;

use crate::error::Error;

/// Noise protocol pattern identifier.
/// Noise_XX with Curve25519, ChaChaPoly, and BLAKE2s.
const NOISE_PATTERN: &str = "Noise_XX_25519_ChaChaPoly_BLAKE2s";

/// Bytes of authentication data appended to every encrypted chunk.
pub const TAG_SIZE: usize = 16;

/// Maximum size of a single Noise message, handshake or transport.
pub const MAX_MESSAGE_LEN: usize = 65535;

/// X25519 key length.
pub const KEY_LEN: usize = 32;

/// Role in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the first handshake message.
    Initiator,
    /// Receives the first handshake message.
    Responder,
}

/// Key material released by the one-time handshake split.
#[derive(Clone)]
pub struct SplitOutcome {
    /// Authentication tag size of the negotiated transport ciphers.
    pub tag_size: usize,
    /// Local static private key. Zeroized on drop.
    pub local_private_key: Zeroizing<Vec<u8>>,
    /// Local static public key.
    pub local_public_key: Vec<u8>,
    /// Remote static public key observed during the handshake.
    pub remote_public_key: Vec<u8>,
}

impl std::fmt::Debug for SplitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitOutcome")
            .field("tag_size", &self.tag_size)
            .field("local_private_key", &"<redacted>")
            .field("local_public_key", &self.local_public_key)
            .field("remote_public_key", &self.remote_public_key)
            .finish()
    }
}

/// One step of the core's handshake progress, reported to the caller.
#[derive(Debug)]
pub enum CoreAction {
    /// The core produced an outgoing handshake message. Forward it to the
    /// outbound stream verbatim.
    SendHandshake(Vec<u8>),
    /// The core wants the next inbound handshake message. Feed it via
    /// [`NoiseCore::read_handshake`] when one arrives.
    AwaitHandshake,
    /// The handshake completed and transport ciphers are live.
    /// Fires exactly once per session.
    Split(SplitOutcome),
}

enum CoreState {
    /// Handshake in progress.
    Handshake(Box<HandshakeState>),
    /// Transport ciphers established.
    Transport(Box<TransportState>),
    /// Session released (state consumed).
    Closed,
}

/// One session's cryptographic context: handshake state, then the split
/// transport ciphers. Owned exclusively by the session orchestrator.
pub struct NoiseCore {
    state: CoreState,
    role: Role,
    local_private: Zeroizing<[u8; KEY_LEN]>,
    local_public: [u8; KEY_LEN],
}

impl NoiseCore {
    /// Check that the Noise backend can resolve the protocol pattern.
    ///
    /// A `false` here means sessions cannot be created at all; callers
    /// surface [`Error::Unsupported`] instead of probing at use time.
    pub fn supported() -> bool {
        NOISE_PATTERN.parse::<NoiseParams>().is_ok()
    }

    /// Create a new session context.
    ///
    /// A supplied `static_private_key` must be exactly 32 bytes and is used
    /// verbatim; otherwise a fresh keypair is generated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unsupported`] if the pattern cannot be resolved and
    /// [`Error::Creation`] for any other build failure.
    pub fn create(
        role: Role,
        prologue: Option<&[u8]>,
        static_private_key: Option<&[u8]>,
    ) -> Result<Self, Error> {
        let params: NoiseParams = NOISE_PATTERN.parse().map_err(|_| Error::Unsupported)?;

        let (local_private, local_public) = match static_private_key {
            Some(key) => {
                let bytes: [u8; KEY_LEN] = key
                    .try_into()
                    .map_err(|_| Error::Creation("static private key must be 32 bytes".into()))?;
                let public = *x25519_dalek::PublicKey::from(&x25519_dalek::StaticSecret::from(
                    bytes,
                ))
                .as_bytes();
                (Zeroizing::new(bytes), public)
            }
            None => {
                let keypair = Builder::new(params.clone())
                    .generate_keypair()
                    .map_err(|e| Error::Creation(format!("keygen: {e:?}")))?;
                let mut private = [0u8; KEY_LEN];
                let mut public = [0u8; KEY_LEN];
                private.copy_from_slice(&keypair.private);
                public.copy_from_slice(&keypair.public);
                (Zeroizing::new(private), public)
            }
        };

        let mut builder = Builder::new(params)
            .local_private_key(&local_private[..])
            .map_err(|e| Error::Creation(format!("private key: {e:?}")))?;
        if let Some(prologue) = prologue {
            builder = builder
                .prologue(prologue)
                .map_err(|e| Error::Creation(format!("prologue: {e:?}")))?;
        }

        let handshake = match role {
            Role::Initiator => builder.build_initiator(),
            Role::Responder => builder.build_responder(),
        }
        .map_err(|e| Error::Creation(format!("build: {e:?}")))?;

        Ok(Self {
            state: CoreState::Handshake(Box::new(handshake)),
            role,
            local_private,
            local_public,
        })
    }

    /// Get the session role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Check whether the split has happened.
    pub fn is_split(&self) -> bool {
        matches!(self.state, CoreState::Transport(_))
    }

    /// Start the handshake.
    ///
    /// For an initiator this produces the first outgoing message; for a
    /// responder it reports that the core awaits the first inbound message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Creation`] if the core cannot make progress.
    pub fn initialize(&mut self) -> Result<Vec<CoreAction>, Error> {
        let mut actions = Vec::new();
        self.drive(&mut actions)
            .map_err(Error::Creation)?;
        Ok(actions)
    }

    /// Feed one inbound handshake message to the core and collect the
    /// follow-up actions (response messages, another read request, or the
    /// split).
    ///
    /// # Errors
    ///
    /// Returns [`Error::HandshakeRead`] if the message is rejected or the
    /// core cannot make progress afterwards.
    pub fn read_handshake(&mut self, message: &[u8]) -> Result<Vec<CoreAction>, Error> {
        let handshake = match &mut self.state {
            CoreState::Handshake(hs) => hs,
            CoreState::Transport(_) | CoreState::Closed => {
                return Err(Error::HandshakeRead("not in handshake phase".into()));
            }
        };

        let mut buf = vec![0u8; MAX_MESSAGE_LEN];
        let _len = handshake
            .read_message(message, &mut buf)
            .map_err(|e| Error::HandshakeRead(format!("{e:?}")))?;

        let mut actions = Vec::new();
        self.drive(&mut actions)
            .map_err(Error::HandshakeRead)?;
        Ok(actions)
    }

    /// Drive the handshake action loop to quiescence: write while it is our
    /// turn, split when finished, otherwise request a read.
    fn drive(&mut self, actions: &mut Vec<CoreAction>) -> Result<(), String> {
        loop {
            let handshake = match &mut self.state {
                CoreState::Handshake(hs) => hs,
                CoreState::Transport(_) => return Ok(()),
                CoreState::Closed => return Err("session closed".into()),
            };

            if handshake.is_handshake_finished() {
                let outcome = self.split()?;
                actions.push(CoreAction::Split(outcome));
                return Ok(());
            }

            if handshake.is_my_turn() {
                let mut buf = vec![0u8; MAX_MESSAGE_LEN];
                let len = handshake
                    .write_message(&[], &mut buf)
                    .map_err(|e| format!("{e:?}"))?;
                buf.truncate(len);
                actions.push(CoreAction::SendHandshake(buf));
                continue;
            }

            actions.push(CoreAction::AwaitHandshake);
            return Ok(());
        }
    }

    /// Consume the handshake state and establish the transport ciphers.
    fn split(&mut self) -> Result<SplitOutcome, String> {
        let state = std::mem::replace(&mut self.state, CoreState::Closed);
        let handshake = match state {
            CoreState::Handshake(hs) => hs,
            _ => return Err("split outside handshake".into()),
        };

        let remote_public_key = handshake
            .get_remote_static()
            .ok_or_else(|| "remote static key missing".to_owned())?
            .to_vec();

        let transport = handshake
            .into_transport_mode()
            .map_err(|e| format!("{e:?}"))?;
        self.state = CoreState::Transport(Box::new(transport));

        Ok(SplitOutcome {
            tag_size: TAG_SIZE,
            local_private_key: Zeroizing::new(self.local_private.to_vec()),
            local_public_key: self.local_public.to_vec(),
            remote_public_key,
        })
    }

    /// Encrypt one bounded plaintext chunk into `out`, returning the
    /// ciphertext length (`plaintext.len() + TAG_SIZE`). Nonce sequencing
    /// is owned by the transport cipher.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encrypt`] outside the transport phase or on any
    /// cipher fault.
    pub fn encrypt_chunk(&mut self, plaintext: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        let transport = match &mut self.state {
            CoreState::Transport(ts) => ts,
            CoreState::Handshake(_) | CoreState::Closed => {
                return Err(Error::Encrypt("not in transport phase".into()));
            }
        };
        transport
            .write_message(plaintext, out)
            .map_err(|e| Error::Encrypt(format!("{e:?}")))
    }

    /// Decrypt one bounded ciphertext chunk into `out`, returning the
    /// plaintext length (`ciphertext.len() - TAG_SIZE`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decrypt`] outside the transport phase, on a chunk
    /// shorter than the tag, or when authentication fails.
    pub fn decrypt_chunk(&mut self, ciphertext: &[u8], out: &mut [u8]) -> Result<usize, Error> {
        let transport = match &mut self.state {
            CoreState::Transport(ts) => ts,
            CoreState::Handshake(_) | CoreState::Closed => {
                return Err(Error::Decrypt("not in transport phase".into()));
            }
        };
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::Decrypt("chunk shorter than tag".into()));
        }
        transport
            .read_message(ciphertext, out)
            .map_err(|e| Error::Decrypt(format!("{e:?}")))
    }
}

impl std::fmt::Debug for NoiseCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self.state {
            CoreState::Handshake(_) => "handshake",
            CoreState::Transport(_) => "transport",
            CoreState::Closed => "closed",
        };
        f.debug_struct("NoiseCore")
            .field("role", &self.role)
            .field("phase", &phase)
            .finish()
    }
}

//! Pair construction and the one-shot handshake signal.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use quietwire_core::{Error, NoiseCore};

use crate::config::SessionConfig;
use crate::decrypt::DecryptStream;
use crate::encrypt::EncryptStream;
use crate::shared::Shared;
use crate::verify::HandshakeKeys;

/// The two conduits of one secure session.
#[derive(Debug)]
pub struct SecurePair {
    /// Plaintext in, wire bytes out.
    pub encrypt: EncryptStream,
    /// Wire bytes in, plaintext out.
    pub decrypt: DecryptStream,
}

impl SecurePair {
    /// A signal that resolves once with this pair's handshake outcome.
    pub fn handshake_signal(&self) -> HandshakeSignal {
        self.encrypt.handshake_signal()
    }
}

/// Build a connected pair of streams for one session.
///
/// Construction itself never fails: if the backend rejects the parameters
/// (an unsupported pattern, a malformed static key), the returned streams
/// surface that error on first use and the handshake signal resolves with
/// it. The initiator's first handshake message is staged immediately, so
/// wire traffic is available to read as soon as the pair exists.
pub fn secure_pair(config: SessionConfig) -> SecurePair {
    let SessionConfig {
        role,
        prologue,
        static_private_key,
        verify,
    } = config;

    let (keys_tx, _keys_rx) = watch::channel(None);
    let shared = Arc::new(Shared::new(role, verify, keys_tx));

    {
        let mut inner = shared.lock();
        let ready = NoiseCore::create(
            role,
            prologue.as_deref(),
            static_private_key.as_deref().map(Vec::as_slice),
        )
        .and_then(|mut core| {
            let actions = core.initialize()?;
            Ok((core, actions))
        });
        match ready {
            Ok((core, actions)) => {
                debug!(?role, "session created");
                inner.core = Some(core);
                if let Err(err) = shared.apply_actions(&mut inner, actions) {
                    shared.fail(&mut inner, err);
                }
            }
            Err(err) => shared.fail(&mut inner, err),
        }
    }

    SecurePair {
        encrypt: EncryptStream::new(Arc::clone(&shared)),
        decrypt: DecryptStream::new(shared),
    }
}

/// Resolves exactly once with the session's handshake outcome: the key
/// material on success, or the error that ended the session first.
#[derive(Debug)]
pub struct HandshakeSignal {
    rx: watch::Receiver<Option<Result<HandshakeKeys, Error>>>,
}

impl HandshakeSignal {
    pub(crate) fn new(shared: &Shared) -> Self {
        Self {
            rx: shared.subscribe(),
        }
    }

    /// Wait for the handshake outcome.
    pub async fn wait(&mut self) -> Result<HandshakeKeys, Error> {
        loop {
            if let Some(outcome) = self.rx.borrow().clone() {
                return outcome;
            }
            if self.rx.changed().await.is_err() {
                return Err(Error::SessionClosed);
            }
        }
    }
}

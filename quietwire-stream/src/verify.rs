//! Identity verification policy and handshake key material.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use quietwire_core::{Role, SplitOutcome};

/// Future returned by a verification policy.
///
/// `Ok(true)` accepts the remote identity, `Ok(false)` rejects it, and
/// `Err` reports a policy failure. Either negative outcome fails both
/// streams before any transport frame is processed.
pub type VerifyFuture = Pin<Box<dyn Future<Output = Result<bool, String>> + Send + 'static>>;

/// Application-supplied identity verification policy.
///
/// Invoked once, at the handshake split, with the session's key material.
/// The policy may resolve asynchronously; inbound data arriving meanwhile
/// is buffered, never lost.
pub struct VerifyPolicy(Box<dyn Fn(HandshakeKeys) -> VerifyFuture + Send + Sync + 'static>);

impl VerifyPolicy {
    /// Build a policy from an async predicate over the handshake keys.
    pub fn new<F>(check: F) -> Self
    where
        F: Fn(HandshakeKeys) -> VerifyFuture + Send + Sync + 'static,
    {
        Self(Box::new(check))
    }

    /// Build a policy from a synchronous predicate.
    pub fn from_fn<F>(check: F) -> Self
    where
        F: Fn(&HandshakeKeys) -> Result<bool, String> + Send + Sync + 'static,
    {
        Self::new(move |keys| {
            let verdict = check(&keys);
            Box::pin(async move { verdict })
        })
    }

    pub(crate) fn check(&self, keys: HandshakeKeys) -> VerifyFuture {
        (self.0)(keys)
    }
}

impl fmt::Debug for VerifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VerifyPolicy")
    }
}

/// Key material released by the handshake, reported once per session
/// through the handshake signal and the verification policy.
#[derive(Clone)]
pub struct HandshakeKeys {
    role: Role,
    local_private_key: Zeroizing<Vec<u8>>,
    local_public_key: Vec<u8>,
    remote_public_key: Vec<u8>,
}

impl HandshakeKeys {
    pub(crate) fn new(role: Role, outcome: &SplitOutcome) -> Self {
        Self {
            role,
            local_private_key: outcome.local_private_key.clone(),
            local_public_key: outcome.local_public_key.clone(),
            remote_public_key: outcome.remote_public_key.clone(),
        }
    }

    /// Local static private key. Zeroized when the last clone drops.
    pub fn local_private_key(&self) -> &[u8] {
        &self.local_private_key
    }

    /// Local static public key.
    pub fn local_public_key(&self) -> &[u8] {
        &self.local_public_key
    }

    /// Remote static public key observed during the handshake.
    pub fn remote_public_key(&self) -> &[u8] {
        &self.remote_public_key
    }

    /// Session fingerprint for out-of-band comparison.
    ///
    /// First 8 bytes of SHA256(initiator_pub || responder_pub) as hex.
    /// Both peers compute the same 16 characters.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self.role {
            Role::Initiator => {
                hasher.update(&self.local_public_key);
                hasher.update(&self.remote_public_key);
            }
            Role::Responder => {
                hasher.update(&self.remote_public_key);
                hasher.update(&self.local_public_key);
            }
        }
        let digest = hasher.finalize();
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for HandshakeKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeKeys")
            .field("role", &self.role)
            .field("local_private_key", &"<redacted>")
            .field("local_public_key", &hex::encode(&self.local_public_key))
            .field("remote_public_key", &hex::encode(&self.remote_public_key))
            .finish()
    }
}

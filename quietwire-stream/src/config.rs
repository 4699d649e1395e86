//! Session configuration.

use zeroize::Zeroizing;

use crate::verify::VerifyPolicy;
pub use quietwire_core::Role;

/// Configuration for a secure stream pair.
///
/// This struct does not implement `Clone` to prevent accidental duplication
/// of key material.
pub struct SessionConfig {
    pub(crate) role: Role,
    pub(crate) prologue: Option<Vec<u8>>,
    pub(crate) static_private_key: Option<Zeroizing<Vec<u8>>>,
    pub(crate) verify: Option<VerifyPolicy>,
}

impl SessionConfig {
    /// Configuration for the session initiator.
    pub fn initiator() -> Self {
        Self::new(Role::Initiator)
    }

    /// Configuration for the session responder.
    pub fn responder() -> Self {
        Self::new(Role::Responder)
    }

    fn new(role: Role) -> Self {
        Self {
            role,
            prologue: None,
            static_private_key: None,
            verify: None,
        }
    }

    /// Mix a prologue into the handshake transcript.
    ///
    /// Both peers must supply identical prologue bytes or the handshake
    /// fails on both sides.
    pub fn with_prologue(mut self, prologue: impl Into<Vec<u8>>) -> Self {
        self.prologue = Some(prologue.into());
        self
    }

    /// Use a fixed 32-byte static private key instead of generating one.
    pub fn with_static_private_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.static_private_key = Some(Zeroizing::new(key.into()));
        self
    }

    /// Gate the handshake split on a verification policy.
    ///
    /// Without a policy the remote identity is implicitly accepted.
    pub fn with_verify(mut self, policy: VerifyPolicy) -> Self {
        self.verify = Some(policy);
        self
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("role", &self.role)
            .field("prologue", &self.prologue.as_ref().map(|p| p.len()))
            .field("static_private_key", &self.static_private_key.is_some())
            .field("verify", &self.verify.is_some())
            .finish()
    }
}

//! Per-pair session state and handshake coordination.
//!
//! One [`Shared`] instance is owned jointly by the two streams of a pair.
//! It holds the session handle, the handshake routing state, both legs'
//! buffers, and the cleanup reference count. Every operation locks, runs to
//! completion, and parks at most one waker per side, which preserves the
//! "no two operations touch a session concurrently" discipline.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::Waker;

use tokio::io::ReadBuf;
use tokio::sync::watch;
use tracing::{debug, trace};

use quietwire_core::{chunk, frame, CoreAction, Error, FrameDecoder, NoiseCore, Role, SplitOutcome};

use crate::verify::{HandshakeKeys, VerifyPolicy};

/// Staged wire bytes beyond which plaintext writers park.
pub(crate) const OUTBOUND_HIGH_WATER: usize = 1 << 20;

/// Buffered plaintext beyond which the wire writer parks.
pub(crate) const PLAINTEXT_HIGH_WATER: usize = 1 << 20;

/// Session phase as the streams observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Handshake messages are being exchanged.
    Handshaking,
    /// The split fired; the verification policy has not resolved yet.
    VerifyPending,
    /// Transport framing is active.
    Split,
}

/// The inbound stream's buffer of one: a single frame staged while no
/// deterministic consumer is attached. Holding a second frame is a
/// protocol bug, not a flow-control state.
#[derive(Debug, Default)]
pub(crate) enum PendingInput {
    /// No frame staged.
    #[default]
    Empty,
    /// One frame awaiting its consumer, delivered FIFO.
    Staged(Vec<u8>),
}

impl PendingInput {
    pub(crate) fn is_staged(&self) -> bool {
        matches!(self, Self::Staged(_))
    }

    pub(crate) fn take(&mut self) -> Option<Vec<u8>> {
        match std::mem::take(self) {
            Self::Staged(frame) => Some(frame),
            Self::Empty => None,
        }
    }

    pub(crate) fn stage(&mut self, frame: Vec<u8>) -> Result<(), Error> {
        if self.is_staged() {
            return Err(Error::PendingOverflow);
        }
        *self = Self::Staged(frame);
        Ok(())
    }
}

pub(crate) struct Inner {
    /// The session handle. `None` after creation failure or final release.
    pub(crate) core: Option<NoiseCore>,
    pub(crate) phase: Phase,
    pub(crate) error: Option<Error>,
    pub(crate) role: Role,

    // Outbound leg.
    pub(crate) outbound: VecDeque<u8>,
    pub(crate) queued_writes: VecDeque<Vec<u8>>,
    /// Total bytes held in `queued_writes`, counted against the outbound
    /// high-water mark so pre-split writers cannot queue unboundedly.
    pub(crate) queued_bytes: usize,
    pub(crate) encrypt_write_ended: bool,

    // Inbound leg.
    pub(crate) decoder: FrameDecoder,
    pub(crate) pending: PendingInput,
    pub(crate) await_handshake: bool,
    pub(crate) plaintext: VecDeque<u8>,
    pub(crate) inbound_ended: bool,

    // Parked tasks, at most one per side.
    encrypt_read_waker: Option<Waker>,
    encrypt_write_waker: Option<Waker>,
    decrypt_read_waker: Option<Waker>,
    decrypt_write_waker: Option<Waker>,

    // Lifecycle.
    owners: u8,
    keys_tx: watch::Sender<Option<Result<HandshakeKeys, Error>>>,
    verify: Option<VerifyPolicy>,
}

impl Inner {
    pub(crate) fn park_encrypt_read(&mut self, waker: &Waker) {
        self.encrypt_read_waker = Some(waker.clone());
    }

    pub(crate) fn park_encrypt_write(&mut self, waker: &Waker) {
        self.encrypt_write_waker = Some(waker.clone());
    }

    pub(crate) fn park_decrypt_read(&mut self, waker: &Waker) {
        self.decrypt_read_waker = Some(waker.clone());
    }

    pub(crate) fn park_decrypt_write(&mut self, waker: &Waker) {
        self.decrypt_write_waker = Some(waker.clone());
    }

    pub(crate) fn wake_encrypt_read(&mut self) {
        if let Some(waker) = self.encrypt_read_waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn wake_encrypt_write(&mut self) {
        if let Some(waker) = self.encrypt_write_waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn wake_decrypt_read(&mut self) {
        if let Some(waker) = self.decrypt_read_waker.take() {
            waker.wake();
        }
    }

    pub(crate) fn wake_decrypt_write(&mut self) {
        if let Some(waker) = self.decrypt_write_waker.take() {
            waker.wake();
        }
    }

    fn wake_all(&mut self) {
        self.wake_encrypt_read();
        self.wake_encrypt_write();
        self.wake_decrypt_read();
        self.wake_decrypt_write();
    }

    /// Whether the outbound wire side has reached end of stream.
    pub(crate) fn encrypt_read_eof(&self) -> bool {
        self.encrypt_write_ended
            && self.phase == Phase::Split
            && self.queued_writes.is_empty()
            && self.outbound.is_empty()
    }

    /// Chunk-encrypt one application write into exactly one staged wire
    /// frame. Nothing is staged if any chunk fails.
    pub(crate) fn write_transport(&mut self, plaintext: &[u8]) -> Result<(), Error> {
        let core = self.core.as_mut().ok_or(Error::SessionClosed)?;
        let payload = chunk::encrypt_frame(core, plaintext)?;
        let mut wire = Vec::new();
        frame::encode_frame(&payload, &mut wire)?;
        self.outbound.extend(wire);
        self.wake_encrypt_read();
        Ok(())
    }

    /// Decrypt one inbound frame and buffer the reconstructed write for the
    /// plaintext read side. Nothing is buffered if any chunk fails.
    fn decode_inbound(&mut self, frame: &[u8]) -> Result<(), Error> {
        let core = self.core.as_mut().ok_or(Error::SessionClosed)?;
        let plaintext = chunk::decrypt_frame(core, frame)?;
        self.plaintext.extend(plaintext);
        self.wake_decrypt_read();
        Ok(())
    }

    /// Release writes queued before the split, preserving order.
    fn flush_queued(&mut self) -> Result<(), Error> {
        while let Some(plaintext) = self.queued_writes.pop_front() {
            self.queued_bytes -= plaintext.len();
            self.write_transport(&plaintext)?;
        }
        Ok(())
    }

    fn signal_resolved(&self) -> bool {
        self.keys_tx.borrow().is_some()
    }
}

/// State shared by the two streams of one pair.
pub(crate) struct Shared {
    inner: Mutex<Inner>,
}

impl Shared {
    pub(crate) fn new(
        role: Role,
        verify: Option<VerifyPolicy>,
        keys_tx: watch::Sender<Option<Result<HandshakeKeys, Error>>>,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                core: None,
                phase: Phase::Handshaking,
                error: None,
                role,
                outbound: VecDeque::new(),
                queued_writes: VecDeque::new(),
                queued_bytes: 0,
                encrypt_write_ended: false,
                decoder: FrameDecoder::new(),
                pending: PendingInput::Empty,
                await_handshake: false,
                plaintext: VecDeque::new(),
                inbound_ended: false,
                encrypt_read_waker: None,
                encrypt_write_waker: None,
                decrypt_read_waker: None,
                decrypt_write_waker: None,
                owners: 2,
                keys_tx,
                verify,
            }),
        }
    }

    /// Lock the pair state. Poisoning is unreachable because no operation
    /// panics while holding the lock; treat it as already-unlocked anyway.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// A fresh receiver for the handshake outcome slot.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Result<HandshakeKeys, Error>>> {
        self.lock().keys_tx.subscribe()
    }

    /// Route one completed inbound frame: transport decode when the split
    /// is active, otherwise the awaiting handshake consumer, otherwise the
    /// single staged slot.
    pub(crate) fn route_frame(
        self: &Arc<Self>,
        inner: &mut Inner,
        frame: Vec<u8>,
    ) -> Result<(), Error> {
        match inner.phase {
            Phase::Split => inner.decode_inbound(&frame),
            Phase::Handshaking if inner.await_handshake => {
                inner.await_handshake = false;
                let core = inner.core.as_mut().ok_or(Error::SessionClosed)?;
                let actions = core.read_handshake(&frame)?;
                self.apply_actions(inner, actions)
            }
            Phase::Handshaking | Phase::VerifyPending => {
                trace!(role = ?inner.role, "staging inbound frame");
                inner.pending.stage(frame)
            }
        }
    }

    /// Apply the core's reported actions, including any follow-up actions
    /// produced by draining the staged slot into a requested read.
    pub(crate) fn apply_actions(
        self: &Arc<Self>,
        inner: &mut Inner,
        actions: Vec<CoreAction>,
    ) -> Result<(), Error> {
        let mut queue: VecDeque<CoreAction> = actions.into();
        while let Some(action) = queue.pop_front() {
            match action {
                CoreAction::SendHandshake(message) => {
                    let mut wire = Vec::new();
                    frame::encode_frame(&message, &mut wire)?;
                    inner.outbound.extend(wire);
                    inner.wake_encrypt_read();
                }
                CoreAction::AwaitHandshake => {
                    inner.await_handshake = true;
                    if let Some(frame) = inner.pending.take() {
                        inner.await_handshake = false;
                        let core = inner.core.as_mut().ok_or(Error::SessionClosed)?;
                        queue.extend(core.read_handshake(&frame)?);
                        inner.wake_decrypt_write();
                    }
                }
                CoreAction::Split(outcome) => self.begin_split(inner, &outcome),
            }
        }
        Ok(())
    }

    /// Start the one-time split transition, gated on the verification
    /// policy when one is configured.
    fn begin_split(self: &Arc<Self>, inner: &mut Inner, outcome: &SplitOutcome) {
        let keys = HandshakeKeys::new(inner.role, outcome);
        match inner.verify.take() {
            None => self.complete_split(inner, keys),
            Some(policy) => {
                debug!(role = ?inner.role, "split gated on verification policy");
                inner.phase = Phase::VerifyPending;
                let verdict = policy.check(keys.clone());
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    let verdict = verdict.await;
                    let mut inner = shared.lock();
                    if inner.error.is_some() {
                        return;
                    }
                    match verdict {
                        Ok(true) => shared.complete_split(&mut inner, keys),
                        Ok(false) => shared.fail(&mut inner, Error::VerifyRejected),
                        Err(cause) => shared.fail(&mut inner, Error::Verify(cause)),
                    }
                });
            }
        }
    }

    /// Activate transport framing on both streams: flush writes queued
    /// before the split, drain a staged inbound frame through transport
    /// decoding, and resolve the handshake signal with the keys.
    fn complete_split(&self, inner: &mut Inner, keys: HandshakeKeys) {
        inner.phase = Phase::Split;
        // Queued writes and any staged inbound frame go through transport
        // framing first: a failure here is what the signal must carry, not
        // a success it would have to retract.
        if let Err(err) = inner.flush_queued() {
            self.fail(inner, err);
            return;
        }
        if let Some(frame) = inner.pending.take() {
            if let Err(err) = inner.decode_inbound(&frame) {
                self.fail(inner, err);
                return;
            }
        }
        debug!(role = ?inner.role, fingerprint = %keys.fingerprint(), "handshake complete");
        // send_replace stores the outcome even before anyone subscribes.
        inner.keys_tx.send_replace(Some(Ok(keys)));
        inner.wake_all();
    }

    /// Fail the session: record the error once, resolve the handshake
    /// signal if it has not fired, drop the session handle, and wake every
    /// parked task on both streams.
    pub(crate) fn fail(&self, inner: &mut Inner, err: Error) {
        if inner.error.is_some() {
            return;
        }
        debug!(role = ?inner.role, error = %err, "session failed");
        if !inner.signal_resolved() {
            inner.keys_tx.send_replace(Some(Err(err.clone())));
        }
        inner.error = Some(err);
        inner.core = None;
        inner.queued_writes.clear();
        inner.queued_bytes = 0;
        inner.wake_all();
    }

    /// Release one of the two stream owners. The session handle drops with
    /// the last owner, never while the sibling might still touch it.
    pub(crate) fn release_owner(&self, inner: &mut Inner) {
        inner.owners = inner.owners.saturating_sub(1);
        if inner.owners == 0 {
            trace!(role = ?inner.role, "last owner released session");
            inner.core = None;
            if !inner.signal_resolved() {
                inner.keys_tx.send_replace(Some(Err(Error::SessionClosed)));
            }
        }
    }
}

/// Copy bytes from the front of `deque` into `buf`, returning the count.
pub(crate) fn copy_to_readbuf(deque: &mut VecDeque<u8>, buf: &mut ReadBuf<'_>) -> usize {
    let mut copied = 0;
    while buf.remaining() > 0 && !deque.is_empty() {
        let (front, _) = deque.as_slices();
        let take = front.len().min(buf.remaining());
        buf.put_slice(&front[..take]);
        deque.drain(..take);
        copied += take;
    }
    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use quietwire_core::TAG_SIZE;
    use zeroize::Zeroizing;

    #[test]
    fn test_split_flush_failure_reports_error_not_keys() {
        let (tx, rx) = watch::channel(None);
        let shared = Arc::new(Shared::new(Role::Initiator, None, tx));
        let keys = HandshakeKeys::new(
            Role::Initiator,
            &SplitOutcome {
                tag_size: TAG_SIZE,
                local_private_key: Zeroizing::new(vec![0u8; 32]),
                local_public_key: vec![1u8; 32],
                remote_public_key: vec![2u8; 32],
            },
        );

        // A queued write with no session handle cannot flush; the signal
        // must carry that error rather than an already-sent success.
        let mut inner = shared.lock();
        inner.queued_writes.push_back(vec![0u8; 8]);
        inner.queued_bytes = 8;
        shared.complete_split(&mut inner, keys);
        drop(inner);

        match rx.borrow().clone() {
            Some(Err(Error::SessionClosed)) => {}
            other => panic!("expected the flush error in the signal, got {other:?}"),
        };
    }

    #[test]
    fn test_pending_input_single_slot() {
        let mut pending = PendingInput::Empty;
        assert!(!pending.is_staged());
        assert_eq!(pending.take(), None);

        pending.stage(vec![1, 2]).unwrap();
        assert!(pending.is_staged());
        assert_eq!(pending.stage(vec![3]).unwrap_err(), Error::PendingOverflow);

        assert_eq!(pending.take(), Some(vec![1, 2]));
        assert_eq!(pending.take(), None);
    }

    #[test]
    fn test_copy_to_readbuf_wraps_slices() {
        let mut deque: VecDeque<u8> = VecDeque::with_capacity(8);
        // Force a wrapped layout: push, drain, push past the boundary.
        deque.extend([0u8; 6]);
        deque.drain(..5);
        deque.extend(1u8..=6);

        let mut storage = [0u8; 16];
        let mut buf = ReadBuf::new(&mut storage);
        let copied = copy_to_readbuf(&mut deque, &mut buf);
        assert_eq!(copied, 7);
        assert_eq!(buf.filled(), &[0, 1, 2, 3, 4, 5, 6]);
        assert!(deque.is_empty());
    }
}

//! The outbound conduit: plaintext in, wire bytes out.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use quietwire_core::{Error, MAX_WRITE_LEN};

use crate::pair::HandshakeSignal;
use crate::shared::{copy_to_readbuf, Phase, Shared, OUTBOUND_HIGH_WATER};

/// The encrypting half of a pair.
///
/// Application plaintext written here comes out of the read side as framed
/// wire bytes: handshake messages first, then chunk-encrypted transport
/// frames. Writes made before the handshake settles are buffered and
/// released in order once the split completes. Shutting down the write side
/// ends the wire byte stream after everything buffered has drained.
pub struct EncryptStream {
    shared: Arc<Shared>,
    shutdown_done: bool,
}

impl EncryptStream {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            shutdown_done: false,
        }
    }

    /// A signal that resolves once for this pair's handshake outcome.
    pub fn handshake_signal(&self) -> HandshakeSignal {
        HandshakeSignal::new(&self.shared)
    }
}

impl AsyncWrite for EncryptStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.shared.lock();
        if let Some(err) = &inner.error {
            return Poll::Ready(Err(err.clone().into()));
        }
        if inner.encrypt_write_ended {
            return Poll::Ready(Err(Error::SessionClosed.into()));
        }
        if buf.is_empty() {
            return Poll::Ready(Ok(0));
        }
        if inner.outbound.len() + inner.queued_bytes >= OUTBOUND_HIGH_WATER {
            inner.park_encrypt_write(cx.waker());
            return Poll::Pending;
        }
        // Accept at most one frame's worth of payload per call; a larger
        // write is taken in slices and spans multiple frames.
        let buf = &buf[..buf.len().min(MAX_WRITE_LEN)];
        match inner.phase {
            Phase::Split => {
                if let Err(err) = inner.write_transport(buf) {
                    self.shared.fail(&mut inner, err.clone());
                    return Poll::Ready(Err(err.into()));
                }
            }
            Phase::Handshaking | Phase::VerifyPending => {
                trace!(len = buf.len(), "queueing write until handshake settles");
                let mut queued = Vec::new();
                if queued.try_reserve_exact(buf.len()).is_err() {
                    let err = Error::Allocation;
                    self.shared.fail(&mut inner, err.clone());
                    return Poll::Ready(Err(err.into()));
                }
                queued.extend_from_slice(buf);
                inner.queued_bytes += queued.len();
                inner.queued_writes.push_back(queued);
            }
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.shutdown_done = true;
        let mut inner = self.shared.lock();
        inner.encrypt_write_ended = true;
        // The wire reader may now be able to observe end of stream.
        inner.wake_encrypt_read();
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for EncryptStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock();
        if !inner.outbound.is_empty() {
            copy_to_readbuf(&mut inner.outbound, buf);
            if inner.outbound.len() < OUTBOUND_HIGH_WATER {
                inner.wake_encrypt_write();
            }
            return Poll::Ready(Ok(()));
        }
        if inner.encrypt_read_eof() {
            return Poll::Ready(Ok(()));
        }
        // Staged wire bytes drain before an error surfaces, so handshake
        // replies written ahead of a failure still reach the peer.
        if let Some(err) = &inner.error {
            return Poll::Ready(Err(err.clone().into()));
        }
        inner.park_encrypt_read(cx.waker());
        Poll::Pending
    }
}

impl Drop for EncryptStream {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if !self.shutdown_done && inner.error.is_none() {
            self.shared.fail(&mut inner, Error::SessionClosed);
        }
        self.shared.release_owner(&mut inner);
    }
}

impl std::fmt::Debug for EncryptStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptStream")
            .field("shutdown_done", &self.shutdown_done)
            .finish_non_exhaustive()
    }
}

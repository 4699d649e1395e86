//! The inbound conduit: wire bytes in, plaintext out.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use quietwire_core::Error;

use crate::pair::HandshakeSignal;
use crate::shared::{copy_to_readbuf, Phase, Shared, PLAINTEXT_HIGH_WATER};

/// The decrypting half of a pair.
///
/// Wire bytes written here are reassembled into frames and routed: during
/// the handshake they feed the session state machine, afterwards they are
/// chunk-decrypted and come out of the read side as the peer's original
/// writes. At most one frame is held while the handshake settles; the
/// writer parks rather than overrunning that slot. Shutting down the write
/// side marks end of data and ends the plaintext read stream once buffered
/// output drains.
pub struct DecryptStream {
    shared: Arc<Shared>,
}

impl DecryptStream {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// A signal that resolves once for this pair's handshake outcome.
    pub fn handshake_signal(&self) -> HandshakeSignal {
        HandshakeSignal::new(&self.shared)
    }
}

impl AsyncWrite for DecryptStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut inner = self.shared.lock();
        if let Some(err) = &inner.error {
            return Poll::Ready(Err(err.clone().into()));
        }
        if inner.inbound_ended {
            return Poll::Ready(Err(Error::SessionClosed.into()));
        }
        let mut consumed = 0;
        while consumed < buf.len() {
            if inner.plaintext.len() >= PLAINTEXT_HIGH_WATER
                || (inner.pending.is_staged() && inner.phase != Phase::Split)
            {
                break;
            }
            let (read, frame) = match inner.decoder.feed(&buf[consumed..]) {
                Ok(step) => step,
                Err(err) => {
                    self.shared.fail(&mut inner, err.clone());
                    return Poll::Ready(Err(err.into()));
                }
            };
            consumed += read;
            if let Some(frame) = frame {
                if let Err(err) = self.shared.route_frame(&mut inner, frame) {
                    self.shared.fail(&mut inner, err.clone());
                    return Poll::Ready(Err(err.into()));
                }
            }
            if read == 0 {
                break;
            }
        }
        if consumed == 0 {
            inner.park_decrypt_write(cx.waker());
            return Poll::Pending;
        }
        Poll::Ready(Ok(consumed))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock();
        if inner.inbound_ended {
            return Poll::Ready(Ok(()));
        }
        if let Err(err) = inner.decoder.finish() {
            inner.inbound_ended = true;
            self.shared.fail(&mut inner, err.clone());
            return Poll::Ready(Err(err.into()));
        }
        inner.inbound_ended = true;
        // The plaintext reader can now observe end of stream.
        inner.wake_decrypt_read();
        Poll::Ready(Ok(()))
    }
}

impl AsyncRead for DecryptStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut inner = self.shared.lock();
        if !inner.plaintext.is_empty() {
            copy_to_readbuf(&mut inner.plaintext, buf);
            if inner.plaintext.len() < PLAINTEXT_HIGH_WATER {
                inner.wake_decrypt_write();
            }
            return Poll::Ready(Ok(()));
        }
        if let Some(err) = &inner.error {
            return Poll::Ready(Err(err.clone().into()));
        }
        // A frame staged behind a pending verification can still become
        // plaintext, so end of data alone does not end the read side.
        if inner.inbound_ended && !inner.pending.is_staged() {
            return Poll::Ready(Ok(()));
        }
        inner.park_decrypt_read(cx.waker());
        Poll::Pending
    }
}

impl Drop for DecryptStream {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        if !inner.inbound_ended && inner.error.is_none() {
            self.shared.fail(&mut inner, Error::SessionClosed);
        }
        self.shared.release_owner(&mut inner);
    }
}

impl std::fmt::Debug for DecryptStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptStream").finish_non_exhaustive()
    }
}

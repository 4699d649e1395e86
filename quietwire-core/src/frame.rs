//! Wire framing.
//!
//! Wire format:
//! ```text
//! +----------------+------------------+
//! | LENGTH (4B BE) | PAYLOAD (N bytes)|
//! +----------------+------------------+
//! ```
//!
//! A zero-length payload is a valid frame and is distinct from end of
//! stream, which the decoder's [`FrameDecoder::finish`] models. During the
//! handshake a frame carries one handshake message; after the split it
//! carries the concatenated ciphertext chunks of one application write.

use crate::error::Error;

/// Length prefix size.
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Maximum frame payload length accepted from the wire.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Append one length-prefixed frame to `out`.
///
/// # Errors
///
/// Returns [`Error::FrameTooLarge`] for payloads over [`MAX_FRAME_LEN`] and
/// [`Error::Allocation`] if the output buffer cannot grow.
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge);
    }
    out.try_reserve(LENGTH_PREFIX_LEN + payload.len())
        .map_err(|_| Error::Allocation)?;
    // Cast is safe: MAX_FRAME_LEN fits in u32.
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

/// Incremental frame decoder.
///
/// [`FrameDecoder::feed`] consumes input only up to the completion of one
/// frame, so the caller can stop reading from the wire at frame granularity
/// while a frame waits for its consumer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    header: [u8; LENGTH_PREFIX_LEN],
    header_len: usize,
    body: Vec<u8>,
    /// Target body length, known once the header is complete.
    body_len: Option<usize>,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume bytes from `input` until at most one frame completes.
    ///
    /// Returns how many bytes were consumed and the completed frame payload,
    /// if any. Call again with the unconsumed remainder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] for an oversized length prefix and
    /// [`Error::Allocation`] if the body buffer cannot be reserved.
    pub fn feed(&mut self, input: &[u8]) -> Result<(usize, Option<Vec<u8>>), Error> {
        let mut consumed = 0;

        if self.body_len.is_none() {
            let take = (LENGTH_PREFIX_LEN - self.header_len).min(input.len());
            self.header[self.header_len..self.header_len + take]
                .copy_from_slice(&input[..take]);
            self.header_len += take;
            consumed += take;

            if self.header_len < LENGTH_PREFIX_LEN {
                return Ok((consumed, None));
            }

            let len = u32::from_be_bytes(self.header) as usize;
            if len > MAX_FRAME_LEN {
                return Err(Error::FrameTooLarge);
            }
            self.body.clear();
            self.body.try_reserve_exact(len).map_err(|_| Error::Allocation)?;
            self.body_len = Some(len);
        }

        let len = match self.body_len {
            Some(len) => len,
            None => return Ok((consumed, None)),
        };
        let take = (len - self.body.len()).min(input.len() - consumed);
        self.body.extend_from_slice(&input[consumed..consumed + take]);
        consumed += take;

        if self.body.len() == len {
            self.header_len = 0;
            self.body_len = None;
            return Ok((consumed, Some(std::mem::take(&mut self.body))));
        }
        Ok((consumed, None))
    }

    /// Signal end of the wire byte sequence.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TruncatedFrame`] if the stream ended mid-frame.
    pub fn finish(&self) -> Result<(), Error> {
        if self.header_len != 0 || self.body_len.is_some() {
            return Err(Error::TruncatedFrame);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(decoder: &mut FrameDecoder, mut input: &[u8]) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while !input.is_empty() {
            let (n, frame) = decoder.feed(input).unwrap();
            input = &input[n..];
            if let Some(frame) = frame {
                frames.push(frame);
            }
        }
        frames
    }

    #[test]
    fn test_roundtrip() {
        let mut wire = Vec::new();
        encode_frame(&[1, 2, 3, 4], &mut wire).unwrap();
        assert_eq!(wire.len(), LENGTH_PREFIX_LEN + 4);

        let mut decoder = FrameDecoder::new();
        let frames = drain(&mut decoder, &wire);
        assert_eq!(frames, vec![vec![1, 2, 3, 4]]);
        decoder.finish().unwrap();
    }

    #[test]
    fn test_empty_frame_is_not_eof() {
        let mut wire = Vec::new();
        encode_frame(&[], &mut wire).unwrap();
        encode_frame(&[9], &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let frames = drain(&mut decoder, &wire);
        assert_eq!(frames, vec![vec![], vec![9]]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut wire = Vec::new();
        encode_frame(b"fragmented delivery", &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in &wire {
            let (n, frame) = decoder.feed(std::slice::from_ref(byte)).unwrap();
            assert_eq!(n, 1);
            if let Some(frame) = frame {
                frames.push(frame);
            }
        }
        assert_eq!(frames, vec![b"fragmented delivery".to_vec()]);
    }

    #[test]
    fn test_feed_stops_after_one_frame() {
        let mut wire = Vec::new();
        encode_frame(&[1], &mut wire).unwrap();
        encode_frame(&[2], &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let (n, frame) = decoder.feed(&wire).unwrap();
        assert_eq!(frame, Some(vec![1]));
        assert!(n < wire.len());

        let (_, frame) = decoder.feed(&wire[n..]).unwrap();
        assert_eq!(frame, Some(vec![2]));
    }

    #[test]
    fn test_oversized_prefix_rejected() {
        let bad = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(&bad).unwrap_err(), Error::FrameTooLarge);
    }

    #[test]
    fn test_truncated_frame_detected() {
        let mut wire = Vec::new();
        encode_frame(&[1, 2, 3], &mut wire).unwrap();

        let mut decoder = FrameDecoder::new();
        let (_, frame) = decoder.feed(&wire[..wire.len() - 1]).unwrap();
        assert_eq!(frame, None);
        assert_eq!(decoder.finish().unwrap_err(), Error::TruncatedFrame);
    }

    #[test]
    fn test_encode_oversized_payload() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        let mut out = Vec::new();
        assert_eq!(encode_frame(&payload, &mut out).unwrap_err(), Error::FrameTooLarge);
    }
}

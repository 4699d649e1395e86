//! Chunking transport codec.
//!
//! The cryptographic engine only accepts messages up to [`FRAME_LIMIT`]
//! bytes, so one application write is carried as a sequence of bounded
//! chunks concatenated into a single wire frame. The wire chunk size is a
//! fixed [`FRAME_LIMIT`] with tag-aware plaintext sizing: an outbound chunk
//! holds `FRAME_LIMIT - TAG_SIZE` plaintext bytes plus the tag, and the
//! receiver splits an incoming frame at `FRAME_LIMIT` boundaries.
//!
//! Delivery is all-or-nothing per frame: a failure at any chunk aborts the
//! remaining chunks and discards everything produced so far.

use crate::error::Error;
use crate::noise::{NoiseCore, MAX_MESSAGE_LEN, TAG_SIZE};

/// Maximum wire chunk size (ciphertext, tag included).
pub const FRAME_LIMIT: usize = MAX_MESSAGE_LEN;

/// Maximum plaintext carried per chunk.
pub const CHUNK_PAYLOAD: usize = FRAME_LIMIT - TAG_SIZE;

/// Largest plaintext write carried by a single wire frame.
///
/// Whole chunks only: as many full wire slots as fit under
/// [`crate::frame::MAX_FRAME_LEN`]. A larger application write is accepted
/// in slices of at most this size, each becoming its own frame.
pub const MAX_WRITE_LEN: usize = (crate::frame::MAX_FRAME_LEN / FRAME_LIMIT) * CHUNK_PAYLOAD;

/// Number of chunks a plaintext write of `len` bytes produces.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_PAYLOAD)
}

/// Encrypt one application write into one frame payload: the concatenation
/// of every ciphertext chunk. An empty write produces an empty payload.
///
/// # Errors
///
/// Returns [`Error::Allocation`] if the frame buffer cannot be reserved and
/// [`Error::Encrypt`] on any chunk failure; no partial frame survives
/// either.
pub fn encrypt_frame(core: &mut NoiseCore, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    let n = chunk_count(plaintext.len());
    let mut frame = Vec::new();
    frame
        .try_reserve_exact(plaintext.len() + n * TAG_SIZE)
        .map_err(|_| Error::Allocation)?;

    for chunk in plaintext.chunks(CHUNK_PAYLOAD) {
        let start = frame.len();
        frame.resize(start + chunk.len() + TAG_SIZE, 0);
        let written = core.encrypt_chunk(chunk, &mut frame[start..])?;
        frame.truncate(start + written);
    }
    Ok(frame)
}

/// Decrypt one frame payload back into the original application write.
/// Splits the frame at [`FRAME_LIMIT`] boundaries and concatenates the
/// chunk plaintexts. An empty frame reconstructs an empty write.
///
/// # Errors
///
/// Returns [`Error::Allocation`] if the output buffer cannot be reserved
/// and [`Error::Decrypt`] on any chunk failure; partially decrypted bytes
/// of the frame are discarded, never delivered.
pub fn decrypt_frame(core: &mut NoiseCore, frame: &[u8]) -> Result<Vec<u8>, Error> {
    let n = frame.len().div_ceil(FRAME_LIMIT);
    if frame.len() < n * TAG_SIZE {
        return Err(Error::Decrypt("frame shorter than chunk tags".into()));
    }

    // Reserve the frame length, not the final plaintext length: each chunk
    // is sized up before decryption trims it back by the tag.
    let mut plaintext = Vec::new();
    plaintext
        .try_reserve_exact(frame.len())
        .map_err(|_| Error::Allocation)?;

    for chunk in frame.chunks(FRAME_LIMIT) {
        let start = plaintext.len();
        plaintext.resize(start + chunk.len(), 0);
        let written = core.decrypt_chunk(chunk, &mut plaintext[start..])?;
        plaintext.truncate(start + written);
    }
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::Role;

    fn split_pair() -> (NoiseCore, NoiseCore) {
        let mut initiator = NoiseCore::create(Role::Initiator, None, None).unwrap();
        let mut responder = NoiseCore::create(Role::Responder, None, None).unwrap();
        crate::noise::tests::run_handshake(&mut initiator, &mut responder);
        (initiator, responder)
    }

    #[test]
    fn test_chunk_count() {
        assert_eq!(chunk_count(0), 0);
        assert_eq!(chunk_count(1), 1);
        assert_eq!(chunk_count(CHUNK_PAYLOAD), 1);
        assert_eq!(chunk_count(CHUNK_PAYLOAD + 1), 2);
        assert_eq!(chunk_count(65535), 2);
        assert_eq!(chunk_count(3 * CHUNK_PAYLOAD), 3);
    }

    #[test]
    fn test_max_write_fits_one_frame() {
        assert_eq!(MAX_WRITE_LEN % CHUNK_PAYLOAD, 0);
        assert!(
            MAX_WRITE_LEN + chunk_count(MAX_WRITE_LEN) * TAG_SIZE
                <= crate::frame::MAX_FRAME_LEN
        );
        // One more chunk would push the frame payload over the bound.
        let over = MAX_WRITE_LEN + CHUNK_PAYLOAD;
        assert!(over + chunk_count(over) * TAG_SIZE > crate::frame::MAX_FRAME_LEN);
    }

    #[test]
    fn test_roundtrip_sizes() {
        let (mut sender, mut receiver) = split_pair();

        for len in [0usize, 1, 100, CHUNK_PAYLOAD, FRAME_LIMIT, 65535 * 2 + 7] {
            let message: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = encrypt_frame(&mut sender, &message).unwrap();
            assert_eq!(frame.len(), len + chunk_count(len) * TAG_SIZE);

            let out = decrypt_frame(&mut receiver, &frame).unwrap();
            assert_eq!(out, message);
        }
    }

    #[test]
    fn test_one_write_one_frame_boundary() {
        let (mut sender, mut receiver) = split_pair();

        // A write just over one chunk of payload occupies a full wire slot
        // plus a remainder chunk.
        let message = vec![0xAB; CHUNK_PAYLOAD + 1];
        let frame = encrypt_frame(&mut sender, &message).unwrap();
        assert_eq!(frame.len(), FRAME_LIMIT + 1 + TAG_SIZE);
        assert_eq!(decrypt_frame(&mut receiver, &frame).unwrap(), message);
    }

    #[test]
    fn test_corrupt_chunk_discards_whole_frame() {
        let (mut sender, mut receiver) = split_pair();

        let message = vec![0x5A; CHUNK_PAYLOAD + 64];
        let mut frame = encrypt_frame(&mut sender, &message).unwrap();
        // Corrupt a byte inside the second chunk.
        frame[FRAME_LIMIT + 3] ^= 0x01;

        let err = decrypt_frame(&mut receiver, &frame).unwrap_err();
        assert!(matches!(err, Error::Decrypt(_)));
    }

    #[test]
    fn test_short_frame_rejected() {
        let (_, mut receiver) = split_pair();
        let err = decrypt_frame(&mut receiver, &[0u8; TAG_SIZE - 1]).unwrap_err();
        assert!(matches!(err, Error::Decrypt(_)));
    }
}

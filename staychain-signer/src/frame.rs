//! Length-prefixed byte-list framing.
//!
//! A list of byte chunks is flattened to `Σ (len(chunk) as u8 || chunk)`.
//! No chunk may exceed 255 bytes; the empty list maps to the empty
//! payload. Used for multi-input preimage lists and multi-signature
//! replies.

use crate::error::{Result, SignerError};

/// Flatten a list of chunks into a single length-prefixed payload.
pub fn serialize_bytes(chunks: &[Vec<u8>]) -> Result<Vec<u8>> {
    let mut payload = Vec::with_capacity(chunks.iter().map(|c| c.len() + 1).sum());
    for chunk in chunks {
        if chunk.len() > u8::MAX as usize {
            return Err(SignerError::ChunkTooLong(chunk.len()));
        }
        payload.push(chunk.len() as u8);
        payload.extend_from_slice(chunk);
    }
    Ok(payload)
}

/// Split a length-prefixed payload back into chunks.
///
/// A truncated trailer ends the list; everything decoded before it is
/// returned.
pub fn unserialize_bytes(payload: &[u8]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut cursor = 0;
    while cursor < payload.len() {
        let len = payload[cursor] as usize;
        if cursor + 1 + len > payload.len() {
            break;
        }
        chunks.push(payload[cursor + 1..cursor + 1 + len].to_vec());
        cursor += 1 + len;
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_framing() {
        let chunks = vec![vec![0xAA], vec![0xBB, 0xCC]];
        let payload = serialize_bytes(&chunks).unwrap();
        assert_eq!(payload, vec![0x01, 0xAA, 0x02, 0xBB, 0xCC]);
        assert_eq!(unserialize_bytes(&payload), chunks);
    }

    #[test]
    fn test_empty_list_empty_payload() {
        assert_eq!(serialize_bytes(&[]).unwrap(), Vec::<u8>::new());
        assert!(unserialize_bytes(&[]).is_empty());
    }

    #[test]
    fn test_empty_chunk_roundtrip() {
        let chunks = vec![vec![], vec![0x01]];
        let payload = serialize_bytes(&chunks).unwrap();
        assert_eq!(payload, vec![0x00, 0x01, 0x01]);
        assert_eq!(unserialize_bytes(&payload), chunks);
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let err = serialize_bytes(&[vec![0u8; 256]]).unwrap_err();
        assert!(matches!(err, SignerError::ChunkTooLong(256)));
    }

    #[test]
    fn test_truncated_trailer_dropped() {
        // second chunk claims 4 bytes but only 2 follow
        let payload = vec![0x01, 0xAA, 0x04, 0xBB, 0xCC];
        assert_eq!(unserialize_bytes(&payload), vec![vec![0xAA]]);
    }

    proptest! {
        #[test]
        fn prop_roundtrip(chunks in prop::collection::vec(
            prop::collection::vec(any::<u8>(), 0..=255),
            0..16,
        )) {
            let payload = serialize_bytes(&chunks).unwrap();
            prop_assert_eq!(unserialize_bytes(&payload), chunks);
        }
    }
}

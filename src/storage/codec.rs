//! Record envelope codec.
//!
//! Layout: 4-byte little-endian crc32 of the body, then the body bytes.
//! The checksum covers exactly the body; a mismatch at decode time means the
//! collaborator handed back a torn or corrupted value.

use super::StorageError;

/// Frames a body into a checksummed envelope.
pub fn encode_record(body: &[u8]) -> Vec<u8> {
    let checksum = crc32fast::hash(body);
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(body);
    out
}

/// Unframes an envelope, verifying the checksum.
pub fn decode_record(envelope: &[u8]) -> Result<&[u8], StorageError> {
    if envelope.len() < 4 {
        return Err(StorageError::Corrupt(format!(
            "envelope too short: {} bytes",
            envelope.len()
        )));
    }
    let (header, body) = envelope.split_at(4);
    let stored = u32::from_le_bytes(header.try_into().expect("4-byte header"));
    let actual = crc32fast::hash(body);
    if stored != actual {
        return Err(StorageError::Corrupt(format!(
            "checksum mismatch: stored {stored:#010x}, actual {actual:#010x}"
        )));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let body = br#"{"id":1,"year":2001}"#;
        let envelope = encode_record(body);
        assert_eq!(decode_record(&envelope).unwrap(), body);
    }

    #[test]
    fn test_flipped_bit_detected() {
        let mut envelope = encode_record(b"payload");
        let last = envelope.len() - 1;
        envelope[last] ^= 0x01;
        assert!(matches!(
            decode_record(&envelope),
            Err(StorageError::Corrupt(_))
        ));
    }

    #[test]
    fn test_truncated_envelope_detected() {
        assert!(matches!(
            decode_record(&[0x01, 0x02]),
            Err(StorageError::Corrupt(_))
        ));
    }
}

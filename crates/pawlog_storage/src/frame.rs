//! Journal frame envelope.
//!
//! ```text
//! +--------+---------+-------------+-----------+--------+
//! | "PLOG" | version | payload len |  payload  | crc32  |
//! | 4 B    | u16 LE  | u32 LE      | len bytes | u32 LE |
//! +--------+---------+-------------+-----------+--------+
//! ```
//!
//! The CRC covers header and payload. One frame is the unit of atomicity:
//! a reader either sees the whole frame or, if the process died mid-append,
//! a torn tail that [`scan`] reports via [`Scan::valid_len`].

use crate::error::{StorageError, StorageResult};

/// Magic bytes at the start of every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"PLOG";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// Bytes before the payload.
pub const HEADER_SIZE: usize = 10;

/// Bytes after the payload.
pub const CRC_SIZE: usize = 4;

/// Result of scanning a journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scan {
    /// Payloads of every complete frame, in append order.
    pub payloads: Vec<Vec<u8>>,
    /// Length of the journal prefix made of complete frames.
    pub valid_len: u64,
    /// Whether bytes past `valid_len` were found (a torn trailing frame).
    pub torn_tail: bool,
}

/// Wraps `payload` in a frame envelope.
///
/// # Errors
///
/// Returns [`StorageError::FrameTooLarge`] if the payload does not fit the
/// 4-byte length field.
pub fn encode(payload: &[u8]) -> StorageResult<Vec<u8>> {
    let len = u32::try_from(payload.len()).map_err(|_| StorageError::FrameTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(&FRAME_MAGIC);
    buf.extend_from_slice(&FRAME_VERSION.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = compute_crc32(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Splits a journal into frame payloads.
///
/// A trailing frame that is incomplete, or complete but failing its
/// checksum, is treated as a torn write and excluded. Damage anywhere
/// before the last frame is corruption.
///
/// A frame whose declared length runs past the end is only torn if no
/// complete frame follows its header. Otherwise its length field is
/// damaged and the frames after it must not be discarded.
///
/// # Errors
///
/// Returns [`StorageError::Corrupted`] for bad magic, an unsupported
/// version, a checksum mismatch on a non-final frame, or a length that
/// overruns a later frame.
pub fn scan(bytes: &[u8]) -> StorageResult<Scan> {
    let mut payloads = Vec::new();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let offset = pos as u64;
        let remaining = &bytes[pos..];
        if remaining.len() < HEADER_SIZE {
            break;
        }

        if remaining[0..4] != FRAME_MAGIC {
            return Err(StorageError::corrupted(offset, "invalid magic"));
        }

        let version = u16::from_le_bytes([remaining[4], remaining[5]]);
        if version > FRAME_VERSION {
            return Err(StorageError::corrupted(
                offset,
                format!("unsupported frame version {version}"),
            ));
        }

        let payload_len =
            u32::from_le_bytes([remaining[6], remaining[7], remaining[8], remaining[9]]) as usize;
        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining.len() < total {
            if let Some(next) = next_complete_frame(remaining, HEADER_SIZE) {
                return Err(StorageError::corrupted(
                    offset,
                    format!(
                        "frame length {payload_len} overruns the frame at offset {}",
                        offset + next as u64
                    ),
                ));
            }
            break;
        }

        let payload_end = HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            remaining[payload_end],
            remaining[payload_end + 1],
            remaining[payload_end + 2],
            remaining[payload_end + 3],
        ]);
        let computed = compute_crc32(&remaining[..payload_end]);
        if stored != computed {
            if remaining.len() == total {
                break;
            }
            return Err(StorageError::corrupted(
                offset,
                format!("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"),
            ));
        }

        payloads.push(remaining[HEADER_SIZE..payload_end].to_vec());
        pos += total;
    }

    Ok(Scan {
        payloads,
        valid_len: pos as u64,
        torn_tail: pos < bytes.len(),
    })
}

/// Position of the first complete, checksum-valid frame at or after `from`.
fn next_complete_frame(bytes: &[u8], from: usize) -> Option<usize> {
    (from..bytes.len())
        .filter(|&at| bytes[at..].starts_with(&FRAME_MAGIC))
        .find(|&at| is_complete_frame(&bytes[at..]))
}

fn is_complete_frame(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_SIZE + CRC_SIZE {
        return false;
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    let payload_len = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let payload_end = HEADER_SIZE + payload_len;
    if version > FRAME_VERSION || bytes.len() < payload_end + CRC_SIZE {
        return false;
    }
    let stored = u32::from_le_bytes([
        bytes[payload_end],
        bytes[payload_end + 1],
        bytes[payload_end + 2],
        bytes[payload_end + 3],
    ]);
    stored == compute_crc32(&bytes[..payload_end])
}

/// CRC-32 (IEEE polynomial).
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn journal_of(payloads: &[&[u8]]) -> Vec<u8> {
        payloads
            .iter()
            .flat_map(|p| encode(p).unwrap())
            .collect()
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn scan_empty_journal() {
        let scan = scan(&[]).unwrap();
        assert!(scan.payloads.is_empty());
        assert_eq!(scan.valid_len, 0);
        assert!(!scan.torn_tail);
    }

    #[test]
    fn scan_returns_frames_in_order() {
        let bytes = journal_of(&[b"meal", b"", b"walk"]);
        let scan = scan(&bytes).unwrap();
        assert_eq!(scan.payloads, vec![b"meal".to_vec(), Vec::new(), b"walk".to_vec()]);
        assert_eq!(scan.valid_len, bytes.len() as u64);
    }

    #[test]
    fn partial_trailing_frame_is_torn() {
        let mut bytes = journal_of(&[b"meal"]);
        let complete = bytes.len() as u64;
        bytes.extend_from_slice(&encode(b"water").unwrap()[..7]);

        let scan = scan(&bytes).unwrap();
        assert_eq!(scan.payloads.len(), 1);
        assert_eq!(scan.valid_len, complete);
        assert!(scan.torn_tail);
    }

    #[test]
    fn bad_checksum_on_last_frame_is_torn() {
        let mut bytes = journal_of(&[b"meal", b"walk"]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let scan = scan(&bytes).unwrap();
        assert_eq!(scan.payloads, vec![b"meal".to_vec()]);
        assert!(scan.torn_tail);
    }

    #[test]
    fn bad_checksum_mid_journal_is_corruption() {
        let mut bytes = journal_of(&[b"meal", b"walk"]);
        bytes[HEADER_SIZE] ^= 0xFF;

        let result = scan(&bytes);
        assert!(matches!(result, Err(StorageError::Corrupted { offset: 0, .. })));
    }

    #[test]
    fn damaged_length_on_first_of_three_frames_is_corruption() {
        let mut bytes = journal_of(&[b"meal", b"walk", b"water"]);
        bytes[6..10].copy_from_slice(&0x7F_u32.to_le_bytes());

        let result = scan(&bytes);
        assert!(matches!(result, Err(StorageError::Corrupted { offset: 0, .. })));
    }

    #[test]
    fn oversized_length_mid_journal_is_corruption() {
        let mut bytes = journal_of(&[b"meal", b"walk", b"water"]);
        let second = encode(b"meal").unwrap().len();
        bytes[second + 9] = 0xFF;

        let result = scan(&bytes);
        assert!(matches!(
            result,
            Err(StorageError::Corrupted { offset, .. }) if offset == second as u64
        ));
    }

    #[test]
    fn damaged_length_on_last_frame_is_torn() {
        let mut bytes = journal_of(&[b"meal", b"walk"]);
        let last = encode(b"meal").unwrap().len();
        bytes[last + 6] = 0x7F;

        let scan = scan(&bytes).unwrap();
        assert_eq!(scan.payloads, vec![b"meal".to_vec()]);
        assert_eq!(scan.valid_len, last as u64);
        assert!(scan.torn_tail);
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut bytes = journal_of(&[b"meal"]);
        bytes[0] = b'X';
        assert!(matches!(scan(&bytes), Err(StorageError::Corrupted { .. })));
    }

    proptest! {
        #[test]
        fn any_prefix_scans_to_whole_frames(
            payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..8),
            cut in 0usize..1024,
        ) {
            let refs: Vec<&[u8]> = payloads.iter().map(Vec::as_slice).collect();
            let bytes = journal_of(&refs);
            let cut = cut.min(bytes.len());

            let scan = scan(&bytes[..cut]).unwrap();
            prop_assert!(scan.valid_len as usize <= cut);
            prop_assert_eq!(&scan.payloads[..], &payloads[..scan.payloads.len()]);
        }
    }
}

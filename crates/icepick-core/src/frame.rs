//! Sample-stream synchronisation and record decoding
//!
//! The sensing front-end streams fixed 5-byte records, one per
//! charge/discharge measurement. Each record packs:
//!
//! ```text
//!  byte 0          byte 1    byte 2    byte 3    byte 4
//! +----+--+--+    +-------+ +-------+ +-------+ +-------+
//! |chan|pl|dh|    |  dis  | |  dis  | |  chg  | |  chg  |
//! +----+--+--+    +-------+ +-------+ +-------+ +-------+
//!  7..4 3..2 1..0   15..8     7..0      15..8     7..0
//! ```
//!
//! - `chan` (bits 7..4 of byte 0): sense multiplexer channel, 0-15
//! - `pull` (bits 3..2 of byte 0): pull resistor state, 0-3
//! - `dis`: 18-bit discharge time, bits 17..16 from byte 0 bits 1..0
//! - `chg`: 16-bit charge time
//!
//! A calibration capture starts with a ramp that lets the host find record
//! alignment: sampling every 5th byte and dropping its 2 low bits yields
//! `floor(1.333 * k + 0.2)` for `k` in `0..48`.

use serde::Serialize;

use crate::error::{Error, Result};

/// Size of one sample record in bytes
pub const RECORD_LEN: usize = 5;

/// Number of stride-5 samples compared against the sync reference
pub const SYNC_LEN: usize = 48;

/// Number of candidate offsets scanned, and the minimum capture length
/// for a sync search (16 channels x 3 pull states x 5 bytes)
pub const SYNC_WINDOW: usize = RECORD_LEN * 16 * 3;

/// Maximum value of the 18-bit discharge counter
pub const DIS_MAX: u32 = (1 << 18) - 1;

/// Sync reference ramp, `floor(1.333 * k + 0.2)`
///
/// Computed in integer arithmetic as `(1333 * k + 200) / 1000`; no `k` in
/// range lands on an exact integer boundary so this matches the real-valued
/// formula bit for bit.
pub const SYNC_REFERENCE: [u8; SYNC_LEN] = sync_reference();

const fn sync_reference() -> [u8; SYNC_LEN] {
    let mut out = [0u8; SYNC_LEN];
    let mut k = 0;
    while k < SYNC_LEN {
        out[k] = ((1333 * k + 200) / 1000) as u8;
        k += 1;
    }
    out
}

/// One decoded measurement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SampleRecord {
    /// Sense channel index (0-15)
    pub chan: u8,
    /// Pull resistor state (0-3)
    pub pull: u8,
    /// Charge time counter (16 bits)
    pub chg: u16,
    /// Discharge time counter (18 bits)
    pub dis: u32,
}

impl SampleRecord {
    /// Decode a record from exactly five bytes
    pub fn from_bytes(entry: &[u8; RECORD_LEN]) -> Self {
        let chg = ((entry[3] as u16) << 8) | entry[4] as u16;
        let dis = (((entry[0] & 0x03) as u32) << 16) | ((entry[1] as u32) << 8) | entry[2] as u32;
        let chan = (entry[0] & 0xF0) >> 4;
        let pull = (entry[0] & 0x0C) >> 2;
        Self {
            chan,
            pull,
            chg,
            dis,
        }
    }

    /// Pack the record back into its wire form
    ///
    /// Fields wider than their bit slot are truncated.
    pub fn to_bytes(&self) -> [u8; RECORD_LEN] {
        let dis = self.dis & DIS_MAX;
        [
            ((self.chan & 0x0F) << 4) | ((self.pull & 0x03) << 2) | (dis >> 16) as u8,
            (dis >> 8) as u8,
            dis as u8,
            (self.chg >> 8) as u8,
            self.chg as u8,
        ]
    }
}

/// Locate the sync ramp in a raw capture
///
/// Scans candidate offsets `0..SYNC_WINDOW` in ascending order and returns
/// the first one whose 48 stride-5 samples, shifted right by 2, equal
/// [`SYNC_REFERENCE`]. Captures shorter than [`SYNC_WINDOW`] never match.
pub fn find_sync(data: &[u8]) -> Option<usize> {
    if data.len() < SYNC_WINDOW {
        return None;
    }

    let span = (SYNC_LEN - 1) * RECORD_LEN;
    (0..SYNC_WINDOW)
        .take_while(|&i| i + span < data.len())
        .find(|&i| {
            data[i..]
                .iter()
                .step_by(RECORD_LEN)
                .take(SYNC_LEN)
                .zip(SYNC_REFERENCE.iter())
                .all(|(&sample, &expected)| sample >> 2 == expected)
        })
}

/// Decode a single 5-byte entry
///
/// Fails with [`Error::InvalidInput`] if `entry` is not exactly
/// [`RECORD_LEN`] bytes long.
pub fn decode_entry(entry: &[u8]) -> Result<SampleRecord> {
    let entry: &[u8; RECORD_LEN] = entry.try_into().map_err(|_| Error::InvalidInput {
        expected: RECORD_LEN,
        actual: entry.len(),
    })?;
    Ok(SampleRecord::from_bytes(entry))
}

/// Decode every complete record in `data`
///
/// `data` must already start on a record boundary. A trailing partial
/// record is dropped.
pub fn decode_all(data: &[u8]) -> Vec<SampleRecord> {
    data.chunks_exact(RECORD_LEN)
        .map(|chunk| {
            let mut entry = [0u8; RECORD_LEN];
            entry.copy_from_slice(chunk);
            SampleRecord::from_bytes(&entry)
        })
        .collect()
}

/// Find the sync ramp and decode everything from there on
pub fn decode_synced(data: &[u8]) -> Option<Vec<SampleRecord>> {
    let offset = find_sync(data)?;
    log::debug!("sync found at offset {}", offset);
    Some(decode_all(&data[offset..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Filler that can never start a sync match (0xFF >> 2 != 0)
    const FILL: u8 = 0xFF;

    fn embed_sync(buf: &mut [u8], offset: usize) {
        for (k, &r) in SYNC_REFERENCE.iter().enumerate() {
            // Low bits are discarded by the matcher; set them to prove it
            buf[offset + k * RECORD_LEN] = (r << 2) | (k as u8 & 0x03);
        }
    }

    #[test]
    fn test_sync_reference() {
        assert_eq!(&SYNC_REFERENCE[..8], &[0, 1, 2, 4, 5, 6, 8, 9]);
        assert_eq!(SYNC_REFERENCE[47], 62);
        for (k, &r) in SYNC_REFERENCE.iter().enumerate() {
            assert_eq!(r, (1.333 * k as f64 + 0.2).floor() as u8);
        }
    }

    #[test]
    fn test_find_sync_at_offset() {
        for offset in [0, 1, 7, 100, 239] {
            let mut buf = vec![FILL; offset + SYNC_WINDOW + 10];
            embed_sync(&mut buf, offset);
            assert_eq!(find_sync(&buf), Some(offset), "offset {}", offset);
        }
    }

    #[test]
    fn test_find_sync_smallest_wins() {
        let mut buf = vec![FILL; 600];
        embed_sync(&mut buf, 4);
        embed_sync(&mut buf, 3);
        assert_eq!(find_sync(&buf), Some(3));
    }

    #[test]
    fn test_find_sync_none() {
        assert_eq!(find_sync(&[]), None);
        assert_eq!(find_sync(&[FILL; 1024]), None);

        // Valid ramp but the capture is shorter than the search window
        let mut buf = vec![FILL; SYNC_WINDOW - 1];
        embed_sync(&mut buf, 0);
        assert_eq!(find_sync(&buf), None);

        // Ramp starts outside the search window
        let mut buf = vec![FILL; 1024];
        embed_sync(&mut buf, SYNC_WINDOW);
        assert_eq!(find_sync(&buf), None);
    }

    #[test]
    fn test_find_sync_truncated_window() {
        // Ramp would need 236 bytes from offset 200
        let mut buf = vec![FILL; 300];
        for k in 0..20 {
            buf[200 + k * RECORD_LEN] = SYNC_REFERENCE[k] << 2;
        }
        assert_eq!(find_sync(&buf), None);
    }

    #[test]
    fn test_decode_entry_fields() {
        let rec = decode_entry(&[0xC1, 0x00, 0x00, 0x01, 0x02]).unwrap();
        assert_eq!(
            rec,
            SampleRecord {
                chan: 12,
                pull: 0,
                dis: 0x010000,
                chg: 0x0102
            }
        );

        let rec = decode_entry(&[0x34, 0x12, 0x00, 0x00, 0x05]).unwrap();
        assert_eq!(rec.chan, 3);
        assert_eq!(rec.pull, 1);
        assert_eq!(rec.dis, 0x1200);
        assert_eq!(rec.chg, 5);

        let rec = decode_entry(&[0xFF; 5]).unwrap();
        assert_eq!(rec.chan, 15);
        assert_eq!(rec.pull, 3);
        assert_eq!(rec.dis, DIS_MAX);
        assert_eq!(rec.chg, 0xFFFF);
    }

    #[test]
    fn test_decode_entry_bad_length() {
        assert_eq!(
            decode_entry(&[0; 4]),
            Err(Error::InvalidInput {
                expected: 5,
                actual: 4
            })
        );
        assert!(decode_entry(&[0; 6]).is_err());
        assert!(decode_entry(&[]).is_err());
    }

    #[test]
    fn test_pack_unpack() {
        let samples = [
            SampleRecord {
                chan: 0,
                pull: 0,
                chg: 0,
                dis: 0,
            },
            SampleRecord {
                chan: 9,
                pull: 2,
                chg: 32173,
                dis: 229942,
            },
            SampleRecord {
                chan: 14,
                pull: 3,
                chg: 9039,
                dis: 180704,
            },
        ];
        for rec in samples {
            assert_eq!(SampleRecord::from_bytes(&rec.to_bytes()), rec);
        }
    }

    #[test]
    fn test_decode_all_drops_partial() {
        let rec = SampleRecord {
            chan: 5,
            pull: 1,
            chg: 1234,
            dis: 98765,
        };
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend_from_slice(&rec.to_bytes());
        }
        for extra in 0..RECORD_LEN {
            let mut buf = data.clone();
            buf.extend(std::iter::repeat(0xAA).take(extra));
            let out = decode_all(&buf);
            assert_eq!(out.len(), 3);
            assert!(out.iter().all(|r| *r == rec));
        }
        assert!(decode_all(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn test_decode_synced() {
        let mut buf = vec![FILL; 11];
        let sync_at = buf.len();
        buf.resize(sync_at + SYNC_LEN * RECORD_LEN, FILL);
        embed_sync(&mut buf, sync_at);
        let payload = SampleRecord {
            chan: 2,
            pull: 0,
            chg: 30000,
            dis: 200000,
        };
        buf.extend_from_slice(&payload.to_bytes());

        let records = decode_synced(&buf).unwrap();
        assert_eq!(records.len(), SYNC_LEN + 1);
        assert_eq!(records[SYNC_LEN], payload);
    }
}

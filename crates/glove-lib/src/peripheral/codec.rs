//! Notification payload decoding
//!
//! The glove notifies a packed array of big-endian 16-bit words, one per
//! channel, in tenths of a picofarad. Channels without a sensor report zero
//! and are dropped, so the decoded length reflects the sensors present.

use crate::models::SensorFrame;

/// Capacitance resolution of one count, in pF
const PICOFARADS_PER_COUNT: f32 = 0.1;

/// Decode one notification into a frame of capacitance values.
///
/// A trailing odd byte is ignored. The result is not checked against the
/// declared sensor count.
pub fn decode_capacitance(payload: &[u8]) -> SensorFrame {
    let values = payload
        .chunks_exact(2)
        .map(|word| u16::from_be_bytes([word[0], word[1]]))
        .filter(|&raw| raw != 0)
        .map(|raw| raw as f32 * PICOFARADS_PER_COUNT)
        .collect();

    SensorFrame::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_big_endian_tenths() {
        // 1259 -> 125.9 pF, 2790 -> 279.0 pF
        let frame = decode_capacitance(&[0x04, 0xEB, 0x0A, 0xE6]);
        assert_eq!(frame.len(), 2);
        assert!((frame.values()[0] - 125.9).abs() < 1e-4);
        assert!((frame.values()[1] - 279.0).abs() < 1e-4);
    }

    #[test]
    fn test_decode_drops_unused_channels() {
        let mut payload = vec![0x01, 0x00, 0x02, 0x00];
        payload.extend_from_slice(&[0u8; 16]);
        let frame = decode_capacitance(&payload);
        assert_eq!(frame.len(), 2);
    }

    #[test]
    fn test_decode_ignores_trailing_byte() {
        let frame = decode_capacitance(&[0x00, 0x0A, 0xFF]);
        assert_eq!(frame.values(), &[1.0]);
    }

    #[test]
    fn test_decode_empty_payload() {
        assert!(decode_capacitance(&[]).is_empty());
    }
}

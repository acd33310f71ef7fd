//! Binary frame codec for the wearable's combined acceleration + angular velocity packet.
//!
//! Wire layout (20 bytes, little-endian):
//!
//! ```text
//! [0x55][0x61][AX_L][AX_H][AY_L][AY_H][AZ_L][AZ_H][WX_L][WX_H][WY_L][WY_H][WZ_L][WZ_H][.. 6 angle bytes ..]
//! ```
//!
//! Only the header and the six axis pairs are interpreted. The trailing angle
//! slots are ignored on decode and zero-filled on encode.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::Rng;
use thiserror::Error;
use tracing::debug;

use crate::SixAxisReading;

/// Minimum accepted frame length in bytes.
pub const FRAME_LEN: usize = 20;
/// Packet type marker for acceleration + angular velocity frames.
pub const FRAME_HEADER: [u8; 2] = [0x55, 0x61];

/// Full-scale divisor for a signed 16-bit sample.
pub const FULL_SCALE: f64 = 32768.0;
/// ±16 g accelerometer range.
pub const ACCEL_RANGE_G: f64 = 16.0;
/// ±2000 °/s gyroscope range.
pub const GYRO_RANGE_DPS: f64 = 2000.0;
/// g → m/s² conversion used by the device firmware.
pub const STANDARD_GRAVITY: f64 = 9.8;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {len} bytes (need at least 20)")]
    TooShort { len: usize },

    #[error("unexpected frame header {found:02x?} (want 55 61)")]
    BadHeader { found: [u8; 2] },
}

// ── Decode ────────────────────────────────────────────────────────────────────

/// Decode a frame, reporting why it was rejected.
pub fn try_decode_frame(raw: &[u8]) -> Result<SixAxisReading, FrameError> {
    if raw.len() < FRAME_LEN {
        return Err(FrameError::TooShort { len: raw.len() });
    }
    let header = [raw[0], raw[1]];
    if header != FRAME_HEADER {
        return Err(FrameError::BadHeader { found: header });
    }

    let mut buf = &raw[FRAME_HEADER.len()..];
    let accel_scale = ACCEL_RANGE_G * STANDARD_GRAVITY / FULL_SCALE;
    let gyro_scale = GYRO_RANGE_DPS / FULL_SCALE;

    let ax = buf.get_i16_le() as f64 * accel_scale;
    let ay = buf.get_i16_le() as f64 * accel_scale;
    let az = buf.get_i16_le() as f64 * accel_scale;
    let gx = buf.get_i16_le() as f64 * gyro_scale;
    let gy = buf.get_i16_le() as f64 * gyro_scale;
    let gz = buf.get_i16_le() as f64 * gyro_scale;

    Ok(SixAxisReading::new([ax, ay, az], [gx, gy, gz]))
}

/// Decode a frame into a reading, or `None` if it is not a valid
/// acceleration + angular velocity packet.
///
/// Corrupt frames are expected on a noisy link; callers skip them.
pub fn decode_frame(raw: &[u8]) -> Option<SixAxisReading> {
    match try_decode_frame(raw) {
        Ok(reading) => Some(reading),
        Err(e) => {
            debug!("frame rejected: {e}");
            None
        }
    }
}

// ── Synthetic readings (simulation only) ─────────────────────────────────────

/// A plausible at-rest reading: small perturbations around gravity on +Z and
/// near-zero rotation.
///
/// Simulation and test path only. Never feed this into a live sensor stream.
pub fn synthesize_test_reading<R: Rng + ?Sized>(rng: &mut R) -> SixAxisReading {
    SixAxisReading::new(
        [
            rng.gen_range(-0.5..=0.5),
            rng.gen_range(-0.5..=0.5),
            STANDARD_GRAVITY + rng.gen_range(-0.25..=0.25),
        ],
        [
            rng.gen_range(-5.0..=5.0),
            rng.gen_range(-5.0..=5.0),
            rng.gen_range(-5.0..=5.0),
        ],
    )
}

/// Development fallback: a missing or empty frame yields a synthetic reading,
/// a present frame is decoded normally (and may still yield `None`).
///
/// Simulation and test path only; production code calls [`decode_frame`].
pub fn decode_or_synthesize<R: Rng + ?Sized>(raw: Option<&[u8]>, rng: &mut R) -> Option<SixAxisReading> {
    match raw {
        None => Some(synthesize_test_reading(rng)),
        Some(bytes) if bytes.is_empty() => Some(synthesize_test_reading(rng)),
        Some(bytes) => decode_frame(bytes),
    }
}

// ── Encode ────────────────────────────────────────────────────────────────────

fn quantize(value: f64, scale: f64) -> i16 {
    let raw = (value / scale).round();
    raw.clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Encode a reading as a device frame. Values outside the sensor range saturate.
pub fn encode_frame(reading: &SixAxisReading) -> Bytes {
    let accel_scale = ACCEL_RANGE_G * STANDARD_GRAVITY / FULL_SCALE;
    let gyro_scale = GYRO_RANGE_DPS / FULL_SCALE;

    let mut buf = BytesMut::with_capacity(FRAME_LEN);
    buf.put_slice(&FRAME_HEADER);
    for a in reading.acceleration() {
        buf.put_i16_le(quantize(a, accel_scale));
    }
    for g in reading.angular_velocity() {
        buf.put_i16_le(quantize(g, gyro_scale));
    }
    // Angle slots: not used by the classifier
    buf.put_bytes(0, FRAME_LEN - buf.len());
    buf.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn frame_with(axes: [i16; 6]) -> Vec<u8> {
        let mut f = vec![0x55, 0x61];
        for v in axes {
            f.extend_from_slice(&v.to_le_bytes());
        }
        f.resize(FRAME_LEN, 0);
        f
    }

    #[test]
    fn test_short_buffer_rejected() {
        let raw = [0x55, 0x61, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(decode_frame(&raw), None);
        assert_eq!(try_decode_frame(&raw), Err(FrameError::TooShort { len: 10 }));
    }

    #[test]
    fn test_empty_buffer_rejected() {
        assert_eq!(decode_frame(&[]), None);
    }

    #[test]
    fn test_wrong_header_rejected() {
        let mut raw = frame_with([0; 6]);
        raw[1] = 0x51;
        assert_eq!(decode_frame(&raw), None);
        assert_eq!(
            try_decode_frame(&raw),
            Err(FrameError::BadHeader { found: [0x55, 0x51] })
        );
    }

    #[test]
    fn test_accel_scale_factor() {
        let reading = decode_frame(&frame_with([16384, 0, 0, 0, 0, 0])).unwrap();
        assert!((reading.acceleration_x - 78.4).abs() < 1e-9);
        assert_eq!(reading.acceleration_y, 0.0);
        assert_eq!(reading.angular_velocity_z, 0.0);
    }

    #[test]
    fn test_gyro_scale_factor() {
        let reading = decode_frame(&frame_with([0, 0, 0, 0, 0, 16384])).unwrap();
        assert!((reading.angular_velocity_z - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_values_are_signed() {
        let reading = decode_frame(&frame_with([-16384, 0, 0, -32768, 0, 0])).unwrap();
        assert!((reading.acceleration_x + 78.4).abs() < 1e-9);
        assert!((reading.angular_velocity_x + 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_longer_frame_accepted() {
        let mut raw = frame_with([0, 0, 2048, 0, 0, 0]);
        raw.push(0xAB); // trailing checksum byte on some firmware
        let reading = decode_frame(&raw).unwrap();
        assert!((reading.acceleration_z - 9.8).abs() < 1e-9);
    }

    #[test]
    fn test_encode_matches_decoder() {
        let reading = SixAxisReading::new([0.0, 0.0, 9.8], [0.0, 0.0, 1000.0]);
        let frame = encode_frame(&reading);
        assert_eq!(frame.len(), FRAME_LEN);
        assert_eq!(&frame[..2], &FRAME_HEADER);
        assert_eq!(&frame[6..8], &2048i16.to_le_bytes());
        assert_eq!(&frame[12..14], &16384i16.to_le_bytes());
        assert!(frame[14..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_encode_saturates() {
        let reading = SixAxisReading::new([500.0, -500.0, 0.0], [0.0; 3]);
        let frame = encode_frame(&reading);
        assert_eq!(&frame[2..4], &i16::MAX.to_le_bytes());
        assert_eq!(&frame[4..6], &i16::MIN.to_le_bytes());
    }

    #[test]
    fn test_synthetic_readings_are_well_formed() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let r = synthesize_test_reading(&mut rng);
            assert!(r.is_finite());
            assert!(r.acceleration_x.abs() <= 0.5);
            assert!((r.acceleration_z - 9.8).abs() <= 0.25);
            assert!(r.angular_velocity().iter().all(|g| g.abs() <= 5.0));
        }
    }

    #[test]
    fn test_decode_or_synthesize() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(decode_or_synthesize(None, &mut rng).is_some());
        assert!(decode_or_synthesize(Some(&[][..]), &mut rng).is_some());
        assert!(decode_or_synthesize(Some(&[0x55u8, 0x61, 0x00][..]), &mut rng).is_none());

        let raw = frame_with([16384, 0, 0, 0, 0, 0]);
        let decoded = decode_or_synthesize(Some(raw.as_slice()), &mut rng).unwrap();
        assert!((decoded.acceleration_x - 78.4).abs() < 1e-9);
    }
}

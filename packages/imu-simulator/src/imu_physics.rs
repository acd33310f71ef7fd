//! imu_physics.rs — IMU sensor and BLE link simulation
//!
//! Simulates the measurement chain of a WT901-class wearable:
//! 1. Take the wearer's true specific force and angular velocity
//! 2. Add Gaussian sensor noise per axis
//! 3. Quantise into the device's 20-byte int16 frame
//! 4. Corrupt a fraction of frames the way a lossy BLE link does
//!    (truncated notification, or a different packet type in the slot)

use std::collections::HashMap;

use bytes::Bytes;
use posture_core::frame::{FRAME_HEADER, FRAME_LEN};
use posture_core::{encode_frame, Posture, SixAxisReading};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;

use crate::wearer_sim::WearerState;

// ── Noise configuration ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NoiseConfig {
    pub sigma_accel_mps2: f64,
    pub sigma_gyro_dps:   f64,
    /// Base probability that a frame arrives corrupted
    pub corrupt_rate:     f64,
}

/// Other WT901 packet types that share the notification characteristic
const OTHER_PACKET_TYPES: [u8; 3] = [0x51, 0x52, 0x53];

/// One frame as it leaves the simulated sensor
#[derive(Debug, Clone)]
pub struct EpochFrame {
    pub sensor_id: String,
    pub seq_num:   u32,
    pub frame:     Bytes,
    /// Ground truth posture (for logging only; never sent to the hub)
    pub truth:     Posture,
    pub corrupted: bool,
}

/// Zero-mean Gaussian sample. Non-positive (or NaN) sigma disables noise;
/// `Normal::new` would otherwise accept a negative sigma and mirror it.
fn noise(rng: &mut impl Rng, sigma: f64) -> f64 {
    if !(sigma > 0.0) {
        return 0.0;
    }
    Normal::new(0.0, sigma).map(|d| d.sample(rng)).unwrap_or(0.0)
}

/// Noisy sensor reading for one wearer
pub fn sample_reading(w: &WearerState, cfg: &NoiseConfig, rng: &mut impl Rng) -> SixAxisReading {
    let (a, g) = (w.accel_mps2, w.gyro_dps);
    SixAxisReading::new(
        [
            a.x + noise(rng, cfg.sigma_accel_mps2),
            a.y + noise(rng, cfg.sigma_accel_mps2),
            a.z + noise(rng, cfg.sigma_accel_mps2),
        ],
        [
            g.x + noise(rng, cfg.sigma_gyro_dps),
            g.y + noise(rng, cfg.sigma_gyro_dps),
            g.z + noise(rng, cfg.sigma_gyro_dps),
        ],
    )
}

/// Damage a frame: either cut it short or swap in another packet type
pub fn corrupt_frame(frame: &Bytes, rng: &mut impl Rng) -> Bytes {
    if rng.gen_bool(0.5) {
        frame.slice(..rng.gen_range(0..FRAME_LEN))
    } else {
        let mut raw = frame.to_vec();
        raw[0] = FRAME_HEADER[0];
        raw[1] = OTHER_PACKET_TYPES[rng.gen_range(0..OTHER_PACKET_TYPES.len())];
        Bytes::from(raw)
    }
}

// ── Frame generator ───────────────────────────────────────────────────────────

/// Generate one frame per wearer for this epoch.
pub fn generate_epoch(
    wearers: &[WearerState],
    cfg: &NoiseConfig,
    corrupt_rate: f64,
    seq_nums: &mut HashMap<String, u32>,
    rng: &mut impl Rng,
) -> Vec<EpochFrame> {
    let corrupt_rate = corrupt_rate.clamp(0.0, 1.0);

    wearers.iter().map(|w| {
        let seq = seq_nums.entry(w.sensor_id.clone()).or_insert(0);
        *seq = seq.wrapping_add(1);

        let frame = encode_frame(&sample_reading(w, cfg, rng));
        let corrupted = rng.gen_bool(corrupt_rate);
        let frame = if corrupted { corrupt_frame(&frame, rng) } else { frame };

        EpochFrame {
            sensor_id: w.sensor_id.clone(),
            seq_num:   *seq,
            frame,
            truth:     w.posture,
            corrupted,
        }
    }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::ScenarioConfig;
    use crate::wearer_sim::{SimConfig, WearerSim};
    use posture_core::decode_frame;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sim(n: usize, rng: &mut StdRng) -> WearerSim {
        let cfg = SimConfig {
            n_sensors: n,
            gravity: 9.8,
            dwell_s: 5.0,
            max_slew_dps: 90.0,
            impact_g: 3.0,
            impact_gyro_dps: 250.0,
        };
        WearerSim::new(&cfg, &ScenarioConfig::default(), rng)
    }

    fn quiet(corrupt_rate: f64) -> NoiseConfig {
        NoiseConfig { sigma_accel_mps2: 0.1, sigma_gyro_dps: 0.5, corrupt_rate }
    }

    #[test]
    fn test_clean_frames_decode_near_truth() {
        let mut rng = StdRng::seed_from_u64(11);
        let sim = sim(4, &mut rng);
        let mut seqs = HashMap::new();

        let frames = generate_epoch(&sim.wearers, &quiet(0.0), 0.0, &mut seqs, &mut rng);
        assert_eq!(frames.len(), 4);
        for (f, w) in frames.iter().zip(&sim.wearers) {
            assert!(!f.corrupted);
            assert_eq!(f.seq_num, 1);
            let r = decode_frame(&f.frame).expect("clean frame must decode");
            // 5σ plus one quantisation step
            assert!((r.acceleration_x - w.accel_mps2.x).abs() < 0.6);
            assert!((r.acceleration_z - w.accel_mps2.z).abs() < 0.6);
        }
    }

    #[test]
    fn test_corrupted_frames_never_decode() {
        let mut rng = StdRng::seed_from_u64(12);
        let sim = sim(2, &mut rng);
        let mut seqs = HashMap::new();

        for _ in 0..50 {
            for f in generate_epoch(&sim.wearers, &quiet(1.0), 1.0, &mut seqs, &mut rng) {
                assert!(f.corrupted);
                assert!(decode_frame(&f.frame).is_none());
            }
        }
        assert_eq!(seqs.values().copied().max(), Some(50));
    }

    #[test]
    fn test_non_positive_sigma_yields_no_noise() {
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..100 {
            assert_eq!(noise(&mut rng, -1.0), 0.0);
            assert_eq!(noise(&mut rng, 0.0), 0.0);
            assert_eq!(noise(&mut rng, f64::NAN), 0.0);
        }
        assert!((0..100).any(|_| noise(&mut rng, 1.0) != 0.0));
    }
}

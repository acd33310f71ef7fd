//! udp_tx.rs — UDP transmitter for simulated sensor frames
//!
//! Sends one JSON envelope per frame to the hub:
//!   `{ "sensor_id": "...", "seq_num": n, "frame_hex": "5561..." }`
//!
//! The raw 20-byte frame travels hex-encoded, exactly as the BLE
//! notification delivered it (corrupted frames included). Send errors are
//! logged but never stop the simulator.

use std::net::UdpSocket;

use serde::Serialize;
use tracing::{debug, warn};

use crate::imu_physics::EpochFrame;

/// Wire envelope; mirrors `FrameEnvelope` in backend-rust/src/sensor_hub.rs
#[derive(Debug, Serialize)]
struct FrameEnvelope<'a> {
    sensor_id: &'a str,
    seq_num:   u32,
    frame_hex: String,
}

pub struct UdpTransmitter {
    socket: UdpSocket,
    hub_addr: String,
}

impl UdpTransmitter {
    pub fn new(hub_addr: &str) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(false)?;
        Ok(Self {
            socket,
            hub_addr: hub_addr.to_string(),
        })
    }

    /// Send all frames from one epoch to the hub.
    pub fn send_epoch(&self, frames: &[EpochFrame]) {
        for f in frames {
            self.send_frame(f);
        }
    }

    fn send_frame(&self, f: &EpochFrame) {
        let bytes = match encode_envelope(f) {
            Ok(b) => b,
            Err(e) => { warn!("UDP: serialize failed: {e}"); return; }
        };

        if let Err(e) = self.socket.send_to(&bytes, &self.hub_addr) {
            warn!("UDP: send to {} failed: {e}", self.hub_addr);
        } else {
            debug!("UDP → {} sensor={} seq={} corrupted={}", self.hub_addr, f.sensor_id, f.seq_num, f.corrupted);
        }
    }
}

fn encode_envelope(f: &EpochFrame) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec(&FrameEnvelope {
        sensor_id: &f.sensor_id,
        seq_num:   f.seq_num,
        frame_hex: hex::encode(&f.frame),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use posture_core::Posture;

    #[test]
    fn test_envelope_shape() {
        let f = EpochFrame {
            sensor_id: "C0:FF:EE:00:00:01".into(),
            seq_num:   7,
            frame:     Bytes::from_static(&[0x55, 0x61, 0x00, 0x08]),
            truth:     Posture::Standing,
            corrupted: true,
        };
        let v: serde_json::Value = serde_json::from_slice(&encode_envelope(&f).unwrap()).unwrap();
        assert_eq!(v["sensor_id"], "C0:FF:EE:00:00:01");
        assert_eq!(v["seq_num"], 7);
        assert_eq!(v["frame_hex"], "55610008");
        assert!(v.get("truth").is_none());
    }
}

//! main.rs — Wearable IMU Simulator entry point
//!
//! Stands in for the BLE fall sensor during development:
//!   1. Wearer loop: advances body attitude for N simulated sensors at update_rate_hz
//!   2. Sensor loop: samples noisy readings, encodes device frames, corrupts some
//!   3. UDP: ships each frame to the posture hub as a JSON envelope
//!
//! Frames produced here are synthetic. They carry simulator sensor IDs
//! (`C0:FF:EE:...`) and must never be mixed into a real sensor stream.

mod imu_physics;
mod scenarios;
mod udp_tx;
mod wearer_sim;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use posture_core::{classify_posture, decode_frame};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::interval;
use tracing::{debug, info};

use imu_physics::NoiseConfig;
use scenarios::ScenarioConfig;
use udp_tx::UdpTransmitter;
use wearer_sim::{SimConfig, WearerSim};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Preset {
    Daily,
    Rest,
    Fall,
    NoisyLink,
}

#[derive(Parser, Debug)]
#[command(name = "imu-sim", about = "Wearable IMU fall-sensor simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// UDP hub address
    #[arg(long, default_value = "127.0.0.1:5556")]
    hub_addr: String,
    /// Override [simulation] update_rate_hz
    #[arg(long)]
    rate_hz: Option<f64>,
    /// Override [simulation] n_sensors
    #[arg(long)]
    sensors: Option<usize>,
    /// Scenario preset
    #[arg(long, value_enum, default_value = "daily")]
    scenario: Preset,
    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

// ── Config structs ────────────────────────────────────────────────────────────

#[derive(Debug, serde::Deserialize)]
struct FullConfig {
    simulation: SimulationConfig,
    wearer:     SimConfig,
    imu_noise:  NoiseConfig,
    scenarios:  ScenariosConfig,
}

#[derive(Debug, serde::Deserialize)]
struct SimulationConfig {
    update_rate_hz: f64,
}

#[derive(Debug, serde::Deserialize)]
struct ScenariosConfig {
    fall_sensor_ids: Vec<usize>,
    fall_every_s: f64,
    noisy_corrupt_rate: f64,
}

fn scenario_from(preset: Preset, cfg: &ScenariosConfig) -> ScenarioConfig {
    let base = match preset {
        Preset::Daily     => ScenarioConfig::default(),
        Preset::Rest      => scenarios::preset_rest(),
        Preset::Fall      => scenarios::preset_fall(),
        Preset::NoisyLink => scenarios::preset_noisy_link(),
    };
    ScenarioConfig {
        fall_sensor_ids: cfg.fall_sensor_ids.clone(),
        fall_every_s: cfg.fall_every_s,
        noisy_corrupt_rate: cfg.noisy_corrupt_rate,
        ..base
    }
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imu_simulator=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_str = std::fs::read_to_string(&args.config)
        .unwrap_or_else(|_| include_str!("../config.toml").to_string());
    let mut cfg: FullConfig = toml::from_str(&config_str).context("invalid config.toml")?;
    if let Some(rate) = args.rate_hz {
        cfg.simulation.update_rate_hz = rate;
    }
    if let Some(n) = args.sensors {
        cfg.wearer.n_sensors = n;
    }
    anyhow::ensure!(
        cfg.simulation.update_rate_hz > 0.0,
        "update_rate_hz must be positive (got {})",
        cfg.simulation.update_rate_hz
    );

    let scenario = scenario_from(args.scenario, &cfg.scenarios);
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        "🩺 IMU simulator starting: {} sensors at {} Hz, scenario {:?}",
        cfg.wearer.n_sensors, cfg.simulation.update_rate_hz, args.scenario
    );

    let mut sim = WearerSim::new(&cfg.wearer, &scenario, &mut rng);
    let transmitter = UdpTransmitter::new(&args.hub_addr)
        .with_context(|| format!("failed to bind UDP socket for {}", args.hub_addr))?;

    let epoch_duration = Duration::from_secs_f64(1.0 / cfg.simulation.update_rate_hz)
        .max(Duration::from_millis(1));
    let dt = epoch_duration.as_secs_f64();
    let corrupt_rate = scenario.corrupt_rate(cfg.imu_noise.corrupt_rate);
    let mut ticker = interval(epoch_duration);
    let mut seq_nums: HashMap<String, u32> = HashMap::new();
    let mut epoch: u64 = 0;

    info!("📡 Sending to {} every {}ms", args.hub_addr, epoch_duration.as_millis());

    loop {
        ticker.tick().await;
        epoch += 1;

        sim.tick(dt, &scenario);
        let frames = imu_physics::generate_epoch(&sim.wearers, &cfg.imu_noise, corrupt_rate, &mut seq_nums, &mut rng);

        // Ground truth vs. local classification, for eyeballing the heuristic
        for f in &frames {
            if let Some(reading) = decode_frame(&f.frame) {
                let c = classify_posture(&reading, None);
                debug!("{} truth={} classified={} ({:.2})", f.sensor_id, f.truth, c.posture, c.confidence);
            }
        }

        transmitter.send_epoch(&frames);

        if epoch % 50 == 0 {
            let corrupted = frames.iter().filter(|f| f.corrupted).count();
            info!("⏱ t={:.0}s | epoch={} | frames={} | corrupted={}",
                sim.t_elapsed, epoch, frames.len(), corrupted);
        }
    }
}

//! Reproducible RNG streams per compute device.
//!
//! Nothing here touches process-wide state: a [`SeedContext`] goes in, a set
//! of independent, owned generators comes out. Two calls with the same context
//! produce identical streams.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Cpu,
    /// An accelerator by ordinal.
    Accelerator(usize),
}

impl Device {
    /// Stream id mixed into the seed, tagged by device kind. Wrapping only,
    /// so every ordinal is valid.
    fn stream(self) -> u64 {
        match self {
            Device::Cpu => mix(CPU_TAG),
            Device::Accelerator(ordinal) => mix(ACCELERATOR_TAG ^ mix(ordinal as u64)),
        }
    }
}

const CPU_TAG: u64 = 0x6370_7500;
const ACCELERATOR_TAG: u64 = 0x6163_6365_6c00;

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Accelerator(ordinal) => write!(f, "accel:{ordinal}"),
        }
    }
}

impl FromStr for Device {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("cpu") {
            return Ok(Device::Cpu);
        }
        s.strip_prefix("accel:")
            .and_then(|ordinal| ordinal.parse().ok())
            .map(Device::Accelerator)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown device `{s}`")))
    }
}

/// Everything needed to seed a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedContext {
    pub seed: u64,
    pub devices: Vec<Device>,
}

impl Default for SeedContext {
    fn default() -> Self {
        SeedContext::new(DEFAULT_SEED)
    }
}

impl SeedContext {
    /// Seeds the CPU only.
    pub fn new(seed: u64) -> SeedContext {
        SeedContext {
            seed,
            devices: vec![Device::Cpu],
        }
    }

    pub fn with_device(mut self, device: Device) -> SeedContext {
        if !self.devices.contains(&device) {
            self.devices.push(device);
        }
        self
    }
}

/// The generators produced by [`seed_everything`], one per device.
#[derive(Debug)]
pub struct SeededRngs {
    seed: u64,
    rngs: BTreeMap<Device, StdRng>,
}

impl SeededRngs {
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn rng(&mut self, device: Device) -> Option<&mut StdRng> {
        self.rngs.get_mut(&device)
    }

    pub fn cpu(&mut self) -> Option<&mut StdRng> {
        self.rng(Device::Cpu)
    }

    pub fn devices(&self) -> impl Iterator<Item = Device> + '_ {
        self.rngs.keys().copied()
    }
}

// SplitMix64 finaliser; spreads nearby (seed, stream) pairs far apart.
fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Derive one generator per device in `ctx`.
///
/// Each generator depends only on `(seed, device)`, never on the position of
/// the device in `ctx.devices`, so adding or reordering devices leaves the
/// existing streams unchanged.
pub fn seed_everything(ctx: &SeedContext) -> SeededRngs {
    let rngs = ctx
        .devices
        .iter()
        .map(|&device| {
            let derived = mix(ctx.seed ^ mix(device.stream()));
            (device, StdRng::seed_from_u64(derived))
        })
        .collect();
    tracing::info!(seed = ctx.seed, devices = ctx.devices.len(), "seeded rngs");
    SeededRngs {
        seed: ctx.seed,
        rngs,
    }
}

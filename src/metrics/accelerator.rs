//! Accelerator (GPU/NPU) and CPU power estimates.
//!
//! None of these values are measured. The GPU and NPU probes synthesize
//! plausible readings from CPU load and randomness, and CPU power is a linear
//! interpolation between an idle and a full-load wattage. Every reading is
//! tagged [`ReadingSource::Estimated`] so exporters can label it as such.
//! A measured probe can implement [`AcceleratorProbe`] and replace these
//! without changes to the sampler.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// GPU reading substituted when estimation fails
pub const GPU_FALLBACK: AcceleratorReading = AcceleratorReading {
    usage_percent: 10.0,
    power_watts: 2.0,
    source: ReadingSource::Estimated,
};

/// NPU reading substituted when estimation fails
pub const NPU_FALLBACK: AcceleratorReading = AcceleratorReading {
    usage_percent: 0.0,
    power_watts: 0.0,
    source: ReadingSource::Estimated,
};

/// CPU power substituted when estimation fails
pub const CPU_POWER_FALLBACK_WATTS: f64 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum EstimateError {
    #[error("cpu usage {0} is not a percentage")]
    InvalidCpuPercent(f64),
}

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingSource {
    Measured,
    Estimated,
}

impl ReadingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingSource::Measured => "measured",
            ReadingSource::Estimated => "estimated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorReading {
    pub usage_percent: f64,
    pub power_watts: f64,
    pub source: ReadingSource,
}

impl AcceleratorReading {
    /// Usage clamped to [0, 100], power to >= 0, NaN treated as 0
    pub fn clamped(self) -> Self {
        let usage = if self.usage_percent.is_nan() { 0.0 } else { self.usage_percent };
        let power = if self.power_watts.is_nan() { 0.0 } else { self.power_watts };
        Self {
            usage_percent: usage.clamp(0.0, 100.0),
            power_watts: power.max(0.0),
            source: self.source,
        }
    }
}

/// Power characteristics used by the estimators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PowerProfile {
    /// M-series SoC with integrated GPU and neural engine
    AppleSilicon,
    /// Discrete CPU, integrated GPU, no NPU
    Generic,
}

impl PowerProfile {
    pub fn cpu_idle_watts(&self) -> f64 {
        match self {
            PowerProfile::AppleSilicon => 1.5,
            PowerProfile::Generic => 4.0,
        }
    }

    pub fn cpu_max_watts(&self) -> f64 {
        match self {
            PowerProfile::AppleSilicon => 20.0,
            PowerProfile::Generic => 45.0,
        }
    }

    pub fn has_npu(&self) -> bool {
        matches!(self, PowerProfile::AppleSilicon)
    }
}

/// Source of accelerator readings
pub trait AcceleratorProbe: Send {
    /// Short device name used in logs
    fn name(&self) -> &'static str;

    /// Produce one reading. `cpu_percent` is the CPU utilization sampled in
    /// the same refresh.
    fn sample(&mut self, cpu_percent: f64) -> Result<AcceleratorReading, EstimateError>;

    /// Conservative value used when `sample` fails
    fn fallback(&self) -> AcceleratorReading;
}

fn check_cpu_percent(cpu_percent: f64) -> Result<f64, EstimateError> {
    if cpu_percent.is_finite() && (0.0..=100.0).contains(&cpu_percent) {
        Ok(cpu_percent)
    } else {
        Err(EstimateError::InvalidCpuPercent(cpu_percent))
    }
}

/// Linear CPU power estimate between the profile's idle and max wattage
pub fn estimate_cpu_power(profile: PowerProfile, cpu_percent: f64) -> Result<f64, EstimateError> {
    let cpu_percent = check_cpu_percent(cpu_percent)?;
    let idle = profile.cpu_idle_watts();
    Ok(idle + (cpu_percent / 100.0) * (profile.cpu_max_watts() - idle))
}

/// Synthetic GPU load loosely following CPU load
pub struct EstimatedGpu {
    profile: PowerProfile,
    rng: StdRng,
}

impl EstimatedGpu {
    pub fn new(profile: PowerProfile) -> Self {
        Self::with_rng(profile, StdRng::from_entropy())
    }

    pub fn with_rng(profile: PowerProfile, rng: StdRng) -> Self {
        Self { profile, rng }
    }
}

impl AcceleratorProbe for EstimatedGpu {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn sample(&mut self, cpu_percent: f64) -> Result<AcceleratorReading, EstimateError> {
        let cpu_percent = check_cpu_percent(cpu_percent)?;

        let (usage, power) = match self.profile {
            PowerProfile::AppleSilicon => {
                let usage = (cpu_percent * self.rng.gen_range(0.2..0.8) + self.rng.gen_range(-5.0..15.0))
                    .clamp(0.0, 100.0);
                (usage, 1.0 + (usage / 100.0) * 9.0)
            }
            // Integrated GPUs sit mostly idle and draw little
            PowerProfile::Generic => (self.rng.gen_range(10.0..50.0), self.rng.gen_range(1.0..5.0)),
        };

        Ok(AcceleratorReading {
            usage_percent: usage,
            power_watts: power,
            source: ReadingSource::Estimated,
        })
    }

    fn fallback(&self) -> AcceleratorReading {
        GPU_FALLBACK
    }
}

/// Synthetic neural engine load: mostly idle with occasional bursts
pub struct EstimatedNpu {
    profile: PowerProfile,
    rng: StdRng,
}

impl EstimatedNpu {
    /// Probability of a burst in any one sample
    const BURST_CHANCE: f64 = 0.2;

    pub fn new(profile: PowerProfile) -> Self {
        Self::with_rng(profile, StdRng::from_entropy())
    }

    pub fn with_rng(profile: PowerProfile, rng: StdRng) -> Self {
        Self { profile, rng }
    }
}

impl AcceleratorProbe for EstimatedNpu {
    fn name(&self) -> &'static str {
        "npu"
    }

    fn sample(&mut self, cpu_percent: f64) -> Result<AcceleratorReading, EstimateError> {
        check_cpu_percent(cpu_percent)?;

        if !self.profile.has_npu() {
            return Ok(NPU_FALLBACK);
        }

        let (usage, power) = if self.rng.gen_bool(Self::BURST_CHANCE) {
            let usage = self.rng.gen_range(50.0..95.0);
            (usage, 0.5 + (usage / 100.0) * 3.5)
        } else {
            let usage = self.rng.gen_range(0.0..5.0);
            (usage, 0.1 + (usage / 100.0) * 0.4)
        };

        Ok(AcceleratorReading {
            usage_percent: usage,
            power_watts: power,
            source: ReadingSource::Estimated,
        })
    }

    fn fallback(&self) -> AcceleratorReading {
        NPU_FALLBACK
    }
}

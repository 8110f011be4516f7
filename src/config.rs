//! Run configuration.
//!
//! A [SonarConfig] is built (or loaded from JSON) once, validated, and then only read. A
//! hardware reported sample rate produces a new configuration through
//! [SonarConfig::with_sample_rate] rather than changing the current one.

use std::collections::BTreeMap;
use std::f64::consts::FRAC_PI_4;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{
    axis::sampling_freq_to_len,
    error::{SonarError, SonarResult},
    geometry::{uniform_linear_array, PolarPoint},
};

/// Evenly spaced grid `start..=end` with `count` points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

impl GridSpec {
    pub fn new(start: f64, end: f64, count: usize) -> GridSpec {
        GridSpec { start, end, count }
    }

    pub fn points(&self) -> Array1<f64> {
        match self.count {
            0 => Array1::zeros(0),
            1 => Array1::from_elem(1, self.start),
            n => Array1::linspace(self.start, self.end, n),
        }
    }

    pub fn step(&self) -> f64 {
        if self.count < 2 {
            0.
        } else {
            (self.end - self.start) / (self.count - 1) as f64
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub std_dev: f64,
    // Fixed seed for reproducible simulations; every receiver draws from its own stream.
    pub seed: Option<u64>,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        NoiseConfig {
            std_dev: 0.02,
            seed: None,
        }
    }
}

/// Empirical correction for one receiver channel of the real hardware.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverCalibration {
    /// Radians, applied as `exp(j phase_offset)`
    pub phase_offset: f64,
    pub gain: f64,
    /// Circular shift of the raw samples, positive moves samples later
    pub deadtime_shift: isize,
}

impl Default for ReceiverCalibration {
    fn default() -> Self {
        ReceiverCalibration {
            phase_offset: 0.,
            gain: 1.,
            deadtime_shift: 0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable(BTreeMap<usize, ReceiverCalibration>);

impl CalibrationTable {
    pub fn new() -> CalibrationTable {
        CalibrationTable(BTreeMap::new())
    }

    pub fn with(mut self, receiver: usize, calibration: ReceiverCalibration) -> CalibrationTable {
        self.0.insert(receiver, calibration);
        self
    }

    // Receivers without an entry are left untouched.
    pub fn get(&self, receiver: usize) -> ReceiverCalibration {
        self.0.get(&receiver).copied().unwrap_or_default()
    }

    pub fn receivers(&self) -> impl Iterator<Item = &usize> {
        self.0.keys()
    }
}

/// Which delay the beamformer's phase correction is taken relative to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseReference {
    /// `exp(j 2π fc τ)` with the full two-way delay τ
    Absolute,
    /// `exp(j 2π fc (τ - τref))`, τref the two-way delay to the focus point and back to the
    /// origin
    Boresight,
}

/// What the beamformer does with a delay that falls past the end of a range profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// The receiver contributes nothing to that cell
    ZeroFill,
    /// The last sample of the profile is used
    Clamp,
    /// The run fails with [SonarError::IndexOutOfRange]
    Reject,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    None,
    /// Principal square root of every summed cell, compresses the dynamic range
    SquareRoot,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SonarConfig {
    /// m/s
    pub speed_of_sound: f64,
    /// Hz
    pub center_freq: f64,
    /// s
    pub chirp_duration: f64,
    /// Hz
    pub bandwidth: f64,
    /// Hz, may be replaced by the rate the hardware reports
    pub sample_rate: f64,
    /// Furthest range the record has to cover, m
    pub max_range: f64,
    pub receivers: Vec<PolarPoint>,
    /// Only used by simulated runs
    pub targets: Vec<PolarPoint>,
    pub radial_grid: GridSpec,
    /// Also the field of view
    pub azimuth_grid: GridSpec,
    pub noise: NoiseConfig,
    pub calibration: CalibrationTable,
    /// Gate captured data to the chirp band before filtering
    pub bandpass_prefilter: bool,
    pub phase_reference: PhaseReference,
    pub out_of_range: OutOfRangePolicy,
    pub normalization: Normalization,
}

pub const DEFAULT_RECEIVER_SPACING: f64 = 0.01;

impl Default for SonarConfig {
    fn default() -> Self {
        let deg = 10f64.to_radians();
        SonarConfig {
            speed_of_sound: 343.,
            center_freq: 40_000.,
            chirp_duration: 0.005,
            bandwidth: 2000.,
            sample_rate: 105_000.,
            max_range: 10.,
            receivers: uniform_linear_array(8, DEFAULT_RECEIVER_SPACING),
            targets: vec![
                PolarPoint::new(4., deg),
                PolarPoint::new(5., deg),
                PolarPoint::new(6., deg),
                PolarPoint::new(7., deg),
                PolarPoint::new(5.5, deg),
            ],
            radial_grid: GridSpec::new(0., 10., 150),
            azimuth_grid: GridSpec::new(-FRAC_PI_4, FRAC_PI_4, 160),
            noise: NoiseConfig::default(),
            calibration: CalibrationTable::new(),
            bandpass_prefilter: false,
            phase_reference: PhaseReference::Boresight,
            out_of_range: OutOfRangePolicy::ZeroFill,
            normalization: Normalization::None,
        }
    }
}

fn positive(name: &str, value: f64) -> SonarResult<()> {
    if value.is_finite() && value > 0. {
        Ok(())
    } else {
        Err(SonarError::config(format!(
            "{} must be positive and finite, got {}",
            name, value
        )))
    }
}

impl SonarConfig {
    pub fn from_json(s: &str) -> SonarResult<SonarConfig> {
        let config: SonarConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> SonarResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Lowest chirp frequency, Hz.
    pub fn start_freq(&self) -> f64 {
        self.center_freq - self.bandwidth / 2.
    }

    /// Chirp rate, Hz/s.
    pub fn chirp_rate(&self) -> f64 {
        self.bandwidth / self.chirp_duration
    }

    pub fn wavelength(&self) -> f64 {
        self.speed_of_sound / self.center_freq
    }

    // Round trip to max_range plus one chirp length.
    pub fn max_duration(&self) -> f64 {
        2. * self.max_range / self.speed_of_sound + self.chirp_duration
    }

    pub fn default_num_samples(&self) -> usize {
        sampling_freq_to_len(self.max_duration(), self.sample_rate)
    }

    pub fn with_sample_rate(&self, sample_rate: f64) -> SonarResult<SonarConfig> {
        let config = SonarConfig {
            sample_rate,
            ..self.clone()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SonarResult<()> {
        positive("speed of sound", self.speed_of_sound)?;
        positive("center frequency", self.center_freq)?;
        positive("chirp duration", self.chirp_duration)?;
        positive("bandwidth", self.bandwidth)?;
        positive("sample rate", self.sample_rate)?;
        positive("maximum range", self.max_range)?;

        let nyquist = self.sample_rate / 2.;
        if self.bandwidth > nyquist {
            return Err(SonarError::config(format!(
                "bandwidth {} Hz exceeds half the sample rate ({} Hz)",
                self.bandwidth, nyquist
            )));
        }
        if self.start_freq() <= 0. {
            return Err(SonarError::config(format!(
                "chirp starts at {} Hz, bandwidth must be below twice the center frequency",
                self.start_freq()
            )));
        }
        let top = self.center_freq + self.bandwidth / 2.;
        if top >= nyquist {
            return Err(SonarError::config(format!(
                "chirp reaches {} Hz, at or above the Nyquist frequency {} Hz",
                top, nyquist
            )));
        }
        if self.chirp_duration >= self.max_duration() {
            return Err(SonarError::config("chirp does not fit in the record"));
        }

        if self.receivers.is_empty() {
            return Err(SonarError::config("at least one receiver is required"));
        }
        for (name, points) in [("receiver", &self.receivers), ("target", &self.targets)] {
            for (i, p) in points.iter().enumerate() {
                if !(p.radius.is_finite() && p.radius >= 0. && p.azimuth.is_finite()) {
                    return Err(SonarError::config(format!(
                        "{} {} has an invalid position {:?}",
                        name, i, p
                    )));
                }
            }
        }

        for (name, grid) in [("radial", &self.radial_grid), ("azimuth", &self.azimuth_grid)] {
            if grid.count == 0 {
                return Err(SonarError::config(format!("{} grid is empty", name)));
            }
            if !(grid.start.is_finite() && grid.end.is_finite()) || grid.end < grid.start {
                return Err(SonarError::config(format!(
                    "{} grid {}..{} is not an increasing range",
                    name, grid.start, grid.end
                )));
            }
        }
        if self.radial_grid.start < 0. {
            return Err(SonarError::config("radial grid must start at or beyond 0 m"));
        }

        if !(self.noise.std_dev.is_finite() && self.noise.std_dev >= 0.) {
            return Err(SonarError::config(format!(
                "noise deviation must be non-negative, got {}",
                self.noise.std_dev
            )));
        }
        for &rx in self.calibration.receivers() {
            if rx >= self.receivers.len() {
                return Err(SonarError::config(format!(
                    "calibration given for receiver {} but only {} receivers exist",
                    rx,
                    self.receivers.len()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SonarConfig::default();
        config.validate().unwrap();
        assert_relative_eq!(config.start_freq(), 39_000.);
        assert_relative_eq!(config.chirp_rate(), 400_000.);
        assert_relative_eq!(config.wavelength(), 343. / 40_000.);
        assert_eq!(config.receivers.len(), 8);
        // (20 / 343 + 0.005) * 105000 = 6647.45
        assert_eq!(config.default_num_samples(), 6647);
    }

    #[test]
    fn bandwidth_above_nyquist_is_rejected() {
        let config = SonarConfig {
            sample_rate: 3000.,
            ..SonarConfig::default()
        };
        assert!(matches!(config.validate(), Err(SonarError::Configuration(_))));
    }

    #[test]
    fn chirp_above_nyquist_is_rejected() {
        let config = SonarConfig {
            sample_rate: 80_000.,
            ..SonarConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn scalar_checks() {
        for config in vec![
            SonarConfig {
                speed_of_sound: 0.,
                ..SonarConfig::default()
            },
            SonarConfig {
                chirp_duration: f64::NAN,
                ..SonarConfig::default()
            },
            SonarConfig {
                receivers: vec![],
                ..SonarConfig::default()
            },
            SonarConfig {
                radial_grid: GridSpec::new(0., 10., 0),
                ..SonarConfig::default()
            },
            SonarConfig {
                azimuth_grid: GridSpec::new(1., -1., 10),
                ..SonarConfig::default()
            },
            SonarConfig {
                targets: vec![PolarPoint::new(-1., 0.)],
                ..SonarConfig::default()
            },
            SonarConfig {
                noise: NoiseConfig {
                    std_dev: -0.1,
                    seed: None,
                },
                ..SonarConfig::default()
            },
            SonarConfig {
                calibration: CalibrationTable::new().with(8, ReceiverCalibration::default()),
                ..SonarConfig::default()
            },
        ] {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn sample_rate_override_is_a_new_value() {
        let config = SonarConfig::default();
        let fast = config.with_sample_rate(110_000.).unwrap();
        assert_eq!(config.sample_rate, 105_000.);
        assert_eq!(fast.sample_rate, 110_000.);
        assert!(config.with_sample_rate(-5.).is_err());
    }

    #[test]
    fn json_round_trip_and_partial_documents() {
        let config = SonarConfig {
            calibration: CalibrationTable::new().with(
                2,
                ReceiverCalibration {
                    phase_offset: 0.4,
                    gain: 1.2,
                    deadtime_shift: -3,
                },
            ),
            phase_reference: PhaseReference::Absolute,
            ..SonarConfig::default()
        };
        let back = SonarConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);

        let partial = SonarConfig::from_json(
            r#"{
                "sample_rate": 100000.0,
                "out_of_range": "clamp",
                "normalization": "square_root"
            }"#,
        )
        .unwrap();
        assert_eq!(partial.sample_rate, 100_000.);
        assert_eq!(partial.out_of_range, OutOfRangePolicy::Clamp);
        assert_eq!(partial.normalization, Normalization::SquareRoot);
        assert_eq!(partial.receivers.len(), 8);

        assert!(matches!(
            SonarConfig::from_json("{ \"sample_rate\": "),
            Err(SonarError::Json(_))
        ));
        assert!(matches!(
            SonarConfig::from_json(r#"{ "bandwidth": 90000.0 }"#),
            Err(SonarError::Configuration(_))
        ));
    }

    #[test]
    fn calibration_defaults_to_identity() {
        let table = CalibrationTable::new().with(
            1,
            ReceiverCalibration {
                phase_offset: 0.1,
                gain: 2.,
                deadtime_shift: 4,
            },
        );
        assert_eq!(table.get(0), ReceiverCalibration::default());
        assert_eq!(table.get(1).gain, 2.);
    }

    #[test]
    fn grid_points() {
        let grid = GridSpec::new(-1., 1., 5);
        assert_eq!(grid.points().to_vec(), vec![-1., -0.5, 0., 0.5, 1.]);
        assert_relative_eq!(grid.step(), 0.5);
        assert_eq!(GridSpec::new(2., 3., 1).points().to_vec(), vec![2.]);
    }
}

//! What arrives at a receiver: simulated echoes or captured samples brought onto the run's
//! axes, plus the store for reference and calibration recordings.

use std::sync::Mutex;

use ndarray::Array1;
use num::complex::Complex64;
use rand::Rng;
use tracing::{debug, warn};

use crate::{
    axis::AxisSet,
    config::SonarConfig,
    error::{SonarError, SonarResult},
    geometry::{two_way_delay, PolarPoint},
    signal::{fft::FftPlan, window::mirrored_band_mask, Chirp, ComplexSignal, GaussianNoise, Signal},
};

/// Persistence for waveforms used in calibration.
pub trait WaveformStore: Send + Sync {
    fn load_reference(&self) -> SonarResult<Vec<f64>>;

    fn save_captured(&self, receiver: usize, samples: &[f64]) -> SonarResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryWaveformStore {
    reference: Mutex<Option<Vec<f64>>>,
    captured: Mutex<Vec<(usize, Vec<f64>)>>,
}

impl MemoryWaveformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(reference: Vec<f64>) -> Self {
        MemoryWaveformStore {
            reference: Mutex::new(Some(reference)),
            captured: Mutex::new(Vec::new()),
        }
    }

    pub fn captured(&self) -> SonarResult<Vec<(usize, Vec<f64>)>> {
        self.captured
            .lock()
            .map(|c| c.clone())
            .map_err(|_| SonarError::Store("capture list lock poisoned".into()))
    }
}

impl WaveformStore for MemoryWaveformStore {
    fn load_reference(&self) -> SonarResult<Vec<f64>> {
        let reference = self
            .reference
            .lock()
            .map_err(|_| SonarError::Store("reference lock poisoned".into()))?;
        reference
            .clone()
            .ok_or_else(|| SonarError::Store("no reference waveform stored".into()))
    }

    fn save_captured(&self, receiver: usize, samples: &[f64]) -> SonarResult<()> {
        self.captured
            .lock()
            .map_err(|_| SonarError::Store("capture list lock poisoned".into()))?
            .push((receiver, samples.to_vec()));
        Ok(())
    }
}

pub struct ReceiveModel<'a> {
    config: &'a SonarConfig,
    axes: &'a AxisSet,
    plan: &'a FftPlan,
    store: Option<&'a dyn WaveformStore>,
}

impl<'a> ReceiveModel<'a> {
    pub fn new(config: &'a SonarConfig, axes: &'a AxisSet, plan: &'a FftPlan) -> Self {
        ReceiveModel {
            config,
            axes,
            plan,
            store: None,
        }
    }

    /// Captured samples are also written to `store` as they are prepared.
    pub fn with_store(mut self, store: &'a dyn WaveformStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Two-way delays from the transmitter at the origin to every configured target and back
    /// to `receiver`.
    pub fn target_delays(&self, receiver: &PolarPoint) -> Vec<f64> {
        self.config
            .targets
            .iter()
            .map(|target| {
                two_way_delay(
                    &PolarPoint::ORIGIN,
                    target,
                    receiver,
                    self.config.speed_of_sound,
                )
            })
            .collect()
    }

    /**
    Sum of one echo per delay plus white Gaussian noise.

    Each echo is `chirp` shifted by its delay and scaled by `1/R²`, `R = delay·c/2` being
    the equivalent one-way range. Non-positive delays have no meaningful range and are
    skipped.
    */
    pub fn simulate<R: Rng>(
        &self,
        chirp: &Chirp,
        delays: &[f64],
        rng: R,
    ) -> SonarResult<ComplexSignal> {
        let time = self.axes.time();
        let mut xt = Array1::zeros(self.axes.num_samples());
        for &delay in delays {
            let range = 0.5 * delay * self.config.speed_of_sound;
            if !(range > 0.) {
                warn!(delay, "skipping echo with non-positive delay");
                continue;
            }
            xt += &chirp.delay(delay).scale(1. / (range * range)).generate_signal(time);
        }

        let sigma = self.config.noise.std_dev;
        if sigma > 0. {
            xt += &GaussianNoise::new(sigma, rng)?.generate_signal(time);
        }
        debug!(echoes = delays.len(), sigma, "simulated receive");
        Ok(ComplexSignal::from_real(&xt, self.plan))
    }

    /// Brings one captured buffer onto the run's axes. The buffer has to match the record
    /// length exactly, otherwise delays could not be mapped to sample indices.
    pub fn prepare(&self, receiver: usize, raw: &[f64]) -> SonarResult<ComplexSignal> {
        if raw.len() != self.axes.num_samples() {
            return Err(SonarError::BufferLength {
                receiver,
                expected: self.axes.num_samples(),
                actual: raw.len(),
            });
        }
        if let Some(store) = self.store {
            store.save_captured(receiver, raw)?;
        }

        let signal = ComplexSignal::from_real(&Array1::from(raw.to_vec()), self.plan);
        if !self.config.bandpass_prefilter {
            return Ok(signal);
        }
        let mask = mirrored_band_mask(
            self.axes.freq(),
            self.config.center_freq,
            self.config.bandwidth,
        );
        let gated = signal.spectrum() * &mask.mapv(|m| Complex64::new(m, 0.));
        Ok(ComplexSignal::from_spectrum(gated, self.plan))
    }
}

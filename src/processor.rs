//! The per-receiver 1-D chain that turns one received record into a range profile.
//!
//! Stages run in a fixed order:
//!
//! 1. pulse compression (inverse filter gated to the chirp band)
//! 2. analytic signal
//! 3. Blackman sidelobe window
//! 4. baseband translation
//! 5. hardware compensation, captured data only
//! 6. range compensation
//!
//! Each stage takes and returns a [ComplexSignal], so either domain of every intermediate
//! result is available to a [Diagnostics] sink.

use std::f64::consts::PI;

use num::complex::Complex64;
use tracing::debug;

use crate::{
    axis::AxisSet,
    config::{ReceiverCalibration, SonarConfig},
    diagnostics::{Diagnostics, NoDiagnostics},
    error::{SonarError, SonarResult},
    signal::{
        fft::FftPlan,
        window::{blackman_band, mirrored_band_mask},
        ComplexSignal,
    },
};

/// Processed echo strength and phase against range for one receiver, on the run's time axis.
#[derive(Clone, Debug)]
pub struct RangeProfile {
    pub receiver: usize,
    pub signal: ComplexSignal,
}

impl RangeProfile {
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }

    pub fn sample(&self, index: usize) -> Option<Complex64> {
        self.signal.time().get(index).copied()
    }

    // Sample index of the strongest return.
    pub fn peak_index(&self) -> Option<usize> {
        self.signal.peak().map(|(i, _)| i)
    }
}

pub struct PulseProcessor<'a> {
    config: &'a SonarConfig,
    axes: &'a AxisSet,
    plan: &'a FftPlan,
    diagnostics: &'a dyn Diagnostics,
}

impl<'a> PulseProcessor<'a> {
    pub fn new(config: &'a SonarConfig, axes: &'a AxisSet, plan: &'a FftPlan) -> Self {
        PulseProcessor {
            config,
            axes,
            plan,
            diagnostics: &NoDiagnostics,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a dyn Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Divides the received spectrum by the reference spectrum and keeps only the chirp band
    /// and its negative frequency image. Bins that come out non-finite, wherever the
    /// reference has (near) zero energy, are set to zero.
    pub fn pulse_compression(
        &self,
        reference: &ComplexSignal,
        received: &ComplexSignal,
    ) -> ComplexSignal {
        let mask = mirrored_band_mask(
            self.axes.freq(),
            self.config.center_freq,
            self.config.bandwidth,
        );
        let mut sanitized = 0usize;
        let spectrum = ndarray::Zip::from(received.spectrum())
            .and(reference.spectrum())
            .and(&mask)
            .map_collect(|&y, &x, &m| {
                let h = y / x * m;
                if h.is_finite() {
                    h
                } else {
                    sanitized += 1;
                    Complex64::new(0., 0.)
                }
            });
        if sanitized > 0 {
            debug!(sanitized, "zeroed non-finite inverse filter bins");
        }
        ComplexSignal::from_spectrum(spectrum, self.plan)
    }

    /// Doubles the spectrum and removes everything above the Nyquist bin. Works on DFT
    /// ordered bins.
    pub fn to_analytic(&self, x: &ComplexSignal) -> ComplexSignal {
        let N = x.len();
        let mut spectrum = x.spectrum() * 2.;
        for (k, v) in spectrum.iter_mut().enumerate() {
            if 2 * k > N {
                *v = Complex64::new(0., 0.);
            }
        }
        ComplexSignal::from_spectrum(spectrum, self.plan)
    }

    // Blackman taper over the chirp band around the center frequency.
    pub fn apply_window(&self, x: &ComplexSignal) -> ComplexSignal {
        let window = blackman_band(
            self.axes.freq(),
            self.config.center_freq,
            self.config.bandwidth,
        );
        let spectrum = ndarray::Zip::from(x.spectrum())
            .and(&window)
            .map_collect(|&v, &w| v * w);
        ComplexSignal::from_spectrum(spectrum, self.plan)
    }

    pub fn to_baseband(&self, x: &ComplexSignal) -> ComplexSignal {
        let fc = self.config.center_freq;
        let time = ndarray::Zip::from(x.time())
            .and(self.axes.time())
            .map_collect(|&v, &t| v * Complex64::from_polar(1., -2. * PI * fc * t));
        ComplexSignal::from_time(time, self.plan)
    }

    /// Circularly shifts the raw record by the receiver's fixed deadtime. Positive shifts move
    /// samples later.
    pub fn compensate_deadtime(
        &self,
        x: &ComplexSignal,
        calibration: &ReceiverCalibration,
    ) -> ComplexSignal {
        let len = x.len();
        if len == 0 || calibration.deadtime_shift == 0 {
            return x.clone();
        }
        let shift = calibration.deadtime_shift.rem_euclid(len as isize) as usize;
        let mut time = x.time().to_vec();
        time.rotate_right(shift);
        ComplexSignal::from_time(time.into(), self.plan)
    }

    // Fixed phase offset then gain.
    pub fn compensate_phase_gain(
        &self,
        x: &ComplexSignal,
        calibration: &ReceiverCalibration,
    ) -> ComplexSignal {
        let factor = Complex64::from_polar(1., calibration.phase_offset) * calibration.gain;
        ComplexSignal::from_time(x.time() * factor, self.plan)
    }

    /// Multiplies by the squared one-way range of each sample, undoing the 1/R² loss.
    pub fn range_compensation(&self, x: &ComplexSignal) -> ComplexSignal {
        let time = ndarray::Zip::from(x.time())
            .and(self.axes.distance())
            .map_collect(|&v, &r| v * (r * r));
        ComplexSignal::from_time(time, self.plan)
    }

    /**
    Runs the full chain for one receiver.

    `calibration` is given for captured data only. Its deadtime shift is applied to the raw
    record before anything else, its phase and gain after baseband translation.
    */
    pub fn process(
        &self,
        receiver: usize,
        reference: &ComplexSignal,
        received: &ComplexSignal,
        calibration: Option<&ReceiverCalibration>,
    ) -> SonarResult<RangeProfile> {
        let N = self.axes.num_samples();
        for x in [reference, received] {
            if x.len() != N {
                return Err(SonarError::BufferLength {
                    receiver,
                    expected: N,
                    actual: x.len(),
                });
            }
        }
        debug!(receiver, calibrated = calibration.is_some(), "processing receiver");

        let d = self.diagnostics;
        d.on_reference(receiver, reference);

        let received = match calibration {
            Some(cal) => self.compensate_deadtime(received, cal),
            None => received.clone(),
        };
        d.on_received(receiver, &received);

        let compressed = self.pulse_compression(reference, &received);
        d.on_pulse_compressed(receiver, &compressed);

        let analytic = self.to_analytic(&compressed);
        d.on_analytic(receiver, &analytic);

        let windowed = self.apply_window(&analytic);
        d.on_windowed(receiver, &windowed);

        let mut yt = self.to_baseband(&windowed);
        d.on_baseband(receiver, &yt);

        if let Some(cal) = calibration {
            yt = self.compensate_phase_gain(&yt, cal);
            d.on_hardware_compensated(receiver, &yt);
        }

        let profile = self.range_compensation(&yt);
        d.on_range_profile(receiver, &profile);

        Ok(RangeProfile {
            receiver,
            signal: profile,
        })
    }
}

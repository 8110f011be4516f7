use ndarray::Array1;

use crate::error::{SonarError, SonarResult};

pub fn sampling_freq_to_len(interval: f64, sampling_frequency: f64) -> usize {
    (interval * sampling_frequency).round() as usize
}

// Every time, distance and frequency axis used by one processing run.
// All of them are derived from (sample_rate, num_samples) in `new`, and there is no way to
// change one without building a new AxisSet.
#[derive(Clone, Debug)]
pub struct AxisSet {
    sample_rate: f64,
    num_samples: usize,
    sample_spacing: f64,
    freq_spacing: f64,
    time: Array1<f64>,
    distance: Array1<f64>,
    freq: Array1<f64>,
    centered_freq: Array1<f64>,
}

impl AxisSet {
    pub fn new(sample_rate: f64, num_samples: usize, speed_of_sound: f64) -> SonarResult<AxisSet> {
        if !(sample_rate.is_finite() && sample_rate > 0.) {
            return Err(SonarError::config(format!(
                "sample rate must be positive, got {}",
                sample_rate
            )));
        }
        if num_samples == 0 {
            return Err(SonarError::config("record length must be at least one sample"));
        }

        let N = num_samples;
        let dt = 1. / sample_rate;
        let df = sample_rate / N as f64;

        let time = Array1::from_shape_fn(N, |i| i as f64 * dt);
        let distance = time.mapv(|t| 0.5 * speed_of_sound * t);
        let freq = Array1::linspace(0., (N - 1) as f64 * df, N);

        // The window and mask functions are laid out against this bin convention, a one bin
        // shift moves the passband.
        let centered_freq = if N % 2 == 0 {
            let half = (N / 2) as f64;
            Array1::linspace(-half, half - 1., N) * df
        } else {
            let half = ((N - 1) / 2) as f64;
            Array1::linspace(-half, half, N) * df
        };

        Ok(AxisSet {
            sample_rate,
            num_samples,
            sample_spacing: dt,
            freq_spacing: df,
            time,
            distance,
            freq,
            centered_freq,
        })
    }

    // Builds the axes for a record covering `duration` seconds.
    pub fn for_duration(
        sample_rate: f64,
        duration: f64,
        speed_of_sound: f64,
    ) -> SonarResult<AxisSet> {
        Self::new(
            sample_rate,
            sampling_freq_to_len(duration, sample_rate),
            speed_of_sound,
        )
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn sample_spacing(&self) -> f64 {
        self.sample_spacing
    }

    pub fn freq_spacing(&self) -> f64 {
        self.freq_spacing
    }

    pub fn duration(&self) -> f64 {
        self.num_samples as f64 * self.sample_spacing
    }

    pub fn time(&self) -> &Array1<f64> {
        &self.time
    }

    pub fn distance(&self) -> &Array1<f64> {
        &self.distance
    }

    /// Non-negative bin frequencies in DFT order.
    pub fn freq(&self) -> &Array1<f64> {
        &self.freq
    }

    /// Zero centred frequencies, matching an fft-shifted spectrum.
    pub fn centered_freq(&self) -> &Array1<f64> {
        &self.centered_freq
    }

    // Nearest sample to a delay, without any bounds check.
    pub fn delay_to_index(&self, delay: f64) -> usize {
        (delay / self.sample_spacing).round().max(0.) as usize
    }
}

//! Transmit waveforms: the reference chirp the processing chain divides by, and the
//! two-level chirp the transmitter plays from a lookup table.

use std::fmt::Write;

use ndarray::Array1;
use num::complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::{
    axis::{sampling_freq_to_len, AxisSet},
    config::SonarConfig,
    signal::{fft::FftPlan, fft::FFT, Chirp, ComplexSignal, Signal},
};

/// Builds the reference chirp for a run.
pub struct WaveformSynthesizer<'a> {
    config: &'a SonarConfig,
    axes: &'a AxisSet,
    plan: &'a FftPlan,
}

impl<'a> WaveformSynthesizer<'a> {
    pub fn new(config: &'a SonarConfig, axes: &'a AxisSet, plan: &'a FftPlan) -> Self {
        WaveformSynthesizer { config, axes, plan }
    }

    pub fn chirp(&self) -> Chirp {
        Chirp {
            start_freq: self.config.start_freq(),
            rate: self.config.chirp_rate(),
            duration: self.config.chirp_duration,
            delay: 0.,
            amplitude: 1.,
        }
    }

    // Unit rectangle envelope over (0, T), sampled on the run's time axis.
    pub fn make_chirp(&self) -> ComplexSignal {
        let xt = self.chirp().generate_signal(self.axes.time());
        ComplexSignal::from_real(&xt, self.plan)
    }

    /// Wraps an externally stored reference waveform. Shorter recordings are zero padded
    /// to the record length, longer ones truncated.
    pub fn from_samples(&self, samples: &[f64]) -> ComplexSignal {
        let N = self.axes.num_samples();
        let xt: Array1<f64> = (0..N)
            .map(|i| samples.get(i).copied().unwrap_or(0.))
            .collect();
        ComplexSignal::from_real(&xt, self.plan)
    }
}

/// Two-level approximation of a chirp, as played by a comparator driven transmitter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinaryChirp {
    pub center_freq: f64,
    pub bandwidth: f64,
    pub duration: f64,
    pub sample_rate: f64,
}

impl Default for BinaryChirp {
    fn default() -> Self {
        BinaryChirp {
            center_freq: 40_000.,
            bandwidth: 6000.,
            duration: 0.005,
            sample_rate: 500_000.,
        }
    }
}

impl BinaryChirp {
    pub fn len(&self) -> usize {
        sampling_freq_to_len(self.duration, self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn carrier(&self) -> Chirp {
        Chirp {
            start_freq: self.center_freq - self.bandwidth / 2.,
            rate: self.bandwidth / self.duration,
            duration: self.duration,
            delay: 0.,
            amplitude: 1.,
        }
    }

    fn time(&self) -> Array1<f64> {
        let n = self.len();
        if n < 2 {
            return Array1::zeros(n);
        }
        Array1::linspace(0., self.duration, n)
    }

    /// Compares the cosine carrier against a zero threshold: 1 where the carrier is
    /// negative, 0 elsewhere.
    pub fn samples(&self) -> Array1<u8> {
        let carrier = self.carrier();
        self.time()
            .mapv(|t| if carrier.phase(t).cos() < 0. { 1 } else { 0 })
    }

    pub fn spectrum(&self) -> Array1<Complex64> {
        self.samples().mapv(f64::from).fft()
    }

    /// C header with the lookup table the transmitter firmware plays back.
    pub fn lookup_table_header(&self) -> String {
        let samples = self.samples();
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = writeln!(out, "#define _chirp_signal_");
        let _ = writeln!(out, "#define CHIRP_SAMPLE_RATE {:?}", self.sample_rate);
        let _ = writeln!(out, "#define NUM_SAMPLES {}", samples.len());
        let _ = writeln!(out, "static float waveformLookup[NUM_SAMPLES] = ");
        let _ = writeln!(out, "{{");
        let body = samples
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "{}", body);
        let _ = writeln!(out, "}};");
        out
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::{BinaryChirp, WaveformSynthesizer};
    use crate::{axis::AxisSet, config::SonarConfig, signal::fft::FftPlan};

    #[test]
    fn chirp_occupies_its_band() {
        let config = SonarConfig {
            sample_rate: 100_000.,
            ..SonarConfig::default()
        };
        let axes = AxisSet::new(config.sample_rate, 10_000, config.speed_of_sound).unwrap();
        let plan = FftPlan::new(axes.num_samples());
        let chirp = WaveformSynthesizer::new(&config, &axes, &plan).make_chirp();

        // Gate is open for T = 5 ms = 500 samples, sample 0 sits on the closed edge.
        assert_eq!(chirp.time()[0].re, 0.);
        assert_eq!(chirp.time()[600].re, 0.);
        assert!(chirp.time()[250].re.abs() <= 1.);

        let freq = axes.freq();
        let (in_band, total) = chirp
            .spectrum()
            .iter()
            .zip(freq.iter())
            .take(axes.num_samples() / 2)
            .fold((0., 0.), |(b, t), (x, &f)| {
                let e = x.norm_sqr();
                if (f - 40_000.).abs() < 1500. {
                    (b + e, t + e)
                } else {
                    (b, t + e)
                }
            });
        assert!(in_band / total > 0.8);
    }

    #[test]
    fn stored_reference_is_padded() {
        let config = SonarConfig::default();
        let axes = AxisSet::new(config.sample_rate, 16, config.speed_of_sound).unwrap();
        let plan = FftPlan::new(16);
        let synth = WaveformSynthesizer::new(&config, &axes, &plan);
        let x = synth.from_samples(&[1., 2., 3.]);
        assert_eq!(x.len(), 16);
        assert_eq!(x.time()[2].re, 3.);
        assert_eq!(x.time()[3].re, 0.);
        assert_relative_eq!(x.spectrum()[0].re, 6., epsilon = 1e-12);
    }

    #[test]
    fn binary_chirp_is_two_level() {
        let chirp = BinaryChirp::default();
        let samples = chirp.samples();
        assert_eq!(samples.len(), 2500);
        assert!(samples.iter().all(|&s| s == 0 || s == 1));
        // cos(0) = 1 is above the threshold
        assert_eq!(samples[0], 0);
        let ones = samples.iter().filter(|&&s| s == 1).count();
        assert!(ones > 1000 && ones < 1500);
    }

    #[test]
    fn binary_chirp_energy_near_carrier() {
        let chirp = BinaryChirp::default();
        let spectrum = chirp.spectrum();
        let df = chirp.sample_rate / spectrum.len() as f64;
        let peak = spectrum
            .iter()
            .take(spectrum.len() / 2)
            .skip(1)
            .enumerate()
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(k, _)| (k + 1) as f64 * df)
            .unwrap();
        assert!((peak - 40_000.).abs() < 3000.);
    }

    #[test]
    fn header_layout() {
        let chirp = BinaryChirp {
            duration: 0.0001,
            ..BinaryChirp::default()
        };
        let header = chirp.lookup_table_header();
        let lines: Vec<_> = header.lines().collect();
        assert_eq!(lines[0], "#define _chirp_signal_");
        assert_eq!(lines[1], "#define CHIRP_SAMPLE_RATE 500000.0");
        assert_eq!(lines[2], "#define NUM_SAMPLES 50");
        assert_eq!(lines[3], "static float waveformLookup[NUM_SAMPLES] = ");
        assert_eq!(lines[4], "{");
        assert_eq!(lines[5].split(", ").count(), 50);
        assert_eq!(lines[6], "};");
    }
}

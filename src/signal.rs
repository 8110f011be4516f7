use std::{cell::RefCell, f64::consts::PI};

use ndarray::Array1;
use num::complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{SonarError, SonarResult};

pub mod fft;
pub mod realization;
pub mod window;

pub use realization::ComplexSignal;

// Unit gate that is open strictly inside (-width/2, width/2).
pub fn rect(t: f64, width: f64) -> f64 {
    if (t / width).abs() < 0.5 {
        1.
    } else {
        0.
    }
}

pub trait Signal {
    fn generate(&self, t: f64) -> f64;

    fn generate_signal(&self, time: &Array1<f64>) -> Array1<f64> {
        time.mapv(|t| self.generate(t))
    }
}

/// Linear frequency modulated pulse.
///
/// The gate opens at `delay` and stays open for `duration`. Inside the gate the
/// instantaneous frequency sweeps from `start_freq` at `rate` Hz/s.
#[derive(Clone, Debug, PartialEq)]
pub struct Chirp {
    pub start_freq: f64,
    pub rate: f64,
    pub duration: f64,
    pub delay: f64,
    pub amplitude: f64,
}

impl Chirp {
    pub fn phase(&self, t: f64) -> f64 {
        let t = t - self.delay;
        2. * PI * (self.start_freq * t + 0.5 * self.rate * t * t)
    }

    // The echo is the whole waveform shifted in time, carrier included, so the processed
    // range profile carries the phase exp(-j 2 pi fc delay).
    pub fn delay(&self, t: f64) -> Chirp {
        let mut out = self.clone();
        out.delay += t;
        out
    }

    pub fn scale(&self, a: f64) -> Chirp {
        let mut out = self.clone();
        out.amplitude *= a;
        out
    }

    pub fn end_freq(&self) -> f64 {
        self.start_freq + self.rate * self.duration
    }
}

impl Signal for Chirp {
    fn generate(&self, t: f64) -> f64 {
        self.amplitude
            * rect(t - self.delay - self.duration / 2., self.duration)
            * self.phase(t).cos()
    }
}

// Implements a random gaussian signal. This signal is inherently non-deterministic, and calling
// generate twice with the same value will almost certainly yield different results.
pub struct GaussianNoise<T: Rng> {
    rng: RefCell<T>,
    distr: Normal<f64>,
}

impl<T: Rng> GaussianNoise<T> {
    pub fn new(sigma: f64, rng: T) -> SonarResult<GaussianNoise<T>> {
        // Normal only rejects a non-finite deviation
        if !(sigma.is_finite() && sigma >= 0.) {
            return Err(SonarError::config(format!(
                "noise deviation must be finite and non-negative, got {}",
                sigma
            )));
        }
        let distr = Normal::new(0., sigma).map_err(|e| {
            SonarError::config(format!("invalid noise deviation {}: {}", sigma, e))
        })?;
        Ok(GaussianNoise {
            rng: RefCell::new(rng),
            distr,
        })
    }
}

impl<T: Rng> Signal for GaussianNoise<T> {
    fn generate(&self, _: f64) -> f64 {
        let rng = &mut *self.rng.borrow_mut();
        self.distr.sample(rng)
    }

    fn generate_signal(&self, time: &Array1<f64>) -> Array1<f64> {
        let rng = &mut *self.rng.borrow_mut();
        time.iter().map(|_| self.distr.sample(rng)).collect()
    }
}

pub fn to_complex(x: &Array1<f64>) -> Array1<Complex64> {
    x.mapv(|re| Complex64::new(re, 0.))
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;
    use ndarray::Array1;
    use rand::{rngs::StdRng, SeedableRng};

    use crate::error::SonarError;
    use super::{rect, Chirp, GaussianNoise, Signal};

    fn chirp() -> Chirp {
        Chirp {
            start_freq: 39_000.,
            rate: 2000. / 0.005,
            duration: 0.005,
            delay: 0.,
            amplitude: 1.,
        }
    }

    #[test]
    fn rect_is_open_inside() {
        assert_eq!(rect(0., 1.), 1.);
        assert_eq!(rect(0.49, 1.), 1.);
        assert_eq!(rect(0.5, 1.), 0.);
        assert_eq!(rect(-0.7, 1.), 0.);
    }

    #[test]
    fn chirp_is_gated() {
        let c = chirp();
        assert_eq!(c.generate(0.), 0.);
        assert_eq!(c.generate(0.006), 0.);
        assert_eq!(c.generate(-0.001), 0.);
        assert_relative_eq!(c.end_freq(), 41_000.);
    }

    #[test]
    fn delayed_chirp_is_shifted_copy() {
        let c = chirp();
        let d = c.delay(0.01).scale(0.5);
        for &t in &[0.0011, 0.0023, 0.0049] {
            assert_relative_eq!(d.generate(t + 0.01), 0.5 * c.generate(t), epsilon = 1e-9);
        }
        assert_eq!(d.generate(0.002), 0.);
    }

    #[test]
    fn noise_is_reproducible_with_seed() {
        let time = Array1::linspace(0., 1., 64);
        let a = GaussianNoise::new(0.02, StdRng::seed_from_u64(7))
            .unwrap()
            .generate_signal(&time);
        let b = GaussianNoise::new(0.02, StdRng::seed_from_u64(7))
            .unwrap()
            .generate_signal(&time);
        assert_eq!(a, b);
        assert!(a.iter().any(|&x| x != 0.));
    }

    #[test]
    fn noise_rejects_bad_deviation() {
        assert!(GaussianNoise::new(-1., StdRng::seed_from_u64(0)).is_err());
        assert!(GaussianNoise::new(f64::NAN, StdRng::seed_from_u64(0)).is_err());
        assert!(GaussianNoise::new(f64::INFINITY, StdRng::seed_from_u64(0)).is_err());
        assert!(matches!(
            GaussianNoise::new(-1e-9, StdRng::seed_from_u64(0)),
            Err(SonarError::Configuration(_))
        ));

        // zero deviation is allowed and silent
        let quiet = GaussianNoise::new(0., StdRng::seed_from_u64(0)).unwrap();
        let x = quiet.generate_signal(&Array1::linspace(0., 1., 16));
        assert!(x.iter().all(|&v| v == 0.));
    }
}

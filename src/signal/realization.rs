use ndarray::Array1;
use num::complex::Complex64;

use super::fft::{fft_shift, FftPlan};

/// A record held in both domains at once.
///
/// The two halves are only ever produced together from one of them through the run's
/// [`FftPlan`], so they stay a forward/inverse transform pair.
#[derive(Clone, Debug)]
pub struct ComplexSignal {
    time: Array1<Complex64>,
    spectrum: Array1<Complex64>,
}

impl ComplexSignal {
    pub fn from_time(time: Array1<Complex64>, plan: &FftPlan) -> ComplexSignal {
        let spectrum = plan.forward(time.clone());
        ComplexSignal { time, spectrum }
    }

    pub fn from_real(time: &Array1<f64>, plan: &FftPlan) -> ComplexSignal {
        Self::from_time(super::to_complex(time), plan)
    }

    pub fn from_spectrum(spectrum: Array1<Complex64>, plan: &FftPlan) -> ComplexSignal {
        let time = plan.inverse(spectrum.clone());
        ComplexSignal { time, spectrum }
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn time(&self) -> &Array1<Complex64> {
        &self.time
    }

    pub fn spectrum(&self) -> &Array1<Complex64> {
        &self.spectrum
    }

    pub fn into_time(self) -> Array1<Complex64> {
        self.time
    }

    // Spectrum in the bin order of AxisSet::centered_freq.
    pub fn centered_spectrum(&self) -> Array1<Complex64> {
        fft_shift(&self.spectrum)
    }

    pub fn magnitude(&self) -> Array1<f64> {
        self.time.mapv(|x| x.norm())
    }

    pub fn phase(&self) -> Array1<f64> {
        self.time.mapv(|x| x.arg())
    }

    pub fn signal_energy(&self) -> f64 {
        self.time.iter().map(|x| x.norm_sqr()).sum()
    }

    // Index and magnitude of the strongest time sample.
    pub fn peak(&self) -> Option<(usize, f64)> {
        crate::helper::argmax(self.time.iter().map(|x| x.norm()))
    }
}

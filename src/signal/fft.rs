use std::sync::Arc;

use ndarray::Array1;
use num::complex::Complex64;
use rustfft::{Fft, FftPlanner};

pub trait FFT {
    fn fft_planned(self, plan: &Arc<dyn Fft<f64>>) -> Array1<Complex64>;
    fn fft(self) -> Array1<Complex64>;

    fn ifft(self) -> Array1<Complex64>;
}

impl FFT for Array1<f64> {
    fn fft(self) -> Array1<Complex64> {
        self.mapv(|x| Complex64::new(x, 0.)).fft()
    }

    fn ifft(self) -> Array1<Complex64> {
        self.mapv(|x| Complex64::new(x, 0.)).ifft()
    }

    fn fft_planned(self, plan: &Arc<dyn Fft<f64>>) -> Array1<Complex64> {
        self.mapv(|x| Complex64::new(x, 0.)).fft_planned(plan)
    }
}

impl FFT for Array1<Complex64> {
    fn fft_planned(self, plan: &Arc<dyn Fft<f64>>) -> Array1<Complex64> {
        let mut buf = self.to_vec();
        plan.process(&mut buf);

        Array1::from(buf)
    }

    fn fft(self) -> Array1<Complex64> {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(self.len());

        self.fft_planned(&fft)
    }

    fn ifft(self) -> Array1<Complex64> {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_inverse(self.len());

        let N = self.len() as f64;

        self.fft_planned(&fft).mapv(|v| v / N)
    }
}

// Moves the zero frequency bin to the middle, index N/2 for even and (N-1)/2 for odd N,
// so that bin order matches AxisSet::centered_freq.
pub fn fft_shift(x: &Array1<Complex64>) -> Array1<Complex64> {
    let mut out = x.to_vec();
    let len = out.len();
    out.rotate_right(len / 2);
    Array1::from(out)
}

/// Forward and inverse transforms planned once for a record length and shared by every
/// stage and receiver of a run.
#[derive(Clone)]
pub struct FftPlan {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftPlan {
    pub fn new(len: usize) -> FftPlan {
        let mut planner = FftPlanner::new();
        FftPlan {
            len,
            forward: planner.plan_fft_forward(len),
            inverse: planner.plan_fft_inverse(len),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn forward(&self, x: Array1<Complex64>) -> Array1<Complex64> {
        debug_assert_eq!(x.len(), self.len);
        x.fft_planned(&self.forward)
    }

    pub fn inverse(&self, x: Array1<Complex64>) -> Array1<Complex64> {
        debug_assert_eq!(x.len(), self.len);
        let N = self.len as f64;
        let mut out = x.fft_planned(&self.inverse);
        out.mapv_inplace(|v| v / N);
        out
    }
}

impl std::fmt::Debug for FftPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftPlan").field("len", &self.len).finish()
    }
}

use std::f64::consts::PI;

use ndarray::Array1;

use super::rect;

/// Unit passband of width `bandwidth` centred on `center`, evaluated on `freq`.
///
/// The centre is folded into `[0, fs)` first, where `fs` is the span of a DFT ordered
/// axis, so that it lands on the bins it aliases to.
pub fn band_mask(freq: &Array1<f64>, center: f64, bandwidth: f64) -> Array1<f64> {
    let span = dft_span(freq);
    let center = if span > 0. { center.rem_euclid(span) } else { center };
    freq.mapv(|f| rect(f - center, bandwidth))
}

/// [band_mask] plus its reversal, so both the positive band and its negative frequency
/// image pass. Bins are DFT ordered, the reversal maps bin `k` onto bin `N-1-k`.
pub fn mirrored_band_mask(freq: &Array1<f64>, center: f64, bandwidth: f64) -> Array1<f64> {
    let mask = band_mask(freq, center, bandwidth);
    let mut reversed = mask.clone();
    reversed.invert_axis(ndarray::Axis(0));
    mask + reversed
}

/**
Blackman taper across the band `center ± bandwidth/2`, zero outside it.

Uses the classic rounded coefficients a0 = 0.42, a1 = 0.5, a2 = 0.08 (equation (59) in [1]).
The taper is a function of the offset of each bin from `center`, so it peaks at the centre
frequency and falls to zero at both band edges.

[1] Armin Doerry, "Catalog of Window Taper Functions for Sidelobe Control", 2017.
*/
pub fn blackman_band(freq: &Array1<f64>, center: f64, bandwidth: f64) -> Array1<f64> {
    const a0: f64 = 0.42;
    const a1: f64 = 0.5;
    const a2: f64 = 0.08;

    freq.mapv(|f| {
        let u = (f - center) / bandwidth + 0.5;
        let taper = a0 - a1 * (2. * PI * u).cos() + a2 * (4. * PI * u).cos();
        taper * rect(f - center, bandwidth)
    })
}

fn dft_span(freq: &Array1<f64>) -> f64 {
    match (freq.len(), freq.get(1)) {
        (n, Some(&df)) if n > 1 => df * n as f64,
        _ => 0.,
    }
}

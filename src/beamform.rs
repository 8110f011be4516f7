//! Delay-and-sum imaging over a polar grid.

use std::f64::consts::PI;

use ndarray::{Array1, Array2};
use num::complex::Complex64;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    axis::AxisSet,
    config::{Normalization, OutOfRangePolicy, PhaseReference, SonarConfig},
    error::{SonarError, SonarResult},
    geometry::{two_way_delay, PolarPoint},
    helper::{argmax, decibels_or_else},
    processor::RangeProfile,
};

/// Focus points of an image: every radius paired with every azimuth.
#[derive(Clone, Debug, PartialEq)]
pub struct PolarGrid {
    pub radial: Array1<f64>,
    pub azimuth: Array1<f64>,
}

impl PolarGrid {
    pub fn new(radial: Array1<f64>, azimuth: Array1<f64>) -> PolarGrid {
        PolarGrid { radial, azimuth }
    }

    pub fn from_config(config: &SonarConfig) -> PolarGrid {
        PolarGrid {
            radial: config.radial_grid.points(),
            azimuth: config.azimuth_grid.points(),
        }
    }

    // (azimuth, range), the image's dimension order.
    pub fn dim(&self) -> (usize, usize) {
        (self.azimuth.len(), self.radial.len())
    }

    pub fn point(&self, azimuth_index: usize, range_index: usize) -> PolarPoint {
        PolarPoint::new(self.radial[range_index], self.azimuth[azimuth_index])
    }
}

/// Complex reflectivity indexed `[azimuth][range]`, together with the grid it was formed on.
#[derive(Clone, Debug)]
pub struct PolarImage {
    data: Array2<Complex64>,
    grid: PolarGrid,
}

impl PolarImage {
    pub fn data(&self) -> &Array2<Complex64> {
        &self.data
    }

    pub fn radial(&self) -> &Array1<f64> {
        &self.grid.radial
    }

    pub fn azimuth(&self) -> &Array1<f64> {
        &self.grid.azimuth
    }

    pub fn grid(&self) -> &PolarGrid {
        &self.grid
    }

    pub fn into_parts(self) -> (Array2<Complex64>, PolarGrid) {
        (self.data, self.grid)
    }

    pub fn magnitude(&self) -> Array2<f64> {
        self.data.mapv(|v| v.norm())
    }

    /// Power relative to the strongest cell, in dB. Empty cells read `floor`.
    pub fn magnitude_db(&self, floor: f64) -> Array2<f64> {
        let peak = self.peak().map(|(_, _, v)| v * v).unwrap_or(0.);
        self.data.mapv(|v| {
            if peak > 0. {
                decibels_or_else(v.norm_sqr() / peak, floor).max(floor)
            } else {
                floor
            }
        })
    }

    /// `(azimuth index, range index, magnitude)` of the strongest cell.
    pub fn peak(&self) -> Option<(usize, usize, f64)> {
        let cols = self.data.ncols();
        argmax(self.data.iter().map(|v| v.norm())).map(|(i, v)| (i / cols, i % cols, v))
    }

    /// Focus point of the strongest cell.
    pub fn peak_point(&self) -> Option<PolarPoint> {
        self.peak().map(|(a, r, _)| self.grid.point(a, r))
    }
}

#[derive(Default)]
struct RowStats {
    zero_filled: usize,
    clamped: usize,
}

pub struct Beamformer<'a> {
    config: &'a SonarConfig,
    axes: &'a AxisSet,
    grid: PolarGrid,
}

impl<'a> Beamformer<'a> {
    pub fn new(config: &'a SonarConfig, axes: &'a AxisSet) -> Self {
        Beamformer {
            config,
            axes,
            grid: PolarGrid::from_config(config),
        }
    }

    pub fn with_grid(mut self, grid: PolarGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn grid(&self) -> &PolarGrid {
        &self.grid
    }

    // Transmitter -> focus -> receiver. Both legs are already in the path.
    pub fn focus_delay(&self, focus: &PolarPoint, receiver: &PolarPoint) -> f64 {
        two_way_delay(
            &PolarPoint::ORIGIN,
            focus,
            receiver,
            self.config.speed_of_sound,
        )
    }

    fn phase_correction(&self, delay: f64, reference_delay: f64) -> Complex64 {
        let tau = match self.config.phase_reference {
            PhaseReference::Absolute => delay,
            PhaseReference::Boresight => delay - reference_delay,
        };
        Complex64::from_polar(1., 2. * PI * self.config.center_freq * tau)
    }

    fn check_profiles(&self, profiles: &[RangeProfile]) -> SonarResult<()> {
        let expected = self.config.receivers.len();
        if profiles.len() != expected {
            return Err(SonarError::ChannelCount {
                expected,
                actual: profiles.len(),
            });
        }
        for (position, p) in profiles.iter().enumerate() {
            if p.receiver != position {
                return Err(SonarError::ChannelOrder {
                    position,
                    receiver: p.receiver,
                });
            }
            if p.len() != self.axes.num_samples() {
                return Err(SonarError::BufferLength {
                    receiver: p.receiver,
                    expected: self.axes.num_samples(),
                    actual: p.len(),
                });
            }
        }
        Ok(())
    }

    fn sum_row(
        &self,
        az: usize,
        profiles: &[RangeProfile],
    ) -> SonarResult<(Vec<Complex64>, RowStats)> {
        let mut stats = RowStats::default();
        let mut row = Vec::with_capacity(self.grid.radial.len());
        for r in 0..self.grid.radial.len() {
            let focus = self.grid.point(az, r);
            let reference_delay = self.focus_delay(&focus, &PolarPoint::ORIGIN);
            let mut acc = Complex64::new(0., 0.);

            for (profile, receiver) in profiles.iter().zip(self.config.receivers.iter()) {
                let delay = self.focus_delay(&focus, receiver);
                let index = self.axes.delay_to_index(delay);
                let len = profile.len();
                let sample = match profile.sample(index) {
                    Some(sample) => sample,
                    None => match self.config.out_of_range {
                        OutOfRangePolicy::ZeroFill => {
                            stats.zero_filled += 1;
                            continue;
                        }
                        OutOfRangePolicy::Clamp => {
                            stats.clamped += 1;
                            profile.signal.time()[len - 1]
                        }
                        OutOfRangePolicy::Reject => {
                            return Err(SonarError::IndexOutOfRange {
                                receiver: profile.receiver,
                                delay,
                                index,
                                len,
                            })
                        }
                    },
                };
                acc += sample * self.phase_correction(delay, reference_delay);
            }

            row.push(match self.config.normalization {
                Normalization::None => acc,
                Normalization::SquareRoot => acc.sqrt(),
            });
        }
        Ok((row, stats))
    }

    /**
    Coherently sums every receiver's range profile into the image.

    For each focus point the profile of receiver `n` is read at `round(τn/dt)`, `τn` being
    the transmitter to focus to receiver travel time, and rotated by `exp(j2π fc τn)`
    (relative to the travel time to the focus and back to the origin under
    [PhaseReference::Boresight]). The profiles have to be in receiver order, one per
    configured receiver, all on the run's time axis.
    */
    pub fn coherent_sum(&self, profiles: &[RangeProfile]) -> SonarResult<PolarImage> {
        self.check_profiles(profiles)?;
        let (n_az, n_r) = self.grid.dim();
        debug!(azimuths = n_az, ranges = n_r, receivers = profiles.len(), "beamforming");

        let rows = (0..n_az)
            .into_par_iter()
            .map(|az| self.sum_row(az, profiles))
            .collect::<SonarResult<Vec<_>>>()?;

        let (zero_filled, clamped) = rows.iter().fold((0, 0), |(z, c), (_, s)| {
            (z + s.zero_filled, c + s.clamped)
        });
        if zero_filled > 0 {
            warn!(
                samples = zero_filled,
                "focus delays past the end of the record were zero-filled"
            );
        }
        if clamped > 0 {
            warn!(samples = clamped, "focus delays past the end of the record were clamped");
        }

        let data = Array2::from_shape_fn((n_az, n_r), |(a, r)| rows[a].0[r]);
        Ok(PolarImage {
            data,
            grid: self.grid.clone(),
        })
    }
}

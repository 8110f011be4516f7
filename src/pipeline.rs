//! Runs: everything from configuration to range profile or image.
//!
//! A run works on one [RunContext], the validated configuration together with the axes and
//! FFT plans derived from it. Contexts are never modified. When the hardware reports a
//! different sample rate a new context is built and the old one stays usable, so any number
//! of runs can share contexts across threads.

use std::sync::Arc;

use ndarray::Array1;
use rand::{rngs::StdRng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    acquisition::{Acquisition, AcquisitionMode, DataSource},
    axis::AxisSet,
    beamform::{Beamformer, PolarImage},
    config::SonarConfig,
    diagnostics::{Diagnostics, NoDiagnostics},
    error::SonarResult,
    processor::{PulseProcessor, RangeProfile},
    receive::{ReceiveModel, WaveformStore},
    signal::{fft::FftPlan, ComplexSignal},
    waveform::WaveformSynthesizer,
};

#[derive(Clone, Debug)]
pub struct RunContext {
    config: SonarConfig,
    axes: AxisSet,
    fft: FftPlan,
}

impl RunContext {
    // Record length from the configured maximum range.
    pub fn new(config: SonarConfig) -> SonarResult<RunContext> {
        let len = config.default_num_samples();
        Self::with_len(config, len)
    }

    pub fn with_len(config: SonarConfig, num_samples: usize) -> SonarResult<RunContext> {
        config.validate()?;
        let axes = AxisSet::new(config.sample_rate, num_samples, config.speed_of_sound)?;
        let fft = FftPlan::new(num_samples);
        Ok(RunContext { config, axes, fft })
    }

    /// Context for a capture taken at `sample_rate` with `num_samples` per channel.
    pub fn with_acquired_rate(
        &self,
        sample_rate: f64,
        num_samples: usize,
    ) -> SonarResult<RunContext> {
        if sample_rate != self.config.sample_rate {
            warn!(
                configured = self.config.sample_rate,
                acquired = sample_rate,
                "hardware sample rate overrides configuration"
            );
        }
        let config = self.config.with_sample_rate(sample_rate)?;
        Self::with_len(config, num_samples)
    }

    pub fn config(&self) -> &SonarConfig {
        &self.config
    }

    pub fn axes(&self) -> &AxisSet {
        &self.axes
    }

    pub fn fft(&self) -> &FftPlan {
        &self.fft
    }

    pub fn synthesizer(&self) -> WaveformSynthesizer<'_> {
        WaveformSynthesizer::new(&self.config, &self.axes, &self.fft)
    }

    pub fn receive_model(&self) -> ReceiveModel<'_> {
        ReceiveModel::new(&self.config, &self.axes, &self.fft)
    }

    pub fn beamformer(&self) -> Beamformer<'_> {
        Beamformer::new(&self.config, &self.axes)
    }
}

/// One receiver's profile with the one-way range of every sample.
#[derive(Clone, Debug)]
pub struct RangeRun {
    pub profile: RangeProfile,
    pub distance: Array1<f64>,
}

impl RangeRun {
    // Range of the strongest return, m.
    pub fn peak_distance(&self) -> Option<f64> {
        self.profile
            .peak_index()
            .and_then(|i| self.distance.get(i).copied())
    }
}

pub struct SonarImager {
    diagnostics: Arc<dyn Diagnostics>,
    reference: Option<Vec<f64>>,
    capture_store: Option<Arc<dyn WaveformStore>>,
}

impl Default for SonarImager {
    fn default() -> Self {
        SonarImager {
            diagnostics: Arc::new(NoDiagnostics),
            reference: None,
            capture_store: None,
        }
    }
}

impl SonarImager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Replaces the synthesised chirp with the stored reference recording.
    pub fn with_reference_from(mut self, store: &dyn WaveformStore) -> SonarResult<Self> {
        self.reference = Some(store.load_reference()?);
        Ok(self)
    }

    /// Keeps a copy of every captured channel in `store`.
    pub fn with_capture_store(mut self, store: Arc<dyn WaveformStore>) -> Self {
        self.capture_store = Some(store);
        self
    }

    fn reference(&self, ctx: &RunContext) -> ComplexSignal {
        let synth = ctx.synthesizer();
        match &self.reference {
            Some(samples) => synth.from_samples(samples),
            None => synth.make_chirp(),
        }
    }

    fn processor<'a>(&'a self, ctx: &'a RunContext) -> PulseProcessor<'a> {
        PulseProcessor::new(&ctx.config, &ctx.axes, &ctx.fft)
            .with_diagnostics(self.diagnostics.as_ref())
    }

    fn noise_rng(config: &SonarConfig, receiver: usize) -> StdRng {
        match config.noise.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(receiver as u64)),
            None => StdRng::from_entropy(),
        }
    }

    fn simulate_receiver(
        &self,
        ctx: &RunContext,
        reference: &ComplexSignal,
        receiver: usize,
    ) -> SonarResult<RangeProfile> {
        let model = ctx.receive_model();
        let position = &ctx.config.receivers[receiver];
        let delays = model.target_delays(position);
        let chirp = ctx.synthesizer().chirp();
        let received = model.simulate(&chirp, &delays, Self::noise_rng(&ctx.config, receiver))?;
        self.processor(ctx).process(receiver, reference, &received, None)
    }

    fn process_captured(
        &self,
        ctx: &RunContext,
        acquisition: &Acquisition,
    ) -> SonarResult<Vec<RangeProfile>> {
        let reference = self.reference(ctx);
        let mut model = ctx.receive_model();
        if let Some(store) = &self.capture_store {
            model = model.with_store(store.as_ref());
        }
        let processor = self.processor(ctx);
        acquisition
            .channels
            .par_iter()
            .map(|channel| {
                let received = model.prepare(channel.receiver, &channel.samples)?;
                let calibration = ctx.config.calibration.get(channel.receiver);
                processor.process(channel.receiver, &reference, &received, Some(&calibration))
            })
            .collect()
    }

    // Acquires, checks the channel set and rebuilds the context for the reported rate.
    fn acquire(
        &self,
        ctx: &RunContext,
        source: &mut dyn DataSource,
        mode: AcquisitionMode,
    ) -> SonarResult<(RunContext, Acquisition)> {
        let acquisition = source.acquire(mode)?;
        acquisition.validate(mode.channel_count(ctx.config.receivers.len()))?;
        debug!(
            channels = acquisition.channels.len(),
            samples = acquisition.num_samples(),
            sample_rate = acquisition.sample_rate,
            "acquired"
        );
        let ctx = ctx.with_acquired_rate(acquisition.sample_rate, acquisition.num_samples())?;
        Ok((ctx, acquisition))
    }

    /// Range profile of receiver 0 seeing every configured target.
    pub fn range_profile_sim(&self, ctx: &RunContext) -> SonarResult<RangeRun> {
        info!(
            sample_rate = ctx.axes.sample_rate(),
            samples = ctx.axes.num_samples(),
            targets = ctx.config.targets.len(),
            "simulated range profile"
        );
        let reference = self.reference(ctx);
        let profile = self.simulate_receiver(ctx, &reference, 0)?;
        Ok(RangeRun {
            profile,
            distance: ctx.axes.distance().clone(),
        })
    }

    /// Range profile of a single captured channel.
    pub fn range_profile_from_source(
        &self,
        ctx: &RunContext,
        source: &mut dyn DataSource,
    ) -> SonarResult<RangeRun> {
        let (ctx, acquisition) = self.acquire(ctx, source, AcquisitionMode::SingleChannel)?;
        info!(
            sample_rate = ctx.axes.sample_rate(),
            samples = ctx.axes.num_samples(),
            "captured range profile"
        );
        let mut profiles = self.process_captured(&ctx, &acquisition)?;
        let profile = profiles.remove(0);
        Ok(RangeRun {
            profile,
            distance: ctx.axes.distance().clone(),
        })
    }

    /// Image from every receiver seeing every configured target through the geometry.
    pub fn image_sim(&self, ctx: &RunContext) -> SonarResult<PolarImage> {
        info!(
            sample_rate = ctx.axes.sample_rate(),
            samples = ctx.axes.num_samples(),
            receivers = ctx.config.receivers.len(),
            targets = ctx.config.targets.len(),
            "simulated image"
        );
        let reference = self.reference(ctx);
        let profiles = (0..ctx.config.receivers.len())
            .into_par_iter()
            .map(|n| self.simulate_receiver(ctx, &reference, n))
            .collect::<SonarResult<Vec<_>>>()?;
        let image = ctx.beamformer().coherent_sum(&profiles)?;
        log_image(&image);
        Ok(image)
    }

    /// Image from one all-channel capture.
    pub fn image_from_source(
        &self,
        ctx: &RunContext,
        source: &mut dyn DataSource,
    ) -> SonarResult<PolarImage> {
        let (ctx, acquisition) = self.acquire(ctx, source, AcquisitionMode::AllChannels)?;
        info!(
            sample_rate = ctx.axes.sample_rate(),
            samples = ctx.axes.num_samples(),
            receivers = acquisition.channels.len(),
            "captured image"
        );
        let profiles = self.process_captured(&ctx, &acquisition)?;
        let image = ctx.beamformer().coherent_sum(&profiles)?;
        log_image(&image);
        Ok(image)
    }
}

fn log_image(image: &PolarImage) {
    let (azimuths, ranges) = image.data().dim();
    match image.peak_point() {
        Some(p) => info!(
            azimuths,
            ranges,
            peak_radius = p.radius,
            peak_azimuth = p.azimuth,
            "image formed"
        ),
        None => info!(azimuths, ranges, "image formed"),
    }
}

#[cfg(test)]
mod test {
    use std::f64::consts::FRAC_PI_4;

    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        acquisition::ReplaySource,
        config::{GridSpec, NoiseConfig},
        diagnostics::{RecordingDiagnostics, Stage},
        error::{AcquisitionError, SonarError},
        geometry::{uniform_linear_array, PolarPoint},
        receive::MemoryWaveformStore,
    };

    fn base_config() -> SonarConfig {
        SonarConfig {
            sample_rate: 100_000.,
            noise: NoiseConfig {
                std_dev: 0.001,
                seed: Some(42),
            },
            ..SonarConfig::default()
        }
    }

    fn imaging_config() -> SonarConfig {
        let radial_grid = GridSpec::new(1., 9., 81);
        let azimuth_grid = GridSpec::new(-FRAC_PI_4, FRAC_PI_4, 91);
        let target = PolarPoint::new(radial_grid.points()[40], azimuth_grid.points()[55]);
        SonarConfig {
            receivers: uniform_linear_array(8, 0.004),
            targets: vec![target],
            radial_grid,
            azimuth_grid,
            ..base_config()
        }
    }

    // Raw receiver samples as the capture hardware would deliver them.
    fn captured(ctx: &RunContext, receivers: usize) -> Acquisition {
        let model = ctx.receive_model();
        let chirp = ctx.synthesizer().chirp();
        let buffers = (0..receivers).map(|n| {
            let delays = model.target_delays(&ctx.config().receivers[n]);
            let x = model
                .simulate(&chirp, &delays, StdRng::seed_from_u64(100 + n as u64))
                .unwrap();
            (format!("buffer{}", n), x.time().iter().map(|v| v.re).collect())
        });
        Acquisition::from_named_buffers(ctx.axes().sample_rate(), buffers).unwrap()
    }

    #[test]
    fn context_length_and_override() {
        let ctx = RunContext::new(base_config()).unwrap();
        assert_eq!(ctx.axes().num_samples(), 6331);
        assert_eq!(ctx.fft().len(), 6331);

        let fast = ctx.with_acquired_rate(105_000., 6000).unwrap();
        assert_eq!(fast.axes().num_samples(), 6000);
        assert_relative_eq!(fast.axes().sample_spacing(), 1. / 105_000.);
        assert_eq!(fast.config().sample_rate, 105_000.);
        // the original context is untouched
        assert_eq!(ctx.axes().sample_rate(), 100_000.);
        assert_eq!(ctx.axes().num_samples(), 6331);

        assert!(matches!(
            ctx.with_acquired_rate(3000., 100),
            Err(SonarError::Configuration(_))
        ));
        assert!(RunContext::new(SonarConfig {
            bandwidth: -1.,
            ..base_config()
        })
        .is_err());
    }

    #[test]
    fn simulated_range_profile_finds_target() {
        let config = SonarConfig {
            targets: vec![PolarPoint::new(8., 0.)],
            noise: NoiseConfig {
                std_dev: 1e-4,
                seed: Some(1),
            },
            ..base_config()
        };
        let ctx = RunContext::new(config).unwrap();
        let run = SonarImager::new().range_profile_sim(&ctx).unwrap();

        let rx = ctx.config().receivers[0];
        let target = PolarPoint::new(8., 0.);
        let delay = crate::geometry::two_way_delay(&PolarPoint::ORIGIN, &target, &rx, 343.);
        let expected = ctx.axes().delay_to_index(delay) as i64;
        let peak = run.profile.peak_index().unwrap() as i64;
        assert!((peak - expected).abs() <= 2, "peak {} expected {}", peak, expected);
        assert_relative_eq!(run.peak_distance().unwrap(), 8., epsilon = 0.02);
        assert_eq!(run.distance.len(), ctx.axes().num_samples());
    }

    #[test]
    fn simulated_image_peaks_at_target_cell() {
        let ctx = RunContext::new(imaging_config()).unwrap();
        let image = SonarImager::new().image_sim(&ctx).unwrap();
        assert_eq!(image.data().dim(), (91, 81));

        let (az, r, _) = image.peak().unwrap();
        assert!((az as i64 - 55).abs() <= 1, "azimuth index {}", az);
        assert!((r as i64 - 40).abs() <= 1, "range index {}", r);
    }

    #[test]
    fn seeded_simulation_is_reproducible() {
        let config = SonarConfig {
            radial_grid: GridSpec::new(1., 9., 9),
            azimuth_grid: GridSpec::new(-0.5, 0.5, 5),
            ..imaging_config()
        };
        let ctx = RunContext::new(config).unwrap();
        let a = SonarImager::new().image_sim(&ctx).unwrap();
        let b = SonarImager::new().image_sim(&ctx).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn captured_image_uses_reported_rate() {
        // hardware runs at 100 kHz while the configuration still says 105 kHz
        let capture_ctx = RunContext::new(imaging_config()).unwrap();
        let acquisition = captured(&capture_ctx, 8);

        let ctx = RunContext::new(SonarConfig {
            sample_rate: 105_000.,
            ..imaging_config()
        })
        .unwrap();
        let store = Arc::new(MemoryWaveformStore::new());
        let imager = SonarImager::new().with_capture_store(store.clone());
        let mut source = ReplaySource::new().push(acquisition);
        let image = imager.image_from_source(&ctx, &mut source).unwrap();

        let (az, r, _) = image.peak().unwrap();
        assert!((az as i64 - 55).abs() <= 1, "azimuth index {}", az);
        assert!((r as i64 - 40).abs() <= 1, "range index {}", r);
        assert_eq!(store.captured().unwrap().len(), 8);
    }

    #[test]
    fn captured_range_profile_is_single_channel() {
        let config = SonarConfig {
            targets: vec![PolarPoint::new(6., 0.)],
            ..base_config()
        };
        let ctx = RunContext::new(config).unwrap();
        let mut source = ReplaySource::new().push(captured(&ctx, 8));
        let diagnostics = Arc::new(RecordingDiagnostics::only(&[Stage::HardwareCompensated]));
        let run = SonarImager::new()
            .with_diagnostics(diagnostics.clone())
            .range_profile_from_source(&ctx, &mut source)
            .unwrap();

        assert_eq!(run.profile.receiver, 0);
        assert_relative_eq!(run.peak_distance().unwrap(), 6., epsilon = 0.03);
        // captured data goes through hardware compensation, for receiver 0 only
        let snaps = diagnostics.snapshots();
        assert_eq!(snaps.len(), 1);
        assert_eq!(snaps[0].receiver, 0);
    }

    #[test]
    fn acquisition_failures_abort_the_run() {
        let ctx = RunContext::new(imaging_config()).unwrap();
        let imager = SonarImager::new();

        let mut source =
            ReplaySource::new().push_err(AcquisitionError::Unavailable("no device".into()));
        assert!(matches!(
            imager.image_from_source(&ctx, &mut source),
            Err(SonarError::Acquisition(AcquisitionError::Unavailable(_)))
        ));

        let mut source = ReplaySource::new().push(captured(&ctx, 3));
        assert!(matches!(
            imager.image_from_source(&ctx, &mut source),
            Err(SonarError::ChannelCount { expected: 8, actual: 3 })
        ));
    }

    #[test]
    fn stored_reference_replaces_chirp() {
        let ctx = RunContext::new(base_config()).unwrap();
        let chirp: Vec<f64> = ctx.synthesizer().make_chirp().time().iter().map(|v| v.re).collect();
        let store = MemoryWaveformStore::with_reference(chirp);

        let stored = SonarImager::new().with_reference_from(&store).unwrap();
        let a = stored.range_profile_sim(&ctx).unwrap();
        let b = SonarImager::new().range_profile_sim(&ctx).unwrap();
        assert_eq!(a.profile.peak_index(), b.profile.peak_index());

        assert!(SonarImager::new()
            .with_reference_from(&MemoryWaveformStore::new())
            .is_err());
    }
}

//! Hooks for looking at intermediate signals.
//!
//! Processing never branches on a diagnostics sink; every stage hands its output to the sink
//! and carries on. The default sink drops everything.

use std::fmt;
use std::sync::Mutex;

use num::complex::Complex64;
use tracing::debug;

use crate::signal::ComplexSignal;

/// Points in the per-receiver chain where a signal is exposed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Reference,
    Received,
    PulseCompressed,
    Analytic,
    Windowed,
    Baseband,
    HardwareCompensated,
    RangeProfile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Reference => "reference",
            Stage::Received => "received",
            Stage::PulseCompressed => "pulse_compressed",
            Stage::Analytic => "analytic",
            Stage::Windowed => "windowed",
            Stage::Baseband => "baseband",
            Stage::HardwareCompensated => "hardware_compensated",
            Stage::RangeProfile => "range_profile",
        };
        write!(f, "{}", name)
    }
}

/// Receiver of intermediate signals. Receivers are processed in parallel, so sinks have to
/// be shareable between threads.
///
/// Every stage has its own hook; all of them forward to [Diagnostics::observe] unless
/// overridden, so most sinks only implement that one.
pub trait Diagnostics: Send + Sync {
    fn observe(&self, _receiver: usize, _stage: Stage, _signal: &ComplexSignal) {}

    fn on_reference(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::Reference, signal)
    }

    fn on_received(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::Received, signal)
    }

    fn on_pulse_compressed(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::PulseCompressed, signal)
    }

    fn on_analytic(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::Analytic, signal)
    }

    fn on_windowed(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::Windowed, signal)
    }

    fn on_baseband(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::Baseband, signal)
    }

    fn on_hardware_compensated(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::HardwareCompensated, signal)
    }

    fn on_range_profile(&self, receiver: usize, signal: &ComplexSignal) {
        self.observe(receiver, Stage::RangeProfile, signal)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoDiagnostics;

impl Diagnostics for NoDiagnostics {}

/// Logs energy and time-domain peak of every stage at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn observe(&self, receiver: usize, stage: Stage, signal: &ComplexSignal) {
        let (peak_index, peak) = signal.peak().unwrap_or((0, 0.));
        debug!(
            receiver,
            %stage,
            energy = signal.signal_energy(),
            peak_index,
            peak,
            "stage output"
        );
    }
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub receiver: usize,
    pub stage: Stage,
    pub time: Vec<Complex64>,
    pub spectrum: Vec<Complex64>,
}

/// Keeps a copy of every observed signal, optionally only for some stages.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    stages: Option<Vec<Stage>>,
    snapshots: Mutex<Vec<Snapshot>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn only(stages: &[Stage]) -> Self {
        RecordingDiagnostics {
            stages: Some(stages.to_vec()),
            snapshots: Mutex::new(Vec::new()),
        }
    }

    /// Everything recorded so far, ordered by receiver then stage.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        let mut out = match self.snapshots.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        out.sort_by_key(|s| (s.receiver, s.stage));
        out
    }

    pub fn find(&self, receiver: usize, stage: Stage) -> Option<Snapshot> {
        self.snapshots()
            .into_iter()
            .find(|s| s.receiver == receiver && s.stage == stage)
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn observe(&self, receiver: usize, stage: Stage, signal: &ComplexSignal) {
        if let Some(stages) = &self.stages {
            if !stages.contains(&stage) {
                return;
            }
        }
        let snapshot = Snapshot {
            receiver,
            stage,
            time: signal.time().to_vec(),
            spectrum: signal.spectrum().to_vec(),
        };
        match self.snapshots.lock() {
            Ok(mut guard) => guard.push(snapshot),
            Err(poisoned) => poisoned.into_inner().push(snapshot),
        }
    }
}

#[cfg(test)]
mod test {
    use ndarray::Array1;

    use super::*;
    use crate::signal::fft::FftPlan;

    #[test]
    fn recorder_filters_and_orders() {
        let plan = FftPlan::new(8);
        let x = ComplexSignal::from_real(&Array1::from_elem(8, 1.), &plan);
        let rec = RecordingDiagnostics::only(&[Stage::Baseband, Stage::Received]);
        rec.observe(1, Stage::Baseband, &x);
        rec.observe(0, Stage::Windowed, &x);
        rec.observe(0, Stage::Baseband, &x);
        rec.observe(0, Stage::Received, &x);

        let snaps = rec.snapshots();
        let keys: Vec<_> = snaps.iter().map(|s| (s.receiver, s.stage)).collect();
        assert_eq!(
            keys,
            vec![
                (0, Stage::Received),
                (0, Stage::Baseband),
                (1, Stage::Baseband)
            ]
        );
        let s = rec.find(0, Stage::Received).unwrap();
        assert_eq!(s.spectrum[0].re, 8.);
        assert!(rec.find(0, Stage::Windowed).is_none());
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::HardwareCompensated.to_string(), "hardware_compensated");
    }
}

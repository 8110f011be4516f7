//! The boundary to the capture hardware.
//!
//! The transport itself lives outside this crate. A [DataSource] answers one blocking
//! request with every channel plus the sample rate the hardware actually achieved, or fails
//! as a whole.

use std::collections::BTreeMap;

use crate::error::{AcquisitionError, SonarError, SonarResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Only receiver 0, used for 1-D range profiles
    SingleChannel,
    AllChannels,
}

impl AcquisitionMode {
    pub fn channel_count(&self, receivers: usize) -> usize {
        match self {
            AcquisitionMode::SingleChannel => 1,
            AcquisitionMode::AllChannels => receivers,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Channel {
    pub receiver: usize,
    pub samples: Vec<f64>,
}

/// One complete capture.
#[derive(Clone, Debug, PartialEq)]
pub struct Acquisition {
    pub sample_rate: f64,
    pub channels: Vec<Channel>,
}

const BUFFER_PREFIX: &str = "buffer";

impl Acquisition {
    /**
    Builds an acquisition from buffers named `buffer0`, `buffer1`, ... as sent by the
    capture firmware.

    The names must form the contiguous sequence starting at zero, and every buffer has to
    hold the same number of samples. Anything else is reported as malformed.
    */
    pub fn from_named_buffers(
        sample_rate: f64,
        buffers: impl IntoIterator<Item = (String, Vec<f64>)>,
    ) -> Result<Acquisition, AcquisitionError> {
        let mut indexed = BTreeMap::new();
        for (name, samples) in buffers {
            let index = name
                .strip_prefix(BUFFER_PREFIX)
                .and_then(|i| i.parse::<usize>().ok())
                .ok_or_else(|| {
                    AcquisitionError::Malformed(format!("unexpected buffer name {:?}", name))
                })?;
            if indexed.insert(index, samples).is_some() {
                return Err(AcquisitionError::Malformed(format!("buffer {} sent twice", index)));
            }
        }

        let mut channels = Vec::with_capacity(indexed.len());
        for (position, (receiver, samples)) in indexed.into_iter().enumerate() {
            if receiver != position {
                return Err(AcquisitionError::Malformed(format!(
                    "buffer{} is missing",
                    position
                )));
            }
            channels.push(Channel { receiver, samples });
        }

        if let Some(first) = channels.first() {
            let len = first.samples.len();
            if let Some(bad) = channels.iter().find(|c| c.samples.len() != len) {
                return Err(AcquisitionError::Malformed(format!(
                    "buffer{} holds {} samples, buffer0 holds {}",
                    bad.receiver,
                    bad.samples.len(),
                    len
                )));
            }
        }

        Ok(Acquisition {
            sample_rate,
            channels,
        })
    }

    /// Checks the capture against the receiver layout: exactly `expected` channels in
    /// receiver order, all of equal length, and a usable sample rate.
    pub fn validate(&self, expected: usize) -> SonarResult<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.) {
            return Err(AcquisitionError::Malformed(format!(
                "reported sample rate {} is not positive",
                self.sample_rate
            ))
            .into());
        }
        if self.channels.len() != expected {
            return Err(SonarError::ChannelCount {
                expected,
                actual: self.channels.len(),
            });
        }
        for (position, channel) in self.channels.iter().enumerate() {
            if channel.receiver != position {
                return Err(SonarError::ChannelOrder {
                    position,
                    receiver: channel.receiver,
                });
            }
        }
        let len = self.num_samples();
        if let Some(bad) = self.channels.iter().find(|c| c.samples.len() != len) {
            return Err(SonarError::BufferLength {
                receiver: bad.receiver,
                expected: len,
                actual: bad.samples.len(),
            });
        }
        Ok(())
    }

    // Length of the first channel; validation makes it the length of all of them.
    pub fn num_samples(&self) -> usize {
        self.channels.first().map(|c| c.samples.len()).unwrap_or(0)
    }
}

pub trait DataSource {
    fn acquire(&mut self, mode: AcquisitionMode) -> Result<Acquisition, AcquisitionError>;
}

/// Serves prerecorded acquisitions in order, then reports itself unavailable.
#[derive(Clone, Debug, Default)]
pub struct ReplaySource {
    queue: Vec<Result<Acquisition, AcquisitionError>>,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, acquisition: Acquisition) -> Self {
        self.queue.push(Ok(acquisition));
        self
    }

    pub fn push_err(mut self, err: AcquisitionError) -> Self {
        self.queue.push(Err(err));
        self
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl DataSource for ReplaySource {
    fn acquire(&mut self, mode: AcquisitionMode) -> Result<Acquisition, AcquisitionError> {
        if self.queue.is_empty() {
            return Err(AcquisitionError::Unavailable("replay exhausted".into()));
        }
        let mut acquisition = self.queue.remove(0)?;
        if mode == AcquisitionMode::SingleChannel {
            acquisition.channels.truncate(1);
        }
        Ok(acquisition)
    }
}

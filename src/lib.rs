// Do this because numerics calls for a lot of non-standard names
#![allow(non_snake_case)]
#![allow(non_upper_case_globals)]
pub mod acquisition;
pub mod axis;
pub mod beamform;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod helper;
pub mod pipeline;
pub mod processor;
pub mod receive;
pub mod signal;
pub mod waveform;

// Copyright 2025-2026 CEMAXECUTER LLC

//! Streaming source and sink blocks for Signal Hound hardware.
//!
//! Each hardware family (BB60, SP145, SM200/SM435, VSG60) implements the
//! small [`Device`] capability interface over its vendor C API. The generic
//! [`SourceAdapter`] and [`SinkAdapter`] turn a device into a block the host
//! scheduler can drive with `work` calls, applying parameter changes lazily
//! at the start of the next call.

pub mod adapter;
pub mod buffer;
pub mod error;
pub mod fake;
pub mod file;
pub mod param;
pub mod settings;
pub mod status;

pub mod bb;
pub mod sm;
pub mod sp;
pub mod vsg;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub use adapter::{FatalPolicy, SinkAdapter, SourceAdapter};
pub use error::{Error, Result};
pub use num_complex::Complex32;
pub use param::Param;
pub use settings::{Control, Controls};

/// Signal Hound hardware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Family {
    #[serde(rename = "bb", alias = "bb60")]
    Bb60,
    #[serde(rename = "sp", alias = "sp145")]
    Sp145,
    #[serde(rename = "sm", alias = "sm200", alias = "sm435")]
    Sm200,
    #[serde(rename = "vsg", alias = "vsg60")]
    Vsg60,
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Family::Bb60 => "BB60",
            Family::Sp145 => "SP145",
            Family::Sm200 => "SM200",
            Family::Vsg60 => "VSG60",
        }
    }

    /// True for the signal generator; everything else is a receiver.
    pub fn is_sink(self) -> bool {
        matches!(self, Family::Vsg60)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "bb" | "bb60" => Ok(Family::Bb60),
            "sp" | "sp145" => Ok(Family::Sp145),
            "sm" | "sm200" | "sm435" => Ok(Family::Sm200),
            "vsg" | "vsg60" => Ok(Family::Vsg60),
            other => Err(Error::InvalidParam(format!(
                "unknown device family '{}' (use bb, sp, sm or vsg)",
                other
            ))),
        }
    }
}

/// Identification fetched right after a device is opened.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub family: Family,
    pub serial: u32,
    pub api_version: String,
    /// Model name when the API reports one (SM200 vs SM435).
    pub model: Option<String>,
}

/// Configuration set of one hardware family.
pub trait DeviceConfig: Clone + fmt::Debug + Send + 'static {
    const FAMILY: Family;

    /// Write one parameter into the set.
    ///
    /// `Param::Purge` is not part of any configuration set and is rejected
    /// here; [`Controls`] handles it separately.
    fn apply(&mut self, param: Param) -> Result<()>;
}

/// Capability interface every hardware family implements.
pub trait Device: Send {
    type Config: DeviceConfig;

    fn info(&self) -> &DeviceInfo;

    /// Push the whole configuration set to the hardware and (re)initiate
    /// streaming. Stops at the first vendor error.
    fn configure(&mut self, config: &Self::Config) -> Result<()>;

    /// Stop any active measurement. Status is logged, never fatal.
    fn abort(&mut self);

    /// Release the vendor handle. Calls after the first are no-ops.
    fn close(&mut self);
}

/// Receiving device: blocking I/Q reads.
pub trait RxDevice: Device {
    /// Fill `buf` with exactly `buf.len()` samples. With `purge` set the
    /// device discards anything it buffered before this read.
    fn read_iq(&mut self, buf: &mut [Complex32], purge: bool) -> Result<()>;
}

/// Transmitting device: blocking I/Q writes.
pub trait TxDevice: Device {
    /// Queue every sample in `iq` for output and flush.
    fn submit_iq(&mut self, iq: &[Complex32]) -> Result<()>;
}

/// Host-side contract for a block that produces samples.
pub trait Source: Send {
    /// Fill `output` completely and return the number of items produced.
    fn work(&mut self, output: &mut [Complex32]) -> Result<usize>;
}

/// Host-side contract for a block that consumes samples.
pub trait Sink: Send {
    /// Consume all of `input` and return the number of items consumed.
    fn work(&mut self, input: &[Complex32]) -> Result<usize>;
}

// Copyright 2025-2026 CEMAXECUTER LLC

use thiserror::Error;

use crate::Family;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to the host by a Signal Hound block.
#[derive(Debug, Error)]
pub enum Error {
    /// Vendor call returned a negative status.
    #[error("{family} {call} failed ({code}): {message}")]
    Fatal {
        family: Family,
        call: &'static str,
        code: i32,
        message: String,
    },

    /// The block already hit a fatal error and no longer talks to the device.
    #[error("{0} block halted after a fatal device error")]
    Halted(Family),

    #[error("no {0} device found")]
    DeviceNotFound(Family),

    /// Parameter exists but the family has no such setting.
    #[error("{family} has no '{param}' parameter")]
    UnsupportedParam { family: Family, param: &'static str },

    /// Parameter name or value could not be parsed.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Fatal { .. })
    }
}

// Copyright 2025-2026 CEMAXECUTER LLC

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::Family;

/// A single runtime-tunable block parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    /// Center frequency in Hz.
    Center(f64),
    /// Reference level in dBm.
    RefLevel(f64),
    /// Attenuator index, -1 for automatic.
    Atten(i32),
    /// I/Q decimation factor (sample rate selector).
    Decimation(i32),
    /// I/Q bandwidth in Hz.
    Bandwidth(f64),
    /// Software I/Q filter enable.
    SwFilter(bool),
    /// Discard device-buffered samples before each read.
    Purge(bool),
    /// Generator sample rate in Hz.
    SampleRate(f64),
    /// Generator output level in dBm.
    Level(f64),
    IOffset(i32),
    QOffset(i32),
}

impl Param {
    pub fn name(&self) -> &'static str {
        match self {
            Param::Center(_) => "center",
            Param::RefLevel(_) => "reflevel",
            Param::Atten(_) => "atten",
            Param::Decimation(_) => "decimation",
            Param::Bandwidth(_) => "bandwidth",
            Param::SwFilter(_) => "swfilter",
            Param::Purge(_) => "purge",
            Param::SampleRate(_) => "samplerate",
            Param::Level(_) => "level",
            Param::IOffset(_) => "ioffset",
            Param::QOffset(_) => "qoffset",
        }
    }

    /// Build a parameter from its name and textual value.
    pub fn parse(name: &str, value: &str) -> Result<Self> {
        let value = value.trim();
        let param = match name.trim().to_ascii_lowercase().as_str() {
            "center" | "freq" | "frequency" => Param::Center(parse_f64(name, value)?),
            "reflevel" | "ref" => Param::RefLevel(parse_f64(name, value)?),
            "atten" | "attenuation" => Param::Atten(parse_i32(name, value)?),
            "decimation" | "decim" => Param::Decimation(parse_i32(name, value)?),
            "bandwidth" | "bw" => Param::Bandwidth(parse_f64(name, value)?),
            "swfilter" => Param::SwFilter(parse_bool(name, value)?),
            "purge" => Param::Purge(parse_bool(name, value)?),
            "samplerate" | "rate" => Param::SampleRate(parse_f64(name, value)?),
            "level" => Param::Level(parse_f64(name, value)?),
            "ioffset" => Param::IOffset(parse_i32(name, value)?),
            "qoffset" => Param::QOffset(parse_i32(name, value)?),
            other => return Err(Error::InvalidParam(format!("unknown parameter '{}'", other))),
        };
        Ok(param)
    }

    /// Error for a family that has no such setting.
    pub(crate) fn unsupported(&self, family: Family) -> Error {
        Error::UnsupportedParam {
            family,
            param: self.name(),
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Center(v)
            | Param::RefLevel(v)
            | Param::Bandwidth(v)
            | Param::SampleRate(v)
            | Param::Level(v) => write!(f, "{}={}", self.name(), v),
            Param::Atten(v) | Param::Decimation(v) | Param::IOffset(v) | Param::QOffset(v) => {
                write!(f, "{}={}", self.name(), v)
            }
            Param::SwFilter(v) | Param::Purge(v) => write!(f, "{}={}", self.name(), v),
        }
    }
}

/// Accepts `name=value` or `name value`.
impl FromStr for Param {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, value) = s
            .split_once('=')
            .or_else(|| s.split_once(char::is_whitespace))
            .ok_or_else(|| Error::InvalidParam(format!("expected name=value, got '{}'", s)))?;
        Param::parse(name, value)
    }
}

fn parse_f64(name: &str, value: &str) -> Result<f64> {
    let v: f64 = value
        .parse()
        .map_err(|_| Error::InvalidParam(format!("{}: '{}' is not a number", name, value)))?;
    if !v.is_finite() {
        return Err(Error::InvalidParam(format!("{}: '{}' is not finite", name, value)));
    }
    Ok(v)
}

fn parse_i32(name: &str, value: &str) -> Result<i32> {
    value
        .parse()
        .map_err(|_| Error::InvalidParam(format!("{}: '{}' is not an integer", name, value)))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        _ => Err(Error::InvalidParam(format!("{}: '{}' is not a boolean", name, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!("center=2.4e9".parse::<Param>().unwrap(), Param::Center(2.4e9));
        assert_eq!("reflevel -20".parse::<Param>().unwrap(), Param::RefLevel(-20.0));
        assert_eq!("atten=-1".parse::<Param>().unwrap(), Param::Atten(-1));
        assert_eq!("swfilter on".parse::<Param>().unwrap(), Param::SwFilter(true));
        assert_eq!("purge=0".parse::<Param>().unwrap(), Param::Purge(false));
        assert_eq!(Param::parse("BW", " 5e6 ").unwrap(), Param::Bandwidth(5e6));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("center".parse::<Param>().is_err());
        assert!("gain=10".parse::<Param>().is_err());
        assert!("decimation=2.5".parse::<Param>().is_err());
        assert!("center=NaN".parse::<Param>().is_err());
        assert!("swfilter=maybe".parse::<Param>().is_err());
    }

    #[test]
    fn test_display_round_trips_name() {
        let p = Param::Decimation(8);
        assert_eq!(p.to_string(), "decimation=8");
        assert_eq!(p.to_string().parse::<Param>().unwrap(), p);
    }
}

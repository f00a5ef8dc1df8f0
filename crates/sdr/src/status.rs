// Copyright 2025-2026 CEMAXECUTER LLC

//! Vendor status codes.
//!
//! Every Signal Hound API returns a small signed integer: zero is success,
//! positive values are warnings (the call completed, possibly clamped) and
//! negative values are errors. One check routine serves all four families;
//! each family only supplies its name and its error-string lookup.

use crate::error::{Error, Result};
use crate::Family;

/// Classified vendor status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Warning(i32),
    Fatal(i32),
}

impl Status {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Status::Ok,
            c if c > 0 => Status::Warning(c),
            c => Status::Fatal(c),
        }
    }
}

/// Family-specific status code mapping.
pub trait StatusText {
    const FAMILY: Family;

    /// Human-readable text for a status code (`xxGetErrorString`).
    fn describe(code: i32) -> String;
}

/// Check a vendor return code.
///
/// Warnings are logged with the failing call and the classified status is
/// returned so the caller carries on with whatever the SDK produced. Errors
/// are logged and become [`Error::Fatal`].
pub fn check<S: StatusText>(call: &'static str, code: i32) -> Result<Status> {
    match Status::from_code(code) {
        Status::Ok => Ok(Status::Ok),
        Status::Warning(c) => {
            log::warn!("{} warning ({}): {}", S::FAMILY, call, S::describe(c));
            Ok(Status::Warning(c))
        }
        Status::Fatal(c) => {
            let message = S::describe(c);
            log::error!("{} error ({}): {}", S::FAMILY, call, message);
            Err(Error::Fatal {
                family: S::FAMILY,
                call,
                code: c,
                message,
            })
        }
    }
}

/// Read a NUL-terminated string returned by a vendor API.
///
/// # Safety
/// `ptr` must be null or point to a valid NUL-terminated string that stays
/// alive for the duration of the call.
#[cfg(any(feature = "bb", feature = "sp", feature = "sm", feature = "vsg"))]
pub(crate) unsafe fn c_string(ptr: *const std::os::raw::c_char) -> String {
    if ptr.is_null() {
        return String::from("<null>");
    }
    std::ffi::CStr::from_ptr(ptr).to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy;

    impl StatusText for Dummy {
        const FAMILY: Family = Family::Sp145;

        fn describe(code: i32) -> String {
            format!("dummy status {}", code)
        }
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(Status::from_code(0), Status::Ok);
        assert_eq!(Status::from_code(1), Status::Warning(1));
        assert_eq!(Status::from_code(6), Status::Warning(6));
        assert_eq!(Status::from_code(-1), Status::Fatal(-1));
        assert_eq!(Status::from_code(-101), Status::Fatal(-101));
    }

    #[test]
    fn test_check_warning_continues() {
        let status = check::<Dummy>("spSetRefLevel", 1).unwrap();
        assert_eq!(status, Status::Warning(1));
    }

    #[test]
    fn test_check_error_is_fatal() {
        let err = check::<Dummy>("spOpenDevice", -1).unwrap_err();
        match err {
            Error::Fatal {
                family,
                call,
                code,
                message,
            } => {
                assert_eq!(family, Family::Sp145);
                assert_eq!(call, "spOpenDevice");
                assert_eq!(code, -1);
                assert_eq!(message, "dummy status -1");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

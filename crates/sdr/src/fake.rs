// Copyright 2025-2026 CEMAXECUTER LLC

//! Stand-in for a vendor SDK.
//!
//! A [`FakeSdk`] records every call its devices make and returns whatever
//! status code was injected for a call name. [`FakeDevice`] uses the names
//! `"open"`, `"serial"`, `"configure"`, `"read_iq"`, `"submit_iq"`; the
//! family devices driven through their vendor API traits use the vendor
//! function names (`"spSetAttenuator"`). Reads produce a ramp (`k, -k`)
//! that continues across calls, so callers can check ordering.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use num_complex::Complex32;

use crate::error::Result;
use crate::status::{check, Status, StatusText};
use crate::{Device, DeviceConfig, DeviceInfo, RxDevice, TxDevice};

pub const FAKE_SERIAL: u32 = 1_000_001;

#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Open,
    GetSerial,
    Configure,
    ReadIq { len: usize, purge: bool },
    SubmitIq { len: usize },
    Abort,
    Close,
    /// Vendor API function, by its C name.
    Vendor(&'static str),
}

struct FakeState<C> {
    calls: Vec<FakeCall>,
    configs: Vec<C>,
    statuses: HashMap<&'static str, i32>,
    next_sample: u64,
    submitted: Vec<Complex32>,
}

/// Shared record of everything the fake hardware saw.
pub struct FakeSdk<C> {
    state: Arc<Mutex<FakeState<C>>>,
}

impl<C> Clone for FakeSdk<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: DeviceConfig> Default for FakeSdk<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DeviceConfig> FakeSdk<C> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                calls: Vec::new(),
                configs: Vec::new(),
                statuses: HashMap::new(),
                next_sample: 0,
                submitted: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState<C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ramp value the fake produces for the `index`-th sample ever read.
    pub fn sample(index: u64) -> Complex32 {
        let k = (index % (1 << 24)) as f32;
        Complex32::new(k, -k)
    }

    /// Make every subsequent `call` return `code`.
    pub fn set_status(&self, call: &'static str, code: i32) {
        self.lock().statuses.insert(call, code);
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.lock().calls.clone()
    }

    /// Configuration sets pushed by successful configure calls, in order.
    pub fn configs(&self) -> Vec<C> {
        self.lock().configs.clone()
    }

    /// Every sample handed to `submit_iq`, in order.
    pub fn submitted(&self) -> Vec<Complex32> {
        self.lock().submitted.clone()
    }

    pub fn count(&self, call: &FakeCall) -> usize {
        self.lock().calls.iter().filter(|c| *c == call).count()
    }

    /// Record `call` and return the status injected for `name`.
    fn record(&self, call: FakeCall, name: &'static str) -> i32 {
        let mut state = self.lock();
        state.calls.push(call);
        state.statuses.get(name).copied().unwrap_or(0)
    }

    /// Record `call` and run its injected status through the family check.
    fn invoke(&self, call: FakeCall, name: &'static str) -> Result<Status> {
        check::<Self>(name, self.record(call, name))
    }

    /// Raw status for one vendor function call.
    #[cfg(test)]
    pub(crate) fn vendor(&self, name: &'static str) -> i32 {
        self.record(FakeCall::Vendor(name), name)
    }

    /// Vendor function names called so far, in order.
    #[cfg(test)]
    pub(crate) fn vendor_calls(&self) -> Vec<&'static str> {
        self.lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                FakeCall::Vendor(name) => Some(*name),
                _ => None,
            })
            .collect()
    }

    /// Continue the ramp into `buf`.
    pub(crate) fn fill_ramp(&self, buf: &mut [Complex32]) {
        let mut state = self.lock();
        let start = state.next_sample;
        for (i, sample) in buf.iter_mut().enumerate() {
            *sample = Self::sample(start + i as u64);
        }
        state.next_sample = start + buf.len() as u64;
    }

    pub(crate) fn capture(&self, iq: &[Complex32]) {
        self.lock().submitted.extend_from_slice(iq);
    }

    /// Open a device on this SDK. Identification warnings are logged and
    /// ignored; an identification error closes the handle again.
    pub fn open(&self) -> Result<FakeDevice<C>> {
        self.invoke(FakeCall::Open, "open")?;

        let mut device = FakeDevice {
            sdk: self.clone(),
            info: DeviceInfo {
                family: C::FAMILY,
                serial: FAKE_SERIAL,
                api_version: String::from("fake"),
                model: Some(format!("fake {}", C::FAMILY)),
            },
            closed: false,
        };

        if let Err(e) = self.invoke(FakeCall::GetSerial, "serial") {
            device.close();
            return Err(e);
        }

        log::info!(
            "{} API version: {}, serial number: {}",
            C::FAMILY,
            device.info.api_version,
            device.info.serial
        );
        Ok(device)
    }
}

impl<C: DeviceConfig> StatusText for FakeSdk<C> {
    const FAMILY: crate::Family = C::FAMILY;

    fn describe(code: i32) -> String {
        format!("fake status {}", code)
    }
}

/// Device handle opened on a [`FakeSdk`].
pub struct FakeDevice<C> {
    sdk: FakeSdk<C>,
    info: DeviceInfo,
    closed: bool,
}

impl<C: DeviceConfig> Device for FakeDevice<C> {
    type Config = C;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, config: &C) -> Result<()> {
        self.sdk.invoke(FakeCall::Configure, "configure")?;
        self.sdk.lock().configs.push(config.clone());
        log::info!("{} (fake) configured: {:?}", C::FAMILY, config);
        Ok(())
    }

    fn abort(&mut self) {
        let _ = self.sdk.invoke(FakeCall::Abort, "abort");
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.sdk.invoke(FakeCall::Close, "close");
    }
}

impl<C: DeviceConfig> RxDevice for FakeDevice<C> {
    fn read_iq(&mut self, buf: &mut [Complex32], purge: bool) -> Result<()> {
        self.sdk.invoke(
            FakeCall::ReadIq {
                len: buf.len(),
                purge,
            },
            "read_iq",
        )?;
        self.sdk.fill_ramp(buf);
        Ok(())
    }
}

impl<C: DeviceConfig> TxDevice for FakeDevice<C> {
    fn submit_iq(&mut self, iq: &[Complex32]) -> Result<()> {
        self.sdk
            .invoke(FakeCall::SubmitIq { len: iq.len() }, "submit_iq")?;
        self.sdk.capture(iq);
        Ok(())
    }
}

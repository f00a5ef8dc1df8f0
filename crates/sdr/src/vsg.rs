// Copyright 2025-2026 CEMAXECUTER LLC

//! VSG60 vector signal generator (`vsg_api`).

use num_complex::Complex32;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::status::{check, StatusText};
use crate::{Controls, Device, DeviceConfig, DeviceInfo, Family, Param, TxDevice};

/// Output configuration of a VSG60.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VsgConfig {
    pub center: f64,
    pub samplerate: f64,
    /// Output level in dBm.
    pub level: f64,
    /// DC offsets, truncated to 16 bits when pushed to the device.
    pub ioffset: i32,
    pub qoffset: i32,
}

impl Default for VsgConfig {
    fn default() -> Self {
        Self {
            center: 1.0e9,
            samplerate: 10.0e6,
            level: -20.0,
            ioffset: 0,
            qoffset: 0,
        }
    }
}

impl DeviceConfig for VsgConfig {
    const FAMILY: Family = Family::Vsg60;

    fn apply(&mut self, param: Param) -> Result<()> {
        match param {
            Param::Center(v) => self.center = v,
            Param::SampleRate(v) => self.samplerate = v,
            Param::Level(v) => self.level = v,
            Param::IOffset(v) => self.ioffset = v,
            Param::QOffset(v) => self.qoffset = v,
            other => return Err(other.unsupported(Self::FAMILY)),
        }
        Ok(())
    }
}

impl Controls<VsgConfig> {
    pub fn set_center(&self, center: f64) {
        self.update(|c| c.center = center);
    }

    pub fn set_samplerate(&self, samplerate: f64) {
        self.update(|c| c.samplerate = samplerate);
    }

    pub fn set_level(&self, level: f64) {
        self.update(|c| c.level = level);
    }

    pub fn set_ioffset(&self, ioffset: i32) {
        self.update(|c| c.ioffset = ioffset);
    }

    pub fn set_qoffset(&self, qoffset: i32) {
        self.update(|c| c.qoffset = qoffset);
    }
}

const VSG_MAX_DEVICES: usize = 8;

/// `vsg_api` entry points a [`VsgDevice`] drives.
pub trait VsgApi: StatusText + Send {
    fn api_version(&self) -> String;
    fn get_device_list(&self, serials: &mut [i32], count: &mut i32) -> i32;
    fn open_device(&self, handle: &mut i32) -> i32;
    fn open_device_by_serial(&self, handle: &mut i32, serial: i32) -> i32;
    fn close_device(&self, handle: i32) -> i32;
    fn abort(&self, handle: i32) -> i32;
    fn get_serial_number(&self, handle: i32, serial: &mut i32) -> i32;
    fn set_frequency(&self, handle: i32, frequency: f64) -> i32;
    fn get_frequency(&self, handle: i32, frequency: &mut f64) -> i32;
    fn set_sample_rate(&self, handle: i32, sample_rate: f64) -> i32;
    fn get_sample_rate(&self, handle: i32, sample_rate: &mut f64) -> i32;
    fn set_level(&self, handle: i32, level: f64) -> i32;
    fn get_level(&self, handle: i32, level: &mut f64) -> i32;
    fn set_iq_offset(&self, handle: i32, i_offset: i16, q_offset: i16) -> i32;
    fn get_iq_offset(&self, handle: i32, i_offset: &mut i16, q_offset: &mut i16) -> i32;
    /// Queue `iq.len()` interleaved samples.
    fn submit_iq(&self, handle: i32, iq: &[Complex32]) -> i32;
    fn flush(&self, handle: i32) -> i32;
}

#[cfg(feature = "vsg")]
pub use ffi::VsgLib;

#[cfg(feature = "vsg")]
mod ffi {
    use std::os::raw::{c_char, c_int};

    use num_complex::Complex32;

    use super::VsgApi;
    use crate::status::{c_string, StatusText};
    use crate::Family;

    type VsgStatus = c_int;

    extern "C" {
        fn vsgGetDeviceList(serials: *mut c_int, count: *mut c_int) -> VsgStatus;
        fn vsgOpenDevice(handle: *mut c_int) -> VsgStatus;
        fn vsgOpenDeviceBySerial(handle: *mut c_int, serial_number: c_int) -> VsgStatus;
        fn vsgCloseDevice(handle: c_int) -> VsgStatus;
        fn vsgAbort(handle: c_int) -> VsgStatus;
        fn vsgGetSerialNumber(handle: c_int, serial: *mut c_int) -> VsgStatus;
        fn vsgSetFrequency(handle: c_int, frequency: f64) -> VsgStatus;
        fn vsgGetFrequency(handle: c_int, frequency: *mut f64) -> VsgStatus;
        fn vsgSetSampleRate(handle: c_int, sample_rate: f64) -> VsgStatus;
        fn vsgGetSampleRate(handle: c_int, sample_rate: *mut f64) -> VsgStatus;
        fn vsgSetLevel(handle: c_int, level: f64) -> VsgStatus;
        fn vsgGetLevel(handle: c_int, level: *mut f64) -> VsgStatus;
        fn vsgSetIQOffset(handle: c_int, i_offset: i16, q_offset: i16) -> VsgStatus;
        fn vsgGetIQOffset(handle: c_int, i_offset: *mut i16, q_offset: *mut i16) -> VsgStatus;
        fn vsgSubmitIQ(handle: c_int, iq: *const f32, len: c_int) -> VsgStatus;
        fn vsgFlush(handle: c_int) -> VsgStatus;
        fn vsgGetErrorString(status: VsgStatus) -> *const c_char;
        fn vsgGetAPIVersion() -> *const c_char;
    }

    /// The linked `vsg_api` library.
    pub struct VsgLib;

    impl StatusText for VsgLib {
        const FAMILY: Family = Family::Vsg60;

        fn describe(code: i32) -> String {
            unsafe { c_string(vsgGetErrorString(code)) }
        }
    }

    impl VsgApi for VsgLib {
        fn api_version(&self) -> String {
            unsafe { c_string(vsgGetAPIVersion()) }
        }

        fn get_device_list(&self, serials: &mut [i32], count: &mut i32) -> i32 {
            unsafe { vsgGetDeviceList(serials.as_mut_ptr(), count) }
        }

        fn open_device(&self, handle: &mut i32) -> i32 {
            unsafe { vsgOpenDevice(handle) }
        }

        fn open_device_by_serial(&self, handle: &mut i32, serial: i32) -> i32 {
            unsafe { vsgOpenDeviceBySerial(handle, serial) }
        }

        fn close_device(&self, handle: i32) -> i32 {
            unsafe { vsgCloseDevice(handle) }
        }

        fn abort(&self, handle: i32) -> i32 {
            unsafe { vsgAbort(handle) }
        }

        fn get_serial_number(&self, handle: i32, serial: &mut i32) -> i32 {
            unsafe { vsgGetSerialNumber(handle, serial) }
        }

        fn set_frequency(&self, handle: i32, frequency: f64) -> i32 {
            unsafe { vsgSetFrequency(handle, frequency) }
        }

        fn get_frequency(&self, handle: i32, frequency: &mut f64) -> i32 {
            unsafe { vsgGetFrequency(handle, frequency) }
        }

        fn set_sample_rate(&self, handle: i32, sample_rate: f64) -> i32 {
            unsafe { vsgSetSampleRate(handle, sample_rate) }
        }

        fn get_sample_rate(&self, handle: i32, sample_rate: &mut f64) -> i32 {
            unsafe { vsgGetSampleRate(handle, sample_rate) }
        }

        fn set_level(&self, handle: i32, level: f64) -> i32 {
            unsafe { vsgSetLevel(handle, level) }
        }

        fn get_level(&self, handle: i32, level: &mut f64) -> i32 {
            unsafe { vsgGetLevel(handle, level) }
        }

        fn set_iq_offset(&self, handle: i32, i_offset: i16, q_offset: i16) -> i32 {
            unsafe { vsgSetIQOffset(handle, i_offset, q_offset) }
        }

        fn get_iq_offset(&self, handle: i32, i_offset: &mut i16, q_offset: &mut i16) -> i32 {
            unsafe { vsgGetIQOffset(handle, i_offset, q_offset) }
        }

        fn submit_iq(&self, handle: i32, iq: &[Complex32]) -> i32 {
            unsafe { vsgSubmitIQ(handle, iq.as_ptr() as *const f32, iq.len() as c_int) }
        }

        fn flush(&self, handle: i32) -> i32 {
            unsafe { vsgFlush(handle) }
        }
    }
}

/// Serial numbers of all VSG60 units attached to this host.
#[cfg(feature = "vsg")]
pub fn list_devices() -> Result<Vec<u32>> {
    list_devices_with(&VsgLib)
}

pub fn list_devices_with<A: VsgApi>(api: &A) -> Result<Vec<u32>> {
    let mut serials = [0i32; VSG_MAX_DEVICES];
    let mut count = VSG_MAX_DEVICES as i32;
    check::<A>("vsgGetDeviceList", api.get_device_list(&mut serials, &mut count))?;
    let count = (count.max(0) as usize).min(VSG_MAX_DEVICES);
    Ok(serials[..count].iter().map(|&s| s as u32).collect())
}

/// Opened VSG60 handle.
pub struct VsgDevice<A: VsgApi> {
    api: A,
    handle: i32,
    info: DeviceInfo,
    open: bool,
}

#[cfg(feature = "vsg")]
impl VsgDevice<VsgLib> {
    pub fn open(serial: Option<u32>) -> Result<Self> {
        Self::open_with(VsgLib, serial)
    }
}

impl<A: VsgApi> VsgDevice<A> {
    pub fn open_with(api: A, serial: Option<u32>) -> Result<Self> {
        let api_version = api.api_version();
        log::info!("VSG60 API version: {}", api_version);

        let mut handle = -1;
        let (call, r) = match serial {
            Some(s) => (
                "vsgOpenDeviceBySerial",
                api.open_device_by_serial(&mut handle, s as i32),
            ),
            None => ("vsgOpenDevice", api.open_device(&mut handle)),
        };
        check::<A>(call, r)?;

        let mut dev = Self {
            api,
            handle,
            info: DeviceInfo {
                family: Family::Vsg60,
                serial: 0,
                api_version,
                model: None,
            },
            open: true,
        };

        let mut sn = 0;
        let r = dev.api.get_serial_number(handle, &mut sn);
        if let Err(e) = check::<A>("vsgGetSerialNumber", r) {
            dev.close();
            return Err(e);
        }
        dev.info.serial = sn as u32;
        log::info!("VSG60 serial number: {}", sn);

        Ok(dev)
    }
}

impl<A: VsgApi> Device for VsgDevice<A> {
    type Config = VsgConfig;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, cfg: &VsgConfig) -> Result<()> {
        let (api, h) = (&self.api, self.handle);
        check::<A>("vsgSetFrequency", api.set_frequency(h, cfg.center))?;
        check::<A>("vsgSetSampleRate", api.set_sample_rate(h, cfg.samplerate))?;
        check::<A>("vsgSetLevel", api.set_level(h, cfg.level))?;
        check::<A>(
            "vsgSetIQOffset",
            api.set_iq_offset(h, cfg.ioffset as i16, cfg.qoffset as i16),
        )?;

        let mut frequency = 0.0;
        let mut sample_rate = 0.0;
        let mut level = 0.0;
        let mut i_offset: i16 = 0;
        let mut q_offset: i16 = 0;
        check::<A>("vsgGetFrequency", api.get_frequency(h, &mut frequency))?;
        check::<A>("vsgGetSampleRate", api.get_sample_rate(h, &mut sample_rate))?;
        check::<A>("vsgGetLevel", api.get_level(h, &mut level))?;
        check::<A>(
            "vsgGetIQOffset",
            api.get_iq_offset(h, &mut i_offset, &mut q_offset),
        )?;
        log::info!(
            "VSG60 output: frequency {} Hz, sample rate {} S/s, level {} dBm, I offset {}, Q offset {}",
            frequency,
            sample_rate,
            level,
            i_offset,
            q_offset
        );
        Ok(())
    }

    fn abort(&mut self) {
        if self.open {
            let _ = check::<A>("vsgAbort", self.api.abort(self.handle));
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let _ = check::<A>("vsgCloseDevice", self.api.close_device(self.handle));
        self.handle = -1;
    }
}

impl<A: VsgApi> TxDevice for VsgDevice<A> {
    fn submit_iq(&mut self, iq: &[Complex32]) -> Result<()> {
        i32::try_from(iq.len())
            .map_err(|_| Error::InvalidParam(format!("{} samples per write", iq.len())))?;
        check::<A>("vsgSubmitIQ", self.api.submit_iq(self.handle, iq))?;
        check::<A>("vsgFlush", self.api.flush(self.handle))?;
        Ok(())
    }
}

impl<A: VsgApi> Drop for VsgDevice<A> {
    fn drop(&mut self) {
        self.close();
    }
}

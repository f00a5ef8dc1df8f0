// Copyright 2025-2026 CEMAXECUTER LLC

//! SP145 spectrum analyzer (`sp_api`).

use num_complex::Complex32;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::status::{check, StatusText};
use crate::{Controls, Device, DeviceConfig, DeviceInfo, Family, Param, RxDevice};

/// I/Q streaming configuration of an SP145.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpConfig {
    pub center: f64,
    pub reflevel: f64,
    /// Attenuator index 0..=6, -1 lets the reference level pick it.
    pub atten: i32,
    pub decimation: i32,
    pub swfilter: bool,
    pub bandwidth: f64,
}

impl Default for SpConfig {
    fn default() -> Self {
        Self {
            center: 1.0e9,
            reflevel: -20.0,
            atten: -1,
            decimation: 2,
            swfilter: true,
            bandwidth: 20.0e6,
        }
    }
}

impl DeviceConfig for SpConfig {
    const FAMILY: Family = Family::Sp145;

    fn apply(&mut self, param: Param) -> Result<()> {
        match param {
            Param::Center(v) => self.center = v,
            Param::RefLevel(v) => self.reflevel = v,
            Param::Atten(v) => self.atten = v,
            Param::Decimation(v) => self.decimation = v,
            Param::SwFilter(v) => self.swfilter = v,
            Param::Bandwidth(v) => self.bandwidth = v,
            other => return Err(other.unsupported(Self::FAMILY)),
        }
        Ok(())
    }
}

impl Controls<SpConfig> {
    pub fn set_center(&self, center: f64) {
        self.update(|c| c.center = center);
    }

    pub fn set_reflevel(&self, reflevel: f64) {
        self.update(|c| c.reflevel = reflevel);
    }

    pub fn set_atten(&self, atten: i32) {
        self.update(|c| c.atten = atten);
    }

    pub fn set_decimation(&self, decimation: i32) {
        self.update(|c| c.decimation = decimation);
    }

    pub fn set_swfilter(&self, swfilter: bool) {
        self.update(|c| c.swfilter = swfilter);
    }

    pub fn set_bandwidth(&self, bandwidth: f64) {
        self.update(|c| c.bandwidth = bandwidth);
    }
}


const SP_MAX_DEVICES: usize = 9;
const SP_DEVICE_NOT_FOUND_ERR: i32 = -1;
const SP_DATA_TYPE_32FC: i32 = 0;
const SP_MODE_IQ_STREAMING: i32 = 3;

/// `sp_api` entry points an [`SpDevice`] drives, one method per C function.
/// Every method returns the raw vendor status.
pub trait SpApi: StatusText + Send {
    fn api_version(&self) -> String;
    fn get_device_list(&self, serials: &mut [i32], count: &mut i32) -> i32;
    fn open_device(&self, handle: &mut i32) -> i32;
    fn open_device_by_serial(&self, handle: &mut i32, serial: i32) -> i32;
    fn close_device(&self, handle: i32) -> i32;
    fn abort(&self, handle: i32) -> i32;
    fn get_serial_number(&self, handle: i32, serial: &mut i32) -> i32;
    fn set_iq_data_type(&self, handle: i32, data_type: i32) -> i32;
    fn set_iq_center_freq(&self, handle: i32, center: f64) -> i32;
    fn set_iq_sample_rate(&self, handle: i32, decimation: i32) -> i32;
    fn set_iq_software_filter(&self, handle: i32, enabled: bool) -> i32;
    fn set_ref_level(&self, handle: i32, reflevel: f64) -> i32;
    fn set_attenuator(&self, handle: i32, atten: i32) -> i32;
    fn set_iq_bandwidth(&self, handle: i32, bandwidth: f64) -> i32;
    fn configure(&self, handle: i32, mode: i32) -> i32;
    fn get_iq_parameters(&self, handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32;
    /// Blocking read of `buf.len()` samples.
    fn get_iq(&self, handle: i32, buf: &mut [Complex32], purge: bool) -> i32;
}

#[cfg(feature = "sp")]
pub use ffi::SpLib;

#[cfg(feature = "sp")]
mod ffi {
    use std::os::raw::{c_char, c_int, c_void};
    use std::ptr;

    use num_complex::Complex32;

    use super::SpApi;
    use crate::status::{c_string, StatusText};
    use crate::Family;

    type SpStatus = c_int;

    const SP_FALSE: c_int = 0;
    const SP_TRUE: c_int = 1;

    extern "C" {
        fn spGetDeviceList(serials: *mut c_int, device_count: *mut c_int) -> SpStatus;
        fn spOpenDevice(device: *mut c_int) -> SpStatus;
        fn spOpenDeviceBySerial(device: *mut c_int, serial_number: c_int) -> SpStatus;
        fn spCloseDevice(device: c_int) -> SpStatus;
        fn spAbort(device: c_int) -> SpStatus;
        fn spGetSerialNumber(device: c_int, serial_number: *mut c_int) -> SpStatus;
        fn spSetIQDataType(device: c_int, data_type: c_int) -> SpStatus;
        fn spSetIQCenterFreq(device: c_int, center_freq_hz: f64) -> SpStatus;
        fn spSetIQSampleRate(device: c_int, decimation: c_int) -> SpStatus;
        fn spSetIQSoftwareFilter(device: c_int, enabled: c_int) -> SpStatus;
        fn spSetRefLevel(device: c_int, ref_level: f64) -> SpStatus;
        fn spSetAttenuator(device: c_int, atten: c_int) -> SpStatus;
        fn spSetIQBandwidth(device: c_int, bandwidth: f64) -> SpStatus;
        fn spConfigure(device: c_int, mode: c_int) -> SpStatus;
        fn spGetIQParameters(device: c_int, sample_rate: *mut f64, bandwidth: *mut f64) -> SpStatus;
        fn spGetIQ(
            device: c_int,
            iq_buf: *mut c_void,
            iq_buf_size: c_int,
            triggers: *mut f64,
            trigger_buf_size: c_int,
            ns_since_epoch: *mut i64,
            purge: c_int,
            sample_loss: *mut c_int,
            samples_remaining: *mut c_int,
        ) -> SpStatus;
        fn spGetErrorString(status: SpStatus) -> *const c_char;
        fn spGetAPIVersion() -> *const c_char;
    }

    fn sp_bool(v: bool) -> c_int {
        if v {
            SP_TRUE
        } else {
            SP_FALSE
        }
    }

    /// The linked `sp_api` library.
    pub struct SpLib;

    impl StatusText for SpLib {
        const FAMILY: Family = Family::Sp145;

        fn describe(code: i32) -> String {
            unsafe { c_string(spGetErrorString(code)) }
        }
    }

    impl SpApi for SpLib {
        fn api_version(&self) -> String {
            unsafe { c_string(spGetAPIVersion()) }
        }

        fn get_device_list(&self, serials: &mut [i32], count: &mut i32) -> i32 {
            unsafe { spGetDeviceList(serials.as_mut_ptr(), count) }
        }

        fn open_device(&self, handle: &mut i32) -> i32 {
            unsafe { spOpenDevice(handle) }
        }

        fn open_device_by_serial(&self, handle: &mut i32, serial: i32) -> i32 {
            unsafe { spOpenDeviceBySerial(handle, serial) }
        }

        fn close_device(&self, handle: i32) -> i32 {
            unsafe { spCloseDevice(handle) }
        }

        fn abort(&self, handle: i32) -> i32 {
            unsafe { spAbort(handle) }
        }

        fn get_serial_number(&self, handle: i32, serial: &mut i32) -> i32 {
            unsafe { spGetSerialNumber(handle, serial) }
        }

        fn set_iq_data_type(&self, handle: i32, data_type: i32) -> i32 {
            unsafe { spSetIQDataType(handle, data_type) }
        }

        fn set_iq_center_freq(&self, handle: i32, center: f64) -> i32 {
            unsafe { spSetIQCenterFreq(handle, center) }
        }

        fn set_iq_sample_rate(&self, handle: i32, decimation: i32) -> i32 {
            unsafe { spSetIQSampleRate(handle, decimation) }
        }

        fn set_iq_software_filter(&self, handle: i32, enabled: bool) -> i32 {
            unsafe { spSetIQSoftwareFilter(handle, sp_bool(enabled)) }
        }

        fn set_ref_level(&self, handle: i32, reflevel: f64) -> i32 {
            unsafe { spSetRefLevel(handle, reflevel) }
        }

        fn set_attenuator(&self, handle: i32, atten: i32) -> i32 {
            unsafe { spSetAttenuator(handle, atten) }
        }

        fn set_iq_bandwidth(&self, handle: i32, bandwidth: f64) -> i32 {
            unsafe { spSetIQBandwidth(handle, bandwidth) }
        }

        fn configure(&self, handle: i32, mode: i32) -> i32 {
            unsafe { spConfigure(handle, mode) }
        }

        fn get_iq_parameters(&self, handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32 {
            unsafe { spGetIQParameters(handle, sample_rate, bandwidth) }
        }

        fn get_iq(&self, handle: i32, buf: &mut [Complex32], purge: bool) -> i32 {
            // Complex32 is two packed f32, the layout of 32fc.
            unsafe {
                spGetIQ(
                    handle,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len() as c_int,
                    ptr::null_mut(),
                    0,
                    ptr::null_mut(),
                    sp_bool(purge),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            }
        }
    }
}

/// Serial numbers of all SP145 units attached to this host.
#[cfg(feature = "sp")]
pub fn list_devices() -> Result<Vec<u32>> {
    list_devices_with(&SpLib)
}

pub fn list_devices_with<A: SpApi>(api: &A) -> Result<Vec<u32>> {
    let mut serials = [0i32; SP_MAX_DEVICES];
    let mut count = SP_MAX_DEVICES as i32;
    check::<A>("spGetDeviceList", api.get_device_list(&mut serials, &mut count))?;
    let count = (count.max(0) as usize).min(SP_MAX_DEVICES);
    Ok(serials[..count].iter().map(|&s| s as u32).collect())
}

/// Opened SP145 handle.
pub struct SpDevice<A: SpApi> {
    api: A,
    handle: i32,
    info: DeviceInfo,
    open: bool,
}

#[cfg(feature = "sp")]
impl SpDevice<SpLib> {
    /// Claim the first free SP145, or the one with `serial`.
    pub fn open(serial: Option<u32>) -> Result<Self> {
        Self::open_with(SpLib, serial)
    }
}

impl<A: SpApi> SpDevice<A> {
    pub fn open_with(api: A, serial: Option<u32>) -> Result<Self> {
        let api_version = api.api_version();
        log::info!("SP145 API version: {}", api_version);

        let mut handle = -1;
        let (call, r) = match serial {
            Some(s) => (
                "spOpenDeviceBySerial",
                api.open_device_by_serial(&mut handle, s as i32),
            ),
            None => ("spOpenDevice", api.open_device(&mut handle)),
        };
        if r == SP_DEVICE_NOT_FOUND_ERR {
            return Err(Error::DeviceNotFound(Family::Sp145));
        }
        check::<A>(call, r)?;

        let mut dev = Self {
            api,
            handle,
            info: DeviceInfo {
                family: Family::Sp145,
                serial: 0,
                api_version,
                model: None,
            },
            open: true,
        };

        let mut sn = 0;
        let r = dev.api.get_serial_number(handle, &mut sn);
        if let Err(e) = check::<A>("spGetSerialNumber", r) {
            dev.close();
            return Err(e);
        }
        dev.info.serial = sn as u32;
        log::info!("SP145 serial number: {}", sn);

        Ok(dev)
    }
}

impl<A: SpApi> Device for SpDevice<A> {
    type Config = SpConfig;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, cfg: &SpConfig) -> Result<()> {
        let (api, h) = (&self.api, self.handle);
        check::<A>("spSetIQDataType", api.set_iq_data_type(h, SP_DATA_TYPE_32FC))?;
        check::<A>("spSetIQCenterFreq", api.set_iq_center_freq(h, cfg.center))?;
        check::<A>("spSetIQSampleRate", api.set_iq_sample_rate(h, cfg.decimation))?;
        check::<A>(
            "spSetIQSoftwareFilter",
            api.set_iq_software_filter(h, cfg.swfilter),
        )?;
        check::<A>("spSetRefLevel", api.set_ref_level(h, cfg.reflevel))?;
        check::<A>("spSetAttenuator", api.set_attenuator(h, cfg.atten))?;
        check::<A>("spSetIQBandwidth", api.set_iq_bandwidth(h, cfg.bandwidth))?;

        check::<A>("spConfigure", api.configure(h, SP_MODE_IQ_STREAMING))?;

        let mut sample_rate = 0.0;
        let mut bandwidth = 0.0;
        check::<A>(
            "spGetIQParameters",
            api.get_iq_parameters(h, &mut sample_rate, &mut bandwidth),
        )?;
        log::info!(
            "SP145 I/Q streaming: sample rate {} S/s, actual bandwidth {} Hz",
            sample_rate,
            bandwidth
        );
        Ok(())
    }

    fn abort(&mut self) {
        if self.open {
            let _ = check::<A>("spAbort", self.api.abort(self.handle));
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let _ = check::<A>("spCloseDevice", self.api.close_device(self.handle));
        self.handle = -1;
    }
}

impl<A: SpApi> RxDevice for SpDevice<A> {
    fn read_iq(&mut self, buf: &mut [Complex32], purge: bool) -> Result<()> {
        i32::try_from(buf.len())
            .map_err(|_| Error::InvalidParam(format!("{} samples per read", buf.len())))?;
        check::<A>("spGetIQ", self.api.get_iq(self.handle, buf, purge))?;
        Ok(())
    }
}

impl<A: SpApi> Drop for SpDevice<A> {
    fn drop(&mut self) {
        self.close();
    }
}

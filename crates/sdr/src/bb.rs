// Copyright 2025-2026 CEMAXECUTER LLC

//! BB60 real-time spectrum analyzers (`bb_api`).
//!
//! The BB60 has no explicit attenuator or software-filter setting in I/Q
//! mode: the reference level drives the front end, and decimation plus
//! bandwidth are configured together.

use num_complex::Complex32;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::status::{check, StatusText};
use crate::{Controls, Device, DeviceConfig, DeviceInfo, Family, Param, RxDevice};

/// I/Q streaming configuration of a BB60.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BbConfig {
    pub center: f64,
    pub reflevel: f64,
    /// Power-of-two downsample factor, 1..=8192.
    pub decimation: i32,
    pub bandwidth: f64,
}

impl Default for BbConfig {
    fn default() -> Self {
        Self {
            center: 1.0e9,
            reflevel: -20.0,
            decimation: 2,
            bandwidth: 15.0e6,
        }
    }
}

impl DeviceConfig for BbConfig {
    const FAMILY: Family = Family::Bb60;

    fn apply(&mut self, param: Param) -> Result<()> {
        match param {
            Param::Center(v) => self.center = v,
            Param::RefLevel(v) => self.reflevel = v,
            Param::Decimation(v) => self.decimation = v,
            Param::Bandwidth(v) => self.bandwidth = v,
            other => return Err(other.unsupported(Self::FAMILY)),
        }
        Ok(())
    }
}

impl Controls<BbConfig> {
    pub fn set_center(&self, center: f64) {
        self.update(|c| c.center = center);
    }

    pub fn set_reflevel(&self, reflevel: f64) {
        self.update(|c| c.reflevel = reflevel);
    }

    pub fn set_decimation(&self, decimation: i32) {
        self.update(|c| c.decimation = decimation);
    }

    pub fn set_bandwidth(&self, bandwidth: f64) {
        self.update(|c| c.bandwidth = bandwidth);
    }
}

const BB_MAX_DEVICES: usize = 8;
const BB_STREAMING: u32 = 0x4;
const BB_STREAM_IQ: u32 = 0x0;
const BB_DATA_TYPE_32FC: i32 = 0;

fn model_name(device_type: i32) -> &'static str {
    match device_type {
        1 => "BB60A",
        2 => "BB60C",
        3 => "BB60D",
        _ => "unknown BB60",
    }
}

/// `bb_api` entry points a [`BbDevice`] drives.
pub trait BbApi: StatusText + Send {
    fn api_version(&self) -> String;
    fn get_serial_number_list(&self, serials: &mut [i32], count: &mut i32) -> i32;
    fn open_device(&self, handle: &mut i32) -> i32;
    fn open_device_by_serial_number(&self, handle: &mut i32, serial: i32) -> i32;
    fn close_device(&self, handle: i32) -> i32;
    fn abort(&self, handle: i32) -> i32;
    fn get_serial_number(&self, handle: i32, serial: &mut u32) -> i32;
    fn get_device_type(&self, handle: i32, device_type: &mut i32) -> i32;
    fn configure_iq_center(&self, handle: i32, center: f64) -> i32;
    fn configure_ref_level(&self, handle: i32, reflevel: f64) -> i32;
    fn configure_iq(&self, handle: i32, decimation: i32, bandwidth: f64) -> i32;
    fn configure_iq_data_type(&self, handle: i32, data_type: i32) -> i32;
    fn initiate(&self, handle: i32, mode: u32, flag: u32) -> i32;
    fn query_iq_parameters(&self, handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32;
    fn get_iq_unpacked(&self, handle: i32, buf: &mut [Complex32], purge: bool) -> i32;
}

#[cfg(feature = "bb")]
pub use ffi::BbLib;

#[cfg(feature = "bb")]
mod ffi {
    use std::os::raw::{c_char, c_int, c_void};
    use std::ptr;

    use num_complex::Complex32;

    use super::BbApi;
    use crate::status::{c_string, StatusText};
    use crate::Family;

    type BbStatus = c_int;

    const BB_FALSE: c_int = 0;
    const BB_TRUE: c_int = 1;

    extern "C" {
        fn bbGetSerialNumberList(serial_numbers: *mut c_int, device_count: *mut c_int) -> BbStatus;
        fn bbOpenDevice(device: *mut c_int) -> BbStatus;
        fn bbOpenDeviceBySerialNumber(device: *mut c_int, serial_number: c_int) -> BbStatus;
        fn bbCloseDevice(device: c_int) -> BbStatus;
        fn bbAbort(device: c_int) -> BbStatus;
        fn bbGetSerialNumber(device: c_int, serial_number: *mut u32) -> BbStatus;
        fn bbGetDeviceType(device: c_int, device_type: *mut c_int) -> BbStatus;
        fn bbConfigureIQCenter(device: c_int, center_freq: f64) -> BbStatus;
        fn bbConfigureRefLevel(device: c_int, ref_level: f64) -> BbStatus;
        fn bbConfigureIQ(device: c_int, downsample_factor: c_int, bandwidth: f64) -> BbStatus;
        fn bbConfigureIQDataType(device: c_int, data_type: c_int) -> BbStatus;
        fn bbInitiate(device: c_int, mode: u32, flag: u32) -> BbStatus;
        fn bbQueryIQParameters(device: c_int, sample_rate: *mut f64, bandwidth: *mut f64) -> BbStatus;
        fn bbGetIQUnpacked(
            device: c_int,
            iq_data: *mut c_void,
            iq_count: c_int,
            triggers: *mut u32,
            trigger_count: c_int,
            purge: c_int,
            data_remaining: *mut c_int,
            sample_loss: *mut c_int,
            sec: *mut c_int,
            nano: *mut c_int,
        ) -> BbStatus;
        fn bbGetErrorString(status: BbStatus) -> *const c_char;
        fn bbGetAPIVersion() -> *const c_char;
    }

    /// The linked `bb_api` library.
    pub struct BbLib;

    impl StatusText for BbLib {
        const FAMILY: Family = Family::Bb60;

        fn describe(code: i32) -> String {
            unsafe { c_string(bbGetErrorString(code)) }
        }
    }

    impl BbApi for BbLib {
        fn api_version(&self) -> String {
            unsafe { c_string(bbGetAPIVersion()) }
        }

        fn get_serial_number_list(&self, serials: &mut [i32], count: &mut i32) -> i32 {
            unsafe { bbGetSerialNumberList(serials.as_mut_ptr(), count) }
        }

        fn open_device(&self, handle: &mut i32) -> i32 {
            unsafe { bbOpenDevice(handle) }
        }

        fn open_device_by_serial_number(&self, handle: &mut i32, serial: i32) -> i32 {
            unsafe { bbOpenDeviceBySerialNumber(handle, serial) }
        }

        fn close_device(&self, handle: i32) -> i32 {
            unsafe { bbCloseDevice(handle) }
        }

        fn abort(&self, handle: i32) -> i32 {
            unsafe { bbAbort(handle) }
        }

        fn get_serial_number(&self, handle: i32, serial: &mut u32) -> i32 {
            unsafe { bbGetSerialNumber(handle, serial) }
        }

        fn get_device_type(&self, handle: i32, device_type: &mut i32) -> i32 {
            unsafe { bbGetDeviceType(handle, device_type) }
        }

        fn configure_iq_center(&self, handle: i32, center: f64) -> i32 {
            unsafe { bbConfigureIQCenter(handle, center) }
        }

        fn configure_ref_level(&self, handle: i32, reflevel: f64) -> i32 {
            unsafe { bbConfigureRefLevel(handle, reflevel) }
        }

        fn configure_iq(&self, handle: i32, decimation: i32, bandwidth: f64) -> i32 {
            unsafe { bbConfigureIQ(handle, decimation, bandwidth) }
        }

        fn configure_iq_data_type(&self, handle: i32, data_type: i32) -> i32 {
            unsafe { bbConfigureIQDataType(handle, data_type) }
        }

        fn initiate(&self, handle: i32, mode: u32, flag: u32) -> i32 {
            unsafe { bbInitiate(handle, mode, flag) }
        }

        fn query_iq_parameters(&self, handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32 {
            unsafe { bbQueryIQParameters(handle, sample_rate, bandwidth) }
        }

        fn get_iq_unpacked(&self, handle: i32, buf: &mut [Complex32], purge: bool) -> i32 {
            unsafe {
                bbGetIQUnpacked(
                    handle,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len() as c_int,
                    ptr::null_mut(),
                    0,
                    if purge { BB_TRUE } else { BB_FALSE },
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            }
        }
    }
}

/// Serial numbers of all BB60 units attached to this host.
#[cfg(feature = "bb")]
pub fn list_devices() -> Result<Vec<u32>> {
    list_devices_with(&BbLib)
}

pub fn list_devices_with<A: BbApi>(api: &A) -> Result<Vec<u32>> {
    let mut serials = [0i32; BB_MAX_DEVICES];
    let mut count = 0;
    check::<A>(
        "bbGetSerialNumberList",
        api.get_serial_number_list(&mut serials, &mut count),
    )?;
    let count = (count.max(0) as usize).min(BB_MAX_DEVICES);
    Ok(serials[..count].iter().map(|&s| s as u32).collect())
}

/// Opened BB60 handle.
pub struct BbDevice<A: BbApi> {
    api: A,
    handle: i32,
    info: DeviceInfo,
    open: bool,
}

#[cfg(feature = "bb")]
impl BbDevice<BbLib> {
    pub fn open(serial: Option<u32>) -> Result<Self> {
        Self::open_with(BbLib, serial)
    }
}

impl<A: BbApi> BbDevice<A> {
    pub fn open_with(api: A, serial: Option<u32>) -> Result<Self> {
        let api_version = api.api_version();
        log::info!("BB60 API version: {}", api_version);

        let mut handle = -1;
        let (call, r) = match serial {
            Some(s) => (
                "bbOpenDeviceBySerialNumber",
                api.open_device_by_serial_number(&mut handle, s as i32),
            ),
            None => ("bbOpenDevice", api.open_device(&mut handle)),
        };
        check::<A>(call, r)?;

        let mut dev = Self {
            api,
            handle,
            info: DeviceInfo {
                family: Family::Bb60,
                serial: 0,
                api_version,
                model: None,
            },
            open: true,
        };

        let mut sn = 0;
        let r = dev.api.get_serial_number(handle, &mut sn);
        if let Err(e) = check::<A>("bbGetSerialNumber", r) {
            dev.close();
            return Err(e);
        }
        dev.info.serial = sn;

        // Model lookup is informational only.
        let mut device_type = 0;
        let r = dev.api.get_device_type(handle, &mut device_type);
        if check::<A>("bbGetDeviceType", r).is_ok() {
            dev.info.model = Some(model_name(device_type).to_string());
        }
        log::info!("BB60 serial number: {}", sn);

        Ok(dev)
    }
}

impl<A: BbApi> Device for BbDevice<A> {
    type Config = BbConfig;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, cfg: &BbConfig) -> Result<()> {
        let (api, h) = (&self.api, self.handle);
        check::<A>("bbConfigureIQCenter", api.configure_iq_center(h, cfg.center))?;
        check::<A>("bbConfigureRefLevel", api.configure_ref_level(h, cfg.reflevel))?;
        check::<A>(
            "bbConfigureIQ",
            api.configure_iq(h, cfg.decimation, cfg.bandwidth),
        )?;
        check::<A>(
            "bbConfigureIQDataType",
            api.configure_iq_data_type(h, BB_DATA_TYPE_32FC),
        )?;

        check::<A>("bbInitiate", api.initiate(h, BB_STREAMING, BB_STREAM_IQ))?;

        let mut sample_rate = 0.0;
        let mut bandwidth = 0.0;
        check::<A>(
            "bbQueryIQParameters",
            api.query_iq_parameters(h, &mut sample_rate, &mut bandwidth),
        )?;
        log::info!(
            "BB60 I/Q streaming: sample rate {} S/s, actual bandwidth {} Hz",
            sample_rate,
            bandwidth
        );
        Ok(())
    }

    fn abort(&mut self) {
        if self.open {
            let _ = check::<A>("bbAbort", self.api.abort(self.handle));
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let _ = check::<A>("bbCloseDevice", self.api.close_device(self.handle));
        self.handle = -1;
    }
}

impl<A: BbApi> RxDevice for BbDevice<A> {
    fn read_iq(&mut self, buf: &mut [Complex32], purge: bool) -> Result<()> {
        i32::try_from(buf.len())
            .map_err(|_| Error::InvalidParam(format!("{} samples per read", buf.len())))?;
        check::<A>(
            "bbGetIQUnpacked",
            self.api.get_iq_unpacked(self.handle, buf, purge),
        )?;
        Ok(())
    }
}

impl<A: BbApi> Drop for BbDevice<A> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeSdk, FAKE_SERIAL};
    use crate::{FatalPolicy, Source, SourceAdapter};

    impl BbApi for FakeSdk<BbConfig> {
        fn api_version(&self) -> String {
            String::from("fake")
        }

        fn get_serial_number_list(&self, serials: &mut [i32], count: &mut i32) -> i32 {
            serials[0] = FAKE_SERIAL as i32;
            serials[1] = FAKE_SERIAL as i32 + 1;
            *count = 2;
            self.vendor("bbGetSerialNumberList")
        }

        fn open_device(&self, handle: &mut i32) -> i32 {
            *handle = 0;
            self.vendor("bbOpenDevice")
        }

        fn open_device_by_serial_number(&self, handle: &mut i32, _serial: i32) -> i32 {
            *handle = 0;
            self.vendor("bbOpenDeviceBySerialNumber")
        }

        fn close_device(&self, _handle: i32) -> i32 {
            self.vendor("bbCloseDevice")
        }

        fn abort(&self, _handle: i32) -> i32 {
            self.vendor("bbAbort")
        }

        fn get_serial_number(&self, _handle: i32, serial: &mut u32) -> i32 {
            *serial = FAKE_SERIAL;
            self.vendor("bbGetSerialNumber")
        }

        fn get_device_type(&self, _handle: i32, device_type: &mut i32) -> i32 {
            *device_type = 2;
            self.vendor("bbGetDeviceType")
        }

        fn configure_iq_center(&self, _handle: i32, _center: f64) -> i32 {
            self.vendor("bbConfigureIQCenter")
        }

        fn configure_ref_level(&self, _handle: i32, _reflevel: f64) -> i32 {
            self.vendor("bbConfigureRefLevel")
        }

        fn configure_iq(&self, _handle: i32, _decimation: i32, _bandwidth: f64) -> i32 {
            self.vendor("bbConfigureIQ")
        }

        fn configure_iq_data_type(&self, _handle: i32, _data_type: i32) -> i32 {
            self.vendor("bbConfigureIQDataType")
        }

        fn initiate(&self, _handle: i32, _mode: u32, _flag: u32) -> i32 {
            self.vendor("bbInitiate")
        }

        fn query_iq_parameters(&self, _handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32 {
            *sample_rate = 20.0e6;
            *bandwidth = 15.0e6;
            self.vendor("bbQueryIQParameters")
        }

        fn get_iq_unpacked(&self, _handle: i32, buf: &mut [Complex32], _purge: bool) -> i32 {
            self.fill_ramp(buf);
            self.vendor("bbGetIQUnpacked")
        }
    }

    const CONFIGURE_CALLS: [&str; 6] = [
        "bbConfigureIQCenter",
        "bbConfigureRefLevel",
        "bbConfigureIQ",
        "bbConfigureIQDataType",
        "bbInitiate",
        "bbQueryIQParameters",
    ];

    const OPEN_CALLS: usize = 3;

    #[test]
    fn test_bb_has_no_attenuator() {
        let mut cfg = BbConfig::default();
        assert!(matches!(
            cfg.apply(Param::Atten(2)),
            Err(Error::UnsupportedParam { param: "atten", .. })
        ));
        assert!(cfg.apply(Param::SwFilter(true)).is_err());
        cfg.apply(Param::Decimation(16)).unwrap();
        assert_eq!(cfg.decimation, 16);
    }

    #[test]
    fn test_open_identifies_device() {
        let sdk = FakeSdk::<BbConfig>::new();
        let dev = BbDevice::open_with(sdk.clone(), None).unwrap();
        assert_eq!(dev.info().serial, FAKE_SERIAL);
        assert_eq!(dev.info().model.as_deref(), Some("BB60C"));
        assert_eq!(
            sdk.vendor_calls(),
            vec!["bbOpenDevice", "bbGetSerialNumber", "bbGetDeviceType"]
        );
    }

    #[test]
    fn test_device_type_failure_is_not_fatal() {
        let sdk = FakeSdk::<BbConfig>::new();
        sdk.set_status("bbGetDeviceType", -5);
        let dev = BbDevice::open_with(sdk.clone(), Some(FAKE_SERIAL)).unwrap();
        assert_eq!(dev.info().model, None);
        assert_eq!(sdk.vendor_calls()[0], "bbOpenDeviceBySerialNumber");
    }

    #[test]
    fn test_configure_order() {
        let sdk = FakeSdk::<BbConfig>::new();
        let mut dev = BbDevice::open_with(sdk.clone(), None).unwrap();
        dev.configure(&BbConfig::default()).unwrap();
        assert_eq!(sdk.vendor_calls()[OPEN_CALLS..], CONFIGURE_CALLS);
    }

    #[test]
    fn test_configure_failure_skips_remaining_calls() {
        for k in 0..CONFIGURE_CALLS.len() {
            let sdk = FakeSdk::<BbConfig>::new();
            let mut dev = BbDevice::open_with(sdk.clone(), None).unwrap();
            sdk.set_status(CONFIGURE_CALLS[k], -3);
            assert!(dev.configure(&BbConfig::default()).is_err());
            assert_eq!(sdk.vendor_calls()[OPEN_CALLS..], CONFIGURE_CALLS[..=k]);
        }
    }

    #[test]
    fn test_list_devices() {
        let sdk = FakeSdk::<BbConfig>::new();
        assert_eq!(
            list_devices_with(&sdk).unwrap(),
            vec![FAKE_SERIAL, FAKE_SERIAL + 1]
        );
    }

    #[test]
    fn test_block_stays_halted_after_initiate_failure() {
        let sdk = FakeSdk::<BbConfig>::new();
        let dev = BbDevice::open_with(sdk.clone(), None).unwrap();
        let mut block =
            SourceAdapter::new(dev, BbConfig::default(), false).with_policy(FatalPolicy::Propagate);
        sdk.set_status("bbInitiate", -9);

        let mut out = vec![Complex32::default(); 32];
        assert!(block.work(&mut out).is_err());
        sdk.set_status("bbInitiate", 0);
        assert!(block.work(&mut out).is_err());
        drop(block);

        let calls = sdk.vendor_calls();
        assert_eq!(calls.iter().filter(|c| **c == "bbInitiate").count(), 1);
        assert!(!calls.contains(&"bbQueryIQParameters"));
        assert!(!calls.contains(&"bbGetIQUnpacked"));
        assert_eq!(calls.iter().filter(|c| **c == "bbCloseDevice").count(), 1);
    }
}

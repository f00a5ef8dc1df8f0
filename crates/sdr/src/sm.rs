// Copyright 2025-2026 CEMAXECUTER LLC

//! SM200 / SM435 spectrum analyzers (`sm_api`).

use num_complex::Complex32;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::status::{check, StatusText};
use crate::{Controls, Device, DeviceConfig, DeviceInfo, Family, Param, RxDevice};

/// I/Q streaming configuration of an SM200/SM435.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmConfig {
    pub center: f64,
    pub reflevel: f64,
    pub atten: i32,
    pub decimation: i32,
    pub swfilter: bool,
    pub bandwidth: f64,
}

impl Default for SmConfig {
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

impl DeviceConfig for SmConfig {
    const FAMILY: Family = Family::Sm200;

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

impl Controls<SmConfig> {
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

/// Model name for an `SmDeviceType` value.
pub fn model_name(device_type: i32) -> &'static str {
    match device_type {
        0 => "SM200A",
        1 => "SM200B",
        2 => "SM200C",
        3 => "SM435B",
        4 => "SM435C",
        _ => "unknown SM",
    }
}

const SM_MAX_DEVICES: usize = 9;
const SM_DATA_TYPE_32FC: i32 = 0;
const SM_MODE_IQ_STREAMING: i32 = 3;

/// `sm_api` entry points an [`SmDevice`] drives.
pub trait SmApi: StatusText + Send {
    fn api_version(&self) -> String;
    fn get_device_list(&self, serials: &mut [i32], count: &mut i32) -> i32;
    fn open_device(&self, handle: &mut i32) -> i32;
    fn open_device_by_serial(&self, handle: &mut i32, serial: i32) -> i32;
    fn close_device(&self, handle: i32) -> i32;
    fn abort(&self, handle: i32) -> i32;
    fn get_device_info(&self, handle: i32, device_type: &mut i32, serial: &mut i32) -> i32;
    fn set_iq_data_type(&self, handle: i32, data_type: i32) -> i32;
    fn set_iq_center_freq(&self, handle: i32, center: f64) -> i32;
    fn set_iq_sample_rate(&self, handle: i32, decimation: i32) -> i32;
    fn set_ref_level(&self, handle: i32, reflevel: f64) -> i32;
    fn set_attenuator(&self, handle: i32, atten: i32) -> i32;
    fn set_iq_bandwidth(&self, handle: i32, swfilter: bool, bandwidth: f64) -> i32;
    fn configure(&self, handle: i32, mode: i32) -> i32;
    fn get_iq_parameters(&self, handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32;
    fn get_iq(&self, handle: i32, buf: &mut [Complex32], purge: bool) -> i32;
}

#[cfg(feature = "sm")]
pub use ffi::SmLib;

#[cfg(feature = "sm")]
mod ffi {
    use std::os::raw::{c_char, c_int, c_void};
    use std::ptr;

    use num_complex::Complex32;

    use super::SmApi;
    use crate::status::{c_string, StatusText};
    use crate::Family;

    type SmStatus = c_int;

    const SM_FALSE: c_int = 0;
    const SM_TRUE: c_int = 1;

    extern "C" {
        fn smGetDeviceList(serials: *mut c_int, device_count: *mut c_int) -> SmStatus;
        fn smOpenDevice(device: *mut c_int) -> SmStatus;
        fn smOpenDeviceBySerial(device: *mut c_int, serial_number: c_int) -> SmStatus;
        fn smCloseDevice(device: c_int) -> SmStatus;
        fn smAbort(device: c_int) -> SmStatus;
        fn smGetDeviceInfo(device: c_int, device_type: *mut c_int, serial_number: *mut c_int) -> SmStatus;
        fn smSetIQDataType(device: c_int, data_type: c_int) -> SmStatus;
        fn smSetIQCenterFreq(device: c_int, center_freq_hz: f64) -> SmStatus;
        fn smSetIQSampleRate(device: c_int, decimation: c_int) -> SmStatus;
        fn smSetRefLevel(device: c_int, ref_level: f64) -> SmStatus;
        fn smSetAttenuator(device: c_int, atten: c_int) -> SmStatus;
        fn smSetIQBandwidth(device: c_int, enable_software_filter: c_int, bandwidth: f64) -> SmStatus;
        fn smConfigure(device: c_int, mode: c_int) -> SmStatus;
        fn smGetIQParameters(device: c_int, sample_rate: *mut f64, bandwidth: *mut f64) -> SmStatus;
        fn smGetIQ(
            device: c_int,
            iq_buf: *mut c_void,
            iq_buf_size: c_int,
            triggers: *mut f64,
            trigger_buf_size: c_int,
            ns_since_epoch: *mut i64,
            purge: c_int,
            sample_loss: *mut c_int,
            samples_remaining: *mut c_int,
        ) -> SmStatus;
        fn smGetErrorString(status: SmStatus) -> *const c_char;
        fn smGetAPIVersion() -> *const c_char;
    }

    fn sm_bool(v: bool) -> c_int {
        if v {
            SM_TRUE
        } else {
            SM_FALSE
        }
    }

    /// The linked `sm_api` library.
    pub struct SmLib;

    impl StatusText for SmLib {
        const FAMILY: Family = Family::Sm200;

        fn describe(code: i32) -> String {
            unsafe { c_string(smGetErrorString(code)) }
        }
    }

    impl SmApi for SmLib {
        fn api_version(&self) -> String {
            unsafe { c_string(smGetAPIVersion()) }
        }

        fn get_device_list(&self, serials: &mut [i32], count: &mut i32) -> i32 {
            unsafe { smGetDeviceList(serials.as_mut_ptr(), count) }
        }

        fn open_device(&self, handle: &mut i32) -> i32 {
            unsafe { smOpenDevice(handle) }
        }

        fn open_device_by_serial(&self, handle: &mut i32, serial: i32) -> i32 {
            unsafe { smOpenDeviceBySerial(handle, serial) }
        }

        fn close_device(&self, handle: i32) -> i32 {
            unsafe { smCloseDevice(handle) }
        }

        fn abort(&self, handle: i32) -> i32 {
            unsafe { smAbort(handle) }
        }

        fn get_device_info(&self, handle: i32, device_type: &mut i32, serial: &mut i32) -> i32 {
            unsafe { smGetDeviceInfo(handle, device_type, serial) }
        }

        fn set_iq_data_type(&self, handle: i32, data_type: i32) -> i32 {
            unsafe { smSetIQDataType(handle, data_type) }
        }

        fn set_iq_center_freq(&self, handle: i32, center: f64) -> i32 {
            unsafe { smSetIQCenterFreq(handle, center) }
        }

        fn set_iq_sample_rate(&self, handle: i32, decimation: i32) -> i32 {
            unsafe { smSetIQSampleRate(handle, decimation) }
        }

        fn set_ref_level(&self, handle: i32, reflevel: f64) -> i32 {
            unsafe { smSetRefLevel(handle, reflevel) }
        }

        fn set_attenuator(&self, handle: i32, atten: i32) -> i32 {
            unsafe { smSetAttenuator(handle, atten) }
        }

        fn set_iq_bandwidth(&self, handle: i32, swfilter: bool, bandwidth: f64) -> i32 {
            unsafe { smSetIQBandwidth(handle, sm_bool(swfilter), bandwidth) }
        }

        fn configure(&self, handle: i32, mode: i32) -> i32 {
            unsafe { smConfigure(handle, mode) }
        }

        fn get_iq_parameters(&self, handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32 {
            unsafe { smGetIQParameters(handle, sample_rate, bandwidth) }
        }

        fn get_iq(&self, handle: i32, buf: &mut [Complex32], purge: bool) -> i32 {
            unsafe {
                smGetIQ(
                    handle,
                    buf.as_mut_ptr() as *mut c_void,
                    buf.len() as c_int,
                    ptr::null_mut(),
                    0,
                    ptr::null_mut(),
                    sm_bool(purge),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            }
        }
    }
}

/// Serial numbers of all SM units attached to this host.
#[cfg(feature = "sm")]
pub fn list_devices() -> Result<Vec<u32>> {
    list_devices_with(&SmLib)
}

pub fn list_devices_with<A: SmApi>(api: &A) -> Result<Vec<u32>> {
    let mut serials = [0i32; SM_MAX_DEVICES];
    let mut count = SM_MAX_DEVICES as i32;
    check::<A>("smGetDeviceList", api.get_device_list(&mut serials, &mut count))?;
    let count = (count.max(0) as usize).min(SM_MAX_DEVICES);
    Ok(serials[..count].iter().map(|&s| s as u32).collect())
}

/// Opened SM200/SM435 handle.
pub struct SmDevice<A: SmApi> {
    api: A,
    handle: i32,
    info: DeviceInfo,
    open: bool,
}

#[cfg(feature = "sm")]
impl SmDevice<SmLib> {
    pub fn open(serial: Option<u32>) -> Result<Self> {
        Self::open_with(SmLib, serial)
    }
}

impl<A: SmApi> SmDevice<A> {
    pub fn open_with(api: A, serial: Option<u32>) -> Result<Self> {
        let api_version = api.api_version();
        log::info!("SM API version: {}", api_version);

        let mut handle = -1;
        let (call, r) = match serial {
            Some(s) => (
                "smOpenDeviceBySerial",
                api.open_device_by_serial(&mut handle, s as i32),
            ),
            None => ("smOpenDevice", api.open_device(&mut handle)),
        };
        check::<A>(call, r)?;

        let mut dev = Self {
            api,
            handle,
            info: DeviceInfo {
                family: Family::Sm200,
                serial: 0,
                api_version,
                model: None,
            },
            open: true,
        };

        let mut device_type = -1;
        let mut sn = 0;
        let r = dev.api.get_device_info(handle, &mut device_type, &mut sn);
        if let Err(e) = check::<A>("smGetDeviceInfo", r) {
            dev.close();
            return Err(e);
        }
        let model = model_name(device_type);
        dev.info.serial = sn as u32;
        dev.info.model = Some(model.to_string());
        log::info!("{} serial number: {}", model, sn);

        Ok(dev)
    }
}

impl<A: SmApi> Device for SmDevice<A> {
    type Config = SmConfig;

    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn configure(&mut self, cfg: &SmConfig) -> Result<()> {
        let (api, h) = (&self.api, self.handle);
        check::<A>("smSetIQDataType", api.set_iq_data_type(h, SM_DATA_TYPE_32FC))?;
        check::<A>("smSetIQCenterFreq", api.set_iq_center_freq(h, cfg.center))?;
        check::<A>("smSetIQSampleRate", api.set_iq_sample_rate(h, cfg.decimation))?;
        check::<A>("smSetRefLevel", api.set_ref_level(h, cfg.reflevel))?;
        check::<A>("smSetAttenuator", api.set_attenuator(h, cfg.atten))?;
        check::<A>(
            "smSetIQBandwidth",
            api.set_iq_bandwidth(h, cfg.swfilter, cfg.bandwidth),
        )?;

        check::<A>("smConfigure", api.configure(h, SM_MODE_IQ_STREAMING))?;

        let mut sample_rate = 0.0;
        let mut bandwidth = 0.0;
        check::<A>(
            "smGetIQParameters",
            api.get_iq_parameters(h, &mut sample_rate, &mut bandwidth),
        )?;
        log::info!(
            "SM I/Q streaming: sample rate {} S/s, actual bandwidth {} Hz",
            sample_rate,
            bandwidth
        );
        Ok(())
    }

    fn abort(&mut self) {
        if self.open {
            let _ = check::<A>("smAbort", self.api.abort(self.handle));
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let _ = check::<A>("smCloseDevice", self.api.close_device(self.handle));
        self.handle = -1;
    }
}

impl<A: SmApi> RxDevice for SmDevice<A> {
    fn read_iq(&mut self, buf: &mut [Complex32], purge: bool) -> Result<()> {
        i32::try_from(buf.len())
            .map_err(|_| Error::InvalidParam(format!("{} samples per read", buf.len())))?;
        check::<A>("smGetIQ", self.api.get_iq(self.handle, buf, purge))?;
        Ok(())
    }
}

impl<A: SmApi> Drop for SmDevice<A> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeSdk, FAKE_SERIAL};

    /// SM435B on the fake bus.
    const FAKE_TYPE: i32 = 3;

    impl SmApi for FakeSdk<SmConfig> {
        fn api_version(&self) -> String {
            String::from("fake")
        }

        fn get_device_list(&self, serials: &mut [i32], count: &mut i32) -> i32 {
            serials[0] = FAKE_SERIAL as i32;
            *count = 1;
            self.vendor("smGetDeviceList")
        }

        fn open_device(&self, handle: &mut i32) -> i32 {
            *handle = 0;
            self.vendor("smOpenDevice")
        }

        fn open_device_by_serial(&self, handle: &mut i32, _serial: i32) -> i32 {
            *handle = 0;
            self.vendor("smOpenDeviceBySerial")
        }

        fn close_device(&self, _handle: i32) -> i32 {
            self.vendor("smCloseDevice")
        }

        fn abort(&self, _handle: i32) -> i32 {
            self.vendor("smAbort")
        }

        fn get_device_info(&self, _handle: i32, device_type: &mut i32, serial: &mut i32) -> i32 {
            *device_type = FAKE_TYPE;
            *serial = FAKE_SERIAL as i32;
            self.vendor("smGetDeviceInfo")
        }

        fn set_iq_data_type(&self, _handle: i32, _data_type: i32) -> i32 {
            self.vendor("smSetIQDataType")
        }

        fn set_iq_center_freq(&self, _handle: i32, _center: f64) -> i32 {
            self.vendor("smSetIQCenterFreq")
        }

        fn set_iq_sample_rate(&self, _handle: i32, _decimation: i32) -> i32 {
            self.vendor("smSetIQSampleRate")
        }

        fn set_ref_level(&self, _handle: i32, _reflevel: f64) -> i32 {
            self.vendor("smSetRefLevel")
        }

        fn set_attenuator(&self, _handle: i32, _atten: i32) -> i32 {
            self.vendor("smSetAttenuator")
        }

        fn set_iq_bandwidth(&self, _handle: i32, _swfilter: bool, _bandwidth: f64) -> i32 {
            self.vendor("smSetIQBandwidth")
        }

        fn configure(&self, _handle: i32, _mode: i32) -> i32 {
            self.vendor("smConfigure")
        }

        fn get_iq_parameters(&self, _handle: i32, sample_rate: &mut f64, bandwidth: &mut f64) -> i32 {
            *sample_rate = 50.0e6;
            *bandwidth = 40.0e6;
            self.vendor("smGetIQParameters")
        }

        fn get_iq(&self, _handle: i32, buf: &mut [Complex32], _purge: bool) -> i32 {
            self.fill_ramp(buf);
            self.vendor("smGetIQ")
        }
    }

    const CONFIGURE_CALLS: [&str; 8] = [
        "smSetIQDataType",
        "smSetIQCenterFreq",
        "smSetIQSampleRate",
        "smSetRefLevel",
        "smSetAttenuator",
        "smSetIQBandwidth",
        "smConfigure",
        "smGetIQParameters",
    ];

    #[test]
    fn test_model_names() {
        assert_eq!(model_name(0), "SM200A");
        assert_eq!(model_name(4), "SM435C");
        assert_eq!(model_name(42), "unknown SM");
    }

    #[test]
    fn test_controls_setters_mark_dirty() {
        let controls = Controls::new(SmConfig::default(), false);
        controls.lock().dirty = false;
        controls.set_swfilter(false);
        assert!(controls.is_dirty());
        assert!(!controls.snapshot().swfilter);
    }

    #[test]
    fn test_open_reports_model() {
        let sdk = FakeSdk::<SmConfig>::new();
        let dev = SmDevice::open_with(sdk.clone(), None).unwrap();
        assert_eq!(dev.info().model.as_deref(), Some("SM435B"));
        assert_eq!(dev.info().serial, FAKE_SERIAL);
        assert_eq!(sdk.vendor_calls(), vec!["smOpenDevice", "smGetDeviceInfo"]);
    }

    #[test]
    fn test_device_info_error_closes_handle() {
        let sdk = FakeSdk::<SmConfig>::new();
        sdk.set_status("smGetDeviceInfo", -2);
        assert!(SmDevice::open_with(sdk.clone(), None).is_err());
        assert_eq!(
            sdk.vendor_calls(),
            vec!["smOpenDevice", "smGetDeviceInfo", "smCloseDevice"]
        );
    }

    #[test]
    fn test_configure_sequence_and_short_circuit() {
        let sdk = FakeSdk::<SmConfig>::new();
        let mut dev = SmDevice::open_with(sdk.clone(), Some(FAKE_SERIAL)).unwrap();
        dev.configure(&SmConfig::default()).unwrap();
        assert_eq!(sdk.vendor_calls()[2..], CONFIGURE_CALLS);

        for k in 0..CONFIGURE_CALLS.len() {
            let sdk = FakeSdk::<SmConfig>::new();
            let mut dev = SmDevice::open_with(sdk.clone(), None).unwrap();
            sdk.set_status(CONFIGURE_CALLS[k], -1);
            let err = dev.configure(&SmConfig::default()).unwrap_err();
            assert!(matches!(err, Error::Fatal { call, .. } if call == CONFIGURE_CALLS[k]));
            assert_eq!(sdk.vendor_calls()[2..], CONFIGURE_CALLS[..=k]);
        }
    }

    #[test]
    fn test_read_error_is_fatal() {
        let sdk = FakeSdk::<SmConfig>::new();
        let mut dev = SmDevice::open_with(sdk.clone(), None).unwrap();
        let mut buf = vec![Complex32::default(); 8];
        dev.read_iq(&mut buf, true).unwrap();
        assert_eq!(buf[7], FakeSdk::<SmConfig>::sample(7));

        sdk.set_status("smGetIQ", -101);
        assert!(matches!(
            dev.read_iq(&mut buf, false),
            Err(Error::Fatal { call: "smGetIQ", code: -101, .. })
        ));
    }
}

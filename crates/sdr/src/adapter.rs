// Copyright 2025-2026 CEMAXECUTER LLC

//! Generic source and sink blocks.
//!
//! A block owns one opened device, the shared pending configuration and
//! (for sources) a sample buffer. Each `work` call:
//!
//! 1. pushes the pending configuration if a setter touched it since the
//!    last call (under the settings lock),
//! 2. sizes the buffer to the requested item count,
//! 3. performs exactly one blocking vendor transfer with no lock held,
//! 4. reports the full item count.
//!
//! Dropping the block aborts and then closes the device, once.

use serde::Deserialize;

use crate::buffer::SampleBuffer;
use crate::error::{Error, Result};
use crate::settings::Controls;
use crate::{Complex32, Device, DeviceConfig, DeviceInfo, Family, RxDevice, Sink, Source, TxDevice};

/// What a block does when the vendor API reports an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// Return the error to the host and refuse further work.
    #[default]
    Propagate,
    /// Log and terminate the process.
    Abort,
}

struct Core<D: Device> {
    device: D,
    controls: Controls<D::Config>,
    policy: FatalPolicy,
    halted: bool,
    configures: u64,
}

impl<D: Device> Core<D> {
    fn new(device: D, config: D::Config, purge: bool) -> Self {
        let info = device.info();
        log::info!(
            "{} block on serial {} (API {}{})",
            info.family,
            info.serial,
            info.api_version,
            info.model
                .as_deref()
                .map(|m| format!(", {}", m))
                .unwrap_or_default()
        );
        Self {
            device,
            controls: Controls::new(config, purge),
            policy: FatalPolicy::default(),
            halted: false,
            configures: 0,
        }
    }

    fn family() -> Family {
        <D::Config as DeviceConfig>::FAMILY
    }

    /// Push the pending set if dirty. Returns the purge flag for this step.
    fn apply_pending(&mut self) -> Result<bool> {
        if self.halted {
            return Err(Error::Halted(Self::family()));
        }

        let result = {
            let mut pending = self.controls.lock();
            if pending.dirty {
                match self.device.configure(&pending.config) {
                    Ok(()) => {
                        pending.dirty = false;
                        self.configures += 1;
                        Ok(pending.purge)
                    }
                    Err(e) => Err(e),
                }
            } else {
                Ok(pending.purge)
            }
        };
        result.map_err(|e| self.fail(e))
    }

    /// Enter the halted state. No further configure or transfer calls
    /// reach the device after this.
    fn fail(&mut self, err: Error) -> Error {
        self.halted = true;
        log::error!("{} halted: {}", Self::family(), err);
        if self.policy == FatalPolicy::Abort {
            log::error!("{} fatal policy is abort, terminating", Self::family());
            std::process::abort();
        }
        err
    }
}

impl<D: Device> Drop for Core<D> {
    fn drop(&mut self) {
        self.device.abort();
        self.device.close();
        log::info!("{} device closed", Self::family());
    }
}

/// Receiver block producing complex samples.
pub struct SourceAdapter<D: RxDevice> {
    core: Core<D>,
    buffer: SampleBuffer,
}

impl<D: RxDevice> SourceAdapter<D> {
    pub fn new(device: D, config: D::Config, purge: bool) -> Self {
        Self {
            core: Core::new(device, config, purge),
            buffer: SampleBuffer::new(),
        }
    }

    pub fn with_policy(mut self, policy: FatalPolicy) -> Self {
        self.core.policy = policy;
        self
    }

    /// Handle for changing parameters from other threads.
    pub fn controls(&self) -> Controls<D::Config> {
        self.core.controls.clone()
    }

    pub fn info(&self) -> &DeviceInfo {
        self.core.device.info()
    }

    /// Number of configuration pushes so far.
    pub fn configure_count(&self) -> u64 {
        self.core.configures
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn is_halted(&self) -> bool {
        self.core.halted
    }
}

impl<D: RxDevice> Source for SourceAdapter<D> {
    fn work(&mut self, output: &mut [Complex32]) -> Result<usize> {
        let purge = self.core.apply_pending()?;

        let n = output.len();
        self.buffer.ensure_len(n);
        if n == 0 {
            return Ok(0);
        }

        if let Err(e) = self.core.device.read_iq(self.buffer.as_mut_slice(), purge) {
            return Err(self.core.fail(e));
        }
        output.copy_from_slice(self.buffer.as_slice());
        Ok(n)
    }
}

/// Generator block consuming complex samples.
pub struct SinkAdapter<D: TxDevice> {
    core: Core<D>,
}

impl<D: TxDevice> SinkAdapter<D> {
    pub fn new(device: D, config: D::Config) -> Self {
        Self {
            core: Core::new(device, config, false),
        }
    }

    pub fn with_policy(mut self, policy: FatalPolicy) -> Self {
        self.core.policy = policy;
        self
    }

    pub fn controls(&self) -> Controls<D::Config> {
        self.core.controls.clone()
    }

    pub fn info(&self) -> &DeviceInfo {
        self.core.device.info()
    }

    pub fn configure_count(&self) -> u64 {
        self.core.configures
    }

    pub fn is_halted(&self) -> bool {
        self.core.halted
    }
}

impl<D: TxDevice> Sink for SinkAdapter<D> {
    fn work(&mut self, input: &[Complex32]) -> Result<usize> {
        self.core.apply_pending()?;
        if input.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.core.device.submit_iq(input) {
            return Err(self.core.fail(e));
        }
        Ok(input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeCall, FakeSdk};
    use crate::sm::SmConfig;
    use crate::vsg::VsgConfig;
    use crate::Param;

    fn source() -> (FakeSdk<SmConfig>, SourceAdapter<crate::fake::FakeDevice<SmConfig>>) {
        let sdk = FakeSdk::new();
        let dev = sdk.open().unwrap();
        (sdk.clone(), SourceAdapter::new(dev, SmConfig::default(), false))
    }

    fn sink() -> (FakeSdk<VsgConfig>, SinkAdapter<crate::fake::FakeDevice<VsgConfig>>) {
        let sdk = FakeSdk::new();
        let dev = sdk.open().unwrap();
        (sdk.clone(), SinkAdapter::new(dev, VsgConfig::default()))
    }

    #[test]
    fn test_configures_before_first_transfer() {
        let (sdk, mut block) = source();
        let mut out = vec![Complex32::default(); 16];
        block.work(&mut out).unwrap();

        let calls = sdk.calls();
        let configure = calls.iter().position(|c| *c == FakeCall::Configure).unwrap();
        let read = calls
            .iter()
            .position(|c| matches!(c, FakeCall::ReadIq { .. }))
            .unwrap();
        assert!(configure < read);
        assert_eq!(block.configure_count(), 1);
    }

    #[test]
    fn test_configure_at_most_once_per_step() {
        let (sdk, mut block) = source();
        let controls = block.controls();
        let mut out = vec![Complex32::default(); 8];

        block.work(&mut out).unwrap();
        block.work(&mut out).unwrap();
        assert_eq!(sdk.count(&FakeCall::Configure), 1);

        controls.set_center(2.0e9);
        controls.set_reflevel(-30.0);
        controls.set_atten(4);
        block.work(&mut out).unwrap();
        assert_eq!(sdk.count(&FakeCall::Configure), 2);

        block.work(&mut out).unwrap();
        assert_eq!(sdk.count(&FakeCall::Configure), 2);
    }

    #[test]
    fn test_configure_sees_last_write_per_field() {
        let (sdk, mut block) = source();
        let controls = block.controls();
        let mut out = vec![Complex32::default(); 4];
        block.work(&mut out).unwrap();

        controls.set_center(1.0e9);
        controls.set_decimation(2);
        controls.set_center(1.5e9);
        controls.set_bandwidth(5.0e6);
        controls.set_decimation(8);
        controls.set_swfilter(false);
        block.work(&mut out).unwrap();

        let configs = sdk.configs();
        assert_eq!(configs.len(), 2);
        let last = &configs[1];
        assert_eq!(last.center, 1.5e9);
        assert_eq!(last.decimation, 8);
        assert_eq!(last.bandwidth, 5.0e6);
        assert!(!last.swfilter);
        assert_eq!(last.reflevel, SmConfig::default().reflevel);
    }

    #[test]
    fn test_items_copied_in_order() {
        let (_sdk, mut block) = source();
        let mut produced = 0u64;
        for n in [0usize, 1, 1024, 65536] {
            let mut out = vec![Complex32::default(); n];
            assert_eq!(block.work(&mut out).unwrap(), n);
            for (i, s) in out.iter().enumerate() {
                assert_eq!(*s, FakeSdk::<SmConfig>::sample(produced + i as u64));
            }
            produced += n as u64;
        }
    }

    #[test]
    fn test_buffer_resized_only_when_count_changes() {
        let (sdk, mut block) = source();
        for n in [1024usize, 1024, 65536, 65536, 1, 1024] {
            let mut out = vec![Complex32::default(); n];
            block.work(&mut out).unwrap();
        }
        assert_eq!(block.buffer().reallocations(), 4);
        assert_eq!(block.buffer().len(), 1024);
        assert_eq!(sdk.count(&FakeCall::ReadIq { len: 1024, purge: false }), 3);
    }

    #[test]
    fn test_zero_items_skips_transfer() {
        let (sdk, mut block) = source();
        let mut out: Vec<Complex32> = Vec::new();
        assert_eq!(block.work(&mut out).unwrap(), 0);
        assert_eq!(sdk.count(&FakeCall::Configure), 1);
        assert!(!sdk
            .calls()
            .iter()
            .any(|c| matches!(c, FakeCall::ReadIq { .. })));
    }

    #[test]
    fn test_purge_reaches_read_without_reconfigure() {
        let (sdk, mut block) = source();
        let controls = block.controls();
        let mut out = vec![Complex32::default(); 32];
        block.work(&mut out).unwrap();

        controls.set(Param::Purge(true)).unwrap();
        block.work(&mut out).unwrap();

        assert_eq!(sdk.count(&FakeCall::Configure), 1);
        assert_eq!(sdk.count(&FakeCall::ReadIq { len: 32, purge: true }), 1);
    }

    #[test]
    fn test_warning_does_not_interrupt() {
        let (sdk, mut block) = source();
        sdk.set_status("configure", 1);
        sdk.set_status("read_iq", 3);

        let mut out = vec![Complex32::default(); 1024];
        assert_eq!(block.work(&mut out).unwrap(), 1024);
        assert_eq!(out[1023], FakeSdk::<SmConfig>::sample(1023));
        assert!(!block.is_halted());
    }

    #[test]
    fn test_read_error_halts_once() {
        let (sdk, mut block) = source();
        let mut out = vec![Complex32::default(); 64];
        block.work(&mut out).unwrap();

        sdk.set_status("read_iq", -5);
        let err = block.work(&mut out).unwrap_err();
        assert!(matches!(err, Error::Fatal { code: -5, .. }));
        assert!(block.is_halted());
        let after_fatal = sdk.calls().len();

        block.controls().set_center(3.0e9);
        assert!(matches!(block.work(&mut out), Err(Error::Halted(Family::Sm200))));
        assert!(matches!(block.work(&mut out), Err(Error::Halted(_))));
        assert_eq!(sdk.calls().len(), after_fatal);
        assert_eq!(block.buffer().len(), 64);
    }

    #[test]
    fn test_configure_error_halts_before_transfer() {
        let (sdk, mut block) = source();
        sdk.set_status("configure", -9);

        let mut out = vec![Complex32::default(); 64];
        assert!(block.work(&mut out).unwrap_err().is_fatal());
        assert!(block.work(&mut out).is_err());

        assert_eq!(sdk.count(&FakeCall::Configure), 1);
        assert!(sdk.configs().is_empty());
        assert!(!sdk
            .calls()
            .iter()
            .any(|c| matches!(c, FakeCall::ReadIq { .. })));
    }

    #[test]
    fn test_drop_aborts_then_closes_once() {
        let (sdk, block) = source();
        drop(block);
        assert_eq!(
            sdk.calls(),
            vec![
                FakeCall::Open,
                FakeCall::GetSerial,
                FakeCall::Abort,
                FakeCall::Close
            ]
        );
    }

    #[test]
    fn test_drop_after_serial_warning() {
        let sdk = FakeSdk::<SmConfig>::new();
        sdk.set_status("serial", 2);
        let block = SourceAdapter::new(sdk.open().unwrap(), SmConfig::default(), false);
        drop(block);

        let calls = sdk.calls();
        assert_eq!(&calls[calls.len() - 2..], &[FakeCall::Abort, FakeCall::Close]);
        assert_eq!(sdk.count(&FakeCall::Abort), 1);
        assert_eq!(sdk.count(&FakeCall::Close), 1);
    }

    #[test]
    fn test_drop_after_fatal_still_releases_handle() {
        let (sdk, mut block) = source();
        sdk.set_status("read_iq", -6);
        let mut out = vec![Complex32::default(); 8];
        assert!(block.work(&mut out).is_err());
        drop(block);
        assert_eq!(sdk.count(&FakeCall::Abort), 1);
        assert_eq!(sdk.count(&FakeCall::Close), 1);
    }

    #[test]
    fn test_setter_during_transfer_defers_to_next_step() {
        let (sdk, mut block) = source();
        let controls = block.controls();
        let mut out = vec![Complex32::default(); 8];
        block.work(&mut out).unwrap();

        let setter = std::thread::spawn(move || controls.set_center(915.0e6));
        setter.join().unwrap();
        assert_eq!(sdk.configs().len(), 1);

        block.work(&mut out).unwrap();
        assert_eq!(sdk.configs()[1].center, 915.0e6);
    }

    #[test]
    fn test_sink_submits_input() {
        let (sdk, mut block) = sink();
        let input: Vec<Complex32> = (0..100).map(|i| Complex32::new(i as f32, 1.0)).collect();
        assert_eq!(block.work(&input).unwrap(), 100);
        assert_eq!(block.work(&[]).unwrap(), 0);
        assert_eq!(sdk.submitted(), input);
        assert_eq!(sdk.count(&FakeCall::Configure), 1);
        assert_eq!(sdk.count(&FakeCall::SubmitIq { len: 100 }), 1);
    }

    #[test]
    fn test_sink_offsets_reconfigure() {
        let (sdk, mut block) = sink();
        let controls = block.controls();
        block.work(&[Complex32::default(); 4]).unwrap();

        controls.set_ioffset(12);
        controls.set_qoffset(-7);
        block.work(&[Complex32::default(); 4]).unwrap();

        let configs = sdk.configs();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].ioffset, 12);
        assert_eq!(configs[1].qoffset, -7);
    }

    #[test]
    fn test_sink_error_halts() {
        let (sdk, mut block) = sink();
        sdk.set_status("submit_iq", -3);
        assert!(block.work(&[Complex32::default(); 4]).is_err());
        assert!(block.is_halted());
        let n = sdk.calls().len();
        assert!(block.work(&[Complex32::default(); 4]).is_err());
        assert_eq!(sdk.calls().len(), n);
    }
}

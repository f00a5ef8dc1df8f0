// Copyright 2025-2026 CEMAXECUTER LLC

//! Pending configuration shared between the streaming thread and any
//! control thread.
//!
//! One mutex guards the configuration set, the dirty flag and the purge
//! flag. Setters only mark the set dirty; the block pushes it to the device
//! at the start of its next work call, never in the middle of a transfer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::{DeviceConfig, Family, Param};

pub(crate) struct Pending<C> {
    pub(crate) config: C,
    /// In-memory set differs from what the device is running.
    pub(crate) dirty: bool,
    pub(crate) purge: bool,
}

/// Cloneable, thread-safe handle onto a block's pending configuration.
pub struct Controls<C> {
    inner: Arc<Mutex<Pending<C>>>,
}

impl<C> Clone for Controls<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: DeviceConfig> Controls<C> {
    /// Starts dirty so the first work call always configures the device.
    pub fn new(config: C, purge: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Pending {
                config,
                dirty: true,
                purge,
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Pending<C>> {
        // A panicking setter cannot leave the set half-written: every
        // mutation is a single field store.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one parameter. Purge takes effect on the next read without a
    /// reconfiguration; everything else marks the set dirty. Sinks never
    /// read, so purge is unsupported there.
    pub fn set(&self, param: Param) -> Result<()> {
        let mut pending = self.lock();
        match param {
            Param::Purge(_) if C::FAMILY.is_sink() => {
                return Err(param.unsupported(C::FAMILY));
            }
            Param::Purge(purge) => pending.purge = purge,
            other => {
                pending.config.apply(other)?;
                pending.dirty = true;
            }
        }
        log::debug!("{} {}", C::FAMILY, param);
        Ok(())
    }

    /// Mutate the set directly and mark it dirty.
    pub fn update(&self, f: impl FnOnce(&mut C)) {
        let mut pending = self.lock();
        f(&mut pending.config);
        pending.dirty = true;
    }

    pub fn set_purge(&self, purge: bool) -> Result<()> {
        self.set(Param::Purge(purge))
    }

    pub fn purge(&self) -> bool {
        self.lock().purge
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Copy of the current pending set.
    pub fn snapshot(&self) -> C {
        self.lock().config.clone()
    }
}

/// Family-agnostic view of [`Controls`], for control threads that do not
/// know which device they are driving.
pub trait Control: Send + Sync {
    fn family(&self) -> Family;
    fn set(&self, param: Param) -> Result<()>;
    /// Debug rendering of the pending set plus dirty and purge flags.
    fn describe(&self) -> String;
}

impl<C: DeviceConfig> Control for Controls<C> {
    fn family(&self) -> Family {
        C::FAMILY
    }

    fn set(&self, param: Param) -> Result<()> {
        Controls::set(self, param)
    }

    fn describe(&self) -> String {
        let pending = self.lock();
        format!(
            "{:?} dirty={} purge={}",
            pending.config, pending.dirty, pending.purge
        )
    }
}

//! Exactly-once publication of the hardware descriptor.
//!
//! [`DescriptorCell`] runs a detector at most once no matter how many
//! threads race on it. Losers block until the winner has published, then
//! read the same `&HardwareInfo`. The descriptor is fully built before it
//! is stored, so readers never observe a partial value.

use std::sync::OnceLock;

use crate::error::{HwInfoError, HwInfoResult};
use crate::types::HardwareInfo;

#[derive(Debug, Default)]
pub struct DescriptorCell {
    inner: OnceLock<HardwareInfo>,
}

impl DescriptorCell {
    pub const fn new() -> Self {
        Self { inner: OnceLock::new() }
    }

    /// Return the published descriptor, running `detect` first if nothing
    /// has been published yet.
    pub fn get_or_init<F>(&self, detect: F) -> &HardwareInfo
    where
        F: FnOnce() -> HardwareInfo,
    {
        self.inner.get_or_init(detect)
    }

    /// Like [`get_or_init`](Self::get_or_init), mapping an unsupported
    /// descriptor to [`HwInfoError::UnsupportedHardware`].
    pub fn initialize<F>(&self, detect: F) -> HwInfoResult<&HardwareInfo>
    where
        F: FnOnce() -> HardwareInfo,
    {
        let info = self.get_or_init(detect);
        if info.supported {
            Ok(info)
        } else {
            Err(HwInfoError::UnsupportedHardware)
        }
    }

    /// Publish a caller-built descriptor. Fails once anything is published.
    pub fn try_seed(&self, info: HardwareInfo) -> HwInfoResult<&HardwareInfo> {
        self.inner.set(info).map_err(|_| HwInfoError::AlreadyInitialized)?;
        self.inner.get().ok_or(HwInfoError::AlreadyInitialized)
    }

    #[inline]
    pub fn get(&self) -> Option<&HardwareInfo> {
        self.inner.get()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.inner.get().is_some()
    }
}

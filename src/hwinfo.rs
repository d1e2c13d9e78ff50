//! Process-wide hardware descriptor.
//!
//! ```ignore
//! match perfkern::initialize() {
//!     Ok(hw) => run_kernels(hw.blocking(), hw.simd_width()),
//!     Err(perfkern::HwInfoError::UnsupportedHardware) => use_reference_path(),
//!     Err(e) => return Err(e.into()),
//! }
//! ```

use crate::blocking::VectorFamily;
use crate::cache_topology::{self, CacheEnumerator, FixedCacheEnumerator};
use crate::config::DetectionConfig;
use crate::error::{HwInfoError, HwInfoResult};
use crate::gate::DescriptorCell;
use crate::isa::{self, IsaProbe};
use crate::types::{CacheHierarchy, HardwareInfo, IsaFeatures, Vendor};

static DESCRIPTOR: DescriptorCell = DescriptorCell::new();

// ── Pipeline ───────────────────────────────────────────────────────────

/// Run detection against explicit strategies.
///
/// Probes ISA support and cache topology, applies `config`, then derives
/// blocking parameters for `family`. Touches no global state.
pub fn detect_with<P, E>(vendor: Vendor, probe: &P, enumerator: &E, config: &DetectionConfig, family: VectorFamily) -> HardwareInfo
where
    P: IsaProbe + ?Sized,
    E: CacheEnumerator + ?Sized,
{
    let mut isa = probe.probe();
    log::debug!("ISA probe '{}': {}", probe.name(), isa);
    if !config.disabled_isa.is_empty() {
        isa = isa.without(config.disabled_isa);
        log::info!("ISA extensions disabled by configuration: {} (remaining: {isa})", config.disabled_isa);
    }

    let cache = if config.fixed_topology {
        log::info!("fixed cache topology forced by configuration");
        FixedCacheEnumerator.enumerate()
    } else {
        let cache = enumerator.enumerate();
        log::debug!("cache enumerator '{}' done", enumerator.name());
        cache
    };

    HardwareInfo::assemble(vendor, isa, cache, family)
}

/// Run the platform pipeline without publishing the result.
pub fn detect_uncached() -> HardwareInfo {
    let config = DetectionConfig::from_env().unwrap_or_else(|e| {
        log::warn!("{e}; ignoring detection overrides");
        DetectionConfig::default()
    });
    detect_with(
        platform_vendor(),
        &isa::platform_probe(),
        &cache_topology::platform_enumerator(),
        &config,
        VectorFamily::native(),
    )
}

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
fn platform_vendor() -> Vendor {
    crate::cpuid::read_vendor(&crate::cpuid::NativeCpuid)
}

#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
fn platform_vendor() -> Vendor {
    Vendor::Unknown
}

fn publish() -> HardwareInfo {
    let info = detect_uncached();
    log::info!("hardware: {info}");
    info
}

// ── Public lifecycle ───────────────────────────────────────────────────

/// Detect the hardware once per process and return the descriptor.
///
/// Safe to call from any number of threads; detection runs exactly once.
/// An unsupported verdict is final and returned to every caller as
/// [`HwInfoError::UnsupportedHardware`].
pub fn initialize() -> HwInfoResult<&'static HardwareInfo> {
    DESCRIPTOR.initialize(publish)
}

/// Publish a descriptor built from supplied ISA flags and cache topology
/// instead of probing. Blocking parameters and the verdict are derived
/// exactly as for a probed descriptor.
///
/// Fails with [`HwInfoError::AlreadyInitialized`] once a descriptor exists.
pub fn initialize_with(isa: IsaFeatures, cache: CacheHierarchy) -> HwInfoResult<&'static HardwareInfo> {
    if DESCRIPTOR.is_initialized() {
        return Err(HwInfoError::AlreadyInitialized);
    }
    let info = HardwareInfo::assemble(Vendor::Unknown, isa, cache, VectorFamily::native());
    let info = DESCRIPTOR.try_seed(info)?;
    log::info!("hardware (supplied): {info}");
    if info.supported {
        Ok(info)
    } else {
        Err(HwInfoError::UnsupportedHardware)
    }
}

/// Release library resources. The descriptor lives for the rest of the
/// process, so this always succeeds.
pub fn deinitialize() -> HwInfoResult<()> {
    Ok(())
}

pub fn is_initialized() -> bool {
    DESCRIPTOR.is_initialized()
}

/// The published descriptor, if [`initialize`] or [`initialize_with`] ran.
pub fn hardware_info() -> Option<&'static HardwareInfo> {
    DESCRIPTOR.get()
}

//! Instruction-set probing.
//!
//! Three interchangeable strategies answer the same question, which wide
//! vector extensions the process may execute:
//!
//! | Strategy | Used on | Mechanism |
//! |----------|---------|-----------|
//! | [`DirectProbe`] | x86 / x86_64 | CPUID feature bits gated on XCR0 |
//! | [`SandboxProbe`] | x86 with feature `sandbox` | code-validator acceptance |
//! | [`StaticProbe`] | every other target | fixed profile, no wide vectors |
//!
//! The platform strategy is chosen at compile time by [`platform_probe`].

pub mod direct;
pub mod fallback;
pub mod sandbox;

pub use direct::{decode_features, DirectProbe};
pub use fallback::StaticProbe;
pub use sandbox::{Capability, CodeValidator, SandboxProbe};

#[cfg(feature = "sandbox")]
pub use sandbox::{install_code_validator, InstalledValidator};

use crate::types::IsaFeatures;

/// One ISA detection strategy.
///
/// A probe never fails: anything it cannot establish is reported absent.
pub trait IsaProbe {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    fn probe(&self) -> IsaFeatures;
}

impl<P: IsaProbe + ?Sized> IsaProbe for &P {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn probe(&self) -> IsaFeatures {
        (**self).probe()
    }
}

/// Strategy compiled in for this target.
#[cfg(all(any(target_arch = "x86_64", target_arch = "x86"), not(feature = "sandbox")))]
pub fn platform_probe() -> impl IsaProbe {
    DirectProbe::new(crate::cpuid::NativeCpuid)
}

/// Strategy compiled in for this target.
#[cfg(all(any(target_arch = "x86_64", target_arch = "x86"), feature = "sandbox"))]
pub fn platform_probe() -> impl IsaProbe {
    SandboxProbe::new(InstalledValidator)
}

/// Strategy compiled in for this target.
#[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
pub fn platform_probe() -> impl IsaProbe {
    StaticProbe::for_target()
}

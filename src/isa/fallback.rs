//! Fixed ISA profile for targets without a query mechanism.

use crate::types::IsaFeatures;

use super::IsaProbe;

/// Reports a fixed feature set without touching the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticProbe {
    features: IsaFeatures,
}

impl StaticProbe {
    pub const fn new(features: IsaFeatures) -> Self {
        Self { features }
    }

    /// Minimal profile of the compilation target.
    ///
    /// On x86 this is whatever the build was compiled to assume
    /// (`-C target-feature`); elsewhere none of the x86 flags apply.
    pub const fn for_target() -> Self {
        #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
        let features = IsaFeatures {
            avx: cfg!(target_feature = "avx"),
            fma3: cfg!(target_feature = "fma"),
            avx2: cfg!(target_feature = "avx2"),
        };
        #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
        let features = IsaFeatures::NONE;
        Self { features }
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self::for_target()
    }
}

impl IsaProbe for StaticProbe {
    fn name(&self) -> &'static str {
        "static"
    }

    fn probe(&self) -> IsaFeatures {
        self.features
    }
}

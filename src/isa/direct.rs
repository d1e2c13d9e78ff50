//! Direct CPUID / XGETBV probing.

use crate::cpuid::{CpuidRegs, CpuidSource, LEAF_EXTENDED_FEATURES, LEAF_FEATURES};
use crate::types::IsaFeatures;

use super::IsaProbe;

// Leaf 1 ECX
const ECX_FMA: u32 = 1 << 12;
const ECX_OSXSAVE: u32 = 1 << 27;
const ECX_AVX: u32 = 1 << 28;
// Leaf 7 subleaf 0 EBX
const EBX_AVX2: u32 = 1 << 5;
// XCR0: SSE (bit 1) and AVX/YMM (bit 2) state enabled by the OS.
const XCR0_YMM_STATE: u64 = 0b110;

/// Decode ISA flags from raw registers.
///
/// `basic` is leaf 1, `structured` leaf 7 subleaf 0 (zero when the leaf is
/// unavailable), `xcr0` the XCR0 value or `None` when XGETBV could not be
/// used. The wide-vector flags are only trusted when the OS saves YMM state.
pub fn decode_features(basic: CpuidRegs, structured: CpuidRegs, xcr0: Option<u64>) -> IsaFeatures {
    let os_saves_ymm = basic.ecx & ECX_OSXSAVE != 0
        && xcr0.is_some_and(|x| x & XCR0_YMM_STATE == XCR0_YMM_STATE);
    if !os_saves_ymm {
        return IsaFeatures::NONE;
    }
    IsaFeatures {
        avx: basic.ecx & ECX_AVX != 0,
        fma3: basic.ecx & ECX_FMA != 0,
        avx2: structured.ebx & EBX_AVX2 != 0,
    }
}

/// Probe that queries the processor directly.
#[derive(Debug, Clone, Default)]
pub struct DirectProbe<S> {
    source: S,
}

impl<S: CpuidSource> DirectProbe<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: CpuidSource> IsaProbe for DirectProbe<S> {
    fn name(&self) -> &'static str {
        "cpuid"
    }

    fn probe(&self) -> IsaFeatures {
        let max_leaf = self.source.max_basic_leaf();
        if max_leaf < LEAF_FEATURES {
            log::debug!("CPUID max basic leaf {max_leaf}, no feature leaf");
            return IsaFeatures::NONE;
        }

        let basic = self.source.cpuid(LEAF_FEATURES, 0);
        let structured = if max_leaf >= LEAF_EXTENDED_FEATURES {
            self.source.cpuid(LEAF_EXTENDED_FEATURES, 0)
        } else {
            CpuidRegs::ZERO
        };

        // XGETBV faults unless the OS has set CR4.OSXSAVE.
        let xcr0 = if basic.ecx & ECX_OSXSAVE != 0 {
            Some(self.source.xgetbv(0))
        } else {
            log::debug!("OSXSAVE clear, treating wide vectors as unavailable");
            None
        };

        decode_features(basic, structured, xcr0)
    }
}

//! CPUID / XGETBV access behind a trait.
//!
//! Probes and the cache enumerator only talk to [`CpuidSource`], so their
//! decoding runs against synthetic registers in tests on any host. The
//! native implementation exists on x86 and x86_64 only.

use crate::types::Vendor;

/// Raw register output of one CPUID query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CpuidRegs {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

impl CpuidRegs {
    pub const ZERO: Self = Self { eax: 0, ebx: 0, ecx: 0, edx: 0 };

    pub const fn new(eax: u32, ebx: u32, ecx: u32, edx: u32) -> Self {
        Self { eax, ebx, ecx, edx }
    }
}

/// Basic identification: max basic leaf in EAX, vendor string in EBX/EDX/ECX.
pub const LEAF_VENDOR: u32 = 0;
/// Processor info and feature bits.
pub const LEAF_FEATURES: u32 = 1;
/// Deterministic cache parameters, one subleaf per cache.
pub const LEAF_CACHE_PARAMS: u32 = 4;
/// Structured extended feature flags.
pub const LEAF_EXTENDED_FEATURES: u32 = 7;

/// Hardware identification and extended-state query primitives.
pub trait CpuidSource {
    /// Execute CPUID with `leaf` in EAX and `subleaf` in ECX.
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidRegs;

    /// Read extended control register `xcr`.
    ///
    /// Callers only invoke this after CPUID reported OSXSAVE.
    fn xgetbv(&self, xcr: u32) -> u64;

    /// Highest basic leaf the processor answers.
    fn max_basic_leaf(&self) -> u32 {
        self.cpuid(LEAF_VENDOR, 0).eax
    }
}

impl<S: CpuidSource + ?Sized> CpuidSource for &S {
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidRegs {
        (**self).cpuid(leaf, subleaf)
    }

    fn xgetbv(&self, xcr: u32) -> u64 {
        (**self).xgetbv(xcr)
    }
}

/// Read the vendor identification string from leaf 0.
pub fn read_vendor<S: CpuidSource + ?Sized>(source: &S) -> Vendor {
    let id = source.cpuid(LEAF_VENDOR, 0);
    Vendor::from_id_registers(id.ebx, id.edx, id.ecx)
}

// ── Native ─────────────────────────────────────────────────────────────

/// The executing processor.
#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCpuid;

#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
impl CpuidSource for NativeCpuid {
    #[allow(unused_unsafe)]
    fn cpuid(&self, leaf: u32, subleaf: u32) -> CpuidRegs {
        #[cfg(target_arch = "x86")]
        use core::arch::x86::__cpuid_count;
        #[cfg(target_arch = "x86_64")]
        use core::arch::x86_64::__cpuid_count;

        // SAFETY: CPUID is available on every processor this crate targets.
        let r = unsafe { __cpuid_count(leaf, subleaf) };
        CpuidRegs::new(r.eax, r.ebx, r.ecx, r.edx)
    }

    fn xgetbv(&self, xcr: u32) -> u64 {
        #[cfg(target_arch = "x86")]
        use core::arch::x86::_xgetbv;
        #[cfg(target_arch = "x86_64")]
        use core::arch::x86_64::_xgetbv;

        // SAFETY: only reached after CPUID.1:ECX.OSXSAVE was observed set,
        // which guarantees XGETBV is enabled.
        unsafe { _xgetbv(xcr) }
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockCpuid;
    use super::*;

    #[test]
    fn test_mock_unknown_leaf_is_zero() {
        let cpu = MockCpuid::new().with_leaf(0, 0, CpuidRegs::new(7, 1, 2, 3));
        assert_eq!(cpu.max_basic_leaf(), 7);
        assert_eq!(cpu.cpuid(0x8000_0000, 0), CpuidRegs::ZERO);
    }

    #[test]
    fn test_read_vendor() {
        // "AuthenticAMD": EBX="Auth", EDX="enti", ECX="cAMD"
        let cpu = MockCpuid::new().with_leaf(0, 0, CpuidRegs::new(0x10, 0x6874_7541, 0x444D_4163, 0x6974_6E65));
        assert_eq!(read_vendor(&cpu), Vendor::Amd);
        assert_eq!(read_vendor(&MockCpuid::new()), Vendor::Unknown);
    }

    #[test]
    #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
    fn test_native_leaf0_answers() {
        let cpu = NativeCpuid;
        // Every x86 processor with CPUID answers at least leaf 1.
        assert!(cpu.max_basic_leaf() >= 1);
    }
}

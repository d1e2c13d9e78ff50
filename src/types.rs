//! Descriptor types shared by the probes, the deriver and the public API.
//!
//! Everything here is plain `Copy` data: the probes fill the raw records,
//! [`crate::blocking`] derives the budgets, and the finished [`HardwareInfo`]
//! is published once through the initialization gate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blocking::{self, VectorFamily};

// ── ISA flags ──────────────────────────────────────────────────────────

/// Instruction-set extensions relevant to kernel selection.
///
/// All three flags depend on the OS preserving YMM state, so every probe
/// reports them together as conservatively `false` when that cannot be
/// established.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IsaFeatures {
    pub avx: bool,
    pub fma3: bool,
    pub avx2: bool,
}

impl IsaFeatures {
    /// No extension usable.
    pub const NONE: Self = Self { avx: false, fma3: false, avx2: false };

    /// Every tracked extension usable.
    pub const ALL: Self = Self { avx: true, fma3: true, avx2: true };

    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.avx || self.fma3 || self.avx2)
    }

    /// Clears every flag that is set in `mask`.
    #[inline]
    pub fn without(self, mask: IsaFeatures) -> Self {
        Self {
            avx: self.avx && !mask.avx,
            fma3: self.fma3 && !mask.fma3,
            avx2: self.avx2 && !mask.avx2,
        }
    }
}

impl fmt::Display for IsaFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut feats = Vec::new();
        if self.avx {
            feats.push("AVX");
        }
        if self.fma3 {
            feats.push("FMA3");
        }
        if self.avx2 {
            feats.push("AVX2");
        }
        if feats.is_empty() {
            feats.push("baseline");
        }
        write!(f, "{}", feats.join("+"))
    }
}

// ── Vendor ─────────────────────────────────────────────────────────────

/// CPU vendor, recorded for downstream kernel policy only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vendor {
    Intel,
    Amd,
    Via,
    #[default]
    Unknown,
}

impl Vendor {
    /// Decode the vendor from the 12-byte identification string returned in
    /// EBX, EDX, ECX (in that order) of CPUID leaf 0.
    pub fn from_id_registers(ebx: u32, edx: u32, ecx: u32) -> Self {
        let mut id = [0u8; 12];
        id[0..4].copy_from_slice(&ebx.to_le_bytes());
        id[4..8].copy_from_slice(&edx.to_le_bytes());
        id[8..12].copy_from_slice(&ecx.to_le_bytes());
        match &id {
            b"GenuineIntel" => Self::Intel,
            b"AuthenticAMD" => Self::Amd,
            b"CentaurHauls" => Self::Via,
            _ => Self::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Intel => "Intel",
            Self::Amd => "AMD",
            Self::Via => "VIA",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Cache records ──────────────────────────────────────────────────────

/// One cache level. A zero `size` means the level is not present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Total capacity in bytes.
    pub size: usize,
    /// Ways of set-associativity.
    pub associativity: u32,
    /// Hardware execution contexts sharing this cache.
    pub threads: u32,
    /// Contents are a superset of the next inner level.
    pub inclusive: bool,
    /// Line size in bytes (0 when unknown).
    pub line_size: u32,
}

impl CacheInfo {
    pub const ABSENT: Self = Self {
        size: 0,
        associativity: 0,
        threads: 0,
        inclusive: false,
        line_size: 0,
    };

    #[inline]
    pub fn is_present(&self) -> bool {
        self.size != 0
    }
}

/// Per-level cache records, L1 (innermost data) through L4.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheHierarchy {
    pub l1: CacheInfo,
    pub l2: CacheInfo,
    pub l3: CacheInfo,
    pub l4: CacheInfo,
}

impl CacheHierarchy {
    pub const EMPTY: Self = Self {
        l1: CacheInfo::ABSENT,
        l2: CacheInfo::ABSENT,
        l3: CacheInfo::ABSENT,
        l4: CacheInfo::ABSENT,
    };

    /// Slot for `level` (1-based). Levels outside 1..=4 have no slot.
    pub fn level_mut(&mut self, level: u32) -> Option<&mut CacheInfo> {
        match level {
            1 => Some(&mut self.l1),
            2 => Some(&mut self.l2),
            3 => Some(&mut self.l3),
            4 => Some(&mut self.l4),
            _ => None,
        }
    }

    pub fn level(&self, level: u32) -> Option<&CacheInfo> {
        match level {
            1 => Some(&self.l1),
            2 => Some(&self.l2),
            3 => Some(&self.l3),
            4 => Some(&self.l4),
            _ => None,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.l1.is_present() || self.l2.is_present() || self.l3.is_present() || self.l4.is_present())
    }
}

/// Usable working-set budget per cache level, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockingParams {
    pub l1: usize,
    pub l2: usize,
    pub l3: usize,
    pub l4: usize,
}

// ── Descriptor ─────────────────────────────────────────────────────────

/// The process-wide capability descriptor.
///
/// Built completely by the detection pipeline and only then published, so a
/// `&HardwareInfo` obtained from [`crate::hardware_info`] is always fully
/// populated and never changes afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HardwareInfo {
    pub vendor: Vendor,
    pub isa: IsaFeatures,
    pub cache: CacheHierarchy,
    pub blocking: BlockingParams,
    /// f32 lanes of the selected kernel family; 0 when unsupported.
    pub simd_width: u32,
    pub supported: bool,
}

impl HardwareInfo {
    /// Run the blocking deriver over probed inputs and build the descriptor.
    pub fn assemble(vendor: Vendor, isa: IsaFeatures, cache: CacheHierarchy, family: VectorFamily) -> Self {
        let derived = blocking::derive(&isa, &cache, family);
        Self {
            vendor,
            isa,
            cache,
            blocking: derived.blocking,
            simd_width: derived.simd_width,
            supported: derived.supported,
        }
    }

    #[inline]
    pub fn isa(&self) -> IsaFeatures {
        self.isa
    }

    #[inline]
    pub fn cache(&self) -> &CacheHierarchy {
        &self.cache
    }

    #[inline]
    pub fn blocking(&self) -> BlockingParams {
        self.blocking
    }

    #[inline]
    pub fn simd_width(&self) -> u32 {
        self.simd_width
    }

    #[inline]
    pub fn is_supported(&self) -> bool {
        self.supported
    }

    #[inline]
    pub fn vendor(&self) -> Vendor {
        self.vendor
    }
}

impl fmt::Display for HardwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {} | L1={}K L2={}K L3={}K L4={}K | blocking L1={}K L2={}K L3={}K | SIMD={} | {}",
            self.vendor,
            self.isa,
            self.cache.l1.size / 1024,
            self.cache.l2.size / 1024,
            self.cache.l3.size / 1024,
            self.cache.l4.size / 1024,
            self.blocking.l1 / 1024,
            self.blocking.l2 / 1024,
            self.blocking.l3 / 1024,
            self.simd_width,
            if self.supported { "supported" } else { "unsupported" },
        )
    }
}

//! Cache blocking budgets and the supported verdict.
//!
//! Turns raw per-level cache records into the working-set budget one
//! execution context may assume at each level:
//!   - L1: capacity, split evenly between the contexts sharing it
//!   - L2: capacity minus L1 when inclusive, then split between sharers
//!   - L3: capacity minus L2 when inclusive, reported package-wide
//!   - L4: passed through
//!
//! The L3 budget is deliberately not divided by its sharing width.

use serde::{Deserialize, Serialize};

use crate::types::{BlockingParams, CacheHierarchy, CacheInfo, IsaFeatures};

// ── Kernel family ──────────────────────────────────────────────────────

/// Vector kernel family targeted by the build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VectorFamily {
    /// 256-bit AVX2 + FMA3 kernels (x86 builds).
    Avx2Fma,
    /// 128-bit portable SIMD kernels (every other build).
    Portable,
}

impl VectorFamily {
    /// Family compiled into this build.
    pub const fn native() -> Self {
        if cfg!(any(target_arch = "x86_64", target_arch = "x86")) {
            Self::Avx2Fma
        } else {
            Self::Portable
        }
    }

    /// f32 lanes per vector.
    pub const fn lanes(self) -> u32 {
        match self {
            Self::Avx2Fma => 8,
            Self::Portable => 4,
        }
    }

    /// Whether the probed ISA can run this family's kernels.
    pub fn is_satisfied_by(self, isa: &IsaFeatures) -> bool {
        match self {
            Self::Avx2Fma => isa.avx2 && isa.fma3,
            Self::Portable => true,
        }
    }
}

// ── Derivation ─────────────────────────────────────────────────────────

/// Output of [`derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Derived {
    pub blocking: BlockingParams,
    pub simd_width: u32,
    pub supported: bool,
}

#[inline]
fn split_between_sharers(budget: usize, level: &CacheInfo) -> usize {
    if level.threads > 1 {
        budget / level.threads as usize
    } else {
        budget
    }
}

/// Compute per-level budgets from raw cache records.
pub fn blocking_params(cache: &CacheHierarchy) -> BlockingParams {
    let l1 = split_between_sharers(cache.l1.size, &cache.l1);

    let l2 = if cache.l2.is_present() {
        let mut budget = cache.l2.size;
        if cache.l2.inclusive {
            // Raw L1 capacity, not the per-context budget.
            budget = budget.saturating_sub(cache.l1.size);
        }
        split_between_sharers(budget, &cache.l2)
    } else {
        0
    };

    let l3 = if cache.l3.is_present() {
        let mut budget = cache.l3.size;
        if cache.l3.inclusive {
            budget = budget.saturating_sub(cache.l2.size);
        }
        budget
    } else {
        0
    };

    BlockingParams { l1, l2, l3, l4: cache.l4.size }
}

/// Derive budgets, SIMD width and the supported verdict.
///
/// Supported requires L1, L2 and L3 to be present and the probed ISA to
/// satisfy `family`. An unsupported descriptor reports a SIMD width of 0.
pub fn derive(isa: &IsaFeatures, cache: &CacheHierarchy, family: VectorFamily) -> Derived {
    let blocking = blocking_params(cache);

    let caches_present = cache.l1.is_present() && cache.l2.is_present() && cache.l3.is_present();
    let supported = caches_present && family.is_satisfied_by(isa);
    let simd_width = if supported { family.lanes() } else { 0 };

    if !caches_present {
        log::debug!(
            "cache hierarchy incomplete (L1={} L2={} L3={}), marking unsupported",
            cache.l1.size,
            cache.l2.size,
            cache.l3.size
        );
    } else if !supported {
        log::debug!("ISA {isa} does not satisfy {family:?} kernels, marking unsupported");
    }

    Derived { blocking, simd_width, supported }
}

//! perfkern: hardware capability detection for portable inference kernels.
//!
//! Builds, once per process, a read-only descriptor of the executing CPU:
//! - **ISA support**: AVX / FMA3 / AVX2, gated on OS-saved YMM state
//! - **Cache topology**: size, associativity, sharing and inclusiveness per level
//! - **Blocking parameters**: per-level working-set budgets for tiled kernels
//! - **Verdict**: whether the build's vector kernel family can run here
//!
//! Detection strategy is chosen at compile time: direct CPUID on x86,
//! validator-driven probing in sandboxed x86 builds (feature `sandbox`), and
//! a fixed profile everywhere else.
//!
//! # Quick Start
//!
//! ```no_run
//! let hw = perfkern::initialize().expect("unsupported hardware");
//! let blocking = hw.blocking();
//! println!("L1 tile budget: {} bytes, SIMD width {}", blocking.l1, hw.simd_width());
//! ```

pub mod blocking;
pub mod cache_topology;
pub mod config;
pub mod cpuid;
pub mod error;
pub mod gate;
pub mod hwinfo;
pub mod isa;
pub mod types;

pub use blocking::VectorFamily;
pub use cache_topology::{CacheEnumerator, CpuidCacheEnumerator, FixedCacheEnumerator, SysfsCacheEnumerator};
pub use config::DetectionConfig;
pub use cpuid::{CpuidRegs, CpuidSource};
pub use error::{HwInfoError, HwInfoResult, ValidatorError};
pub use gate::DescriptorCell;
pub use isa::{CodeValidator, IsaProbe};
pub use types::{BlockingParams, CacheHierarchy, CacheInfo, HardwareInfo, IsaFeatures, Vendor};

pub use hwinfo::{deinitialize, hardware_info, initialize, initialize_with, is_initialized};

#[cfg(feature = "sandbox")]
pub use isa::install_code_validator;

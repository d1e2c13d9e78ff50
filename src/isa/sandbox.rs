//! Validator-driven probing for software-sandboxed processes.
//!
//! Inside a sandbox that forbids XGETBV, the only trustworthy answer to
//! "may this process execute instruction X" comes from the sandbox's own
//! code validator. Each capability is represented by one minimal
//! instruction, padded with `HLT` to a full code bundle and offered to the
//! validator at its own offset in a reserved code region. Acceptance means
//! present.

use crate::error::ValidatorError;
use crate::types::IsaFeatures;

use super::IsaProbe;

/// Validator bundle granularity.
pub const CODE_BUNDLE_SIZE: usize = 32;
/// Code region reserved for probe bundles.
pub const CODE_REGION_SIZE: usize = 64 * 1024;
/// Bundle filler.
pub const HLT: u8 = 0xF4;

/// Capabilities the sandbox probe can establish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Avx,
    Fma3,
    Avx2,
}

impl Capability {
    /// Probe order, and therefore offset order inside the code region.
    pub const ALL: [Capability; 3] = [Capability::Avx, Capability::Fma3, Capability::Avx2];

    /// Representative instruction encoding.
    pub const fn encoding(self) -> &'static [u8] {
        match self {
            // vpermilps ymm0, ymm1, 0xAA
            Self::Avx => &[0xC4, 0xE3, 0x7D, 0x04, 0xC1, 0xAA],
            // vfmaddsub213ps ymm0, ymm1, ymm2
            Self::Fma3 => &[0xC4, 0xE2, 0x75, 0xA6, 0xC2],
            // vpermps ymm0, ymm1, ymm2
            Self::Avx2 => &[0xC4, 0xE2, 0x75, 0x16, 0xC2],
        }
    }

    /// Encoding padded to one bundle with `HLT`.
    pub fn code_bundle(self) -> [u8; CODE_BUNDLE_SIZE] {
        let mut bundle = [HLT; CODE_BUNDLE_SIZE];
        let enc = self.encoding();
        bundle[..enc.len()].copy_from_slice(enc);
        bundle
    }

    fn set(self, isa: &mut IsaFeatures, present: bool) {
        match self {
            Self::Avx => isa.avx = present,
            Self::Fma3 => isa.fma3 = present,
            Self::Avx2 => isa.avx2 = present,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Avx => "AVX",
            Self::Fma3 => "FMA3",
            Self::Avx2 => "AVX2",
        }
    }
}

/// Code validation service of the embedding sandbox.
pub trait CodeValidator {
    /// Reserve a code region of `len` bytes and return its base address.
    fn allocate(&self, len: usize) -> Result<usize, ValidatorError>;

    /// Validate and load one bundle at `addr`.
    fn load(&self, addr: usize, bundle: &[u8]) -> Result<(), ValidatorError>;
}

impl<V: CodeValidator + ?Sized> CodeValidator for &V {
    fn allocate(&self, len: usize) -> Result<usize, ValidatorError> {
        (**self).allocate(len)
    }

    fn load(&self, addr: usize, bundle: &[u8]) -> Result<(), ValidatorError> {
        (**self).load(addr, bundle)
    }
}

/// Probe that asks a [`CodeValidator`] about each capability.
#[derive(Debug, Clone, Default)]
pub struct SandboxProbe<V> {
    validator: V,
}

impl<V: CodeValidator> SandboxProbe<V> {
    pub fn new(validator: V) -> Self {
        Self { validator }
    }
}

impl<V: CodeValidator> IsaProbe for SandboxProbe<V> {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    fn probe(&self) -> IsaFeatures {
        let base = match self.validator.allocate(CODE_REGION_SIZE) {
            Ok(addr) => addr,
            Err(e) => {
                log::debug!("sandbox probe: {e}");
                return IsaFeatures::NONE;
            }
        };

        let mut isa = IsaFeatures::NONE;
        let mut addr = base;
        for cap in Capability::ALL {
            match self.validator.load(addr, &cap.code_bundle()) {
                Ok(()) => cap.set(&mut isa, true),
                Err(e) => log::debug!("sandbox probe: {} absent ({e})", cap.name()),
            }
            // A rejected bundle still consumes its slot.
            addr += CODE_BUNDLE_SIZE;
        }
        isa
    }
}

// ── Embedder-installed validator ───────────────────────────────────────

#[cfg(feature = "sandbox")]
mod installed {
    use std::sync::OnceLock;

    use super::CodeValidator;
    use crate::error::{HwInfoError, HwInfoResult, ValidatorError};

    static VALIDATOR: OnceLock<Box<dyn CodeValidator + Send + Sync>> = OnceLock::new();

    /// Register the sandbox's code validator for the process.
    ///
    /// Must happen before the descriptor is initialized. Returns
    /// `AlreadyInitialized` afterwards, or when a validator is already
    /// installed. An install racing with [`crate::initialize`] on another
    /// thread may lose; it then also returns `AlreadyInitialized`, because
    /// the published descriptor was probed without the validator.
    pub fn install_code_validator<V>(validator: V) -> HwInfoResult<()>
    where
        V: CodeValidator + Send + Sync + 'static,
    {
        if crate::is_initialized() {
            return Err(HwInfoError::AlreadyInitialized);
        }
        VALIDATOR
            .set(Box::new(validator))
            .map_err(|_| HwInfoError::AlreadyInitialized)?;
        // Detection may have published between the check and the set.
        if crate::is_initialized() {
            return Err(HwInfoError::AlreadyInitialized);
        }
        Ok(())
    }

    /// Forwards to the installed validator. With none installed every
    /// allocation fails, so every capability reads absent.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct InstalledValidator;

    impl CodeValidator for InstalledValidator {
        fn allocate(&self, len: usize) -> Result<usize, ValidatorError> {
            match VALIDATOR.get() {
                Some(v) => v.allocate(len),
                None => {
                    log::warn!("sandbox build without an installed code validator");
                    Err(ValidatorError::RegionUnavailable(len))
                }
            }
        }

        fn load(&self, addr: usize, bundle: &[u8]) -> Result<(), ValidatorError> {
            match VALIDATOR.get() {
                Some(v) => v.load(addr, bundle),
                None => Err(ValidatorError::Rejected { addr, code: -1 }),
            }
        }
    }
}

#[cfg(feature = "sandbox")]
pub use installed::{install_code_validator, InstalledValidator};

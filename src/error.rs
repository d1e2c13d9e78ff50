use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HwInfoError {
    #[error("hardware does not meet the minimum requirements of the kernel family")]
    UnsupportedHardware,
    #[error("hardware descriptor is already initialized")]
    AlreadyInitialized,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type HwInfoResult<T> = Result<T, HwInfoError>;

/// Failure reported by a sandbox code validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidatorError {
    #[error("code region of {0} bytes could not be reserved")]
    RegionUnavailable(usize),
    #[error("bundle at {addr:#x} rejected by validator (code {code})")]
    Rejected { addr: usize, code: i32 },
}

//! Detection overrides from the environment.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `PERFKERN_DISABLE_ISA` | comma-separated `avx`, `fma3`, `avx2` forced off after probing |
//! | `PERFKERN_FIXED_TOPOLOGY` | `1` / `true` uses the fixed cache topology |
//!
//! Read once, inside the detection pipeline.

use std::fmt;

use crate::error::{HwInfoError, HwInfoResult};
use crate::types::IsaFeatures;

pub const ENV_DISABLE_ISA: &str = "PERFKERN_DISABLE_ISA";
pub const ENV_FIXED_TOPOLOGY: &str = "PERFKERN_FIXED_TOPOLOGY";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionConfig {
    /// Extensions cleared from the probed set.
    pub disabled_isa: IsaFeatures,
    /// Skip cache enumeration and use the fixed topology.
    pub fixed_topology: bool,
}

impl DetectionConfig {
    /// Read the process environment.
    pub fn from_env() -> HwInfoResult<Self> {
        let vars = [ENV_DISABLE_ISA, ENV_FIXED_TOPOLOGY]
            .into_iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| (k, v)));
        Self::from_vars(vars)
    }

    /// Build from explicit `(name, value)` pairs. Unrelated names are ignored.
    pub fn from_vars<I, K, V>(vars: I) -> HwInfoResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in vars {
            match key.as_ref() {
                ENV_DISABLE_ISA => config.disabled_isa = parse_isa_list(value.as_ref())?,
                ENV_FIXED_TOPOLOGY => config.fixed_topology = parse_flag(ENV_FIXED_TOPOLOGY, value.as_ref())?,
                _ => {}
            }
        }
        Ok(config)
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for DetectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disabled ISA: ")?;
        if self.disabled_isa.is_empty() {
            write!(f, "none")?;
        } else {
            write!(f, "{}", self.disabled_isa)?;
        }
        write!(f, ", fixed topology: {}", self.fixed_topology)
    }
}

/// Parse `avx,fma3,avx2` (any subset, any case, blanks allowed).
fn parse_isa_list(s: &str) -> HwInfoResult<IsaFeatures> {
    let mut mask = IsaFeatures::NONE;
    for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
        match item.to_ascii_lowercase().as_str() {
            "avx" => mask.avx = true,
            "fma3" | "fma" => mask.fma3 = true,
            "avx2" => mask.avx2 = true,
            other => {
                return Err(HwInfoError::InvalidConfig(format!(
                    "{ENV_DISABLE_ISA}: unknown extension '{other}'"
                )))
            }
        }
    }
    Ok(mask)
}

fn parse_flag(name: &str, s: &str) -> HwInfoResult<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        other => Err(HwInfoError::InvalidConfig(format!("{name}: expected a boolean, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_default() {
        let cfg = DetectionConfig::from_vars(Vec::<(String, String)>::new()).unwrap();
        assert!(cfg.is_default());
        assert_eq!(format!("{cfg}"), "disabled ISA: none, fixed topology: false");
    }

    #[test]
    fn test_disable_list() {
        let cfg = DetectionConfig::from_vars([(ENV_DISABLE_ISA, " AVX2 , fma3,")]).unwrap();
        assert_eq!(cfg.disabled_isa, IsaFeatures { avx: false, fma3: true, avx2: true });
        assert!(!cfg.fixed_topology);
    }

    #[test]
    fn test_fixed_topology_flag() {
        for v in ["1", "true", "YES", "on"] {
            assert!(DetectionConfig::from_vars([(ENV_FIXED_TOPOLOGY, v)]).unwrap().fixed_topology);
        }
        for v in ["0", "false", ""] {
            assert!(!DetectionConfig::from_vars([(ENV_FIXED_TOPOLOGY, v)]).unwrap().fixed_topology);
        }
    }

    #[test]
    fn test_invalid_values() {
        let err = DetectionConfig::from_vars([(ENV_DISABLE_ISA, "avx,sse9")]).unwrap_err();
        assert!(matches!(err, HwInfoError::InvalidConfig(ref m) if m.contains("sse9")));
        assert!(DetectionConfig::from_vars([(ENV_FIXED_TOPOLOGY, "maybe")]).is_err());
    }

    #[test]
    fn test_unrelated_vars_ignored() {
        let cfg = DetectionConfig::from_vars([("PATH", "/usr/bin"), (ENV_FIXED_TOPOLOGY, "1")]).unwrap();
        assert!(cfg.fixed_topology);
        assert!(cfg.disabled_isa.is_empty());
    }
}

//! Cache topology enumeration.
//!
//! Fills a [`CacheHierarchy`] with one record per level from whichever
//! source the target offers:
//!   - x86 / x86_64: CPUID leaf 4 (deterministic cache parameters)
//!   - Linux elsewhere: `/sys/devices/system/cpu/cpu0/cache/index*`
//!   - anything else: a fixed, conservative topology
//!
//! Only data and unified caches are recorded; instruction caches never hold
//! kernel working sets.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cpuid::{CpuidRegs, CpuidSource, LEAF_CACHE_PARAMS};
use crate::types::{CacheHierarchy, CacheInfo};

/// Source of per-level cache records.
pub trait CacheEnumerator {
    /// Short source name for logs.
    fn name(&self) -> &'static str;

    fn enumerate(&self) -> CacheHierarchy;
}

impl<E: CacheEnumerator + ?Sized> CacheEnumerator for &E {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn enumerate(&self) -> CacheHierarchy {
        (**self).enumerate()
    }
}

// ── Descriptor decoding ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheType {
    Data,
    Instruction,
    Unified,
    /// Encodings 4..=31.
    Reserved(u8),
}

impl CacheType {
    /// Whether a record of this type describes data working-set capacity.
    pub fn holds_data(self) -> bool {
        matches!(self, Self::Data | Self::Unified)
    }
}

/// One decoded leaf-4 subleaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheDescriptor {
    pub cache_type: CacheType,
    pub level: u32,
    pub info: CacheInfo,
}

/// Upper bound on leaf-4 subleaves. Some hypervisors never report the
/// terminating null descriptor.
pub const MAX_CACHE_SUBLEAVES: u32 = 64;

/// Decode one CPUID leaf-4 descriptor. `None` is the end-of-list sentinel.
pub fn decode_cache_descriptor(regs: CpuidRegs) -> Option<CacheDescriptor> {
    let cache_type = match regs.eax & 0x1F {
        0 => return None,
        1 => CacheType::Data,
        2 => CacheType::Instruction,
        3 => CacheType::Unified,
        t => CacheType::Reserved(t as u8),
    };
    let level = (regs.eax >> 5) & 0x7;
    let threads = ((regs.eax >> 14) & 0xFFF) + 1;

    let line_size = (regs.ebx & 0xFFF) + 1;
    let partitions = ((regs.ebx >> 12) & 0x3FF) + 1;
    let ways = ((regs.ebx >> 22) & 0x3FF) + 1;
    let sets = regs.ecx as usize + 1;
    // EDX bit 1 is inclusiveness; bit 0 is WBINVD scope, not read here.
    let inclusive = regs.edx & 0b10 != 0;

    Some(CacheDescriptor {
        cache_type,
        level,
        info: CacheInfo {
            size: (line_size as usize)
                .saturating_mul(partitions as usize)
                .saturating_mul(ways as usize)
                .saturating_mul(sets),
            associativity: ways,
            threads,
            inclusive,
            line_size,
        },
    })
}

/// Store `info` into its level slot, replacing any earlier record.
fn store(cache: &mut CacheHierarchy, level: u32, info: CacheInfo, source: &str) {
    match cache.level_mut(level) {
        Some(slot) => {
            log::debug!(
                "{source}: L{level} {}K {}-way line={} shared-by={} inclusive={}",
                info.size / 1024,
                info.associativity,
                info.line_size,
                info.threads,
                info.inclusive
            );
            *slot = info;
        }
        None => log::debug!("{source}: ignoring cache at level {level}"),
    }
}

// ── CPUID ──────────────────────────────────────────────────────────────

/// Walks CPUID leaf 4.
#[derive(Debug, Clone, Default)]
pub struct CpuidCacheEnumerator<S> {
    source: S,
}

impl<S: CpuidSource> CpuidCacheEnumerator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }
}

impl<S: CpuidSource> CacheEnumerator for CpuidCacheEnumerator<S> {
    fn name(&self) -> &'static str {
        "cpuid"
    }

    fn enumerate(&self) -> CacheHierarchy {
        let mut cache = CacheHierarchy::EMPTY;
        let max_leaf = self.source.max_basic_leaf();
        if max_leaf < LEAF_CACHE_PARAMS {
            log::debug!("CPUID max basic leaf {max_leaf}, no cache parameters leaf");
            return cache;
        }

        for subleaf in 0..MAX_CACHE_SUBLEAVES {
            let Some(desc) = decode_cache_descriptor(self.source.cpuid(LEAF_CACHE_PARAMS, subleaf)) else {
                return cache;
            };
            if desc.cache_type.holds_data() {
                store(&mut cache, desc.level, desc.info, "cpuid");
            }
        }
        log::warn!("CPUID leaf 4 did not terminate within {MAX_CACHE_SUBLEAVES} subleaves");
        cache
    }
}

// ── Fixed ──────────────────────────────────────────────────────────────

/// Conservative topology for targets that cannot be queried.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedCacheEnumerator;

impl FixedCacheEnumerator {
    pub const TOPOLOGY: CacheHierarchy = CacheHierarchy {
        l1: CacheInfo { size: 16 * 1024, associativity: 4, threads: 1, inclusive: true, line_size: 64 },
        l2: CacheInfo { size: 128 * 1024, associativity: 4, threads: 1, inclusive: true, line_size: 64 },
        l3: CacheInfo { size: 2 * 1024 * 1024, associativity: 8, threads: 1, inclusive: true, line_size: 64 },
        l4: CacheInfo::ABSENT,
    };
}

impl CacheEnumerator for FixedCacheEnumerator {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn enumerate(&self) -> CacheHierarchy {
        Self::TOPOLOGY
    }
}

// ── sysfs ──────────────────────────────────────────────────────────────

/// Default sysfs cache directory of the first CPU.
pub const SYSFS_CACHE_ROOT: &str = "/sys/devices/system/cpu/cpu0/cache";

/// Number of `index*` directories inspected.
const SYSFS_MAX_INDEX: usize = 16;

/// Reads the Linux sysfs cache tree, falling back to the fixed topology
/// when nothing usable is found.
#[derive(Debug, Clone)]
pub struct SysfsCacheEnumerator {
    root: PathBuf,
}

impl SysfsCacheEnumerator {
    pub fn new() -> Self {
        Self::with_root(SYSFS_CACHE_ROOT)
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_index(dir: &Path) -> Option<(u32, CacheInfo)> {
        let read = |name: &str| fs::read_to_string(dir.join(name)).ok();

        let ctype = read("type")?;
        if !matches!(ctype.trim(), "Data" | "Unified") {
            return None;
        }
        let level = read("level")?.trim().parse::<u32>().ok()?;
        let size = parse_size(&read("size")?)?;
        let associativity = read("ways_of_associativity")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let line_size = read("coherency_line_size")
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(0);
        let threads = read("shared_cpu_list")
            .map(|s| count_cpu_list(&s) as u32)
            .filter(|&n| n > 0)
            .unwrap_or(1);

        Some((
            level,
            CacheInfo { size, associativity, threads, inclusive: false, line_size },
        ))
    }
}

impl Default for SysfsCacheEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheEnumerator for SysfsCacheEnumerator {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn enumerate(&self) -> CacheHierarchy {
        let mut cache = CacheHierarchy::EMPTY;
        for idx in 0..SYSFS_MAX_INDEX {
            let dir = self.root.join(format!("index{idx}"));
            if !dir.is_dir() {
                continue;
            }
            match Self::read_index(&dir) {
                Some((level, info)) => store(&mut cache, level, info, "sysfs"),
                None => log::debug!("sysfs: skipping {}", dir.display()),
            }
        }

        if cache.is_empty() {
            log::debug!("sysfs: no usable cache entries under {}, using fixed topology", self.root.display());
            return FixedCacheEnumerator::TOPOLOGY;
        }
        cache
    }
}

/// Parse a sysfs size such as `48K`, `2048K`, `32M` or `1G` into bytes.
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    let (digits, scale) = match s.as_bytes().last()? {
        b'K' | b'k' => (&s[..s.len() - 1], 1usize << 10),
        b'M' | b'm' => (&s[..s.len() - 1], 1 << 20),
        b'G' | b'g' => (&s[..s.len() - 1], 1 << 30),
        _ => (s, 1),
    };
    digits.trim().parse::<usize>().ok()?.checked_mul(scale)
}

/// Upper bound reported by [`count_cpu_list`].
pub const MAX_SHARED_CPUS: usize = 4096;

/// Count the CPUs in a sysfs CPU list such as `0-3,8,10-11`, capped at
/// [`MAX_SHARED_CPUS`]. Malformed parts are skipped.
pub fn count_cpu_list(s: &str) -> usize {
    let mut count = 0usize;
    for part in s.trim().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let n = match part.split_once('-') {
            Some((lo, hi)) => match (lo.trim().parse::<usize>(), hi.trim().parse::<usize>()) {
                (Ok(lo), Ok(hi)) if hi >= lo => (hi - lo).saturating_add(1),
                _ => 0,
            },
            None => usize::from(part.parse::<usize>().is_ok()),
        };
        count = count.saturating_add(n);
    }
    count.min(MAX_SHARED_CPUS)
}

// ── Platform selection ─────────────────────────────────────────────────

/// Enumerator compiled in for this target.
#[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
pub fn platform_enumerator() -> impl CacheEnumerator {
    CpuidCacheEnumerator::new(crate::cpuid::NativeCpuid)
}

/// Enumerator compiled in for this target.
#[cfg(all(target_os = "linux", not(any(target_arch = "x86_64", target_arch = "x86"))))]
pub fn platform_enumerator() -> impl CacheEnumerator {
    SysfsCacheEnumerator::new()
}

/// Enumerator compiled in for this target.
#[cfg(all(not(target_os = "linux"), not(any(target_arch = "x86_64", target_arch = "x86"))))]
pub fn platform_enumerator() -> impl CacheEnumerator {
    FixedCacheEnumerator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpuid::mock::MockCpuid;
    use crate::cpuid::LEAF_VENDOR;

    /// Encode a leaf-4 descriptor the way hardware reports it.
    fn leaf4(ty: u32, level: u32, threads: u32, line: u32, ways: u32, sets: u32, inclusive: bool) -> CpuidRegs {
        CpuidRegs::new(
            ty | (level << 5) | ((threads - 1) << 14),
            (line - 1) | ((ways - 1) << 22),
            sets - 1,
            if inclusive { 0b10 } else { 0 },
        )
    }

    fn cpu_with_caches(descs: &[CpuidRegs]) -> MockCpuid {
        let mut cpu = MockCpuid::new().with_leaf(LEAF_VENDOR, 0, CpuidRegs::new(0xD, 0, 0, 0));
        for (i, regs) in descs.iter().enumerate() {
            cpu = cpu.with_leaf(LEAF_CACHE_PARAMS, i as u32, *regs);
        }
        cpu
    }

    #[test]
    fn test_decode_descriptor() {
        // 32K 8-way L1D shared by 2, 64B lines: 64 sets.
        let d = decode_cache_descriptor(leaf4(1, 1, 2, 64, 8, 64, false)).unwrap();
        assert_eq!(d.cache_type, CacheType::Data);
        assert_eq!(d.level, 1);
        assert_eq!(d.info.size, 32 * 1024);
        assert_eq!(d.info.associativity, 8);
        assert_eq!(d.info.threads, 2);
        assert_eq!(d.info.line_size, 64);
        assert!(!d.info.inclusive);
    }

    #[test]
    fn test_decode_partitions_and_inclusive() {
        let mut regs = leaf4(3, 3, 16, 64, 16, 8192, true);
        regs.ebx |= 1 << 12; // 2 partitions
        let d = decode_cache_descriptor(regs).unwrap();
        assert_eq!(d.info.size, 64 * 2 * 16 * 8192);
        assert!(d.info.inclusive);
        // Bit 0 alone is write-back invalidate behaviour, not inclusiveness.
        regs.edx = 0b01;
        assert!(!decode_cache_descriptor(regs).unwrap().info.inclusive);
    }

    #[test]
    fn test_decode_sentinel() {
        assert!(decode_cache_descriptor(CpuidRegs::ZERO).is_none());
        // Type bits zero ends the list regardless of the other fields.
        assert!(decode_cache_descriptor(CpuidRegs::new(0x20, 0xFFFF, 7, 2)).is_none());
    }

    #[test]
    fn test_cpuid_typical_hierarchy() {
        let cpu = cpu_with_caches(&[
            leaf4(1, 1, 2, 64, 8, 64, false),     // L1D 32K
            leaf4(2, 1, 2, 64, 8, 64, false),     // L1I 32K
            leaf4(3, 2, 2, 64, 4, 1024, true),    // L2 256K
            leaf4(3, 3, 16, 64, 16, 8192, true),  // L3 8M
        ]);
        let cache = CpuidCacheEnumerator::new(cpu).enumerate();
        assert_eq!(cache.l1.size, 32 * 1024);
        assert_eq!(cache.l2.size, 256 * 1024);
        assert!(cache.l2.inclusive);
        assert_eq!(cache.l3.size, 8 * 1024 * 1024);
        assert_eq!(cache.l3.threads, 16);
        assert!(!cache.l4.is_present());
    }

    #[test]
    fn test_cpuid_instruction_cache_skipped() {
        let cpu = cpu_with_caches(&[leaf4(2, 1, 1, 64, 8, 64, false)]);
        assert!(CpuidCacheEnumerator::new(cpu).enumerate().is_empty());
    }

    #[test]
    fn test_cpuid_later_record_overwrites() {
        let cpu = cpu_with_caches(&[
            leaf4(3, 2, 1, 64, 4, 512, false),
            leaf4(3, 2, 1, 64, 4, 1024, false),
        ]);
        assert_eq!(CpuidCacheEnumerator::new(cpu).enumerate().l2.size, 256 * 1024);
    }

    #[test]
    fn test_cpuid_out_of_range_level_ignored() {
        let cpu = cpu_with_caches(&[leaf4(3, 5, 1, 64, 4, 512, false), leaf4(3, 0, 1, 64, 4, 512, false)]);
        assert!(CpuidCacheEnumerator::new(cpu).enumerate().is_empty());
    }

    #[test]
    fn test_cpuid_requires_leaf4() {
        let cpu = cpu_with_caches(&[leaf4(1, 1, 1, 64, 8, 64, false)])
            .with_leaf(LEAF_VENDOR, 0, CpuidRegs::new(3, 0, 0, 0));
        assert!(CpuidCacheEnumerator::new(cpu).enumerate().is_empty());
    }

    #[test]
    fn test_cpuid_unterminated_list_is_bounded() {
        let descs = vec![leaf4(1, 1, 1, 64, 8, 64, false); MAX_CACHE_SUBLEAVES as usize + 8];
        let cache = CpuidCacheEnumerator::new(cpu_with_caches(&descs)).enumerate();
        assert_eq!(cache.l1.size, 32 * 1024);
    }

    #[test]
    fn test_fixed_topology() {
        let cache = FixedCacheEnumerator.enumerate();
        assert_eq!(cache.l1.size, 16 * 1024);
        assert_eq!(cache.l1.associativity, 4);
        assert_eq!(cache.l2.size, 128 * 1024);
        assert_eq!(cache.l3.size, 2 * 1024 * 1024);
        assert_eq!(cache.l3.associativity, 8);
        assert!([cache.l1, cache.l2, cache.l3].iter().all(|c| c.threads == 1 && c.inclusive));
        assert!(!cache.l4.is_present());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("48K\n"), Some(48 * 1024));
        assert_eq!(parse_size("32M"), Some(32 << 20));
        assert_eq!(parse_size("1G"), Some(1 << 30));
        assert_eq!(parse_size("4096"), Some(4096));
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("K"), None);
        assert_eq!(parse_size("abcK"), None);
    }

    #[test]
    fn test_count_cpu_list() {
        assert_eq!(count_cpu_list("0-3,8,10-11\n"), 7);
        assert_eq!(count_cpu_list("5"), 1);
        assert_eq!(count_cpu_list("0,x,2"), 2);
        assert_eq!(count_cpu_list("3-1"), 0);
        assert_eq!(count_cpu_list(""), 0);
    }

    #[test]
    fn test_count_cpu_list_huge_range_is_capped() {
        assert_eq!(count_cpu_list("0-4294967295"), MAX_SHARED_CPUS);
        assert_eq!(count_cpu_list(&format!("0-{}", usize::MAX)), MAX_SHARED_CPUS);
        assert_eq!(count_cpu_list(&format!("0-{0},0-{0}", usize::MAX)), MAX_SHARED_CPUS);
    }

    #[test]
    fn test_decode_garbage_geometry_saturates() {
        // Every geometry field at its maximum.
        let regs = CpuidRegs::new(1 | (1 << 5), u32::MAX, u32::MAX, 0);
        let d = decode_cache_descriptor(regs).unwrap();
        let expected = 4096usize
            .saturating_mul(1024)
            .saturating_mul(1024)
            .saturating_mul((u32::MAX as usize).saturating_add(1));
        assert_eq!(d.info.size, expected);
        assert_eq!(d.info.associativity, 1024);
    }

    // ── sysfs fixtures ──

    struct SysfsFixture {
        root: PathBuf,
    }

    impl SysfsFixture {
        fn new(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!("perfkern-sysfs-{tag}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&root);
            fs::create_dir_all(&root).unwrap();
            Self { root }
        }

        fn index(&self, idx: usize, entries: &[(&str, &str)]) -> &Self {
            let dir = self.root.join(format!("index{idx}"));
            fs::create_dir_all(&dir).unwrap();
            for (name, value) in entries {
                fs::write(dir.join(name), format!("{value}\n")).unwrap();
            }
            self
        }
    }

    impl Drop for SysfsFixture {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn sysfs_cache(level: &str, ty: &str, size: &str, ways: &str, shared: &str) -> [(&'static str, String); 6] {
        [
            ("level", level.to_string()),
            ("type", ty.to_string()),
            ("size", size.to_string()),
            ("ways_of_associativity", ways.to_string()),
            ("coherency_line_size", "64".to_string()),
            ("shared_cpu_list", shared.to_string()),
        ]
    }

    fn write_index(fx: &SysfsFixture, idx: usize, entries: &[(&'static str, String)]) {
        let borrowed: Vec<(&str, &str)> = entries.iter().map(|(k, v)| (*k, v.as_str())).collect();
        fx.index(idx, &borrowed);
    }

    #[test]
    fn test_sysfs_hierarchy() {
        let fx = SysfsFixture::new("hier");
        write_index(&fx, 0, &sysfs_cache("1", "Data", "64K", "4", "0"));
        write_index(&fx, 1, &sysfs_cache("1", "Instruction", "64K", "4", "0"));
        write_index(&fx, 2, &sysfs_cache("2", "Unified", "1024K", "8", "0-1"));
        write_index(&fx, 3, &sysfs_cache("3", "Unified", "32M", "16", "0-7,16-23"));

        let cache = SysfsCacheEnumerator::with_root(&fx.root).enumerate();
        assert_eq!(cache.l1.size, 64 * 1024);
        assert_eq!(cache.l1.threads, 1);
        assert_eq!(cache.l2.size, 1 << 20);
        assert_eq!(cache.l2.threads, 2);
        assert_eq!(cache.l2.associativity, 8);
        assert_eq!(cache.l3.size, 32 << 20);
        assert_eq!(cache.l3.threads, 16);
        assert_eq!(cache.l3.line_size, 64);
        assert!(!cache.l2.inclusive && !cache.l3.inclusive);
    }

    #[test]
    fn test_sysfs_skips_unreadable_index() {
        let fx = SysfsFixture::new("partial");
        // index0 has no size file.
        fx.index(0, &[("level", "1"), ("type", "Data")]);
        write_index(&fx, 1, &sysfs_cache("2", "Unified", "512K", "8", "0"));
        let cache = SysfsCacheEnumerator::with_root(&fx.root).enumerate();
        assert!(!cache.l1.is_present());
        assert_eq!(cache.l2.size, 512 * 1024);
    }

    #[test]
    fn test_sysfs_empty_falls_back_to_fixed() {
        let fx = SysfsFixture::new("empty");
        let cache = SysfsCacheEnumerator::with_root(&fx.root).enumerate();
        assert_eq!(cache, FixedCacheEnumerator::TOPOLOGY);

        let missing = SysfsCacheEnumerator::with_root(fx.root.join("does-not-exist")).enumerate();
        assert_eq!(missing, FixedCacheEnumerator::TOPOLOGY);
    }

    #[test]
    fn test_platform_enumerator_runs() {
        let e = platform_enumerator();
        let cache = e.enumerate();
        eprintln!("[cache] source={} L1={}K L2={}K L3={}K", e.name(), cache.l1.size / 1024, cache.l2.size / 1024, cache.l3.size / 1024);
    }
}

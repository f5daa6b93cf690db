use std::path::PathBuf;

/// Configuration for a [`CacheController`](crate::CacheController) instance.
///
/// Mirrors the plain config-struct-with-`Default` pattern used for TTL
/// caches elsewhere in the ecosystem (e.g. `TtlCacheConfig`), minus a
/// `from_env`/file loader — config *loading* is an explicit non-goal of
/// this crate (spec.md §1); callers construct this by hand or with the
/// builder methods below.
///
/// # Examples
///
/// ```
/// use tiercache::CacheConfig;
///
/// let config = CacheConfig::default()
///     .with_capacity(500)
///     .with_active_ttl_ms(60_000);
/// assert_eq!(config.capacity, 500);
/// assert_eq!(config.active_ttl_ms, 60_000);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Hard bound on the active-tier size. Default: 1000.
    pub capacity: usize,
    /// Per-entry TTL in the active tier, in milliseconds. Default: 300_000.
    pub active_ttl_ms: u64,
    /// Cleaner sweep period, in milliseconds. Default: 400_000.
    pub cleaner_period_ms: u64,
    /// Logical TTL of dormant records, in milliseconds. Default: 500_000.
    pub dormant_ttl_ms: u64,
    /// Path to the default file-backed dormant store. Ignored if an
    /// alternative `DormantStore` is supplied to `initialize`.
    pub dormant_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            active_ttl_ms: 300_000,
            cleaner_period_ms: 400_000,
            dormant_ttl_ms: 500_000,
            dormant_path: default_dormant_path(),
        }
    }
}

impl CacheConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_active_ttl_ms(mut self, active_ttl_ms: u64) -> Self {
        self.active_ttl_ms = active_ttl_ms;
        self
    }

    pub fn with_cleaner_period_ms(mut self, cleaner_period_ms: u64) -> Self {
        self.cleaner_period_ms = cleaner_period_ms;
        self
    }

    pub fn with_dormant_ttl_ms(mut self, dormant_ttl_ms: u64) -> Self {
        self.dormant_ttl_ms = dormant_ttl_ms;
        self
    }

    pub fn with_dormant_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dormant_path = path.into();
        self
    }
}

/// Resolves the §9 open question on the default dormant path: a stable,
/// OS-appropriate location rather than the original source's relative
/// `..\..\_crow` concatenation.
fn default_dormant_path() -> PathBuf {
    std::env::temp_dir().join("tiercache").join("dormant.json")
}

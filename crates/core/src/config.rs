use serde::Deserialize;

/// Flat configuration surface from spec.md §6. Loaded from a TOML file by
/// the binary (`src/main.rs`), following the teacher's
/// `tracing_subscriber`/`toml::from_str` idiom; environment-variable
/// overrides are applied afterwards and kept thin — spec.md §1 names
/// "configuration loading from environment" out of scope for this crate.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub frontier: FrontierConfig,
    pub scheduling: SchedulingConfig,
    #[serde(default)]
    pub filters: FiltersConfig,
    pub caching: CachingConfig,
    #[serde(default)]
    pub proxies: ProxiesConfig,
    pub storage: StorageConfig,
    pub submission: SubmissionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FrontierConfig {
    #[serde(default = "default_max_pool")]
    pub max_pool: usize,
    #[serde(default = "default_bulk_size")]
    pub bulk_size: usize,
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_seconds: u64,
    #[serde(default = "default_retry_interval")]
    pub retry_interval_seconds: u64,
    /// Runtime choice of frontier backend: `"memory"` (default, in-process)
    /// or `"sqlite"` (the "remote key-value store" backing option of
    /// spec.md §4.2).
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

fn default_max_pool() -> usize {
    64
}
fn default_bulk_size() -> usize {
    256
}
fn default_lock_timeout() -> u64 {
    30
}
fn default_retry_interval() -> u64 {
    300
}
fn default_backend() -> String {
    "memory".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulingConfig {
    #[serde(default = "default_darc_cpu")]
    pub darc_cpu: usize,
    #[serde(default)]
    pub parallel_process: bool,
    #[serde(default)]
    pub parallel_thread: bool,
    #[serde(default = "default_darc_wait")]
    pub darc_wait_seconds: u64,
    #[serde(default)]
    pub reboot: bool,
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub verbose: bool,
}

fn default_darc_cpu() -> usize {
    4
}
fn default_darc_wait() -> u64 {
    10
}

impl SchedulingConfig {
    /// spec.md §9 Open Question: both concurrency modes toggled on is
    /// undefined in the source; this spec mandates mutual exclusivity and
    /// rejection at startup.
    pub fn validate(&self) -> Result<(), String> {
        if self.parallel_process && self.parallel_thread {
            return Err("parallel_process and parallel_thread are mutually exclusive".to_string());
        }
        Ok(())
    }
}

/// One gate's allow/deny regex lists plus fallback polarity (spec.md §4.3).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GateList {
    #[serde(default)]
    pub white: Vec<String>,
    #[serde(default)]
    pub black: Vec<String>,
    #[serde(default)]
    pub fallback: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FiltersConfig {
    #[serde(default)]
    pub link: GateList,
    #[serde(default)]
    pub mime: GateList,
    #[serde(default)]
    pub proxy: GateList,
    /// `CHECK_NG` of spec.md §4.9: probe extracted links with a HEAD request
    /// and drop ones whose content-type fails the `mime` gate before they
    /// ever reach the fetch queue.
    #[serde(default)]
    pub check_ng: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CachingConfig {
    /// Seconds. `None` means "forever" — process a URL at most once
    /// (spec.md §5, "A null `TIME_CACHE` means forever").
    #[serde(default)]
    pub time_cache_seconds: Option<u64>,
    #[serde(default = "default_se_wait")]
    pub se_wait_seconds: u64,
}

fn default_se_wait() -> u64 {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxyParams {
    #[serde(default)]
    pub addrs: Vec<String>,
    #[serde(default)]
    pub retry: u32,
    #[serde(default)]
    pub wait_seconds: u64,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProxiesConfig {
    #[serde(default)]
    pub tor: Option<ProxyParams>,
    #[serde(default)]
    pub i2p: Option<ProxyParams>,
    #[serde(default)]
    pub freenet: Option<ProxyParams>,
    #[serde(default)]
    pub zeronet: Option<ProxyParams>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path_data: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmissionConfig {
    #[serde(default)]
    pub api_new_host: Option<String>,
    #[serde(default)]
    pub api_requests: Option<String>,
    #[serde(default)]
    pub api_selenium: Option<String>,
    #[serde(default = "default_api_retry")]
    pub api_retry: u32,
}

fn default_api_retry() -> u32 {
    3
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            frontier: FrontierConfig {
                max_pool: default_max_pool(),
                bulk_size: default_bulk_size(),
                lock_timeout_seconds: default_lock_timeout(),
                retry_interval_seconds: default_retry_interval(),
                backend: default_backend(),
                sqlite_path: None,
            },
            scheduling: SchedulingConfig {
                darc_cpu: default_darc_cpu(),
                parallel_process: false,
                parallel_thread: false,
                darc_wait_seconds: default_darc_wait(),
                reboot: false,
                force: false,
                debug: false,
                verbose: false,
            },
            filters: FiltersConfig::default(),
            caching: CachingConfig {
                time_cache_seconds: Some(86400),
                se_wait_seconds: default_se_wait(),
            },
            proxies: ProxiesConfig::default(),
            storage: StorageConfig {
                path_data: "./data".to_string(),
            },
            submission: SubmissionConfig {
                api_new_host: None,
                api_requests: None,
                api_selenium: None,
                api_retry: default_api_retry(),
            },
        }
    }
}

// Run configuration shared by discovery, the API client and the batch driver.
// Built once from CLI arguments and passed around by reference; nothing in the
// crate mutates it afterwards.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Annotation server used when `--host` / `MULTIVIEW_HOST` is not given.
pub const DEFAULT_HOST: &str = "http://localhost:8080";

/// Cameras per recording session in the multisensor datasets.
pub const DEFAULT_VIEW_COUNT: u32 = 5;

/// Dataset folders scanned when `--datasets` is not given.
pub const DEFAULT_DATASETS: [&str; 2] = ["multisensor_home1", "multisensor_home2"];

/// Timeout for the login round-trip.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for one task upload. Five large videos can take several minutes.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Environment variable names accepted as fallbacks for CLI flags.
pub const ENV_HOST: &str = "MULTIVIEW_HOST";
pub const ENV_USER: &str = "MULTIVIEW_USER";
pub const ENV_PASSWORD: &str = "MULTIVIEW_PASSWORD";
pub const ENV_ORG: &str = "MULTIVIEW_ORG";
pub const ENV_API_TOKEN: &str = "MULTIVIEW_API_TOKEN";

/// Everything a batch run needs besides credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the annotation server, without trailing slash.
    pub host: String,
    /// Root containing one folder per dataset.
    pub data_dir: PathBuf,
    pub datasets: Vec<String>,
    /// Explicit subdirectories; `None` means auto-detect numeric folders.
    pub subdirs: Option<Vec<String>>,
    /// Session allowlist; `None` means every session.
    pub sessions: Option<BTreeSet<String>>,
    pub view_count: u32,
    pub limit: Option<usize>,
    pub dry_run: bool,
    /// Organization slug sent as `X-Organization`.
    pub org: Option<String>,
}

impl Config {
    /// Configuration with every default applied for the given data root.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Config {
            host: DEFAULT_HOST.to_string(),
            data_dir: data_dir.into(),
            datasets: DEFAULT_DATASETS.iter().map(|s| s.to_string()).collect(),
            subdirs: None,
            sessions: None,
            view_count: DEFAULT_VIEW_COUNT,
            limit: None,
            dry_run: false,
            org: None,
        }
    }
}

/// Strip trailing slashes so URLs can be built with `format!("{host}/api/...")`.
pub fn normalize_host(host: &str) -> String {
    host.trim_end_matches('/').to_string()
}

//! Orchestrator configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use mcphub_jobs::JobManagerConfig;
use mcphub_store::StatusCache;

/// Environment variable overriding the mcphub home directory.
pub const HOME_ENV: &str = "MCPHUB_HOME";

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for mcphub state.
    pub home: PathBuf,

    /// Entity catalog (YAML).
    pub catalog_path: PathBuf,

    /// Root of the per-job directories.
    pub jobs_dir: PathBuf,

    /// Shared status cache file.
    pub status_cache_path: PathBuf,

    /// How long a probed status stays valid.
    pub cache_ttl: Duration,

    /// Timeout for the status cache lock.
    pub cache_lock_timeout: Duration,

    /// Job status poll interval.
    pub poll_interval: Duration,

    /// Time a cancelled job gets before SIGKILL.
    pub cancel_grace: Duration,

    /// Maximum jobs running at once per process.
    pub max_concurrent_jobs: usize,

    /// Host CLI whose `mcp list` tells what is registered.
    pub host_cli: String,

    /// Container runtime used to inspect images.
    pub container_runtime: String,

    /// Upper bound on how long install/register/uninstall wait for their job.
    pub operation_timeout: Option<Duration>,
}

impl Config {
    /// Configuration with every path under `home`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            catalog_path: home.join("catalog.yaml"),
            jobs_dir: home.join("jobs"),
            status_cache_path: home.join("status_cache.json"),
            home,
            cache_ttl: mcphub_store::DEFAULT_TTL,
            cache_lock_timeout: mcphub_store::DEFAULT_LOCK_TIMEOUT,
            poll_interval: Duration::from_millis(200),
            cancel_grace: Duration::from_secs(5),
            max_concurrent_jobs: 4,
            host_cli: "claude".to_string(),
            container_runtime: "docker".to_string(),
            operation_timeout: None,
        }
    }

    /// Resolve a possibly relative path against the home directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.home.join(path)
        }
    }

    /// Job manager settings derived from this configuration.
    pub fn job_manager_config(&self) -> JobManagerConfig {
        let mut config = JobManagerConfig::new(&self.jobs_dir)
            .with_max_concurrent_jobs(self.max_concurrent_jobs)
            .with_poll_interval(self.poll_interval)
            .with_cancel_grace(self.cancel_grace);
        config.lock_timeout = self.cache_lock_timeout.max(Duration::from_secs(1));
        config
    }

    /// The status cache described by this configuration.
    pub fn status_cache(&self) -> StatusCache {
        StatusCache::new(&self.status_cache_path)
            .with_ttl(self.cache_ttl)
            .with_lock_timeout(self.cache_lock_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::with_home(default_home())
    }
}

/// `$MCPHUB_HOME`, else `$HOME/.mcphub`, else `./.mcphub`.
pub fn default_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    std::env::var_os("HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcphub")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_home() {
        let config = Config::with_home("/srv/mcphub");
        assert_eq!(config.catalog_path, PathBuf::from("/srv/mcphub/catalog.yaml"));
        assert_eq!(config.jobs_dir, PathBuf::from("/srv/mcphub/jobs"));
        assert_eq!(config.status_cache_path, PathBuf::from("/srv/mcphub/status_cache.json"));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.resolve("tools/uniprot"), PathBuf::from("/srv/mcphub/tools/uniprot"));
        assert_eq!(config.resolve("/opt/x"), PathBuf::from("/opt/x"));
    }

    #[test]
    fn test_job_manager_config() {
        let mut config = Config::with_home("/srv/mcphub");
        config.max_concurrent_jobs = 2;
        let jobs = config.job_manager_config();
        assert_eq!(jobs.jobs_dir, PathBuf::from("/srv/mcphub/jobs"));
        assert_eq!(jobs.max_concurrent_jobs, 2);
        assert_eq!(jobs.poll_interval, Duration::from_millis(200));
    }
}

use serde::Deserialize;
use std::time::Duration;

use crate::services::worker::WorkerSettings;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the worker.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Prometheus listener for the worker process.
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Pool size. Defaults to worker concurrency plus headroom for polling.
    #[serde(default)]
    pub database_max_connections: Option<u32>,

    /// Vision service API key
    pub vision_api_key: String,

    /// Vision service base URL
    #[serde(default = "default_vision_endpoint")]
    pub vision_endpoint: String,

    /// Maximum concurrently running job handlers
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Maximum jobs claimed per poll
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: usize,

    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    #[serde(default = "default_busy_poll_ms")]
    pub busy_poll_ms: u64,

    /// Seconds before a Processing job may be reclaimed by another poll
    #[serde(default = "default_job_lease_secs")]
    pub job_lease_secs: u64,

    /// Claims a job may receive before an expired lease fails it
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub vision_timeout_secs: u64,

    /// Largest image body the worker will download
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,

    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_vision_endpoint() -> String {
    "https://vision.googleapis.com/v1".to_string()
}

fn default_worker_concurrency() -> usize {
    8
}

fn default_poll_batch_size() -> usize {
    5
}

fn default_idle_poll_ms() -> u64 {
    2000
}

fn default_busy_poll_ms() -> u64 {
    500
}

fn default_job_lease_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_image_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_shutdown_grace_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            concurrency: self.worker_concurrency,
            batch_size: self.poll_batch_size,
            idle_poll: Duration::from_millis(self.idle_poll_ms),
            busy_poll: Duration::from_millis(self.busy_poll_ms),
            lease: Duration::from_secs(self.job_lease_secs),
            max_attempts: self.max_attempts,
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }

    pub fn pool_size(&self) -> u32 {
        self.database_max_connections.unwrap_or_else(|| {
            u32::try_from(self.worker_concurrency)
                .unwrap_or(u32::MAX)
                .saturating_add(2)
        })
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn vision_timeout(&self) -> Duration {
        Duration::from_secs(self.vision_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/intake".to_string()),
            ("VISION_API_KEY".to_string(), "k".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.poll_batch_size, 5);
        assert_eq!(config.worker_concurrency, 8);

        let settings = config.worker_settings();
        assert_eq!(settings.idle_poll, Duration::from_secs(2));
        assert_eq!(settings.busy_poll, Duration::from_millis(500));
        assert_eq!(settings.lease, Duration::from_secs(300));
        assert_eq!(config.pool_size(), 10);
        assert_eq!(settings.max_attempts, 3);
    }

    #[test]
    fn test_overrides() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/intake".to_string()),
            ("VISION_API_KEY".to_string(), "k".to_string()),
            ("WORKER_CONCURRENCY".to_string(), "2".to_string()),
            ("JOB_LEASE_SECS".to_string(), "30".to_string()),
            ("MAX_ATTEMPTS".to_string(), "5".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.worker_settings().concurrency, 2);
        assert_eq!(config.worker_settings().lease, Duration::from_secs(30));
        assert_eq!(config.pool_size(), 4);
        assert_eq!(config.worker_settings().max_attempts, 5);
    }

    #[test]
    fn test_pool_size_saturates() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/intake".to_string()),
            ("VISION_API_KEY".to_string(), "k".to_string()),
            ("WORKER_CONCURRENCY".to_string(), u64::MAX.to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.pool_size(), u32::MAX);

        let mut config = config;
        config.worker_concurrency = (u32::MAX - 1) as usize;
        assert_eq!(config.pool_size(), u32::MAX);
    }

    #[test]
    fn test_missing_database_url() {
        let vars = vec![("VISION_API_KEY".to_string(), "k".to_string())];
        assert!(envy::from_iter::<_, AppConfig>(vars).is_err());
    }
}

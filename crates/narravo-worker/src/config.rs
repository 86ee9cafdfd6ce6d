//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum scheduler tasks processed concurrently
    pub max_concurrent_tasks: usize,
    /// Parallel provider calls within one material stage
    pub stage_parallel: usize,
    /// Parallel sentence syntheses within one video task
    pub sentence_parallel: usize,
    /// In-flight provider requests per API key
    pub gateway_concurrency: usize,
    /// Work directory for task temp dirs
    pub work_dir: String,
    /// How often to promote due retries and claim orphaned tasks
    pub housekeeping_interval: Duration,
    /// Minimum idle time before claiming another worker's pending task
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 2,
            stage_parallel: 8,
            sentence_parallel: 3,
            gateway_concurrency: 5,
            work_dir: "/tmp/narravo".to_string(),
            housekeeping_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(900),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_tasks: env_usize("WORKER_MAX_TASKS", defaults.max_concurrent_tasks),
            stage_parallel: env_usize("WORKER_STAGE_PARALLEL", defaults.stage_parallel),
            sentence_parallel: env_usize("WORKER_SENTENCE_PARALLEL", defaults.sentence_parallel),
            gateway_concurrency: env_usize("WORKER_GATEWAY_CONCURRENCY", defaults.gateway_concurrency),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            housekeeping_interval: Duration::from_secs(env_u64(
                "WORKER_HOUSEKEEPING_SECS",
                defaults.housekeeping_interval.as_secs(),
            )),
            claim_min_idle: Duration::from_secs(env_u64(
                "WORKER_CLAIM_MIN_IDLE_SECS",
                defaults.claim_min_idle.as_secs(),
            )),
            shutdown_timeout: Duration::from_secs(env_u64(
                "WORKER_SHUTDOWN_TIMEOUT",
                defaults.shutdown_timeout.as_secs(),
            )),
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

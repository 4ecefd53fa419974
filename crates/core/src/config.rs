use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cursor::SortOrder;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `AUTOGRAD_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("AUTOGRAD_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            redis: RedisConfig::from_env_profiled(p),
            worker: WorkerConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:  {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  redis:   namespace={}, worker_id={}",
            self.redis.namespace,
            self.redis.worker_id
        );
        tracing::info!(
            "  worker:  concurrency={}, max_fails={}, cron=\"{}\"",
            self.worker.concurrency,
            self.worker.max_fails,
            self.worker.check_due_cron
        );
        tracing::info!(
            "  pipeline: page_size={}, timeout={}s, channel_capacity={}",
            self.worker.due_page_size,
            self.worker.pipeline_timeout_secs,
            self.worker.pipeline_channel_capacity
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "PORT", 8080),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ── Redis ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Key prefix for every job-queue key.
    pub namespace: String,
    /// Owner of this process's in-progress list. Unique per running worker.
    pub worker_id: String,
}

impl RedisConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "REDIS_URL", "redis://127.0.0.1:6379"),
            namespace: profiled_env_or(p, "REDIS_NAMESPACE", "autograd"),
            worker_id: profiled_env_or(
                p,
                "REDIS_WORKER_ID",
                &env_or("HOSTNAME", "autograd-worker"),
            ),
        }
    }
}

// ── Worker / pipeline ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub max_fails: u32,
    /// Cron expression that triggers the due-assignment check.
    pub check_due_cron: String,
    pub due_page_size: u64,
    pub due_sort: SortOrder,
    pub pipeline_timeout_secs: u64,
    pub pipeline_channel_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_fails: 4,
            check_due_cron: "0 * * * * *".to_string(),
            due_page_size: 10,
            due_sort: SortOrder::CreatedAtDesc,
            pipeline_timeout_secs: 60,
            pipeline_channel_capacity: 1,
        }
    }
}

impl WorkerConfig {
    fn from_env_profiled(p: &str) -> Self {
        let defaults = Self::default();
        Self {
            concurrency: profiled_env_parse(p, "WORKER_CONCURRENCY", defaults.concurrency).max(1),
            max_fails: profiled_env_parse(p, "WORKER_MAX_FAILS", defaults.max_fails).max(1),
            check_due_cron: profiled_env_or(p, "CHECK_DUE_CRON", &defaults.check_due_cron),
            due_page_size: profiled_env_parse(p, "DUE_PAGE_SIZE", defaults.due_page_size).max(1),
            due_sort: profiled_env_parse(p, "DUE_SORT", defaults.due_sort),
            pipeline_timeout_secs: profiled_env_parse(
                p,
                "PIPELINE_TIMEOUT_SECS",
                defaults.pipeline_timeout_secs,
            ),
            pipeline_channel_capacity: profiled_env_parse(
                p,
                "PIPELINE_CHANNEL_CAPACITY",
                defaults.pipeline_channel_capacity,
            )
            .max(1),
        }
    }

    pub fn pipeline_timeout(&self) -> Duration {
        Duration::from_secs(self.pipeline_timeout_secs)
    }
}

use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    /// Unset means the in-memory store (local development only).
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub db_max_connections: u32,
    /// JSON seed for the in-memory store.
    pub memory_seed_path: Option<String>,
    pub limits: Limits,
}

/// Caps that bound response size and recommendation scan cost.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Limits {
    pub available_page_size: i64,
    pub slot_scan_per_doctor: i64,
    pub max_candidate_doctors: i64,
    pub default_max_results: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            available_page_size: 50,
            slot_scan_per_doctor: 20,
            max_candidate_doctors: 100,
            default_max_results: 10,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.trim().is_empty());
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let db_max_connections = env_or("DB_MAX_CONNECTIONS", 10u32);
        let memory_seed_path = env::var("MEMORY_SEED").ok();

        let defaults = Limits::default();
        let limits = Limits {
            available_page_size: env_or("AVAILABLE_PAGE_SIZE", defaults.available_page_size),
            slot_scan_per_doctor: env_or("SLOT_SCAN_PER_DOCTOR", defaults.slot_scan_per_doctor),
            max_candidate_doctors: env_or("MAX_CANDIDATE_DOCTORS", defaults.max_candidate_doctors),
            default_max_results: env_or("DEFAULT_MAX_RESULTS", defaults.default_max_results),
        };
        if limits.available_page_size <= 0
            || limits.slot_scan_per_doctor <= 0
            || limits.max_candidate_doctors <= 0
            || limits.default_max_results == 0
        {
            anyhow::bail!("limits must be positive: {limits:?}");
        }

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            memory_seed_path,
            limits,
        })
    }
}

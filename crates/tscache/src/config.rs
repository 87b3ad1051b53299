//! Server configuration and command-line arguments.

use crate::error::{CacheError, Result};
use crate::registry::DEFAULT_ID_ORIGIN;
use crate::series::SeriesId;
use clap::Parser;
use std::time::Duration;

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:7070";

/// Default number of worker threads.
pub const DEFAULT_WORKERS: usize = 4;

/// Default number of queued connections per worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default per-connection read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request line limit (1 MiB).
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Configuration for [`crate::server::Server`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub bind_addr: String,
    /// Number of worker threads.
    pub workers: usize,
    /// Queued connections per worker before accepting blocks.
    pub queue_capacity: usize,
    /// Maximum time to wait for a request line.
    pub read_timeout: Duration,
    /// Maximum request line length in bytes, newline excluded.
    pub max_line_bytes: usize,
    /// First ID handed out by the registry.
    pub id_origin: SeriesId,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            id_origin: DEFAULT_ID_ORIGIN,
        }
    }
}

impl ServerConfig {
    /// Sets the listen address.
    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    /// Sets the number of worker threads.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the queued connections per worker.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the read timeout.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Sets the request line limit.
    pub fn with_max_line_bytes(mut self, max_line_bytes: usize) -> Self {
        self.max_line_bytes = max_line_bytes;
        self
    }

    /// Sets the first registry ID.
    pub fn with_id_origin(mut self, id_origin: SeriesId) -> Self {
        self.id_origin = id_origin;
        self
    }

    /// Total queue length shared by all workers.
    pub fn total_queue_capacity(&self) -> usize {
        self.workers.saturating_mul(self.queue_capacity)
    }

    /// Checks that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(CacheError::InvalidConfig("workers must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(CacheError::InvalidConfig(
                "queue_capacity must be > 0".into(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(CacheError::InvalidConfig(
                "read_timeout must be > 0".into(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(CacheError::InvalidConfig(
                "max_line_bytes must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "tscache")]
#[command(about = "In-memory timeseries cache server")]
pub struct CliArgs {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_BIND_ADDR, env = "TSCACHE_BIND")]
    pub bind: String,

    /// Number of worker threads
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, env = "TSCACHE_WORKERS")]
    pub workers: usize,

    /// Queued connections per worker
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, env = "TSCACHE_QUEUE_CAPACITY")]
    pub queue_capacity: usize,

    /// Read timeout in milliseconds
    #[arg(long, default_value_t = 5_000, env = "TSCACHE_READ_TIMEOUT_MS")]
    pub read_timeout_ms: u64,

    /// Maximum request line length in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_BYTES, env = "TSCACHE_MAX_LINE_BYTES")]
    pub max_line_bytes: usize,

    /// First ID handed out by ALLOC
    #[arg(long, default_value_t = DEFAULT_ID_ORIGIN, env = "TSCACHE_ID_ORIGIN")]
    pub id_origin: SeriesId,
}

impl CliArgs {
    /// Builds a validated server configuration.
    pub fn into_config(self) -> Result<ServerConfig> {
        let config = ServerConfig::default()
            .with_bind_addr(self.bind)
            .with_workers(self.workers)
            .with_queue_capacity(self.queue_capacity)
            .with_read_timeout(Duration::from_millis(self.read_timeout_ms))
            .with_max_line_bytes(self.max_line_bytes)
            .with_id_origin(self.id_origin);
        config.validate()?;
        Ok(config)
    }
}

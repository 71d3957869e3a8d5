//! Relay configuration.

use std::time::Duration;

use ncrelay_core::{
    ConfigError, DEFAULT_POLL_INTERVAL, DEFAULT_SHUTDOWN_TIMEOUT, EngineConfig, SuppressionLevel,
};

/// Default cap on concurrent sessions.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default cap on threads running engine calls.
pub const DEFAULT_ENGINE_THREADS: usize = 64;

/// Default wait for engine calls still running once the pool stops.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);

/// Where engine calls execute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineDispatch {
    /// Engine calls run on the blocking thread pool, so a slow engine never
    /// stalls the async workers serving other sessions.
    #[default]
    Offload,
    /// Engine calls run directly on the session's async task.
    Inline,
}

/// Settings shared by every session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Configuration handed to the engine backend for each new session
    pub engine: EngineConfig,
    /// Suppression intensity applied to every frame
    pub suppression: SuppressionLevel,
    /// Where engine calls execute
    pub dispatch: EngineDispatch,
}

impl SessionSettings {
    /// Settings for `engine` at full suppression with offloaded dispatch.
    pub fn new(engine: EngineConfig) -> Self {
        Self { engine, suppression: SuppressionLevel::default(), dispatch: EngineDispatch::default() }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to (e.g., "0.0.0.0:9000")
    pub bind_address: String,
    /// Maximum concurrent sessions
    pub max_connections: usize,
    /// Grace period for in-flight sessions once shutdown begins
    pub shutdown_timeout: Duration,
    /// How often the drain checks the active count
    pub poll_interval: Duration,
    /// Per-session settings
    pub session: SessionSettings,
}

impl RelayConfig {
    /// Config binding `bind_address` with defaults for everything else.
    pub fn new(bind_address: impl Into<String>, engine: EngineConfig) -> Self {
        Self {
            bind_address: bind_address.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            session: SessionSettings::new(engine),
        }
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroConnectionLimit);
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        self.session.engine.validate()
    }
}

/// Sizing of the execution pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Async worker threads. `None` sizes to the machine, never below two.
    pub workers: Option<usize>,
    /// Upper bound on threads running engine calls
    pub engine_threads: usize,
    /// How long stopping the pool waits for engine calls still in flight
    pub stop_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: None,
            engine_threads: DEFAULT_ENGINE_THREADS,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

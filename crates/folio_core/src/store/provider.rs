//! Memoized store handle construction.
//!
//! # Responsibility
//! - Build the store handle from configuration on first use.
//! - Hand out the same handle for the provider's lifetime.
//!
//! # Invariants
//! - Configuration problems fail the first call; no half-built handle is
//!   ever returned.
//! - A failed construction is not memoized.
//! - The handle is read-only after construction.

use super::sqlite::SqliteKvStore;
use super::{KvStore, StoreError};
use crate::config::{ConfigError, StoreConfig};
use log::{error, info};
use once_cell::sync::{Lazy, OnceCell};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

static GLOBAL_PROVIDER: Lazy<ConnectionProvider> = Lazy::new(ConnectionProvider::from_env);

type ConfigLoader = Box<dyn Fn() -> Result<StoreConfig, ConfigError> + Send + Sync>;

#[derive(Debug)]
pub enum ProviderError {
    Config(ConfigError),
    Store(StoreError),
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "store configuration: {err}"),
            Self::Store(err) => write!(f, "store open failed: {err}"),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ProviderError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<StoreError> for ProviderError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Cheap-to-clone handle to the configured store.
#[derive(Clone)]
pub struct StoreHandle {
    region: Arc<str>,
    call_timeout: Duration,
    store: Arc<SqliteKvStore>,
}

impl StoreHandle {
    /// Opens the store described by `config`.
    pub fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::from_store(
            &config.region,
            config.call_timeout,
            SqliteKvStore::open(&config.location)?,
        ))
    }

    /// Wraps an already opened store.
    pub fn from_store(region: &str, call_timeout: Duration, store: SqliteKvStore) -> Self {
        Self {
            region: Arc::from(region),
            call_timeout,
            store: Arc::new(store),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Store seen through the item contract.
    pub fn kv(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    /// Backend used for schema administration.
    pub fn backend(&self) -> &SqliteKvStore {
        &self.store
    }

    /// Whether both handles share the same underlying store instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }
}

/// Lazily builds one [`StoreHandle`] and returns it on every call.
pub struct ConnectionProvider {
    load_config: ConfigLoader,
    handle: OnceCell<StoreHandle>,
}

impl ConnectionProvider {
    /// Provider reading its configuration from the process environment.
    pub fn from_env() -> Self {
        Self::new(StoreConfig::from_env)
    }

    /// Provider reading its configuration through `load_config`.
    pub fn new(
        load_config: impl Fn() -> Result<StoreConfig, ConfigError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            load_config: Box::new(load_config),
            handle: OnceCell::new(),
        }
    }

    /// Returns the memoized handle, constructing it on first use.
    ///
    /// # Errors
    /// - `ProviderError::Config` when required settings are absent or invalid.
    /// - `ProviderError::Store` when the store cannot be opened.
    pub fn handle(&self) -> Result<StoreHandle, ProviderError> {
        self.handle
            .get_or_try_init(|| {
                let started_at = Instant::now();
                let config = (self.load_config)().map_err(|err| {
                    error!(
                        "event=store_handle_init module=store status=error error_code=config_invalid error={err}"
                    );
                    ProviderError::Config(err)
                })?;
                let handle = StoreHandle::connect(&config).map_err(|err| {
                    error!(
                        "event=store_handle_init module=store status=error error_code=store_open_failed region={} error={err}",
                        config.region
                    );
                    ProviderError::Store(err)
                })?;
                info!(
                    "event=store_handle_init module=store status=ok region={} duration_ms={}",
                    config.region,
                    started_at.elapsed().as_millis()
                );
                Ok(handle)
            })
            .cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.handle.get().is_some()
    }
}

/// Returns the process-wide handle configured from the environment.
pub fn get_handle() -> Result<StoreHandle, ProviderError> {
    GLOBAL_PROVIDER.handle()
}

// Durable scratch state that survives process restarts
pub mod file;
pub mod redis_store;

pub use file::FileCounterStore;
pub use redis_store::RedisCounterStore;

use crate::config::{Settings, StoreBackend};
use crate::error::TradeError;
use crate::models::Security;
use crate::Result;
use std::collections::BTreeSet;

/// Slot holding the cumulative realized profit
pub const TOTAL_PROFIT_KEY: &str = "total_profit_usd";
/// Slot holding securities currently mid-cycle
pub const ACTIVE_SET_KEY: &str = "actively_trading";

/// Key-value slots, each key an independent durable value
///
/// No locking and no multi-key transactions: one live process per store.
#[allow(async_fn_in_trait)]
pub trait CounterStore {
    async fn read(&self, key: &str) -> Result<Option<String>>;

    async fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Tokens of a set slot, exact values
    async fn members(&self, key: &str) -> Result<Vec<String>>;

    /// Add a token to a set slot (no-op if present)
    async fn append(&self, key: &str, token: &str) -> Result<()>;

    /// Remove a token from a set slot (no-op if absent)
    async fn remove(&self, key: &str, token: &str) -> Result<()>;
}

/// Backend chosen at startup
pub enum Store {
    File(FileCounterStore),
    Redis(RedisCounterStore),
}

impl Store {
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        match settings.store_backend {
            StoreBackend::File => {
                tracing::info!("Using file store in {}", settings.store_dir.display());
                Ok(Store::File(FileCounterStore::new(&settings.store_dir)))
            }
            StoreBackend::Redis => Ok(Store::Redis(
                RedisCounterStore::new(&settings.redis_url).await?,
            )),
        }
    }
}

impl CounterStore for Store {
    async fn read(&self, key: &str) -> Result<Option<String>> {
        match self {
            Store::File(s) => s.read(key).await,
            Store::Redis(s) => s.read(key).await,
        }
    }

    async fn write(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Store::File(s) => s.write(key, value).await,
            Store::Redis(s) => s.write(key, value).await,
        }
    }

    async fn members(&self, key: &str) -> Result<Vec<String>> {
        match self {
            Store::File(s) => s.members(key).await,
            Store::Redis(s) => s.members(key).await,
        }
    }

    async fn append(&self, key: &str, token: &str) -> Result<()> {
        match self {
            Store::File(s) => s.append(key, token).await,
            Store::Redis(s) => s.append(key, token).await,
        }
    }

    async fn remove(&self, key: &str, token: &str) -> Result<()> {
        match self {
            Store::File(s) => s.remove(key, token).await,
            Store::Redis(s) => s.remove(key, token).await,
        }
    }
}

/// Typed bookkeeping over a `CounterStore`
///
/// Releasing a security and recording profit are separate writes; a crash
/// between them leaves the profit unrecorded, which a restart tolerates.
pub struct TradeLedger<S> {
    store: S,
}

impl<S: CounterStore> TradeLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Read a numeric slot, falling back to `default` when absent
    pub async fn read_value(&self, key: &str, default: f64) -> Result<f64> {
        match self.store.read(key).await? {
            Some(raw) if !raw.is_empty() => raw.parse().map_err(|_| {
                TradeError::Store(format!("slot {} holds non-numeric value {:?}", key, raw))
            }),
            _ => Ok(default),
        }
    }

    pub async fn write_value(&self, key: &str, value: f64) -> Result<()> {
        self.store.write(key, &value.to_string()).await
    }

    pub async fn total_profit(&self) -> Result<f64> {
        self.read_value(TOTAL_PROFIT_KEY, 0.0).await
    }

    /// Add a realized profit (may be negative) and return the new total
    pub async fn add_profit(&self, profit: f64) -> Result<f64> {
        let total = self.total_profit().await? + profit;
        self.write_value(TOTAL_PROFIT_KEY, total).await?;
        Ok(total)
    }

    pub async fn active_set(&self) -> Result<BTreeSet<Security>> {
        Ok(self
            .store
            .members(ACTIVE_SET_KEY)
            .await?
            .into_iter()
            .map(Security::new)
            .collect())
    }

    pub async fn mark_active(&self, security: &Security) -> Result<()> {
        self.store.append(ACTIVE_SET_KEY, security.as_str()).await
    }

    pub async fn release(&self, security: &Security) -> Result<()> {
        self.store.remove(ACTIVE_SET_KEY, security.as_str()).await
    }
}

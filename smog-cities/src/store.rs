//! The interface caches are written against.

use crate::{domain::Country, domain::RankedCities, normalize::NormalizedKey};
use async_trait::async_trait;
use thiserror::Error;

/// Errors a store backend may report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("The store backend is unavailable: {0}")]
    Unavailable(#[source] anyhow::Error),
}

/// A key/value store.
///
/// Entries never expire on their own. Implementations decide how entries are
/// held; the in-memory one lives in `smog-cache`.
#[async_trait]
pub trait Store<K, V>: Send + Sync
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// An operator-visible name for this store.
    fn name(&self) -> String;

    /// Get a copy of the value stored at `key`, if any.
    async fn get(&self, key: &K) -> Result<Option<V>, StoreError>;

    /// Store `value` at `key`, replacing any previous value.
    async fn insert(&self, key: K, value: V) -> Result<(), StoreError>;
}

/// The per-country cache of ranked cities.
pub type ResultStore = dyn Store<Country, RankedCities>;

/// The cache of city descriptions. `None` values are descriptions known to be
/// missing.
pub type DescriptionStore = dyn Store<NormalizedKey, Option<String>>;

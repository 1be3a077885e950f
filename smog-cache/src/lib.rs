#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Manages Smog's caches.

mod memory;

pub use crate::memory::MemoryStore;

use smog_cities::{Country, NormalizedKey, RankedCities};

/// An in-memory cache of ranked cities, keyed by country.
pub type MemoryResultStore = MemoryStore<Country, RankedCities>;

/// An in-memory cache of city descriptions, keyed by canonical city name.
pub type MemoryDescriptionStore = MemoryStore<NormalizedKey, Option<String>>;

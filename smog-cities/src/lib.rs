#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! The domain of [Smog](../smog/index.html): ranking the most polluted cities
//! of a country.
//!
//! This crate holds the pieces that don't talk to the network themselves:
//!
//! - the [`normalize`] function that turns free-text city names into
//!   [`NormalizedKey`]s,
//! - the [`RateGate`] trait and the [`LeakyBucketGate`] that spaces outbound
//!   calls,
//! - the [`Store`] trait that caches are written against,
//! - the [`PollutionSource`] and [`DescriptionLookup`] traits implemented by
//!   the HTTP clients in `smog-pollution` and `smog-wikipedia`,
//! - the [`CityAggregator`] that drives all of the above, and the
//!   [`paginate`] function it serves pages with.

mod aggregator;
mod domain;
mod gate;
mod normalize;
mod pagination;
mod store;

pub use crate::aggregator::{CitiesError, CitiesResponse, CityAggregator};
pub use crate::domain::{CacheStatus, CleanCityRecord, Country, RankedCities, RawCityRecord};
pub use crate::gate::{LeakyBucketGate, RateGate, Ungated};
pub use crate::normalize::{normalize, NormalizedKey};
pub use crate::pagination::{paginate, resolve_page, Page};
pub use crate::store::{DescriptionStore, ResultStore, Store, StoreError};

use async_trait::async_trait;
use thiserror::Error;

/// An upstream that lists pollution readings for the cities of a country.
#[async_trait]
pub trait PollutionSource: Send + Sync {
    /// An operator-visible name for this source.
    fn name(&self) -> String;

    /// Retrieve every record the upstream has for `country`.
    ///
    /// Failures are not reported to the caller. A source that fails part way
    /// through returns whatever it had collected up to that point.
    async fn fetch_all_cities(&self, country: &Country) -> Vec<RawCityRecord>;
}

/// A service that can describe a city in a sentence or two.
#[async_trait]
pub trait DescriptionLookup: Send + Sync {
    /// An operator-visible name for this lookup.
    fn name(&self) -> String;

    /// Describe the city called `name`, or `None` if the description could not
    /// be retrieved.
    async fn description(&self, name: &NormalizedKey) -> Option<String>;
}

/// Errors that may occur while building a component from settings.
#[derive(Debug, Error)]
#[allow(missing_docs, clippy::missing_docs_in_private_items)]
pub enum SetupError {
    #[error("This component cannot be used with the current Smog configuration")]
    InvalidConfiguration(#[source] anyhow::Error),

    #[error("There was a network error while setting up this component")]
    Network(#[source] anyhow::Error),
}

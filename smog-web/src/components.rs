//! Assembly of the process-wide pieces every worker shares.

use cadence::StatsdClient;
use smog_cache::{MemoryDescriptionStore, MemoryResultStore};
use smog_cities::{CityAggregator, LeakyBucketGate, SetupError};
use smog_pollution::PollutionApiClient;
use smog_settings::Settings;
use smog_wikipedia::WikipediaDescriptions;
use std::sync::Arc;

/// Build the aggregator, and the gates, caches and clients behind it.
///
/// The pollution API and Wikipedia each get their own gate, so that slow
/// description lookups don't delay listing pages or the other way around.
///
/// # Errors
/// If either HTTP client can't be built from `settings`.
pub fn build_aggregator(
    settings: &Settings,
    metrics_client: &StatsdClient,
) -> Result<CityAggregator, SetupError> {
    let pollution_gate = Arc::new(LeakyBucketGate::new(settings.pollution.min_interval));
    let source = PollutionApiClient::new(
        &settings.pollution,
        pollution_gate,
        metrics_client.clone(),
    )?;

    let wikipedia_gate = Arc::new(LeakyBucketGate::new(settings.wikipedia.min_interval));
    let descriptions = WikipediaDescriptions::new(
        &settings.wikipedia,
        wikipedia_gate,
        Arc::new(MemoryDescriptionStore::new("descriptions")),
        metrics_client.clone(),
    )?;

    tracing::debug!(
        r#type = "web.components.built",
        pollution_interval = ?settings.pollution.min_interval,
        wikipedia_interval = ?settings.wikipedia.min_interval,
        page_size = settings.cities.page_size,
        "Built city aggregator"
    );

    Ok(CityAggregator::new(
        Arc::new(source),
        Arc::new(descriptions),
        Arc::new(MemoryResultStore::new("results")),
        settings.cities.page_size,
        metrics_client.clone(),
    ))
}

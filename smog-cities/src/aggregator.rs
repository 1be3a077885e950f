//! Turns raw upstream readings into a ranked, described list of cities.

use crate::{
    domain::{CacheStatus, CleanCityRecord, Country, RankedCities, RawCityRecord},
    normalize::{normalize, NormalizedKey},
    pagination::{paginate, Page},
    store::{ResultStore, StoreError},
    DescriptionLookup, PollutionSource,
};
use cadence::{CountedExt, Histogrammed, StatsdClient};
use lazy_static::lazy_static;
use regex::Regex;
use std::{collections::HashMap, fmt, sync::Arc};
use thiserror::Error;
use tracing::Instrument;

/// Names the upstream uses for "no name".
const INVALID_TOKENS: &[&str] = &["na", "n/a", "null", "none", "unknown", "undefined"];

/// Substrings that mark a reading from an installation rather than a city.
const NON_CITY_KEYWORDS: &[&str] = &["station", "powerplant", "plant", "factory", "industrial"];

/// The shortest name accepted, in characters.
const MIN_NAME_LENGTH: usize = 3;

lazy_static! {
    /// Letters, whitespace, hyphens, apostrophes and periods, 2 to 64 of them.
    static ref CITY_NAME: Regex =
        Regex::new(r"^[a-zA-Z\s\-'.]{2,64}$").expect("city name pattern is valid");
}

/// Errors that may occur while getting the cities of a country.
#[derive(Debug, Error)]
pub enum CitiesError {
    /// The per-country result cache failed.
    #[error("Could not use the city result cache: {0}")]
    Store(#[from] StoreError),
}

/// A page of cities, and whether it came from the cache.
#[derive(Clone, Debug, PartialEq)]
pub struct CitiesResponse {
    /// The requested page.
    pub page: Page<CleanCityRecord>,
    /// Whether the country's ranked list was already cached.
    pub cache_status: CacheStatus,
}

/// Why a raw record didn't make it into the ranked list.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Discard {
    /// The name was missing, empty, or not a string.
    MissingName,
    /// The pollution level was missing or not a finite number.
    InvalidPollution,
    /// The name is a placeholder such as "N/A".
    PlaceholderName,
    /// The name refers to an installation, not a city.
    NotACity,
    /// The name is too short.
    TooShort,
    /// The name has characters a city name shouldn't.
    BadFormat,
}

impl fmt::Display for Discard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Discard::MissingName => "missing-name",
            Discard::InvalidPollution => "invalid-pollution",
            Discard::PlaceholderName => "placeholder-name",
            Discard::NotACity => "not-a-city",
            Discard::TooShort => "too-short",
            Discard::BadFormat => "bad-format",
        })
    }
}

/// Check a raw record, returning its canonical name and pollution level.
fn validate(record: &RawCityRecord) -> Result<(NormalizedKey, f64), Discard> {
    let name = record.name().ok_or(Discard::MissingName)?;
    let pollution = record.pollution().ok_or(Discard::InvalidPollution)?;

    let key = normalize(name);
    if INVALID_TOKENS.contains(&key.as_str()) {
        return Err(Discard::PlaceholderName);
    }
    if NON_CITY_KEYWORDS.iter().any(|k| key.as_str().contains(*k)) {
        return Err(Discard::NotACity);
    }
    if key.char_count() < MIN_NAME_LENGTH {
        return Err(Discard::TooShort);
    }
    if !CITY_NAME.is_match(key.as_str()) {
        return Err(Discard::BadFormat);
    }

    Ok((key, pollution))
}

/// Validate and deduplicate raw records.
///
/// Returns one entry per distinct name, in the order each name was first
/// seen, carrying the highest pollution reported for it. Ties keep the first
/// reading.
fn select_cities(raw: &[RawCityRecord]) -> Vec<(NormalizedKey, f64)> {
    let mut selected: Vec<(NormalizedKey, f64)> = Vec::new();
    let mut positions: HashMap<NormalizedKey, usize> = HashMap::new();

    for record in raw {
        let (key, pollution) = match validate(record) {
            Ok(valid) => valid,
            Err(reason) => {
                tracing::debug!(
                    r#type = "cities.discard",
                    %reason,
                    name = ?record.name,
                    "Discarding record"
                );
                continue;
            }
        };

        match positions.get(&key) {
            Some(&idx) => {
                if pollution > selected[idx].1 {
                    selected[idx].1 = pollution;
                }
            }
            None => {
                positions.insert(key.clone(), selected.len());
                selected.push((key, pollution));
            }
        }
    }

    selected
}

/// Sort cities most polluted first. Cities with equal pollution keep their
/// relative order.
fn rank(cities: &mut [CleanCityRecord]) {
    cities.sort_by(|a, b| b.pollution.total_cmp(&a.pollution));
}

/// Builds, caches, and pages the ranked cities of each country.
pub struct CityAggregator {
    /// Where raw readings come from.
    source: Arc<dyn PollutionSource>,

    /// Where descriptions come from.
    descriptions: Arc<dyn DescriptionLookup>,

    /// The ranked list of every country served so far.
    results: Arc<ResultStore>,

    /// The number of cities per page.
    page_size: usize,

    /// The client used to record metrics.
    metrics_client: StatsdClient,
}

impl CityAggregator {
    /// Assemble an aggregator from its collaborators.
    pub fn new(
        source: Arc<dyn PollutionSource>,
        descriptions: Arc<dyn DescriptionLookup>,
        results: Arc<ResultStore>,
        page_size: usize,
        metrics_client: StatsdClient,
    ) -> Self {
        Self {
            source,
            descriptions,
            results,
            page_size,
            metrics_client,
        }
    }

    /// The number of cities per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Get page `page` of the most polluted cities of `country`.
    ///
    /// The first request for a country fetches every reading from the
    /// pollution source and builds the ranked list, which is then cached for
    /// the lifetime of the process. Later requests are served from the cache.
    /// Concurrent first requests for the same country each build the list.
    ///
    /// # Errors
    /// If the result cache fails. Failures of the pollution source or of
    /// description lookups are absorbed, and only make the list shorter or
    /// the descriptions missing.
    pub async fn get_cities(
        &self,
        country: &Country,
        page: usize,
    ) -> Result<CitiesResponse, CitiesError> {
        let span = tracing::debug_span!("get-cities", %country, page);
        async move {
            if let Some(cities) = self.results.get(country).await? {
                tracing::debug!(r#type = "cities.cache.hit", "cache hit");
                self.metrics_client
                    .incr_with_tags("cities.cache")
                    .with_tag("status", "hit")
                    .send();
                return Ok(CitiesResponse {
                    page: paginate(&cities, page, self.page_size),
                    cache_status: CacheStatus::Hit,
                });
            }

            tracing::debug!(r#type = "cities.cache.miss", "cache miss");
            self.metrics_client
                .incr_with_tags("cities.cache")
                .with_tag("status", "miss")
                .send();

            let raw = self.source.fetch_all_cities(country).await;
            let cities: RankedCities = Arc::new(self.clean_cities(&raw).await);
            tracing::info!(
                r#type = "cities.ranked",
                source = %self.source.name(),
                raw_count = raw.len(),
                city_count = cities.len(),
                "Ranked cities"
            );
            self.metrics_client
                .histogram("cities.total", cities.len() as u64)
                .ok();

            self.results
                .insert(country.clone(), Arc::clone(&cities))
                .await?;

            Ok(CitiesResponse {
                page: paginate(&cities, page, self.page_size),
                cache_status: CacheStatus::Miss,
            })
        }
        .instrument(span)
        .await
    }

    /// Validate, deduplicate, describe, and rank raw readings.
    ///
    /// Each distinct city is described once, in the order it first appears in
    /// `raw`.
    pub async fn clean_cities(&self, raw: &[RawCityRecord]) -> Vec<CleanCityRecord> {
        let selected = select_cities(raw);

        let mut cities = Vec::with_capacity(selected.len());
        for (name, pollution) in selected {
            let description = self.descriptions.description(&name).await;
            cities.push(CleanCityRecord {
                name,
                pollution,
                description,
            });
        }

        rank(&mut cities);
        cities
    }
}

#[cfg(test)]
mod tests {
    use super::{rank, select_cities, CityAggregator};
    use crate::{
        normalize, CacheStatus, CleanCityRecord, Country, DescriptionLookup, NormalizedKey,
        PollutionSource, RankedCities, RawCityRecord, Store, StoreError,
    };
    use async_trait::async_trait;
    use cadence::{NopMetricSink, SpyMetricSink, StatsdClient};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
    };

    /// A pollution source that always answers with the same records.
    struct FixedSource {
        records: Vec<RawCityRecord>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(records: Vec<RawCityRecord>) -> Arc<Self> {
            Arc::new(Self {
                records,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PollutionSource for FixedSource {
        fn name(&self) -> String {
            "FixedSource".to_string()
        }

        async fn fetch_all_cities(&self, _country: &Country) -> Vec<RawCityRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records.clone()
        }
    }

    /// A description lookup that answers from a map, and remembers what it was asked.
    #[derive(Default)]
    struct MapLookup {
        descriptions: HashMap<String, String>,
        asked: Mutex<Vec<String>>,
    }

    impl MapLookup {
        fn with(entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                descriptions: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                asked: Mutex::new(Vec::new()),
            })
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DescriptionLookup for MapLookup {
        fn name(&self) -> String {
            "MapLookup".to_string()
        }

        async fn description(&self, name: &NormalizedKey) -> Option<String> {
            self.asked.lock().unwrap().push(name.to_string());
            self.descriptions.get(name.as_str()).cloned()
        }
    }

    /// A result store over a plain map.
    #[derive(Default)]
    struct MapStore(Mutex<HashMap<Country, RankedCities>>);

    #[async_trait]
    impl Store<Country, RankedCities> for MapStore {
        fn name(&self) -> String {
            "MapStore".to_string()
        }

        async fn get(&self, key: &Country) -> Result<Option<RankedCities>, StoreError> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn insert(&self, key: Country, value: RankedCities) -> Result<(), StoreError> {
            self.0.lock().unwrap().insert(key, value);
            Ok(())
        }
    }

    /// A result store whose backend is always down.
    struct BrokenStore;

    #[async_trait]
    impl Store<Country, RankedCities> for BrokenStore {
        fn name(&self) -> String {
            "BrokenStore".to_string()
        }

        async fn get(&self, _key: &Country) -> Result<Option<RankedCities>, StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!("connection refused")))
        }

        async fn insert(&self, _key: Country, _value: RankedCities) -> Result<(), StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!("connection refused")))
        }
    }

    fn aggregator(source: Arc<FixedSource>, lookup: Arc<MapLookup>) -> CityAggregator {
        CityAggregator::new(
            source,
            lookup,
            Arc::new(MapStore::default()),
            10,
            StatsdClient::from_sink("smog-test", NopMetricSink),
        )
    }

    fn names(cities: &[CleanCityRecord]) -> Vec<&str> {
        cities.iter().map(|c| c.name.as_str()).collect()
    }

    #[tokio::test]
    async fn accented_duplicates_collapse_to_the_highest_reading() {
        let lookup = MapLookup::with(&[("sao paulo", "A Brazilian city.")]);
        let cities = aggregator(FixedSource::new(vec![]), lookup.clone())
            .clean_cities(&[
                RawCityRecord::new("São Paulo", 87.0),
                RawCityRecord::new("sao paulo ", 42.0),
            ])
            .await;

        assert_eq!(
            cities,
            vec![CleanCityRecord {
                name: normalize("sao paulo"),
                pollution: 87.0,
                description: Some("A Brazilian city.".to_string()),
            }]
        );
        assert_eq!(lookup.asked(), vec!["sao paulo"]);
    }

    #[tokio::test]
    async fn invalid_names_are_excluded() {
        let raw = vec![
            RawCityRecord::new("N/A", 99.0),
            RawCityRecord::new("Unknown", 98.0),
            RawCityRecord::new("Central Power Plant", 97.0),
            RawCityRecord::new(" ab ", 96.0),
            RawCityRecord::new("Gas Station 12", 95.0),
            RawCityRecord::new("Zone 51", 94.0),
            RawCityRecord::new("Krakow", 10.0),
        ];
        let cities = aggregator(FixedSource::new(vec![]), MapLookup::with(&[]))
            .clean_cities(&raw)
            .await;

        assert_eq!(names(&cities), vec!["krakow"]);
    }

    #[tokio::test]
    async fn names_with_spacing_marks_are_kept() {
        let cities = aggregator(FixedSource::new(vec![]), MapLookup::with(&[]))
            .clean_cities(&[
                RawCityRecord::new("L·Hospitalet", 30.0),
                RawCityRecord::new("Kyivʼ", 20.0),
            ])
            .await;

        assert_eq!(names(&cities), vec!["lhospitalet", "kyiv"]);
    }

    #[tokio::test]
    async fn malformed_records_are_excluded() {
        let raw: Vec<RawCityRecord> = serde_json::from_value(json!([
            {"pollution": 50},
            {"name": "", "pollution": 50},
            {"name": 12, "pollution": 50},
            {"name": "Lyon"},
            {"name": "Lyon", "pollution": "very high"},
            {"name": "Nice", "pollution": "61.5"},
        ]))
        .unwrap();
        let cities = aggregator(FixedSource::new(vec![]), MapLookup::with(&[]))
            .clean_cities(&raw)
            .await;

        assert_eq!(names(&cities), vec!["nice"]);
        assert_eq!(cities[0].pollution, 61.5);
    }

    #[tokio::test]
    async fn ties_keep_the_first_reading_and_ranking_is_stable() {
        let raw = vec![
            RawCityRecord::new("Gdansk", 20.0),
            RawCityRecord::new("Poznan", 30.0),
            RawCityRecord::new("Torun", 20.0),
            RawCityRecord::new("GDANSK", 20.0),
        ];
        let cities = aggregator(FixedSource::new(vec![]), MapLookup::with(&[]))
            .clean_cities(&raw)
            .await;

        assert_eq!(names(&cities), vec!["poznan", "gdansk", "torun"]);
    }

    #[tokio::test]
    async fn each_city_is_described_once_in_scan_order() {
        let raw = vec![
            RawCityRecord::new("Krakow", 10.0),
            RawCityRecord::new("Wroclaw", 30.0),
            RawCityRecord::new("Kraków", 50.0),
            RawCityRecord::new("Opole", 5.0),
        ];
        let lookup = MapLookup::with(&[]);
        aggregator(FixedSource::new(vec![]), lookup.clone())
            .clean_cities(&raw)
            .await;

        assert_eq!(lookup.asked(), vec!["krakow", "wroclaw", "opole"]);
    }

    #[tokio::test]
    async fn missing_descriptions_keep_the_city() {
        let raw = vec![
            RawCityRecord::new("Berlin", 30.0),
            RawCityRecord::new("Atlantis", 40.0),
            RawCityRecord::new("Munich", 20.0),
        ];
        let lookup = MapLookup::with(&[("berlin", "Capital."), ("munich", "Bavarian.")]);
        let cities = aggregator(FixedSource::new(vec![]), lookup)
            .clean_cities(&raw)
            .await;

        assert_eq!(names(&cities), vec!["atlantis", "berlin", "munich"]);
        assert_eq!(cities[0].description, None);
        assert_eq!(cities[1].description.as_deref(), Some("Capital."));
        assert_eq!(cities[2].description.as_deref(), Some("Bavarian."));
    }

    #[tokio::test]
    async fn second_request_is_served_from_the_cache() {
        let raw = (0..25)
            .map(|i| RawCityRecord::new(&format!("City {}", char::from(b'a' + i)), i as f64))
            .collect();
        let source = FixedSource::new(raw);
        let lookup = MapLookup::with(&[]);
        let aggregator = aggregator(source.clone(), lookup.clone());
        let country = Country::new("PL");

        let first = aggregator.get_cities(&country, 1).await.unwrap();
        assert_eq!(first.cache_status, CacheStatus::Miss);
        assert_eq!(first.page.total, 25);
        assert_eq!(first.page.items.len(), 10);
        assert_eq!(first.page.items[0].name.as_str(), "city y");
        let lookups_after_first = lookup.asked().len();

        let second = aggregator.get_cities(&country, 1).await.unwrap();
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(second.page, first.page);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.asked().len(), lookups_after_first);

        let third = aggregator.get_cities(&country, 3).await.unwrap();
        assert_eq!(third.page.items.len(), 5);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn countries_are_cached_separately() {
        let source = FixedSource::new(vec![RawCityRecord::new("Lyon", 5.0)]);
        let aggregator = aggregator(source.clone(), MapLookup::with(&[]));

        aggregator.get_cities(&Country::new("FR"), 1).await.unwrap();
        aggregator.get_cities(&Country::new("DE"), 1).await.unwrap();
        aggregator.get_cities(&Country::new("FR"), 2).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_upstream_is_cached_as_empty() {
        let source = FixedSource::new(vec![]);
        let aggregator = aggregator(source.clone(), MapLookup::with(&[]));
        let country = Country::new("XX");

        let first = aggregator.get_cities(&country, 1).await.unwrap();
        assert_eq!(first.page.total, 0);
        let second = aggregator.get_cities(&country, 1).await.unwrap();
        assert_eq!(second.cache_status, CacheStatus::Hit);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_failures_are_reported() {
        let aggregator = CityAggregator::new(
            FixedSource::new(vec![]),
            MapLookup::with(&[]),
            Arc::new(BrokenStore),
            10,
            StatsdClient::from_sink("smog-test", NopMetricSink),
        );

        let result = aggregator.get_cities(&Country::new("PL"), 1).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cache_status_is_recorded() {
        let (rx, sink) = SpyMetricSink::new();
        let aggregator = CityAggregator::new(
            FixedSource::new(vec![RawCityRecord::new("Lyon", 5.0)]),
            MapLookup::with(&[]),
            Arc::new(MapStore::default()),
            10,
            StatsdClient::from_sink("smog-test", sink),
        );
        let country = Country::new("FR");
        aggregator.get_cities(&country, 1).await.unwrap();
        aggregator.get_cities(&country, 1).await.unwrap();

        let sent: Vec<String> = rx
            .try_iter()
            .map(|bytes| String::from_utf8(bytes).unwrap())
            .collect();
        assert_eq!(
            sent,
            vec![
                "smog-test.cities.cache:1|c|#status:miss",
                "smog-test.cities.total:1|h",
                "smog-test.cities.cache:1|c|#status:hit",
            ]
        );
    }

    /// Names drawn from a small pool so that duplicates are common.
    fn raw_records() -> impl Strategy<Value = Vec<RawCityRecord>> {
        let name = prop::sample::select(vec![
            "Lyon", "LYON", " lyon", "Lyón", "Nice", "Paris", "N/A", "Metz", "ab",
        ]);
        prop::collection::vec((name, 0.0..500.0f64), 0..40).prop_map(|rows| {
            rows.into_iter()
                .map(|(name, pollution)| RawCityRecord::new(name, pollution))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn selected_names_are_unique_and_carry_the_maximum(raw in raw_records()) {
            let selected = select_cities(&raw);

            let mut seen = std::collections::HashSet::new();
            for (name, _) in &selected {
                prop_assert!(seen.insert(name.clone()), "duplicate {}", name);
            }

            for (name, pollution) in &selected {
                let max = raw
                    .iter()
                    .filter(|r| r.name().map(normalize).as_ref() == Some(name))
                    .filter_map(RawCityRecord::pollution)
                    .fold(f64::MIN, f64::max);
                prop_assert_eq!(*pollution, max);
            }
        }

        #[test]
        fn ranked_cities_are_sorted_non_increasing(raw in raw_records()) {
            let mut cities: Vec<CleanCityRecord> = select_cities(&raw)
                .into_iter()
                .map(|(name, pollution)| CleanCityRecord { name, pollution, description: None })
                .collect();
            rank(&mut cities);

            for pair in cities.windows(2) {
                prop_assert!(pair[0].pollution >= pair[1].pollution);
            }
        }
    }
}

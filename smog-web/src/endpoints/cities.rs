//! Web handlers for the most polluted cities API.

use crate::errors::{HandlerError, HandlerErrorKind};
use actix_web::{
    get,
    web::{self, Data, ServiceConfig},
    HttpResponse,
};
use serde::{Deserialize, Serialize};
use smog_cities::{resolve_page, CleanCityRecord, CityAggregator, Country};

/// Configure a route to use the cities service.
pub fn configure(config: &mut ServiceConfig) {
    config.service(cities);
}

/// The most polluted cities of a country, one page at a time.
#[get("")]
#[tracing::instrument(
    skip(aggregator, query),
    fields(country = tracing::field::Empty, page = tracing::field::Empty)
)]
async fn cities(
    query: web::Query<CitiesQueryParameters>,
    aggregator: Data<CityAggregator>,
) -> Result<HttpResponse, HandlerError> {
    let country = query
        .country
        .as_deref()
        .filter(|country| !country.trim().is_empty())
        .map(Country::new)
        .ok_or(HandlerErrorKind::MissingParameter("country"))?;
    let page = resolve_page(query.page.as_deref());
    tracing::Span::current()
        .record("country", &tracing::field::display(&country))
        .record("page", &page);

    let response = aggregator
        .get_cities(&country, page)
        .await
        .map_err(|error| {
            tracing::error!(%error, r#type = "web.cities.error", "Error getting cities");
            HandlerError::internal()
        })?;

    tracing::debug!(
        r#type = "web.cities.provided-count",
        city_count = response.page.items.len(),
        cache = %response.cache_status,
        "Providing cities"
    );

    Ok(HttpResponse::Ok()
        .append_header(("X-Cache", response.cache_status.to_string()))
        .json(CitiesResponse {
            total: response.page.total,
            limit: response.page.limit,
            page: response.page.page,
            cities: &response.page.items,
        }))
}

/// Query parameters. Both are read leniently, so they are kept as text here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CitiesQueryParameters {
    /// The country to list cities for. Required.
    country: Option<String>,
    /// The page to return, starting at 1.
    page: Option<String>,
}

/// The response the API generates.
#[derive(Debug, Serialize)]
struct CitiesResponse<'a> {
    /// The number of ranked cities of the country.
    total: usize,
    /// The page size.
    limit: usize,
    /// The page that was requested.
    page: usize,
    /// The cities on this page, most polluted first.
    cities: &'a [CleanCityRecord],
}

#[cfg(test)]
mod tests {
    use super::configure;
    use actix_web::{
        http::StatusCode,
        test,
        web::{self, Data},
        App,
    };
    use async_trait::async_trait;
    use cadence::{NopMetricSink, StatsdClient};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use smog_cache::MemoryResultStore;
    use smog_cities::{
        CityAggregator, Country, DescriptionLookup, NormalizedKey, PollutionSource,
        RawCityRecord, ResultStore, Store, StoreError,
    };
    use smog_cities::{CleanCityRecord, RankedCities};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    /// A source with a fixed number of readings, counting its fetches.
    #[derive(Default)]
    struct NumberedSource {
        fetches: AtomicUsize,
        countries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PollutionSource for NumberedSource {
        fn name(&self) -> String {
            "NumberedSource".to_string()
        }

        async fn fetch_all_cities(&self, country: &Country) -> Vec<RawCityRecord> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.countries.lock().unwrap().push(country.as_str().to_string());
            let names = [
                "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel",
                "India", "Juliett", "Kilo", "Lima",
            ];
            names
                .iter()
                .enumerate()
                .map(|(i, name)| RawCityRecord::new(name, i as f64))
                .collect()
        }
    }

    /// Describes every city the same way.
    struct SameDescription;

    #[async_trait]
    impl DescriptionLookup for SameDescription {
        fn name(&self) -> String {
            "SameDescription".to_string()
        }

        async fn description(&self, name: &NormalizedKey) -> Option<String> {
            Some(format!("About {}", name))
        }
    }

    /// A result store that always fails.
    struct BrokenStore;

    #[async_trait]
    impl Store<Country, RankedCities> for BrokenStore {
        fn name(&self) -> String {
            "BrokenStore".to_string()
        }

        async fn get(&self, _key: &Country) -> Result<Option<RankedCities>, StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!("broken")))
        }

        async fn insert(&self, _key: Country, _value: RankedCities) -> Result<(), StoreError> {
            Err(StoreError::Unavailable(anyhow::anyhow!("broken")))
        }
    }

    fn aggregator(source: Arc<NumberedSource>, results: Arc<ResultStore>) -> Data<CityAggregator> {
        Data::new(CityAggregator::new(
            source,
            Arc::new(SameDescription),
            results,
            10,
            StatsdClient::from_sink("smog-test", NopMetricSink),
        ))
    }

    macro_rules! app {
        ($aggregator:expr) => {
            test::init_service(
                App::new()
                    .app_data($aggregator)
                    .service(web::scope("api/v1/cities").configure(configure)),
            )
            .await
        };
    }

    #[actix_rt::test]
    async fn first_page_is_ranked_and_marked_as_a_miss() {
        let source = Arc::new(NumberedSource::default());
        let app = app!(aggregator(source, Arc::new(MemoryResultStore::new("results"))));

        let request = test::TestRequest::get()
            .uri("/api/v1/cities?country=PL")
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get("X-Cache").unwrap(), "miss");
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["total"], json!(12));
        assert_eq!(body["limit"], json!(10));
        assert_eq!(body["page"], json!(1));
        let cities = body["cities"].as_array().unwrap();
        assert_eq!(cities.len(), 10);
        assert_eq!(
            cities[0],
            json!({"name": "lima", "pollution": 11.0, "description": "About lima"})
        );
    }

    #[actix_rt::test]
    async fn country_is_passed_upstream_as_given() {
        let source = Arc::new(NumberedSource::default());
        let app = app!(aggregator(source.clone(), Arc::new(MemoryResultStore::new("results"))));

        let request = test::TestRequest::get()
            .uri("/api/v1/cities?country=%20pl%20")
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*source.countries.lock().unwrap(), vec![" pl ".to_string()]);
    }

    #[actix_rt::test]
    async fn later_requests_hit_the_cache() {
        let source = Arc::new(NumberedSource::default());
        let app = app!(aggregator(
            Arc::clone(&source),
            Arc::new(MemoryResultStore::new("results"))
        ));

        for _ in 0..2 {
            let request = test::TestRequest::get()
                .uri("/api/v1/cities?country=PL&page=2")
                .to_request();
            test::call_service(&app, request).await;
        }
        let request = test::TestRequest::get()
            .uri("/api/v1/cities?country=PL&page=2")
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.headers().get("X-Cache").unwrap(), "hit");
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["page"], json!(2));
        let names: Vec<_> = body["cities"]
            .as_array()
            .unwrap()
            .iter()
            .map(|city| city["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["bravo", "alpha"]);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[actix_rt::test]
    async fn page_parameter_is_lenient() {
        let source = Arc::new(NumberedSource::default());
        let app = app!(aggregator(source, Arc::new(MemoryResultStore::new("results"))));

        for (query, expected_page) in [("page=abc", 1), ("page=-3", 1), ("page=2x", 2)] {
            let request = test::TestRequest::get()
                .uri(&format!("/api/v1/cities?country=PL&{}", query))
                .to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::OK);
            let body: Value = test::read_body_json(response).await;
            assert_eq!(body["page"], json!(expected_page), "for {}", query);
        }
    }

    #[actix_rt::test]
    async fn missing_or_blank_country_is_a_bad_request() {
        let source = Arc::new(NumberedSource::default());
        let app = app!(aggregator(
            Arc::clone(&source),
            Arc::new(MemoryResultStore::new("results"))
        ));

        for uri in ["/api/v1/cities", "/api/v1/cities?country=", "/api/v1/cities?country=%20%20"] {
            let request = test::TestRequest::get().uri(uri).to_request();
            let response = test::call_service(&app, request).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "for {}", uri);
            let body: Value = test::read_body_json(response).await;
            assert_eq!(body, json!({"error": "Missing query parameter: country"}));
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn store_failures_are_internal_errors() {
        let source = Arc::new(NumberedSource::default());
        let app = app!(aggregator(source, Arc::new(BrokenStore)));

        let request = test::TestRequest::get()
            .uri("/api/v1/cities?country=PL")
            .to_request();
        let response = test::call_service(&app, request).await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body, json!({"error": "Internal error"}));
    }

    #[::core::prelude::v1::test]
    fn records_serialize_with_null_descriptions() {
        let record = CleanCityRecord {
            name: smog_cities::normalize("Lodz"),
            pollution: 3.5,
            description: None,
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"name": "lodz", "pollution": 3.5, "description": null})
        );
    }
}

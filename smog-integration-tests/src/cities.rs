//! Tests for the cities endpoint, `/api/v1/cities`, against mock upstreams.

use crate::{
    mock_description, mock_login, mock_pollution_pages, smog_test, TestReqwestClient, TestingTools,
};
use httpmock::Method::{GET, POST};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::Level;

/// Request a page of cities, returning the `X-Cache` header and the body.
async fn get_cities(test_client: &TestReqwestClient, query: &str) -> (StatusCode, String, Value) {
    let response = test_client
        .get(&format!("/api/v1/cities?{}", query))
        .send()
        .await
        .expect("failed to execute request");
    let status = response.status();
    let cache = response
        .headers()
        .get("x-cache")
        .map(|value| value.to_str().expect("header should be text").to_string())
        .unwrap_or_default();
    let body = response.json().await.expect("body should be json");
    (status, cache, body)
}

/// The names of the cities in a response body, in order.
fn names(body: &Value) -> Vec<String> {
    body["cities"]
        .as_array()
        .expect("cities should be a list")
        .iter()
        .map(|city| city["name"].as_str().expect("name should be text").to_string())
        .collect()
}

#[actix_rt::test]
async fn cities_are_cleaned_ranked_and_described() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             wikipedia_mock,
             ..
         }| async move {
            mock_login(&pollution_mock).await;
            mock_pollution_pages(
                &pollution_mock,
                "PL",
                &[
                    json!([
                        {"name": "Kraków", "pollution": 80.5},
                        {"name": "Warsaw", "pollution": "65"},
                        {"name": "N/A", "pollution": 99},
                        {"name": "Belchatow Power Station", "pollution": 120},
                    ]),
                    json!([
                        {"name": "krakow", "pollution": 91},
                        {"name": "Gdańsk", "pollution": null},
                        {"name": "Lodz", "pollution": 40, "station_id": 17},
                        {"pollution": 70},
                    ]),
                ],
            )
            .await;
            let krakow = mock_description(&wikipedia_mock, "krakow", "Kraków is a city in Poland.").await;
            mock_description(&wikipedia_mock, "warsaw", "Warsaw is the capital of Poland.").await;
            mock_description(&wikipedia_mock, "lodz", "").await;

            let (status, cache, body) = get_cities(&test_client, "country=PL").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(cache, "miss");
            assert_eq!(
                body,
                json!({
                    "total": 3,
                    "limit": 10,
                    "page": 1,
                    "cities": [
                        {"name": "krakow", "pollution": 91.0, "description": "Kraków is a city in Poland."},
                        {"name": "warsaw", "pollution": 65.0, "description": "Warsaw is the capital of Poland."},
                        {"name": "lodz", "pollution": 40.0, "description": "Description not available."},
                    ]
                })
            );
            krakow.assert_hits_async(1).await;
        },
    )
    .await
}

#[actix_rt::test]
async fn second_request_is_served_from_the_cache() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             wikipedia_mock,
             ..
         }| async move {
            let login = mock_login(&pollution_mock).await;
            let pages = mock_pollution_pages(
                &pollution_mock,
                "PL",
                &[json!([{"name": "Krakow", "pollution": 80}])],
            )
            .await;
            let description = mock_description(&wikipedia_mock, "krakow", "A city.").await;

            let (_, first_cache, first_body) = get_cities(&test_client, "country=PL").await;
            let (_, second_cache, second_body) = get_cities(&test_client, "country=PL").await;

            assert_eq!(first_cache, "miss");
            assert_eq!(second_cache, "hit");
            assert_eq!(first_body, second_body);
            login.assert_hits_async(1).await;
            for page in &pages {
                page.assert_hits_async(1).await;
            }
            description.assert_hits_async(1).await;
        },
    )
    .await
}

#[actix_rt::test]
async fn pages_are_served_from_the_ranked_list() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             wikipedia_mock,
             ..
         }| async move {
            mock_login(&pollution_mock).await;
            let cities = [
                "Alpha", "Bravo", "Charlie", "Delta", "Echo", "Foxtrot", "Golf", "Hotel", "India",
                "Juliett", "Kilo", "Lima",
            ];
            let results: Vec<Value> = cities
                .iter()
                .enumerate()
                .map(|(i, name)| json!({"name": name, "pollution": i}))
                .collect();
            mock_pollution_pages(&pollution_mock, "PL", &[Value::Array(results)]).await;
            wikipedia_mock
                .mock_async(|when, then| {
                    when.method(GET).path_contains("/page/summary/");
                    then.status(200).json_body(json!({"extract": "A place."}));
                })
                .await;

            let (_, _, page_two) = get_cities(&test_client, "country=PL&page=2").await;
            assert_eq!(page_two["total"], json!(12));
            assert_eq!(page_two["page"], json!(2));
            assert_eq!(names(&page_two), vec!["bravo", "alpha"]);

            let (_, cache, past_the_end) = get_cities(&test_client, "country=PL&page=9").await;
            assert_eq!(cache, "hit");
            assert_eq!(past_the_end["page"], json!(9));
            assert_eq!(names(&past_the_end).len(), 10);
            assert_eq!(names(&past_the_end)[0], "lima");

            let (_, _, unreadable) = get_cities(&test_client, "country=PL&page=first").await;
            assert_eq!(unreadable["page"], json!(1));
            assert_eq!(names(&unreadable)[0], "lima");
        },
    )
    .await
}

#[actix_rt::test]
async fn missing_country_is_a_bad_request() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             ..
         }| async move {
            let login = mock_login(&pollution_mock).await;

            for query in ["", "country=", "country=%20", "page=2"] {
                let (status, _, body) = get_cities(&test_client, query).await;
                assert_eq!(status, StatusCode::BAD_REQUEST, "for {:?}", query);
                assert_eq!(body, json!({"error": "Missing query parameter: country"}));
            }
            login.assert_hits_async(0).await;
        },
    )
    .await
}

#[actix_rt::test]
async fn upstream_login_failure_gives_an_empty_list() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             ..
         }| async move {
            pollution_mock
                .mock_async(|when, then| {
                    when.method(POST).path("/auth/login");
                    then.status(500);
                })
                .await;

            let (status, cache, body) = get_cities(&test_client, "country=PL").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(cache, "miss");
            assert_eq!(body, json!({"total": 0, "limit": 10, "page": 1, "cities": []}));
        },
    )
    .await
}

#[actix_rt::test]
async fn failed_listing_page_keeps_earlier_pages() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             wikipedia_mock,
             mut log_watcher,
             ..
         }| async move {
            mock_login(&pollution_mock).await;
            pollution_mock
                .mock_async(|when, then| {
                    when.method(GET).path("/pollution").query_param("page", "1");
                    then.status(200)
                        .json_body(json!({"results": [{"name": "Krakow", "pollution": 50}]}));
                })
                .await;
            pollution_mock
                .mock_async(|when, then| {
                    when.method(GET).path("/pollution").query_param("page", "2");
                    then.status(502);
                })
                .await;
            mock_description(&wikipedia_mock, "krakow", "A city.").await;

            let (status, _, body) = get_cities(&test_client, "country=PL").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(names(&body), vec!["krakow"]);
            assert!(log_watcher.has(|event| {
                event.level == Level::ERROR
                    && event.field_contains("message", "Pagination fetch failed")
                    && event.field_contains("country", "PL")
                    && event.fields.get("page") == Some(&json!(2))
            }));
        },
    )
    .await
}

#[actix_rt::test]
async fn unreachable_wikipedia_leaves_descriptions_empty() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             wikipedia_mock,
             mut log_watcher,
             ..
         }| async move {
            mock_login(&pollution_mock).await;
            mock_pollution_pages(
                &pollution_mock,
                "PL",
                &[json!([{"name": "Krakow", "pollution": 50}])],
            )
            .await;
            let summary = wikipedia_mock
                .mock_async(|when, then| {
                    when.method(GET).path("/page/summary/krakow");
                    then.status(503);
                })
                .await;

            let (status, _, body) = get_cities(&test_client, "country=PL").await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(
                body["cities"],
                json!([{"name": "krakow", "pollution": 50.0, "description": null}])
            );
            summary.assert_hits_async(1).await;
            assert!(log_watcher.has(|event| {
                event.level == Level::WARN
                    && event.field_contains("message", "Wiki lookup failed")
                    && event.field_contains("city", "krakow")
            }));
        },
    )
    .await
}

#[actix_rt::test]
async fn descriptions_are_shared_between_countries() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             wikipedia_mock,
             ..
         }| async move {
            let login = mock_login(&pollution_mock).await;
            mock_pollution_pages(
                &pollution_mock,
                "PL",
                &[json!([{"name": "Cieszyn", "pollution": 30}])],
            )
            .await;
            mock_pollution_pages(
                &pollution_mock,
                "CZ",
                &[json!([{"name": "Cieszyn", "pollution": 20}, {"name": "Ostrava", "pollution": 60}])],
            )
            .await;
            let cieszyn = mock_description(&wikipedia_mock, "cieszyn", "A border town.").await;
            mock_description(&wikipedia_mock, "ostrava", "A city in Czechia.").await;

            let (_, _, poland) = get_cities(&test_client, "country=PL").await;
            let (_, cache, czechia) = get_cities(&test_client, "country=CZ").await;

            assert_eq!(names(&poland), vec!["cieszyn"]);
            assert_eq!(cache, "miss", "each country is built separately");
            assert_eq!(names(&czechia), vec!["ostrava", "cieszyn"]);
            assert_eq!(czechia["cities"][1]["description"], json!("A border town."));
            cieszyn.assert_hits_async(1).await;
            login.assert_hits_async(2).await;
        },
    )
    .await
}

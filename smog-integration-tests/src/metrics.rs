//! Tests for the metrics Smog reports.

use crate::{mock_description, mock_login, mock_pollution_pages, smog_test, TestingTools};
use serde_json::json;

#[actix_rt::test]
async fn cities_requests_report_cache_and_upstream_metrics() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             pollution_mock,
             wikipedia_mock,
             mut metrics_watcher,
             ..
         }| async move {
            mock_login(&pollution_mock).await;
            mock_pollution_pages(
                &pollution_mock,
                "PL",
                &[json!([{"name": "Krakow", "pollution": 80}, {"name": "Lodz", "pollution": 60}])],
            )
            .await;
            mock_description(&wikipedia_mock, "krakow", "A city.").await;
            mock_description(&wikipedia_mock, "lodz", "").await;

            for _ in 0..2 {
                test_client
                    .get("/api/v1/cities?country=PL")
                    .send()
                    .await
                    .expect("failed to execute request");
            }

            assert!(metrics_watcher.has_line("cities.cache:1|c|#status:miss"));
            assert!(metrics_watcher.has_line("cities.cache:1|c|#status:hit"));
            assert!(metrics_watcher.has_line("cities.total:2|h"));
            assert!(metrics_watcher.has_line("pollution.page:1|c"));
            assert!(metrics_watcher.has_line("wikipedia.lookup:1|c|#result:fetched"));
            assert!(metrics_watcher.has_line("wikipedia.lookup:1|c|#result:fallback"));
            assert!(
                metrics_watcher
                    .all_lines()
                    .iter()
                    .any(|line| line.starts_with("request.duration:")
                        && line.contains("path:/api/v1/cities")),
                "request timings are reported: {:?}",
                metrics_watcher.all_lines()
            );
        },
    )
    .await
}

#[actix_rt::test]
async fn upstream_failures_are_counted() {
    smog_test(
        |_| (),
        |TestingTools {
             test_client,
             mut metrics_watcher,
             ..
         }| async move {
            // No mocks: every upstream request fails.
            test_client
                .get("/api/v1/cities?country=PL")
                .send()
                .await
                .expect("failed to execute request");

            assert!(metrics_watcher.has_line("pollution.error:1|c|#stage:login"));
            assert!(metrics_watcher.has_line("cities.total:0|h"));
        },
    )
    .await
}

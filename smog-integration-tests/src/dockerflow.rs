//! Tests that Smog conforms to [Dockerflow](https://github.com/mozilla-services/dockerflow).

use crate::{smog_test, TestingTools};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

#[actix_rt::test]
async fn lbheartbeat_works() {
    smog_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let response = test_client
                .get("/__lbheartbeat__")
                .send()
                .await
                .expect("failed to execute request");

            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.content_length(), Some(0));
        },
    )
    .await
}

#[actix_rt::test]
async fn heartbeat_works() {
    smog_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let response = test_client
                .get("/__heartbeat__")
                .send()
                .await
                .expect("failed to execute request");

            assert!(response.status().is_success());
            assert_eq!(
                response
                    .headers()
                    .get_all("content-type")
                    .iter()
                    .collect::<Vec<_>>(),
                vec!["application/json"]
            );
            let body: Value = response.json().await.expect("body should be json");
            assert!(body["version"].is_string());
        },
    )
    .await
}

#[actix_rt::test]
async fn version_works() {
    smog_test(
        |_| (),
        |TestingTools { test_client, .. }| async move {
            let response = test_client
                .get("/__version__")
                .send()
                .await
                .expect("failed to execute request");

            assert!(response.status().is_success());
            assert_eq!(
                response
                    .headers()
                    .get_all("content-type")
                    .iter()
                    .collect::<Vec<_>>(),
                vec!["application/json"]
            );

            #[derive(Deserialize, Debug)]
            #[allow(dead_code)]
            struct VersionInfo {
                source: String,
                version: String,
                commit: String,
                build: String,
            }
            let body: Result<VersionInfo, _> = response.json().await;
            assert!(body.is_ok());
        },
    )
    .await
}

#[actix_rt::test]
async fn error_works_in_debug_mode() {
    smog_test(
        |settings| settings.debug = true,
        |TestingTools { test_client, .. }| async move {
            let response = test_client
                .get("/__error__")
                .send()
                .await
                .expect("failed to execute request");

            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let body: Value = response.json().await.expect("body should be json");
            assert_eq!(body, json!({"error": "Internal error"}));
        },
    )
    .await
}

#[actix_rt::test]
async fn error_is_hidden_outside_debug_mode() {
    smog_test(
        |settings| settings.debug = false,
        |TestingTools { test_client, .. }| async move {
            let response = test_client
                .get("/__error__")
                .send()
                .await
                .expect("failed to execute request");

            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        },
    )
    .await
}

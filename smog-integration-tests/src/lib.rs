#![warn(missing_docs, clippy::missing_docs_in_private_items)]
// None of the tests are seen by the linter, so none of the utilities are marked
// as used. But docs don't generate for the below if they are `#[cfg(test)]`.
// This is a compromise.
#![allow(dead_code)]

//! Tests for Smog that work by reading from the external API only.
//!
//! Since the URL endpoints Smog exposes to the world are its public API, and
//! other systems depend on them, the paths used in tests here are important
//! details, and used to keep compatibility.
//!
//! This is structured as a separate crate so that it produces a single test
//! binary instead of one test per file like would happen if this were
//! `smog/tests/...`. This improves compilation and test times.
//!
//! The primary tool used by tests is [`smog_test`], which starts mock servers
//! for the pollution API and Wikipedia, sets up the application to use them,
//! and provides helpers to inspect the state of the app. It then calls the test
//! function that is passed to it, providing the above tools as an argument.
//!
//! ```
//! use smog_integration_tests::{smog_test, TestingTools};
//! use reqwest::StatusCode;
//!
//! #[actix_rt::test]
//! async fn lbheartbeat_works() {
//!     smog_test(
//!         |_| (),
//!         |TestingTools { test_client, .. }| async move {
//!             let response = test_client
//!                 .get("/__lbheartbeat__")
//!                 .send()
//!                 .await
//!                 .expect("failed to execute request");
//!
//!             assert_eq!(response.status(), StatusCode::OK);
//!             assert_eq!(response.content_length(), Some(0));
//!         },
//!     )
//!     .await
//! }
//! ```

mod cities;
mod dockerflow;
mod metrics;
mod utils;

pub use crate::utils::{
    logging::{LogWatcher, TracingJsonEvent},
    metrics::MetricsWatcher,
    test_tools::{smog_test, TestReqwestClient, TestingTools},
    upstreams::{mock_description, mock_login, mock_pollution_pages, TEST_TOKEN},
};

//! Canned answers for the mock pollution API and the mock Wikipedia.

use httpmock::{
    Method::{GET, POST},
    Mock, MockServer,
};
use serde_json::{json, Value};

/// The bearer token the mock pollution API hands out.
pub const TEST_TOKEN: &str = "test-token";

/// Accept the test credentials on the mock pollution API.
pub async fn mock_login(server: &MockServer) -> Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/auth/login")
                .json_body(json!({"username": "testuser", "password": "testpass"}));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({ "token": TEST_TOKEN }));
        })
        .await
}

/// Serve `pages` as the listing for `country`, followed by an empty page.
///
/// Each entry of `pages` is the `results` array of one page. The returned mocks
/// are in page order, the empty page last.
pub async fn mock_pollution_pages<'a>(
    server: &'a MockServer,
    country: &str,
    pages: &[Value],
) -> Vec<Mock<'a>> {
    let mut mocks = Vec::with_capacity(pages.len() + 1);
    let empty = json!([]);
    for (idx, results) in pages.iter().chain(std::iter::once(&empty)).enumerate() {
        let page = (idx + 1).to_string();
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/pollution")
                    .query_param("country", country)
                    .query_param("page", &page)
                    .header("Authorization", &format!("Bearer {}", TEST_TOKEN));
                then.status(200)
                    .header("Content-Type", "application/json")
                    .json_body(json!({ "results": results }));
            })
            .await;
        mocks.push(mock);
    }
    mocks
}

/// Answer the summary of `name` with `extract` on the mock Wikipedia.
///
/// `name` is the path segment as requested, which is the normalized city name.
pub async fn mock_description<'a>(server: &'a MockServer, name: &str, extract: &str) -> Mock<'a> {
    server
        .mock_async(|when, then| {
            when.method(GET).path(format!("/page/summary/{}", name));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({ "title": name, "extract": extract }));
        })
        .await
}

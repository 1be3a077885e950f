#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! A client for the upstream pollution API.
//!
//! The API requires a bearer token obtained from a login endpoint, and lists
//! readings page by page:
//!
//! - `POST {base}/auth/login` with `{"username", "password"}` answers `{"token"}`.
//! - `GET {base}/pollution?page=N&limit=L&country=C` answers `{"results": [...]}`.
//!   An empty page marks the end of the listing.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use cadence::{CountedExt, StatsdClient};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smog_cities::{Country, PollutionSource, RateGate, RawCityRecord, SetupError};
use smog_settings::PollutionSettings;
use std::{sync::Arc, time::Duration};

/// The credentials sent to the login endpoint.
#[derive(Debug, Clone, Serialize)]
struct Credentials {
    /// The service account name.
    username: String,
    /// The service account password.
    password: String,
}

/// The login endpoint's answer.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    /// A bearer token for the listing endpoint.
    token: String,
}

/// The query string of a listing request.
#[derive(Debug, Serialize)]
struct ListingQuery<'a> {
    /// The page to fetch, starting at 1.
    page: u32,
    /// The number of readings per page.
    limit: u32,
    /// The country filter.
    country: &'a str,
}

/// One page of the listing.
#[derive(Debug, Deserialize)]
struct ListingPage {
    /// The readings on this page. Entries are checked one by one.
    results: Vec<Value>,
}

/// A [`PollutionSource`] backed by the upstream pollution API.
pub struct PollutionApiClient {
    /// The client that will be used to make http requests.
    client: reqwest::Client,

    /// Where to request bearer tokens.
    login_url: Url,

    /// Where to list readings.
    listing_url: Url,

    /// The service account to log in with.
    credentials: Credentials,

    /// The number of readings requested per page.
    page_size: u32,

    /// Spaces out every request to the API, logins included, across all countries.
    gate: Arc<dyn RateGate>,

    /// The client used to record metrics.
    metrics_client: StatsdClient,
}

impl std::fmt::Debug for PollutionApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollutionApiClient")
            .field("login_url", &self.login_url.as_str())
            .field("listing_url", &self.listing_url.as_str())
            .field("username", &self.credentials.username)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Append `segments` to the path of `base`.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, SetupError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| {
            SetupError::InvalidConfiguration(anyhow!(
                "the pollution API base URL must be a hierarchical URL, got {}",
                base
            ))
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl PollutionApiClient {
    /// Create a client from settings.
    ///
    /// # Errors
    /// If the base URL is invalid, or if the HTTP client can't be built.
    pub fn new(
        settings: &PollutionSettings,
        gate: Arc<dyn RateGate>,
        metrics_client: StatsdClient,
    ) -> Result<Self, SetupError> {
        let base: Url = settings
            .base_url
            .parse()
            .context("parsing the pollution API base URL")
            .map_err(SetupError::InvalidConfiguration)?;

        let mut builder = reqwest::Client::builder().connect_timeout(Duration::from_secs(10));
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("Unable to create the Reqwest client")
            .map_err(SetupError::Network)?;

        Ok(Self {
            client,
            login_url: endpoint(&base, &["auth", "login"])?,
            listing_url: endpoint(&base, &["pollution"])?,
            credentials: Credentials {
                username: settings.username.clone(),
                password: settings.password.clone(),
            },
            page_size: settings.page_size,
            gate,
            metrics_client,
        })
    }

    /// Request a fresh bearer token.
    async fn login(&self) -> anyhow::Result<String> {
        let response: LoginResponse = self
            .client
            .post(self.login_url.clone())
            .json(&self.credentials)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .context("Performing login request")?
            .json()
            .await
            .context("Parsing login response")?;
        Ok(response.token)
    }

    /// Fetch one page of readings for `country`.
    ///
    /// Returns `None` once upstream has no more results. A page whose
    /// entries were all unusable is `Some` of an empty list.
    async fn fetch_page(
        &self,
        token: &str,
        country: &Country,
        page: u32,
    ) -> anyhow::Result<Option<Vec<RawCityRecord>>> {
        let listing: ListingPage = self
            .client
            .get(self.listing_url.clone())
            .query(&ListingQuery {
                page,
                limit: self.page_size,
                country: country.as_str(),
            })
            .bearer_auth(token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("Fetching page {}", page))?
            .json()
            .await
            .with_context(|| format!("Parsing page {}", page))?;

        if listing.results.is_empty() {
            return Ok(None);
        }
        let records = listing
            .results
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<RawCityRecord>(entry) {
                Ok(record) => Some(record),
                Err(error) => {
                    tracing::debug!(%error, r#type = "pollution.bad-entry", "Skipping entry");
                    None
                }
            })
            .collect();
        Ok(Some(records))
    }

    /// Record a failure at `stage`.
    fn record_error(&self, stage: &'static str) {
        self.metrics_client
            .incr_with_tags("pollution.error")
            .with_tag("stage", stage)
            .send();
    }
}

#[async_trait]
impl PollutionSource for PollutionApiClient {
    fn name(&self) -> String {
        "PollutionApiClient".to_owned()
    }

    async fn fetch_all_cities(&self, country: &Country) -> Vec<RawCityRecord> {
        self.gate.acquire().await;
        let token = match self.login().await {
            Ok(token) => token,
            Err(error) => {
                self.record_error("login");
                tracing::error!(r#type = "pollution.login.error", %country, error = ?error, "Login failed");
                return Vec::new();
            }
        };

        let mut cities = Vec::new();
        let mut page = 1;
        loop {
            self.gate.acquire().await;
            match self.fetch_page(&token, country, page).await {
                Ok(None) => break,
                Ok(Some(records)) => {
                    self.metrics_client.incr("pollution.page").ok();
                    tracing::debug!(
                        r#type = "pollution.page",
                        %country,
                        page,
                        count = records.len(),
                        "Fetched page"
                    );
                    cities.extend(records);
                    page += 1;
                }
                Err(error) => {
                    // Keep what was collected so far.
                    self.record_error("page");
                    tracing::error!(
                        r#type = "pollution.page.error",
                        %country,
                        page,
                        error = ?error,
                        "Pagination fetch failed"
                    );
                    break;
                }
            }
        }

        tracing::info!(
            r#type = "pollution.fetched",
            %country,
            pages = page - 1,
            count = cities.len(),
            "Fetched pollution readings"
        );
        cities
    }
}

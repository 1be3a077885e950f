#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! City descriptions from Wikipedia's page summary API.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use cadence::{CountedExt, StatsdClient};
use reqwest::Url;
use serde::Deserialize;
use smog_cities::{DescriptionLookup, DescriptionStore, NormalizedKey, RateGate, SetupError};
use smog_settings::WikipediaSettings;
use std::{sync::Arc, time::Duration};

/// User-Agent sent to Wikipedia, which asks API clients to identify themselves.
const REQWEST_USER_AGENT: &str = concat!("smog/", env!("CARGO_PKG_VERSION"));

/// The description given to cities whose summary has no text.
pub const FALLBACK_DESCRIPTION: &str = "Description not available.";

/// The parts of a page summary that Smog reads.
#[derive(Debug, Deserialize)]
struct PageSummary {
    /// The first paragraph or so of the article, as plain text.
    #[serde(default)]
    extract: Option<String>,
}

/// Looks up city descriptions on Wikipedia, remembering every one it finds.
///
/// Only successful lookups are cached. Summaries without text and failed
/// requests are retried the next time the city is asked for.
pub struct WikipediaDescriptions {
    /// The HTTP client used to query Wikipedia.
    client: reqwest::Client,

    /// The page summary endpoint, that city names are appended to.
    summary_endpoint: Url,

    /// Spaces out requests. Shared by every lookup, whatever the city.
    gate: Arc<dyn RateGate>,

    /// Descriptions found so far, shared by every country.
    cache: Arc<DescriptionStore>,

    /// The client used to record metrics.
    metrics_client: StatsdClient,
}

impl WikipediaDescriptions {
    /// Create a lookup from settings.
    ///
    /// # Errors
    /// If the summary endpoint is not a URL that paths can be appended to, or
    /// if the HTTP client can't be built.
    pub fn new(
        settings: &WikipediaSettings,
        gate: Arc<dyn RateGate>,
        cache: Arc<DescriptionStore>,
        metrics_client: StatsdClient,
    ) -> Result<Self, SetupError> {
        let summary_endpoint: Url = settings
            .summary_endpoint
            .parse()
            .context("parsing the Wikipedia summary endpoint")
            .map_err(SetupError::InvalidConfiguration)?;
        if summary_endpoint.cannot_be_a_base() {
            return Err(SetupError::InvalidConfiguration(anyhow!(
                "the Wikipedia summary endpoint must be a hierarchical URL, got {}",
                summary_endpoint
            )));
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(REQWEST_USER_AGENT);
        if let Some(timeout) = settings.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("Unable to create the Reqwest client")
            .map_err(SetupError::Network)?;

        Ok(Self {
            client,
            summary_endpoint,
            gate,
            cache,
            metrics_client,
        })
    }

    /// The summary URL for `name`, with the name as a single encoded path segment.
    fn summary_url(&self, name: &NormalizedKey) -> anyhow::Result<Url> {
        let mut url = self.summary_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("summary endpoint cannot be a base"))?
            .pop_if_empty()
            .push(name.as_str());
        Ok(url)
    }

    /// Query Wikipedia for the summary of `name`.
    ///
    /// Returns `Ok(None)` if Wikipedia answered, but without any text.
    async fn fetch_extract(&self, name: &NormalizedKey) -> anyhow::Result<Option<String>> {
        let url = self.summary_url(name)?;
        let summary: PageSummary = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("requesting {}", url))?
            .error_for_status()
            .with_context(|| format!("requesting {}", url))?
            .json()
            .await
            .context("parsing the page summary")?;

        Ok(summary.extract.filter(|extract| !extract.is_empty()))
    }

    /// Record the outcome of a lookup.
    fn record(&self, result: &'static str) {
        self.metrics_client
            .incr_with_tags("wikipedia.lookup")
            .with_tag("result", result)
            .send();
    }
}

#[async_trait]
impl DescriptionLookup for WikipediaDescriptions {
    fn name(&self) -> String {
        "WikipediaDescriptions".to_owned()
    }

    async fn description(&self, name: &NormalizedKey) -> Option<String> {
        match self.cache.get(name).await {
            Ok(Some(cached)) => {
                self.record("hit");
                return cached;
            }
            Ok(None) => (),
            Err(error) => {
                tracing::warn!(%error, r#type = "wikipedia.cache.error", "Could not read the description cache");
            }
        }

        self.gate.acquire().await;
        match self.fetch_extract(name).await {
            Ok(Some(extract)) => {
                self.record("fetched");
                if let Err(error) = self.cache.insert(name.clone(), Some(extract.clone())).await {
                    tracing::warn!(%error, r#type = "wikipedia.cache.error", "Could not cache a description");
                }
                Some(extract)
            }
            Ok(None) => {
                self.record("fallback");
                tracing::debug!(r#type = "wikipedia.no-extract", city = %name, "Summary has no text");
                Some(FALLBACK_DESCRIPTION.to_owned())
            }
            Err(error) => {
                self.record("error");
                tracing::warn!(
                    r#type = "wikipedia.lookup.error",
                    city = %name,
                    error = ?error,
                    "Wiki lookup failed"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WikipediaDescriptions, FALLBACK_DESCRIPTION};
    use async_trait::async_trait;
    use cadence::{NopMetricSink, StatsdClient};
    use httpmock::{Method::GET, MockServer};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use smog_cache::MemoryDescriptionStore;
    use smog_cities::{normalize, DescriptionLookup, RateGate, Ungated};
    use smog_settings::WikipediaSettings;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    /// A gate that counts how often it is passed.
    #[derive(Default)]
    struct CountingGate(AtomicUsize);

    #[async_trait]
    impl RateGate for CountingGate {
        async fn acquire(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn settings(endpoint: String) -> WikipediaSettings {
        WikipediaSettings {
            summary_endpoint: endpoint,
            min_interval: Duration::from_millis(0),
            timeout: Some(Duration::from_secs(2)),
        }
    }

    fn lookup(server: &MockServer, gate: Arc<dyn RateGate>) -> WikipediaDescriptions {
        WikipediaDescriptions::new(
            &settings(server.url("/page/summary/")),
            gate,
            Arc::new(MemoryDescriptionStore::new("descriptions")),
            StatsdClient::from_sink("smog-test", NopMetricSink),
        )
        .expect("could not build lookup")
    }

    #[test]
    fn names_are_encoded_as_one_path_segment() {
        let lookup = WikipediaDescriptions::new(
            &settings("https://en.wikipedia.org/api/rest_v1/page/summary/".to_string()),
            Arc::new(Ungated),
            Arc::new(MemoryDescriptionStore::new("descriptions")),
            StatsdClient::from_sink("smog-test", NopMetricSink),
        )
        .unwrap();

        let url = lookup.summary_url(&normalize("Sao Paulo")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/sao%20paulo"
        );
        let url = lookup.summary_url(&normalize("a/b")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://en.wikipedia.org/api/rest_v1/page/summary/a%2Fb"
        );
    }

    #[test]
    fn endpoint_must_be_a_base() {
        let result = WikipediaDescriptions::new(
            &settings("mailto:someone@example.com".to_string()),
            Arc::new(Ungated),
            Arc::new(MemoryDescriptionStore::new("descriptions")),
            StatsdClient::from_sink("smog-test", NopMetricSink),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn descriptions_are_fetched_once_and_cached() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page/summary/lyon");
                then.status(200)
                    .json_body(json!({"title": "Lyon", "extract": "Lyon is a city in France."}));
            })
            .await;
        let gate = Arc::new(CountingGate::default());
        let lookup = lookup(&server, gate.clone());

        let first = lookup.description(&normalize("Lyon")).await;
        let second = lookup.description(&normalize("Lyon")).await;

        assert_eq!(first.as_deref(), Some("Lyon is a city in France."));
        assert_eq!(second, first);
        mock.assert_hits_async(1).await;
        assert_eq!(gate.0.load(Ordering::SeqCst), 1, "cache hits bypass the gate");
    }

    #[tokio::test]
    async fn summaries_without_text_get_the_fallback_and_are_not_cached() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page/summary/metz");
                then.status(200).json_body(json!({"title": "Metz", "extract": ""}));
            })
            .await;
        let lookup = lookup(&server, Arc::new(Ungated));

        for _ in 0..2 {
            let description = lookup.description(&normalize("Metz")).await;
            assert_eq!(description.as_deref(), Some(FALLBACK_DESCRIPTION));
        }
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn failed_lookups_are_none_and_are_not_cached() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/page/summary/atlantis");
                then.status(404).json_body(json!({"type": "not_found"}));
            })
            .await;
        let lookup = lookup(&server, Arc::new(Ungated));

        assert_eq!(lookup.description(&normalize("Atlantis")).await, None);
        assert_eq!(lookup.description(&normalize("Atlantis")).await, None);
        mock.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn unparsable_summaries_are_failures() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/page/summary/paris");
                then.status(200).body("<html>not json</html>");
            })
            .await;
        let lookup = lookup(&server, Arc::new(Ungated));

        assert_eq!(lookup.description(&normalize("Paris")).await, None);
    }

    #[tokio::test]
    async fn unreachable_service_is_a_failure() {
        let lookup = WikipediaDescriptions::new(
            &settings("http://127.0.0.1:1/page/summary/".to_string()),
            Arc::new(Ungated),
            Arc::new(MemoryDescriptionStore::new("descriptions")),
            StatsdClient::from_sink("smog-test", NopMetricSink),
        )
        .unwrap();

        assert_eq!(lookup.description(&normalize("Paris")).await, None);
    }
}

//! Tools for running tests

use crate::utils::{logging::LogWatcher, metrics::MetricsWatcher};
use httpmock::MockServer;
use reqwest::{redirect, Client, ClientBuilder, RequestBuilder};
use smog_settings::Settings;
use std::{future::Future, net::TcpListener};
use tracing::{instrument::WithSubscriber, Instrument};
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt};

/// Run a test with a fully configured Smog server.
///
/// The server will listen on a port assigned arbitrarily by the OS.
///
/// A suite of tools will be passed to the test function in the form of an
/// instance of [`TestingTools`]. It includes an HTTP client configured to use
/// the test server, HTTP mock servers that the pollution API and Wikipedia
/// clients have been configured to use, and collectors that can make
/// assertions about logs and metrics.
///
/// The mock servers start without any mocks. Tests add the ones they need,
/// usually with [`mock_login`](crate::mock_login),
/// [`mock_pollution_pages`](crate::mock_pollution_pages) and
/// [`mock_description`](crate::mock_description). The rate gates are
/// configured without any spacing, so tests don't wait.
///
/// # Example
///
/// ```
/// # use smog_integration_tests::{smog_test, TestingTools};
/// #[actix_rt::test]
/// async fn a_test() {
///     smog_test(
///         |settings| settings.debug = false,
///         |TestingTools { test_client, mut log_watcher, .. }| async move {
///             assert!(true) // Test goes here
///         }
///     ).await
/// }
/// ```
///
/// # Panics
/// May panic if tests could not be set up correctly.
pub async fn smog_test<FSettings, FTest, Fut>(settings_changer: FSettings, test: FTest) -> Fut::Output
where
    FSettings: FnOnce(&mut Settings),
    FTest: Fn(TestingTools) -> Fut,
    Fut: Future,
{
    let test_span = tracing::info_span!("smog_test");

    // Load settings
    let mut settings = Settings::load_for_tests();

    // Set up logging
    let log_watcher = LogWatcher::default();
    let log_watcher_writer = log_watcher.make_writer();

    let env_filter: tracing_subscriber::EnvFilter = (&settings.logging.levels).into();
    let tracing_subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(move || log_watcher_writer.clone()),
        )
        .with(tracing_subscriber::fmt::layer().pretty().with_test_writer());

    let _tracing_subscriber_guard = tracing::subscriber::set_default(tracing_subscriber);

    // Set up mock servers for the upstreams
    let pollution_mock = MockServer::start_async().await;
    settings.pollution.base_url = pollution_mock.base_url();
    let wikipedia_mock = MockServer::start_async().await;
    settings.wikipedia.summary_endpoint = wikipedia_mock.url("/page/summary/");

    settings_changer(&mut settings);

    // Setup metrics
    assert_eq!(
        settings.metrics.sink_host, "0.0.0.0",
        "Tests cannot change the metrics sink host, since it is ignored"
    );
    assert_eq!(
        settings.metrics.sink_port, 8125,
        "Tests cannot change the metrics sink address, since it is ignored"
    );
    let (metrics_watcher, metrics_client) = MetricsWatcher::new_with_client();

    // Run server in the background
    let listener = TcpListener::bind(settings.http.listen).expect("Failed to bind to a port");
    let address = listener.local_addr().unwrap().to_string();
    let server = smog_web::run(listener, metrics_client, settings).expect("Failed to start server");
    let server_handle = tokio::spawn(server.with_current_subscriber());
    let test_client = TestReqwestClient::new(address);

    // Assemble the tools
    let tools = TestingTools {
        test_client,
        pollution_mock,
        wikipedia_mock,
        log_watcher,
        metrics_watcher,
    };
    // Run the test
    let rv = test(tools).instrument(test_span).await;
    server_handle.abort();
    rv
}

/// A set of tools for tests, including mock servers and logging helpers.
///
/// The fields of this struct are marked as non-exhaustive, meaning that any
/// destructuring of this struct will require a `..` "and the rest" entry, even
/// if all present items are named. This makes adding tools in the future easier,
/// since old tests won't need to be rewritten to account for the added tools.
#[non_exhaustive]
pub struct TestingTools {
    /// A wrapper around a `reqwest::client` that automatically uses the Smog
    /// server under test.
    pub test_client: TestReqwestClient,

    /// A [`httpmock::MockServer`] standing in for the pollution API. Has no
    /// mocks until the test adds some.
    pub pollution_mock: MockServer,

    /// A [`httpmock::MockServer`] standing in for Wikipedia. Summaries are
    /// requested at `/page/summary/{name}`.
    pub wikipedia_mock: MockServer,

    /// To make assertions about logs.
    pub log_watcher: LogWatcher,

    /// To make assertions about metrics.
    pub metrics_watcher: MetricsWatcher,
}

/// A wrapper around a `[reqwest::client]` that automatically sends requests to
/// the test server.
///
/// This only handles `GET` requests right now. Other methods should be
/// added as needed.
///
/// The client is configured to not follow any redirects.
pub struct TestReqwestClient {
    /// The wrapped client.
    client: Client,

    /// The server address to implicitly use for all requests.
    address: String,
}

impl TestReqwestClient {
    /// Construct a new test client that uses `address` for every request given.
    pub fn new(address: String) -> Self {
        let client = ClientBuilder::new()
            .redirect(redirect::Policy::none())
            .build()
            .expect("Could not build test client");
        Self { client, address }
    }

    /// Start building a GET request to the test server with the path specified.
    ///
    /// The path should start with `/`, such as `/__heartbeat__`.
    pub fn get(&self, path: &str) -> RequestBuilder {
        assert!(path.starts_with('/'));
        let url = format!("http://{}{}", &self.address, path);
        self.client.get(url)
    }
}

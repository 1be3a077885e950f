#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! Web server for [Smog](../smog/index.html)'s public API.

mod components;
mod dockerflow;
mod endpoints;
mod errors;
mod logging;
mod middleware;

pub use crate::components::build_aggregator;

use actix_cors::Cors;
use actix_web::{
    dev::Server,
    web::{self, Data},
    App, HttpServer,
};
use anyhow::Context;
use cadence::StatsdClient;
use smog_settings::Settings;
use std::net::TcpListener;
use tracing_actix_web::TracingLogger;

use crate::{endpoints::cities, logging::SmogRootSpanBuilder};

/// Run the web server
///
/// The returned server is a `Future` that must either be `.await`ed, or run it
/// as a background task using `tokio::spawn`.
///
/// Most of the details from `settings` will be respected, except for those that
/// go into building the listener (the host and port). If you want to respect the
/// settings specified in that object, you must include them in the construction
/// of `listener`.
///
/// The aggregator, its caches and its rate gates are built once here and
/// shared by every worker.
///
/// # Errors
///
/// Returns an error if the upstream clients can't be built from `settings`, or
/// if the server cannot be started on the provided listener.
///
/// # Examples
///
/// Run the server in the foreground. This will only return if there is an error
/// that causes the server to shut down. This is used to run Smog as a service,
/// such as in production.
///
/// ```no_run
/// # tokio_test::block_on(async {
/// let listener = std::net::TcpListener::bind("127.0.0.1:8080")
///     .expect("Failed to bind port");
/// let settings = smog_settings::Settings::load()
///     .expect("Failed to load settings");
/// let metrics_client = cadence::StatsdClient::from_sink("smog", cadence::NopMetricSink);
/// smog_web::run(listener, metrics_client, settings)
///     .expect("Failed to start server")
///     .await
///     .expect("Fatal error while running server");
/// # })
/// ```
pub fn run(
    listener: TcpListener,
    metrics_client: StatsdClient,
    settings: Settings,
) -> anyhow::Result<Server> {
    let num_workers = settings.http.workers;

    let aggregator = Data::new(
        build_aggregator(&settings, &metrics_client).context("Building the city aggregator")?,
    );
    let metrics_client = Data::new(metrics_client);
    let settings = Data::new(settings);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(settings.clone())
            .app_data(metrics_client.clone())
            .app_data(aggregator.clone())
            .wrap(middleware::Metrics)
            .wrap(TracingLogger::<SmogRootSpanBuilder>::new())
            .wrap(Cors::permissive())
            // The core functionality of Smog
            .service(web::scope("api/v1/cities").configure(cities::configure))
            // Add the behavior necessary to satisfy Dockerflow.
            .service(web::scope("").configure(dockerflow::configure))
    })
    .listen(listener)
    .context("Listening")?;

    if let Some(n) = num_workers {
        server = server.workers(n);
    }

    Ok(server.run())
}

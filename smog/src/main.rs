// Only overview documentation that is not relevant to one of the more specific
// crates should go here.

#![warn(missing_docs, clippy::missing_docs_in_private_items)]

//! A web API listing the most polluted cities of a country.
//!
//! Smog is split into several subcrates that work in collaboration.
//!
//! - [smog-cities](../smog_cities/index.html)
//! - [smog-cache](../smog_cache/index.html)
//! - [smog-pollution](../smog_pollution/index.html)
//! - [smog-wikipedia](../smog_wikipedia/index.html)
//! - [smog-settings](../smog_settings/index.html)
//! - [smog-web](../smog_web/index.html)
//! - [smog-integration-tests](../smog_integration_tests/index.html)

mod docs;

use anyhow::{Context, Result};
use cadence::{BufferedUdpMetricSink, QueuingMetricSink, StatsdClient};
use smog_settings::{LogFormat, Settings};
use std::net::{TcpListener, UdpSocket};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

/// Primary entry point
#[actix_rt::main]
async fn main() -> Result<()> {
    let settings = smog_settings::Settings::load().context("Loading settings")?;
    init_logging(&settings)?;
    let metrics_client = init_metrics(&settings).context("Setting up metrics")?;
    let listener = TcpListener::bind(settings.http.listen).context("Binding port")?;

    tracing::info!(
        r#type = "app.starting",
        env = %settings.env,
        address = %settings.http.listen,
        "Starting Smog"
    );

    smog_web::run(listener, metrics_client, settings)
        .context("Starting smog-web server")?
        .await
        .context("Running smog-web server")?;

    Ok(())
}

/// Set up logging for Smog, based on settings and the `RUST_LOG` environment variable.
fn init_logging(settings: &Settings) -> Result<()> {
    LogTracer::init()?;
    let env_filter: EnvFilter = (&settings.logging.levels).into();

    match settings.logging.format {
        LogFormat::Pretty => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty());
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Compact => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact());
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_current_span(true));
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}

/// Set up a StatsD client that sends metrics over UDP from a background thread.
fn init_metrics(settings: &Settings) -> Result<StatsdClient> {
    let socket = UdpSocket::bind("0.0.0.0:0").context("Binding metrics socket")?;
    socket.set_nonblocking(true)?;

    let host = (settings.metrics.sink_host.as_str(), settings.metrics.sink_port);
    let udp_sink = BufferedUdpMetricSink::from(host, socket).context("Creating metrics sink")?;
    let queuing_sink = match settings.metrics.max_queue_size {
        Some(size) => QueuingMetricSink::with_capacity(udp_sink, size),
        None => QueuingMetricSink::from(udp_sink),
    };

    let client = StatsdClient::builder("smog", queuing_sink)
        .with_error_handler(|error| {
            tracing::warn!(r#type = "app.metrics.error", %error, "Could not send metric");
        })
        .build();
    Ok(client)
}

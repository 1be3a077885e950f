//! # High level overview of Smog
//!
//! This project is structured as a [Cargo Workspace][] that contains one crate
//! for each broad area of behavior for Smog.
//!
//! [Cargo Workspace]: https://doc.rust-lang.org/book/ch14-03-cargo-workspaces.html
//!
//! ## [`smog`](../)
//!
//! The binary. It loads settings, sets up logging and metrics, and starts the
//! web server.
//!
//! ## [`smog-cities`](../../../smog_cities/)
//!
//! The domain: name normalization, the rate gates, the store and upstream
//! traits, and the aggregator that validates, deduplicates, describes and
//! ranks readings before paging them.
//!
//! ## [`smog-pollution`](../../../smog_pollution/) and [`smog-wikipedia`](../../../smog_wikipedia/)
//!
//! HTTP clients for the two upstreams. The pollution client logs in once per
//! full fetch and walks the listing until an empty page. The Wikipedia client
//! caches every description it finds.
//!
//! ## [`smog-cache`](../../../smog_cache/)
//!
//! The in-memory store behind both caches. Entries live as long as the process.
//!
//! ## [`smog-web`](../../../smog_web/)
//!
//! The actix-web server, and the place where the pieces above are built and
//! shared between workers.
//!
//! ## [`smog-settings`](../../../smog_settings/)
//!
//! Layered configuration. See the crate docs for the order files and
//! environment variables are read in.
//!
//! ## [`smog-integration-tests`](../../../smog_integration_tests/)
//!
//! Tests that start the whole server against mock upstreams and talk to it
//! over HTTP.

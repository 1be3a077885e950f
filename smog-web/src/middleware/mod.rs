//! Middlewares specific to Smog.

mod metrics;

pub use self::metrics::Metrics;

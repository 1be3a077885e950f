//! Web handlers for Smog's public API.

pub mod cities;

//! Documentation that isn't tied to one crate.

pub mod api;
pub mod overview;

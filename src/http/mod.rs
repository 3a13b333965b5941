//! HTTP protocol layer module
//!
//! Responses produced by the engine itself, before any handler runs.

pub mod response;

pub use response::build_400_response;

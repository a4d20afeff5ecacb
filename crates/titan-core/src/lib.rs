//! Shared foundation for the titan workers: configuration, errors, common
//! types, address normalization, the pooled HTTP client and the shutdown
//! handle every worker loop polls.

pub mod address;
pub mod config;
pub mod errors;
pub mod http;
pub mod prelude;
pub mod shutdown;
pub mod types;

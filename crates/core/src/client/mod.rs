//! External job client abstraction.
//!
//! This module provides a `JobClient` trait for submitting, polling and
//! downloading asynchronously-running jobs on a remote API.

mod http;
mod types;

pub use http::HttpJobClient;
pub use types::*;

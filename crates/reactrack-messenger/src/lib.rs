//! HTTP collaborators of the turn engine.
//!
//! - [`GraphSendChannel`]: Send API for messages and sender actions
//! - [`GraphIdentityProvider`]: user profile lookups
//! - [`ApiAiEngine`]: intent engine `/v1/query` client
//!
//! [`mock`] holds in-process doubles of all three for tests.

pub mod converter;
pub mod fulfillment;
pub mod graph;
pub mod mock;
pub mod profile;
pub mod send;

use std::time::Duration;

pub use fulfillment::{ApiAiConfig, ApiAiEngine};
pub use graph::GraphConfig;
pub use profile::GraphIdentityProvider;
pub use send::GraphSendChannel;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared HTTP client for all collaborators.
pub fn http_client(request_timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
}

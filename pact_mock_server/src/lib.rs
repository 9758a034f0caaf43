//! The `pact_mock_server` crate provides the in-process mock server for consumer pact
//! tests. For the lifetime of a test it answers requests by matching them against the
//! expected interactions, records the actual traffic, and yields the mismatches on
//! shutdown.

#![warn(missing_docs)]

use thiserror::Error;

use pact_models::pact::Pact;

pub mod matching;
pub mod mock_server;
mod hyper_server;

pub use crate::matching::MatchResult;
pub use crate::mock_server::{MockServer, MockServerConfig, MockServerMetrics, MockStatus};

/// Errors that can occur when starting a mock server
#[derive(Error, Debug)]
pub enum MockServerError {
  /// The pact has no HTTP interactions to serve
  #[error("The pact has no HTTP interactions to serve")]
  NoInteractions,
  /// The server could not be started
  #[error("Could not start the mock server: {0}")]
  ServerStartError(String)
}

/// Starts a mock server for the pact on its own background runtime. Binds to the
/// loopback interface on an ephemeral port unless the config says otherwise.
pub fn start_mock_server(pact: Pact, config: MockServerConfig) -> Result<MockServer, MockServerError> {
  if !pact.interactions.iter().any(|i| i.as_synchronous_http().is_some()) {
    return Err(MockServerError::NoInteractions);
  }
  MockServer::start(pact, config)
    .map_err(|err| MockServerError::ServerStartError(err.to_string()))
}

#[cfg(test)]
mod tests;

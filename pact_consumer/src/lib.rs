//! The `pact_consumer` crate provides the consumer-side DSL for writing pact tests:
//! fluent construction of interactions with embedded matching rules and generators,
//! and a scoped mock server that validates the recorded traffic and writes the pact
//! file.
//!
//! ```no_run
//! use pact_consumer::prelude::*;
//! use pact_consumer::{json_pattern, json_pattern_internal, like};
//!
//! // Define the pact for the test
//! let mut pact_builder = PactBuilder::new("user client", "user service");
//! pact_builder.interaction("a request for user 123", |i| {
//!   i.given("user 123 exists");
//!   i.request.path("/users/123");
//!   i.response
//!     .header("Content-Type", "application/json")
//!     .json_body(json_pattern!({
//!       "id": 123,
//!       "name": like!("Alice")
//!     }));
//! });
//!
//! // Start the mock server running
//! let user_service = pact_builder.start_mock_server(None);
//!
//! // Use your actual client code to make requests against `user_service.url()`.
//! // When `user_service` goes out of scope, the pact is validated and written,
//! // and the test fails if the mock server didn't receive matching requests.
//! ```

#![warn(missing_docs)]

pub mod patterns;
pub mod builders;
pub mod mock_server;

/// A "prelude" or a default list of import types to include.
pub mod prelude {
  pub use crate::builders::{HttpPartBuilder, InteractionBuilder, MessageInteractionBuilder, PactBuilder, RequestBuilder, ResponseBuilder};
  pub use crate::mock_server::ValidatingMockServer;
  pub use crate::patterns::{JsonPattern, StringPattern};
  pub use pact_mock_server::MockServerConfig;
  pub use pact_models::generators::Generator;
  pub use pact_models::matchingrules::MatchingRule;
}

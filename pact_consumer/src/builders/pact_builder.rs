//! Builder for `Pact` objects

use pact_models::pact::Pact;
use pact_models::v4::interaction::Interaction;

use crate::builders::interaction_builder::InteractionBuilder;
use crate::builders::message_builder::MessageInteractionBuilder;
use crate::mock_server::ValidatingMockServer;
use pact_mock_server::MockServerConfig;

/// Builder for `Pact` objects.
///
/// ```
/// use pact_consumer::prelude::*;
/// use pact_consumer::{json_pattern, json_pattern_internal};
///
/// let pact = PactBuilder::new("Greeting Client", "Greeting Server")
///   .interaction("asks for a greeting", |i| {
///     i.request.path("/greeting/hello");
///     i.response
///       .header("Content-Type", "application/json")
///       .json_body(json_pattern!({ "message": "hello" }));
///   })
///   .build();
///
/// // The request method and response status default as follows.
/// assert_eq!(pact.interactions[0].as_synchronous_http().unwrap().request.method, "GET");
/// assert_eq!(pact.interactions[0].as_synchronous_http().unwrap().response.status, 200);
/// ```
pub struct PactBuilder {
  pact: Pact,
  current: Option<InteractionBuilder>
}

impl PactBuilder {
  /// Create a new `PactBuilder`, specifying the names of the service consuming the
  /// API and the service providing it
  pub fn new<C, P>(consumer: C, provider: P) -> Self
    where C: Into<String>, P: Into<String>
  {
    PactBuilder {
      pact: Pact::new(consumer, provider),
      current: None
    }
  }

  /// Add a new HTTP interaction to the pact, built by the closure
  pub fn interaction<D, F>(&mut self, description: D, build_fn: F) -> &mut Self
    where D: Into<String>, F: FnOnce(&mut InteractionBuilder)
  {
    let mut interaction = InteractionBuilder::new(description);
    build_fn(&mut interaction);
    self.push_interaction(Interaction::SynchronousHttp(interaction.build()))
  }

  /// Starts a new interaction in the fluent style: any previously started interaction
  /// is finalized into the pact, and the returned builder owns the new one until
  /// `upon_receiving` is called again or the pact is built.
  pub fn upon_receiving<D: Into<String>>(&mut self, description: D) -> &mut InteractionBuilder {
    self.finalize_current();
    self.current = Some(InteractionBuilder::new(description));
    self.current.as_mut().unwrap()
  }

  fn finalize_current(&mut self) {
    if let Some(interaction) = self.current.take() {
      self.pact.add_interaction(Interaction::SynchronousHttp(interaction.build()));
    }
  }

  /// Add a new asynchronous message interaction to the pact, built by the closure
  pub fn message_interaction<D, F>(&mut self, description: D, build_fn: F) -> &mut Self
    where D: Into<String>, F: FnOnce(&mut MessageInteractionBuilder)
  {
    let mut message = MessageInteractionBuilder::new(description);
    build_fn(&mut message);
    self.push_interaction(Interaction::AsynchronousMessage(message.build()))
  }

  /// Directly add a pre-built interaction to the pact. Normally it's easier to use
  /// `interaction` instead of this function.
  pub fn push_interaction(&mut self, interaction: Interaction) -> &mut Self {
    self.pact.add_interaction(interaction);
    self
  }

  /// Return the pact we've built
  pub fn build(&mut self) -> Pact {
    self.finalize_current();
    self.pact.clone()
  }

  /// Start a mock server for the pact, returning a handle that validates the session
  /// when it is dropped
  pub fn start_mock_server(&mut self, config: Option<MockServerConfig>) -> ValidatingMockServer {
    ValidatingMockServer::start(self.build(), config.unwrap_or_default())
  }
}

//! Typed state and message handlers. The handlers the user supplies are explicit
//! tagged variants, dispatched by tag: functions of different arities, static values,
//! or an HTTP endpoint that the verifier posts the state change to.

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;
use tracing::debug;

use pact_models::provider_states::ProviderState;
use pact_models::v4::message_parts::MessageContents;

use crate::provider_client::make_state_change_request;

/// The action a state handler is invoked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
  /// Set the provider state up before the interaction is replayed
  Setup,
  /// Tear the provider state down after the interaction
  Teardown
}

impl StateAction {
  /// The wire form of this action
  pub fn as_str(&self) -> &'static str {
    match self {
      StateAction::Setup => "setup",
      StateAction::Teardown => "teardown"
    }
  }
}

/// A function handler that only receives the state parameters
pub type StateFn0 = Arc<dyn Fn(&HashMap<String, Value>) -> anyhow::Result<HashMap<String, Value>> + Send + Sync>;
/// A function handler that receives the state name and parameters
pub type StateFn1 = Arc<dyn Fn(&str, &HashMap<String, Value>) -> anyhow::Result<HashMap<String, Value>> + Send + Sync>;
/// A function handler that receives the state name, the action and the parameters
pub type StateFn2 = Arc<dyn Fn(&str, StateAction, &HashMap<String, Value>) -> anyhow::Result<HashMap<String, Value>> + Send + Sync>;

/// A state handler: the user-supplied callback the verifier drives for each declared
/// provider state. Dispatch is by explicit variant tag.
#[derive(Clone)]
pub enum StateHandler {
  /// No handler configured: states are ignored
  None,
  /// Function of the parameters only. Only invoked for setup.
  Func0(StateFn0),
  /// Function of the state name and parameters. Only invoked for setup.
  Func1(StateFn1),
  /// Function of the state name, action and parameters. Invoked for both actions.
  Func2(StateFn2),
  /// HTTP endpoint: the state change is posted to the URL. When `as_body` is set the
  /// change is sent as a JSON body, otherwise as query parameters.
  UrlEndpoint {
    /// The URL to send state changes to
    url: String,
    /// Send the state change as a JSON body (`true`) or as query parameters
    as_body: bool,
    /// If teardown calls should be made after each interaction
    teardown: bool
  }
}

impl Debug for StateHandler {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      StateHandler::None => write!(f, "StateHandler::None"),
      StateHandler::Func0(_) => write!(f, "StateHandler::Func0"),
      StateHandler::Func1(_) => write!(f, "StateHandler::Func1"),
      StateHandler::Func2(_) => write!(f, "StateHandler::Func2"),
      StateHandler::UrlEndpoint { url, as_body, teardown } =>
        write!(f, "StateHandler::UrlEndpoint({}, as_body={}, teardown={})", url, as_body, teardown)
    }
  }
}

impl Default for StateHandler {
  fn default() -> Self {
    StateHandler::None
  }
}

impl StateHandler {
  /// If teardown calls should be dispatched to this handler
  pub fn teardown_enabled(&self) -> bool {
    match self {
      StateHandler::Func2(_) => true,
      StateHandler::UrlEndpoint { teardown, .. } => *teardown,
      _ => false
    }
  }

  /// Dispatches the state change to the handler. Returns the values the handler
  /// produced, which are injected into the generator context for provider-state
  /// substitution.
  pub async fn call(
    &self,
    state: &ProviderState,
    action: StateAction,
    client: &reqwest::Client
  ) -> anyhow::Result<HashMap<String, Value>> {
    debug!("Invoking state handler for state '{}' action {:?}", state.name, action);
    match self {
      StateHandler::None => Ok(HashMap::default()),
      StateHandler::Func0(handler) => if action == StateAction::Setup {
        handler(&state.params)
      } else {
        Ok(HashMap::default())
      },
      StateHandler::Func1(handler) => if action == StateAction::Setup {
        handler(&state.name, &state.params)
      } else {
        Ok(HashMap::default())
      },
      StateHandler::Func2(handler) => handler(&state.name, action, &state.params),
      StateHandler::UrlEndpoint { url, as_body, .. } =>
        make_state_change_request(client, url, state, action, *as_body).await
    }
  }
}

/// A message producer: the user-supplied source of actual messages during message
/// pact verification.
#[derive(Clone)]
pub enum MessageProducer {
  /// No producer configured
  None,
  /// A static message returned for every description
  Static(MessageContents),
  /// A function of the message description and metadata
  Func(Arc<dyn Fn(&str, &HashMap<String, Value>) -> anyhow::Result<MessageContents> + Send + Sync>),
  /// A map of description to static messages
  Map(HashMap<String, MessageContents>),
  /// HTTP endpoint: the message request is posted to the URL, and the response body
  /// (plus the base64 `Pact-Message-Metadata` header) is the actual message
  UrlEndpoint {
    /// The URL to request messages from
    url: String
  }
}

impl Debug for MessageProducer {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      MessageProducer::None => write!(f, "MessageProducer::None"),
      MessageProducer::Static(_) => write!(f, "MessageProducer::Static"),
      MessageProducer::Func(_) => write!(f, "MessageProducer::Func"),
      MessageProducer::Map(map) => write!(f, "MessageProducer::Map({:?})", map.keys()),
      MessageProducer::UrlEndpoint { url } => write!(f, "MessageProducer::UrlEndpoint({})", url)
    }
  }
}

impl Default for MessageProducer {
  fn default() -> Self {
    MessageProducer::None
  }
}

impl MessageProducer {
  /// Produces the actual message for the given description
  pub async fn produce(
    &self,
    description: &str,
    metadata: &HashMap<String, Value>,
    client: &reqwest::Client
  ) -> anyhow::Result<MessageContents> {
    match self {
      MessageProducer::None => Err(anyhow!("No message handler has been configured for '{}'", description)),
      MessageProducer::Static(contents) => Ok(contents.clone()),
      MessageProducer::Func(producer) => producer(description, metadata),
      MessageProducer::Map(map) => map.get(description)
        .cloned()
        .ok_or_else(|| anyhow!("No message handler has been configured for '{}'", description)),
      MessageProducer::UrlEndpoint { url } =>
        crate::provider_client::make_message_request(client, url, description, metadata).await
    }
  }
}

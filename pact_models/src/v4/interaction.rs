//! V4 specification models - the interaction tagged union

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use anyhow::anyhow;
use itertools::Itertools;
use serde_json::Value;

use crate::json_utils::json_to_string;
use crate::PactSpecification;
use crate::provider_states::ProviderState;
use crate::v4::async_message::AsynchronousMessage;
use crate::v4::sync_message::SynchronousMessage;
use crate::v4::synch_http::SynchronousHttp;

/// An interaction in a pact: a tagged union over the supported interaction types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
  /// An expected HTTP request/response pair
  SynchronousHttp(SynchronousHttp),
  /// An asynchronous message
  AsynchronousMessage(AsynchronousMessage),
  /// A synchronous request/response message pair
  SynchronousMessage(SynchronousMessage)
}

impl Interaction {
  /// Parses an interaction from its JSON form. V4 pact files carry a `type`
  /// discriminator; older files are detected from their attributes (request/response
  /// entries are HTTP interactions, entries with message contents are messages).
  pub fn from_json(json: &Value, index: usize) -> anyhow::Result<Interaction> {
    match json.get("type") {
      Some(interaction_type) => match json_to_string(interaction_type).as_str() {
        "Synchronous/HTTP" => Ok(Interaction::SynchronousHttp(SynchronousHttp::from_json(json, index)?)),
        "Asynchronous/Messages" => Ok(Interaction::AsynchronousMessage(AsynchronousMessage::from_json(json, index)?)),
        "Synchronous/Messages" => Ok(Interaction::SynchronousMessage(SynchronousMessage::from_json(json, index)?)),
        other => Err(anyhow!("'{}' is not a valid interaction type", other))
      },
      None => if json.get("request").is_some() || json.get("response").is_some() {
        Ok(Interaction::SynchronousHttp(SynchronousHttp::from_json(json, index)?))
      } else {
        Ok(Interaction::AsynchronousMessage(AsynchronousMessage::from_json(json, index)?))
      }
    }
  }

  /// Converts this interaction to its JSON form for the given specification version
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    match self {
      Interaction::SynchronousHttp(interaction) => interaction.to_json(spec_version),
      Interaction::AsynchronousMessage(interaction) => interaction.to_json(spec_version),
      Interaction::SynchronousMessage(interaction) => interaction.to_json(spec_version)
    }
  }

  /// A textual description of the interaction type
  pub fn type_of(&self) -> &'static str {
    match self {
      Interaction::SynchronousHttp(_) => "Synchronous/HTTP",
      Interaction::AsynchronousMessage(_) => "Asynchronous/Messages",
      Interaction::SynchronousMessage(_) => "Synchronous/Messages"
    }
  }

  /// Interaction ID, set when the pact was fetched from a Pact Broker
  pub fn id(&self) -> Option<String> {
    match self {
      Interaction::SynchronousHttp(interaction) => interaction.id.clone(),
      Interaction::AsynchronousMessage(interaction) => interaction.id.clone(),
      Interaction::SynchronousMessage(interaction) => interaction.id.clone()
    }
  }

  /// Description of the interaction
  pub fn description(&self) -> &str {
    match self {
      Interaction::SynchronousHttp(interaction) => &interaction.description,
      Interaction::AsynchronousMessage(interaction) => &interaction.description,
      Interaction::SynchronousMessage(interaction) => &interaction.description
    }
  }

  /// Provider states of the interaction
  pub fn provider_states(&self) -> &Vec<ProviderState> {
    match self {
      Interaction::SynchronousHttp(interaction) => &interaction.provider_states,
      Interaction::AsynchronousMessage(interaction) => &interaction.provider_states,
      Interaction::SynchronousMessage(interaction) => &interaction.provider_states
    }
  }

  /// If this interaction is pending
  pub fn pending(&self) -> bool {
    match self {
      Interaction::SynchronousHttp(interaction) => interaction.pending,
      Interaction::AsynchronousMessage(interaction) => interaction.pending,
      Interaction::SynchronousMessage(interaction) => interaction.pending
    }
  }

  /// Comments associated with the interaction
  pub fn comments(&self) -> &HashMap<String, Value> {
    match self {
      Interaction::SynchronousHttp(interaction) => &interaction.comments,
      Interaction::AsynchronousMessage(interaction) => &interaction.comments,
      Interaction::SynchronousMessage(interaction) => &interaction.comments
    }
  }

  /// The key that identifies an interaction within a pact: its description plus the
  /// set of provider states (names and parameters). Interactions with the same key
  /// replace each other when pacts are merged.
  pub fn unique_key(&self) -> String {
    let states = self.provider_states().iter()
      .map(|state| state.to_json().to_string())
      .sorted()
      .join(", ");
    format!("{}:[{}]", self.description(), states)
  }

  /// Returns this interaction as a synchronous HTTP interaction, if it is one
  pub fn as_synchronous_http(&self) -> Option<&SynchronousHttp> {
    match self {
      Interaction::SynchronousHttp(interaction) => Some(interaction),
      _ => None
    }
  }

  /// Returns this interaction as an asynchronous message, if it is one
  pub fn as_asynchronous_message(&self) -> Option<&AsynchronousMessage> {
    match self {
      Interaction::AsynchronousMessage(interaction) => Some(interaction),
      _ => None
    }
  }

  /// Returns this interaction as a synchronous message, if it is one
  pub fn as_synchronous_message(&self) -> Option<&SynchronousMessage> {
    match self {
      Interaction::SynchronousMessage(interaction) => Some(interaction),
      _ => None
    }
  }
}

impl Display for Interaction {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} '{}'", self.type_of(), self.description())
  }
}

//! V4 specification models - asynchronous message interactions

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::json_utils::json_to_string;
use crate::PactSpecification;
use crate::provider_states::{provider_states_from_json, ProviderState};
use crate::v4::message_parts::MessageContents;

/// An asynchronous message interaction: a single message a provider produces for the
/// consumer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AsynchronousMessage {
  /// Interaction ID. This will only be set if the pact was fetched from a Pact Broker
  pub id: Option<String>,
  /// Unique key for this interaction within the pact
  pub key: Option<String>,
  /// A description for the interaction. Must be unique within the pact in combination
  /// with the provider states
  pub description: String,
  /// Optional provider states for the interaction
  pub provider_states: Vec<ProviderState>,
  /// The contents of the message
  pub contents: MessageContents,
  /// If this interaction is pending: it is expected to fail and the failure will not
  /// fail the overall result
  pub pending: bool,
  /// Annotations and comments associated with the interaction
  pub comments: HashMap<String, Value>
}

impl AsynchronousMessage {
  /// Parses an asynchronous message from its JSON form. The message contents, metadata,
  /// matching rules and generators are all attributes of the interaction object itself.
  pub fn from_json(json: &Value, index: usize) -> anyhow::Result<AsynchronousMessage> {
    let id = json.get("_id").map(json_to_string);
    let key = json.get("key").map(json_to_string);
    let description = match json.get("description") {
      Some(v) => json_to_string(v),
      None => format!("Interaction {}", index)
    };
    let comments = match json.get("comments") {
      Some(Value::Object(map)) => map.iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
      _ => HashMap::default()
    };
    Ok(AsynchronousMessage {
      id,
      key,
      description,
      provider_states: provider_states_from_json(json),
      contents: MessageContents::from_json(json)?,
      pending: json.get("pending").and_then(Value::as_bool).unwrap_or_default(),
      comments
    })
  }

  /// Converts this interaction to its JSON form for the given specification version
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    let mut json = json!({
      "description": self.description
    });
    {
      let map = json.as_object_mut().unwrap();

      if let Value::Object(contents) = self.contents.to_json(spec_version) {
        for (k, v) in contents {
          map.insert(k, v);
        }
      }

      if *spec_version >= PactSpecification::V4 {
        map.insert("type".to_string(), Value::String("Asynchronous/Messages".to_string()));
        if self.pending {
          map.insert("pending".to_string(), Value::Bool(true));
        }
        if let Some(key) = &self.key {
          map.insert("key".to_string(), Value::String(key.clone()));
        }
        if !self.comments.is_empty() {
          map.insert("comments".to_string(), Value::Object(self.comments.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()));
        }
      }

      if !self.provider_states.is_empty() {
        map.insert("providerStates".to_string(), Value::Array(self.provider_states.iter()
          .map(ProviderState::to_json)
          .collect()));
      }
    }
    json
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use serde_json::json;

  use super::*;

  #[test]
  fn json_round_trip() {
    let json = json!({
      "type": "Asynchronous/Messages",
      "description": "a user deletion message",
      "providerStates": [ { "name": "user exists" } ],
      "contents": {
        "content": { "action": "delete_user", "user_id": "123" },
        "contentType": "application/json",
        "encoded": false
      },
      "metadata": { "queue": "users" }
    });
    let message = AsynchronousMessage::from_json(&json, 0).unwrap();
    expect!(message.contents.metadata.get("queue").unwrap()).to(be_equal_to(&json!("users")));

    let generated = message.to_json(&PactSpecification::V4);
    let reparsed = AsynchronousMessage::from_json(&generated, 0).unwrap();
    expect!(reparsed).to(be_equal_to(message));
  }
}

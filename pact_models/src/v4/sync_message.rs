//! V4 specification models - synchronous request/response message interactions

use std::collections::HashMap;

use serde_json::{json, Value};

use crate::json_utils::json_to_string;
use crate::PactSpecification;
use crate::provider_states::{provider_states_from_json, ProviderState};
use crate::v4::message_parts::MessageContents;

/// A synchronous message interaction: a request message with one or more response
/// messages
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SynchronousMessage {
  /// Interaction ID. This will only be set if the pact was fetched from a Pact Broker
  pub id: Option<String>,
  /// Unique key for this interaction within the pact
  pub key: Option<String>,
  /// A description for the interaction. Must be unique within the pact in combination
  /// with the provider states
  pub description: String,
  /// Optional provider states for the interaction
  pub provider_states: Vec<ProviderState>,
  /// The request message
  pub request: MessageContents,
  /// The response messages
  pub response: Vec<MessageContents>,
  /// If this interaction is pending: it is expected to fail and the failure will not
  /// fail the overall result
  pub pending: bool,
  /// Annotations and comments associated with the interaction
  pub comments: HashMap<String, Value>
}

impl SynchronousMessage {
  /// Parses a synchronous message from its V4 JSON form
  pub fn from_json(json: &Value, index: usize) -> anyhow::Result<SynchronousMessage> {
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
    let request = json.get("request").cloned().unwrap_or_default();
    let response = match json.get("response") {
      Some(Value::Array(messages)) => messages.iter()
        .map(MessageContents::from_json)
        .collect::<anyhow::Result<Vec<MessageContents>>>()?,
      Some(response) => vec![ MessageContents::from_json(response)? ],
      None => vec![]
    };
    Ok(SynchronousMessage {
      id,
      key,
      description,
      provider_states: provider_states_from_json(json),
      request: MessageContents::from_json(&request)?,
      response,
      pending: json.get("pending").and_then(Value::as_bool).unwrap_or_default(),
      comments
    })
  }

  /// Converts this interaction to its V4 JSON form
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    let mut json = json!({
      "type": "Synchronous/Messages",
      "description": self.description,
      "request": self.request.to_json(spec_version),
      "response": Value::Array(self.response.iter()
        .map(|response| response.to_json(spec_version))
        .collect())
    });
    {
      let map = json.as_object_mut().unwrap();

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
      "type": "Synchronous/Messages",
      "description": "a request for user data",
      "request": {
        "contents": { "content": { "user_id": "123" }, "contentType": "application/json", "encoded": false }
      },
      "response": [ {
        "contents": { "content": { "name": "Alice" }, "contentType": "application/json", "encoded": false }
      } ]
    });
    let message = SynchronousMessage::from_json(&json, 0).unwrap();
    expect!(message.response.len()).to(be_equal_to(1));

    let generated = message.to_json(&PactSpecification::V4);
    let reparsed = SynchronousMessage::from_json(&generated, 0).unwrap();
    expect!(reparsed).to(be_equal_to(message));
  }
}

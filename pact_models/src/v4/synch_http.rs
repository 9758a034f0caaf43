//! V4 specification models - synchronous HTTP request/response interactions

use std::collections::HashMap;

use itertools::Itertools;
use serde_json::{json, Value};

use crate::json_utils::json_to_string;
use crate::PactSpecification;
use crate::provider_states::{provider_states_from_json, ProviderState};
use crate::v4::http_parts::{HttpRequest, HttpResponse};

/// An expected HTTP request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SynchronousHttp {
  /// Interaction ID. This will only be set if the pact was fetched from a Pact Broker
  pub id: Option<String>,
  /// Unique key for this interaction within the pact
  pub key: Option<String>,
  /// A description for the interaction. Must be unique within the pact in combination
  /// with the provider states
  pub description: String,
  /// Optional provider states for the interaction
  pub provider_states: Vec<ProviderState>,
  /// Request of the interaction
  pub request: HttpRequest,
  /// Response of the interaction
  pub response: HttpResponse,
  /// If this interaction is pending: it is expected to fail and the failure will not
  /// fail the overall result
  pub pending: bool,
  /// Annotations and comments associated with the interaction
  pub comments: HashMap<String, Value>
}

impl SynchronousHttp {
  /// Parses a synchronous HTTP interaction from its JSON form. Handles both the V4
  /// form and the older request/response form.
  pub fn from_json(json: &Value, index: usize) -> anyhow::Result<SynchronousHttp> {
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
    let response = json.get("response").cloned().unwrap_or_default();
    Ok(SynchronousHttp {
      id,
      key,
      description,
      provider_states: provider_states_from_json(json),
      request: HttpRequest::from_json(&request)?,
      response: HttpResponse::from_json(&response)?,
      pending: json.get("pending").and_then(Value::as_bool).unwrap_or_default(),
      comments
    })
  }

  /// Converts this interaction to its JSON form for the given specification version
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    let mut json = json!({
      "description": self.description,
      "request": self.request.to_json(spec_version),
      "response": self.response.to_json(spec_version)
    });
    {
      let map = json.as_object_mut().unwrap();

      if *spec_version >= PactSpecification::V4 {
        map.insert("type".to_string(), Value::String("Synchronous/HTTP".to_string()));
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
        if *spec_version >= PactSpecification::V3 {
          map.insert("providerStates".to_string(), Value::Array(self.provider_states.iter()
            .map(ProviderState::to_json)
            .collect()));
        } else if let Some(state) = self.provider_states.first() {
          map.insert("providerState".to_string(), Value::String(state.name.clone()));
        }
      }
    }
    json
  }

  /// The key that identifies this interaction within a pact: its description plus the
  /// set of provider states (names and parameters). Interactions with the same key
  /// replace each other when pacts are merged.
  pub fn unique_key(&self) -> String {
    let states = self.provider_states.iter()
      .map(|state| state.to_json().to_string())
      .sorted()
      .join(", ");
    format!("{}:[{}]", self.description, states)
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use serde_json::json;

  use super::*;

  #[test]
  fn from_json_with_defaults() {
    let interaction = SynchronousHttp::from_json(&json!({}), 3).unwrap();
    expect!(interaction.description.as_str()).to(be_equal_to("Interaction 3"));
    expect!(interaction.pending).to(be_false());
    expect!(interaction.provider_states.is_empty()).to(be_true());
  }

  #[test]
  fn json_round_trip() {
    let json = json!({
      "type": "Synchronous/HTTP",
      "description": "a request for a user",
      "providerStates": [ { "name": "user exists", "params": { "id": 123 } } ],
      "request": { "method": "GET", "path": "/users/123" },
      "response": { "status": 200 }
    });
    let interaction = SynchronousHttp::from_json(&json, 0).unwrap();
    expect!(interaction.provider_states.len()).to(be_equal_to(1));

    let generated = interaction.to_json(&PactSpecification::V4);
    let reparsed = SynchronousHttp::from_json(&generated, 0).unwrap();
    expect!(reparsed).to(be_equal_to(interaction));
  }

  #[test]
  fn to_json_uses_v2_provider_state_form_for_older_specs() {
    let interaction = SynchronousHttp {
      description: "desc".to_string(),
      provider_states: vec![ ProviderState::default("a state") ],
      .. SynchronousHttp::default()
    };
    let json = interaction.to_json(&PactSpecification::V2);
    expect!(json.get("providerState").unwrap()).to(be_equal_to(&json!("a state")));
    expect!(json.get("type")).to(be_none());
  }
}

//! `provider_states` module contains the model for provider states

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use serde_json::{json, Map, Value};

use crate::json_utils::json_to_string;

/// Struct that encapsulates a provider state: a named precondition, possibly with
/// parameters, that the provider must satisfy before an interaction can be replayed
#[derive(Debug, Clone, Eq, Default)]
pub struct ProviderState {
  /// Description of this provider state
  pub name: String,
  /// Provider state parameters as key/value pairs
  pub params: HashMap<String, Value>
}

impl ProviderState {
  /// Creates a default state with no parameters
  pub fn default(name: &str) -> ProviderState {
    ProviderState {
      name: name.into(),
      params: HashMap::default()
    }
  }

  /// Creates a state with parameters
  pub fn new(name: &str, params: HashMap<String, Value>) -> ProviderState {
    ProviderState {
      name: name.into(),
      params
    }
  }

  /// Constructs a provider state from the `providerState` (V2) or `providerStates` (V3+)
  /// JSON forms
  pub fn from_json(json: &Value) -> ProviderState {
    match json {
      Value::String(s) => ProviderState::default(s),
      Value::Object(map) => ProviderState {
        name: map.get("name").map(json_to_string).unwrap_or_default(),
        params: Self::params_from_json(map)
      },
      _ => ProviderState::default(&json_to_string(json))
    }
  }

  fn params_from_json(map: &Map<String, Value>) -> HashMap<String, Value> {
    match map.get("params") {
      Some(Value::Object(params)) => params.iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
      _ => HashMap::default()
    }
  }

  /// Converts this provider state to its JSON form
  pub fn to_json(&self) -> Value {
    if self.params.is_empty() {
      json!({ "name": self.name })
    } else {
      json!({
        "name": self.name,
        "params": Value::Object(self.params.iter()
          .map(|(k, v)| (k.clone(), v.clone()))
          .collect())
      })
    }
  }
}

impl PartialEq for ProviderState {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name && self.params == other.params
  }
}

impl Hash for ProviderState {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
    for (k, v) in self.params.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
      k.hash(state);
      v.to_string().hash(state);
    }
  }
}

/// Parses the provider states from the JSON of an interaction, handling both the V2
/// `providerState` and V3+ `providerStates` forms
pub fn provider_states_from_json(json: &Value) -> Vec<ProviderState> {
  match json.get("providerStates") {
    Some(Value::Array(states)) => states.iter().map(ProviderState::from_json).collect(),
    _ => match json.get("providerState").or_else(|| json.get("provider_state")) {
      Some(Value::String(s)) if !s.is_empty() => vec![ ProviderState::default(s) ],
      _ => vec![]
    }
  }
}

//! Collection of utilities for working with JSON

use std::collections::HashMap;

use itertools::Itertools;
use serde_json::{self, Map, Value};

use crate::headers::parse_header_value;

/// Converts the JSON struct to a String, first checking if it is a JSON String
pub fn json_to_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    _ => value.to_string()
  }
}

/// Converts an optional JSON struct to a usize, returning None if it is not a numeric type
pub fn json_to_num(value: Option<Value>) -> Option<usize> {
  match value {
    Some(Value::Number(n)) => {
      if n.is_i64() && n.as_i64().unwrap_or_default() > 0 {
        Some(n.as_i64().unwrap_or_default() as usize)
      } else if n.is_u64() {
        Some(n.as_u64().unwrap_or_default() as usize)
      } else if n.is_f64() && n.as_f64().unwrap_or_default() > 0.0 {
        Some(n.as_f64().unwrap_or_default() as usize)
      } else {
        None
      }
    },
    _ => None
  }
}

/// Converts an optional JSON struct to a boolean, returning None if it is not a boolean type
pub fn json_to_bool(value: &Value) -> Option<bool> {
  match value {
    Value::Bool(b) => Some(*b),
    Value::String(s) => s.parse::<bool>().ok(),
    _ => None
  }
}

/// Parses the headers from a JSON `headers` attribute into a map of ordered values
pub fn headers_from_json(json: &Value) -> Option<HashMap<String, Vec<String>>> {
  match json.get("headers") {
    Some(Value::Object(m)) => Some(m.iter().map(|(name, value)| {
      let values = match value {
        Value::String(s) => parse_header_value(name, s),
        Value::Array(values) => values.iter().map(json_to_string).collect(),
        _ => vec![json_to_string(value)]
      };
      (name.clone(), values)
    }).collect()),
    _ => None
  }
}

/// Converts a header map to its JSON form (single values are written as plain strings)
pub fn headers_to_json(headers: &HashMap<String, Vec<String>>) -> Value {
  Value::Object(headers.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b))
    .map(|(name, values)| {
      let value = if values.len() == 1 {
        Value::String(values[0].clone())
      } else {
        Value::Array(values.iter().map(|v| Value::String(v.clone())).collect())
      };
      (name.clone(), value)
    }).collect())
}

/// Look up an attribute in a JSON object in a case-insensitive manner
pub fn get_field_as_string(field: &str, map: &Map<String, Value>) -> Option<String> {
  map.iter()
    .find(|(k, _)| k.to_lowercase() == field.to_lowercase())
    .map(|(_, v)| json_to_string(v))
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use super::*;

  #[test]
  fn json_to_string_tests() {
    expect!(json_to_string(&json!("s"))).to(be_equal_to("s"));
    expect!(json_to_string(&json!(12))).to(be_equal_to("12"));
    expect!(json_to_string(&json!(true))).to(be_equal_to("true"));
  }

  #[test]
  fn json_to_num_tests() {
    expect!(json_to_num(Some(json!(12)))).to(be_some().value(12));
    expect!(json_to_num(Some(json!(-1)))).to(be_none());
    expect!(json_to_num(Some(json!("12")))).to(be_none());
    expect!(json_to_num(None)).to(be_none());
  }

  #[test]
  fn headers_from_json_handles_string_and_array_values() {
    let json = json!({
      "headers": {
        "Accept": "application/json, application/xml",
        "X-Values": ["a", "b"]
      }
    });
    let headers = headers_from_json(&json).unwrap();
    expect!(headers.get("Accept").unwrap().clone()).to(be_equal_to(vec![
      "application/json".to_string(), "application/xml".to_string()]));
    expect!(headers.get("X-Values").unwrap().clone()).to(be_equal_to(vec![
      "a".to_string(), "b".to_string()]));
  }

  #[test]
  fn headers_to_json_writes_single_values_as_strings() {
    let headers = hashmap!{
      "Accept".to_string() => vec!["application/json".to_string()],
      "X-Values".to_string() => vec!["a".to_string(), "b".to_string()]
    };
    expect!(headers_to_json(&headers)).to(be_equal_to(json!({
      "Accept": "application/json",
      "X-Values": ["a", "b"]
    })));
  }
}

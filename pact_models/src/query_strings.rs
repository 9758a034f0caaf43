//! Functions for parsing and formatting query strings

use std::collections::HashMap;

use itertools::Itertools;
use serde_json::Value;
use tracing::warn;

use crate::json_utils::json_to_string;
use crate::PactSpecification;

fn decode_query_component(s: &str) -> String {
  let mut result = String::with_capacity(s.len());
  let mut bytes = vec![];
  let mut chars = s.chars();
  while let Some(ch) = chars.next() {
    match ch {
      '%' => {
        let hex: String = chars.by_ref().take(2).collect();
        match u8::from_str_radix(&hex, 16) {
          Ok(byte) => bytes.push(byte),
          Err(_) => {
            flush_bytes(&mut result, &mut bytes);
            result.push('%');
            result.push_str(&hex);
          }
        }
      },
      '+' => {
        flush_bytes(&mut result, &mut bytes);
        result.push(' ');
      },
      _ => {
        flush_bytes(&mut result, &mut bytes);
        result.push(ch);
      }
    }
  }
  flush_bytes(&mut result, &mut bytes);
  result
}

fn flush_bytes(result: &mut String, bytes: &mut Vec<u8>) {
  if !bytes.is_empty() {
    result.push_str(&String::from_utf8_lossy(bytes));
    bytes.clear();
  }
}

fn encode_query_component(s: &str) -> String {
  s.bytes().map(|b| match b {
    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => (b as char).to_string(),
    _ => format!("%{:02X}", b)
  }).collect()
}

/// Parses a query string into a map of parameter names to ordered lists of values
pub fn parse_query_string(query: &str) -> Option<HashMap<String, Vec<String>>> {
  if query.is_empty() {
    return None;
  }
  let mut result: HashMap<String, Vec<String>> = HashMap::new();
  for pair in query.split('&') {
    if pair.is_empty() {
      continue;
    }
    let mut parts = pair.splitn(2, '=');
    let name = decode_query_component(parts.next().unwrap_or_default());
    let value = decode_query_component(parts.next().unwrap_or_default());
    result.entry(name).or_default().push(value);
  }
  if result.is_empty() {
    None
  } else {
    Some(result)
  }
}

/// Formats a query parameter map as a query string, with parameters sorted by name
pub fn build_query_string(query: &HashMap<String, Vec<String>>) -> String {
  query.iter()
    .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b))
    .flat_map(|(name, values)| values.iter()
      .map(|value| format!("{}={}", encode_query_component(name), encode_query_component(value)))
      .collect_vec())
    .join("&")
}

/// Parses the `query` attribute of a request JSON. V2 pacts store the query as a plain
/// string, V3+ pacts as a map of name to list of values.
pub fn query_from_json(query_json: &Value, spec_version: &PactSpecification) -> Option<HashMap<String, Vec<String>>> {
  match query_json {
    Value::String(s) => parse_query_string(s),
    Value::Object(map) => {
      let result: HashMap<String, Vec<String>> = map.iter().map(|(name, values)| {
        let values = match values {
          Value::Array(array) => array.iter().map(json_to_string).collect(),
          _ => vec![ json_to_string(values) ]
        };
        (name.clone(), values)
      }).collect();
      if result.is_empty() {
        None
      } else {
        Some(result)
      }
    },
    Value::Null => None,
    _ => {
      warn!("Only string or map versions of request query strings are supported with specification version {}, ignoring.",
        spec_version);
      None
    }
  }
}

/// Converts a query parameter map to its JSON form for the given specification version
pub fn query_to_json(query: &HashMap<String, Vec<String>>, spec_version: &PactSpecification) -> Value {
  match spec_version {
    PactSpecification::V3 | PactSpecification::V4 => Value::Object(query.iter()
      .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b))
      .map(|(name, values)| (name.clone(),
        Value::Array(values.iter().map(|v| Value::String(v.clone())).collect())))
      .collect()),
    _ => Value::String(build_query_string(query))
  }
}

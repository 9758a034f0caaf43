//! The `pact_models` crate provides the structs and traits required to model a Pact:
//! the contract document, its interactions, and the matching-rule and generator
//! language the interactions are expressed in.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::json_utils::json_to_string;

pub mod content_types;
pub mod bodies;
pub mod path_exp;
pub mod json_utils;
pub mod headers;
pub mod query_strings;
pub mod matchingrules;
pub mod generators;
pub mod expression_parser;
pub mod time_utils;
pub mod provider_states;
pub mod v4;
pub mod pact;
#[cfg(not(target_family = "wasm"))] pub mod file_utils;
#[cfg(not(target_family = "wasm"))] pub mod http_utils;

/// Version of the pact specification a pact file conforms to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[allow(non_camel_case_types)]
pub enum PactSpecification {
  /// Unknown or unsupported specification version
  Unknown,
  /// First version of the pact specification
  V1,
  /// Version 1.1 of the pact specification
  V1_1,
  /// Version two of the pact specification
  V2,
  /// Version three of the pact specification
  V3,
  /// Version four of the pact specification
  V4
}

impl Default for PactSpecification {
  fn default() -> Self {
    PactSpecification::Unknown
  }
}

impl PactSpecification {
  /// Semantic version string for the specification version
  pub fn version_str(&self) -> String {
    match self {
      PactSpecification::V1 => "1.0.0",
      PactSpecification::V1_1 => "1.1.0",
      PactSpecification::V2 => "2.0.0",
      PactSpecification::V3 => "3.0.0",
      PactSpecification::V4 => "4.0",
      _ => "unknown"
    }.into()
  }

  /// Parses a version string (as found in pact file metadata) into a specification version
  pub fn parse_version(input: &str) -> anyhow::Result<PactSpecification> {
    let parts: Vec<&str> = input.split('.').collect();
    match (parts.first().copied(), parts.get(1).copied()) {
      (Some("1"), Some("1")) => Ok(PactSpecification::V1_1),
      (Some("1"), _) => Ok(PactSpecification::V1),
      (Some("2"), _) => Ok(PactSpecification::V2),
      (Some("3"), _) => Ok(PactSpecification::V3),
      (Some("4"), _) => Ok(PactSpecification::V4),
      _ => Err(anyhow!("'{}' is not a valid pact specification version", input))
    }
  }
}

impl From<&str> for PactSpecification {
  fn from(s: &str) -> Self {
    match s.to_uppercase().as_str() {
      "V1" => PactSpecification::V1,
      "V1.1" => PactSpecification::V1_1,
      "V2" => PactSpecification::V2,
      "V3" => PactSpecification::V3,
      "V4" => PactSpecification::V4,
      _ => PactSpecification::Unknown
    }
  }
}

impl From<String> for PactSpecification {
  fn from(s: String) -> Self {
    PactSpecification::from(s.as_str())
  }
}

impl Display for PactSpecification {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      PactSpecification::V1 => write!(f, "V1"),
      PactSpecification::V1_1 => write!(f, "V1.1"),
      PactSpecification::V2 => write!(f, "V2"),
      PactSpecification::V3 => write!(f, "V3"),
      PactSpecification::V4 => write!(f, "V4"),
      _ => write!(f, "unknown")
    }
  }
}

/// Struct that defines the consumer of a pact
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Consumer {
  /// Each consumer should have a unique name to identify it.
  pub name: String
}

impl Consumer {
  /// Builds a `Consumer` from the JSON for the pact `consumer` attribute
  pub fn from_json(pact_json: &Value) -> Consumer {
    let name = pact_json.get("name")
      .map(json_to_string)
      .unwrap_or_else(|| "consumer".to_string());
    Consumer { name }
  }

  /// Converts this `Consumer` to a JSON `Value`
  pub fn to_json(&self) -> Value {
    json!({ "name": self.name })
  }
}

/// Struct that defines the provider of a pact
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Provider {
  /// Each provider should have a unique name to identify it.
  pub name: String
}

impl Provider {
  /// Builds a `Provider` from the JSON for the pact `provider` attribute
  pub fn from_json(pact_json: &Value) -> Provider {
    let name = pact_json.get("name")
      .map(json_to_string)
      .unwrap_or_else(|| "provider".to_string());
    Provider { name }
  }

  /// Converts this `Provider` to a JSON `Value`
  pub fn to_json(&self) -> Value {
    json!({ "name": self.name })
  }
}

/// HTTP status range or class used by the status-code matcher
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HttpStatus {
  /// Informational responses (100-199)
  Information,
  /// Successful responses (200-299)
  Success,
  /// Redirects (300-399)
  Redirect,
  /// Client errors (400-499)
  ClientError,
  /// Server errors (500-599)
  ServerError,
  /// Explicit list of status codes
  StatusCodes(Vec<u16>),
  /// Non-error response (< 400)
  NonError,
  /// Any error response (>= 400)
  Error
}

impl HttpStatus {
  /// Parse a JSON structure into a HttpStatus
  pub fn from_json(value: &Value) -> anyhow::Result<Self> {
    match value {
      Value::String(s) => HttpStatus::from_str(s),
      Value::Array(a) => {
        let status_codes = a.iter().map(|status| match status {
          Value::Number(n) => if n.is_u64() {
            Ok(n.as_u64().unwrap_or_default() as u16)
          } else {
            Err(anyhow!("'{}' is not a valid status code value", n))
          },
          Value::String(s) => s.parse::<u16>().map_err(|err| anyhow!("'{}' is not a valid status code value - {}", s, err)),
          _ => Err(anyhow!("'{}' is not a valid status code value", status))
        }).collect::<anyhow::Result<Vec<u16>>>()?;
        Ok(HttpStatus::StatusCodes(status_codes))
      },
      _ => Err(anyhow!("'{}' is not a valid JSON value for a HTTP Status", value))
    }
  }

  /// Generate a JSON structure for this status
  pub fn to_json(&self) -> Value {
    match self {
      HttpStatus::StatusCodes(codes) => json!(codes),
      _ => Value::String(self.to_string())
    }
  }

  /// If the given status code falls into this status class
  pub fn matches(&self, status: u16) -> bool {
    match self {
      HttpStatus::Information => (100..200).contains(&status),
      HttpStatus::Success => (200..300).contains(&status),
      HttpStatus::Redirect => (300..400).contains(&status),
      HttpStatus::ClientError => (400..500).contains(&status),
      HttpStatus::ServerError => (500..600).contains(&status),
      HttpStatus::StatusCodes(codes) => codes.contains(&status),
      HttpStatus::NonError => status < 400,
      HttpStatus::Error => status >= 400
    }
  }
}

impl FromStr for HttpStatus {
  type Err = anyhow::Error;

  fn from_str(s: &str) -> anyhow::Result<Self> {
    match s {
      "info" => Ok(HttpStatus::Information),
      "success" => Ok(HttpStatus::Success),
      "redirect" => Ok(HttpStatus::Redirect),
      "clientError" => Ok(HttpStatus::ClientError),
      "serverError" => Ok(HttpStatus::ServerError),
      "nonError" => Ok(HttpStatus::NonError),
      "error" => Ok(HttpStatus::Error),
      _ => Err(anyhow!("'{}' is not a valid HTTP Status class", s))
    }
  }
}

impl Display for HttpStatus {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      HttpStatus::Information => write!(f, "info"),
      HttpStatus::Success => write!(f, "success"),
      HttpStatus::Redirect => write!(f, "redirect"),
      HttpStatus::ClientError => write!(f, "clientError"),
      HttpStatus::ServerError => write!(f, "serverError"),
      HttpStatus::StatusCodes(codes) => write!(f, "{:?}", codes),
      HttpStatus::NonError => write!(f, "nonError"),
      HttpStatus::Error => write!(f, "error")
    }
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use serde_json::json;

  use super::*;

  #[test]
  fn pact_specification_from_string() {
    expect!(PactSpecification::from("V1")).to(be_equal_to(PactSpecification::V1));
    expect!(PactSpecification::from("V1.1")).to(be_equal_to(PactSpecification::V1_1));
    expect!(PactSpecification::from("v2")).to(be_equal_to(PactSpecification::V2));
    expect!(PactSpecification::from("V3")).to(be_equal_to(PactSpecification::V3));
    expect!(PactSpecification::from("V4")).to(be_equal_to(PactSpecification::V4));
    expect!(PactSpecification::from("bob")).to(be_equal_to(PactSpecification::Unknown));
  }

  #[test]
  fn pact_specification_parse_version() {
    expect!(PactSpecification::parse_version("1.0.0").unwrap()).to(be_equal_to(PactSpecification::V1));
    expect!(PactSpecification::parse_version("1.1.0").unwrap()).to(be_equal_to(PactSpecification::V1_1));
    expect!(PactSpecification::parse_version("2.0.0").unwrap()).to(be_equal_to(PactSpecification::V2));
    expect!(PactSpecification::parse_version("3.0.0").unwrap()).to(be_equal_to(PactSpecification::V3));
    expect!(PactSpecification::parse_version("4.0").unwrap()).to(be_equal_to(PactSpecification::V4));
    expect!(PactSpecification::parse_version("100")).to(be_err());
  }

  #[test]
  fn consumer_from_json_defaults_the_name() {
    expect!(Consumer::from_json(&json!({})).name).to(be_equal_to("consumer"));
    expect!(Consumer::from_json(&json!({"name": "Alice"})).name).to(be_equal_to("Alice"));
  }

  #[test]
  fn http_status_matches() {
    expect!(HttpStatus::Success.matches(201)).to(be_true());
    expect!(HttpStatus::Success.matches(400)).to(be_false());
    expect!(HttpStatus::ClientError.matches(404)).to(be_true());
    expect!(HttpStatus::NonError.matches(302)).to(be_true());
    expect!(HttpStatus::Error.matches(500)).to(be_true());
    expect!(HttpStatus::StatusCodes(vec![201, 204]).matches(204)).to(be_true());
    expect!(HttpStatus::StatusCodes(vec![201, 204]).matches(200)).to(be_false());
  }

  #[test]
  fn http_status_from_json() {
    expect!(HttpStatus::from_json(&json!("success")).unwrap()).to(be_equal_to(HttpStatus::Success));
    expect!(HttpStatus::from_json(&json!([200, 201])).unwrap()).to(be_equal_to(HttpStatus::StatusCodes(vec![200, 201])));
    expect!(HttpStatus::from_json(&json!({}))).to(be_err());
  }
}

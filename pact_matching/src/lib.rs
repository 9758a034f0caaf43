//! The `pact_matching` crate implements the matching engine: given an expected request,
//! response or message with attached matching rules and a concrete actual value, it
//! produces an ordered list of typed mismatches (an empty list means a match).

#![warn(missing_docs)]

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::from_utf8;

use lazy_static::lazy_static;
use serde_json::{json, Value};
use tracing::{debug, instrument, trace};

use pact_models::bodies::OptionalBody;
use pact_models::content_types::ContentType;
use pact_models::matchingrules::{Category, MatchingRule, MatchingRuleCategory, RuleList};
use pact_models::v4::async_message::AsynchronousMessage;
use pact_models::v4::http_parts::{HttpPart, HttpRequest, HttpResponse};
use pact_models::v4::message_parts::MessageContents;
use pact_models::v4::sync_message::SynchronousMessage;

use crate::matchers::{match_values, Matches};

pub mod matchers;
pub mod json;
pub mod xml;
pub mod headers;
pub mod query;
pub mod form_urlencoded;
pub mod binary_utils;
pub mod generators;

/// Enum that defines the different types of mismatches that can occur
#[derive(Debug, Clone, Eq)]
pub enum Mismatch {
  /// Request method mismatch
  MethodMismatch {
    /// Expected request method
    expected: String,
    /// Actual request method
    actual: String
  },
  /// Request path mismatch
  PathMismatch {
    /// Expected request path
    expected: String,
    /// Actual request path
    actual: String,
    /// Description of the mismatch
    mismatch: String
  },
  /// Response status mismatch
  StatusMismatch {
    /// Expected response status
    expected: u16,
    /// Actual response status
    actual: u16,
    /// Description of the mismatch
    mismatch: String
  },
  /// Request query mismatch
  QueryMismatch {
    /// Query parameter name
    parameter: String,
    /// Expected value
    expected: String,
    /// Actual value
    actual: String,
    /// Description of the mismatch
    mismatch: String
  },
  /// Header mismatch
  HeaderMismatch {
    /// Header key
    key: String,
    /// Expected value
    expected: String,
    /// Actual value
    actual: String,
    /// Description of the mismatch
    mismatch: String
  },
  /// Mismatch in the content type of the body
  BodyTypeMismatch {
    /// Expected content type of the body
    expected: String,
    /// Actual content type of the body
    actual: String,
    /// Description of the mismatch
    mismatch: String
  },
  /// Body element mismatch
  BodyMismatch {
    /// Path expression to where the mismatch occurred
    path: String,
    /// Expected value
    expected: Option<bytes::Bytes>,
    /// Actual value
    actual: Option<bytes::Bytes>,
    /// Description of the mismatch
    mismatch: String
  },
  /// Message metadata mismatch
  MetadataMismatch {
    /// Metadata key
    key: String,
    /// Expected value
    expected: String,
    /// Actual value
    actual: String,
    /// Description of the mismatch
    mismatch: String
  },
  /// An expected interaction was never received
  MissingRequest {
    /// Expected request method
    method: String,
    /// Expected request path
    path: String,
    /// Description of the interaction
    description: String
  },
  /// A request was received that matched no expected interaction
  UnexpectedRequest {
    /// Actual request method
    method: String,
    /// Actual request path
    path: String,
    /// Description of the mismatch
    mismatch: String
  }
}

impl Mismatch {
  /// Converts the mismatch to its JSON form
  pub fn to_json(&self) -> Value {
    match self {
      Mismatch::MethodMismatch { expected, actual } => json!({
        "type": "MethodMismatch",
        "expected": expected,
        "actual": actual
      }),
      Mismatch::PathMismatch { expected, actual, mismatch } => json!({
        "type": "PathMismatch",
        "expected": expected,
        "actual": actual,
        "mismatch": mismatch
      }),
      Mismatch::StatusMismatch { expected, actual, mismatch } => json!({
        "type": "StatusMismatch",
        "expected": expected,
        "actual": actual,
        "mismatch": mismatch
      }),
      Mismatch::QueryMismatch { parameter, expected, actual, mismatch } => json!({
        "type": "QueryMismatch",
        "parameter": parameter,
        "expected": expected,
        "actual": actual,
        "mismatch": mismatch
      }),
      Mismatch::HeaderMismatch { key, expected, actual, mismatch } => json!({
        "type": "HeaderMismatch",
        "key": key,
        "expected": expected,
        "actual": actual,
        "mismatch": mismatch
      }),
      Mismatch::BodyTypeMismatch { expected, actual, mismatch } => json!({
        "type": "BodyTypeMismatch",
        "expected": expected,
        "actual": actual,
        "mismatch": mismatch
      }),
      Mismatch::BodyMismatch { path, expected, actual, mismatch } => json!({
        "type": "BodyMismatch",
        "path": path,
        "expected": expected.as_ref()
          .map(|v| json!(from_utf8(v).unwrap_or("ERROR: could not convert from bytes")))
          .unwrap_or(Value::Null),
        "actual": actual.as_ref()
          .map(|v| json!(from_utf8(v).unwrap_or("ERROR: could not convert from bytes")))
          .unwrap_or(Value::Null),
        "mismatch": mismatch
      }),
      Mismatch::MetadataMismatch { key, expected, actual, mismatch } => json!({
        "type": "MetadataMismatch",
        "key": key,
        "expected": expected,
        "actual": actual,
        "mismatch": mismatch
      }),
      Mismatch::MissingRequest { method, path, description } => json!({
        "type": "MissingRequest",
        "method": method,
        "path": path,
        "description": description
      }),
      Mismatch::UnexpectedRequest { method, path, mismatch } => json!({
        "type": "UnexpectedRequest",
        "method": method,
        "path": path,
        "mismatch": mismatch
      })
    }
  }

  /// Returns the type of the mismatch as a string
  pub fn mismatch_type(&self) -> &'static str {
    match self {
      Mismatch::MethodMismatch { .. } => "MethodMismatch",
      Mismatch::PathMismatch { .. } => "PathMismatch",
      Mismatch::StatusMismatch { .. } => "StatusMismatch",
      Mismatch::QueryMismatch { .. } => "QueryMismatch",
      Mismatch::HeaderMismatch { .. } => "HeaderMismatch",
      Mismatch::BodyTypeMismatch { .. } => "BodyTypeMismatch",
      Mismatch::BodyMismatch { .. } => "BodyMismatch",
      Mismatch::MetadataMismatch { .. } => "MetadataMismatch",
      Mismatch::MissingRequest { .. } => "MissingRequest",
      Mismatch::UnexpectedRequest { .. } => "UnexpectedRequest"
    }
  }

  /// Returns a formatted description for this mismatch
  pub fn description(&self) -> String {
    match self {
      Mismatch::MethodMismatch { expected, actual } => format!("expected method {} but was {}", expected, actual),
      Mismatch::PathMismatch { mismatch, .. } => mismatch.clone(),
      Mismatch::StatusMismatch { mismatch, .. } => mismatch.clone(),
      Mismatch::QueryMismatch { mismatch, .. } => mismatch.clone(),
      Mismatch::HeaderMismatch { mismatch, .. } => mismatch.clone(),
      Mismatch::BodyTypeMismatch { expected, actual, .. } =>
        format!("expected a body of '{}' but the actual content type was '{}'", expected, actual),
      Mismatch::BodyMismatch { path, mismatch, .. } => format!("{} -> {}", path, mismatch),
      Mismatch::MetadataMismatch { mismatch, .. } => mismatch.clone(),
      Mismatch::MissingRequest { method, path, description } =>
        format!("Expected request '{}' ({} {}) was never received", description, method, path),
      Mismatch::UnexpectedRequest { method, path, mismatch } =>
        format!("Received unexpected request {} {} - {}", method, path, mismatch)
    }
  }
}

impl PartialEq for Mismatch {
  fn eq(&self, other: &Mismatch) -> bool {
    match (self, other) {
      (Mismatch::MethodMismatch { expected: e1, actual: a1 },
        Mismatch::MethodMismatch { expected: e2, actual: a2 }) => e1 == e2 && a1 == a2,
      (Mismatch::PathMismatch { expected: e1, actual: a1, .. },
        Mismatch::PathMismatch { expected: e2, actual: a2, .. }) => e1 == e2 && a1 == a2,
      (Mismatch::StatusMismatch { expected: e1, actual: a1, .. },
        Mismatch::StatusMismatch { expected: e2, actual: a2, .. }) => e1 == e2 && a1 == a2,
      (Mismatch::QueryMismatch { parameter: p1, expected: e1, actual: a1, .. },
        Mismatch::QueryMismatch { parameter: p2, expected: e2, actual: a2, .. }) =>
        p1 == p2 && e1 == e2 && a1 == a2,
      (Mismatch::HeaderMismatch { key: k1, expected: e1, actual: a1, .. },
        Mismatch::HeaderMismatch { key: k2, expected: e2, actual: a2, .. }) =>
        k1 == k2 && e1 == e2 && a1 == a2,
      (Mismatch::BodyTypeMismatch { expected: e1, actual: a1, .. },
        Mismatch::BodyTypeMismatch { expected: e2, actual: a2, .. }) => e1 == e2 && a1 == a2,
      (Mismatch::BodyMismatch { path: p1, expected: e1, actual: a1, .. },
        Mismatch::BodyMismatch { path: p2, expected: e2, actual: a2, .. }) =>
        p1 == p2 && e1 == e2 && a1 == a2,
      (Mismatch::MetadataMismatch { key: k1, expected: e1, actual: a1, .. },
        Mismatch::MetadataMismatch { key: k2, expected: e2, actual: a2, .. }) =>
        k1 == k2 && e1 == e2 && a1 == a2,
      (Mismatch::MissingRequest { method: m1, path: p1, .. },
        Mismatch::MissingRequest { method: m2, path: p2, .. }) => m1 == m2 && p1 == p2,
      (Mismatch::UnexpectedRequest { method: m1, path: p1, .. },
        Mismatch::UnexpectedRequest { method: m2, path: p2, .. }) => m1 == m2 && p1 == p2,
      (_, _) => false
    }
  }
}

impl Display for Mismatch {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.description())
  }
}

/// Enum that defines the configuration options for performing a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffConfig {
  /// Unexpected keys are allowed and ignored during matching
  AllowUnexpectedKeys,
  /// Unexpected keys cause a mismatch
  NoUnexpectedKeys
}

/// Context for a single matching category: the rules for the category plus the diff
/// configuration. Rule lookup resolves the most specific selector for a path.
#[derive(Debug, Clone)]
pub struct MatchingContext {
  /// Matching rules for this category
  pub matchers: MatchingRuleCategory,
  /// Configuration for the match
  pub config: DiffConfig
}

impl MatchingContext {
  /// Creates a new context with the given rules and configuration
  pub fn new(config: DiffConfig, matchers: &MatchingRuleCategory) -> MatchingContext {
    MatchingContext {
      matchers: matchers.clone(),
      config
    }
  }

  /// Creates a context with no rules
  pub fn empty(category: Category, config: DiffConfig) -> MatchingContext {
    MatchingContext {
      matchers: MatchingRuleCategory {
        name: category,
        .. MatchingRuleCategory::default()
      },
      config
    }
  }

  /// If there is a matcher defined at the path
  pub fn matcher_is_defined(&self, path: &[&str]) -> bool {
    self.matchers.matcher_is_defined(path)
  }

  /// Selects the best matcher (most specific selector) for the path
  pub fn select_best_matcher(&self, path: &[&str]) -> RuleList {
    self.matchers.select_best_matcher(path)
  }

  /// If a type matcher (with or without length bounds) is defined at the path
  pub fn type_matcher_defined(&self, path: &[&str]) -> bool {
    let rules = self.select_best_matcher(path);
    !rules.is_empty() && rules.type_matcher_defined()
  }

  /// If a values matcher is defined at the path
  pub fn values_matcher_defined(&self, path: &[&str]) -> bool {
    let rules = self.select_best_matcher(path);
    !rules.is_empty() && !rules.cascaded && rules.values_matcher_defined()
  }

  /// If a wildcard selector is defined for the children of the path
  pub fn wildcard_matcher_is_defined(&self, path: &[&str]) -> bool {
    self.matchers.wildcard_matcher_is_defined(path)
  }
}

lazy_static! {
  static ref BODY_MATCHERS: [
    (fn(content_type: &ContentType) -> bool,
     fn(expected: &OptionalBody, actual: &OptionalBody, context: &MatchingContext) -> Vec<Mismatch>); 5]
    = [
      (|content_type| content_type.is_json(), json::match_json),
      (|content_type| content_type.is_xml(), xml::match_xml),
      (|content_type| content_type.is_form_urlencoded(), form_urlencoded::match_form_urlencoded),
      (|content_type| content_type.is_multipart(), binary_utils::match_mime_multipart),
      (|content_type| content_type.is_binary(), binary_utils::match_octet_stream)
  ];
}

/// Matches the actual request method to the expected one
pub fn match_method(expected: &str, actual: &str) -> Vec<Mismatch> {
  if expected.to_uppercase() != actual.to_uppercase() {
    vec![ Mismatch::MethodMismatch {
      expected: expected.to_string(),
      actual: actual.to_string()
    } ]
  } else {
    vec![]
  }
}

/// Matches the actual request path to the expected one. The default rule for paths is
/// exact equality.
pub fn match_path(expected: &str, actual: &str, context: &MatchingContext) -> Vec<Mismatch> {
  let path = vec![];
  let result = if context.matcher_is_defined(&path) {
    match_values(&path, &context.select_best_matcher(&path), expected, actual)
  } else {
    expected.matches_with(actual, &MatchingRule::Equality, false)
      .map_err(|err| vec![ err.to_string() ])
  };
  result.err().unwrap_or_default().iter().map(|message| Mismatch::PathMismatch {
    expected: expected.to_string(),
    actual: actual.to_string(),
    mismatch: message.clone()
  }).collect()
}

/// Matches the actual response status to the expected one. The default rule for the
/// status is equality.
pub fn match_status(expected: u16, actual: u16, context: &MatchingContext) -> Vec<Mismatch> {
  let path = vec![];
  let result = if context.matcher_is_defined(&path) {
    match_values(&path, &context.select_best_matcher(&path), &expected, &actual)
  } else if expected != actual {
    Err(vec![ format!("expected status {} but was {}", expected, actual) ])
  } else {
    Ok(())
  };
  result.err().unwrap_or_default().iter().map(|message| Mismatch::StatusMismatch {
    expected,
    actual,
    mismatch: message.clone()
  }).collect()
}

/// Matches the bodies of the expected and actual parts, dispatching on the content
/// type. A body with a different content type than expected is a `BodyTypeMismatch`.
pub fn match_body(expected: &dyn HttpPart, actual: &dyn HttpPart, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_content_type = expected.content_type().unwrap_or_default();
  let actual_content_type = actual.content_type().unwrap_or_default();
  debug!("match_body: expected content type = '{}', actual content type = '{}'",
    expected_content_type, actual_content_type);

  if expected_content_type.is_unknown() || actual_content_type.is_unknown() ||
    expected_content_type.is_equivalent_to(&actual_content_type.base_type()) ||
    expected_content_type.is_equivalent_to(&actual_content_type) {
    match_body_content(&expected_content_type, expected.body(), actual.body(), context)
  } else if expected.body().is_present() {
    vec![ Mismatch::BodyTypeMismatch {
      expected: expected_content_type.to_string(),
      actual: actual_content_type.to_string(),
      mismatch: format!("Expected a body of '{}' but the actual content type was '{}'",
        expected_content_type, actual_content_type)
    } ]
  } else {
    vec![]
  }
}

/// Matches the body contents using the body matcher registered for the content type.
/// Unrecognised content types fall back to plain text matching.
pub fn match_body_content(
  content_type: &ContentType,
  expected: &OptionalBody,
  actual: &OptionalBody,
  context: &MatchingContext
) -> Vec<Mismatch> {
  match (expected, actual) {
    (OptionalBody::Missing, _) => vec![],
    (OptionalBody::Null | OptionalBody::Empty, OptionalBody::Present(b, _)) => vec![
      Mismatch::BodyMismatch {
        path: "$".to_string(),
        expected: None,
        actual: Some(b.clone()),
        mismatch: format!("Expected an empty body but received '{}'", actual.display_string())
      }
    ],
    (OptionalBody::Present(b, _), OptionalBody::Missing | OptionalBody::Empty | OptionalBody::Null) => vec![
      Mismatch::BodyMismatch {
        path: "$".to_string(),
        expected: Some(b.clone()),
        actual: None,
        mismatch: format!("Expected body '{}' but was missing", expected.display_string())
      }
    ],
    (OptionalBody::Present(_, _), OptionalBody::Present(_, _)) => {
      match BODY_MATCHERS.iter().find(|(predicate, _)| predicate(content_type)) {
        Some((_, matcher)) => matcher(expected, actual, context),
        None => match_text(expected, actual, context)
      }
    },
    (_, _) => vec![]
  }
}

/// Matches the actual text body to the expected one
pub fn match_text(expected: &OptionalBody, actual: &OptionalBody, context: &MatchingContext) -> Vec<Mismatch> {
  let path = vec!["$"];
  let expected_text = expected.value_as_string().unwrap_or_default();
  let actual_text = actual.value_as_string().unwrap_or_default();
  let result = if context.matcher_is_defined(&path) {
    match_values(&path, &context.select_best_matcher(&path), expected_text.as_str(), actual_text.as_str())
  } else if expected_text != actual_text {
    Err(vec![ format!("Expected body '{}' to match '{}'", actual_text, expected_text) ])
  } else {
    Ok(())
  };
  result.err().unwrap_or_default().iter().map(|message| Mismatch::BodyMismatch {
    path: "$".to_string(),
    expected: expected.value(),
    actual: actual.value(),
    mismatch: message.clone()
  }).collect()
}

fn rules_for(part_rules: &pact_models::matchingrules::MatchingRules, category: &str) -> MatchingRuleCategory {
  part_rules.rules_for_category(category)
    .unwrap_or_else(|| MatchingRuleCategory::empty(category))
}

/// Matches the expected request against the actual one. Used by the mock server in
/// request-matching mode: unexpected keys are not allowed in query parameters but are
/// allowed in bodies only when a matcher permits them.
#[instrument(level = "debug")]
pub fn match_request(expected: &HttpRequest, actual: &HttpRequest) -> Vec<Mismatch> {
  debug!("comparing to expected {}", expected);

  let mut mismatches = vec![];
  mismatches.extend(match_method(&expected.method, &actual.method));
  mismatches.extend(match_path(&expected.path, &actual.path,
    &MatchingContext::new(DiffConfig::NoUnexpectedKeys, &rules_for(&expected.matching_rules, "path"))));
  mismatches.extend(query::match_query(&expected.query, &actual.query,
    &MatchingContext::new(DiffConfig::NoUnexpectedKeys, &rules_for(&expected.matching_rules, "query"))));
  mismatches.extend(headers::match_headers(&expected.headers, &actual.headers,
    &MatchingContext::new(DiffConfig::AllowUnexpectedKeys, &rules_for(&expected.matching_rules, "header"))));
  mismatches.extend(match_body(expected, actual,
    &MatchingContext::new(DiffConfig::NoUnexpectedKeys, &rules_for(&expected.matching_rules, "body"))));

  trace!("match_request: mismatches = {:?}", mismatches);
  mismatches
}

/// Matches the expected response against the actual one. Used by the verifier:
/// unexpected keys in the actual response are allowed.
#[instrument(level = "debug")]
pub fn match_response(expected: &HttpResponse, actual: &HttpResponse) -> Vec<Mismatch> {
  debug!("comparing to expected {}", expected);

  let mut mismatches = vec![];
  mismatches.extend(match_status(expected.status, actual.status,
    &MatchingContext::new(DiffConfig::AllowUnexpectedKeys, &rules_for(&expected.matching_rules, "status"))));
  mismatches.extend(headers::match_headers(&expected.headers, &actual.headers,
    &MatchingContext::new(DiffConfig::AllowUnexpectedKeys, &rules_for(&expected.matching_rules, "header"))));
  mismatches.extend(match_body(expected, actual,
    &MatchingContext::new(DiffConfig::AllowUnexpectedKeys, &rules_for(&expected.matching_rules, "body"))));

  trace!("match_response: mismatches = {:?}", mismatches);
  mismatches
}

/// Part wrapper used to match message contents with the body matchers
#[derive(Debug, Clone)]
struct MessagePart {
  contents: MessageContents,
  headers: Option<HashMap<String, Vec<String>>>
}

impl MessagePart {
  fn new(contents: &MessageContents) -> MessagePart {
    MessagePart {
      contents: contents.clone(),
      headers: None
    }
  }
}

impl HttpPart for MessagePart {
  fn headers(&self) -> &Option<HashMap<String, Vec<String>>> {
    &self.headers
  }

  fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>> {
    self.headers.get_or_insert_with(HashMap::new)
  }

  fn body(&self) -> &OptionalBody {
    &self.contents.contents
  }

  fn matching_rules(&self) -> &pact_models::matchingrules::MatchingRules {
    &self.contents.matching_rules
  }

  fn generators(&self) -> &pact_models::generators::Generators {
    &self.contents.generators
  }

  fn content_type(&self) -> Option<ContentType> {
    self.contents.content_type()
  }
}

/// Matches the expected message contents and metadata against the actual contents
pub fn match_message_contents(expected: &MessageContents, actual: &MessageContents) -> Vec<Mismatch> {
  let mut mismatches = vec![];

  let expected_part = MessagePart::new(expected);
  let actual_part = MessagePart::new(actual);
  mismatches.extend(match_body(&expected_part, &actual_part,
    &MatchingContext::new(DiffConfig::AllowUnexpectedKeys,
      &rules_for(&expected.matching_rules, "body"))));
  mismatches.extend(match_metadata(&expected.metadata, &actual.metadata,
    &MatchingContext::new(DiffConfig::AllowUnexpectedKeys,
      &rules_for(&expected.matching_rules, "metadata"))));

  mismatches
}

/// Matches the message metadata maps. The content-type key is compared by content
/// type equivalence, everything else by equality unless a rule applies.
pub fn match_metadata(
  expected: &HashMap<String, Value>,
  actual: &HashMap<String, Value>,
  context: &MatchingContext
) -> Vec<Mismatch> {
  let mut mismatches = vec![];
  for (key, expected_value) in expected {
    let path = vec!["$", key.as_str()];
    match actual.iter().find(|(k, _)| k.to_lowercase() == key.to_lowercase()) {
      Some((_, actual_value)) => {
        let result = if context.matcher_is_defined(&path) {
          match_values(&path, &context.select_best_matcher(&path), expected_value, actual_value)
        } else if key.to_lowercase() == "contenttype" || key.to_lowercase() == "content-type" {
          let expected_ct = ContentType::from(pact_models::json_utils::json_to_string(expected_value));
          let actual_ct = ContentType::from(pact_models::json_utils::json_to_string(actual_value));
          if expected_ct.is_equivalent_to(&actual_ct) {
            Ok(())
          } else {
            Err(vec![ format!("Expected message metadata key '{}' to have value '{}' but was '{}'",
              key, expected_ct, actual_ct) ])
          }
        } else {
          expected_value.matches_with(actual_value, &MatchingRule::Equality, false)
            .map_err(|err| vec![ err.to_string() ])
        };
        for message in result.err().unwrap_or_default() {
          mismatches.push(Mismatch::MetadataMismatch {
            key: key.clone(),
            expected: expected_value.to_string(),
            actual: actual_value.to_string(),
            mismatch: message
          });
        }
      },
      None => mismatches.push(Mismatch::MetadataMismatch {
        key: key.clone(),
        expected: expected_value.to_string(),
        actual: String::default(),
        mismatch: format!("Expected message metadata key '{}' but was missing", key)
      })
    }
  }
  mismatches
}

/// Matches an asynchronous message against the actual contents produced by the
/// provider
pub fn match_message(expected: &AsynchronousMessage, actual: &MessageContents) -> Vec<Mismatch> {
  match_message_contents(&expected.contents, actual)
}

/// Matches the response part of a synchronous message against the actual contents
pub fn match_sync_message(expected: &SynchronousMessage, actual: &MessageContents) -> Vec<Mismatch> {
  expected.response.iter()
    .map(|response| match_message_contents(response, actual))
    .min_by_key(|mismatches| mismatches.len())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests;

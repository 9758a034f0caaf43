//! V4 specification models - HTTP parts for SynchronousHttp interactions

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use itertools::Itertools;
use maplit::hashmap;
use serde_json::{json, Value};
use tracing::warn;

use crate::bodies::OptionalBody;
use crate::content_types::ContentType;
use crate::generators::{Generators, generators_from_json, generators_to_json};
use crate::json_utils::{headers_from_json, headers_to_json, json_to_string};
use crate::matchingrules::{matchers_from_json, matchers_to_json, MatchingRules};
use crate::PactSpecification;
use crate::query_strings::{query_from_json, query_to_json};
use crate::v4::calc_content_type;

/// Trait for the HTTP parts of an interaction (request and response) that the matching
/// and generation engines work against
pub trait HttpPart {
  /// Headers of the part
  fn headers(&self) -> &Option<HashMap<String, Vec<String>>>;

  /// Mutable headers of the part, creating the map if missing
  fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>>;

  /// Body of the part
  fn body(&self) -> &OptionalBody;

  /// Matching rules of the part
  fn matching_rules(&self) -> &MatchingRules;

  /// Generators of the part
  fn generators(&self) -> &Generators;

  /// Determines the content type of the part
  fn content_type(&self) -> Option<ContentType> {
    calc_content_type(self.body(), self.headers())
  }

  /// Looks up a header value in a case-insensitive manner
  fn lookup_header_value(&self, header_name: &str) -> Option<String> {
    self.headers().as_ref().and_then(|headers| {
      headers.iter()
        .find(|(k, _)| k.to_lowercase() == header_name.to_lowercase())
        .and_then(|(_, v)| v.first().cloned())
    })
  }

  /// If the part has a header with the given name and value
  fn has_header(&self, header_name: &str, header_value: &str) -> bool {
    self.lookup_header_value(header_name)
      .map(|value| value.starts_with(header_value))
      .unwrap_or(false)
  }

  /// Adds a header. If the header already exists, the value is appended.
  fn add_header(&mut self, key: &str, values: Vec<&str>) {
    let headers = self.headers_mut();
    let entry = headers.entry(key.to_string()).or_default();
    for value in values {
      entry.push(value.to_string());
    }
  }
}

/// Struct that defines the expected HTTP request
#[derive(Debug, Clone, Eq)]
pub struct HttpRequest {
  /// Request method (uppercase token)
  pub method: String,
  /// Request path
  pub path: String,
  /// Request query string: parameter name to ordered values
  pub query: Option<HashMap<String, Vec<String>>>,
  /// Request headers
  pub headers: Option<HashMap<String, Vec<String>>>,
  /// Request body
  pub body: OptionalBody,
  /// Request matching rules
  pub matching_rules: MatchingRules,
  /// Request generators
  pub generators: Generators
}

impl HttpRequest {
  /// Builds a `HttpRequest` from the V4 JSON form
  pub fn from_json(request_json: &Value) -> anyhow::Result<Self> {
    let method = match request_json.get("method") {
      Some(v) => json_to_string(v).to_uppercase(),
      None => "GET".to_string()
    };
    let path = match request_json.get("path") {
      Some(v) => json_to_string(v),
      None => "/".to_string()
    };
    let query = request_json.get("query")
      .and_then(|q| query_from_json(q, &PactSpecification::V4));
    let headers = headers_from_json(request_json);
    Ok(HttpRequest {
      method,
      path,
      query,
      headers: headers.clone(),
      body: body_from_json(request_json, "body", &headers),
      matching_rules: matchers_from_json(request_json, &Some("requestMatchingRules".to_string()))?,
      generators: generators_from_json(request_json)?
    })
  }

  /// Converts this `HttpRequest` to its V4 JSON form
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    let mut json = json!({
      "method": Value::String(self.method.to_uppercase()),
      "path": Value::String(self.path.clone())
    });
    {
      let map = json.as_object_mut().unwrap();

      if let Some(query) = &self.query {
        map.insert("query".to_string(), query_to_json(query, spec_version));
      }

      if let Some(headers) = &self.headers {
        map.insert("headers".to_string(), headers_to_json(headers));
      }

      if self.body.is_present() {
        let body_json = if *spec_version >= PactSpecification::V4 {
          self.body.to_v4_json()
        } else {
          v3_body_json(&self.body)
        };
        map.insert("body".to_string(), body_json);
      }

      if self.matching_rules.is_not_empty() {
        map.insert("matchingRules".to_string(), matchers_to_json(&self.matching_rules, spec_version));
      }

      if self.generators.is_not_empty() {
        map.insert("generators".to_string(), generators_to_json(&self.generators, spec_version));
      }
    }
    json
  }

  /// If this request is a CORS pre-flight request
  pub fn is_options_request(&self) -> bool {
    self.method.to_uppercase() == "OPTIONS"
  }
}

impl HttpPart for HttpRequest {
  fn headers(&self) -> &Option<HashMap<String, Vec<String>>> {
    &self.headers
  }

  fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>> {
    if self.headers.is_none() {
      self.headers = Some(hashmap!{});
    }
    self.headers.as_mut().unwrap()
  }

  fn body(&self) -> &OptionalBody {
    &self.body
  }

  fn matching_rules(&self) -> &MatchingRules {
    &self.matching_rules
  }

  fn generators(&self) -> &Generators {
    &self.generators
  }
}

impl Default for HttpRequest {
  fn default() -> Self {
    HttpRequest {
      method: "GET".to_string(),
      path: "/".to_string(),
      query: None,
      headers: None,
      body: OptionalBody::Missing,
      matching_rules: MatchingRules::default(),
      generators: Generators::default()
    }
  }
}

impl Display for HttpRequest {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "HTTP Request ( method: {}, path: {}, query: {:?}, headers: {:?}, body: {} )",
      self.method, self.path, self.query, self.headers, self.body)
  }
}

impl PartialEq for HttpRequest {
  fn eq(&self, other: &Self) -> bool {
    self.method == other.method && self.path == other.path && self.query == other.query &&
      self.headers == other.headers && self.body == other.body &&
      self.matching_rules == other.matching_rules && self.generators == other.generators
  }
}

impl Hash for HttpRequest {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.method.hash(state);
    self.path.hash(state);
    hash_multimap(&self.query, state);
    hash_multimap(&self.headers, state);
    self.body.hash(state);
    self.matching_rules.hash(state);
    self.generators.hash(state);
  }
}

fn hash_multimap<H: Hasher>(map: &Option<HashMap<String, Vec<String>>>, state: &mut H) {
  if let Some(map) = map {
    for (k, v) in map.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
      k.hash(state);
      v.hash(state);
    }
  }
}

/// Struct that defines the expected HTTP response
#[derive(Debug, Clone, Eq)]
pub struct HttpResponse {
  /// Response status
  pub status: u16,
  /// Response headers
  pub headers: Option<HashMap<String, Vec<String>>>,
  /// Response body
  pub body: OptionalBody,
  /// Response matching rules
  pub matching_rules: MatchingRules,
  /// Response generators
  pub generators: Generators
}

impl HttpResponse {
  /// Builds a `HttpResponse` from the V4 JSON form
  pub fn from_json(response_json: &Value) -> anyhow::Result<Self> {
    let status = match response_json.get("status") {
      Some(v) => json_to_string(v).parse::<u16>().unwrap_or(200),
      None => 200
    };
    let headers = headers_from_json(response_json);
    Ok(HttpResponse {
      status,
      headers: headers.clone(),
      body: body_from_json(response_json, "body", &headers),
      matching_rules: matchers_from_json(response_json, &Some("responseMatchingRules".to_string()))?,
      generators: generators_from_json(response_json)?
    })
  }

  /// Converts this `HttpResponse` to its V4 JSON form
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    let mut json = json!({
      "status": json!(self.status)
    });
    {
      let map = json.as_object_mut().unwrap();

      if let Some(headers) = &self.headers {
        map.insert("headers".to_string(), headers_to_json(headers));
      }

      if self.body.is_present() {
        let body_json = if *spec_version >= PactSpecification::V4 {
          self.body.to_v4_json()
        } else {
          v3_body_json(&self.body)
        };
        map.insert("body".to_string(), body_json);
      }

      if self.matching_rules.is_not_empty() {
        map.insert("matchingRules".to_string(), matchers_to_json(&self.matching_rules, spec_version));
      }

      if self.generators.is_not_empty() {
        map.insert("generators".to_string(), generators_to_json(&self.generators, spec_version));
      }
    }
    json
  }
}

impl HttpPart for HttpResponse {
  fn headers(&self) -> &Option<HashMap<String, Vec<String>>> {
    &self.headers
  }

  fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>> {
    if self.headers.is_none() {
      self.headers = Some(hashmap!{});
    }
    self.headers.as_mut().unwrap()
  }

  fn body(&self) -> &OptionalBody {
    &self.body
  }

  fn matching_rules(&self) -> &MatchingRules {
    &self.matching_rules
  }

  fn generators(&self) -> &Generators {
    &self.generators
  }
}

impl Default for HttpResponse {
  fn default() -> Self {
    HttpResponse {
      status: 200,
      headers: None,
      body: OptionalBody::Missing,
      matching_rules: MatchingRules::default(),
      generators: Generators::default()
    }
  }
}

impl Display for HttpResponse {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "HTTP Response ( status: {}, headers: {:?}, body: {} )",
      self.status, self.headers, self.body)
  }
}

impl PartialEq for HttpResponse {
  fn eq(&self, other: &Self) -> bool {
    self.status == other.status && self.headers == other.headers && self.body == other.body &&
      self.matching_rules == other.matching_rules && self.generators == other.generators
  }
}

impl Hash for HttpResponse {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.status.hash(state);
    hash_multimap(&self.headers, state);
    self.body.hash(state);
    self.matching_rules.hash(state);
    self.generators.hash(state);
  }
}

/// Parses a body from an interaction JSON. Handles both the V4 object form
/// (`{"content": .., "contentType": .., "encoded": ..}`) and the older raw forms.
pub fn body_from_json(json: &Value, attr_name: &str, headers: &Option<HashMap<String, Vec<String>>>) -> OptionalBody {
  let content_type_from_headers = headers.as_ref().and_then(|headers| {
    headers.iter()
      .find(|(k, _)| k.to_lowercase() == "content-type")
      .and_then(|(_, v)| v.first())
      .and_then(|v| ContentType::parse(v.as_str()).ok())
  });

  match json.get(attr_name) {
    Some(body_json) => match body_json {
      Value::Object(attrs) if attrs.contains_key("content") => {
        let body = OptionalBody::from_v4_json(body_json);
        body.with_content_type_if_not_set(content_type_from_headers)
      },
      Value::Null => OptionalBody::Null,
      // older pact files store the body directly
      Value::String(s) => if s.is_empty() {
        OptionalBody::Empty
      } else {
        OptionalBody::Present(Bytes::from(s.clone()), content_type_from_headers.clone())
          .with_content_type_if_not_set(
            crate::content_types::detect_content_type_from_string(s))
      },
      _ => OptionalBody::Present(Bytes::from(body_json.to_string()),
        content_type_from_headers.or_else(|| Some(crate::content_types::JSON.clone())))
    },
    None => OptionalBody::Missing
  }
}

/// The V3 JSON form of a body: JSON bodies are inlined, everything else is written as
/// a string.
fn v3_body_json(body: &OptionalBody) -> Value {
  match body {
    OptionalBody::Present(bytes, content_type) => {
      if content_type.as_ref().map(|ct| ct.is_json()).unwrap_or(false) {
        match serde_json::from_slice(bytes) {
          Ok(json_body) => json_body,
          Err(err) => {
            warn!("Failed to parse json body: {}", err);
            Value::String(String::from_utf8_lossy(bytes).to_string())
          }
        }
      } else {
        Value::String(String::from_utf8_lossy(bytes).to_string())
      }
    },
    OptionalBody::Empty => Value::String(String::default()),
    _ => Value::Null
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use super::*;

  #[test]
  fn request_from_json_defaults() {
    let request = HttpRequest::from_json(&json!({})).unwrap();
    expect!(request.method.as_str()).to(be_equal_to("GET"));
    expect!(request.path.as_str()).to(be_equal_to("/"));
    expect!(request.query.clone()).to(be_none());
    expect!(request.body.is_present()).to(be_false());
  }

  #[test]
  fn request_from_json_upper_cases_the_method() {
    let request = HttpRequest::from_json(&json!({"method": "post"})).unwrap();
    expect!(request.method.as_str()).to(be_equal_to("POST"));
  }

  #[test]
  fn request_json_round_trip() {
    let json = json!({
      "method": "PUT",
      "path": "/users/123",
      "query": { "page": ["1"] },
      "headers": { "Content-Type": "application/json" },
      "body": { "content": { "name": "Alice" }, "contentType": "application/json", "encoded": false },
      "matchingRules": {
        "body": { "$.name": { "combine": "AND", "matchers": [ { "match": "type" } ] } }
      }
    });
    let request = HttpRequest::from_json(&json).unwrap();
    expect!(request.body.value_as_string().unwrap()).to(be_equal_to("{\"name\":\"Alice\"}".to_string()));
    expect!(request.matching_rules.matcher_is_defined("body", &["$", "name"])).to(be_true());

    let generated = request.to_json(&PactSpecification::V4);
    let reparsed = HttpRequest::from_json(&generated).unwrap();
    expect!(reparsed).to(be_equal_to(request));
  }

  #[test]
  fn body_from_json_falls_back_to_header_content_type() {
    let headers = Some(hashmap!{ "content-type".to_string() => vec!["application/xml".to_string()] });
    let body = body_from_json(&json!({"body": {"content": "<a/>"}}), "body", &headers);
    expect!(body.content_type().unwrap().is_xml()).to(be_true());
  }

  #[test]
  fn response_from_json_defaults_the_status() {
    let response = HttpResponse::from_json(&json!({})).unwrap();
    expect!(response.status).to(be_equal_to(200));
  }

  #[test]
  fn lookup_header_value_is_case_insensitive() {
    let response = HttpResponse {
      headers: Some(hashmap!{ "Content-Type".to_string() => vec!["application/json".to_string()] }),
      .. HttpResponse::default()
    };
    expect!(response.lookup_header_value("content-type")).to(be_some().value("application/json"));
  }
}

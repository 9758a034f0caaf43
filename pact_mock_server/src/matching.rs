//! The matching module defines how an incoming request is matched against the list of
//! expected interactions.

use itertools::Itertools;
use serde_json::json;

use pact_matching::Mismatch;
use pact_models::v4::http_parts::HttpRequest;
use pact_models::v4::synch_http::SynchronousHttp;

/// The result of matching an incoming request against the expected interactions
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
  /// The request was matched to an expected interaction
  RequestMatch(SynchronousHttp, HttpRequest),
  /// The request matched an interaction's method and path, but there were mismatches
  RequestMismatch(SynchronousHttp, HttpRequest, Vec<Mismatch>),
  /// The request matched no expected interaction
  RequestNotFound(HttpRequest),
  /// An expected interaction was never received
  MissingRequest(SynchronousHttp)
}

impl MatchResult {
  /// Returns the match key for this result
  pub fn match_key(&self) -> &'static str {
    match self {
      MatchResult::RequestMatch(_, _) => "Request-Matched",
      MatchResult::RequestMismatch(_, _, _) => "Request-Mismatch",
      MatchResult::RequestNotFound(_) => "Unexpected-Request",
      MatchResult::MissingRequest(_) => "Missing-Request"
    }
  }

  /// If this match result is a successful `RequestMatch`
  pub fn matched(&self) -> bool {
    matches!(self, MatchResult::RequestMatch(_, _))
  }

  /// Converts this match result to its JSON form
  pub fn to_json(&self) -> serde_json::Value {
    match self {
      MatchResult::RequestMatch(_, _) => json!({ "type": "request-match" }),
      MatchResult::RequestMismatch(interaction, _, mismatches) => json!({
        "type": "request-mismatch",
        "method": interaction.request.method,
        "path": interaction.request.path,
        "mismatches": mismatches.iter().map(Mismatch::to_json).collect::<Vec<serde_json::Value>>()
      }),
      MatchResult::RequestNotFound(request) => json!({
        "type": "request-not-found",
        "method": request.method,
        "path": request.path
      }),
      MatchResult::MissingRequest(interaction) => json!({
        "type": "missing-request",
        "method": interaction.request.method,
        "path": interaction.request.path,
        "request": interaction.request.to_json(&pact_models::PactSpecification::V4)
      })
    }
  }
}

fn method_or_path_mismatch(mismatches: &[Mismatch]) -> bool {
  mismatches.iter()
    .map(Mismatch::mismatch_type)
    .any(|mismatch_type| mismatch_type == "MethodMismatch" || mismatch_type == "PathMismatch")
}

/// Matches a request against a list of expected interactions, returning the best
/// candidate result. Candidates are ranked by the number of distinct mismatch types,
/// so an interaction that only differs in the body out-ranks one with a different
/// method. Requests where no interaction matches the method and path are not found.
pub fn match_request(request: &HttpRequest, interactions: &[SynchronousHttp]) -> MatchResult {
  let match_results = interactions.iter()
    .map(|interaction| (interaction.clone(),
      pact_matching::match_request(&interaction.request, request)))
    .sorted_by_key(|(_, mismatches)| {
      mismatches.iter().map(Mismatch::mismatch_type).unique().count()
    })
    .collect_vec();
  match match_results.first() {
    Some((interaction, mismatches)) => {
      if mismatches.is_empty() {
        MatchResult::RequestMatch(interaction.clone(), request.clone())
      } else if method_or_path_mismatch(mismatches) {
        MatchResult::RequestNotFound(request.clone())
      } else {
        MatchResult::RequestMismatch(interaction.clone(), request.clone(), mismatches.clone())
      }
    },
    None => MatchResult::RequestNotFound(request.clone())
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use pact_models::bodies::OptionalBody;

  use super::*;

  fn interaction(description: &str, method: &str, path: &str) -> SynchronousHttp {
    SynchronousHttp {
      description: description.to_string(),
      request: HttpRequest {
        method: method.to_string(),
        path: path.to_string(),
        .. HttpRequest::default()
      },
      .. SynchronousHttp::default()
    }
  }

  #[test]
  fn returns_a_match_for_a_matching_request() {
    let interactions = vec![ interaction("get users", "GET", "/users") ];
    let request = HttpRequest { path: "/users".to_string(), .. HttpRequest::default() };
    expect!(match_request(&request, &interactions).matched()).to(be_true());
  }

  #[test]
  fn returns_not_found_when_no_interaction_matches_the_path() {
    let interactions = vec![ interaction("get users", "GET", "/users") ];
    let request = HttpRequest { path: "/other".to_string(), .. HttpRequest::default() };
    let result = match_request(&request, &interactions);
    expect!(result.match_key()).to(be_equal_to("Unexpected-Request"));
  }

  #[test]
  fn returns_a_mismatch_when_the_body_does_not_match() {
    let mut expected = interaction("create user", "POST", "/users");
    expected.request.body = OptionalBody::from(&json!({"name": "Alice"}));
    let request = HttpRequest {
      method: "POST".to_string(),
      path: "/users".to_string(),
      body: OptionalBody::from(&json!({"name": "Bob"})),
      .. HttpRequest::default()
    };
    let result = match_request(&request, &[expected]);
    expect!(result.match_key()).to(be_equal_to("Request-Mismatch"));
  }

  #[test]
  fn selects_the_interaction_with_the_fewest_mismatch_types() {
    let mut with_body = interaction("with body", "POST", "/users");
    with_body.request.body = OptionalBody::from(&json!({"name": "Alice"}));
    let other_path = interaction("other path", "POST", "/admin");

    let request = HttpRequest {
      method: "POST".to_string(),
      path: "/users".to_string(),
      body: OptionalBody::from(&json!({"name": "Bob"})),
      headers: Some(hashmap!{ "Content-Type".to_string() => vec!["application/json".to_string()] }),
      .. HttpRequest::default()
    };
    let result = match_request(&request, &[other_path, with_body]);
    match result {
      MatchResult::RequestMismatch(interaction, _, _) =>
        expect!(interaction.description.as_str()).to(be_equal_to("with body")),
      other => panic!("Expected a RequestMismatch, got {:?}", other)
    };
  }
}

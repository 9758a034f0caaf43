use expectest::prelude::*;
use maplit::hashmap;
use serde_json::json;

use pact_models::bodies::OptionalBody;
use pact_models::matchingrules;
use pact_models::matchingrules::MatchingRule;
use pact_models::v4::http_parts::{HttpRequest, HttpResponse};
use pact_models::v4::message_parts::MessageContents;

use super::*;

#[test]
fn match_request_returns_nothing_if_the_requests_match() {
  let request = HttpRequest {
    method: "GET".to_string(),
    path: "/users/123".to_string(),
    .. HttpRequest::default()
  };
  expect!(match_request(&request, &request.clone()).is_empty()).to(be_true());
}

#[test]
fn match_request_with_different_methods() {
  let expected = HttpRequest { method: "GET".to_string(), .. HttpRequest::default() };
  let actual = HttpRequest { method: "POST".to_string(), .. HttpRequest::default() };
  let mismatches = match_request(&expected, &actual);
  expect!(mismatches.len()).to(be_equal_to(1));
  expect!(mismatches[0].mismatch_type()).to(be_equal_to("MethodMismatch"));
}

#[test]
fn match_request_with_different_paths() {
  let expected = HttpRequest { path: "/users/123".to_string(), .. HttpRequest::default() };
  let actual = HttpRequest { path: "/users/456".to_string(), .. HttpRequest::default() };
  let mismatches = match_request(&expected, &actual);
  expect!(mismatches.len()).to(be_equal_to(1));
  expect!(mismatches[0].mismatch_type()).to(be_equal_to("PathMismatch"));
}

#[test]
fn match_request_with_a_path_matcher() {
  let expected = HttpRequest {
    path: "/users/123".to_string(),
    matching_rules: matchingrules! {
      "path" => { "" => [ MatchingRule::Regex("/users/\\d+".to_string()) ] }
    },
    .. HttpRequest::default()
  };
  let actual = HttpRequest { path: "/users/456".to_string(), .. HttpRequest::default() };
  expect!(match_request(&expected, &actual).is_empty()).to(be_true());
}

#[test]
fn match_request_with_query_parameters() {
  let expected = HttpRequest {
    query: Some(hashmap!{ "page".to_string() => vec!["1".to_string()] }),
    .. HttpRequest::default()
  };
  let actual = HttpRequest {
    query: Some(hashmap!{ "page".to_string() => vec!["2".to_string()] }),
    .. HttpRequest::default()
  };
  let mismatches = match_request(&expected, &actual);
  expect!(mismatches.len()).to(be_equal_to(1));
  expect!(mismatches[0].mismatch_type()).to(be_equal_to("QueryMismatch"));
}

#[test]
fn match_request_with_header_regex_rule() {
  let expected = HttpRequest {
    headers: Some(hashmap!{ "X-Req-ID".to_string() => vec!["abcdef01".to_string()] }),
    matching_rules: matchingrules! {
      "header" => { "$['X-Req-ID']" => [ MatchingRule::Regex("^[a-f0-9]{8}$".to_string()) ] }
    },
    .. HttpRequest::default()
  };

  let ok = HttpRequest {
    headers: Some(hashmap!{ "X-Req-ID".to_string() => vec!["01234567".to_string()] }),
    .. HttpRequest::default()
  };
  expect!(match_request(&expected, &ok).is_empty()).to(be_true());

  let bad = HttpRequest {
    headers: Some(hashmap!{ "X-Req-ID".to_string() => vec!["deadbeef-xx".to_string()] }),
    .. HttpRequest::default()
  };
  let mismatches = match_request(&expected, &bad);
  expect!(mismatches.len()).to(be_equal_to(1));
  expect!(mismatches[0].mismatch_type()).to(be_equal_to("HeaderMismatch"));
}

#[test]
fn match_request_with_json_bodies() {
  let expected = HttpRequest {
    body: OptionalBody::from(&json!({"id": 123, "name": "Alice"})),
    matching_rules: matchingrules! {
      "body" => { "$.name" => [ MatchingRule::Type ] }
    },
    .. HttpRequest::default()
  };
  let actual = HttpRequest {
    body: OptionalBody::from(&json!({"id": 123, "name": "Bob"})),
    .. HttpRequest::default()
  };
  expect!(match_request(&expected, &actual).is_empty()).to(be_true());
}

#[test]
fn match_response_with_different_status() {
  let expected = HttpResponse { status: 200, .. HttpResponse::default() };
  let actual = HttpResponse { status: 404, .. HttpResponse::default() };
  let mismatches = match_response(&expected, &actual);
  expect!(mismatches.len()).to(be_equal_to(1));
  expect!(mismatches[0].mismatch_type()).to(be_equal_to("StatusMismatch"));
}

#[test]
fn match_response_with_status_code_matcher() {
  let expected = HttpResponse {
    status: 200,
    matching_rules: matchingrules! {
      "status" => { "" => [ MatchingRule::StatusCode(pact_models::HttpStatus::Success) ] }
    },
    .. HttpResponse::default()
  };
  let actual = HttpResponse { status: 204, .. HttpResponse::default() };
  expect!(match_response(&expected, &actual).is_empty()).to(be_true());

  let failed = HttpResponse { status: 400, .. HttpResponse::default() };
  expect!(match_response(&expected, &failed).len()).to(be_equal_to(1));
}

#[test]
fn match_response_allows_unexpected_body_keys() {
  let expected = HttpResponse {
    body: OptionalBody::from(&json!({"id": 123})),
    .. HttpResponse::default()
  };
  let actual = HttpResponse {
    body: OptionalBody::from(&json!({"id": 123, "name": "Bob"})),
    .. HttpResponse::default()
  };
  expect!(match_response(&expected, &actual).is_empty()).to(be_true());
}

#[test]
fn match_request_rejects_unexpected_body_keys() {
  let expected = HttpRequest {
    body: OptionalBody::from(&json!({"id": 123})),
    .. HttpRequest::default()
  };
  let actual = HttpRequest {
    body: OptionalBody::from(&json!({"id": 123, "name": "Bob"})),
    .. HttpRequest::default()
  };
  expect!(match_request(&expected, &actual).len()).to(be_equal_to(1));
}

#[test]
fn match_request_with_different_body_content_types() {
  let expected = HttpRequest {
    body: OptionalBody::from(&json!({"id": 123})),
    .. HttpRequest::default()
  };
  let actual = HttpRequest {
    body: OptionalBody::Present("hello".into(), Some("text/plain".into())),
    .. HttpRequest::default()
  };
  let mismatches = match_request(&expected, &actual);
  expect!(mismatches.len()).to(be_equal_to(1));
  expect!(mismatches[0].mismatch_type()).to(be_equal_to("BodyTypeMismatch"));
}

#[test]
fn match_message_contents_and_metadata() {
  let expected = MessageContents {
    contents: OptionalBody::from(&json!({"action": "delete_user", "user_id": "123"})),
    metadata: hashmap!{ "queue".to_string() => json!("users") },
    .. MessageContents::default()
  };

  let matching = MessageContents {
    contents: OptionalBody::from(&json!({"action": "delete_user", "user_id": "123"})),
    metadata: hashmap!{ "queue".to_string() => json!("users") },
    .. MessageContents::default()
  };
  expect!(match_message_contents(&expected, &matching).is_empty()).to(be_true());

  let different_body = MessageContents {
    contents: OptionalBody::from(&json!({"action": "create_user", "user_id": "123"})),
    metadata: hashmap!{ "queue".to_string() => json!("users") },
    .. MessageContents::default()
  };
  let mismatches = match_message_contents(&expected, &different_body);
  expect!(mismatches.len()).to(be_equal_to(1));
  match &mismatches[0] {
    Mismatch::BodyMismatch { path, .. } => expect!(path.as_str()).to(be_equal_to("$.action")),
    mismatch => panic!("Expected a BodyMismatch, got {:?}", mismatch)
  };

  let different_metadata = MessageContents {
    contents: OptionalBody::from(&json!({"action": "delete_user", "user_id": "123"})),
    metadata: hashmap!{ "queue".to_string() => json!("other") },
    .. MessageContents::default()
  };
  let mismatches = match_message_contents(&expected, &different_metadata);
  expect!(mismatches.len()).to(be_equal_to(1));
  expect!(mismatches[0].mismatch_type()).to(be_equal_to("MetadataMismatch"));
}

#[test]
fn generated_values_are_accepted_by_the_companion_matchers() {
  use pact_models::generators::{Generator, GeneratorContext};
  use crate::matchers::Matches;

  let mut ctx = GeneratorContext::new(42)
    .with_state_params(hashmap!{ "userId".to_string() => json!(123) })
    .with_mock_server_url("http://127.0.0.1:1234");

  let cases: Vec<(Generator, MatchingRule)> = vec![
    (Generator::RandomInt(0, 100), MatchingRule::Integer),
    (Generator::RandomDecimal(8), MatchingRule::Number),
    (Generator::RandomHexadecimal(16), MatchingRule::Regex("^[0-9a-f]+$".to_string())),
    (Generator::RandomString(20), MatchingRule::Regex("^\\w{20}$".to_string())),
    (Generator::Regex("\\d{4}".to_string()), MatchingRule::Regex("^\\d{4}$".to_string())),
    (Generator::Uuid, MatchingRule::Regex("^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$".to_string())),
    (Generator::Date(Some("yyyy-MM-dd".to_string())), MatchingRule::Date("yyyy-MM-dd".to_string())),
    (Generator::Time(Some("HH:mm:ss".to_string())), MatchingRule::Time("HH:mm:ss".to_string())),
    (Generator::DateTime(Some("yyyy-MM-dd'T'HH:mm:ss".to_string())),
      MatchingRule::Timestamp("yyyy-MM-dd'T'HH:mm:ss".to_string())),
    (Generator::RandomBoolean, MatchingRule::Boolean),
    (Generator::ProviderStateGenerator("userId".to_string(), None), MatchingRule::Integer),
    (Generator::MockServerURL("http://example.com/orders/1".to_string(), ".*(/orders/\\d+)$".to_string()),
      MatchingRule::Regex("^http://127\\.0\\.0\\.1:1234/orders/\\d+$".to_string()))
  ];

  for (generator, matcher) in cases {
    let value = generator.generate_value(&serde_json::Value::Null, &mut ctx)
      .unwrap_or_else(|err| panic!("Generator {:?} failed: {}", generator, err));
    let result = (&serde_json::Value::Null).matches_with(&value, &matcher, false);
    expect!(result.is_ok()).to(be_true());
  }
}

#[test]
fn match_purity_the_same_inputs_give_the_same_mismatches() {
  let expected = HttpRequest {
    path: "/a".to_string(),
    body: OptionalBody::from(&json!({"id": 1, "name": "x"})),
    .. HttpRequest::default()
  };
  let actual = HttpRequest {
    path: "/b".to_string(),
    body: OptionalBody::from(&json!({"id": 2, "name": "y"})),
    .. HttpRequest::default()
  };
  let first = match_request(&expected, &actual);
  let second = match_request(&expected, &actual);
  expect!(first).to(be_equal_to(second));
}

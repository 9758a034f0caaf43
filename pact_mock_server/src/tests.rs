use expectest::prelude::*;
use maplit::hashmap;
use serde_json::json;

use pact_models::bodies::OptionalBody;
use pact_models::matchingrules;
use pact_models::matchingrules::MatchingRule;
use pact_models::pact::Pact;
use pact_models::v4::http_parts::{HttpRequest, HttpResponse};
use pact_models::v4::interaction::Interaction;
use pact_models::v4::synch_http::SynchronousHttp;

use super::*;
use crate::mock_server::MockServerConfig;

fn test_pact(interactions: Vec<SynchronousHttp>) -> Pact {
  let mut pact = Pact::new("consumer", "provider");
  for interaction in interactions {
    pact.add_interaction(Interaction::SynchronousHttp(interaction));
  }
  pact
}

fn get_user_interaction() -> SynchronousHttp {
  SynchronousHttp {
    description: "a request for user 123".to_string(),
    request: HttpRequest {
      method: "GET".to_string(),
      path: "/users/123".to_string(),
      .. HttpRequest::default()
    },
    response: HttpResponse {
      status: 200,
      headers: Some(hashmap!{ "Content-Type".to_string() => vec!["application/json".to_string()] }),
      body: OptionalBody::from(&json!({"id": 123, "name": "Alice"})),
      matching_rules: matchingrules! {
        "body" => { "$.name" => [ MatchingRule::Type ] }
      },
      .. HttpResponse::default()
    },
    .. SynchronousHttp::default()
  }
}

#[test]
fn mock_server_with_no_http_interactions_fails_to_start() {
  let pact = Pact::new("consumer", "provider");
  let result = start_mock_server(pact, MockServerConfig::default());
  expect!(result).to(be_err());
}

#[test]
fn mock_server_serves_a_matching_request() {
  let pact = test_pact(vec![ get_user_interaction() ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();

  let client = reqwest::blocking::Client::new();
  let response = client.get(format!("{}/users/123", mock_server.url()))
    .send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(200));
  let body: serde_json::Value = response.json().unwrap();
  expect!(&body["id"]).to(be_equal_to(&json!(123)));

  let status = mock_server.stop();
  expect!(status.all_matched()).to(be_true());
  expect!(status.matched.len()).to(be_equal_to(1));
  expect!(status.metrics.requests).to(be_equal_to(1));
}

#[test]
fn mock_server_returns_500_for_unexpected_requests() {
  let pact = test_pact(vec![ get_user_interaction() ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();

  let client = reqwest::blocking::Client::new();
  let response = client.get(format!("{}/something/else", mock_server.url()))
    .send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(500));
  let body: serde_json::Value = response.json().unwrap();
  expect!(&body["error"]).to(be_equal_to(&json!("Unexpected request")));
  expect!(&body["path"]).to(be_equal_to(&json!("/something/else")));
  expect!(body["available"].as_array().unwrap().len()).to(be_equal_to(1));

  let status = mock_server.stop();
  expect!(status.all_matched()).to(be_false());
  expect!(status.extra.len()).to(be_equal_to(1));
  // the expected interaction was never matched, and there was an extra request
  expect!(status.unmatched.len()).to(be_equal_to(1));
}

#[test]
fn mock_server_reports_missing_interactions() {
  let mut second = get_user_interaction();
  second.description = "a second request".to_string();
  second.request.path = "/users/456".to_string();
  let pact = test_pact(vec![ get_user_interaction(), second ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();

  let client = reqwest::blocking::Client::new();
  let response = client.get(format!("{}/users/123", mock_server.url())).send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(200));

  let status = mock_server.stop();
  expect!(status.matched.len()).to(be_equal_to(1));
  expect!(status.unmatched.len()).to(be_equal_to(1));
  expect!(status.unmatched[0].description.as_str()).to(be_equal_to("a second request"));
  expect!(status.mismatches.iter().any(|m| m.mismatch_type() == "MissingRequest")).to(be_true());
}

#[test]
fn interactions_are_one_shot_by_default() {
  let pact = test_pact(vec![ get_user_interaction() ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();

  let client = reqwest::blocking::Client::new();
  let first = client.get(format!("{}/users/123", mock_server.url())).send().unwrap();
  expect!(first.status().as_u16()).to(be_equal_to(200));
  let second = client.get(format!("{}/users/123", mock_server.url())).send().unwrap();
  expect!(second.status().as_u16()).to(be_equal_to(500));

  mock_server.stop();
}

#[test]
fn repeatable_interactions_can_be_matched_multiple_times() {
  let mut interaction = get_user_interaction();
  interaction.comments.insert("repeatable".to_string(), json!(true));
  let pact = test_pact(vec![ interaction ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();

  let client = reqwest::blocking::Client::new();
  for _ in 0..3 {
    let response = client.get(format!("{}/users/123", mock_server.url())).send().unwrap();
    expect!(response.status().as_u16()).to(be_equal_to(200));
  }

  let status = mock_server.stop();
  expect!(status.all_matched()).to(be_true());
  expect!(status.matched.len()).to(be_equal_to(3));
}

#[test]
fn stop_is_idempotent() {
  let pact = test_pact(vec![ get_user_interaction() ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();
  let first = mock_server.stop();
  let second = mock_server.stop();
  expect!(first).to(be_equal_to(second));
}

#[test]
fn mock_server_writes_the_pact_file_on_request() {
  let dir = tempfile::tempdir().unwrap();
  let pact = test_pact(vec![ get_user_interaction() ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();

  let client = reqwest::blocking::Client::new();
  client.get(format!("{}/users/123", mock_server.url())).send().unwrap();
  mock_server.stop();

  mock_server.write_pact(Some(dir.path().to_str().unwrap()), false).unwrap();
  let written = pact_models::pact::read_pact(&dir.path().join("consumer-provider.json")).unwrap();
  expect!(written.interactions.len()).to(be_equal_to(1));
}

#[test]
fn request_body_matching_rules_are_applied() {
  let interaction = SynchronousHttp {
    description: "a request to create a user".to_string(),
    request: HttpRequest {
      method: "POST".to_string(),
      path: "/users".to_string(),
      headers: Some(hashmap!{ "Content-Type".to_string() => vec!["application/json".to_string()] }),
      body: OptionalBody::from(&json!({"name": "Alice"})),
      matching_rules: matchingrules! {
        "body" => { "$.name" => [ MatchingRule::Type ] }
      },
      .. HttpRequest::default()
    },
    response: HttpResponse { status: 201, .. HttpResponse::default() },
    .. SynchronousHttp::default()
  };
  let pact = test_pact(vec![ interaction ]);
  let mut mock_server = start_mock_server(pact, MockServerConfig::default()).unwrap();

  let client = reqwest::blocking::Client::new();
  let response = client.post(format!("{}/users", mock_server.url()))
    .header("Content-Type", "application/json")
    .body(json!({"name": "Bob"}).to_string())
    .send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(201));

  let status = mock_server.stop();
  expect!(status.all_matched()).to(be_true());
}

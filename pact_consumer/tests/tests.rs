use expectest::prelude::*;
use serde_json::json;

use pact_consumer::{json_pattern, json_pattern_internal, like, term};
use pact_consumer::prelude::*;

#[test]
fn consumer_test_with_matching_request() {
  let dir = tempfile::tempdir().unwrap();

  let mut pact_builder = PactBuilder::new("user consumer", "user service");
  pact_builder.interaction("a request for user 123", |i| {
    i.given("user 123 exists");
    i.request.path("/users/123");
    i.response
      .header("Content-Type", "application/json")
      .json_body(json_pattern!({
        "id": 123,
        "name": like!("Alice")
      }));
  });

  let user_service = pact_builder.start_mock_server(None)
    .with_output_dir(dir.path().to_str().unwrap());

  let client = reqwest::blocking::Client::new();
  let response = client.get(user_service.path("/users/123")).send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(200));
  let body: serde_json::Value = response.json().unwrap();
  expect!(&body["name"]).to(be_equal_to(&json!("Alice")));

  let status = user_service.stop();
  expect!(status.all_matched()).to(be_true());

  let pact_file = dir.path().join("user consumer-user service.json");
  let pact = pact_models::pact::read_pact(&pact_file).unwrap();
  expect!(pact.interactions.len()).to(be_equal_to(1));
  expect!(pact.interactions[0].provider_states()[0].name.as_str())
    .to(be_equal_to("user 123 exists"));
}

#[test]
fn consumer_test_with_regex_header() {
  let mut pact_builder = PactBuilder::new("header consumer", "header service");
  pact_builder.interaction("a request with a request id", |i| {
    i.request
      .path("/ping")
      .header("X-Req-ID", StringPattern::term("^[a-f0-9]{8}$", "deadbeef"));
    i.response.status(204);
  });

  let service = pact_builder.start_mock_server(None);

  let client = reqwest::blocking::Client::new();
  let response = client.get(service.path("/ping"))
    .header("X-Req-ID", "01234567")
    .send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(204));

  let status = service.stop();
  expect!(status.all_matched()).to(be_true());
}

#[test]
fn consumer_test_records_mismatches() {
  let mut pact_builder = PactBuilder::new("mismatch consumer", "mismatch service");
  pact_builder.interaction("a request with a request id", |i| {
    i.request
      .path("/ping")
      .header("X-Req-ID", StringPattern::term("^[a-f0-9]{8}$", "deadbeef"));
    i.response.status(204);
  });

  let service = pact_builder.start_mock_server(None);

  let client = reqwest::blocking::Client::new();
  let response = client.get(service.path("/ping"))
    .header("X-Req-ID", "deadbeef-xx")
    .send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(500));

  let status = service.stop();
  expect!(status.all_matched()).to(be_false());
  expect!(status.mismatches.iter().any(|m| m.mismatch_type() == "HeaderMismatch")).to(be_true());
}

#[test]
fn consumer_test_with_query_parameters_and_term() {
  let mut pact_builder = PactBuilder::new("query consumer", "query service");
  pact_builder.interaction("a search request", |i| {
    i.request
      .path("/search")
      .query_param("q", "rust")
      .query_param("page", StringPattern::term("^\\d+$", "1"));
    i.response
      .header("Content-Type", "application/json")
      .json_body(json_pattern!({
        "results": [],
        "query": term!("^\\w+$", "rust")
      }));
  });

  let service = pact_builder.start_mock_server(None);

  let client = reqwest::blocking::Client::new();
  let response = client.get(service.path("/search"))
    .query(&[("q", "rust"), ("page", "42")])
    .send().unwrap();
  expect!(response.status().as_u16()).to(be_equal_to(200));

  let status = service.stop();
  expect!(status.all_matched()).to(be_true());
}

#[test]
fn message_interaction_builds_into_the_pact() {
  let pact = PactBuilder::new("message consumer", "message provider")
    .message_interaction("a user deletion message", |m| {
      m.given("user exists");
      m.json_contents(json_pattern!({
        "action": "delete_user",
        "user_id": like!("123")
      }));
      m.metadata("queue", json!("users"));
    })
    .build();

  expect!(pact.interactions.len()).to(be_equal_to(1));
  let message = pact.interactions[0].as_asynchronous_message().unwrap();
  expect!(message.contents.metadata.get("queue").unwrap()).to(be_equal_to(&json!("users")));
}

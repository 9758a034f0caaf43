use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use expectest::prelude::*;
use maplit::hashmap;
use serde_json::json;

use pact_consumer::{json_pattern, json_pattern_internal, like};
use pact_consumer::prelude::*;
use pact_verifier::{FilterInfo, PactSource, Verifier};
use pact_verifier::callback_executors::{MessageProducer, StateHandler};
use pact_verifier::verification_result::InteractionStatus;

// Builds a pact file for the verifier to replay, and a mock server standing in for
// the provider implementation.
fn pact_json(name_matched_by_type: bool) -> String {
  let mut builder = PactBuilder::new("test consumer", "test provider");
  builder.interaction("a request for user 123", |i| {
    i.given_with_params("user exists", &json!({"id": 123, "name": "Alice"}));
    i.request.path("/users/123");
    i.response
      .header("Content-Type", "application/json")
      .json_body(if name_matched_by_type {
        json_pattern!({ "id": 123, "name": like!("Alice") })
      } else {
        json_pattern!({ "id": 123, "name": "Alice" })
      });
  });
  serde_json::to_string(&builder.build().to_json(pact_models::PactSpecification::V4).unwrap()).unwrap()
}

fn provider_stub(name: &str) -> ValidatingMockServer {
  let mut builder = PactBuilder::new("verifier", name);
  builder.interaction("any user request", |i| {
    i.request.path("/users/123");
    i.response
      .header("Content-Type", "application/json")
      .json_body(json_pattern!({ "id": 123, "name": "Bob" }));
  });
  builder.start_mock_server(None)
}

#[tokio::test(flavor = "multi_thread")]
async fn verifies_a_pact_against_a_provider() {
  let provider = provider_stub("type matched provider");
  let url = url::Url::parse(&provider.url()).unwrap();

  let calls = Arc::new(AtomicUsize::new(0));
  let counter = calls.clone();
  let state_handler = StateHandler::Func2(Arc::new(move |name, _action, params| {
    expect!(name).to(be_equal_to("user exists"));
    expect!(params.get("id").unwrap()).to(be_equal_to(&json!(123)));
    counter.fetch_add(1, Ordering::SeqCst);
    Ok(hashmap!{})
  }));

  let verifier = Verifier::new("test provider")
    .provider_base_url("http", url.host_str().unwrap(), url.port(), "")
    .state_handler(state_handler)
    .add_source(PactSource::String(pact_json(true)));

  let report = verifier.execute().await.unwrap();
  expect!(report.passed()).to(be_true());
  expect!(report.pacts.len()).to(be_equal_to(1));
  expect!(report.pacts[0].results.len()).to(be_equal_to(1));
  expect!(report.pacts[0].results[0].status.clone()).to(be_equal_to(InteractionStatus::Pass));
  // setup and teardown for the single declared state
  expect!(calls.load(Ordering::SeqCst)).to(be_equal_to(2));

  provider.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn reports_mismatches_from_the_provider_response() {
  let provider = provider_stub("equality provider");
  let url = url::Url::parse(&provider.url()).unwrap();

  // the pact expects the name to equal "Alice", but the provider returns "Bob"
  let verifier = Verifier::new("test provider")
    .provider_base_url("http", url.host_str().unwrap(), url.port(), "")
    .add_source(PactSource::String(pact_json(false)));

  let report = verifier.execute().await.unwrap();
  expect!(report.passed()).to(be_false());
  let result = &report.pacts[0].results[0];
  expect!(result.status.clone()).to(be_equal_to(InteractionStatus::Fail));
  expect!(result.mismatches.iter().any(|m| m.mismatch_type() == "BodyMismatch")).to(be_true());

  expect!(verifier.verify().await).to(be_err());
  provider.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn an_unreachable_provider_is_an_interaction_failure() {
  let verifier = Verifier::new("test provider")
    .provider_base_url("http", "127.0.0.1", Some(1), "")
    .request_timeout(std::time::Duration::from_secs(2))
    .add_source(PactSource::String(pact_json(true)));

  let report = verifier.execute().await.unwrap();
  expect!(report.passed()).to(be_false());
  expect!(report.pacts[0].results[0].error.is_some()).to(be_true());
}

#[tokio::test(flavor = "multi_thread")]
async fn filters_interactions_by_description() {
  let provider = provider_stub("filter provider");
  let url = url::Url::parse(&provider.url()).unwrap();

  let verifier = Verifier::new("test provider")
    .provider_base_url("http", url.host_str().unwrap(), url.port(), "")
    .filter(FilterInfo {
      description: Some("^no interactions match this$".to_string()),
      .. FilterInfo::default()
    })
    .add_source(PactSource::String(pact_json(true)));

  let report = verifier.execute().await.unwrap();
  expect!(report.passed()).to(be_true());
  expect!(report.pacts[0].results.is_empty()).to(be_true());

  // nothing was replayed against the provider stub
  let status = provider.stop();
  expect!(status.matched.is_empty()).to(be_true());
}

#[tokio::test(flavor = "multi_thread")]
async fn verifies_message_interactions_with_a_producer() {
  let pact = PactBuilder::new("message consumer", "message provider")
    .message_interaction("a user deletion message", |m| {
      m.json_contents(json_pattern!({
        "action": "delete_user",
        "user_id": "123"
      }));
    })
    .build();
  let pact_json = serde_json::to_string(
    &pact.to_json(pact_models::PactSpecification::V4).unwrap()).unwrap();

  let producer = MessageProducer::Func(Arc::new(|_description, _metadata| {
    Ok(pact_models::v4::message_parts::MessageContents {
      contents: pact_models::bodies::OptionalBody::from(&json!({
        "action": "delete_user", "user_id": "123"
      })),
      .. pact_models::v4::message_parts::MessageContents::default()
    })
  }));

  let verifier = Verifier::new("message provider")
    .message_producer(producer)
    .add_source(PactSource::String(pact_json));

  let report = verifier.execute().await.unwrap();
  expect!(report.passed()).to(be_true());
}

#[tokio::test(flavor = "multi_thread")]
async fn pending_interactions_do_not_fail_the_run() {
  let mut builder = PactBuilder::new("pending consumer", "test provider");
  builder.interaction("a request that will fail", |i| {
    i.pending(true);
    i.request.path("/users/123");
    i.response
      .header("Content-Type", "application/json")
      .json_body(json_pattern!({ "id": 123, "name": "Alice" }));
  });
  let pact_json = serde_json::to_string(
    &builder.build().to_json(pact_models::PactSpecification::V4).unwrap()).unwrap();

  // the provider stub returns "Bob", so the interaction fails, but it is pending
  let provider = provider_stub("pending provider");
  let url = url::Url::parse(&provider.url()).unwrap();

  let verifier = Verifier::new("test provider")
    .provider_base_url("http", url.host_str().unwrap(), url.port(), "")
    .add_source(PactSource::String(pact_json));

  let report = verifier.execute().await.unwrap();
  expect!(report.passed()).to(be_true());
  expect!(report.pacts[0].results[0].status.clone())
    .to(be_equal_to(InteractionStatus::PendingFail));
  provider.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn an_unloadable_broker_source_is_a_source_error() {
  let verifier = Verifier::new("test provider")
    .request_timeout(std::time::Duration::from_secs(2))
    .add_source(PactSource::Broker {
      url: "http://127.0.0.1:1".to_string(),
      auth: None,
      enable_pending: true,
      include_wip_pacts_since: None,
      provider_tags: vec![],
      provider_branch: None,
      selectors: vec![]
    });

  let report = verifier.execute().await.unwrap();
  expect!(report.passed()).to(be_true());
  expect!(report.source_errors.is_empty()).to(be_false());
}

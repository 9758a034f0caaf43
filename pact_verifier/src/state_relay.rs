//! The state relay: a small HTTP listener attached to a verification run that lets a
//! remote provider (e.g. one running in a subprocess) call back into the configured
//! state handlers and message producers.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hyper::{Body, Response, Server};
use hyper::service::{make_service_fn, service_fn};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use pact_models::json_utils::json_to_string;

use crate::callback_executors::{MessageProducer, StateAction, StateHandler};

/// A running state relay. The listener is bound for the duration of a verification
/// run and shut down when the relay is dropped.
pub struct StateRelay {
  address: SocketAddr,
  shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>
}

struct RelayState {
  state_handler: StateHandler,
  message_producer: MessageProducer,
  client: reqwest::Client
}

impl StateRelay {
  /// Starts the relay on an ephemeral port on the loopback interface
  pub async fn start(state_handler: StateHandler, message_producer: MessageProducer) -> anyhow::Result<StateRelay> {
    let relay_state = Arc::new(RelayState {
      state_handler,
      message_producer,
      client: reqwest::Client::new()
    });

    let make_service = make_service_fn(move |_| {
      let relay_state = relay_state.clone();
      async {
        Ok::<_, hyper::Error>(service_fn(move |req| {
          let relay_state = relay_state.clone();
          async move {
            Ok::<_, hyper::Error>(handle_relay_request(req, relay_state).await)
          }
        }))
      }
    });

    let addr: SocketAddr = ([127, 0, 0, 1], 0).into();
    let server = Server::try_bind(&addr)?.serve(make_service);
    let address = server.local_addr();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
      let graceful = server.with_graceful_shutdown(async move {
        shutdown_rx.await.ok();
      });
      if let Err(err) = graceful.await {
        error!("State relay failed: {}", err);
      }
    });

    info!("State relay listening on {}", address);
    Ok(StateRelay {
      address,
      shutdown_tx: Some(shutdown_tx)
    })
  }

  /// The base URL of the relay
  pub fn url(&self) -> String {
    format!("http://{}", self.address)
  }

  /// The URL of the state change endpoint
  pub fn state_url(&self) -> String {
    format!("{}/_pact/state", self.url())
  }

  /// The URL of the message production endpoint
  pub fn message_url(&self) -> String {
    format!("{}/_pact/message", self.url())
  }
}

impl Drop for StateRelay {
  fn drop(&mut self) {
    if let Some(sender) = self.shutdown_tx.take() {
      let _ = sender.send(());
    }
  }
}

async fn handle_relay_request(req: hyper::Request<Body>, state: Arc<RelayState>) -> Response<Body> {
  let method = req.method().clone();
  let path = req.uri().path().to_string();
  debug!("State relay received {} {}", method, path);

  if method != hyper::Method::POST {
    return plain_response(405, "Only POST requests are supported");
  }

  let body = match hyper::body::to_bytes(req.into_body()).await {
    Ok(bytes) => bytes,
    Err(err) => return plain_response(500, &format!("Failed to read the request body: {}", err))
  };
  let json_body: Value = match serde_json::from_slice(&body) {
    Ok(json) => json,
    Err(err) => return plain_response(400, &format!("Request body is not valid JSON: {}", err))
  };

  match path.as_str() {
    "/_pact/state" => handle_state_change(&json_body, &state).await,
    "/_pact/message" => handle_message_request(&json_body, &state).await,
    _ => plain_response(404, "Unknown relay endpoint")
  }
}

async fn handle_state_change(json_body: &Value, state: &RelayState) -> Response<Body> {
  let state_name = json_body.get("state").map(json_to_string).unwrap_or_default();
  let action = match json_body.get("action").map(json_to_string).as_deref() {
    Some("teardown") => StateAction::Teardown,
    _ => StateAction::Setup
  };
  let params: HashMap<String, Value> = match json_body.get("params") {
    Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    _ => HashMap::default()
  };

  let provider_state = pact_models::provider_states::ProviderState::new(&state_name, params);
  match state.state_handler.call(&provider_state, action, &state.client).await {
    Ok(_) => Response::builder()
      .status(200)
      .body(Body::empty())
      .unwrap_or_default(),
    Err(err) => plain_response(500, &format!("State handler failed: {}", err))
  }
}

async fn handle_message_request(json_body: &Value, state: &RelayState) -> Response<Body> {
  let description = json_body.get("description").map(json_to_string).unwrap_or_default();
  let metadata: HashMap<String, Value> = match json_body.get("metadata") {
    Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
    _ => HashMap::default()
  };

  match state.message_producer.produce(&description, &metadata, &state.client).await {
    Ok(contents) => {
      let content_type = contents.content_type()
        .map(|ct| ct.to_string())
        .unwrap_or_else(|| "application/json".to_string());
      let mut builder = Response::builder()
        .status(200)
        .header("Content-Type", content_type);
      if !contents.metadata.is_empty() {
        let metadata_json = json!(contents.metadata).to_string();
        builder = builder.header("Pact-Message-Metadata", BASE64.encode(metadata_json));
      }
      builder.body(match contents.contents.value() {
        Some(bytes) => Body::from(bytes),
        None => Body::empty()
      }).unwrap_or_default()
    },
    Err(err) => plain_response(500, &format!("Message producer failed: {}", err))
  }
}

fn plain_response(status: u16, message: &str) -> Response<Body> {
  Response::builder()
    .status(status)
    .body(Body::from(message.to_string()))
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use pact_models::bodies::OptionalBody;
  use pact_models::v4::message_parts::MessageContents;

  use super::*;

  #[tokio::test]
  async fn relay_dispatches_state_changes_to_the_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let handler = StateHandler::Func2(Arc::new(move |name, _action, params| {
      expect!(name).to(be_equal_to("user exists"));
      expect!(params.get("id").unwrap()).to(be_equal_to(&json!(123)));
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(hashmap!{})
    }));

    let relay = StateRelay::start(handler, MessageProducer::None).await.unwrap();
    let client = reqwest::Client::new();
    let response = client.post(relay.state_url())
      .json(&json!({"state": "user exists", "action": "setup", "params": {"id": 123}}))
      .send().await.unwrap();

    expect!(response.status().as_u16()).to(be_equal_to(200));
    expect!(calls.load(Ordering::SeqCst)).to(be_equal_to(1));
  }

  #[tokio::test]
  async fn relay_returns_500_when_the_handler_fails() {
    let handler = StateHandler::Func2(Arc::new(|_, _, _| {
      Err(anyhow::anyhow!("boom"))
    }));

    let relay = StateRelay::start(handler, MessageProducer::None).await.unwrap();
    let client = reqwest::Client::new();
    let response = client.post(relay.state_url())
      .json(&json!({"state": "s", "action": "setup"}))
      .send().await.unwrap();

    expect!(response.status().as_u16()).to(be_equal_to(500));
  }

  #[tokio::test]
  async fn relay_returns_message_contents_with_metadata_header() {
    let contents = MessageContents {
      contents: OptionalBody::from(&json!({"action": "delete_user"})),
      metadata: hashmap!{ "queue".to_string() => json!("users") },
      .. MessageContents::default()
    };
    let producer = MessageProducer::Map(hashmap!{
      "a message".to_string() => contents
    });

    let relay = StateRelay::start(StateHandler::None, producer).await.unwrap();
    let client = reqwest::Client::new();
    let response = client.post(relay.message_url())
      .json(&json!({"description": "a message"}))
      .send().await.unwrap();

    expect!(response.status().as_u16()).to(be_equal_to(200));
    let metadata_header = response.headers().get("Pact-Message-Metadata").unwrap()
      .to_str().unwrap().to_string();
    let decoded: Value = serde_json::from_slice(
      &BASE64.decode(metadata_header).unwrap()).unwrap();
    expect!(&decoded["queue"]).to(be_equal_to(&json!("users")));

    let body: Value = response.json().await.unwrap();
    expect!(&body["action"]).to(be_equal_to(&json!("delete_user")));
  }

  #[tokio::test]
  async fn relay_rejects_non_post_requests() {
    let relay = StateRelay::start(StateHandler::None, MessageProducer::None).await.unwrap();
    let client = reqwest::Client::new();
    let response = client.get(relay.state_url()).send().await.unwrap();
    expect!(response.status().as_u16()).to(be_equal_to(405));
  }
}

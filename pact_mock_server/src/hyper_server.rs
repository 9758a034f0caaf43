//! The hyper service that backs a mock server instance: converts incoming requests to
//! the pact model, matches them against the expected interactions and renders the
//! declared responses.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hyper::{Body, Response, Server};
use hyper::http::header::{HeaderName, HeaderValue};
use hyper::http::response::Builder as ResponseBuilder;
use hyper::service::{make_service_fn, service_fn};
use serde_json::json;
use tracing::{debug, error, info, warn};

use pact_matching::generators::generate_response;
use pact_models::bodies::OptionalBody;
use pact_models::generators::{GeneratorContext, GeneratorTestMode};
use pact_models::query_strings::parse_query_string;
use pact_models::v4::http_parts::{HttpRequest, HttpResponse};
use pact_models::v4::synch_http::SynchronousHttp;

use crate::matching::{match_request, MatchResult};
use crate::mock_server::MockServerMetrics;

#[derive(Debug, Clone)]
enum InteractionError {
  RequestHeaderEncodingError,
  RequestBodyError,
  ResponseHeaderEncodingError,
  ResponseBodyError
}

/// Shared state for one mock server session: the expected interactions with their
/// consumed flags, the recorded match results and the generation context. Interaction
/// consumption is linearised by the mutex.
#[derive(Debug)]
pub(crate) struct ServerState {
  pub interactions: Vec<(SynchronousHttp, bool)>,
  pub matches: Vec<MatchResult>,
  pub generator_ctx: GeneratorContext,
  pub metrics: MockServerMetrics,
  pub cors_preflight: bool
}

fn extract_path(uri: &hyper::Uri) -> String {
  uri.path_and_query()
    .map(|path_and_query| path_and_query.path())
    .unwrap_or("/")
    .into()
}

fn extract_query_string(uri: &hyper::Uri) -> Option<HashMap<String, Vec<String>>> {
  uri.path_and_query()
    .and_then(|path_and_query| path_and_query.query())
    .and_then(parse_query_string)
}

fn extract_headers(headers: &hyper::HeaderMap) -> Result<Option<HashMap<String, Vec<String>>>, InteractionError> {
  if headers.is_empty() {
    return Ok(None);
  }
  let mut header_map = HashMap::new();
  for name in headers.keys() {
    let mut values = vec![];
    for value in headers.get_all(name) {
      let value = value.to_str()
        .map_err(|err| {
          warn!("Failed to parse HTTP header value: {}", err);
          InteractionError::RequestHeaderEncodingError
        })?;
      values.push(value.to_string());
    }
    header_map.insert(name.as_str().to_string(), values);
  }
  Ok(Some(header_map))
}

async fn hyper_request_to_pact_request(req: hyper::Request<Body>) -> Result<HttpRequest, InteractionError> {
  let method = req.method().to_string();
  let path = extract_path(req.uri());
  let query = extract_query_string(req.uri());
  let headers = extract_headers(req.headers())?;

  let body_bytes = hyper::body::to_bytes(req.into_body())
    .await
    .map_err(|_| InteractionError::RequestBodyError)?;
  let body = if body_bytes.is_empty() {
    OptionalBody::Empty
  } else {
    let content_type = headers.as_ref().and_then(|headers| {
      headers.iter()
        .find(|(k, _)| k.to_lowercase() == "content-type")
        .and_then(|(_, v)| v.first())
        .and_then(|v| pact_models::content_types::ContentType::parse(v.as_str()).ok())
    });
    OptionalBody::Present(body_bytes, content_type)
  };

  Ok(HttpRequest {
    method,
    path,
    query,
    headers,
    body,
    .. HttpRequest::default()
  })
}

fn set_hyper_headers(builder: &mut ResponseBuilder, headers: &Option<HashMap<String, Vec<String>>>) -> Result<(), InteractionError> {
  let hyper_headers = builder.headers_mut().unwrap();
  if let Some(header_map) = headers {
    for (k, values) in header_map {
      for value in values {
        hyper_headers.append(
          HeaderName::from_bytes(k.as_bytes())
            .map_err(|err| {
              error!("Invalid header name '{}' ({})", k, err);
              InteractionError::ResponseHeaderEncodingError
            })?,
          value.parse::<HeaderValue>()
            .map_err(|err| {
              error!("Invalid header value '{}': '{}' ({})", k, value, err);
              InteractionError::ResponseHeaderEncodingError
            })?
        );
      }
    }
  }
  Ok(())
}

fn pact_response_to_hyper_response(response: &HttpResponse) -> Result<Response<Body>, InteractionError> {
  info!("Request matched, sending response {}", response);

  let mut builder = Response::builder()
    .status(response.status)
    .header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*");
  set_hyper_headers(&mut builder, &response.headers)?;

  builder.body(match response.body.value() {
    Some(body) => Body::from(body),
    None => Body::empty()
  }).map_err(|_| InteractionError::ResponseBodyError)
}

fn error_body(request: &HttpRequest, available: &[SynchronousHttp]) -> String {
  json!({
    "error": "Unexpected request",
    "method": request.method,
    "path": request.path,
    "available": available.iter().map(|interaction| json!({
      "description": interaction.description,
      "method": interaction.request.method,
      "path": interaction.request.path
    })).collect::<Vec<serde_json::Value>>()
  }).to_string()
}

fn cors_preflight_response(req_headers: &hyper::HeaderMap) -> Result<Response<Body>, InteractionError> {
  let requested_headers = req_headers.get("access-control-request-headers")
    .and_then(|value| value.to_str().ok())
    .unwrap_or("*")
    .to_string();
  Response::builder()
    .status(200)
    .header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
    .header(hyper::header::ACCESS_CONTROL_ALLOW_METHODS, "GET, HEAD, POST, PUT, DELETE, PATCH, OPTIONS")
    .header(hyper::header::ACCESS_CONTROL_ALLOW_HEADERS, requested_headers)
    .body(Body::empty())
    .map_err(|_| InteractionError::ResponseBodyError)
}

fn is_cors_preflight(method: &hyper::Method, headers: &hyper::HeaderMap) -> bool {
  method == hyper::Method::OPTIONS && headers.contains_key("access-control-request-method")
}

/// Is the interaction consumable: not yet matched, or marked as repeatable
fn consumable(interaction: &SynchronousHttp, consumed: bool) -> bool {
  !consumed || interaction.comments.get("repeatable")
    .and_then(serde_json::Value::as_bool)
    .unwrap_or(false)
}

async fn handle_request(
  req: hyper::Request<Body>,
  state: Arc<Mutex<ServerState>>
) -> Result<Response<Body>, InteractionError> {
  debug!("Creating pact request from hyper request");

  let cors_enabled = state.lock().unwrap().cors_preflight;
  if cors_enabled && is_cors_preflight(req.method(), req.headers()) {
    info!("Answering CORS pre-flight request");
    return cors_preflight_response(req.headers());
  }

  let pact_request = hyper_request_to_pact_request(req).await?;
  info!("Received request {}", pact_request);

  // interaction consumption is linearised by the state mutex
  let mut state = state.lock().unwrap();
  state.metrics.requests += 1;
  *state.metrics.requests_by_path.entry(pact_request.path.clone()).or_insert(0) += 1;

  let candidates: Vec<SynchronousHttp> = state.interactions.iter()
    .filter(|(interaction, consumed)| consumable(interaction, *consumed))
    .map(|(interaction, _)| interaction.clone())
    .collect();
  let match_result = match_request(&pact_request, &candidates);

  let response = match &match_result {
    MatchResult::RequestMatch(interaction, _) => {
      let key = interaction.unique_key();
      for (candidate, consumed) in state.interactions.iter_mut() {
        if candidate.unique_key() == key {
          *consumed = true;
          break;
        }
      }
      let response = generate_response(&interaction.response,
        &GeneratorTestMode::Consumer, &mut state.generator_ctx);
      pact_response_to_hyper_response(&response)
    },
    _ => {
      debug!("Request did not match: {}", match_result.match_key());
      let available: Vec<SynchronousHttp> = state.interactions.iter()
        .map(|(interaction, _)| interaction.clone())
        .collect();
      Response::builder()
        .status(500)
        .header(hyper::header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(hyper::header::CONTENT_TYPE, "application/json; charset=utf-8")
        .header("X-Pact", match_result.match_key())
        .body(Body::from(error_body(&pact_request, &available)))
        .map_err(|_| InteractionError::ResponseBodyError)
    }
  };

  state.matches.push(match_result);
  response
}

fn handle_mock_request_error(result: Result<Response<Body>, InteractionError>) -> Result<Response<Body>, hyper::Error> {
  match result {
    Ok(response) => Ok(response),
    Err(error) => {
      let response = match error {
        InteractionError::RequestHeaderEncodingError => Response::builder()
          .status(400)
          .body(Body::from("Found an invalid header encoding")),
        InteractionError::RequestBodyError => Response::builder()
          .status(500)
          .body(Body::from("Could not process request body")),
        InteractionError::ResponseBodyError => Response::builder()
          .status(500)
          .body(Body::from("Could not process response body")),
        InteractionError::ResponseHeaderEncodingError => Response::builder()
          .status(500)
          .body(Body::from("Could not set response header"))
      };
      Ok(response.unwrap())
    }
  }
}

/// Create and bind the server, returning a future that drives it, the address it is
/// bound to and the shutdown signal sender. The server drains in-flight requests for
/// up to the drain deadline after the shutdown signal, then drops the connections.
pub(crate) async fn create_and_bind(
  state: Arc<Mutex<ServerState>>,
  addr: SocketAddr,
  drain_deadline: Duration
) -> anyhow::Result<(impl std::future::Future<Output = ()>, SocketAddr, tokio::sync::oneshot::Sender<()>)> {
  let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
  let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();

  let server = Server::try_bind(&addr)?
    .serve(make_service_fn(move |_| {
      let state = state.clone();
      async {
        Ok::<_, hyper::Error>(service_fn(move |req| {
          let state = state.clone();
          async {
            handle_mock_request_error(handle_request(req, state).await)
          }
        }))
      }
    }));

  let socket_addr = server.local_addr();

  let future = async move {
    let graceful = server.with_graceful_shutdown(async move {
      shutdown_rx.await.ok();
      let _ = drain_tx.send(());
    });
    tokio::select! {
      result = graceful => if let Err(err) = result {
        error!("Mock server failed: {}", err);
      },
      _ = async move {
        drain_rx.await.ok();
        tokio::time::sleep(drain_deadline).await;
      } => {
        warn!("Mock server did not drain within {:?}, dropping open connections", drain_deadline);
      }
    }
  };

  Ok((future, socket_addr, shutdown_tx))
}

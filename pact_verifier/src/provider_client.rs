//! The HTTP client used to replay requests against the provider and to dispatch state
//! changes to URL handlers.

use std::collections::HashMap;

use anyhow::anyhow;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use http::Method;
use itertools::Itertools;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use pact_models::bodies::OptionalBody;
use pact_models::content_types::ContentType;
use pact_models::provider_states::ProviderState;
use pact_models::v4::http_parts::{HttpPart, HttpRequest, HttpResponse};

use crate::callback_executors::StateAction;
use crate::ProviderInfo;

/// Joins a base URL and a path, normalising the slashes between them
pub fn join_paths(base: &str, path: &str) -> String {
  if !path.is_empty() && path != "/" {
    let mut full_path = base.trim_end_matches('/').to_string();
    full_path.push('/');
    full_path.push_str(path.trim_start_matches('/'));
    full_path
  } else if !base.is_empty() && base != "/" {
    base.trim_end_matches('/').to_string()
  } else {
    "/".to_string()
  }
}

fn create_native_request(client: &Client, base_url: &str, request: &HttpRequest) -> anyhow::Result<RequestBuilder> {
  let url = join_paths(base_url, &request.path);
  let mut builder = client.request(
    Method::from_bytes(request.method.as_bytes()).unwrap_or(Method::GET), &url);

  if let Some(query) = &request.query {
    builder = builder.query(&query.iter()
      .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b))
      .flat_map(|(k, values)| values.iter().map(|v| (k, v)).collect_vec())
      .collect_vec());
  }

  if let Some(headers) = &request.headers {
    let mut header_map = HeaderMap::new();
    for (k, values) in headers {
      for header_value in values {
        let header_name = HeaderName::try_from(k)
          .map_err(|err| anyhow!("Failed to parse header name '{}' - {}", k, err))?;
        header_map.append(header_name, HeaderValue::from_str(header_value.as_str())
          .map_err(|err| anyhow!("Failed to parse header value '{}' - {}", header_value, err))?);
      }
    }
    builder = builder.headers(header_map);
  }

  match &request.body {
    OptionalBody::Present(body, _) => builder = builder.body(body.clone()),
    OptionalBody::Null => {
      if request.content_type().map(|ct| ct.is_json()).unwrap_or(false) {
        builder = builder.body("null");
      }
    },
    _ => ()
  };

  Ok(builder)
}

fn extract_headers(headers: &HeaderMap) -> Option<HashMap<String, Vec<String>>> {
  if headers.is_empty() {
    return None;
  }
  let result = headers.keys()
    .map(|name| {
      let values = headers.get_all(name).iter()
        .filter_map(|value| value.to_str()
          .map(|v| v.to_string())
          .map_err(|err| warn!("Failed to parse HTTP header value: {}", err))
          .ok())
        .flat_map(|value| value.split(',').map(|v| v.trim().to_string()).collect_vec())
        .collect();
      (name.as_str().to_string(), values)
    })
    .collect();
  Some(result)
}

async fn native_response_to_pact_response(native_response: reqwest::Response) -> anyhow::Result<HttpResponse> {
  debug!("Received response: {:?}", native_response);

  let status = native_response.status().as_u16();
  let headers = extract_headers(native_response.headers());
  let content_type = native_response.headers().get(CONTENT_TYPE)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| ContentType::parse(value).ok());

  let body_bytes = native_response.bytes().await?;
  let body = if body_bytes.is_empty() {
    OptionalBody::Empty
  } else {
    OptionalBody::Present(body_bytes, content_type)
  };

  Ok(HttpResponse {
    status,
    headers,
    body,
    .. HttpResponse::default()
  })
}

/// Makes the actual request to the provider, applying any custom headers configured
/// for the verification
pub async fn make_provider_request(
  provider: &ProviderInfo,
  request: &HttpRequest,
  custom_headers: &HashMap<String, String>,
  client: &Client
) -> anyhow::Result<HttpResponse> {
  let base_url = provider.base_url();
  info!("Sending request to provider at {}", base_url);
  debug!("Sending request {}", request);

  let mut request = request.clone();
  for (name, value) in custom_headers {
    let headers = request.headers.get_or_insert_with(HashMap::new);
    headers.insert(name.clone(), vec![ value.clone() ]);
  }

  let native_request = create_native_request(client, &base_url, &request)?;
  let response = native_request.send().await
    .map_err(|err| anyhow!("Request to provider failed - {}", err))?;
  let response = native_response_to_pact_response(response).await?;

  info!("Received response {}", response);
  Ok(response)
}

/// Makes a state change request to a URL handler. The state is sent as a JSON body
/// when `as_body` is set, otherwise as query parameters. If the response has a JSON
/// object body, it is returned as the new provider-state values.
pub async fn make_state_change_request(
  client: &Client,
  state_change_url: &str,
  state: &ProviderState,
  action: StateAction,
  as_body: bool
) -> anyhow::Result<HashMap<String, Value>> {
  debug!("Sending state change '{}' ({}) to state change handler", state.name, action.as_str());

  let request = if as_body {
    let body = json!({
      "state": state.name,
      "action": action.as_str(),
      "params": state.params
    });
    client.post(state_change_url)
      .header("Content-Type", "application/json")
      .body(body.to_string())
  } else {
    let mut query = vec![
      ("state".to_string(), state.name.clone()),
      ("action".to_string(), action.as_str().to_string())
    ];
    for (key, value) in &state.params {
      query.push((key.clone(), pact_models::json_utils::json_to_string(value)));
    }
    client.get(state_change_url).query(&query)
  };

  let response = request.send().await
    .map_err(|err| anyhow!("State change request failed - {}", err))?;
  if response.status().is_success() {
    let is_json = response.headers().get(CONTENT_TYPE)
      .and_then(|value| value.to_str().ok())
      .map(|value| value.starts_with("application/json"))
      .unwrap_or(false);
    if is_json {
      let body = response.bytes().await?;
      match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        _ => Ok(HashMap::default())
      }
    } else {
      Ok(HashMap::default())
    }
  } else {
    Err(anyhow!("State change request failed with status {}", response.status()))
  }
}

/// Requests a message from a URL message producer. The description and metadata are
/// posted as JSON; the response body is the message contents, with any metadata
/// carried in the base64 `Pact-Message-Metadata` header.
pub async fn make_message_request(
  client: &Client,
  url: &str,
  description: &str,
  metadata: &HashMap<String, Value>
) -> anyhow::Result<pact_models::v4::message_parts::MessageContents> {
  use base64::Engine;

  debug!("Requesting message '{}' from '{}'", description, url);
  let body = json!({
    "description": description,
    "metadata": metadata
  });
  let response = client.post(url)
    .header("Content-Type", "application/json")
    .body(body.to_string())
    .send().await
    .map_err(|err| anyhow!("Message request failed - {}", err))?;
  if !response.status().is_success() {
    return Err(anyhow!("Message request failed with status {}", response.status()));
  }

  let content_type = response.headers().get(CONTENT_TYPE)
    .and_then(|value| value.to_str().ok())
    .and_then(|value| ContentType::parse(value).ok());
  let metadata = match response.headers().get("Pact-Message-Metadata") {
    Some(value) => {
      let decoded = base64::engine::general_purpose::STANDARD.decode(value.as_bytes())
        .map_err(|err| anyhow!("Failed to decode the Pact-Message-Metadata header - {}", err))?;
      match serde_json::from_slice::<Value>(&decoded) {
        Ok(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => HashMap::default()
      }
    },
    None => HashMap::default()
  };

  let body_bytes = response.bytes().await?;
  let contents = if body_bytes.is_empty() {
    OptionalBody::Empty
  } else {
    OptionalBody::Present(body_bytes, content_type)
  };

  Ok(pact_models::v4::message_parts::MessageContents {
    contents,
    metadata,
    .. pact_models::v4::message_parts::MessageContents::default()
  })
}

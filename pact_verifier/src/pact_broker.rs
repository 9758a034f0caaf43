//! A minimal Pact Broker API client: fetches pacts for verification (with consumer
//! version selectors) and publishes verification results and pacts. Link traversal
//! follows the broker's HAL relations with URL template expansion.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::anyhow;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, trace, warn};

use pact_models::http_utils::HttpAuth;
use pact_models::pact::{load_pact_from_json, Pact};

/// Errors that can occur with Pact Broker operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PactBrokerError {
  /// Error with a HAL link
  #[error("Link error - {0}")]
  LinkError(String),
  /// Error with the content of a HAL resource
  #[error("Content error - {0}")]
  ContentError(String),
  /// HTTP error
  #[error("IO error - {0}")]
  IoError(String),
  /// Resource was not found
  #[error("Not found - {0}")]
  NotFound(String),
  /// Invalid URL
  #[error("Invalid URL - {0}")]
  UrlError(String)
}

/// A HAL link
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
  /// Name of the link (the relation)
  pub name: String,
  /// The URL of the link
  pub href: Option<String>,
  /// If the URL is a template
  pub templated: bool
}

impl Link {
  /// Parses a link from its JSON form
  pub fn from_json(name: &str, json: &Value) -> Link {
    Link {
      name: name.to_string(),
      href: json.get("href").map(|href| pact_models::json_utils::json_to_string(href)),
      templated: json.get("templated").and_then(Value::as_bool).unwrap_or(false)
    }
  }
}

/// Extracts all the HAL links from a JSON resource
pub fn links_from_json(json: &Value) -> Vec<Link> {
  match json.get("_links") {
    Some(Value::Object(links)) => links.iter()
      .map(|(name, link)| Link::from_json(name, link))
      .collect(),
    _ => vec![]
  }
}

/// A consumer version selector, used to pick which pacts the broker returns for
/// verification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerVersionSelector {
  /// Application name to filter the results on
  #[serde(skip_serializing_if = "Option::is_none")]
  pub consumer: Option<String>,
  /// Tag of the consumer versions
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tag: Option<String>,
  /// Fallback tag if the selector tag does not exist
  #[serde(skip_serializing_if = "Option::is_none")]
  pub fallback_tag: Option<String>,
  /// Only select the latest version (current recommendation is to only use true)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub latest: Option<bool>,
  /// Branch of the consumer versions
  #[serde(skip_serializing_if = "Option::is_none")]
  pub branch: Option<String>,
  /// Select consumer versions deployed or released to an environment
  #[serde(skip_serializing_if = "Option::is_none")]
  pub deployed_or_released: Option<bool>,
  /// Select consumer versions from the main branch
  #[serde(skip_serializing_if = "Option::is_none")]
  pub main_branch: Option<bool>,
  /// Select consumer versions in an environment
  #[serde(skip_serializing_if = "Option::is_none")]
  pub environment: Option<String>
}

/// Request body for the "pacts for verification" endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PactsForVerificationRequest {
  /// Provider tags to use for pending status calculation
  pub provider_version_tags: Vec<String>,
  /// Provider branch used when publishing results
  #[serde(skip_serializing_if = "Option::is_none")]
  pub provider_version_branch: Option<String>,
  /// Enable pending pacts
  pub include_pending_status: bool,
  /// Include work-in-progress pacts created after this date
  #[serde(skip_serializing_if = "Option::is_none")]
  pub include_wip_pacts_since: Option<String>,
  /// The selectors for which pacts to verify
  pub consumer_version_selectors: Vec<ConsumerVersionSelector>
}

/// Properties the broker returns for each pact selected for verification
#[derive(Debug, Clone, Default)]
pub struct PactVerificationContext {
  /// If this pact is pending: failures will not fail the verification task
  pub pending: bool,
  /// Notices the broker asks to be displayed
  pub notices: Vec<String>
}

/// A pact fetched from the broker: the pact itself, its source URL, the HAL links of
/// the resource and the verification context
#[derive(Debug, Clone)]
pub struct FetchedPact {
  /// The pact document
  pub pact: Pact,
  /// The URL the pact was fetched from
  pub url: String,
  /// HAL links of the pact resource (used for publishing results)
  pub links: Vec<Link>,
  /// Verification context (pending status and notices)
  pub context: PactVerificationContext
}

const RETRY_ATTEMPTS: u32 = 3;

/// Minimal HAL client for the broker API. Retries requests up to 3 times with
/// exponential backoff on server errors and network failures; client errors are not
/// retried.
#[derive(Debug, Clone)]
pub struct HALClient {
  /// Base URL of the broker
  pub url: String,
  auth: Option<HttpAuth>,
  client: reqwest::Client
}

impl HALClient {
  /// Creates a new client for the given broker URL
  pub fn with_url(url: &str, auth: Option<HttpAuth>) -> HALClient {
    HALClient {
      url: url.trim_end_matches('/').to_string(),
      auth,
      client: reqwest::Client::new()
    }
  }

  fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &self.auth {
      Some(HttpAuth::User(username, password)) => request.basic_auth(username, password.clone()),
      Some(HttpAuth::Token(token)) => request.bearer_auth(token),
      None => request
    }
  }

  async fn with_retries<F>(&self, request_fn: F) -> Result<reqwest::Response, PactBrokerError>
    where F: Fn() -> reqwest::RequestBuilder
  {
    let mut attempt = 1;
    loop {
      let result = self.with_auth(request_fn()).send().await;
      match result {
        Ok(response) => {
          let status = response.status();
          if status.is_server_error() && attempt < RETRY_ATTEMPTS {
            warn!("Request to pact broker failed with status {}, retrying (attempt {})", status, attempt);
          } else {
            return Ok(response);
          }
        },
        Err(err) => {
          if attempt >= RETRY_ATTEMPTS {
            return Err(PactBrokerError::IoError(format!("{}", err)));
          }
          warn!("Request to pact broker failed, retrying (attempt {}): {}", attempt, err);
        }
      }
      tokio::time::sleep(Duration::from_millis(100 * 2_u64.pow(attempt))).await;
      attempt += 1;
    }
  }

  async fn response_to_json(&self, response: reqwest::Response, context: &str) -> Result<Value, PactBrokerError> {
    let status = response.status();
    if status.is_success() {
      response.json().await
        .map_err(|err| PactBrokerError::ContentError(
          format!("Failed to parse the response from '{}' as JSON - {}", context, err)))
    } else if status.as_u16() == 404 {
      Err(PactBrokerError::NotFound(
        format!("Request to pact broker path '{}' failed: {}", context, status)))
    } else {
      Err(PactBrokerError::IoError(
        format!("Request to pact broker path '{}' failed: {}", context, status)))
    }
  }

  /// Fetches the JSON resource at the given URL
  pub async fn fetch_json(&self, url: &str) -> Result<Value, PactBrokerError> {
    debug!("Fetching path '{}' from pact broker", url);
    let url = url.to_string();
    let response = self.with_retries(|| self.client.get(&url)
      .header("Accept", "application/hal+json, application/json")).await?;
    self.response_to_json(response, &url).await
  }

  /// Posts a JSON document to the given URL
  pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, PactBrokerError> {
    debug!("Posting to path '{}' on pact broker", url);
    let url = url.to_string();
    let body = body.to_string();
    let response = self.with_retries(|| self.client.post(&url)
      .header("Accept", "application/hal+json, application/json")
      .header("Content-Type", "application/json")
      .body(body.clone())).await?;
    self.response_to_json(response, &url).await
  }

  /// Puts a JSON document to the given URL
  pub async fn put_json(&self, url: &str, body: &Value) -> Result<Value, PactBrokerError> {
    debug!("Putting to path '{}' on pact broker", url);
    let url = url.to_string();
    let body = body.to_string();
    let response = self.with_retries(|| self.client.put(&url)
      .header("Accept", "application/hal+json, application/json")
      .header("Content-Type", "application/json")
      .body(body.clone())).await?;
    self.response_to_json(response, &url).await
  }

  /// Expands a templated link with the given values and resolves it against the
  /// broker base URL
  pub fn parse_link_url(&self, link: &Link, values: &HashMap<String, String>) -> Result<String, PactBrokerError> {
    match &link.href {
      Some(href) => {
        let expanded = if link.templated {
          expand_template(href, values)
        } else {
          href.clone()
        };
        if expanded.starts_with("http://") || expanded.starts_with("https://") {
          Ok(expanded)
        } else {
          Ok(format!("{}{}", self.url, expanded))
        }
      },
      None => Err(PactBrokerError::LinkError(
        format!("Link '{}' does not have a href attribute. URL: '{}'", link.name, self.url)))
    }
  }

  /// Navigates from the broker index to the given relation, returning the resolved
  /// resource
  pub async fn navigate(&self, relation: &str, values: &HashMap<String, String>) -> Result<(Value, String), PactBrokerError> {
    let index = self.fetch_json(&self.url).await?;
    let link = links_from_json(&index).iter()
      .find(|link| link.name == relation)
      .cloned()
      .ok_or_else(|| PactBrokerError::LinkError(
        format!("The pact broker index has no '{}' relation. URL: '{}'", relation, self.url)))?;
    let url = self.parse_link_url(&link, values)?;
    let resource = self.fetch_json(&url).await?;
    Ok((resource, url))
  }
}

// Expand {placeholder} sections of a URL template
fn expand_template(template: &str, values: &HashMap<String, String>) -> String {
  let mut result = template.to_string();
  for (key, value) in values {
    result = result.replace(&format!("{{{}}}", key), &urlencoding::encode(value));
  }
  result
}

/// Fetches all the pacts for the provider using the "pacts for verification"
/// endpoint, with consumer version selectors, pending and WIP configuration
pub async fn fetch_pacts_for_verification(
  broker_url: &str,
  provider_name: &str,
  auth: Option<HttpAuth>,
  request: PactsForVerificationRequest
) -> Result<Vec<Result<FetchedPact, PactBrokerError>>, PactBrokerError> {
  trace!("fetch_pacts_for_verification(broker_url='{}', provider_name='{}', request={:?})",
    broker_url, provider_name, request);
  let client = HALClient::with_url(broker_url, auth);
  let template_values = maplit::hashmap!{ "provider".to_string() => provider_name.to_string() };

  let (resource, url) = client.navigate("pb:provider-pacts-for-verification", &template_values).await
    .map_err(|err| match err {
      PactBrokerError::LinkError(_) | PactBrokerError::NotFound(_) => PactBrokerError::NotFound(
        format!("No pacts for provider '{}' were found in the pact broker. URL: '{}'",
          provider_name, broker_url)),
      _ => err
    })?;

  // the navigation target is the verification endpoint itself; POST the selectors
  let self_url = links_from_json(&resource).iter()
    .find(|link| link.name == "self")
    .and_then(|link| link.href.clone())
    .unwrap_or(url);
  let request_body = serde_json::to_value(&request)
    .map_err(|err| PactBrokerError::ContentError(format!("Failed to serialise the request - {}", err)))?;
  let response = client.post_json(&self_url, &request_body).await?;

  let pacts = match response.pointer("/_embedded/pacts") {
    Some(Value::Array(pacts)) => pacts.clone(),
    _ => vec![]
  };
  if pacts.is_empty() {
    return Err(PactBrokerError::NotFound(
      format!("No pacts were found for provider '{}'", provider_name)));
  }

  let mut results = vec![];
  for pact_entry in pacts {
    let context = PactVerificationContext {
      pending: pact_entry.pointer("/verificationProperties/pending")
        .and_then(Value::as_bool)
        .unwrap_or(false),
      notices: match pact_entry.pointer("/verificationProperties/notices") {
        Some(Value::Array(notices)) => notices.iter()
          .filter_map(|notice| notice.get("text").map(|text| pact_models::json_utils::json_to_string(text)))
          .collect(),
        _ => vec![]
      }
    };
    let link = pact_entry.pointer("/_links/self")
      .map(|link| Link::from_json("self", link));
    match link.and_then(|link| link.href) {
      Some(href) => {
        let result = client.fetch_json(&href).await
          .and_then(|pact_json| {
            let links = links_from_json(&pact_json);
            load_pact_from_json(&href, &pact_json)
              .map(|pact| FetchedPact {
                pact,
                url: href.clone(),
                links,
                context: context.clone()
              })
              .map_err(|err| PactBrokerError::ContentError(format!("{}", err)))
          });
        results.push(result);
      },
      None => results.push(Err(PactBrokerError::LinkError(
        format!("Expected a HAL+JSON response from the pact broker, but got a pact with no self link. URL: '{}'",
          broker_url))))
    }
  }

  Ok(results)
}

/// Fetches a single pact from a URL, returning it with any HAL links found
pub async fn fetch_pact_from_url(url: &str, auth: &Option<HttpAuth>) -> anyhow::Result<FetchedPact> {
  let url = url.to_string();
  let auth = auth.clone();
  let (url, pact_json) = tokio::task::spawn_blocking(move || {
    pact_models::http_utils::fetch_json_from_url(&url, &auth)
  }).await??;
  let pact = load_pact_from_json(&url, &pact_json)?;
  let links = links_from_json(&pact_json);
  Ok(FetchedPact {
    pact,
    url,
    links,
    context: PactVerificationContext::default()
  })
}

/// The result of a verification, as published to the broker
#[derive(Debug, Clone)]
pub struct VerificationResultPayload {
  /// If the verification passed
  pub success: bool,
  /// The provider application version (required for publishing)
  pub provider_version: String,
  /// URL of the build that ran the verification
  pub build_url: Option<String>,
  /// Descriptions of any failures, keyed by interaction id
  pub failures: HashMap<String, Vec<String>>
}

/// Publishes verification results to the "pb:publish-verification-results" relation
/// of the pact's links
pub async fn publish_verification_results(
  broker_url: &str,
  auth: Option<HttpAuth>,
  links: &[Link],
  result: VerificationResultPayload
) -> Result<Value, PactBrokerError> {
  let client = HALClient::with_url(broker_url, auth);
  let publish_link = links.iter()
    .find(|link| link.name.to_ascii_lowercase() == "pb:publish-verification-results")
    .ok_or_else(|| PactBrokerError::LinkError(
      "Response from the pact broker has no 'pb:publish-verification-results' link".into()))?;
  let url = client.parse_link_url(publish_link, &HashMap::default())?;

  let mut body = json!({
    "success": result.success,
    "providerApplicationVersion": result.provider_version,
    "verifiedBy": {
      "implementation": "pact-python",
      "version": env!("CARGO_PKG_VERSION")
    }
  });
  if let Some(build_url) = &result.build_url {
    body["buildUrl"] = json!(build_url);
  }
  if !result.failures.is_empty() {
    body["testResults"] = Value::Array(result.failures.iter()
      .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b))
      .map(|(interaction_id, mismatches)| json!({
        "interactionId": interaction_id,
        "success": false,
        "mismatches": mismatches
      }))
      .collect());
  }

  client.post_json(&url, &body).await
}

/// Publishes (uploads) pact files to the broker, tagging the consumer version.
/// Uploads use PUT and are idempotent.
pub async fn publish_pacts(
  broker_url: &str,
  auth: Option<HttpAuth>,
  pacts: &[Pact],
  consumer_version: &str,
  branch: Option<String>,
  tags: Vec<String>
) -> anyhow::Result<()> {
  let client = HALClient::with_url(broker_url, auth);

  for pact in pacts {
    let url = format!("{}/pacts/provider/{}/consumer/{}/version/{}",
      client.url,
      urlencoding::encode(&pact.provider.name),
      urlencoding::encode(&pact.consumer.name),
      urlencoding::encode(consumer_version));
    let pact_json = pact.to_json(pact.specification_version)?;
    client.put_json(&url, &pact_json).await
      .map_err(|err| anyhow!("Failed to publish pact for consumer '{}' - {}", pact.consumer.name, err))?;

    for tag in &tags {
      let tag_url = format!("{}/pacticipants/{}/versions/{}/tags/{}",
        client.url,
        urlencoding::encode(&pact.consumer.name),
        urlencoding::encode(consumer_version),
        urlencoding::encode(tag));
      client.put_json(&tag_url, &json!({})).await
        .map_err(|err| anyhow!("Failed to tag consumer version '{}' - {}", consumer_version, err))?;
    }

    if let Some(branch) = &branch {
      let branch_url = format!("{}/pacticipants/{}/branches/{}/versions/{}",
        client.url,
        urlencoding::encode(&pact.consumer.name),
        urlencoding::encode(branch),
        urlencoding::encode(consumer_version));
      client.put_json(&branch_url, &json!({})).await
        .map_err(|err| anyhow!("Failed to record consumer branch '{}' - {}", branch, err))?;
    }
  }

  Ok(())
}

/// Generates a Basic auth header value, used in tests and diagnostics
pub fn basic_auth_header(username: &str, password: &str) -> String {
  format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)))
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use super::*;

  #[test]
  fn link_from_json() {
    let link = Link::from_json("pb:latest", &json!({
      "href": "http://broker/pacts/latest", "templated": false
    }));
    expect!(link.href).to(be_some().value("http://broker/pacts/latest".to_string()));
    expect!(link.templated).to(be_false());
  }

  #[test]
  fn links_from_json_extracts_all_links() {
    let json = json!({
      "_links": {
        "self": { "href": "http://broker/" },
        "pb:publish-verification-results": { "href": "http://broker/publish", "templated": true }
      }
    });
    let links = links_from_json(&json);
    expect!(links.len()).to(be_equal_to(2));
  }

  #[test]
  fn expand_template_replaces_placeholders() {
    let values = hashmap!{ "provider".to_string() => "User Service".to_string() };
    expect!(expand_template("/pacts/provider/{provider}/for-verification", &values))
      .to(be_equal_to("/pacts/provider/User%20Service/for-verification"));
  }

  #[test]
  fn parse_link_url_resolves_relative_links() {
    let client = HALClient::with_url("http://broker", None);
    let link = Link {
      name: "self".to_string(),
      href: Some("/pacts/latest".to_string()),
      templated: false
    };
    expect!(client.parse_link_url(&link, &hashmap!{}).unwrap())
      .to(be_equal_to("http://broker/pacts/latest".to_string()));
  }

  #[test]
  fn consumer_version_selector_serialisation() {
    let selector = ConsumerVersionSelector {
      tag: Some("prod".to_string()),
      latest: Some(true),
      .. ConsumerVersionSelector::default()
    };
    expect!(serde_json::to_value(&selector).unwrap())
      .to(be_equal_to(json!({"tag": "prod", "latest": true})));
  }

  #[test]
  fn pacts_for_verification_request_serialisation() {
    let request = PactsForVerificationRequest {
      provider_version_tags: vec!["main".to_string()],
      include_pending_status: true,
      include_wip_pacts_since: Some("2023-01-01".to_string()),
      consumer_version_selectors: vec![ ConsumerVersionSelector {
        branch: Some("main".to_string()),
        .. ConsumerVersionSelector::default()
      } ],
      .. PactsForVerificationRequest::default()
    };
    let json = serde_json::to_value(&request).unwrap();
    expect!(&json["providerVersionTags"]).to(be_equal_to(&json!(["main"])));
    expect!(&json["includePendingStatus"]).to(be_equal_to(&json!(true)));
    expect!(&json["includeWipPactsSince"]).to(be_equal_to(&json!("2023-01-01")));
    expect!(&json["consumerVersionSelectors"]).to(be_equal_to(&json!([{"branch": "main"}])));
  }

  #[test]
  fn basic_auth_header_encodes_credentials() {
    expect!(basic_auth_header("user", "pass")).to(be_equal_to("Basic dXNlcjpwYXNz"));
  }
}

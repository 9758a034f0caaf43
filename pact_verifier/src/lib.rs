//! The `pact_verifier` crate provides the core logic for verifying providers against
//! the pacts recorded by their consumers: pacts are loaded from files, directories,
//! URLs or a Pact Broker, each interaction is replayed against the provider with the
//! declared provider states set up, and the actual responses are compared to the
//! expectations with the matching engine.

#![warn(missing_docs)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use ansi_term::Colour::{Green, Red, Yellow};
use futures::StreamExt;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use pact_matching::generators::generate_request;
use pact_models::generators::{GeneratorContext, GeneratorTestMode};
use pact_models::http_utils::HttpAuth;
use pact_models::pact::{load_pact_from_json, read_pact};
use pact_models::provider_states::ProviderState;
use pact_models::v4::interaction::Interaction;
use pact_models::v4::synch_http::SynchronousHttp;

use crate::callback_executors::{MessageProducer, StateAction, StateHandler};
use crate::pact_broker::{
  fetch_pact_from_url,
  fetch_pacts_for_verification,
  FetchedPact,
  HALClient,
  PactsForVerificationRequest,
  publish_verification_results,
  VerificationResultPayload
};
pub use crate::pact_broker::ConsumerVersionSelector;
use crate::provider_client::make_provider_request;
use crate::verification_result::{
  InteractionResult,
  InteractionStatus,
  PactVerificationResult,
  VerificationError,
  VerificationReport
};

pub mod callback_executors;
pub mod pact_broker;
pub mod provider_client;
pub mod selectors;
pub mod state_relay;
pub mod verification_result;
mod messages;

/// Source for loading pacts
#[derive(Debug, Clone)]
pub enum PactSource {
  /// Load the pact from a pact file
  File(String),
  /// Load all the pacts from a directory (recursive, `*.json`)
  Dir(String),
  /// Load the pact from a URL
  URL(String, Option<HttpAuth>),
  /// Load pacts from a Pact Broker with the "pacts for verification" endpoint
  Broker {
    /// Base URL of the broker
    url: String,
    /// HTTP authentication to use
    auth: Option<HttpAuth>,
    /// Allow pending pacts to be verified without failing the overall task
    enable_pending: bool,
    /// Include work-in-progress pacts created after this date
    include_wip_pacts_since: Option<String>,
    /// Provider tags used in pending status calculation
    provider_tags: Vec<String>,
    /// Provider branch used when publishing results
    provider_branch: Option<String>,
    /// Selectors that identify which pacts to verify
    selectors: Vec<ConsumerVersionSelector>
  },
  /// Load the pact from a JSON string (used for testing)
  String(String)
}

/// Information about the provider to verify
#[derive(Debug, Clone)]
pub struct ProviderInfo {
  /// Provider name
  pub name: String,
  /// Scheme to use, defaults to HTTP
  pub scheme: String,
  /// Hostname of the provider
  pub host: String,
  /// Port the provider is running on
  pub port: Option<u16>,
  /// Base path prefix for the provider
  pub path: String
}

impl ProviderInfo {
  /// The base URL for the provider transport
  pub fn base_url(&self) -> String {
    match self.port {
      Some(port) => format!("{}://{}:{}{}", self.scheme, self.host, port, self.path),
      None => format!("{}://{}{}", self.scheme, self.host, self.path)
    }
  }
}

impl Default for ProviderInfo {
  fn default() -> ProviderInfo {
    ProviderInfo {
      name: "provider".to_string(),
      scheme: "http".to_string(),
      host: "localhost".to_string(),
      port: Some(8080),
      path: String::default()
    }
  }
}

/// Filters applied to the interactions before verification
#[derive(Debug, Clone, Default)]
pub struct FilterInfo {
  /// Regex the interaction description must match
  pub description: Option<String>,
  /// Regex one of the provider state names must match
  pub state: Option<String>,
  /// Allowlist of consumer names; empty means all consumers
  pub consumers: Vec<String>
}

/// Configuration for publishing verification results to the broker
#[derive(Debug, Clone)]
pub struct PublishOptions {
  /// Provider version to publish the results with (required)
  pub provider_version: String,
  /// URL of the build that ran the verification
  pub build_url: Option<String>,
  /// Tags to apply to the provider version
  pub provider_tags: Vec<String>,
  /// Branch of the provider version
  pub provider_branch: Option<String>
}

/// Errors raised for invalid verifier configuration or engine failures. All other
/// conditions are reported in the verification report.
#[derive(Error, Debug)]
pub enum VerifierError {
  /// The configuration is invalid
  #[error("Configuration error: {0}")]
  Config(String),
  /// An engine invariant was violated
  #[error("Fatal error: {0}")]
  Fatal(String)
}

/// The verifier: loads pacts, replays each interaction against the provider and
/// aggregates the results. All the inputs are settable with the fluent methods.
pub struct Verifier {
  provider: ProviderInfo,
  sources: Vec<PactSource>,
  filter: FilterInfo,
  custom_headers: HashMap<String, String>,
  state_handler: StateHandler,
  message_producer: MessageProducer,
  publish: Option<PublishOptions>,
  request_timeout: Duration,
  parallel_pacts: bool,
  coloured_output: bool,
  cancelled: Arc<AtomicBool>
}

impl Verifier {
  /// Creates a new verifier for the named provider
  pub fn new<N: Into<String>>(provider_name: N) -> Verifier {
    Verifier {
      provider: ProviderInfo {
        name: provider_name.into(),
        .. ProviderInfo::default()
      },
      sources: vec![],
      filter: FilterInfo::default(),
      custom_headers: HashMap::default(),
      state_handler: StateHandler::None,
      message_producer: MessageProducer::None,
      publish: None,
      request_timeout: Duration::from_secs(30),
      parallel_pacts: false,
      coloured_output: false,
      cancelled: Arc::new(AtomicBool::new(false))
    }
  }

  /// Sets the HTTP transport details of the provider
  pub fn provider_base_url(mut self, scheme: &str, host: &str, port: Option<u16>, path: &str) -> Self {
    self.provider.scheme = scheme.to_string();
    self.provider.host = host.to_string();
    self.provider.port = port;
    self.provider.path = path.to_string();
    self
  }

  /// Adds a pact source to verify
  pub fn add_source(mut self, source: PactSource) -> Self {
    self.sources.push(source);
    self
  }

  /// Sets the interaction filters
  pub fn filter(mut self, filter: FilterInfo) -> Self {
    self.filter = filter;
    self
  }

  /// Adds a custom header applied to every HTTP request replayed against the provider
  pub fn custom_header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
    self.custom_headers.insert(name.into(), value.into());
    self
  }

  /// Sets the provider state handler
  pub fn state_handler(mut self, handler: StateHandler) -> Self {
    self.state_handler = handler;
    self
  }

  /// Sets the message producer for message interactions
  pub fn message_producer(mut self, producer: MessageProducer) -> Self {
    self.message_producer = producer;
    self
  }

  /// Configures publishing the verification results to the broker
  pub fn publish_results(mut self, publish: PublishOptions) -> Self {
    self.publish = Some(publish);
    self
  }

  /// Sets the timeout applied to each HTTP call to the provider
  pub fn request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  /// Enables pact-level parallelism. Interactions within a pact are never verified
  /// in parallel, because the provider state setup is shared.
  pub fn parallel_pacts(mut self, parallel: bool) -> Self {
    self.parallel_pacts = parallel;
    self
  }

  /// Enables ANSI coloured console output
  pub fn coloured_output(mut self, coloured: bool) -> Self {
    self.coloured_output = coloured;
    self
  }

  /// A handle that can be used to cancel the verification run. Cancellation aborts
  /// at the next interaction boundary.
  pub fn cancel_handle(&self) -> Arc<AtomicBool> {
    self.cancelled.clone()
  }

  /// Starts a state relay bound to this verifier's handlers, for providers running
  /// out of process that dispatch state changes and message production over HTTP
  pub async fn start_state_relay(&self) -> anyhow::Result<state_relay::StateRelay> {
    state_relay::StateRelay::start(self.state_handler.clone(), self.message_producer.clone()).await
  }

  /// Runs the verification, returning the aggregated report. Raises an error only
  /// for invalid configuration; source and interaction failures are captured in the
  /// report.
  pub async fn execute(&self) -> Result<VerificationReport, VerifierError> {
    if self.provider.name.is_empty() {
      return Err(VerifierError::Config("The provider name can not be empty".to_string()));
    }
    if let Some(publish) = &self.publish {
      if publish.provider_version.is_empty() {
        return Err(VerifierError::Config(
          "A provider version is required to publish verification results".to_string()));
      }
    }
    let filter = CompiledFilter::new(&self.filter)
      .map_err(|err| VerifierError::Config(err))?;

    let client = reqwest::Client::builder()
      .timeout(self.request_timeout)
      .build()
      .map_err(|err| VerifierError::Fatal(format!("Failed to build the HTTP client - {}", err)))?;

    let mut report = VerificationReport::default();
    let mut loaded: Vec<(FetchedPact, bool)> = vec![];
    for source in &self.sources {
      match self.load_source(source).await {
        Ok(pacts) => {
          let pending_source = matches!(source, PactSource::Broker { enable_pending: true, .. });
          loaded.extend(pacts.into_iter().map(|pact| (pact, pending_source)));
        },
        Err(err) => {
          warn!("Failed to load pact source {:?} - {}", source, err);
          report.source_errors.push(format!("{}", err));
        }
      }
    }

    let filtered: Vec<(FetchedPact, bool)> = loaded.into_iter()
      .filter(|(fetched, _)| filter.consumer_matches(&fetched.pact.consumer.name))
      .collect();

    let verified: Vec<(FetchedPact, PactVerificationResult)> = if self.parallel_pacts {
      futures::stream::iter(filtered)
        .map(|(fetched, pending_allowed)| {
          let client = client.clone();
          let filter = filter.clone();
          async move {
            let result = self.verify_pact(&fetched, pending_allowed, &filter, &client).await;
            (fetched, result)
          }
        })
        .buffered(4)
        .collect()
        .await
    } else {
      let mut verified = vec![];
      for (fetched, pending_allowed) in filtered {
        let result = self.verify_pact(&fetched, pending_allowed, &filter, &client).await;
        verified.push((fetched, result));
      }
      verified
    };

    if let Some(publish) = &self.publish {
      self.publish_to_broker(&verified, publish).await;
    }
    report.pacts.extend(verified.into_iter().map(|(_, result)| result));

    Ok(report)
  }

  /// Runs the verification, returning the report on success and an error if any
  /// non-pending interaction failed
  pub async fn verify(&self) -> anyhow::Result<VerificationReport> {
    let report = self.execute().await?;
    if report.passed() {
      Ok(report)
    } else {
      let all = report.all_results();
      Err(VerificationError {
        failures: all.iter().filter(|result| result.fails_the_run()).count(),
        total: all.len()
      }.into())
    }
  }

  async fn load_source(&self, source: &PactSource) -> anyhow::Result<Vec<FetchedPact>> {
    match source {
      PactSource::File(file) => {
        let pact = read_pact(Path::new(file))?;
        Ok(vec![ FetchedPact {
          pact,
          url: file.clone(),
          links: vec![],
          context: Default::default()
        } ])
      },
      PactSource::Dir(dir) => {
        let mut pacts = vec![];
        load_pacts_from_dir(Path::new(dir), &mut pacts)?;
        Ok(pacts)
      },
      PactSource::URL(url, auth) => Ok(vec![ fetch_pact_from_url(url, auth).await? ]),
      PactSource::Broker { url, auth, enable_pending, include_wip_pacts_since, provider_tags,
        provider_branch, selectors } => {
        let request = PactsForVerificationRequest {
          provider_version_tags: provider_tags.clone(),
          provider_version_branch: provider_branch.clone(),
          include_pending_status: *enable_pending,
          include_wip_pacts_since: include_wip_pacts_since.clone(),
          consumer_version_selectors: selectors.clone()
        };
        let results = fetch_pacts_for_verification(url, &self.provider.name, auth.clone(), request).await?;
        let mut pacts = vec![];
        for result in results {
          pacts.push(result?);
        }
        Ok(pacts)
      },
      PactSource::String(json) => {
        let pact_json: Value = serde_json::from_str(json)?;
        let pact = load_pact_from_json("<string>", &pact_json)?;
        Ok(vec![ FetchedPact {
          pact,
          url: "<string>".to_string(),
          links: vec![],
          context: Default::default()
        } ])
      }
    }
  }

  async fn verify_pact(
    &self,
    fetched: &FetchedPact,
    pending_allowed: bool,
    filter: &CompiledFilter,
    client: &reqwest::Client
  ) -> PactVerificationResult {
    info!("Verifying a pact between {} and {}", fetched.pact.consumer.name, self.provider.name);
    let mut result = PactVerificationResult {
      source: fetched.url.clone(),
      consumer: fetched.pact.consumer.name.clone(),
      results: vec![]
    };

    for interaction in &fetched.pact.interactions {
      if self.cancelled.load(Ordering::SeqCst) {
        warn!("Verification cancelled, aborting at the interaction boundary");
        break;
      }
      if !filter.interaction_matches(interaction) {
        debug!("Filtering out interaction '{}'", interaction.description());
        continue;
      }
      let pending = interaction.pending() || (pending_allowed && fetched.context.pending);
      let interaction_result = self.verify_interaction(interaction, pending, client).await;
      self.display_result(&interaction_result);
      result.results.push(interaction_result);
    }

    result
  }

  async fn verify_interaction(
    &self,
    interaction: &Interaction,
    pending: bool,
    client: &reqwest::Client
  ) -> InteractionResult {
    let start = Instant::now();
    info!("Verifying interaction '{}'", interaction.description());

    // provider state setup strictly precedes dispatch
    let mut state_values: HashMap<String, Value> = HashMap::default();
    let mut error = None;
    for state in interaction.provider_states() {
      match self.state_handler.call(state, StateAction::Setup, client).await {
        Ok(values) => state_values.extend(values),
        Err(err) => {
          error = Some(format!("Provider state setup for '{}' failed: {}", state.name, err));
          break;
        }
      }
    }

    let mismatches = if error.is_none() {
      match interaction {
        Interaction::SynchronousHttp(http) => {
          match self.replay_http_interaction(http, &state_values, client).await {
            Ok(mismatches) => mismatches,
            Err(err) => {
              error = Some(err);
              vec![]
            }
          }
        },
        Interaction::AsynchronousMessage(message) => {
          match messages::verify_message(message, &self.message_producer, client).await {
            Ok(mismatches) => mismatches,
            Err(err) => {
              error = Some(err);
              vec![]
            }
          }
        },
        Interaction::SynchronousMessage(message) => {
          match messages::verify_sync_message(message, &self.message_producer, client).await {
            Ok(mismatches) => mismatches,
            Err(err) => {
              error = Some(err);
              vec![]
            }
          }
        }
      }
    } else {
      vec![]
    };

    // teardown is attempted even when the dispatch failed
    if self.state_handler.teardown_enabled() {
      for state in interaction.provider_states() {
        if let Err(err) = self.state_handler.call(state, StateAction::Teardown, client).await {
          warn!("Provider state teardown for '{}' failed: {}", state.name, err);
        }
      }
    }

    let failed = error.is_some() || !mismatches.is_empty();
    let status = match (failed, pending) {
      (false, _) => InteractionStatus::Pass,
      (true, true) => InteractionStatus::PendingFail,
      (true, false) => InteractionStatus::Fail
    };

    InteractionResult {
      description: interaction.description().to_string(),
      interaction_id: interaction.id(),
      status,
      mismatches,
      error,
      duration: start.elapsed(),
      pending
    }
  }

  async fn replay_http_interaction(
    &self,
    interaction: &SynchronousHttp,
    state_values: &HashMap<String, Value>,
    client: &reqwest::Client
  ) -> Result<Vec<pact_matching::Mismatch>, String> {
    let mut ctx = GeneratorContext::new_random()
      .with_state_params(state_values.clone());
    let request = generate_request(&interaction.request, &GeneratorTestMode::Provider, &mut ctx);

    match make_provider_request(&self.provider, &request, &self.custom_headers, client).await {
      Ok(actual_response) =>
        Ok(pact_matching::match_response(&interaction.response, &actual_response)),
      Err(err) => Err(format!("Request to the provider failed: {}", err))
    }
  }

  fn display_result(&self, result: &InteractionResult) {
    let status = if self.coloured_output {
      match result.status {
        InteractionStatus::Pass => Green.paint("OK").to_string(),
        InteractionStatus::Fail => Red.paint("FAILED").to_string(),
        InteractionStatus::PendingFail => Yellow.paint("FAILED (pending)").to_string()
      }
    } else {
      result.status.to_string()
    };
    println!("  {} ({}) {}", result.description,
      humantime::format_duration(Duration::from_millis(result.duration.as_millis() as u64)), status);
    for mismatch in &result.mismatches {
      println!("    {}", mismatch.description());
      if let pact_matching::Mismatch::BodyMismatch { expected: Some(expected), actual: Some(actual), .. } = mismatch {
        let expected = String::from_utf8_lossy(expected);
        let actual = String::from_utf8_lossy(actual);
        let diff = difference::Changeset::new(&expected, &actual, "\n");
        println!("{}", diff);
      }
    }
    if let Some(error) = &result.error {
      println!("    {}", error);
    }
  }

  // Publication needs the broker links fetched with each pact, so it only applies to
  // pacts that came from a broker source
  async fn publish_to_broker(&self, verified: &[(FetchedPact, PactVerificationResult)], publish: &PublishOptions) {
    let broker = self.sources.iter().find_map(|source| match source {
      PactSource::Broker { url, auth, .. } => Some((url.clone(), auth.clone())),
      _ => None
    });
    let (broker_url, auth) = match broker {
      Some(broker) => broker,
      None => {
        warn!("Publishing verification results requires a broker pact source, skipping");
        return;
      }
    };

    for (fetched, pact_result) in verified {
      if fetched.links.is_empty() {
        debug!("Pact from '{}' has no broker links, not publishing results for it", fetched.url);
        continue;
      }
      let failures: HashMap<String, Vec<String>> = pact_result.results.iter()
        .filter(|result| !result.passed())
        .map(|result| (result.interaction_id.clone().unwrap_or_default(),
          result.mismatches.iter().map(|m| m.description()).collect()))
        .collect();
      let payload = VerificationResultPayload {
        success: pact_result.passed(),
        provider_version: publish.provider_version.clone(),
        build_url: publish.build_url.clone(),
        failures
      };
      if let Err(err) = publish_verification_results(&broker_url, auth.clone(), &fetched.links, payload).await {
        warn!("Failed to publish verification results for pact '{}' - {}", pact_result.source, err);
      }
    }

    // record the provider version tags and branch once for the run
    let client = HALClient::with_url(&broker_url, auth);
    for tag in &publish.provider_tags {
      let url = format!("{}/pacticipants/{}/versions/{}/tags/{}", broker_url.trim_end_matches('/'),
        urlencoding::encode(&self.provider.name),
        urlencoding::encode(&publish.provider_version),
        urlencoding::encode(tag));
      if let Err(err) = client.put_json(&url, &serde_json::json!({})).await {
        warn!("Failed to tag the provider version '{}' - {}", publish.provider_version, err);
      }
    }
    if let Some(branch) = &publish.provider_branch {
      let url = format!("{}/pacticipants/{}/branches/{}/versions/{}", broker_url.trim_end_matches('/'),
        urlencoding::encode(&self.provider.name),
        urlencoding::encode(branch),
        urlencoding::encode(&publish.provider_version));
      if let Err(err) = client.put_json(&url, &serde_json::json!({})).await {
        warn!("Failed to record the provider branch '{}' - {}", branch, err);
      }
    }
  }
}

fn load_pacts_from_dir(dir: &Path, pacts: &mut Vec<FetchedPact>) -> anyhow::Result<()> {
  for entry in fs::read_dir(dir)? {
    let path = entry?.path();
    if path.is_dir() {
      load_pacts_from_dir(&path, pacts)?;
    } else if path.extension().map(|ext| ext == "json").unwrap_or(false) {
      let pact = read_pact(&path)?;
      pacts.push(FetchedPact {
        pact,
        url: path.to_string_lossy().to_string(),
        links: vec![],
        context: Default::default()
      });
    }
  }
  Ok(())
}

#[derive(Debug, Clone)]
struct CompiledFilter {
  description: Option<Regex>,
  state: Option<Regex>,
  consumers: Vec<String>
}

impl CompiledFilter {
  fn new(filter: &FilterInfo) -> Result<CompiledFilter, String> {
    let description = match &filter.description {
      Some(regex) => Some(Regex::new(regex)
        .map_err(|err| format!("'{}' is not a valid description filter - {}", regex, err))?),
      None => None
    };
    let state = match &filter.state {
      Some(regex) => Some(Regex::new(regex)
        .map_err(|err| format!("'{}' is not a valid state filter - {}", regex, err))?),
      None => None
    };
    Ok(CompiledFilter {
      description,
      state,
      consumers: filter.consumers.clone()
    })
  }

  fn consumer_matches(&self, consumer: &str) -> bool {
    self.consumers.is_empty() || self.consumers.iter().any(|name| name == consumer)
  }

  fn interaction_matches(&self, interaction: &Interaction) -> bool {
    let description_matches = self.description.as_ref()
      .map(|regex| regex.is_match(interaction.description()))
      .unwrap_or(true);
    let state_matches = self.state.as_ref()
      .map(|regex| interaction.provider_states().iter()
        .any(|state| regex.is_match(&state.name)))
      .unwrap_or(true);
    description_matches && state_matches
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;

  use super::*;

  #[tokio::test]
  async fn a_run_with_no_sources_yields_an_empty_successful_report() {
    let verifier = Verifier::new("provider");
    let report = verifier.execute().await.unwrap();
    expect!(report.passed()).to(be_true());
    expect!(report.pacts.is_empty()).to(be_true());
  }

  #[tokio::test]
  async fn an_empty_provider_name_is_a_config_error() {
    let verifier = Verifier::new("");
    expect!(verifier.execute().await).to(be_err());
  }

  #[tokio::test]
  async fn an_invalid_filter_regex_is_a_config_error() {
    let verifier = Verifier::new("provider").filter(FilterInfo {
      description: Some("([invalid".to_string()),
      .. FilterInfo::default()
    });
    expect!(verifier.execute().await).to(be_err());
  }

  #[tokio::test]
  async fn publishing_requires_a_provider_version() {
    let verifier = Verifier::new("provider").publish_results(PublishOptions {
      provider_version: String::default(),
      build_url: None,
      provider_tags: vec![],
      provider_branch: None
    });
    expect!(verifier.execute().await).to(be_err());
  }

  #[tokio::test]
  async fn a_missing_pact_file_is_a_source_error_not_a_failure() {
    let verifier = Verifier::new("provider")
      .add_source(PactSource::File("/does/not/exist.json".to_string()));
    let report = verifier.execute().await.unwrap();
    expect!(report.passed()).to(be_true());
    expect!(report.source_errors.len()).to(be_equal_to(1));
  }

  #[test]
  fn filter_matches_on_description_and_state() {
    let filter = CompiledFilter::new(&FilterInfo {
      description: Some("user".to_string()),
      state: Some("exists".to_string()),
      consumers: vec![]
    }).unwrap();

    let matching = Interaction::SynchronousHttp(SynchronousHttp {
      description: "a request for a user".to_string(),
      provider_states: vec![ ProviderState::default("user exists") ],
      .. SynchronousHttp::default()
    });
    expect!(filter.interaction_matches(&matching)).to(be_true());

    let wrong_state = Interaction::SynchronousHttp(SynchronousHttp {
      description: "a request for a user".to_string(),
      provider_states: vec![ ProviderState::default("no users") ],
      .. SynchronousHttp::default()
    });
    expect!(filter.interaction_matches(&wrong_state)).to(be_false());
  }

  #[test]
  fn consumer_allowlist_filters_pacts() {
    let filter = CompiledFilter::new(&FilterInfo {
      consumers: vec!["allowed".to_string()],
      .. FilterInfo::default()
    }).unwrap();
    expect!(filter.consumer_matches("allowed")).to(be_true());
    expect!(filter.consumer_matches("other")).to(be_false());
  }
}

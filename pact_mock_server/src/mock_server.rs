//! This module defines the external interface for controlling one particular instance
//! of a mock server.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use pact_matching::Mismatch;
use pact_models::generators::GeneratorContext;
use pact_models::pact::{write_pact, Pact};
use pact_models::PactSpecification;
use pact_models::v4::http_parts::HttpRequest;
use pact_models::v4::interaction::Interaction;
use pact_models::v4::synch_http::SynchronousHttp;

use crate::hyper_server::{create_and_bind, ServerState};
use crate::matching::MatchResult;

/// Mock server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MockServerConfig {
  /// Host interface to bind to. Defaults to the loopback interface
  pub host: String,
  /// Port to bind to. A value of zero binds an ephemeral port
  pub port: u16,
  /// If CORS pre-flight requests should be responded to
  pub cors_preflight: bool,
  /// Pact specification to use when writing the pact file
  pub pact_specification: PactSpecification,
  /// Seed for the generator PRNG, so a session can be made reproducible. When not
  /// set, the seed is derived from the server id
  pub seed: Option<u64>,
  /// How long to wait for in-flight requests to complete on shutdown
  pub drain_deadline: Duration
}

impl Default for MockServerConfig {
  fn default() -> Self {
    MockServerConfig {
      host: "127.0.0.1".to_string(),
      port: 0,
      cors_preflight: false,
      pact_specification: PactSpecification::V4,
      seed: None,
      drain_deadline: Duration::from_secs(5)
    }
  }
}

/// Metrics collected by the mock server
#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct MockServerMetrics {
  /// Total requests received
  pub requests: usize,
  /// Total requests by path
  pub requests_by_path: HashMap<String, usize>
}

/// The result of a mock server session, produced on shutdown
#[derive(Debug, Clone, PartialEq)]
pub struct MockStatus {
  /// Requests that were matched to an expected interaction
  pub matched: Vec<HttpRequest>,
  /// Expected interactions that were never matched
  pub unmatched: Vec<SynchronousHttp>,
  /// Requests that matched no expected interaction
  pub extra: Vec<HttpRequest>,
  /// All mismatches that occurred
  pub mismatches: Vec<Mismatch>,
  /// Metrics for the session
  pub metrics: MockServerMetrics
}

impl MockStatus {
  /// If every expected interaction was matched and no unexpected traffic was received
  pub fn all_matched(&self) -> bool {
    self.unmatched.is_empty() && self.extra.is_empty() && self.mismatches.is_empty()
  }
}

/// Handle to a running mock server. The server owns a copy of the expected
/// interactions for the lifetime of the session and accumulates the matched and
/// mismatched traffic.
#[derive(Debug)]
pub struct MockServer {
  /// Mock server unique ID
  pub id: String,
  /// Address the mock server is bound to
  pub address: SocketAddr,
  /// Pact that this mock server is serving
  pub pact: Pact,
  /// Mock server config
  pub config: MockServerConfig,
  state: Arc<Mutex<ServerState>>,
  shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
  server_thread: Option<std::thread::JoinHandle<()>>
}

impl MockServer {
  /// Starts the mock server on its own runtime held by a background thread. The
  /// interaction list of the pact is frozen into the server session. Interactions
  /// that are not HTTP are ignored with a warning.
  pub fn start(pact: Pact, config: MockServerConfig) -> anyhow::Result<MockServer> {
    let server_id = Uuid::new_v4().to_string();
    let state = Arc::new(Mutex::new(Self::arm(&server_id, &pact, &config)));

    let runtime = tokio::runtime::Builder::new_multi_thread()
      .worker_threads(8)
      .enable_all()
      .build()?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let (future, socket_addr, shutdown_tx) = runtime.block_on(
      create_and_bind(state.clone(), addr, config.drain_deadline))?;
    state.lock().unwrap().generator_ctx.mock_server_url = Some(format!("http://{}", socket_addr));

    let server_thread = std::thread::spawn(move || {
      runtime.block_on(future);
    });

    debug!("Started mock server {} on {}", server_id, socket_addr);
    Ok(MockServer {
      id: server_id,
      address: socket_addr,
      pact,
      config,
      state,
      shutdown_tx: Some(shutdown_tx),
      server_thread: Some(server_thread)
    })
  }

  /// Spawns the mock server onto the current tokio runtime, returning the handle
  pub async fn create(pact: Pact, config: MockServerConfig) -> anyhow::Result<MockServer> {
    let server_id = Uuid::new_v4().to_string();
    let state = Arc::new(Mutex::new(Self::arm(&server_id, &pact, &config)));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let (future, socket_addr, shutdown_tx) = create_and_bind(
      state.clone(), addr, config.drain_deadline).await?;
    state.lock().unwrap().generator_ctx.mock_server_url = Some(format!("http://{}", socket_addr));
    tokio::spawn(future);

    debug!("Started mock server {} on {}", server_id, socket_addr);
    Ok(MockServer {
      id: server_id,
      address: socket_addr,
      pact,
      config,
      state,
      shutdown_tx: Some(shutdown_tx),
      server_thread: None
    })
  }

  // Freeze the pact's interactions into the session state
  fn arm(server_id: &str, pact: &Pact, config: &MockServerConfig) -> ServerState {
    let interactions = pact.interactions.iter()
      .filter_map(|interaction| match interaction {
        Interaction::SynchronousHttp(http) => Some((http.clone(), false)),
        other => {
          warn!("Ignoring non-HTTP interaction '{}' ({})", other.description(), other.type_of());
          None
        }
      })
      .collect();
    let seed = config.seed.unwrap_or_else(|| {
      let mut hasher = std::collections::hash_map::DefaultHasher::new();
      server_id.hash(&mut hasher);
      hasher.finish()
    });
    ServerState {
      interactions,
      matches: vec![],
      generator_ctx: GeneratorContext::new(seed),
      metrics: MockServerMetrics::default(),
      cors_preflight: config.cors_preflight
    }
  }

  /// The base URL of the running mock server
  pub fn url(&self) -> String {
    if self.address.ip().is_unspecified() {
      format!("http://{}:{}", Ipv4Addr::LOCALHOST, self.address.port())
    } else {
      format!("http://{}", self.address)
    }
  }

  /// The port the mock server is bound to
  pub fn port(&self) -> u16 {
    self.address.port()
  }

  /// All match results collected so far
  pub fn matches(&self) -> Vec<MatchResult> {
    self.state.lock().unwrap().matches.clone()
  }

  /// Computes the status of the session: matched requests, interactions that were
  /// never matched, unexpected requests and all mismatches
  pub fn status(&self) -> MockStatus {
    let state = self.state.lock().unwrap();

    let mut matched = vec![];
    let mut extra = vec![];
    let mut mismatches = vec![];
    for result in &state.matches {
      match result {
        MatchResult::RequestMatch(_, request) => matched.push(request.clone()),
        MatchResult::RequestMismatch(_, request, request_mismatches) => {
          extra.push(request.clone());
          mismatches.extend(request_mismatches.clone());
        },
        MatchResult::RequestNotFound(request) => {
          extra.push(request.clone());
          mismatches.push(Mismatch::UnexpectedRequest {
            method: request.method.clone(),
            path: request.path.clone(),
            mismatch: "Received a request that matched no expected interaction".to_string()
          });
        },
        MatchResult::MissingRequest(_) => ()
      }
    }

    let unmatched: Vec<SynchronousHttp> = state.interactions.iter()
      .filter(|(_, consumed)| !consumed)
      .map(|(interaction, _)| interaction.clone())
      .collect();
    for interaction in &unmatched {
      mismatches.push(Mismatch::MissingRequest {
        method: interaction.request.method.clone(),
        path: interaction.request.path.clone(),
        description: interaction.description.clone()
      });
    }

    MockStatus {
      matched,
      unmatched,
      extra,
      mismatches,
      metrics: state.metrics.clone()
    }
  }

  /// If every request to the mock server matched and all interactions were consumed
  pub fn all_matched(&self) -> bool {
    self.status().all_matched()
  }

  /// Shuts the mock server down, waiting for in-flight requests up to the drain
  /// deadline, and returns the session status. Idempotent: subsequent calls just
  /// return the status.
  pub fn stop(&mut self) -> MockStatus {
    if let Some(sender) = self.shutdown_tx.take() {
      if sender.send(()).is_err() {
        warn!("Mock server {} already shut down", self.id);
      }
      if let Some(handle) = self.server_thread.take() {
        if handle.join().is_err() {
          warn!("Mock server {} thread panicked", self.id);
        }
      }
      debug!("Mock server {} shutdown - {:?}", self.id, self.status().metrics);
    }
    self.status()
  }

  /// Writes the pact for this session out to the given directory (or the current
  /// directory), merging with any existing pact file
  pub fn write_pact(&self, output_path: Option<&str>, overwrite: bool) -> anyhow::Result<()> {
    trace!("write_pact: output_path = {:?}, overwrite = {}", output_path, overwrite);

    let file_name = self.pact.default_file_name();
    let filename = match output_path {
      Some(path) => {
        let mut path = PathBuf::from(path);
        path.push(file_name);
        path
      },
      None => PathBuf::from(file_name)
    };

    info!("Writing pact out to '{}'", filename.display());
    match write_pact(&self.pact, filename.as_path(), self.config.pact_specification, overwrite) {
      Ok(_) => Ok(()),
      Err(err) => {
        warn!("Failed to write pact to file - {}", err);
        Err(err)
      }
    }
  }

  /// Converts the mock server state to a JSON summary
  pub fn to_json(&self) -> Value {
    json!({
      "id": self.id,
      "port": self.address.port(),
      "address": self.address.to_string(),
      "provider": self.pact.provider.name,
      "status": if self.all_matched() { "ok" } else { "error" },
      "metrics": self.state.lock().unwrap().metrics
    })
  }
}

impl Drop for MockServer {
  fn drop(&mut self) {
    if self.shutdown_tx.is_some() {
      self.stop();
    }
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;

  use super::*;

  #[test]
  fn mock_status_all_matched() {
    let status = MockStatus {
      matched: vec![],
      unmatched: vec![],
      extra: vec![],
      mismatches: vec![],
      metrics: MockServerMetrics::default()
    };
    expect!(status.all_matched()).to(be_true());

    let status = MockStatus {
      unmatched: vec![ SynchronousHttp::default() ],
      .. status
    };
    expect!(status.all_matched()).to(be_false());
  }

  #[test]
  fn config_defaults() {
    let config = MockServerConfig::default();
    expect!(config.host.as_str()).to(be_equal_to("127.0.0.1"));
    expect!(config.port).to(be_equal_to(0));
    expect!(config.pact_specification).to(be_equal_to(PactSpecification::V4));
    expect!(config.drain_deadline).to(be_equal_to(Duration::from_secs(5)));
  }
}

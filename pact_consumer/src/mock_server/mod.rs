//! Scoped handle over a running mock server: the server is validated and the pact is
//! written when the handle is dropped, so a test can not forget to check the result.

use std::env;

use tracing::{debug, warn};
use url::Url;

use pact_mock_server::{MockServer, MockServerConfig, MockStatus};
use pact_models::pact::Pact;

/// A mock server handle that validates the session when it goes out of scope. If any
/// request did not match, or an expected interaction was never received, dropping the
/// handle panics (failing the test). On a clean session the pact file is written to
/// the output directory.
pub struct ValidatingMockServer {
  mock_server: MockServer,
  output_dir: Option<String>,
  done: bool
}

impl ValidatingMockServer {
  /// Starts the mock server for the pact on a background runtime
  pub fn start(pact: Pact, config: MockServerConfig) -> ValidatingMockServer {
    let mock_server = MockServer::start(pact, config)
      .expect("Could not start the mock server");
    ValidatingMockServer {
      mock_server,
      output_dir: env::var("PACT_OUTPUT_DIR").ok().or_else(|| Some("target/pacts".to_string())),
      done: false
    }
  }

  /// Sets the directory the pact file is written to. Defaults to the
  /// `PACT_OUTPUT_DIR` environment variable or `target/pacts`.
  pub fn with_output_dir<D: Into<String>>(mut self, dir: D) -> Self {
    self.output_dir = Some(dir.into());
    self
  }

  /// The base URL of the running mock server
  pub fn url(&self) -> String {
    self.mock_server.url()
  }

  /// A URL for the given path on the mock server
  pub fn path<P: AsRef<str>>(&self, path: P) -> Url {
    let base = Url::parse(&self.mock_server.url()).expect("invalid mock server URL");
    base.join(path.as_ref()).expect("could not join path to mock server URL")
  }

  /// The current status of the session
  pub fn status(&self) -> MockStatus {
    self.mock_server.status()
  }

  /// Stops the server and returns the final status, without panicking. The pact file
  /// is written if the whole session matched.
  pub fn stop(mut self) -> MockStatus {
    self.done = true;
    self.shutdown()
  }

  fn shutdown(&mut self) -> MockStatus {
    let status = self.mock_server.stop();
    if status.all_matched() {
      let output_dir = self.output_dir.clone();
      if let Err(err) = self.mock_server.write_pact(output_dir.as_deref(), false) {
        warn!("Failed to write the pact file - {}", err);
      }
    } else {
      debug!("Not writing the pact file, the session had mismatches");
    }
    status
  }
}

impl Drop for ValidatingMockServer {
  fn drop(&mut self) {
    if !self.done {
      let status = self.shutdown();
      if !status.all_matched() && !std::thread::panicking() {
        let descriptions: Vec<String> = status.mismatches.iter()
          .map(|mismatch| mismatch.description())
          .collect();
        panic!("Mock server session failed verification:\n{}", descriptions.join("\n"));
      }
    }
  }
}

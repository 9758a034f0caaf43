//! Structs for collecting the results of a verification run

use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde_json::{json, Value};

use pact_matching::Mismatch;

/// The status of a verified interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionStatus {
  /// The interaction was verified successfully
  Pass,
  /// The interaction failed verification
  Fail,
  /// The interaction failed verification, but was pending so does not fail the run
  PendingFail
}

impl Display for InteractionStatus {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      InteractionStatus::Pass => write!(f, "pass"),
      InteractionStatus::Fail => write!(f, "fail"),
      InteractionStatus::PendingFail => write!(f, "pending-fail")
    }
  }
}

/// The result of verifying a single interaction
#[derive(Debug, Clone)]
pub struct InteractionResult {
  /// Interaction description
  pub description: String,
  /// Interaction ID, if the pact was fetched from a broker
  pub interaction_id: Option<String>,
  /// Status of the verification
  pub status: InteractionStatus,
  /// Mismatches that occurred
  pub mismatches: Vec<Mismatch>,
  /// Any error that occurred executing the interaction (state handler or transport
  /// failures)
  pub error: Option<String>,
  /// How long the verification took
  pub duration: Duration,
  /// If the interaction was marked as pending
  pub pending: bool
}

impl InteractionResult {
  /// If this interaction passed verification
  pub fn passed(&self) -> bool {
    self.status == InteractionStatus::Pass
  }

  /// If this interaction should fail the overall run: it failed and was not pending
  pub fn fails_the_run(&self) -> bool {
    self.status == InteractionStatus::Fail
  }

  /// Converts this result to its JSON form
  pub fn to_json(&self) -> Value {
    json!({
      "description": self.description,
      "interactionId": self.interaction_id,
      "status": self.status.to_string(),
      "mismatches": self.mismatches.iter().map(Mismatch::to_json).collect::<Vec<Value>>(),
      "error": self.error,
      "durationMs": self.duration.as_millis() as u64,
      "pending": self.pending
    })
  }
}

/// The results of verifying one pact
#[derive(Debug, Clone, Default)]
pub struct PactVerificationResult {
  /// The source the pact was loaded from
  pub source: String,
  /// Consumer name
  pub consumer: String,
  /// Results for the interactions, in verification order
  pub results: Vec<InteractionResult>
}

impl PactVerificationResult {
  /// If all non-pending interactions passed
  pub fn passed(&self) -> bool {
    !self.results.iter().any(InteractionResult::fails_the_run)
  }
}

/// The aggregated report for a verification run
#[derive(Debug, Clone, Default)]
pub struct VerificationReport {
  /// Results per pact, in load order
  pub pacts: Vec<PactVerificationResult>,
  /// Errors loading pact sources. These do not fail the run if other sources loaded
  pub source_errors: Vec<String>
}

impl VerificationReport {
  /// If the run passed: no non-pending interaction failed
  pub fn passed(&self) -> bool {
    self.pacts.iter().all(PactVerificationResult::passed)
  }

  /// All interaction results across all pacts
  pub fn all_results(&self) -> Vec<&InteractionResult> {
    self.pacts.iter().flat_map(|pact| pact.results.iter()).collect()
  }
}

/// Error raised when a verification run has non-pending failures
#[derive(Debug, thiserror::Error)]
#[error("Verification failed: {failures} of {total} interactions failed")]
pub struct VerificationError {
  /// Number of failed non-pending interactions
  pub failures: usize,
  /// Total number of interactions verified
  pub total: usize
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;

  use super::*;

  fn result(status: InteractionStatus) -> InteractionResult {
    InteractionResult {
      description: "interaction".to_string(),
      interaction_id: None,
      status,
      mismatches: vec![],
      error: None,
      duration: Duration::from_millis(10),
      pending: false
    }
  }

  #[test]
  fn report_passes_with_no_results() {
    expect!(VerificationReport::default().passed()).to(be_true());
  }

  #[test]
  fn pending_failures_do_not_fail_the_report() {
    let report = VerificationReport {
      pacts: vec![ PactVerificationResult {
        results: vec![ result(InteractionStatus::Pass), result(InteractionStatus::PendingFail) ],
        .. PactVerificationResult::default()
      } ],
      .. VerificationReport::default()
    };
    expect!(report.passed()).to(be_true());
  }

  #[test]
  fn non_pending_failures_fail_the_report() {
    let report = VerificationReport {
      pacts: vec![ PactVerificationResult {
        results: vec![ result(InteractionStatus::Fail) ],
        .. PactVerificationResult::default()
      } ],
      .. VerificationReport::default()
    };
    expect!(report.passed()).to(be_false());
  }
}

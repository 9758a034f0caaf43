//! Verification of message interactions: the configured producer is invoked and the
//! actual message is compared against the expected contents with the matching engine.

use tracing::{debug, info};

use pact_matching::Mismatch;
use pact_models::v4::async_message::AsynchronousMessage;
use pact_models::v4::sync_message::SynchronousMessage;

use crate::callback_executors::MessageProducer;

/// Verifies an asynchronous message: the producer supplies the actual message for the
/// description, which is matched against the expected contents and metadata
pub async fn verify_message(
  expected: &AsynchronousMessage,
  producer: &MessageProducer,
  client: &reqwest::Client
) -> Result<Vec<Mismatch>, String> {
  info!("Verifying message interaction '{}'", expected.description);
  match producer.produce(&expected.description, &expected.contents.metadata, client).await {
    Ok(actual) => {
      debug!("Message producer returned {}", actual);
      Ok(pact_matching::match_message(expected, &actual))
    },
    Err(err) => Err(format!("Message producer failed: {}", err))
  }
}

/// Verifies a synchronous message: the producer receives the request message and its
/// response is matched against the expected response contents
pub async fn verify_sync_message(
  expected: &SynchronousMessage,
  producer: &MessageProducer,
  client: &reqwest::Client
) -> Result<Vec<Mismatch>, String> {
  info!("Verifying synchronous message interaction '{}'", expected.description);
  match producer.produce(&expected.description, &expected.request.metadata, client).await {
    Ok(actual) => {
      debug!("Message producer returned {}", actual);
      Ok(pact_matching::match_sync_message(expected, &actual))
    },
    Err(err) => Err(format!("Message producer failed: {}", err))
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use pact_models::bodies::OptionalBody;
  use pact_models::v4::message_parts::MessageContents;

  use super::*;

  fn expected_message() -> AsynchronousMessage {
    AsynchronousMessage {
      description: "a user deletion message".to_string(),
      contents: MessageContents {
        contents: OptionalBody::from(&json!({"action": "delete_user", "user_id": "123"})),
        .. MessageContents::default()
      },
      .. AsynchronousMessage::default()
    }
  }

  #[tokio::test]
  async fn passes_when_the_producer_returns_matching_contents() {
    let producer = MessageProducer::Map(hashmap!{
      "a user deletion message".to_string() => MessageContents {
        contents: OptionalBody::from(&json!({"action": "delete_user", "user_id": "123"})),
        .. MessageContents::default()
      }
    });
    let client = reqwest::Client::new();
    let mismatches = verify_message(&expected_message(), &producer, &client).await.unwrap();
    expect!(mismatches.is_empty()).to(be_true());
  }

  #[tokio::test]
  async fn fails_with_a_body_mismatch_when_a_field_differs() {
    let producer = MessageProducer::Map(hashmap!{
      "a user deletion message".to_string() => MessageContents {
        contents: OptionalBody::from(&json!({"action": "create_user", "user_id": "123"})),
        .. MessageContents::default()
      }
    });
    let client = reqwest::Client::new();
    let mismatches = verify_message(&expected_message(), &producer, &client).await.unwrap();
    expect!(mismatches.len()).to(be_equal_to(1));
    match &mismatches[0] {
      Mismatch::BodyMismatch { path, .. } => expect!(path.as_str()).to(be_equal_to("$.action")),
      other => panic!("Expected a BodyMismatch, got {:?}", other)
    };
  }

  #[tokio::test]
  async fn fails_when_no_producer_is_configured() {
    let client = reqwest::Client::new();
    expect!(verify_message(&expected_message(), &MessageProducer::None, &client).await).to(be_err());
  }
}

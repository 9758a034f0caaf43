//! Builder for asynchronous message interactions

use bytes::Bytes;
use maplit::hashmap;
use serde_json::{json, Value};

use pact_models::bodies::OptionalBody;
use pact_models::generators::GeneratorCategory;
use pact_models::matchingrules::Category;
use pact_models::path_exp::DocPath;
use pact_models::provider_states::ProviderState;
use pact_models::v4::async_message::AsynchronousMessage;
use pact_models::v4::message_parts::MessageContents;

use crate::patterns::JsonPattern;

/// Builder for asynchronous message interactions. Normally created via
/// `PactBuilder::message_interaction`.
pub struct MessageInteractionBuilder {
  description: String,
  provider_states: Vec<ProviderState>,
  pending: bool,
  contents: MessageContents
}

impl MessageInteractionBuilder {
  /// Create a new message interaction builder for the given description
  pub fn new<D: Into<String>>(description: D) -> Self {
    MessageInteractionBuilder {
      description: description.into(),
      provider_states: vec![],
      pending: false,
      contents: MessageContents::default()
    }
  }

  /// Specify a provider state for this message. May be called multiple times.
  pub fn given<G: Into<String>>(&mut self, given: G) -> &mut Self {
    self.provider_states.push(ProviderState::default(&given.into()));
    self
  }

  /// Specify a provider state with parameters. The parameters must be a JSON object.
  pub fn given_with_params<G: Into<String>>(&mut self, given: G, params: &Value) -> &mut Self {
    let params = match params {
      Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
      _ => Default::default()
    };
    self.provider_states.push(ProviderState::new(&given.into(), params));
    self
  }

  /// Marks this message as pending
  pub fn pending(&mut self, pending: bool) -> &mut Self {
    self.pending = pending;
    self
  }

  /// Sets the JSON contents of the message, extracting any embedded matchers and
  /// generators
  pub fn json_contents<P: Into<JsonPattern>>(&mut self, pattern: P) -> &mut Self {
    let pattern = pattern.into();

    let mut rules = pact_models::matchingrules::MatchingRuleCategory::empty(Category::BODY);
    let mut generators = hashmap!{};
    pattern.extract(DocPath::root(), &mut rules, &mut generators);

    let category = self.contents.matching_rules.add_category(Category::BODY);
    for (path, rule_list) in rules.rules {
      for rule in rule_list.rules {
        category.add_rule(path.clone(), rule, rule_list.rule_logic);
      }
    }
    for (path, generator) in generators {
      self.contents.generators.add_generator_with_subcategory(&GeneratorCategory::BODY, path, generator);
    }

    let example = pattern.to_example();
    self.contents.contents = OptionalBody::Present(Bytes::from(example.to_string()),
      Some(pact_models::content_types::JSON.clone()));
    self
  }

  /// Adds a metadata entry to the message
  pub fn metadata<N: Into<String>>(&mut self, name: N, value: Value) -> &mut Self {
    self.contents.metadata.insert(name.into(), value);
    self
  }

  /// The message interaction we've built
  pub fn build(&self) -> AsynchronousMessage {
    let mut contents = self.contents.clone();
    if !contents.metadata.contains_key("contentType") {
      if let Some(content_type) = contents.contents.content_type() {
        contents.metadata.insert("contentType".to_string(), json!(content_type.to_string()));
      }
    }
    AsynchronousMessage {
      id: None,
      key: None,
      description: self.description.clone(),
      provider_states: self.provider_states.clone(),
      contents,
      pending: self.pending,
      comments: Default::default()
    }
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use serde_json::json;

  use crate::json_pattern;
  use crate::json_pattern_internal;
  use crate::like;
  use crate::patterns::JsonPattern;

  use super::*;

  #[test]
  fn builds_a_message_with_contents_and_metadata() {
    let mut builder = MessageInteractionBuilder::new("a user deletion message");
    builder
      .given("user exists")
      .json_contents(json_pattern!({
        "action": "delete_user",
        "user_id": like!("123")
      }))
      .metadata("queue", json!("users"));
    let message = builder.build();

    expect!(message.description.as_str()).to(be_equal_to("a user deletion message"));
    expect!(message.contents.metadata.get("queue").unwrap()).to(be_equal_to(&json!("users")));
    expect!(message.contents.metadata.get("contentType").unwrap())
      .to(be_equal_to(&json!("application/json")));
    expect!(message.contents.matching_rules.matcher_is_defined("body", &["$", "user_id"])).to(be_true());
  }
}

//! Builder for `SynchronousHttp` interactions. Normally created via
//! `PactBuilder::interaction`.

use serde_json::{json, Value};

use pact_models::provider_states::ProviderState;
use pact_models::v4::synch_http::SynchronousHttp;

use crate::builders::request_builder::RequestBuilder;
use crate::builders::response_builder::ResponseBuilder;
use crate::patterns::{JsonPattern, StringPattern};
use crate::builders::HttpPartBuilder;

/// The part of the interaction a shared setter applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionPart {
  /// The expected request
  Request,
  /// The declared response
  Response
}

/// Builder for one HTTP interaction. Shared setters (`with_header`, `with_body`)
/// target the request until `will_respond_with` is called, and the response after.
/// The `request` and `response` builders can always be used directly to target a
/// specific part.
pub struct InteractionBuilder {
  description: String,
  provider_states: Vec<ProviderState>,
  pending: bool,
  repeatable: bool,
  comments: Vec<String>,
  current_part: InteractionPart,

  /// A builder for this interaction's request
  pub request: RequestBuilder,

  /// A builder for this interaction's response
  pub response: ResponseBuilder
}

impl InteractionBuilder {
  /// Create a new interaction builder for the given description
  pub fn new<D: Into<String>>(description: D) -> Self {
    InteractionBuilder {
      description: description.into(),
      provider_states: vec![],
      pending: false,
      repeatable: false,
      comments: vec![],
      current_part: InteractionPart::Request,
      request: RequestBuilder::default(),
      response: ResponseBuilder::default()
    }
  }

  /// Specify a provider state for this interaction. May be called multiple times;
  /// each call appends a state.
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

  /// Marks this interaction as pending: failures to verify it will not fail the
  /// overall verification result
  pub fn pending(&mut self, pending: bool) -> &mut Self {
    self.pending = pending;
    self
  }

  /// Adds a text comment to this interaction. Has no functional impact, but is
  /// included in the pact file.
  pub fn comment<G: Into<String>>(&mut self, comment: G) -> &mut Self {
    self.comments.push(comment.into());
    self
  }

  /// Marks this interaction as repeatable: the mock server may match it any number
  /// of times instead of consuming it on first match
  pub fn repeatable(&mut self) -> &mut Self {
    self.repeatable = true;
    self
  }

  /// The request details: method and path
  pub fn with_request<M: Into<String>, P: Into<StringPattern>>(&mut self, method: M, path: P) -> &mut Self {
    self.request.method(method).path(path);
    self
  }

  /// Starts the response part: the declared status. Shared setters target the
  /// response from this point on.
  pub fn will_respond_with(&mut self, status: u16) -> &mut Self {
    self.response.status(status);
    self.current_part = InteractionPart::Response;
    self
  }

  /// Adds a header to the current part (request before `will_respond_with`, response
  /// after)
  pub fn with_header<N: Into<String>, V: Into<StringPattern>>(&mut self, name: N, value: V) -> &mut Self {
    match self.current_part {
      InteractionPart::Request => { self.request.header(name, value); },
      InteractionPart::Response => { self.response.header(name, value); }
    }
    self
  }

  /// Adds a query parameter to the request. May be called repeatedly for the same
  /// name to build an ordered multi-value parameter.
  pub fn with_query_parameter<N: Into<String>, V: Into<StringPattern>>(&mut self, name: N, value: V) -> &mut Self {
    self.request.query_param(name, value);
    self
  }

  /// Sets the JSON body of the current part, extracting any embedded matchers and
  /// generators
  pub fn with_json_body<P: Into<JsonPattern>>(&mut self, pattern: P) -> &mut Self {
    match self.current_part {
      InteractionPart::Request => { self.request.json_body(pattern); },
      InteractionPart::Response => { self.response.json_body(pattern); }
    }
    self
  }

  /// Sets the body of the current part with an explicit content type
  pub fn with_body<B: Into<String>, C: Into<String>>(&mut self, body: B, content_type: C) -> &mut Self {
    match self.current_part {
      InteractionPart::Request => { self.request.body(body, content_type); },
      InteractionPart::Response => { self.response.body(body, content_type); }
    }
    self
  }

  /// The interaction we've built
  pub fn build(&self) -> SynchronousHttp {
    let mut comments = std::collections::HashMap::new();
    if !self.comments.is_empty() {
      comments.insert("text".to_string(), json!(self.comments));
    }
    if self.repeatable {
      comments.insert("repeatable".to_string(), json!(true));
    }
    SynchronousHttp {
      id: None,
      key: None,
      description: self.description.clone(),
      provider_states: self.provider_states.clone(),
      request: self.request.build(),
      response: self.response.build(),
      pending: self.pending,
      comments
    }
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use super::*;

  #[test]
  fn given_appends_provider_states() {
    let mut builder = InteractionBuilder::new("a request");
    builder.given("state one").given_with_params("state two", &json!({"id": 123}));
    let interaction = builder.build();
    expect!(interaction.provider_states.len()).to(be_equal_to(2));
    expect!(interaction.provider_states[1].params.clone()).to(be_equal_to(hashmap!{
      "id".to_string() => json!(123)
    }));
  }

  #[test]
  fn shared_setters_target_request_then_response() {
    let mut builder = InteractionBuilder::new("a request");
    builder
      .with_request("GET", "/users/123")
      .with_header("Accept", "application/json")
      .will_respond_with(200)
      .with_header("Content-Type", "application/json");
    let interaction = builder.build();
    expect!(interaction.request.headers.unwrap().contains_key("Accept")).to(be_true());
    expect!(interaction.response.headers.unwrap().contains_key("Content-Type")).to(be_true());
    expect!(interaction.response.status).to(be_equal_to(200));
  }

  #[test]
  fn explicit_part_builders_override_the_current_part() {
    let mut builder = InteractionBuilder::new("a request");
    builder.will_respond_with(200);
    builder.request.header("X-Late", "still-request");
    let interaction = builder.build();
    expect!(interaction.request.headers.unwrap().contains_key("X-Late")).to(be_true());
  }

  #[test]
  fn comments_are_included_in_the_interaction() {
    let mut builder = InteractionBuilder::new("a request");
    builder.comment("this is a comment");
    let interaction = builder.build();
    expect!(interaction.comments.get("text").unwrap()).to(be_equal_to(&json!(["this is a comment"])));
  }
}

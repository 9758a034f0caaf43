//! Builder for the response part of an interaction

use std::collections::HashMap;

use maplit::hashmap;

use pact_models::bodies::OptionalBody;
use pact_models::generators::Generators;
use pact_models::matchingrules::MatchingRules;
use pact_models::v4::http_parts::HttpResponse;

use crate::builders::HttpPartBuilder;

/// Builder for `HttpResponse` objects. Normally created via `PactBuilder::interaction`.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
  response: HttpResponse
}

impl ResponseBuilder {
  /// Set the response status code. Defaults to `200`.
  pub fn status(&mut self, status: u16) -> &mut Self {
    self.response.status = status;
    self
  }

  /// Set the status to `201 Created`
  pub fn created(&mut self) -> &mut Self {
    self.status(201)
  }

  /// Set the status to `404 Not Found`
  pub fn not_found(&mut self) -> &mut Self {
    self.status(404)
  }

  /// The response we've built
  pub fn build(&self) -> HttpResponse {
    self.response.clone()
  }
}

impl Default for ResponseBuilder {
  fn default() -> Self {
    ResponseBuilder {
      response: HttpResponse::default()
    }
  }
}

impl HttpPartBuilder for ResponseBuilder {
  fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>> {
    if self.response.headers.is_none() {
      self.response.headers = Some(hashmap!{});
    }
    self.response.headers.as_mut().unwrap()
  }

  fn body_mut(&mut self) -> &mut OptionalBody {
    &mut self.response.body
  }

  fn matching_rules_mut(&mut self) -> &mut MatchingRules {
    &mut self.response.matching_rules
  }

  fn generators_mut(&mut self) -> &mut Generators {
    &mut self.response.generators
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;

  use super::*;

  #[test]
  fn builds_a_response_with_defaults() {
    let response = ResponseBuilder::default().build();
    expect!(response.status).to(be_equal_to(200));
  }

  #[test]
  fn sets_status_and_headers() {
    let mut builder = ResponseBuilder::default();
    builder.created().header("Location", "/users/1");
    let response = builder.build();
    expect!(response.status).to(be_equal_to(201));
    expect!(response.headers.unwrap().get("Location").unwrap().clone())
      .to(be_equal_to(vec!["/users/1".to_string()]));
  }
}

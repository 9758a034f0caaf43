//! Builder for the request part of an interaction

use std::collections::HashMap;

use maplit::hashmap;

use pact_models::bodies::OptionalBody;
use pact_models::generators::{GeneratorCategory, Generators};
use pact_models::matchingrules::{Category, MatchingRuleCategory, MatchingRules};
use pact_models::path_exp::DocPath;
use pact_models::v4::http_parts::HttpRequest;

use crate::builders::HttpPartBuilder;
use crate::patterns::StringPattern;

/// Builder for `HttpRequest` objects. Normally created via `PactBuilder::interaction`.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
  request: HttpRequest
}

impl RequestBuilder {
  /// Specify the request method. Defaults to `GET`.
  pub fn method<M: Into<String>>(&mut self, method: M) -> &mut Self {
    self.request.method = method.into().to_uppercase();
    self
  }

  /// Set the HTTP method to `GET`
  pub fn get(&mut self) -> &mut Self {
    self.method("GET")
  }

  /// Set the HTTP method to `POST`
  pub fn post(&mut self) -> &mut Self {
    self.method("POST")
  }

  /// Set the HTTP method to `PUT`
  pub fn put(&mut self) -> &mut Self {
    self.method("PUT")
  }

  /// Set the HTTP method to `DELETE`
  pub fn delete(&mut self) -> &mut Self {
    self.method("DELETE")
  }

  /// Specify the request path. The path may be a pattern, in which case the matching
  /// rule is attached to the path and the example value is used in the pact file.
  pub fn path<P: Into<StringPattern>>(&mut self, path: P) -> &mut Self {
    let path = path.into();
    let mut rules = MatchingRuleCategory::empty(Category::PATH);
    let mut generators = hashmap!{};
    path.extract(DocPath::empty(), &mut rules, &mut generators);

    if rules.is_not_empty() {
      let category = self.request.matching_rules.add_category(Category::PATH);
      for (rule_path, rule_list) in rules.rules {
        for rule in rule_list.rules {
          category.add_rule(rule_path.clone(), rule, rule_list.rule_logic);
        }
      }
    }
    for (_, generator) in generators {
      self.request.generators.add_generator(&GeneratorCategory::PATH, generator);
    }

    self.request.path = path.to_example();
    self
  }

  /// Adds a query parameter. Calling this repeatedly with the same name builds an
  /// ordered multi-value parameter.
  pub fn query_param<N, V>(&mut self, name: N, value: V) -> &mut Self
    where N: Into<String>, V: Into<StringPattern>
  {
    let name = name.into();
    let value = value.into();

    let mut rules = MatchingRuleCategory::empty(Category::QUERY);
    let mut generators = hashmap!{};
    value.extract(DocPath::root().join(name.as_str()), &mut rules, &mut generators);
    if rules.is_not_empty() {
      let category = self.request.matching_rules.add_category(Category::QUERY);
      for (rule_path, rule_list) in rules.rules {
        for rule in rule_list.rules {
          category.add_rule(rule_path.clone(), rule, rule_list.rule_logic);
        }
      }
    }
    for (path, generator) in generators {
      self.request.generators.add_generator_with_subcategory(&GeneratorCategory::QUERY, path, generator);
    }

    self.request.query.get_or_insert_with(HashMap::new)
      .entry(name).or_default()
      .push(value.to_example());
    self
  }

  /// The request we've built
  pub fn build(&self) -> HttpRequest {
    self.request.clone()
  }
}

impl Default for RequestBuilder {
  fn default() -> Self {
    RequestBuilder {
      request: HttpRequest::default()
    }
  }
}

impl HttpPartBuilder for RequestBuilder {
  fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>> {
    if self.request.headers.is_none() {
      self.request.headers = Some(hashmap!{});
    }
    self.request.headers.as_mut().unwrap()
  }

  fn body_mut(&mut self) -> &mut OptionalBody {
    &mut self.request.body
  }

  fn matching_rules_mut(&mut self) -> &mut MatchingRules {
    &mut self.request.matching_rules
  }

  fn generators_mut(&mut self) -> &mut Generators {
    &mut self.request.generators
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use serde_json::json;

  use pact_models::matchingrules::MatchingRule;

  use crate::json_pattern;
  use crate::json_pattern_internal;
  use crate::like;
  use crate::patterns::JsonPattern;

  use super::*;

  #[test]
  fn builds_a_request_with_defaults() {
    let request = RequestBuilder::default().build();
    expect!(request.method.as_str()).to(be_equal_to("GET"));
    expect!(request.path.as_str()).to(be_equal_to("/"));
  }

  #[test]
  fn path_pattern_extracts_the_rule() {
    let mut builder = RequestBuilder::default();
    builder.path(StringPattern::term("/users/\\d+", "/users/123"));
    let request = builder.build();
    expect!(request.path.as_str()).to(be_equal_to("/users/123"));
    expect!(request.matching_rules.matcher_is_defined("path", &[])).to(be_true());
  }

  #[test]
  fn repeated_query_params_build_ordered_multi_values() {
    let mut builder = RequestBuilder::default();
    builder.query_param("k", "v").query_param("k", "w");
    let request = builder.build();
    expect!(request.query.unwrap().get("k").unwrap().clone())
      .to(be_equal_to(vec!["v".to_string(), "w".to_string()]));
  }

  #[test]
  fn json_body_extracts_rules_into_the_request() {
    let mut builder = RequestBuilder::default();
    builder.post().path("/users").json_body(json_pattern!({
      "name": like!("Alice")
    }));
    let request = builder.build();
    expect!(request.matching_rules.matcher_is_defined("body", &["$", "name"])).to(be_true());
    let body: serde_json::Value = serde_json::from_slice(&request.body.value().unwrap()).unwrap();
    expect!(body).to(be_equal_to(json!({"name": "Alice"})));
  }
}

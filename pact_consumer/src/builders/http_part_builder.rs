//! The shared builder surface for the HTTP parts of an interaction (request and
//! response): headers and bodies work the same on both sides.

use std::collections::HashMap;

use bytes::Bytes;
use maplit::hashmap;
use serde_json::Value;

use pact_models::bodies::OptionalBody;
use pact_models::content_types::ContentType;
use pact_models::generators::{Generator, GeneratorCategory, Generators};
use pact_models::matchingrules::{Category, MatchingRuleCategory, MatchingRules};
use pact_models::path_exp::DocPath;

use crate::patterns::{JsonPattern, StringPattern};

/// Trait with the builder methods shared by the request and response builders
pub trait HttpPartBuilder {
  /// Internal accessor for the headers map
  #[doc(hidden)]
  fn headers_mut(&mut self) -> &mut HashMap<String, Vec<String>>;

  /// Internal accessor for the body
  #[doc(hidden)]
  fn body_mut(&mut self) -> &mut OptionalBody;

  /// Internal accessor for the matching rules
  #[doc(hidden)]
  fn matching_rules_mut(&mut self) -> &mut MatchingRules;

  /// Internal accessor for the generators
  #[doc(hidden)]
  fn generators_mut(&mut self) -> &mut Generators;

  /// Adds a header to the part. The value may be a pattern.
  fn header<N, V>(&mut self, name: N, value: V) -> &mut Self
    where N: Into<String>, V: Into<StringPattern>
  {
    let name = name.into();
    let value = value.into();
    {
      let mut rules = MatchingRuleCategory::empty(Category::HEADER);
      let mut generators = hashmap!{};
      value.extract(DocPath::root().join(name.as_str()), &mut rules, &mut generators);
      merge_header_rules(self, rules, generators);
      self.headers_mut().insert(name, vec![ value.to_example() ]);
    }
    self
  }

  /// Sets the `Content-Type` header
  fn content_type<V: Into<String>>(&mut self, content_type: V) -> &mut Self {
    self.header("Content-Type", content_type.into())
  }

  /// Sets the `Content-Type` header to `application/json; charset=utf-8`
  fn json_utf8(&mut self) -> &mut Self {
    self.content_type("application/json; charset=utf-8")
  }

  /// Sets the body with the given content type
  fn body<B: Into<String>, C: Into<String>>(&mut self, body: B, content_type: C) -> &mut Self {
    let content_type = ContentType::parse(content_type.into().as_str()).ok();
    *self.body_mut() = OptionalBody::Present(Bytes::from(body.into()), content_type);
    self
  }

  /// Sets the body to the example of the JSON pattern, extracting any embedded
  /// matching rules and generators into the part
  fn json_body<P: Into<JsonPattern>>(&mut self, pattern: P) -> &mut Self {
    let pattern = pattern.into();

    let mut rules = MatchingRuleCategory::empty(Category::BODY);
    let mut generators = hashmap!{};
    pattern.extract(DocPath::root(), &mut rules, &mut generators);

    {
      let matching_rules = self.matching_rules_mut();
      let category = matching_rules.add_category(Category::BODY);
      for (path, rule_list) in rules.rules {
        for rule in rule_list.rules {
          category.add_rule(path.clone(), rule, rule_list.rule_logic);
        }
      }
    }
    {
      let part_generators = self.generators_mut();
      for (path, generator) in generators {
        part_generators.add_generator_with_subcategory(&GeneratorCategory::BODY, path, generator);
      }
    }

    let example: Value = pattern.to_example();
    *self.body_mut() = OptionalBody::Present(Bytes::from(example.to_string()),
      Some(pact_models::content_types::JSON.clone()));
    if !self.headers_mut().contains_key("Content-Type") {
      self.header("Content-Type", "application/json");
    }
    self
  }
}

fn merge_header_rules<B: HttpPartBuilder + ?Sized>(
  builder: &mut B,
  rules: MatchingRuleCategory,
  generators: HashMap<DocPath, Generator>
) {
  if rules.is_not_empty() {
    let matching_rules = builder.matching_rules_mut();
    let category = matching_rules.add_category(Category::HEADER);
    for (path, rule_list) in rules.rules {
      for rule in rule_list.rules {
        category.add_rule(path.clone(), rule, rule_list.rule_logic);
      }
    }
  }
  if !generators.is_empty() {
    let part_generators = builder.generators_mut();
    for (path, generator) in generators {
      part_generators.add_generator_with_subcategory(&GeneratorCategory::HEADER, path, generator);
    }
  }
}

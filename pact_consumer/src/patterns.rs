//! Patterns for building request and response bodies with embedded matching rules and
//! generators. A value site is a tagged sum: a plain JSON leaf, a nested collection, a
//! site with matching rules attached, or a site whose value is produced by a
//! generator. The builders walk the tree and extract the rules and generators into
//! selector-keyed maps.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use pact_models::generators::Generator;
use pact_models::matchingrules::{MatchingRule, MatchingRuleCategory, RuleLogic};
use pact_models::path_exp::DocPath;

/// A JSON value site in a request, response or message body
#[derive(Debug, Clone)]
pub enum JsonPattern {
  /// A literal JSON value with no rules attached
  Leaf(Value),
  /// An array of nested patterns
  Array(Vec<JsonPattern>),
  /// An object of nested patterns
  Object(BTreeMap<String, JsonPattern>),
  /// A value site with matching rules attached to it
  Matched(Box<JsonPattern>, Vec<MatchingRule>),
  /// An array matched by type with a minimum length, built from an example element
  EachLike(Box<JsonPattern>, usize),
  /// A value site whose concrete value is produced by a generator
  Generated(Box<JsonPattern>, Generator)
}

impl JsonPattern {
  /// A JSON null leaf
  pub fn null() -> JsonPattern {
    JsonPattern::Leaf(Value::Null)
  }

  /// Wraps the pattern so that values are matched by type rather than equality
  pub fn like(pattern: impl Into<JsonPattern>) -> JsonPattern {
    JsonPattern::Matched(Box::new(pattern.into()), vec![ MatchingRule::Type ])
  }

  /// An array where every element matches the example element, with a minimum length
  pub fn each_like(pattern: impl Into<JsonPattern>, min_len: usize) -> JsonPattern {
    JsonPattern::EachLike(Box::new(pattern.into()), min_len)
  }

  /// A string value matched by the given regular expression
  pub fn term(regex: impl Into<String>, example: impl Into<String>) -> JsonPattern {
    JsonPattern::Matched(
      Box::new(JsonPattern::Leaf(Value::String(example.into()))),
      vec![ MatchingRule::Regex(regex.into()) ])
  }

  /// Attaches matching rules to the pattern
  pub fn with_rules(pattern: impl Into<JsonPattern>, rules: Vec<MatchingRule>) -> JsonPattern {
    JsonPattern::Matched(Box::new(pattern.into()), rules)
  }

  /// Attaches a generator to the pattern. The example value is used in the pact file,
  /// the generator produces the concrete value at runtime.
  pub fn generated(pattern: impl Into<JsonPattern>, generator: Generator) -> JsonPattern {
    JsonPattern::Generated(Box::new(pattern.into()), generator)
  }

  /// The example value for this pattern, as written to the pact file
  pub fn to_example(&self) -> Value {
    match self {
      JsonPattern::Leaf(value) => value.clone(),
      JsonPattern::Array(elements) => Value::Array(elements.iter()
        .map(JsonPattern::to_example)
        .collect()),
      JsonPattern::Object(entries) => Value::Object(entries.iter()
        .map(|(key, value)| (key.clone(), value.to_example()))
        .collect()),
      JsonPattern::Matched(pattern, _) => pattern.to_example(),
      JsonPattern::EachLike(pattern, min_len) => {
        let element = pattern.to_example();
        Value::Array(std::iter::repeat(element).take((*min_len).max(1)).collect())
      },
      JsonPattern::Generated(pattern, _) => pattern.to_example()
    }
  }

  /// Walks the pattern tree, extracting the matching rules and generators into the
  /// selector-keyed maps
  pub fn extract(
    &self,
    path: DocPath,
    rules_out: &mut MatchingRuleCategory,
    generators_out: &mut HashMap<DocPath, Generator>
  ) {
    match self {
      JsonPattern::Leaf(_) => (),
      JsonPattern::Array(elements) => for (index, element) in elements.iter().enumerate() {
        element.extract(path.join_index(index), rules_out, generators_out);
      },
      JsonPattern::Object(entries) => for (key, value) in entries {
        value.extract(path.join(key.as_str()), rules_out, generators_out);
      },
      JsonPattern::Matched(pattern, rules) => {
        for rule in rules {
          rules_out.add_rule(path.clone(), rule.clone(), RuleLogic::And);
        }
        pattern.extract(path, rules_out, generators_out);
      },
      JsonPattern::EachLike(pattern, min_len) => {
        rules_out.add_rule(path.clone(), MatchingRule::MinType(*min_len), RuleLogic::And);
        let mut element_path = path.clone();
        element_path.push_star_index();
        rules_out.add_rule(element_path.clone(), MatchingRule::Type, RuleLogic::And);
        pattern.extract(element_path, rules_out, generators_out);
      },
      JsonPattern::Generated(pattern, generator) => {
        generators_out.insert(path.clone(), generator.clone());
        pattern.extract(path, rules_out, generators_out);
      }
    }
  }
}

impl From<Value> for JsonPattern {
  fn from(value: Value) -> Self {
    JsonPattern::Leaf(value)
  }
}

impl From<&str> for JsonPattern {
  fn from(value: &str) -> Self {
    JsonPattern::Leaf(Value::String(value.to_string()))
  }
}

impl From<String> for JsonPattern {
  fn from(value: String) -> Self {
    JsonPattern::Leaf(Value::String(value))
  }
}

impl From<bool> for JsonPattern {
  fn from(value: bool) -> Self {
    JsonPattern::Leaf(Value::Bool(value))
  }
}

macro_rules! impl_from_number_for_pattern {
  ($($ty:ty),*) => {
    $(impl From<$ty> for JsonPattern {
      fn from(value: $ty) -> Self {
        JsonPattern::Leaf(serde_json::json!(value))
      }
    })*
  }
}

impl_from_number_for_pattern!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

/// A string value site used for paths, headers and query parameters
#[derive(Debug, Clone)]
pub enum StringPattern {
  /// A literal string compared by equality
  String(String),
  /// A string matched by a regular expression, with an example value
  Term {
    /// The regular expression to match with
    regex: String,
    /// The example value used in the pact file
    example: String
  },
  /// A string whose concrete value comes from a generator
  Generated {
    /// The example value used in the pact file
    example: String,
    /// The generator that produces the concrete value
    generator: Generator
  }
}

impl StringPattern {
  /// A string matched by a regular expression
  pub fn term(regex: impl Into<String>, example: impl Into<String>) -> StringPattern {
    StringPattern::Term {
      regex: regex.into(),
      example: example.into()
    }
  }

  /// A string produced by a generator, with an example value for the pact file
  pub fn generated(generator: Generator, example: impl Into<String>) -> StringPattern {
    StringPattern::Generated {
      example: example.into(),
      generator
    }
  }

  /// The example value for this pattern
  pub fn to_example(&self) -> String {
    match self {
      StringPattern::String(value) => value.clone(),
      StringPattern::Term { example, .. } => example.clone(),
      StringPattern::Generated { example, .. } => example.clone()
    }
  }

  /// Extracts the matching rules and generators for this pattern at the given path
  pub fn extract(
    &self,
    path: DocPath,
    rules_out: &mut MatchingRuleCategory,
    generators_out: &mut HashMap<DocPath, Generator>
  ) {
    match self {
      StringPattern::String(_) => (),
      StringPattern::Term { regex, .. } =>
        rules_out.add_rule(path, MatchingRule::Regex(regex.clone()), RuleLogic::And),
      StringPattern::Generated { generator, .. } => {
        generators_out.insert(path, generator.clone());
      }
    }
  }
}

impl From<&str> for StringPattern {
  fn from(value: &str) -> Self {
    StringPattern::String(value.to_string())
  }
}

impl From<String> for StringPattern {
  fn from(value: String) -> Self {
    StringPattern::String(value)
  }
}

/// Construct a `JsonPattern` from a JSON-like literal, with embedded patterns allowed
/// at any value position.
///
/// ```
/// use pact_consumer::prelude::*;
/// use pact_consumer::{json_pattern, json_pattern_internal, like, term};
///
/// let pattern = json_pattern!({
///   "id": like!(123),
///   "tag": term!("^[a-z]+$", "abc"),
///   "roles": ["admin", "user"]
/// });
/// ```
#[macro_export]
macro_rules! json_pattern {
  ($($json:tt)+) => {
    $crate::json_pattern_internal!($($json)+)
  };
}

/// Implementation detail of `json_pattern!`: a token muncher in the style of
/// `serde_json::json!`.
#[macro_export]
#[doc(hidden)]
macro_rules! json_pattern_internal {
  //////////////////////////////////////////////////////////////////////////
  // Array handling: munch elements into [$($elems,)*]
  //////////////////////////////////////////////////////////////////////////

  (@array [$($elems:expr,)*]) => {
    vec![$($elems,)*]
  };

  (@array [$($elems:expr),*]) => {
    vec![$($elems),*]
  };

  (@array [$($elems:expr,)*] null $($rest:tt)*) => {
    $crate::json_pattern_internal!(@array [$($elems,)* $crate::json_pattern_internal!(null)] $($rest)*)
  };

  (@array [$($elems:expr,)*] [$($array:tt)*] $($rest:tt)*) => {
    $crate::json_pattern_internal!(@array [$($elems,)* $crate::json_pattern_internal!([$($array)*])] $($rest)*)
  };

  (@array [$($elems:expr,)*] {$($map:tt)*} $($rest:tt)*) => {
    $crate::json_pattern_internal!(@array [$($elems,)* $crate::json_pattern_internal!({$($map)*})] $($rest)*)
  };

  (@array [$($elems:expr,)*] $next:expr, $($rest:tt)*) => {
    $crate::json_pattern_internal!(@array [$($elems,)* $crate::json_pattern_internal!($next),] $($rest)*)
  };

  (@array [$($elems:expr,)*] $last:expr) => {
    $crate::json_pattern_internal!(@array [$($elems,)* $crate::json_pattern_internal!($last)])
  };

  (@array [$($elems:expr),*] , $($rest:tt)*) => {
    $crate::json_pattern_internal!(@array [$($elems,)*] $($rest)*)
  };

  //////////////////////////////////////////////////////////////////////////
  // Object handling: munch (key, value) entries into the map
  //////////////////////////////////////////////////////////////////////////

  (@object $object:ident () () ()) => {};

  (@object $object:ident [$($key:tt)+] ($value:expr) , $($rest:tt)*) => {
    let _ = $object.insert(($($key)+).to_string(), $value);
    $crate::json_pattern_internal!(@object $object () ($($rest)*) ($($rest)*));
  };

  (@object $object:ident [$($key:tt)+] ($value:expr)) => {
    let _ = $object.insert(($($key)+).to_string(), $value);
  };

  (@object $object:ident ($($key:tt)+) (: null $($rest:tt)*) $copy:tt) => {
    $crate::json_pattern_internal!(@object $object [$($key)+] ($crate::json_pattern_internal!(null)) $($rest)*);
  };

  (@object $object:ident ($($key:tt)+) (: [$($array:tt)*] $($rest:tt)*) $copy:tt) => {
    $crate::json_pattern_internal!(@object $object [$($key)+] ($crate::json_pattern_internal!([$($array)*])) $($rest)*);
  };

  (@object $object:ident ($($key:tt)+) (: {$($map:tt)*} $($rest:tt)*) $copy:tt) => {
    $crate::json_pattern_internal!(@object $object [$($key)+] ($crate::json_pattern_internal!({$($map)*})) $($rest)*);
  };

  (@object $object:ident ($($key:tt)+) (: $value:expr , $($rest:tt)*) $copy:tt) => {
    $crate::json_pattern_internal!(@object $object [$($key)+] ($crate::json_pattern_internal!($value)) , $($rest)*);
  };

  (@object $object:ident ($($key:tt)+) (: $value:expr) $copy:tt) => {
    $crate::json_pattern_internal!(@object $object [$($key)+] ($crate::json_pattern_internal!($value)));
  };

  (@object $object:ident (($key:expr)) (: $($rest:tt)*) $copy:tt) => {
    $crate::json_pattern_internal!(@object $object [$key] (: $($rest)*) (: $($rest)*));
  };

  (@object $object:ident ($($key:tt)*) ($tt:tt $($rest:tt)*) $copy:tt) => {
    $crate::json_pattern_internal!(@object $object ($($key)* $tt) ($($rest)*) ($($rest)*));
  };

  //////////////////////////////////////////////////////////////////////////
  // Primary rules
  //////////////////////////////////////////////////////////////////////////

  (null) => {
    $crate::patterns::JsonPattern::null()
  };

  (true) => {
    $crate::patterns::JsonPattern::from(true)
  };

  (false) => {
    $crate::patterns::JsonPattern::from(false)
  };

  ([]) => {
    $crate::patterns::JsonPattern::Array(vec![])
  };

  ([ $($tt:tt)+ ]) => {
    $crate::patterns::JsonPattern::Array($crate::json_pattern_internal!(@array [] $($tt)+))
  };

  ({}) => {
    $crate::patterns::JsonPattern::Object(std::collections::BTreeMap::new())
  };

  ({ $($tt:tt)+ }) => {
    $crate::patterns::JsonPattern::Object({
      let mut object = std::collections::BTreeMap::new();
      $crate::json_pattern_internal!(@object object () ($($tt)+) ($($tt)+));
      object
    })
  };

  ($other:expr) => {
    $crate::patterns::JsonPattern::from($other)
  };
}

/// Generates the given example value, and matches any value of the same data type
#[macro_export]
macro_rules! like {
  ($($json:tt)+) => {
    $crate::patterns::JsonPattern::like($crate::json_pattern!($($json)+))
  };
}

/// Matches an array where every element is like the example element. An optional
/// second argument sets the minimum length (default 1).
#[macro_export]
macro_rules! each_like {
  ($($json:tt)+) => {
    $crate::patterns::JsonPattern::each_like($crate::json_pattern!($($json)+), 1)
  };
}

/// Matches a string value with a regular expression, using the example value in the
/// pact file
#[macro_export]
macro_rules! term {
  ($regex:expr, $example:expr) => {
    $crate::patterns::JsonPattern::term($regex, $example)
  };
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use pact_models::matchingrules::MatchingRule;

  use super::*;

  #[test]
  fn json_pattern_builds_plain_values() {
    let pattern = json_pattern!({
      "id": 123,
      "name": "Alice",
      "admin": true,
      "tags": ["a", "b"],
      "nested": { "deep": null }
    });
    expect!(pattern.to_example()).to(be_equal_to(json!({
      "id": 123,
      "name": "Alice",
      "admin": true,
      "tags": ["a", "b"],
      "nested": { "deep": null }
    })));

    let mut rules = MatchingRuleCategory::empty("body");
    let mut generators = hashmap!{};
    pattern.extract(DocPath::root(), &mut rules, &mut generators);
    expect!(rules.is_empty()).to(be_true());
    expect!(generators.is_empty()).to(be_true());
  }

  #[test]
  fn like_extracts_a_type_matcher() {
    let pattern = json_pattern!({ "name": like!("Alice") });
    let mut rules = MatchingRuleCategory::empty("body");
    let mut generators = hashmap!{};
    pattern.extract(DocPath::root(), &mut rules, &mut generators);
    expect!(rules.matcher_is_defined(&["$", "name"])).to(be_true());
    let best = rules.select_best_matcher(&["$", "name"]);
    expect!(best.rules.first().unwrap()).to(be_equal_to(&MatchingRule::Type));
  }

  #[test]
  fn term_extracts_a_regex_matcher_and_keeps_the_example() {
    let pattern = json_pattern!({ "id": term!("^\\d+$", "123") });
    expect!(pattern.to_example()).to(be_equal_to(json!({"id": "123"})));
    let mut rules = MatchingRuleCategory::empty("body");
    let mut generators = hashmap!{};
    pattern.extract(DocPath::root(), &mut rules, &mut generators);
    let best = rules.select_best_matcher(&["$", "id"]);
    expect!(best.rules.first().unwrap()).to(be_equal_to(&MatchingRule::Regex("^\\d+$".to_string())));
  }

  #[test]
  fn each_like_builds_an_example_array_and_min_rule() {
    let pattern = json_pattern!({ "items": JsonPattern::each_like(json_pattern!({"id": like!(1)}), 2) });
    expect!(pattern.to_example()).to(be_equal_to(json!({
      "items": [{"id": 1}, {"id": 1}]
    })));
    let mut rules = MatchingRuleCategory::empty("body");
    let mut generators = hashmap!{};
    pattern.extract(DocPath::root(), &mut rules, &mut generators);
    let best = rules.select_best_matcher(&["$", "items"]);
    expect!(best.rules.first().unwrap()).to(be_equal_to(&MatchingRule::MinType(2)));
    expect!(rules.matcher_is_defined(&["$", "items", "0", "id"])).to(be_true());
  }

  #[test]
  fn generated_sites_are_extracted_into_the_generator_map() {
    let pattern = json_pattern!({
      "id": JsonPattern::generated(json_pattern!(100), Generator::RandomInt(0, 1000))
    });
    let mut rules = MatchingRuleCategory::empty("body");
    let mut generators = hashmap!{};
    pattern.extract(DocPath::root(), &mut rules, &mut generators);
    expect!(generators.get(&DocPath::new_unwrap("$.id")).unwrap())
      .to(be_equal_to(&Generator::RandomInt(0, 1000)));
  }

  #[test]
  fn string_pattern_term() {
    let pattern = StringPattern::term("/users/\\d+", "/users/123");
    expect!(pattern.to_example()).to(be_equal_to("/users/123".to_string()));
    let mut rules = MatchingRuleCategory::empty("path");
    let mut generators = hashmap!{};
    pattern.extract(DocPath::empty(), &mut rules, &mut generators);
    expect!(rules.is_not_empty()).to(be_true());
  }
}

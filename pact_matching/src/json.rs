//! Matching of JSON bodies: the expected and actual documents are walked in lockstep,
//! applying the most specific matching rule at each node.

use serde_json::{json, Value};
use tracing::{debug, trace};

use pact_models::bodies::OptionalBody;
use pact_models::matchingrules::MatchingRule;

use crate::{DiffConfig, MatchingContext, Mismatch};
use crate::matchers::{match_values, Matches};

fn path_refs(path: &[String]) -> Vec<&str> {
  path.iter().map(|p| p.as_str()).collect()
}

fn display_path(path: &[String]) -> String {
  path.join(".")
}

fn value_of(value: &Value) -> String {
  match value {
    Value::String(s) => format!("'{}'", s),
    _ => value.to_string()
  }
}

fn json_mismatch(path: &[String], expected: Option<&Value>, actual: Option<&Value>, message: String) -> Mismatch {
  Mismatch::BodyMismatch {
    path: display_path(path),
    expected: expected.map(|v| v.to_string().into()),
    actual: actual.map(|v| v.to_string().into()),
    mismatch: message
  }
}

/// Matches the expected JSON body against the actual one. Bodies that fail to parse
/// fail the whole match with a single mismatch carrying the parse error.
pub fn match_json(expected: &OptionalBody, actual: &OptionalBody, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_json = serde_json::from_slice::<Value>(&expected.value().unwrap_or_default());
  let actual_json = serde_json::from_slice::<Value>(&actual.value().unwrap_or_default());

  match (expected_json, actual_json) {
    (Ok(expected_json), Ok(actual_json)) =>
      compare_json(&vec!["$".to_string()], &expected_json, &actual_json, context),
    (Err(err), _) => vec![ Mismatch::BodyMismatch {
      path: "$".to_string(),
      expected: expected.value(),
      actual: actual.value(),
      mismatch: format!("Failed to parse the expected body: '{}'", err)
    } ],
    (_, Err(err)) => vec![ Mismatch::BodyMismatch {
      path: "$".to_string(),
      expected: expected.value(),
      actual: actual.value(),
      mismatch: format!("Failed to parse the actual body: '{}'", err)
    } ]
  }
}

/// Compares the expected and actual JSON values at the given path
pub fn compare_json(path: &Vec<String>, expected: &Value, actual: &Value, context: &MatchingContext) -> Vec<Mismatch> {
  trace!("compare_json: Comparing '{:?}' to '{:?}' at path {}", expected, actual, display_path(path));
  match (expected, actual) {
    (Value::Object(_), Value::Object(_)) => compare_maps(path, expected, actual, context),
    (Value::Array(_), Value::Array(_)) => compare_lists(path, expected, actual, context),
    (Value::Object(_), _) | (Value::Array(_), _) => vec![
      json_mismatch(path, Some(expected), Some(actual),
        format!("Type mismatch: Expected {} ({}) but received {} ({})",
          value_of(expected), json_type(expected), value_of(actual), json_type(actual)))
    ],
    (_, _) => compare_values(path, expected, actual, context)
  }
}

fn json_type(value: &Value) -> &'static str {
  match value {
    Value::Null => "Null",
    Value::Bool(_) => "Boolean",
    Value::Number(_) => "Number",
    Value::String(_) => "String",
    Value::Array(_) => "List",
    Value::Object(_) => "Map"
  }
}

fn compare_maps(path: &Vec<String>, expected: &Value, actual: &Value, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_map = expected.as_object().unwrap();
  let actual_map = actual.as_object().unwrap();
  let mut result = vec![];

  if expected_map.is_empty() && !actual_map.is_empty() && context.config == DiffConfig::NoUnexpectedKeys {
    return vec![ json_mismatch(path, Some(expected), Some(actual),
      format!("Expected an empty Map but received {}", value_of(actual))) ];
  }

  let path_slice = path_refs(path);
  let rules = if context.matcher_is_defined(&path_slice) {
    Some(context.select_best_matcher(&path_slice))
  } else {
    None
  };

  // key-level rules apply to all the keys of the actual map
  if let Some(rules) = &rules {
    for rule in &rules.rules {
      match rule {
        MatchingRule::EachKey(key_rules) => for key in actual_map.keys() {
          for key_rule in key_rules {
            if let Err(err) = apply_key_rule(key, key_rule) {
              result.push(json_mismatch(path, Some(expected), Some(actual), err.to_string()));
            }
          }
        },
        MatchingRule::MinType(min) => if actual_map.len() < *min {
          result.push(json_mismatch(path, Some(expected), Some(actual),
            format!("Expected a Map with at least {} entries but received {} entries", min, actual_map.len())));
        },
        MatchingRule::MaxType(max) => if actual_map.len() > *max {
          result.push(json_mismatch(path, Some(expected), Some(actual),
            format!("Expected a Map with at most {} entries but received {} entries", max, actual_map.len())));
        },
        _ => ()
      }
    }
  }

  let values_style = rules.as_ref().map(|rules| rules.rules.iter().any(|rule|
      matches!(rule, MatchingRule::Values | MatchingRule::EachValue(_)))).unwrap_or(false) ||
    context.wildcard_matcher_is_defined(&[path_slice.as_slice(), &["any"]].concat());
  // key-level rules replace the structural key checks
  let keys_have_rules = rules.as_ref().map(|rules| rules.rules.iter().any(|rule|
      matches!(rule, MatchingRule::EachKey(_)))).unwrap_or(false);

  if values_style {
    // keys are ignored: every actual entry is compared against the expected entry with
    // the same key, or the first expected entry as a template
    let template = expected_map.values().next();
    let each_value_rules: Vec<&MatchingRule> = rules.as_ref()
      .map(|rules| rules.rules.iter()
        .filter_map(|rule| match rule {
          MatchingRule::EachValue(sub_rules) => Some(sub_rules.iter().collect::<Vec<&MatchingRule>>()),
          _ => None
        })
        .flatten()
        .collect())
      .unwrap_or_default();

    for (key, actual_value) in actual_map {
      let mut item_path = path.clone();
      item_path.push(key.clone());
      let expected_value = expected_map.get(key).or(template);
      if let Some(expected_value) = expected_value {
        if each_value_rules.is_empty() {
          result.extend(compare_json(&item_path, expected_value, actual_value, context));
        } else {
          for rule in &each_value_rules {
            if let Err(err) = expected_value.matches_with(actual_value, rule, false) {
              result.push(json_mismatch(&item_path, Some(expected_value), Some(actual_value), err.to_string()));
            }
          }
        }
      }
    }
  } else {
    for (key, expected_value) in expected_map {
      let mut item_path = path.clone();
      item_path.push(key.clone());
      match actual_map.get(key) {
        Some(actual_value) => result.extend(compare_json(&item_path, expected_value, actual_value, context)),
        None => if !keys_have_rules {
          result.push(json_mismatch(&item_path, Some(expected_value), None,
            format!("Expected entry '{}' but was missing", key)))
        }
      }
    }

    if context.config == DiffConfig::NoUnexpectedKeys && !keys_have_rules {
      for key in actual_map.keys() {
        if !expected_map.contains_key(key) {
          let mut item_path = path.clone();
          item_path.push(key.clone());
          result.push(json_mismatch(&item_path, None, Some(&actual_map[key]),
            format!("Received unexpected entry '{}'", key)));
        }
      }
    }
  }

  result
}

// Key rules apply string predicates to map keys
fn apply_key_rule(key: &str, rule: &MatchingRule) -> anyhow::Result<()> {
  key.matches_with(key, rule, false)
}

fn compare_lists(path: &Vec<String>, expected: &Value, actual: &Value, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_list = expected.as_array().unwrap();
  let actual_list = actual.as_array().unwrap();
  let mut result = vec![];

  let path_slice = path_refs(path);
  if context.matcher_is_defined(&path_slice) {
    let rules = context.select_best_matcher(&path_slice);
    debug!("compare_lists: matcher defined for path {}: {:?}", display_path(path), rules.rules);
    let mut compare_elements = false;

    for rule in &rules.rules {
      match rule {
        MatchingRule::ArrayContains(variants) => for (index, variant_rules, _) in variants {
          match expected_list.get(*index) {
            Some(expected_variant) => {
              let variant_context = MatchingContext::new(DiffConfig::AllowUnexpectedKeys, variant_rules);
              let matched = actual_list.iter().any(|actual_item| {
                compare_json(&vec!["$".to_string()], expected_variant, actual_item, &variant_context).is_empty()
              });
              if !matched {
                result.push(json_mismatch(path, Some(expected_variant), Some(actual),
                  format!("Expected {} to be present in the list", value_of(expected_variant))));
              }
            },
            None => result.push(json_mismatch(path, Some(expected), Some(actual),
              format!("ArrayContains variant {} has no matching expected value", index)))
          }
        },
        MatchingRule::MinType(min) => {
          if actual_list.len() < *min {
            result.push(json_mismatch(path, Some(expected), Some(actual),
              format!("Expected a List with at least {} items but received {} items", min, actual_list.len())));
          }
          compare_elements = true;
        },
        MatchingRule::MaxType(max) => {
          if actual_list.len() > *max {
            result.push(json_mismatch(path, Some(expected), Some(actual),
              format!("Expected a List with at most {} items but received {} items", max, actual_list.len())));
          }
          compare_elements = true;
        },
        MatchingRule::MinMaxType(min, max) => {
          if actual_list.len() < *min {
            result.push(json_mismatch(path, Some(expected), Some(actual),
              format!("Expected a List with at least {} items but received {} items", min, actual_list.len())));
          } else if actual_list.len() > *max {
            result.push(json_mismatch(path, Some(expected), Some(actual),
              format!("Expected a List with at most {} items but received {} items", max, actual_list.len())));
          }
          compare_elements = true;
        },
        MatchingRule::Type => compare_elements = true,
        MatchingRule::EachValue(sub_rules) => {
          let template = expected_list.first();
          for (index, actual_item) in actual_list.iter().enumerate() {
            let mut item_path = path.clone();
            item_path.push(index.to_string());
            if let Some(template) = template {
              for sub_rule in sub_rules {
                if let Err(err) = template.matches_with(actual_item, sub_rule, false) {
                  result.push(json_mismatch(&item_path, Some(template), Some(actual_item), err.to_string()));
                }
              }
            }
          }
        },
        MatchingRule::Equality => {
          if expected_list.len() != actual_list.len() {
            result.push(json_mismatch(path, Some(expected), Some(actual),
              format!("Expected a List with {} items but received {} items",
                expected_list.len(), actual_list.len())));
          }
          compare_elements = true;
        },
        MatchingRule::NotEmpty => if actual_list.is_empty() {
          result.push(json_mismatch(path, Some(expected), Some(actual),
            "Expected a non-empty List".to_string()));
        },
        _ => ()
      }
    }

    if compare_elements && !expected_list.is_empty() {
      result.extend(compare_list_content(path, expected_list, actual_list, context));
    }
  } else if expected_list.len() != actual_list.len() {
    result.push(json_mismatch(path, Some(expected), Some(actual),
      format!("Expected a List with {} items but received {} items",
        expected_list.len(), actual_list.len())));
  } else {
    result.extend(compare_list_content(path, expected_list, actual_list, context));
  }

  result
}

// Compares each actual element against the expected element at the same index, cycling
// the expected values as a template when the actual list is longer
fn compare_list_content(path: &Vec<String>, expected_list: &[Value], actual_list: &[Value], context: &MatchingContext) -> Vec<Mismatch> {
  let mut result = vec![];
  for (index, actual_item) in actual_list.iter().enumerate() {
    let expected_item = expected_list.get(index)
      .or_else(|| expected_list.get(index % expected_list.len().max(1)));
    if let Some(expected_item) = expected_item {
      let mut item_path = path.clone();
      item_path.push(index.to_string());
      result.extend(compare_json(&item_path, expected_item, actual_item, context));
    }
  }
  result
}

fn compare_values(path: &Vec<String>, expected: &Value, actual: &Value, context: &MatchingContext) -> Vec<Mismatch> {
  let path_slice = path_refs(path);
  let result = if context.matcher_is_defined(&path_slice) {
    debug!("compare_values: matcher defined for path {}", display_path(path));
    match_values(&path_slice, &context.select_best_matcher(&path_slice), expected, actual)
  } else {
    expected.matches_with(actual, &MatchingRule::Equality, false)
      .map_err(|err| vec![ err.to_string() ])
  };
  result.err().unwrap_or_default().iter().map(|message| {
    json_mismatch(path, Some(expected), Some(actual), message.clone())
  }).collect()
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use pact_models::matchingrules_list;
  use pact_models::matchingrules::MatchingRuleCategory;

  use super::*;

  fn body(json: serde_json::Value) -> OptionalBody {
    OptionalBody::from(&json)
  }

  fn context(rules: MatchingRuleCategory) -> MatchingContext {
    MatchingContext::new(DiffConfig::AllowUnexpectedKeys, &rules)
  }

  fn empty_context() -> MatchingContext {
    MatchingContext::empty("body".into(), DiffConfig::AllowUnexpectedKeys)
  }

  #[test]
  fn equal_json_matches() {
    let expected = body(json!({"id": 123, "name": "Alice"}));
    let mismatches = match_json(&expected, &expected.clone(), &empty_context());
    expect!(mismatches.is_empty()).to(be_true());
  }

  #[test]
  fn different_scalar_is_a_mismatch() {
    let expected = body(json!({"id": 123}));
    let actual = body(json!({"id": 124}));
    let mismatches = match_json(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
    expect!(mismatches[0].mismatch_type()).to(be_equal_to("BodyMismatch"));
  }

  #[test]
  fn missing_key_is_a_mismatch_and_extra_keys_are_allowed() {
    let expected = body(json!({"id": 123, "name": "Alice"}));
    let actual = body(json!({"id": 123, "extra": true}));
    let mismatches = match_json(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
    match &mismatches[0] {
      Mismatch::BodyMismatch { path, .. } => expect!(path.as_str()).to(be_equal_to("$.name")),
      _ => panic!("Expected a BodyMismatch")
    };
  }

  #[test]
  fn extra_keys_fail_when_unexpected_keys_are_not_allowed() {
    let expected = body(json!({"id": 123}));
    let actual = body(json!({"id": 123, "extra": true}));
    let context = MatchingContext::empty("body".into(), DiffConfig::NoUnexpectedKeys);
    let mismatches = match_json(&expected, &actual, &context);
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn type_matcher_accepts_different_values_of_the_same_type() {
    let rules = matchingrules_list! {
      "body"; "$.name" => [ MatchingRule::Type ]
    };
    let expected = body(json!({"name": "Alice"}));
    let actual = body(json!({"name": "Bob"}));
    expect!(match_json(&expected, &actual, &context(rules)).is_empty()).to(be_true());
  }

  #[test]
  fn type_matcher_rejects_different_types() {
    let rules = matchingrules_list! {
      "body"; "$.name" => [ MatchingRule::Type ]
    };
    let expected = body(json!({"name": "Alice"}));
    let actual = body(json!({"name": 99}));
    let mismatches = match_json(&expected, &actual, &context(rules));
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn min_type_matcher_checks_the_length() {
    let rules = matchingrules_list! {
      "body"; "$.items" => [ MatchingRule::MinType(2) ]
    };
    let expected = body(json!({"items": [1, 2, 3]}));
    let actual = body(json!({"items": [9]}));
    let mismatches = match_json(&expected, &actual, &context(rules));
    expect!(mismatches.len()).to(be_equal_to(1));
    match &mismatches[0] {
      Mismatch::BodyMismatch { path, mismatch, .. } => {
        expect!(path.as_str()).to(be_equal_to("$.items"));
        expect!(mismatch.contains("at least 2")).to(be_true());
      },
      _ => panic!("Expected a BodyMismatch")
    }
  }

  #[test]
  fn min_type_matcher_cascades_type_matching_to_elements() {
    let rules = matchingrules_list! {
      "body"; "$.items" => [ MatchingRule::MinType(1) ]
    };
    let expected = body(json!({"items": [1, 2, 3]}));
    let actual = body(json!({"items": ["a", "b"]}));
    let mismatches = match_json(&expected, &actual, &context(rules));
    expect!(mismatches.len()).to(be_equal_to(2));
    match &mismatches[0] {
      Mismatch::BodyMismatch { path, .. } => expect!(path.as_str()).to(be_equal_to("$.items.0")),
      _ => panic!("Expected a BodyMismatch")
    };
  }

  #[test]
  fn type_matcher_cascades_to_longer_actual_lists() {
    let rules = matchingrules_list! {
      "body"; "$.items" => [ MatchingRule::MinType(1) ]
    };
    let expected = body(json!({"items": [100]}));
    let actual = body(json!({"items": [1, 2, 3, 4]}));
    expect!(match_json(&expected, &actual, &context(rules)).is_empty()).to(be_true());
  }

  #[test]
  fn lists_without_matchers_must_have_the_same_length() {
    let expected = body(json!([1, 2, 3]));
    let actual = body(json!([1, 2]));
    let mismatches = match_json(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn values_matcher_ignores_keys() {
    let rules = matchingrules_list! {
      "body"; "$" => [ MatchingRule::Values ]
    };
    let expected = body(json!({"a": 100}));
    let actual = body(json!({"x": 200, "y": 300}));
    expect!(match_json(&expected, &actual, &context(rules)).is_empty()).to(be_true());
  }

  #[test]
  fn each_key_rule_applies_to_all_keys() {
    let rules = matchingrules_list! {
      "body"; "$" => [ MatchingRule::EachKey(vec![ MatchingRule::Regex("[a-z]+".to_string()) ]) ]
    };
    let expected = body(json!({"abc": 1}));
    let actual = body(json!({"def": 2, "XYZ": 3}));
    let mismatches = match_json(&expected, &actual, &context(rules));
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn array_contains_matches_out_of_order() {
    let rules = matchingrules_list! {
      "body"; "$" => [ MatchingRule::ArrayContains(vec![
        (0, MatchingRuleCategory::equality("body"), maplit::hashmap!{})
      ]) ]
    };
    let expected = body(json!([10]));
    let actual = body(json!([30, 20, 10]));
    expect!(match_json(&expected, &actual, &context(rules.clone())).is_empty()).to(be_true());

    let actual_missing = body(json!([30, 20]));
    let mismatches = match_json(&expected, &actual_missing, &context(rules));
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn malformed_actual_body_fails_with_a_single_mismatch() {
    let expected = body(json!({"a": 1}));
    let actual = OptionalBody::from("{not json");
    let mismatches = match_json(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
    expect!(mismatches[0].description().contains("Failed to parse the actual body")).to(be_true());
  }

  #[test]
  fn regex_matcher_on_nested_value() {
    let rules = matchingrules_list! {
      "body"; "$.user.id" => [ MatchingRule::Regex("\\d+".to_string()) ]
    };
    let expected = body(json!({"user": {"id": "123"}}));
    let actual_ok = body(json!({"user": {"id": "456"}}));
    let actual_bad = body(json!({"user": {"id": "abc"}}));
    expect!(match_json(&expected, &actual_ok, &context(rules.clone())).is_empty()).to(be_true());
    expect!(match_json(&expected, &actual_bad, &context(rules)).len()).to(be_equal_to(1));
  }
}

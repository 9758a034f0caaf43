//! Matching of request query parameters

use std::collections::HashMap;

use itertools::Itertools;

use pact_models::matchingrules::MatchingRule;

use crate::{MatchingContext, Mismatch};
use crate::matchers::{match_values, Matches};

fn match_query_value(key: &str, index: usize, expected: &str, actual: &str, context: &MatchingContext) -> Vec<Mismatch> {
  let path = vec!["$", key];
  let index_str = index.to_string();
  let indexed_path = vec!["$", key, index_str.as_str()];

  let matcher_result = if context.matcher_is_defined(&indexed_path) {
    match_values(&indexed_path, &context.select_best_matcher(&indexed_path), expected, actual)
  } else if context.matcher_is_defined(&path) {
    match_values(&path, &context.select_best_matcher(&path), expected, actual)
  } else {
    expected.matches_with(actual, &MatchingRule::Equality, false)
      .map_err(|err| vec![ err.to_string() ])
  };

  matcher_result.err().unwrap_or_default().iter().map(|message| {
    Mismatch::QueryMismatch {
      parameter: key.to_string(),
      expected: expected.to_string(),
      actual: actual.to_string(),
      mismatch: format!("Mismatch with query parameter '{}': {}", key, message)
    }
  }).collect()
}

fn match_query_values(key: &str, expected: &[String], actual: &[String], context: &MatchingContext) -> Vec<Mismatch> {
  let mut mismatches = vec![];

  if expected.len() != actual.len() && !context.matcher_is_defined(&["$", key]) {
    mismatches.push(Mismatch::QueryMismatch {
      parameter: key.to_string(),
      expected: format!("{:?}", expected),
      actual: format!("{:?}", actual),
      mismatch: format!("Expected query parameter '{}' with {} values but received {} values",
        key, expected.len(), actual.len())
    });
  }

  for (index, actual_value) in actual.iter().enumerate() {
    // when a matcher is defined the expected values act as a template and are cycled
    let expected_value = expected.get(index)
      .or_else(|| expected.get(index % expected.len().max(1)));
    if let Some(expected_value) = expected_value {
      mismatches.extend(match_query_value(key, index, expected_value, actual_value, context));
    }
  }

  mismatches
}

/// Matches the expected query parameters against the actual ones. Parameters missing
/// from the actual request and unexpected parameters are both mismatches.
pub fn match_query(
  expected: &Option<HashMap<String, Vec<String>>>,
  actual: &Option<HashMap<String, Vec<String>>>,
  context: &MatchingContext
) -> Vec<Mismatch> {
  let mut mismatches = vec![];
  let expected = expected.clone().unwrap_or_default();
  let actual = actual.clone().unwrap_or_default();

  for (key, expected_values) in expected.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
    match actual.get(key) {
      Some(actual_values) => mismatches.extend(
        match_query_values(key, expected_values, actual_values, context)),
      None => mismatches.push(Mismatch::QueryMismatch {
        parameter: key.clone(),
        expected: format!("{:?}", expected_values),
        actual: String::default(),
        mismatch: format!("Expected query parameter '{}' but was missing", key)
      })
    }
  }

  for (key, actual_values) in actual.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
    if !expected.contains_key(key) {
      mismatches.push(Mismatch::QueryMismatch {
        parameter: key.clone(),
        expected: String::default(),
        actual: format!("{:?}", actual_values),
        mismatch: format!("Received unexpected query parameter '{}'", key)
      });
    }
  }

  mismatches
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use pact_models::matchingrules_list;

  use crate::DiffConfig;

  use super::*;

  fn empty_context() -> MatchingContext {
    MatchingContext::empty("query".into(), DiffConfig::NoUnexpectedKeys)
  }

  #[test]
  fn equal_query_parameters_match() {
    let query = Some(hashmap!{ "a".to_string() => vec!["b".to_string()] });
    expect!(match_query(&query, &query.clone(), &empty_context()).is_empty()).to(be_true());
  }

  #[test]
  fn missing_parameter_is_a_mismatch() {
    let expected = Some(hashmap!{ "a".to_string() => vec!["b".to_string()] });
    let mismatches = match_query(&expected, &None, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn unexpected_parameter_is_a_mismatch() {
    let expected = Some(hashmap!{ "a".to_string() => vec!["b".to_string()] });
    let actual = Some(hashmap!{
      "a".to_string() => vec!["b".to_string()],
      "c".to_string() => vec!["d".to_string()]
    });
    let mismatches = match_query(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn multi_values_are_ordered() {
    let expected = Some(hashmap!{ "k".to_string() => vec!["v".to_string(), "w".to_string()] });
    let actual = Some(hashmap!{ "k".to_string() => vec!["w".to_string(), "v".to_string()] });
    let mismatches = match_query(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(2));
  }

  #[test]
  fn value_count_mismatch_is_reported() {
    let expected = Some(hashmap!{ "k".to_string() => vec!["v".to_string(), "w".to_string()] });
    let actual = Some(hashmap!{ "k".to_string() => vec!["v".to_string()] });
    let mismatches = match_query(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn matcher_applies_to_query_values() {
    let rules = matchingrules_list! {
      "query"; "$.page" => [ MatchingRule::Regex("\\d+".to_string()) ]
    };
    let context = MatchingContext::new(DiffConfig::NoUnexpectedKeys, &rules);
    let expected = Some(hashmap!{ "page".to_string() => vec!["1".to_string()] });
    let ok = Some(hashmap!{ "page".to_string() => vec!["99".to_string()] });
    expect!(match_query(&expected, &ok, &context).is_empty()).to(be_true());

    let bad = Some(hashmap!{ "page".to_string() => vec!["abc".to_string()] });
    expect!(match_query(&expected, &bad, &context).len()).to(be_equal_to(1));
  }
}

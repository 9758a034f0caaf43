//! Matching of request and response headers

use std::collections::HashMap;

use itertools::Itertools;

use pact_models::matchingrules::MatchingRule;

use crate::{MatchingContext, Mismatch};
use crate::matchers::{match_values, Matches};

/// Headers whose values carry parameters (`;`-separated) that are compared
/// parameter-wise rather than as plain strings
const PARAMETERISED_HEADERS: [&str; 2] = ["accept", "content-type"];

fn strip_whitespace<'a, T: FromIterator<&'a str>>(val: &'a str, split_by: &str) -> T {
  val.split(split_by).map(|v| v.trim()).collect()
}

fn parse_charset_parameters(parameters: &[&str]) -> HashMap<String, String> {
  parameters.iter()
    .map(|parameter| strip_whitespace::<Vec<&str>>(parameter, "="))
    .filter(|parts| parts.len() == 2)
    .map(|parts| (parts[0].to_lowercase(), parts[1].to_string()))
    .collect()
}

fn match_parameter_header(expected: &str, actual: &str, header: &str, index: usize) -> Result<(), Vec<String>> {
  let expected_values: Vec<&str> = strip_whitespace(expected, ";");
  let actual_values: Vec<&str> = strip_whitespace(actual, ";");

  let expected_parameters = expected_values.as_slice().split_first().unwrap_or((&"", &[]));
  let actual_parameters = actual_values.as_slice().split_first().unwrap_or((&"", &[]));
  let header_mismatch = format!("Expected header '{}' at index {} to have value '{}' but was '{}'",
    header, index, expected, actual);

  let mut mismatches = vec![];
  if expected_parameters.0 == actual_parameters.0 {
    let expected_parameter_map = parse_charset_parameters(expected_parameters.1);
    let actual_parameter_map = parse_charset_parameters(actual_parameters.1);
    for (name, value) in expected_parameter_map {
      match actual_parameter_map.get(&name) {
        Some(actual_value) => if actual_value.to_lowercase() != value.to_lowercase() {
          mismatches.push(header_mismatch.clone());
        },
        None => mismatches.push(header_mismatch.clone())
      }
    }
  } else {
    mismatches.push(header_mismatch);
  }

  if mismatches.is_empty() {
    Ok(())
  } else {
    Err(mismatches)
  }
}

fn match_header_value(key: &str, index: usize, expected: &str, actual: &str, context: &MatchingContext) -> Vec<Mismatch> {
  let path = vec!["$", key];
  let index_str = index.to_string();
  let indexed_path = vec!["$", key, index_str.as_str()];

  let matcher_result = if context.matcher_is_defined(&indexed_path) {
    match_values(&indexed_path, &context.select_best_matcher(&indexed_path), expected, actual)
  } else if context.matcher_is_defined(&path) {
    match_values(&path, &context.select_best_matcher(&path), expected, actual)
  } else if PARAMETERISED_HEADERS.contains(&key.to_lowercase().as_str()) {
    match_parameter_header(expected, actual, key, index)
  } else {
    expected.matches_with(actual, &MatchingRule::Equality, false)
      .map_err(|err| vec![ err.to_string() ])
  };

  matcher_result.err().unwrap_or_default().iter().map(|message| {
    Mismatch::HeaderMismatch {
      key: key.to_string(),
      expected: expected.to_string(),
      actual: actual.to_string(),
      mismatch: format!("Mismatch with header '{}': {}", key, message)
    }
  }).collect()
}

/// Matches the expected headers against the actual ones. Header names are compared
/// case-insensitively; values are ordered and compared per index. Actual headers not
/// in the expected set are always allowed.
pub fn match_headers(
  expected: &Option<HashMap<String, Vec<String>>>,
  actual: &Option<HashMap<String, Vec<String>>>,
  context: &MatchingContext
) -> Vec<Mismatch> {
  let mut mismatches = vec![];
  let expected = expected.clone().unwrap_or_default();
  let actual = actual.clone().unwrap_or_default();

  for (key, expected_values) in expected.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
    match actual.iter().find(|(k, _)| k.to_lowercase() == key.to_lowercase()) {
      Some((_, actual_values)) => {
        for (index, expected_value) in expected_values.iter().enumerate() {
          match actual_values.get(index) {
            Some(actual_value) => mismatches.extend(
              match_header_value(key, index, expected_value, actual_value, context)),
            None => mismatches.push(Mismatch::HeaderMismatch {
              key: key.clone(),
              expected: expected_value.clone(),
              actual: String::default(),
              mismatch: format!("Expected header '{}' to have {} values but there were only {}",
                key, expected_values.len(), actual_values.len())
            })
          }
        }
      },
      None => mismatches.push(Mismatch::HeaderMismatch {
        key: key.clone(),
        expected: expected_values.join(", "),
        actual: String::default(),
        mismatch: format!("Expected header '{}' but was missing", key)
      })
    }
  }

  mismatches
}

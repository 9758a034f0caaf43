//! Matching of form-urlencoded bodies: the bodies are parsed into maps of parameter
//! lists and compared with the query matching logic

use pact_models::bodies::OptionalBody;
use pact_models::query_strings::parse_query_string;

use crate::{MatchingContext, Mismatch};
use crate::query::match_query;

/// Matches the expected form-urlencoded body against the actual one
pub fn match_form_urlencoded(expected: &OptionalBody, actual: &OptionalBody, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_params = expected.value_as_string()
    .and_then(|body| parse_query_string(&body));
  let actual_params = actual.value_as_string()
    .and_then(|body| parse_query_string(&body));

  match_query(&expected_params, &actual_params, context).iter().map(|mismatch| {
    // the mismatches come back as query mismatches, but these are body comparisons
    match mismatch {
      Mismatch::QueryMismatch { parameter, expected, actual, mismatch } => Mismatch::BodyMismatch {
        path: format!("$.{}", parameter),
        expected: Some(expected.clone().into()),
        actual: Some(actual.clone().into()),
        mismatch: mismatch.clone()
      },
      other => other.clone()
    }
  }).collect()
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use pact_models::matchingrules_list;
  use pact_models::matchingrules::MatchingRule;

  use crate::DiffConfig;

  use super::*;

  fn empty_context() -> MatchingContext {
    MatchingContext::empty("body".into(), DiffConfig::NoUnexpectedKeys)
  }

  #[test]
  fn equal_bodies_match() {
    let body = OptionalBody::from("a=1&b=2");
    expect!(match_form_urlencoded(&body, &body.clone(), &empty_context()).is_empty()).to(be_true());
  }

  #[test]
  fn different_values_mismatch() {
    let expected = OptionalBody::from("a=1");
    let actual = OptionalBody::from("a=2");
    let mismatches = match_form_urlencoded(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
    expect!(mismatches[0].mismatch_type()).to(be_equal_to("BodyMismatch"));
  }

  #[test]
  fn matchers_apply_to_parameter_values() {
    let rules = matchingrules_list! {
      "body"; "$.age" => [ MatchingRule::Regex("\\d+".to_string()) ]
    };
    let context = MatchingContext::new(DiffConfig::NoUnexpectedKeys, &rules);
    let expected = OptionalBody::from("age=10");
    let ok = OptionalBody::from("age=99");
    expect!(match_form_urlencoded(&expected, &ok, &context).is_empty()).to(be_true());
  }
}

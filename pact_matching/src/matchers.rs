//! Matching rule implementations: applying a single rule to a pair of values

use anyhow::anyhow;
use onig::Regex;
use semver::Version;
use serde_json::Value;
use tracing::{debug, instrument};

use pact_models::HttpStatus;
use pact_models::matchingrules::{MatchingRule, RuleList, RuleLogic};
use pact_models::time_utils::validate_datetime;

use crate::binary_utils::match_content_type;

/// Trait for matching rule application: whether the actual value matches the expected
/// one under the given rule
pub trait Matches<A: Clone> {
  /// If the actual value matches self given the matching rule. The cascaded flag is
  /// set when the rule was inherited from a parent selector; rules that do not
  /// cascade are ignored in that case.
  fn matches_with(&self, actual: A, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()>;
}

impl Matches<&str> for &str {
  #[instrument(level = "trace")]
  fn matches_with(&self, actual: &str, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    let result = match matcher {
      MatchingRule::Regex(regex) => match Regex::new(regex) {
        Ok(re) => if re.is_match(actual) {
          Ok(())
        } else {
          Err(anyhow!("Expected '{}' to match '{}'", actual, regex))
        },
        Err(err) => Err(anyhow!("'{}' is not a valid regular expression - {}", regex, err))
      },
      MatchingRule::Equality => if *self == actual {
        Ok(())
      } else {
        Err(anyhow!("Expected '{}' to be equal to '{}'", actual, self))
      },
      MatchingRule::Type |
      MatchingRule::MinType(_) |
      MatchingRule::MaxType(_) |
      MatchingRule::MinMaxType(_, _) => Ok(()),
      MatchingRule::Include(substr) => if actual.contains(substr) {
        Ok(())
      } else {
        Err(anyhow!("Expected '{}' to include '{}'", actual, substr))
      },
      MatchingRule::Number | MatchingRule::Decimal => match actual.parse::<f64>() {
        Ok(_) => Ok(()),
        Err(_) => Err(anyhow!("Expected '{}' to match a number", actual))
      },
      MatchingRule::Integer => match actual.parse::<i64>() {
        Ok(_) => Ok(()),
        Err(_) => Err(anyhow!("Expected '{}' to match an integer number", actual))
      },
      MatchingRule::Date(format) => validate_datetime(actual, format)
        .map_err(|_| anyhow!("Expected '{}' to match a date pattern of '{}'", actual, format)),
      MatchingRule::Time(format) => validate_datetime(actual, format)
        .map_err(|_| anyhow!("Expected '{}' to match a time pattern of '{}'", actual, format)),
      MatchingRule::Timestamp(format) => validate_datetime(actual, format)
        .map_err(|_| anyhow!("Expected '{}' to match a timestamp pattern of '{}'", actual, format)),
      MatchingRule::Boolean => if actual == "true" || actual == "false" {
        Ok(())
      } else {
        Err(anyhow!("Expected '{}' to match a boolean", actual))
      },
      MatchingRule::StatusCode(status) => match actual.parse::<u16>() {
        Ok(status_code) => match_status_code(status_code, status),
        Err(err) => Err(anyhow!("Unable to match '{}' using {:?} - {}", actual, matcher, err))
      },
      MatchingRule::NotEmpty => if actual.is_empty() {
        Err(anyhow!("Expected a non-empty string"))
      } else {
        Ok(())
      },
      MatchingRule::Semver => match Version::parse(actual) {
        Ok(_) => Ok(()),
        Err(err) => Err(anyhow!("'{}' is not a valid semantic version - {}", actual, err))
      },
      MatchingRule::ContentType(content_type) => match_content_type(actual.as_bytes(), content_type.as_str()),
      _ => if !cascaded || matcher.can_cascade() {
        Err(anyhow!("Unable to match '{}' using {:?}", self, matcher))
      } else {
        Ok(())
      }
    };
    debug!(cascaded, ?matcher, "String -> String: comparing '{}' to '{}' ==> {}", self, actual, result.is_ok());
    result
  }
}

impl Matches<&str> for String {
  fn matches_with(&self, actual: &str, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    self.as_str().matches_with(actual, matcher, cascaded)
  }
}

impl Matches<&String> for &String {
  fn matches_with(&self, actual: &String, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    self.as_str().matches_with(actual.as_str(), matcher, cascaded)
  }
}

impl Matches<String> for String {
  fn matches_with(&self, actual: String, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    self.as_str().matches_with(actual.as_str(), matcher, cascaded)
  }
}

impl Matches<&u16> for &u16 {
  #[instrument(level = "trace")]
  fn matches_with(&self, actual: &u16, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    match matcher {
      MatchingRule::StatusCode(status) => match_status_code(*actual, status),
      _ => (**self as u64).matches_with(*actual as u64, matcher, cascaded)
    }
  }
}

impl Matches<u64> for u64 {
  #[instrument(level = "trace")]
  fn matches_with(&self, actual: u64, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    let result = match matcher {
      MatchingRule::Regex(regex) => match Regex::new(regex) {
        Ok(re) => if re.is_match(&actual.to_string()) {
          Ok(())
        } else {
          Err(anyhow!("Expected {} to match '{}'", actual, regex))
        },
        Err(err) => Err(anyhow!("'{}' is not a valid regular expression - {}", regex, err))
      },
      MatchingRule::Type |
      MatchingRule::MinType(_) |
      MatchingRule::MaxType(_) |
      MatchingRule::MinMaxType(_, _) => Ok(()),
      MatchingRule::Equality => if *self == actual {
        Ok(())
      } else {
        Err(anyhow!("Expected {} to be equal to {}", actual, self))
      },
      MatchingRule::Include(substr) => if actual.to_string().contains(substr) {
        Ok(())
      } else {
        Err(anyhow!("Expected {} to include '{}'", actual, substr))
      },
      MatchingRule::Number | MatchingRule::Integer => Ok(()),
      MatchingRule::Decimal => Err(anyhow!("Expected {} to match a decimal number", actual)),
      MatchingRule::StatusCode(status) => match_status_code(actual as u16, status),
      MatchingRule::NotEmpty => Ok(()),
      _ => if !cascaded || matcher.can_cascade() {
        Err(anyhow!("Unable to match {} using {:?}", self, matcher))
      } else {
        Ok(())
      }
    };
    debug!(cascaded, ?matcher, "u64 -> u64: comparing {} to {} ==> {}", self, actual, result.is_ok());
    result
  }
}

impl Matches<f64> for f64 {
  #[allow(clippy::float_cmp)]
  #[instrument(level = "trace")]
  fn matches_with(&self, actual: f64, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    let result = match matcher {
      MatchingRule::Regex(regex) => match Regex::new(regex) {
        Ok(re) => if re.is_match(&actual.to_string()) {
          Ok(())
        } else {
          Err(anyhow!("Expected {} to match '{}'", actual, regex))
        },
        Err(err) => Err(anyhow!("'{}' is not a valid regular expression - {}", regex, err))
      },
      MatchingRule::Type |
      MatchingRule::MinType(_) |
      MatchingRule::MaxType(_) |
      MatchingRule::MinMaxType(_, _) => Ok(()),
      MatchingRule::Equality => if *self == actual {
        Ok(())
      } else {
        Err(anyhow!("Expected {} to be equal to {}", actual, self))
      },
      MatchingRule::Include(substr) => if actual.to_string().contains(substr) {
        Ok(())
      } else {
        Err(anyhow!("Expected {} to include '{}'", actual, substr))
      },
      MatchingRule::Number | MatchingRule::Decimal => Ok(()),
      MatchingRule::Integer => if actual.fract() == 0.0 {
        Ok(())
      } else {
        Err(anyhow!("Expected {} to match an integer number", actual))
      },
      MatchingRule::NotEmpty => Ok(()),
      _ => if !cascaded || matcher.can_cascade() {
        Err(anyhow!("Unable to match {} using {:?}", self, matcher))
      } else {
        Ok(())
      }
    };
    debug!(cascaded, ?matcher, "f64 -> f64: comparing {} to {} ==> {}", self, actual, result.is_ok());
    result
  }
}

impl Matches<bool> for bool {
  #[instrument(level = "trace")]
  fn matches_with(&self, actual: bool, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    match matcher {
      MatchingRule::Equality => if *self == actual {
        Ok(())
      } else {
        Err(anyhow!("Expected {} to be equal to {}", actual, self))
      },
      MatchingRule::Type | MatchingRule::Boolean => Ok(()),
      _ => if !cascaded || matcher.can_cascade() {
        Err(anyhow!("Unable to match {} using {:?}", self, matcher))
      } else {
        Ok(())
      }
    }
  }
}

fn json_type_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "Null",
    Value::Bool(_) => "Boolean",
    Value::Number(n) => if n.is_f64() { "Decimal" } else { "Integer" },
    Value::String(_) => "String",
    Value::Array(_) => "Array",
    Value::Object(_) => "Object"
  }
}

impl Matches<&Value> for &Value {
  #[instrument(level = "trace")]
  fn matches_with(&self, actual: &Value, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    let result = match matcher {
      MatchingRule::Equality => if *self == actual {
        Ok(())
      } else {
        Err(anyhow!("Expected {} to be equal to {}", value_for_display(actual), value_for_display(self)))
      },
      MatchingRule::Type |
      MatchingRule::MinType(_) |
      MatchingRule::MaxType(_) |
      MatchingRule::MinMaxType(_, _) => {
        let expected_type = json_type_of(self);
        let actual_type = json_type_of(actual);
        // integers and decimals are both acceptable for a number-typed example
        let types_match = expected_type == actual_type ||
          (matches!(self, Value::Number(_)) && matches!(actual, Value::Number(_)));
        if types_match {
          Ok(())
        } else {
          Err(anyhow!("Expected {} ({}) to be the same type as {} ({})",
            value_for_display(actual), actual_type, value_for_display(self), expected_type))
        }
      },
      MatchingRule::Regex(regex) => match Regex::new(regex) {
        Ok(re) => {
          let actual_str = value_as_string(actual);
          if re.is_match(&actual_str) {
            Ok(())
          } else {
            Err(anyhow!("Expected '{}' to match '{}'", actual_str, regex))
          }
        },
        Err(err) => Err(anyhow!("'{}' is not a valid regular expression - {}", regex, err))
      },
      MatchingRule::Include(substr) => {
        let actual_str = value_as_string(actual);
        if actual_str.contains(substr) {
          Ok(())
        } else {
          Err(anyhow!("Expected '{}' to include '{}'", actual_str, substr))
        }
      },
      MatchingRule::Number => match actual {
        Value::Number(_) => Ok(()),
        Value::String(s) if s.parse::<f64>().is_ok() => Ok(()),
        _ => Err(anyhow!("Expected {} to be a number", value_for_display(actual)))
      },
      MatchingRule::Integer => match actual {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(()),
        Value::String(s) if s.parse::<i64>().is_ok() => Ok(()),
        _ => Err(anyhow!("Expected {} to be an integer", value_for_display(actual)))
      },
      MatchingRule::Decimal => match actual {
        Value::Number(n) if n.is_f64() => Ok(()),
        Value::String(s) if s.parse::<f64>().is_ok() && s.contains('.') => Ok(()),
        _ => Err(anyhow!("Expected {} to be a decimal number", value_for_display(actual)))
      },
      MatchingRule::Boolean => match actual {
        Value::Bool(_) => Ok(()),
        Value::String(s) if s == "true" || s == "false" => Ok(()),
        _ => Err(anyhow!("Expected {} to be a boolean", value_for_display(actual)))
      },
      MatchingRule::Null => match actual {
        Value::Null => Ok(()),
        _ => Err(anyhow!("Expected {} to be a null value", value_for_display(actual)))
      },
      MatchingRule::Date(format) => validate_datetime(&value_as_string(actual), format)
        .map_err(|_| anyhow!("Expected '{}' to match a date pattern of '{}'", value_as_string(actual), format)),
      MatchingRule::Time(format) => validate_datetime(&value_as_string(actual), format)
        .map_err(|_| anyhow!("Expected '{}' to match a time pattern of '{}'", value_as_string(actual), format)),
      MatchingRule::Timestamp(format) => validate_datetime(&value_as_string(actual), format)
        .map_err(|_| anyhow!("Expected '{}' to match a timestamp pattern of '{}'", value_as_string(actual), format)),
      MatchingRule::ContentType(content_type) =>
        match_content_type(value_as_string(actual).as_bytes(), content_type.as_str()),
      MatchingRule::NotEmpty => match actual {
        Value::Null => Err(anyhow!("Expected a non-empty value but got null")),
        Value::String(s) if s.is_empty() => Err(anyhow!("Expected a non-empty string")),
        Value::Array(a) if a.is_empty() => Err(anyhow!("Expected a non-empty array")),
        Value::Object(o) if o.is_empty() => Err(anyhow!("Expected a non-empty object")),
        _ => Ok(())
      },
      MatchingRule::Semver => match actual {
        Value::String(s) => match Version::parse(s) {
          Ok(_) => Ok(()),
          Err(err) => Err(anyhow!("'{}' is not a valid semantic version - {}", s, err))
        },
        _ => Err(anyhow!("Expected {} to be a semantic version string", value_for_display(actual)))
      },
      MatchingRule::StatusCode(status) => match actual.as_u64() {
        Some(status_code) => match_status_code(status_code as u16, status),
        None => Err(anyhow!("Expected {} to be a status code", value_for_display(actual)))
      },
      // structural rules are applied by the tree walkers, not at scalar sites
      _ => if !cascaded || matcher.can_cascade() {
        Err(anyhow!("Unable to match {} using {:?}", value_for_display(self), matcher))
      } else {
        Ok(())
      }
    };
    debug!(cascaded, ?matcher, "Value -> Value: comparing {} to {} ==> {}",
      value_for_display(self), value_for_display(actual), result.is_ok());
    result
  }
}

impl Matches<&Value> for Value {
  fn matches_with(&self, actual: &Value, matcher: &MatchingRule, cascaded: bool) -> anyhow::Result<()> {
    (&self).matches_with(actual, matcher, cascaded)
  }
}

/// Renders a JSON value as a string for use in matching (strings are unquoted)
pub fn value_as_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    _ => value.to_string()
  }
}

fn value_for_display(value: &Value) -> String {
  match value {
    Value::String(s) => format!("'{}'", s),
    _ => value.to_string()
  }
}

/// Matches a status code against a status class
pub fn match_status_code(status_code: u16, status: &HttpStatus) -> anyhow::Result<()> {
  if status.matches(status_code) {
    Ok(())
  } else {
    Err(anyhow!("Expected status code {} to be a {} response", status_code, status))
  }
}

/// Applies a rule list to a pair of values, combining the results according to the
/// rule logic. For `AND`, the rules are applied in attachment order and only the first
/// failing rule is reported, which keeps the output bounded. For `OR`, the match
/// accepts if any rule accepts, and a single aggregate failure is reported when every
/// alternative has failed.
pub fn match_values<E, A>(path: &[&str], rules: &RuleList, expected: E, actual: A) -> Result<(), Vec<String>>
  where E: Matches<A>, A: Clone
{
  if rules.is_empty() {
    Err(vec![ format!("No matcher found for path '{}'", path.join(".")) ])
  } else {
    match rules.rule_logic {
      RuleLogic::And => {
        for rule in &rules.rules {
          if let Err(err) = expected.matches_with(actual.clone(), rule, rules.cascaded) {
            return Err(vec![ err.to_string() ]);
          }
        }
        Ok(())
      },
      RuleLogic::Or => {
        let mut errors = vec![];
        for rule in &rules.rules {
          match expected.matches_with(actual.clone(), rule, rules.cascaded) {
            Ok(_) => return Ok(()),
            Err(err) => errors.push(err.to_string())
          }
        }
        Err(vec![ errors.join(", ") ])
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use serde_json::json;

  use pact_models::matchingrules::RuleList;

  use super::*;

  #[test]
  fn regex_matcher_on_strings() {
    let matcher = MatchingRule::Regex("^[a-f0-9]{8}$".to_string());
    expect!("deadbeef".matches_with("01234567", &matcher, false)).to(be_ok());
    expect!("deadbeef".matches_with("deadbeef-xx", &matcher, false)).to(be_err());
  }

  #[test]
  fn equality_matcher_on_strings() {
    expect!("a".matches_with("a", &MatchingRule::Equality, false)).to(be_ok());
    expect!("a".matches_with("b", &MatchingRule::Equality, false)).to(be_err());
  }

  #[test]
  fn type_matcher_on_values() {
    let expected = json!(100);
    expect!((&expected).matches_with(&json!(200), &MatchingRule::Type, false)).to(be_ok());
    expect!((&expected).matches_with(&json!(100.5), &MatchingRule::Type, false)).to(be_ok());
    expect!((&expected).matches_with(&json!("100"), &MatchingRule::Type, false)).to(be_err());
  }

  #[test]
  fn number_type_predicates() {
    expect!((&json!(0)).matches_with(&json!(100), &MatchingRule::Integer, false)).to(be_ok());
    expect!((&json!(0)).matches_with(&json!(100.1), &MatchingRule::Integer, false)).to(be_err());
    expect!((&json!(0)).matches_with(&json!(100.1), &MatchingRule::Decimal, false)).to(be_ok());
    expect!((&json!(0)).matches_with(&json!(100), &MatchingRule::Decimal, false)).to(be_err());
    expect!((&json!(0)).matches_with(&json!(100), &MatchingRule::Number, false)).to(be_ok());
    expect!((&json!(0)).matches_with(&json!("abc"), &MatchingRule::Number, false)).to(be_err());
  }

  #[test]
  fn boolean_and_null_predicates() {
    expect!((&json!(true)).matches_with(&json!(false), &MatchingRule::Boolean, false)).to(be_ok());
    expect!((&json!(true)).matches_with(&json!("true"), &MatchingRule::Boolean, false)).to(be_ok());
    expect!((&json!(true)).matches_with(&json!(1), &MatchingRule::Boolean, false)).to(be_err());
    expect!((&json!(null)).matches_with(&json!(null), &MatchingRule::Null, false)).to(be_ok());
    expect!((&json!(null)).matches_with(&json!(1), &MatchingRule::Null, false)).to(be_err());
  }

  #[test]
  fn include_matcher() {
    expect!((&json!("")).matches_with(&json!("the quick brown fox"), &MatchingRule::Include("quick".to_string()), false)).to(be_ok());
    expect!((&json!("")).matches_with(&json!("the slow brown fox"), &MatchingRule::Include("quick".to_string()), false)).to(be_err());
  }

  #[test]
  fn not_empty_matcher() {
    expect!((&json!("")).matches_with(&json!("x"), &MatchingRule::NotEmpty, false)).to(be_ok());
    expect!((&json!("")).matches_with(&json!(""), &MatchingRule::NotEmpty, false)).to(be_err());
    expect!((&json!([])).matches_with(&json!([]), &MatchingRule::NotEmpty, false)).to(be_err());
    expect!((&json!([])).matches_with(&json!([1]), &MatchingRule::NotEmpty, false)).to(be_ok());
  }

  #[test]
  fn semver_matcher() {
    expect!((&json!("")).matches_with(&json!("1.2.3"), &MatchingRule::Semver, false)).to(be_ok());
    expect!((&json!("")).matches_with(&json!("not-semver"), &MatchingRule::Semver, false)).to(be_err());
  }

  #[test]
  fn timestamp_matchers() {
    let date = MatchingRule::Date("yyyy-MM-dd".to_string());
    expect!((&json!("")).matches_with(&json!("2023-01-01"), &date, false)).to(be_ok());
    expect!((&json!("")).matches_with(&json!("01-01-2023"), &date, false)).to(be_err());
  }

  #[test]
  fn status_code_matcher() {
    let matcher = MatchingRule::StatusCode(HttpStatus::Success);
    expect!((&201u16).matches_with(&201u16, &matcher, false)).to(be_ok());
    expect!((&201u16).matches_with(&404u16, &matcher, false)).to(be_err());
  }

  #[test]
  fn and_logic_reports_only_the_first_failure() {
    let mut rules = RuleList::new(MatchingRule::Integer);
    rules.add_rule(&MatchingRule::Regex("\\d{10}".to_string()));
    let result = match_values(&["$", "id"], &rules, &json!(0), &json!("abc"));
    let errors = result.unwrap_err();
    expect!(errors.len()).to(be_equal_to(1));
    expect!(errors[0].contains("integer")).to(be_true());
  }

  #[test]
  fn or_logic_accepts_if_any_rule_accepts() {
    let mut rules = RuleList::empty(RuleLogic::Or);
    rules.add_rule(&MatchingRule::Integer);
    rules.add_rule(&MatchingRule::Boolean);
    expect!(match_values(&["$"], &rules, &json!(0), &json!(true))).to(be_ok());
    expect!(match_values(&["$"], &rules, &json!(0), &json!("abc"))).to(be_err());
  }
}

//! Parser for `${name}` expressions used by provider-state generators

use std::collections::HashMap;

use anyhow::anyhow;
use serde_json::Value;

use crate::json_utils::json_to_string;

/// If the given string contains any `${...}` expressions
pub fn contains_expressions(expression: &str) -> bool {
  expression.contains("${")
}

/// Evaluates the expression against the given values, replacing each `${name}` with the
/// corresponding value. If the expression is a single `${name}` with no surrounding
/// text, the raw value is returned (so numbers stay numbers); otherwise the result is a
/// string with all expressions substituted.
pub fn parse_expression(expression: &str, values: &HashMap<String, Value>) -> anyhow::Result<Value> {
  let mut result = String::new();
  let mut chars = expression.chars().peekable();
  let mut single_value: Option<Value> = None;
  let mut parts = 0;

  while let Some(ch) = chars.next() {
    if ch == '$' && chars.peek() == Some(&'{') {
      chars.next();
      let mut name = String::new();
      loop {
        match chars.next() {
          Some('}') => break,
          Some(ch) => name.push(ch),
          None => return Err(anyhow!("Missing closing brace in expression string \"{}\"", expression))
        }
      }
      if name.is_empty() {
        return Err(anyhow!("Expression \"{}\" contains an empty expression", expression));
      }
      match values.get(&name) {
        Some(value) => {
          parts += 1;
          single_value = Some(value.clone());
          result.push_str(&json_to_string(value));
        },
        None => return Err(anyhow!("No value for '{}' found in the provider state values", name))
      }
    } else {
      parts += 1;
      single_value = None;
      result.push(ch);
      // consecutive literal characters only count as one part
      while let Some(next) = chars.peek() {
        if *next == '$' {
          break;
        }
        result.push(*next);
        chars.next();
      }
    }
  }

  if parts == 1 {
    if let Some(value) = single_value {
      return Ok(value);
    }
  }
  Ok(Value::String(result))
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use super::*;

  #[test]
  fn contains_expressions_test() {
    expect!(contains_expressions("${a}")).to(be_true());
    expect!(contains_expressions("/path/${a}")).to(be_true());
    expect!(contains_expressions("/path/a")).to(be_false());
  }

  #[test]
  fn single_expression_returns_the_raw_value() {
    let values = hashmap!{ "a".to_string() => json!(100) };
    expect!(parse_expression("${a}", &values).unwrap()).to(be_equal_to(json!(100)));
  }

  #[test]
  fn mixed_expression_returns_a_string() {
    let values = hashmap!{ "id".to_string() => json!(100) };
    expect!(parse_expression("/users/${id}", &values).unwrap()).to(be_equal_to(json!("/users/100")));
  }

  #[test]
  fn multiple_expressions_are_all_substituted() {
    let values = hashmap!{ "a".to_string() => json!(1), "b".to_string() => json!("two") };
    expect!(parse_expression("${a}-${b}", &values).unwrap()).to(be_equal_to(json!("1-two")));
  }

  #[test]
  fn missing_value_is_an_error() {
    expect!(parse_expression("${a}", &hashmap!{})).to(be_err());
  }

  #[test]
  fn unterminated_expression_is_an_error() {
    let values = hashmap!{ "a".to_string() => json!(1) };
    expect!(parse_expression("${a", &values)).to(be_err());
  }
}

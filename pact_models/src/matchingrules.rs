//! Matching-rule model: the data language interactions use to describe how values are
//! compared. Covers the V2 (flat selector) and V3/V4 (category tree) JSON forms.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::mem;
use std::str::FromStr;

use anyhow::{anyhow, Context};
use itertools::Itertools;
use maplit::hashmap;
use serde_json::{json, Map, Value};
use tracing::{error, trace, warn};

use crate::{HttpStatus, PactSpecification};
use crate::generators::Generator;
use crate::json_utils::{json_to_num, json_to_string};
use crate::path_exp::DocPath;

/// A single matching rule: the predicate applied to a value site
#[derive(Debug, Clone, Eq)]
pub enum MatchingRule {
  /// Matcher using equality
  Equality,
  /// Match using a regular expression
  Regex(String),
  /// Match using the type of the value
  Type,
  /// Match using the type of the value and a minimum length for collections
  MinType(usize),
  /// Match using the type of the value and a maximum length for collections
  MaxType(usize),
  /// Match using the type of the value and minimum and maximum lengths for collections
  MinMaxType(usize, usize),
  /// Match the value using a timestamp pattern
  Timestamp(String),
  /// Match the value using a time pattern
  Time(String),
  /// Match the value using a date pattern
  Date(String),
  /// Match if the actual value includes the given string
  Include(String),
  /// Match if the value is a number
  Number,
  /// Match if the value is an integer number
  Integer,
  /// Match if the value is a decimal number
  Decimal,
  /// Match if the value is a null value (content specific, for JSON will match a JSON null)
  Null,
  /// Match binary data by its content type (magic file check)
  ContentType(String),
  /// Match array items in any order against a list of variants
  ArrayContains(Vec<(usize, MatchingRuleCategory, HashMap<DocPath, Generator>)>),
  /// Matcher for values in a map, ignoring the keys
  Values,
  /// Matches boolean values (booleans and the string values `true` and `false`)
  Boolean,
  /// Response status code matcher
  StatusCode(HttpStatus),
  /// Matches non-empty collections and strings
  NotEmpty,
  /// Matches strings that parse as semantic versions
  Semver,
  /// Match each key of a map against a list of rules
  EachKey(Vec<MatchingRule>),
  /// Match each value of a map against a list of rules
  EachValue(Vec<MatchingRule>)
}

impl MatchingRule {
  /// Builds a `MatchingRule` from a JSON `Value`
  pub fn from_json(value: &Value) -> anyhow::Result<MatchingRule> {
    match value {
      Value::Object(m) => match m.get("match") {
        Some(match_val) => {
          let val = json_to_string(match_val);
          MatchingRule::create(val.as_str(), value)
        },
        // V2 format rules can leave the "match" attribute out
        None => if let Some(val) = m.get("regex") {
          Ok(MatchingRule::Regex(json_to_string(val)))
        } else if let Some(val) = json_to_num(m.get("min").cloned()) {
          Ok(MatchingRule::MinType(val))
        } else if let Some(val) = json_to_num(m.get("max").cloned()) {
          Ok(MatchingRule::MaxType(val))
        } else if let Some(val) = m.get("timestamp") {
          Ok(MatchingRule::Timestamp(json_to_string(val)))
        } else if let Some(val) = m.get("time") {
          Ok(MatchingRule::Time(json_to_string(val)))
        } else if let Some(val) = m.get("date") {
          Ok(MatchingRule::Date(json_to_string(val)))
        } else {
          Err(anyhow!("Matching rule missing 'match' field and unable to guess its type"))
        }
      },
      _ => Err(anyhow!("Matching rule JSON is not an Object"))
    }
  }

  /// Creates a `MatchingRule` from a type tag and a map of attributes
  pub fn create(rule_type: &str, attributes: &Value) -> anyhow::Result<MatchingRule> {
    trace!("MatchingRule::create: rule_type={}, attributes={}", rule_type, attributes);
    let attributes = match attributes {
      Value::Object(values) => values,
      _ => {
        error!("Matching rule attributes {} are not valid", attributes);
        return Err(anyhow!("Matching rule attributes {} are not valid", attributes));
      }
    };
    match rule_type {
      "equality" => Ok(MatchingRule::Equality),
      "regex" => match attributes.get(rule_type) {
        Some(s) => Ok(MatchingRule::Regex(json_to_string(s))),
        None => Err(anyhow!("Regex matcher missing 'regex' field"))
      },
      "type" => match (json_to_num(attributes.get("min").cloned()), json_to_num(attributes.get("max").cloned())) {
        (Some(min), Some(max)) => Ok(MatchingRule::MinMaxType(min, max)),
        (Some(min), None) => Ok(MatchingRule::MinType(min)),
        (None, Some(max)) => Ok(MatchingRule::MaxType(max)),
        _ => Ok(MatchingRule::Type)
      },
      "min" => match json_to_num(attributes.get(rule_type).cloned()) {
        Some(min) => Ok(MatchingRule::MinType(min)),
        None => Err(anyhow!("Min matcher missing 'min' field"))
      },
      "max" => match json_to_num(attributes.get(rule_type).cloned()) {
        Some(max) => Ok(MatchingRule::MaxType(max)),
        None => Err(anyhow!("Max matcher missing 'max' field"))
      },
      "timestamp" | "datetime" => match attributes.get("format").or_else(|| attributes.get(rule_type)) {
        Some(s) => Ok(MatchingRule::Timestamp(json_to_string(s))),
        None => Err(anyhow!("Timestamp matcher missing 'timestamp' or 'format' field"))
      },
      "date" => match attributes.get("format").or_else(|| attributes.get(rule_type)) {
        Some(s) => Ok(MatchingRule::Date(json_to_string(s))),
        None => Err(anyhow!("Date matcher missing 'date' or 'format' field"))
      },
      "time" => match attributes.get("format").or_else(|| attributes.get(rule_type)) {
        Some(s) => Ok(MatchingRule::Time(json_to_string(s))),
        None => Err(anyhow!("Time matcher missing 'time' or 'format' field"))
      },
      "include" => match attributes.get("value") {
        Some(s) => Ok(MatchingRule::Include(json_to_string(s))),
        None => Err(anyhow!("Include matcher missing 'value' field"))
      },
      "number" => Ok(MatchingRule::Number),
      "integer" => Ok(MatchingRule::Integer),
      "decimal" | "real" => Ok(MatchingRule::Decimal),
      "boolean" => Ok(MatchingRule::Boolean),
      "null" => Ok(MatchingRule::Null),
      "contentType" => match attributes.get("value") {
        Some(s) => Ok(MatchingRule::ContentType(json_to_string(s))),
        None => Err(anyhow!("ContentType matcher missing 'value' field"))
      },
      "arrayContains" => match attributes.get("variants") {
        Some(Value::Array(variants)) => {
          let mut values = Vec::new();
          for variant in variants {
            let index = json_to_num(variant.get("index").cloned()).unwrap_or_default();
            let mut category = MatchingRuleCategory::empty("body");
            if let Some(rules) = variant.get("rules") {
              category.add_rules_from_json(rules)
                .with_context(|| format!("Unable to parse matching rules: {:?}", rules))?;
            } else {
              category.add_rule(DocPath::empty(), MatchingRule::Equality, RuleLogic::And);
            }
            let generators = match variant.get("generators") {
              Some(Value::Object(map)) => {
                let mut g = hashmap!{};
                for (k, v) in map {
                  if let Value::Object(generator_map) = v {
                    let path = DocPath::new(k)?;
                    if let Some(generator) = Generator::from_map(&json_to_string(
                        generator_map.get("type").unwrap_or(&Value::Null)), generator_map) {
                      g.insert(path, generator);
                    }
                  }
                }
                g
              },
              _ => hashmap!{}
            };
            values.push((index, category, generators));
          }
          Ok(MatchingRule::ArrayContains(values))
        },
        Some(_) => Err(anyhow!("ArrayContains matcher 'variants' field is not an Array")),
        None => Err(anyhow!("ArrayContains matcher missing 'variants' field"))
      },
      "values" => Ok(MatchingRule::Values),
      "statusCode" => match attributes.get("status") {
        Some(s) => {
          let status = HttpStatus::from_json(s)
            .context("Unable to parse status code for StatusCode matcher")?;
          Ok(MatchingRule::StatusCode(status))
        },
        None => Ok(MatchingRule::StatusCode(HttpStatus::Success))
      },
      "notEmpty" => Ok(MatchingRule::NotEmpty),
      "semver" => Ok(MatchingRule::Semver),
      "eachKey" => Ok(MatchingRule::EachKey(Self::sub_rules_from_json(attributes)?)),
      "eachValue" => Ok(MatchingRule::EachValue(Self::sub_rules_from_json(attributes)?)),
      _ => Err(anyhow!("{} is not a valid matching rule type", rule_type))
    }
  }

  fn sub_rules_from_json(attributes: &Map<String, Value>) -> anyhow::Result<Vec<MatchingRule>> {
    match attributes.get("rules") {
      Some(Value::Array(rules)) => rules.iter()
        .map(MatchingRule::from_json)
        .collect(),
      Some(_) => Err(anyhow!("'rules' field must be an Array")),
      None => Ok(vec![])
    }
  }

  /// Converts this `MatchingRule` to its JSON form
  pub fn to_json(&self) -> Value {
    match self {
      MatchingRule::Equality => json!({ "match": "equality" }),
      MatchingRule::Regex(r) => json!({ "match": "regex", "regex": r }),
      MatchingRule::Type => json!({ "match": "type" }),
      MatchingRule::MinType(min) => json!({ "match": "type", "min": min }),
      MatchingRule::MaxType(max) => json!({ "match": "type", "max": max }),
      MatchingRule::MinMaxType(min, max) => json!({ "match": "type", "min": min, "max": max }),
      MatchingRule::Timestamp(t) => json!({ "match": "timestamp", "timestamp": t }),
      MatchingRule::Time(t) => json!({ "match": "time", "time": t }),
      MatchingRule::Date(d) => json!({ "match": "date", "date": d }),
      MatchingRule::Include(s) => json!({ "match": "include", "value": s }),
      MatchingRule::Number => json!({ "match": "number" }),
      MatchingRule::Integer => json!({ "match": "integer" }),
      MatchingRule::Decimal => json!({ "match": "decimal" }),
      MatchingRule::Boolean => json!({ "match": "boolean" }),
      MatchingRule::Null => json!({ "match": "null" }),
      MatchingRule::ContentType(ct) => json!({ "match": "contentType", "value": ct }),
      MatchingRule::ArrayContains(variants) => json!({
        "match": "arrayContains",
        "variants": variants.iter().map(|(index, rules, generators)| {
          let mut variant = json!({
            "index": index,
            "rules": rules.to_v3_json()
          });
          if !generators.is_empty() {
            variant["generators"] = Value::Object(generators.iter()
              .filter_map(|(k, gen)| gen.to_json().map(|json| (String::from(k), json)))
              .collect());
          }
          variant
        }).collect::<Vec<Value>>()
      }),
      MatchingRule::Values => json!({ "match": "values" }),
      MatchingRule::StatusCode(status) => json!({ "match": "statusCode", "status": status.to_json() }),
      MatchingRule::NotEmpty => json!({ "match": "notEmpty" }),
      MatchingRule::Semver => json!({ "match": "semver" }),
      MatchingRule::EachKey(rules) => json!({
        "match": "eachKey",
        "rules": rules.iter().map(|rule| rule.to_json()).collect::<Vec<Value>>()
      }),
      MatchingRule::EachValue(rules) => json!({
        "match": "eachValue",
        "rules": rules.iter().map(|rule| rule.to_json()).collect::<Vec<Value>>()
      })
    }
  }

  /// The wire-format name of this matching rule
  pub fn name(&self) -> String {
    match self {
      MatchingRule::Equality => "equality",
      MatchingRule::Regex(_) => "regex",
      MatchingRule::Type => "type",
      MatchingRule::MinType(_) => "min",
      MatchingRule::MaxType(_) => "max",
      MatchingRule::MinMaxType(_, _) => "min-max",
      MatchingRule::Timestamp(_) => "datetime",
      MatchingRule::Time(_) => "time",
      MatchingRule::Date(_) => "date",
      MatchingRule::Include(_) => "include",
      MatchingRule::Number => "number",
      MatchingRule::Integer => "integer",
      MatchingRule::Decimal => "decimal",
      MatchingRule::Null => "null",
      MatchingRule::ContentType(_) => "content-type",
      MatchingRule::ArrayContains(_) => "array-contains",
      MatchingRule::Values => "values",
      MatchingRule::Boolean => "boolean",
      MatchingRule::StatusCode(_) => "status-code",
      MatchingRule::NotEmpty => "not-empty",
      MatchingRule::Semver => "semver",
      MatchingRule::EachKey(_) => "each-key",
      MatchingRule::EachValue(_) => "each-value"
    }.to_string()
  }

  /// If this rule cascades to child values when set on a parent
  pub fn can_cascade(&self) -> bool {
    !matches!(self, MatchingRule::Values | MatchingRule::ArrayContains(_) |
      MatchingRule::EachKey(_) | MatchingRule::EachValue(_))
  }

  /// If this is a type matcher (with or without length bounds)
  pub fn is_type_matcher(&self) -> bool {
    matches!(self, MatchingRule::Type | MatchingRule::MinType(_) | MatchingRule::MaxType(_) |
      MatchingRule::MinMaxType(_, _))
  }

  /// If this is a length-bounded matcher
  pub fn is_length_type_matcher(&self) -> bool {
    matches!(self, MatchingRule::MinType(_) | MatchingRule::MaxType(_) | MatchingRule::MinMaxType(_, _))
  }
}

impl Hash for MatchingRule {
  fn hash<H: Hasher>(&self, state: &mut H) {
    mem::discriminant(self).hash(state);
    match self {
      MatchingRule::Regex(s) => s.hash(state),
      MatchingRule::MinType(min) => min.hash(state),
      MatchingRule::MaxType(max) => max.hash(state),
      MatchingRule::MinMaxType(min, max) => {
        min.hash(state);
        max.hash(state);
      },
      MatchingRule::Timestamp(format) => format.hash(state),
      MatchingRule::Time(format) => format.hash(state),
      MatchingRule::Date(format) => format.hash(state),
      MatchingRule::Include(str) => str.hash(state),
      MatchingRule::ContentType(str) => str.hash(state),
      MatchingRule::StatusCode(status) => status.hash(state),
      MatchingRule::ArrayContains(variants) => for (index, rules, generators) in variants {
        index.hash(state);
        rules.hash(state);
        for (path, gen) in generators {
          path.hash(state);
          gen.hash(state);
        }
      },
      MatchingRule::EachKey(rules) | MatchingRule::EachValue(rules) => for rule in rules {
        rule.hash(state);
      },
      _ => ()
    }
  }
}

impl PartialEq for MatchingRule {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (MatchingRule::Regex(s1), MatchingRule::Regex(s2)) => s1 == s2,
      (MatchingRule::MinType(min1), MatchingRule::MinType(min2)) => min1 == min2,
      (MatchingRule::MaxType(max1), MatchingRule::MaxType(max2)) => max1 == max2,
      (MatchingRule::MinMaxType(min1, max1), MatchingRule::MinMaxType(min2, max2)) =>
        min1 == min2 && max1 == max2,
      (MatchingRule::Timestamp(format1), MatchingRule::Timestamp(format2)) => format1 == format2,
      (MatchingRule::Time(format1), MatchingRule::Time(format2)) => format1 == format2,
      (MatchingRule::Date(format1), MatchingRule::Date(format2)) => format1 == format2,
      (MatchingRule::Include(str1), MatchingRule::Include(str2)) => str1 == str2,
      (MatchingRule::ContentType(str1), MatchingRule::ContentType(str2)) => str1 == str2,
      (MatchingRule::StatusCode(s1), MatchingRule::StatusCode(s2)) => s1 == s2,
      (MatchingRule::ArrayContains(variants1), MatchingRule::ArrayContains(variants2)) =>
        variants1 == variants2,
      (MatchingRule::EachKey(rules1), MatchingRule::EachKey(rules2)) => rules1 == rules2,
      (MatchingRule::EachValue(rules1), MatchingRule::EachValue(rules2)) => rules1 == rules2,
      _ => mem::discriminant(self) == mem::discriminant(other)
    }
  }
}

/// Enumeration to define how to combine rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleLogic {
  /// All rules must match
  And,
  /// At least one rule must match
  Or
}

impl RuleLogic {
  fn to_json(self) -> Value {
    Value::String(match self {
      RuleLogic::And => "AND",
      RuleLogic::Or => "OR"
    }.into())
  }
}

impl Default for RuleLogic {
  fn default() -> Self {
    RuleLogic::And
  }
}

/// An ordered list of rules plus the logic needed to combine them
#[derive(Debug, Clone, Eq)]
pub struct RuleList {
  /// List of rules to apply
  pub rules: Vec<MatchingRule>,
  /// Rule logic to use to evaluate multiple rules
  pub rule_logic: RuleLogic,
  /// If this rule list matched the exact path or has cascaded from a parent
  pub cascaded: bool
}

impl RuleList {
  /// Creates a new empty rule list
  pub fn empty(rule_logic: RuleLogic) -> RuleList {
    RuleList {
      rules: Vec::new(),
      rule_logic,
      cascaded: false
    }
  }

  /// Creates a default rule list with an equality matcher
  pub fn equality() -> RuleList {
    RuleList::new(MatchingRule::Equality)
  }

  /// Creates a new rule list with the single matching rule
  pub fn new(rule: MatchingRule) -> RuleList {
    RuleList {
      rules: vec![ rule ],
      rule_logic: RuleLogic::And,
      cascaded: false
    }
  }

  /// If the rule list is empty (has no matchers)
  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// Add a matching rule to the rule list
  pub fn add_rule(&mut self, rule: &MatchingRule) {
    self.rules.push(rule.clone())
  }

  /// Clones this rule list, with the cascaded flag set
  pub fn as_cascaded(&self, cascaded: bool) -> RuleList {
    RuleList {
      cascaded,
      .. self.clone()
    }
  }

  /// If there is a type matcher defined in the rule list
  pub fn type_matcher_defined(&self) -> bool {
    self.rules.iter().any(MatchingRule::is_type_matcher)
  }

  /// If the values matcher is defined in the rule list
  pub fn values_matcher_defined(&self) -> bool {
    self.rules.iter().any(|rule| matches!(rule, MatchingRule::Values))
  }

  /// The V3+ JSON form of the rule list
  pub fn to_v3_json(&self) -> Value {
    json!({
      "combine": self.rule_logic.to_json(),
      "matchers": Value::Array(self.rules.iter().map(MatchingRule::to_json).collect())
    })
  }

  /// The V2 JSON form: just the first rule
  pub fn to_v2_json(&self) -> Value {
    match self.rules.first() {
      Some(rule) => rule.to_json(),
      None => json!({})
    }
  }
}

impl Hash for RuleList {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.rule_logic.hash(state);
    for rule in &self.rules {
      rule.hash(state);
    }
  }
}

impl PartialEq for RuleList {
  fn eq(&self, other: &Self) -> bool {
    self.rule_logic == other.rule_logic && self.rules == other.rules
  }
}

impl Default for RuleList {
  fn default() -> Self {
    RuleList::empty(RuleLogic::And)
  }
}

/// Part of the interaction that a matching-rule category applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(clippy::upper_case_acronyms)]
pub enum Category {
  /// Request method
  METHOD,
  /// Request path
  PATH,
  /// Request/response header
  HEADER,
  /// Request query parameter
  QUERY,
  /// Body
  BODY,
  /// Response status
  STATUS,
  /// Message contents (body)
  CONTENTS,
  /// Message metadata
  METADATA
}

impl FromStr for Category {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "method" => Ok(Category::METHOD),
      "path" => Ok(Category::PATH),
      "header" => Ok(Category::HEADER),
      "query" => Ok(Category::QUERY),
      "body" => Ok(Category::BODY),
      "status" => Ok(Category::STATUS),
      "contents" => Ok(Category::CONTENTS),
      "metadata" => Ok(Category::METADATA),
      _ => Err(format!("'{}' is not a valid Category", s))
    }
  }
}

impl From<&str> for Category {
  fn from(s: &str) -> Self {
    Category::from_str(s).unwrap_or_default()
  }
}

impl From<String> for Category {
  fn from(s: String) -> Self {
    Category::from_str(&s).unwrap_or_default()
  }
}

impl Default for Category {
  fn default() -> Self {
    Category::BODY
  }
}

impl Display for Category {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Category::METHOD => "method",
      Category::PATH => "path",
      Category::HEADER => "header",
      Category::QUERY => "query",
      Category::BODY => "body",
      Category::STATUS => "status",
      Category::CONTENTS => "contents",
      Category::METADATA => "metadata"
    };
    write!(f, "{}", s)
  }
}

/// A category of matching rules: a mapping of selectors to rule lists
#[derive(Debug, Clone, Eq, Default)]
pub struct MatchingRuleCategory {
  /// Name of the category
  pub name: Category,
  /// Matching rules for this category, keyed by selector
  pub rules: HashMap<DocPath, RuleList>
}

impl MatchingRuleCategory {
  /// Creates an empty category
  pub fn empty<S>(name: S) -> MatchingRuleCategory
    where S: Into<Category>
  {
    MatchingRuleCategory {
      name: name.into(),
      rules: hashmap!{}
    }
  }

  /// Creates a category with a root equality matcher
  pub fn equality<S>(name: S) -> MatchingRuleCategory
    where S: Into<Category>
  {
    MatchingRuleCategory {
      name: name.into(),
      rules: hashmap!{ DocPath::empty() => RuleList::equality() }
    }
  }

  /// If the category has no rules
  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  /// If the category has any rules
  pub fn is_not_empty(&self) -> bool {
    !self.rules.is_empty()
  }

  /// Adds a rule to this category
  pub fn add_rule(&mut self, key: DocPath, matcher: MatchingRule, rule_logic: RuleLogic) {
    let rules = self.rules.entry(key).or_insert_with(|| RuleList::empty(rule_logic));
    rules.rules.push(matcher);
  }

  /// Adds a rule parsed from its JSON form
  pub fn rule_from_json(&mut self, key: DocPath, matcher_json: &Value, rule_logic: RuleLogic) -> anyhow::Result<()> {
    let matching_rule = MatchingRule::from_json(matcher_json)
      .with_context(|| format!("Could not parse matcher JSON {:?}", matcher_json))?;
    let rules = self.rules.entry(key).or_insert_with(|| RuleList::empty(rule_logic));
    rules.rules.push(matching_rule);
    Ok(())
  }

  /// Filters the rules in the category by the predicate, returning a new category
  pub fn filter<F>(&self, predicate: F) -> MatchingRuleCategory
    where F: Fn(&(&DocPath, &RuleList)) -> bool
  {
    MatchingRuleCategory {
      name: self.name.clone(),
      rules: self.rules.iter().filter(predicate)
        .map(|(path, rules)| (path.clone(), rules.clone())).collect()
    }
  }

  /// Selects the rule list with the highest weight for the path. Ties resolve to the
  /// longest selector; the result carries the cascaded flag when the selector was
  /// shorter than the path.
  fn max_by_path(&self, path: &[&str]) -> RuleList {
    self.rules.iter().map(|(selector, rules)| (selector, rules, selector.path_weight(path)))
      .filter(|&(_, _, (weight, _))| weight > 0)
      .max_by_key(|&(_, _, (weight, tokens))| weight * tokens)
      .map(|(_, rules, (_, tokens))| rules.as_cascaded(tokens != path.len()))
      .unwrap_or_default()
  }

  /// If there is a matcher defined for the path
  pub fn matcher_is_defined(&self, path: &[&str]) -> bool {
    !self.resolve_matchers_for_path(path).is_empty()
  }

  /// Filters this category to the rules that match the given path, for categories that
  /// contain collections (bodies, headers, query parameters). Returns self otherwise.
  pub fn resolve_matchers_for_path(&self, path: &[&str]) -> MatchingRuleCategory {
    match self.name {
      Category::HEADER | Category::QUERY | Category::BODY |
      Category::CONTENTS | Category::METADATA => self.filter(|(selector, _)| {
        selector.matches_path(path)
      }),
      _ => self.clone()
    }
  }

  /// Selects the best matching rule list for the given path
  pub fn select_best_matcher(&self, path: &[&str]) -> RuleList {
    match self.name {
      Category::BODY | Category::METADATA | Category::CONTENTS => self.max_by_path(path),
      _ => self.resolve_matchers_for_path(path).as_rule_list()
    }
  }

  /// Returns this category as a single rule list
  pub fn as_rule_list(&self) -> RuleList {
    self.rules.values().next().cloned().unwrap_or_default()
  }

  /// If there is a type matcher defined in the category
  pub fn type_matcher_defined(&self) -> bool {
    self.rules.values().any(RuleList::type_matcher_defined)
  }

  /// If there is a values matcher defined in the category
  pub fn values_matcher_defined(&self) -> bool {
    self.rules.values().any(RuleList::values_matcher_defined)
  }

  /// If there is a wildcard selector with a type matcher at the given path level
  pub fn wildcard_matcher_is_defined(&self, path: &[&str]) -> bool {
    self.rules.iter()
      .filter(|(selector, _)| selector.is_wildcard() && selector.len() == path.len())
      .any(|(selector, _)| selector.matches_path(path))
  }

  /// Adds the rules to the category from the V3+ JSON form
  pub fn add_rules_from_json(&mut self, rules: &Value) -> anyhow::Result<()> {
    if self.name == Category::PATH && rules.get("matchers").is_some() {
      self.add_rule_list(DocPath::empty(), rules)?;
    } else if let Value::Object(m) = rules {
      if m.contains_key("matchers") {
        self.add_rule_list(DocPath::empty(), rules)?;
      } else {
        for (k, v) in m {
          let path = if self.name == Category::HEADER || self.name == Category::QUERY ||
            self.name == Category::METADATA {
            // header/query/metadata selectors are plain names, not path expressions
            if k.starts_with('$') {
              DocPath::new(k)?
            } else {
              DocPath::root().join(k.as_str())
            }
          } else {
            DocPath::new(k)?
          };
          self.add_rule_list(path, v)?;
        }
      }
    }
    Ok(())
  }

  fn add_rule_list(&mut self, k: DocPath, v: &Value) -> anyhow::Result<()> {
    let rule_logic = match v.get("combine") {
      Some(val) => if json_to_string(val).to_uppercase() == "OR" {
        RuleLogic::Or
      } else {
        RuleLogic::And
      },
      None => RuleLogic::And
    };
    if let Some(Value::Array(array)) = v.get("matchers") {
      for matcher in array {
        self.rule_from_json(k.clone(), matcher, rule_logic)?;
      }
    }
    Ok(())
  }

  /// Adds a rule in the V2 flat form (the selector includes the category prefix)
  pub fn add_v2_rule(&mut self, key: String, matcher_json: &Value) -> anyhow::Result<()> {
    let path = if key.is_empty() {
      DocPath::empty()
    } else if key.starts_with('$') {
      DocPath::new(key)?
    } else {
      DocPath::root().join(key.as_str())
    };
    self.rule_from_json(path, matcher_json, RuleLogic::And)
  }

  /// The V3+ JSON form of this category
  pub fn to_v3_json(&self) -> Value {
    Value::Object(self.rules.iter()
      .map(|(selector, rule_list)| {
        let key = match self.name {
          Category::HEADER | Category::QUERY | Category::METADATA =>
            selector.first_field().map(|f| f.to_string()).unwrap_or_else(|| String::from(selector)),
          _ => String::from(selector)
        };
        (key, rule_list.to_v3_json())
      }).collect())
  }

  /// The V2 flat JSON form of this category
  pub fn to_v2_json(&self) -> HashMap<String, Value> {
    let mut map = hashmap!{};
    match self.name {
      Category::PATH => for (_, rules) in &self.rules {
        map.insert("$.path".to_string(), rules.to_v2_json());
      },
      Category::BODY => for (selector, rules) in &self.rules {
        map.insert(String::from(selector).replace('$', "$.body"), rules.to_v2_json());
      },
      _ => for (selector, rules) in &self.rules {
        if let Some(name) = selector.first_field() {
          map.insert(format!("$.{}.{}", self.name, name), rules.to_v2_json());
        }
      }
    }
    map
  }
}

impl Hash for MatchingRuleCategory {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.name.hash(state);
    for (path, rules) in self.rules.iter()
      .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
      path.hash(state);
      rules.hash(state);
    }
  }
}

impl PartialEq for MatchingRuleCategory {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name && self.rules == other.rules
  }
}

/// Data structure for representing the complete set of matching rules of a request,
/// response or message
#[derive(Debug, Clone, Default, Eq)]
pub struct MatchingRules {
  /// Categories of matching rules
  pub rules: HashMap<Category, MatchingRuleCategory>
}

impl MatchingRules {
  /// If the matching rules are empty
  pub fn is_empty(&self) -> bool {
    self.rules.values().all(MatchingRuleCategory::is_empty)
  }

  /// If the matching rules are not empty
  pub fn is_not_empty(&self) -> bool {
    !self.is_empty()
  }

  /// Adds a category to the map, returning a mutable reference to it
  pub fn add_category<S>(&mut self, category: S) -> &mut MatchingRuleCategory
    where S: Into<Category> + Clone
  {
    let category = category.into();
    self.rules.entry(category.clone())
      .or_insert_with(|| MatchingRuleCategory::empty(category))
  }

  /// Returns the category of rules, if present
  pub fn rules_for_category<S>(&self, category: S) -> Option<MatchingRuleCategory>
    where S: Into<Category>
  {
    self.rules.get(&category.into()).cloned()
  }

  /// If there is a matcher defined for the category and path
  pub fn matcher_is_defined<S>(&self, category: S, path: &[&str]) -> bool
    where S: Into<Category> + Clone
  {
    self.resolve_matchers(category.into(), path)
      .map(|rules| !rules.is_empty())
      .unwrap_or(false)
  }

  /// If there is a wildcard matcher defined for the category and path
  pub fn wildcard_matcher_is_defined<S>(&self, category: S, path: &[&str]) -> bool
    where S: Into<Category> + Clone
  {
    self.rules_for_category(category)
      .map(|rules| rules.wildcard_matcher_is_defined(path))
      .unwrap_or(false)
  }

  fn resolve_matchers(&self, category: Category, path: &[&str]) -> Option<MatchingRuleCategory> {
    self.rules.get(&category)
      .map(|rules| rules.resolve_matchers_for_path(path))
  }

  /// Merges the rules from the other set into this one
  pub fn add_rules(&mut self, other: &MatchingRules) {
    for (category, rules) in &other.rules {
      let entry = self.add_category(category.clone());
      for (path, rule_list) in &rules.rules {
        for rule in &rule_list.rules {
          entry.add_rule(path.clone(), rule.clone(), rule_list.rule_logic);
        }
      }
    }
  }

  /// Renders this rule set to JSON for the given specification version
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    match spec_version {
      PactSpecification::V1 | PactSpecification::V1_1 | PactSpecification::V2 => {
        Value::Object(self.rules.values()
          .flat_map(|category| category.to_v2_json())
          .collect())
      },
      _ => Value::Object(self.rules.iter()
        .filter(|(_, category)| category.is_not_empty())
        .map(|(name, category)| (name.to_string(), category.to_v3_json()))
        .collect())
    }
  }
}

impl Hash for MatchingRules {
  fn hash<H: Hasher>(&self, state: &mut H) {
    for (category, rules) in self.rules.iter()
      .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
      category.hash(state);
      rules.hash(state);
    }
  }
}

impl PartialEq for MatchingRules {
  fn eq(&self, other: &Self) -> bool {
    self.rules == other.rules
  }
}

/// Parses the matching rules from the JSON of a request, response or message
pub fn matchers_from_json(json: &Value, deprecated_name: &Option<String>) -> anyhow::Result<MatchingRules> {
  let matchers_json = match (json.get("matchingRules"),
    deprecated_name.as_ref().and_then(|name| json.get(name))) {
    (Some(v), _) => Some(v),
    (None, Some(v)) => {
      warn!("Pact file is using deprecated attribute for matching rules");
      Some(v)
    },
    (None, None) => None
  };

  let mut matching_rules = MatchingRules::default();
  if let Some(Value::Object(m)) = matchers_json {
    if m.keys().next().map(|k| k.starts_with('$')).unwrap_or(false) {
      // V2 flat form: selectors like $.body.id or $.headers.X-Req-Id
      for (key, v) in m {
        let mut parts = key.split('.').skip(1);
        match parts.next() {
          Some(category_name) => {
            let remainder = parts.join(".");
            let category = match category_name {
              "headers" => Category::HEADER,
              "body" => Category::BODY,
              "query" => Category::QUERY,
              "path" => Category::PATH,
              "status" => Category::STATUS,
              "method" => Category::METHOD,
              other => Category::from(other)
            };
            let entry = matching_rules.add_category(category.clone());
            let key = if category == Category::BODY {
              format!("${}", key.strip_prefix("$.body").unwrap_or_default())
            } else {
              remainder
            };
            entry.add_v2_rule(key, v)?;
          },
          None => warn!("Ignoring invalid V2 matcher selector '{}'", key)
        }
      }
    } else {
      for (name, category_json) in m {
        let entry = matching_rules.add_category(name.as_str());
        entry.add_rules_from_json(category_json)
          .with_context(|| format!("Unable to parse matching rules for category '{}'", name))?;
      }
    }
  }
  Ok(matching_rules)
}

/// Renders the matching rules to JSON for the given specification version
pub fn matchers_to_json(matchers: &MatchingRules, spec_version: &PactSpecification) -> Value {
  matchers.to_json(spec_version)
}

/// Macro to ease constructing matching rules in tests and builders.
///
/// ```
/// use pact_models::matchingrules;
/// use pact_models::matchingrules::MatchingRule;
///
/// let rules = matchingrules! {
///   "body" => { "$.id" => [ MatchingRule::Integer ] }
/// };
/// ```
#[macro_export]
macro_rules! matchingrules {
  ( $( $name:expr => { $( $subname:expr => [ $( $matcher:expr ), * ] ),* } ),* ) => {{
    let mut _rules = $crate::matchingrules::MatchingRules::default();
    $({
      let _category = _rules.add_category($name);
      $({
        $({
          let _path = if $subname.is_empty() {
            $crate::path_exp::DocPath::empty()
          } else {
            $crate::path_exp::DocPath::new_unwrap($subname)
          };
          _category.add_rule(
            _path,
            $matcher,
            $crate::matchingrules::RuleLogic::And
          );
        })*
      })*
    })*
    _rules
  }};
}

/// Macro to construct a single category of matching rules
#[macro_export]
macro_rules! matchingrules_list {
  ( $name:expr ; $( $subname:expr => [ $( $matcher:expr ), * ] ),* ) => {{
    let mut _category = $crate::matchingrules::MatchingRuleCategory::empty($name);
    $({
      $({
        _category.add_rule(
          $crate::path_exp::DocPath::new_unwrap($subname),
          $matcher,
          $crate::matchingrules::RuleLogic::And
        );
      })*
    })*
    _category
  }};

  ( $name:expr ; [ $( $matcher:expr ), * ] ) => {{
    let mut _category = $crate::matchingrules::MatchingRuleCategory::empty($name);
    $({
      _category.add_rule(
        $crate::path_exp::DocPath::empty(),
        $matcher,
        $crate::matchingrules::RuleLogic::And
      );
    })*
    _category
  }};
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use serde_json::json;

  use super::*;

  #[test]
  fn rule_from_json_with_match_attribute() {
    expect!(MatchingRule::from_json(&json!({"match": "regex", "regex": "\\d+"})).unwrap())
      .to(be_equal_to(MatchingRule::Regex("\\d+".to_string())));
    expect!(MatchingRule::from_json(&json!({"match": "type"})).unwrap())
      .to(be_equal_to(MatchingRule::Type));
    expect!(MatchingRule::from_json(&json!({"match": "type", "min": 1})).unwrap())
      .to(be_equal_to(MatchingRule::MinType(1)));
    expect!(MatchingRule::from_json(&json!({"match": "statusCode", "status": "clientError"})).unwrap())
      .to(be_equal_to(MatchingRule::StatusCode(HttpStatus::ClientError)));
    expect!(MatchingRule::from_json(&json!({"match": "notEmpty"})).unwrap())
      .to(be_equal_to(MatchingRule::NotEmpty));
    expect!(MatchingRule::from_json(&json!({"match": "semver"})).unwrap())
      .to(be_equal_to(MatchingRule::Semver));
    expect!(MatchingRule::from_json(&json!({"match": "somethingElse"}))).to(be_err());
  }

  #[test]
  fn rule_from_json_guesses_v2_rules_without_match_attribute() {
    expect!(MatchingRule::from_json(&json!({"regex": "[0-9]"})).unwrap())
      .to(be_equal_to(MatchingRule::Regex("[0-9]".to_string())));
    expect!(MatchingRule::from_json(&json!({"min": 2})).unwrap())
      .to(be_equal_to(MatchingRule::MinType(2)));
    expect!(MatchingRule::from_json(&json!({"other": true}))).to(be_err());
  }

  #[test]
  fn rule_json_round_trip() {
    for rule in [
      MatchingRule::Equality,
      MatchingRule::Regex("[a-f0-9]+".to_string()),
      MatchingRule::Type,
      MatchingRule::MinMaxType(1, 10),
      MatchingRule::Timestamp("yyyy-MM-dd HH:mm:ss".to_string()),
      MatchingRule::Include("substring".to_string()),
      MatchingRule::ContentType("image/png".to_string()),
      MatchingRule::StatusCode(HttpStatus::Success),
      MatchingRule::NotEmpty,
      MatchingRule::Semver,
      MatchingRule::EachKey(vec![MatchingRule::Regex("\\w+".to_string())]),
      MatchingRule::EachValue(vec![MatchingRule::Type])
    ] {
      let json = rule.to_json();
      expect!(MatchingRule::from_json(&json).unwrap()).to(be_equal_to(rule));
    }
  }

  #[test]
  fn matchers_from_json_v3_form() {
    let json = json!({
      "matchingRules": {
        "body": {
          "$.id": { "combine": "AND", "matchers": [ { "match": "integer" } ] },
          "$.name": { "matchers": [ { "match": "type" } ] }
        },
        "header": {
          "X-Req-ID": { "matchers": [ { "match": "regex", "regex": "[a-f0-9]+" } ] }
        }
      }
    });
    let rules = matchers_from_json(&json, &None).unwrap();
    expect!(rules.matcher_is_defined("body", &["$", "id"])).to(be_true());
    expect!(rules.matcher_is_defined("body", &["$", "other"])).to(be_false());
    expect!(rules.matcher_is_defined("header", &["X-Req-ID"])).to(be_true());
  }

  #[test]
  fn matchers_from_json_v2_flat_form() {
    let json = json!({
      "matchingRules": {
        "$.body.id": { "match": "type" },
        "$.headers.X-Req-ID": { "regex": "\\d+" },
        "$.path": { "regex": "/users/\\d+" }
      }
    });
    let rules = matchers_from_json(&json, &None).unwrap();
    expect!(rules.matcher_is_defined("body", &["$", "id"])).to(be_true());
    expect!(rules.matcher_is_defined("header", &["X-Req-ID"])).to(be_true());
    expect!(rules.matcher_is_defined("path", &[])).to(be_true());
  }

  #[test]
  fn select_best_matcher_prefers_most_specific_selector() {
    let rules = matchingrules! {
      "body" => {
        "$.items" => [ MatchingRule::MinType(2) ],
        "$.items[*].id" => [ MatchingRule::Integer ],
        "$.items[*].*" => [ MatchingRule::Type ]
      }
    };
    let body_rules = rules.rules_for_category("body").unwrap();

    let best = body_rules.select_best_matcher(&["$", "items", "0", "id"]);
    expect!(best.rules.first().unwrap()).to(be_equal_to(&MatchingRule::Integer));
    expect!(best.cascaded).to(be_false());

    let cascaded = body_rules.select_best_matcher(&["$", "items", "0", "name", "first"]);
    expect!(cascaded.cascaded).to(be_true());
  }

  #[test]
  fn matching_rules_to_v3_json_uses_plain_names_for_headers() {
    let rules = matchingrules! {
      "header" => { "$['X-Req-ID']" => [ MatchingRule::Regex("[a-f0-9]+".to_string()) ] }
    };
    let json = rules.to_json(&PactSpecification::V4);
    expect!(json.get("header").unwrap().get("X-Req-ID")).to(be_some());
  }

  #[test]
  fn matching_rules_to_v2_json_flattens_selectors() {
    let rules = matchingrules! {
      "body" => { "$.id" => [ MatchingRule::Type ] },
      "path" => { "" => [ MatchingRule::Regex("/users/\\d+".to_string()) ] }
    };
    let json = rules.to_json(&PactSpecification::V2);
    expect!(json.get("$.body.id")).to(be_some());
    expect!(json.get("$.path")).to(be_some());
  }
}

//! Generator model: producers of example values attached to value sites in parallel to
//! the matching rules. Values are produced against a `GeneratorContext` which carries
//! the mock-server URL, the provider-state parameters and a seeded PRNG so that a
//! single session is reproducible.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::mem;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::Local;
use itertools::Itertools;
use maplit::hashmap;
use rand::distributions::Alphanumeric;
use rand::prelude::*;
use rand::rngs::StdRng;
use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::expression_parser::{contains_expressions, parse_expression};
use crate::json_utils::{get_field_as_string, json_to_string};
use crate::matchingrules::MatchingRuleCategory;
use crate::path_exp::DocPath;
use crate::PactSpecification;
use crate::time_utils::to_chrono_pattern;

/// Trait to represent the mode a generator is running in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorTestMode {
  /// Values are generated for the consumer (mock-server replies)
  Consumer,
  /// Values are generated for the provider (verification-time substitution)
  Provider
}

/// Data type to coerce provider-state expression results to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(clippy::upper_case_acronyms)]
pub enum DataType {
  /// String values
  STRING,
  /// Integer values
  INTEGER,
  /// Decimal values
  DECIMAL,
  /// Floating point values
  FLOAT,
  /// Don't convert values
  RAW,
  /// Boolean values
  BOOLEAN
}

impl DataType {
  /// Wraps the generated value in the corresponding JSON type
  pub fn wrap(&self, value: &Value) -> anyhow::Result<Value> {
    match self {
      DataType::STRING => Ok(Value::String(json_to_string(value))),
      DataType::INTEGER => match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => Ok(json!(n.as_f64().unwrap_or_default() as i64)),
        Value::String(s) => s.parse::<i64>().map(|i| json!(i))
          .map_err(|err| anyhow!("Could not convert '{}' to an integer - {}", s, err)),
        _ => Err(anyhow!("Could not convert {} to an integer", value))
      },
      DataType::DECIMAL | DataType::FLOAT => match value {
        Value::Number(_) => Ok(value.clone()),
        Value::String(s) => s.parse::<f64>().map(|f| json!(f))
          .map_err(|err| anyhow!("Could not convert '{}' to a decimal - {}", s, err)),
        _ => Err(anyhow!("Could not convert {} to a decimal", value))
      },
      DataType::BOOLEAN => match value {
        Value::Bool(_) => Ok(value.clone()),
        Value::String(s) => s.parse::<bool>().map(Value::Bool)
          .map_err(|err| anyhow!("Could not convert '{}' to a boolean - {}", s, err)),
        _ => Err(anyhow!("Could not convert {} to a boolean", value))
      },
      DataType::RAW => Ok(value.clone())
    }
  }
}

impl From<Value> for DataType {
  fn from(value: Value) -> Self {
    match json_to_string(&value).to_uppercase().as_str() {
      "STRING" => DataType::STRING,
      "INTEGER" => DataType::INTEGER,
      "DECIMAL" => DataType::DECIMAL,
      "FLOAT" => DataType::FLOAT,
      "BOOLEAN" => DataType::BOOLEAN,
      _ => DataType::RAW
    }
  }
}

impl Display for DataType {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      DataType::STRING => write!(f, "STRING"),
      DataType::INTEGER => write!(f, "INTEGER"),
      DataType::DECIMAL => write!(f, "DECIMAL"),
      DataType::FLOAT => write!(f, "FLOAT"),
      DataType::RAW => write!(f, "RAW"),
      DataType::BOOLEAN => write!(f, "BOOLEAN")
    }
  }
}

/// Context that values are generated against. Random generators draw from the seeded
/// PRNG held here so a single session is reproducible.
#[derive(Debug, Clone)]
pub struct GeneratorContext {
  /// Base URL of the running mock server, if one is running
  pub mock_server_url: Option<String>,
  /// Values returned by the provider-state callbacks
  pub state_params: HashMap<String, Value>,
  rng: StdRng
}

impl GeneratorContext {
  /// Creates a new context with the given seed
  pub fn new(seed: u64) -> GeneratorContext {
    GeneratorContext {
      mock_server_url: None,
      state_params: hashmap!{},
      rng: StdRng::seed_from_u64(seed)
    }
  }

  /// Creates a new context seeded from the system entropy source
  pub fn new_random() -> GeneratorContext {
    GeneratorContext {
      mock_server_url: None,
      state_params: hashmap!{},
      rng: StdRng::from_entropy()
    }
  }

  /// Sets the mock server URL
  pub fn with_mock_server_url(mut self, url: impl Into<String>) -> Self {
    self.mock_server_url = Some(url.into());
    self
  }

  /// Sets the provider-state parameter values
  pub fn with_state_params(mut self, params: HashMap<String, Value>) -> Self {
    self.state_params = params;
    self
  }

  /// The PRNG for this context
  pub fn rng(&mut self) -> &mut StdRng {
    &mut self.rng
  }
}

/// A value generator attached to a value site
#[derive(Debug, Clone, Eq)]
pub enum Generator {
  /// Generates a random integer between the min and max values
  RandomInt(i32, i32),
  /// Generates a random UUID value
  Uuid,
  /// Generates a random decimal number with the provided number of digits
  RandomDecimal(u16),
  /// Generates a random sequence of hexadecimal digits
  RandomHexadecimal(u16),
  /// Generates a random string of the provided size
  RandomString(u16),
  /// Generates a random string that matches the provided regex
  Regex(String),
  /// Generates a date value, formatted with the provided pattern or ISO format
  Date(Option<String>),
  /// Generates a time value, formatted with the provided pattern or ISO format
  Time(Option<String>),
  /// Generates a timestamp value, formatted with the provided pattern or ISO format
  DateTime(Option<String>),
  /// Generates a random boolean value
  RandomBoolean,
  /// Generates a value by evaluating an expression against the provider-state parameters
  ProviderStateGenerator(String, Option<DataType>),
  /// Rewrites an example URL so that its base comes from the running mock server
  MockServerURL(String, String),
  /// List of array-contains variants which can have embedded generators
  ArrayContains(Vec<(usize, MatchingRuleCategory, HashMap<DocPath, Generator>)>)
}

impl Generator {
  /// Converts this generator to its JSON form. Returns None for generators with no
  /// wire representation.
  pub fn to_json(&self) -> Option<Value> {
    match self {
      Generator::RandomInt(min, max) => Some(json!({ "type": "RandomInt", "min": min, "max": max })),
      Generator::Uuid => Some(json!({ "type": "Uuid" })),
      Generator::RandomDecimal(digits) => Some(json!({ "type": "RandomDecimal", "digits": digits })),
      Generator::RandomHexadecimal(digits) => Some(json!({ "type": "RandomHexadecimal", "digits": digits })),
      Generator::RandomString(size) => Some(json!({ "type": "RandomString", "size": size })),
      Generator::Regex(regex) => Some(json!({ "type": "Regex", "regex": regex })),
      Generator::Date(format) => match format {
        Some(format) => Some(json!({ "type": "Date", "format": format })),
        None => Some(json!({ "type": "Date" }))
      },
      Generator::Time(format) => match format {
        Some(format) => Some(json!({ "type": "Time", "format": format })),
        None => Some(json!({ "type": "Time" }))
      },
      Generator::DateTime(format) => match format {
        Some(format) => Some(json!({ "type": "DateTime", "format": format })),
        None => Some(json!({ "type": "DateTime" }))
      },
      Generator::RandomBoolean => Some(json!({ "type": "RandomBoolean" })),
      Generator::ProviderStateGenerator(expression, data_type) => match data_type {
        Some(data_type) => Some(json!({ "type": "ProviderState", "expression": expression,
          "dataType": data_type.to_string() })),
        None => Some(json!({ "type": "ProviderState", "expression": expression }))
      },
      Generator::MockServerURL(example, regex) => Some(json!({ "type": "MockServerURL",
        "example": example, "regex": regex })),
      Generator::ArrayContains(_) => None
    }
  }

  /// Converts a JSON map into a `Generator`, returning `None` if it can not be converted
  pub fn from_map(gen_type: &str, map: &Map<String, Value>) -> Option<Generator> {
    match gen_type {
      "RandomInt" => {
        let min = map.get("min").and_then(Value::as_i64).unwrap_or(0) as i32;
        let max = map.get("max").and_then(Value::as_i64).unwrap_or(10) as i32;
        Some(Generator::RandomInt(min, max))
      },
      "Uuid" => Some(Generator::Uuid),
      "RandomDecimal" => Some(Generator::RandomDecimal(
        map.get("digits").and_then(Value::as_u64).unwrap_or(10) as u16)),
      "RandomHexadecimal" => Some(Generator::RandomHexadecimal(
        map.get("digits").and_then(Value::as_u64).unwrap_or(10) as u16)),
      "RandomString" => Some(Generator::RandomString(
        map.get("size").and_then(Value::as_u64).unwrap_or(10) as u16)),
      "Regex" => map.get("regex").map(|val| Generator::Regex(json_to_string(val))),
      "Date" => Some(Generator::Date(get_field_as_string("format", map))),
      "Time" => Some(Generator::Time(get_field_as_string("format", map))),
      "DateTime" => Some(Generator::DateTime(get_field_as_string("format", map))),
      "RandomBoolean" => Some(Generator::RandomBoolean),
      "ProviderState" => map.get("expression").map(|f|
        Generator::ProviderStateGenerator(json_to_string(f),
          map.get("dataType").map(|dt| DataType::from(dt.clone())))),
      "MockServerURL" => Some(Generator::MockServerURL(
        get_field_as_string("example", map).unwrap_or_default(),
        get_field_as_string("regex", map).unwrap_or_default())),
      _ => {
        warn!("'{}' is not a valid generator type", gen_type);
        None
      }
    }
  }

  /// If this generator is compatible with the given test mode
  pub fn corresponds_to_mode(&self, mode: &GeneratorTestMode) -> bool {
    match self {
      Generator::ProviderStateGenerator(_, _) => mode == &GeneratorTestMode::Provider,
      Generator::MockServerURL(_, _) => mode == &GeneratorTestMode::Consumer,
      _ => true
    }
  }

  /// The wire-format name of this generator
  pub fn name(&self) -> String {
    match self {
      Generator::RandomInt(_, _) => "RandomInt",
      Generator::Uuid => "Uuid",
      Generator::RandomDecimal(_) => "RandomDecimal",
      Generator::RandomHexadecimal(_) => "RandomHexadecimal",
      Generator::RandomString(_) => "RandomString",
      Generator::Regex(_) => "Regex",
      Generator::Date(_) => "Date",
      Generator::Time(_) => "Time",
      Generator::DateTime(_) => "DateTime",
      Generator::RandomBoolean => "RandomBoolean",
      Generator::ProviderStateGenerator(_, _) => "ProviderState",
      Generator::MockServerURL(_, _) => "MockServerURL",
      Generator::ArrayContains(_) => "ArrayContains"
    }.to_string()
  }

  /// Produces a value for this generator against the given context. The example value
  /// is used by generators that transform an existing value (MockServerURL) and by
  /// ProviderState expressions embedded in string examples.
  pub fn generate_value(&self, example: &Value, ctx: &mut GeneratorContext) -> anyhow::Result<Value> {
    let result = match self {
      Generator::RandomInt(min, max) =>
        Ok(json!(ctx.rng().gen_range(*min..=*max))),
      Generator::Uuid => {
        let bytes: [u8; 16] = ctx.rng().gen();
        Ok(json!(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()))
      },
      Generator::RandomDecimal(digits) => {
        let s = generate_decimal(*digits as usize, ctx.rng());
        match s.parse::<f64>() {
          Ok(f) => Ok(json!(f)),
          Err(_) => Ok(Value::String(s))
        }
      },
      Generator::RandomHexadecimal(digits) => Ok(Value::String(generate_hexadecimal(*digits as usize, ctx.rng()))),
      Generator::RandomString(size) => Ok(Value::String(generate_ascii_string(*size as usize, ctx.rng()))),
      Generator::Regex(regex) => {
        // anchors are meaningless for generation, and unicode classes produce values
        // the provider is unlikely to accept
        let stripped = regex.trim_start_matches('^').trim_end_matches('$');
        let mut parser = regex_syntax::ParserBuilder::new().unicode(false).build();
        match parser.parse(stripped) {
          Ok(hir) => match rand_regex::Regex::with_hir(hir, 20) {
            Ok(gen) => Ok(Value::String(ctx.rng().sample::<String, _>(&gen))),
            Err(err) => Err(anyhow!("Could not generate a random string from '{}' - {}", regex, err))
          },
          Err(err) => Err(anyhow!("'{}' is not a valid regular expression - {}", regex, err))
        }
      },
      Generator::Date(format) => match format {
        Some(pattern) => Ok(Value::String(Local::now().date_naive()
          .format(&to_chrono_pattern(pattern)?).to_string())),
        None => Ok(Value::String(Local::now().date_naive().format("%Y-%m-%d").to_string()))
      },
      Generator::Time(format) => match format {
        Some(pattern) => Ok(Value::String(Local::now().time()
          .format(&to_chrono_pattern(pattern)?).to_string())),
        None => Ok(Value::String(Local::now().time().format("%H:%M:%S").to_string()))
      },
      Generator::DateTime(format) => match format {
        Some(pattern) => Ok(Value::String(Local::now()
          .format(&to_chrono_pattern(pattern)?).to_string())),
        None => Ok(Value::String(Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%z").to_string()))
      },
      Generator::RandomBoolean => Ok(json!(ctx.rng().gen::<bool>())),
      Generator::ProviderStateGenerator(expression, data_type) => {
        if contains_expressions(expression) {
          let generated = parse_expression(expression, &ctx.state_params)?;
          match data_type {
            Some(data_type) => data_type.wrap(&generated),
            None => Ok(generated)
          }
        } else {
          match ctx.state_params.get(expression) {
            Some(value) => Ok(value.clone()),
            None => Err(anyhow!("No value for '{}' found in the provider state values", expression))
          }
        }
      },
      Generator::MockServerURL(example, regex) => match &ctx.mock_server_url {
        Some(url) => match Regex::new(regex) {
          Ok(re) => Ok(Value::String(replace_with_regex(example, url.clone(), re))),
          Err(err) => Err(anyhow!("MockServerURL: '{}' is not a valid regular expression - {}", regex, err))
        },
        None => Err(anyhow!("MockServerURL: can not generate a value as there is no mock server URL in the context"))
      },
      Generator::ArrayContains(_) =>
        Err(anyhow!("ArrayContains generators can only be applied to array values")),
    };
    debug!("Generator {} => {:?}", self.name(), result);
    result.map_err(|err| {
      // example is only used for diagnostics on failure
      anyhow!("{} (example was {})", err, example)
    })
  }
}

fn generate_decimal(digits: usize, rng: &mut StdRng) -> String {
  const DIGIT_CHARSET: &str = "0123456789";
  let chars: Vec<char> = DIGIT_CHARSET.chars().collect();
  match digits {
    0 => "".to_string(),
    1 => chars.choose(rng).map(|c| c.to_string()).unwrap_or_default(),
    2 => format!("{}.{}", chars.choose(rng).unwrap_or(&'0'), chars.choose(rng).unwrap_or(&'0')),
    _ => {
      // the point can not be at either end, and the leading digit must not be zero
      let pos = rng.gen_range(1..digits - 1);
      let mut result = String::with_capacity(digits + 1);
      for index in 0..digits {
        if index == pos {
          result.push('.');
        }
        let digit = if index == 0 {
          chars[1..].choose(rng).unwrap_or(&'1')
        } else {
          chars.choose(rng).unwrap_or(&'0')
        };
        result.push(*digit);
      }
      result
    }
  }
}

fn generate_hexadecimal(digits: usize, rng: &mut StdRng) -> String {
  const HEX_CHARSET: &str = "0123456789abcdef";
  let chars: Vec<char> = HEX_CHARSET.chars().collect();
  (0..digits).map(|_| chars.choose(rng).unwrap_or(&'0')).collect()
}

fn generate_ascii_string(size: usize, rng: &mut StdRng) -> String {
  rng.sample_iter(&Alphanumeric).map(char::from).take(size).collect()
}

/// Replaces the base of the example URL with the given base, keeping the part captured
/// by the first group of the regex
fn replace_with_regex(example: &str, base: String, re: Regex) -> String {
  re.captures(example).map(|caps: Captures| {
    let m = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    format!("{}{}", base.trim_end_matches('/'), m)
  }).unwrap_or(base)
}

impl Hash for Generator {
  fn hash<H: Hasher>(&self, state: &mut H) {
    mem::discriminant(self).hash(state);
    match self {
      Generator::RandomInt(min, max) => {
        min.hash(state);
        max.hash(state);
      },
      Generator::RandomDecimal(digits) => digits.hash(state),
      Generator::RandomHexadecimal(digits) => digits.hash(state),
      Generator::RandomString(size) => size.hash(state),
      Generator::Regex(regex) => regex.hash(state),
      Generator::Date(format) => format.hash(state),
      Generator::Time(format) => format.hash(state),
      Generator::DateTime(format) => format.hash(state),
      Generator::ProviderStateGenerator(expression, data_type) => {
        expression.hash(state);
        data_type.hash(state);
      },
      Generator::MockServerURL(example, regex) => {
        example.hash(state);
        regex.hash(state);
      },
      Generator::ArrayContains(variants) => for (index, rules, generators) in variants {
        index.hash(state);
        rules.hash(state);
        for (path, gen) in generators {
          path.hash(state);
          gen.hash(state);
        }
      },
      _ => ()
    }
  }
}

impl PartialEq for Generator {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (Generator::RandomInt(min1, max1), Generator::RandomInt(min2, max2)) =>
        min1 == min2 && max1 == max2,
      (Generator::RandomDecimal(d1), Generator::RandomDecimal(d2)) => d1 == d2,
      (Generator::RandomHexadecimal(d1), Generator::RandomHexadecimal(d2)) => d1 == d2,
      (Generator::RandomString(s1), Generator::RandomString(s2)) => s1 == s2,
      (Generator::Regex(r1), Generator::Regex(r2)) => r1 == r2,
      (Generator::Date(f1), Generator::Date(f2)) => f1 == f2,
      (Generator::Time(f1), Generator::Time(f2)) => f1 == f2,
      (Generator::DateTime(f1), Generator::DateTime(f2)) => f1 == f2,
      (Generator::ProviderStateGenerator(e1, d1), Generator::ProviderStateGenerator(e2, d2)) =>
        e1 == e2 && d1 == d2,
      (Generator::MockServerURL(e1, r1), Generator::MockServerURL(e2, r2)) =>
        e1 == e2 && r1 == r2,
      (Generator::ArrayContains(v1), Generator::ArrayContains(v2)) => v1 == v2,
      _ => mem::discriminant(self) == mem::discriminant(other)
    }
  }
}

/// Category that a generator is applied to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(clippy::upper_case_acronyms)]
pub enum GeneratorCategory {
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
  /// Message metadata
  METADATA
}

impl FromStr for GeneratorCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "method" => Ok(GeneratorCategory::METHOD),
      "path" => Ok(GeneratorCategory::PATH),
      "header" => Ok(GeneratorCategory::HEADER),
      "query" => Ok(GeneratorCategory::QUERY),
      "body" => Ok(GeneratorCategory::BODY),
      "status" => Ok(GeneratorCategory::STATUS),
      "metadata" => Ok(GeneratorCategory::METADATA),
      _ => Err(format!("'{}' is not a valid GeneratorCategory", s))
    }
  }
}

impl Display for GeneratorCategory {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      GeneratorCategory::METHOD => "method",
      GeneratorCategory::PATH => "path",
      GeneratorCategory::HEADER => "header",
      GeneratorCategory::QUERY => "query",
      GeneratorCategory::BODY => "body",
      GeneratorCategory::STATUS => "status",
      GeneratorCategory::METADATA => "metadata"
    };
    write!(f, "{}", s)
  }
}

/// Data structure for representing the complete set of generators of a request,
/// response or message
#[derive(Debug, Clone, Default, Eq)]
pub struct Generators {
  /// Generators keyed by category and selector
  pub categories: HashMap<GeneratorCategory, HashMap<DocPath, Generator>>
}

impl Generators {
  /// If the generators are empty
  pub fn is_empty(&self) -> bool {
    self.categories.values().all(HashMap::is_empty)
  }

  /// If the generators are not empty
  pub fn is_not_empty(&self) -> bool {
    !self.is_empty()
  }

  /// Adds a generator to the category at the root path
  pub fn add_generator(&mut self, category: &GeneratorCategory, generator: Generator) {
    self.add_generator_with_subcategory(category, DocPath::root(), generator);
  }

  /// Adds a generator to the category, keyed by the given selector
  pub fn add_generator_with_subcategory(
    &mut self,
    category: &GeneratorCategory,
    subcategory: DocPath,
    generator: Generator
  ) {
    let category_map = self.categories.entry(category.clone()).or_default();
    category_map.insert(subcategory, generator);
  }

  /// Adds all the generators from the other set to this one
  pub fn add_generators(&mut self, other: &Generators) {
    for (category, generators) in &other.categories {
      let category_map = self.categories.entry(category.clone()).or_default();
      for (path, generator) in generators {
        category_map.insert(path.clone(), generator.clone());
      }
    }
  }

  /// All generators for a category, filtered to the given test mode
  pub fn for_category(&self, category: &GeneratorCategory, mode: &GeneratorTestMode) -> HashMap<DocPath, Generator> {
    self.categories.get(category).map(|generators| {
      generators.iter()
        .filter(|(_, generator)| generator.corresponds_to_mode(mode))
        .map(|(path, generator)| (path.clone(), generator.clone()))
        .collect()
    }).unwrap_or_default()
  }

  /// Loads the generators for a JSON map of categories
  pub fn load_from_map(&mut self, map: &Map<String, Value>) -> anyhow::Result<()> {
    for (category_name, category_json) in map {
      match GeneratorCategory::from_str(category_name) {
        Ok(category) => match category_json {
          Value::Object(map) => match category {
            GeneratorCategory::PATH | GeneratorCategory::METHOD | GeneratorCategory::STATUS => {
              if let Some(generator) = Generator::from_map(
                &json_to_string(map.get("type").unwrap_or(&Value::Null)), map) {
                self.add_generator(&category, generator);
              }
            },
            _ => for (key, generator_json) in map {
              if let Value::Object(generator_map) = generator_json {
                let path = if key.starts_with('$') {
                  DocPath::new(key)?
                } else {
                  DocPath::root().join(key.as_str())
                };
                if let Some(generator) = Generator::from_map(
                  &json_to_string(generator_map.get("type").unwrap_or(&Value::Null)), generator_map) {
                  self.add_generator_with_subcategory(&category, path, generator);
                }
              }
            }
          },
          _ => warn!("Generator category '{}' is not a JSON object, ignoring", category_name)
        },
        Err(err) => warn!("Ignoring generator category - {}", err)
      }
    }
    Ok(())
  }

  /// Renders the generators to their JSON form
  pub fn to_json(&self) -> Value {
    Value::Object(self.categories.iter()
      .filter(|(_, generators)| !generators.is_empty())
      .map(|(category, generators)| {
        let json = match category {
          GeneratorCategory::PATH | GeneratorCategory::METHOD | GeneratorCategory::STATUS => {
            generators.values().next()
              .and_then(Generator::to_json)
              .unwrap_or(Value::Null)
          },
          GeneratorCategory::HEADER | GeneratorCategory::QUERY | GeneratorCategory::METADATA =>
            Value::Object(generators.iter()
              .filter_map(|(path, generator)| generator.to_json()
                .map(|json| (path.first_field().map(|f| f.to_string())
                  .unwrap_or_else(|| String::from(path)), json)))
              .collect()),
          _ => Value::Object(generators.iter()
            .filter_map(|(path, generator)| generator.to_json()
              .map(|json| (String::from(path), json)))
            .collect())
        };
        (category.to_string(), json)
      }).collect())
  }
}

impl Hash for Generators {
  fn hash<H: Hasher>(&self, state: &mut H) {
    for (category, generators) in self.categories.iter()
      .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
      category.hash(state);
      for (path, generator) in generators.iter()
        .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
        path.hash(state);
        generator.hash(state);
      }
    }
  }
}

impl PartialEq for Generators {
  fn eq(&self, other: &Self) -> bool {
    self.categories == other.categories
  }
}

/// Parses the generators from the JSON of a request, response or message
pub fn generators_from_json(json: &Value) -> anyhow::Result<Generators> {
  let mut generators = Generators::default();
  if let Some(Value::Object(map)) = json.get("generators") {
    generators.load_from_map(map)?;
  }
  Ok(generators)
}

/// Renders the generators to JSON for the given specification version
pub fn generators_to_json(generators: &Generators, _spec_version: &PactSpecification) -> Value {
  generators.to_json()
}

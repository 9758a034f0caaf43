//! V4 specification models - contents of asynchronous and synchronous messages

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use itertools::Itertools;
use serde_json::{json, Value};

use crate::bodies::OptionalBody;
use crate::content_types::ContentType;
use crate::generators::{Generators, generators_from_json, generators_to_json};
use crate::json_utils::json_to_string;
use crate::matchingrules::{matchers_from_json, matchers_to_json, MatchingRules};
use crate::PactSpecification;

/// Contents of a message: the payload plus its metadata, with the matching rules and
/// generators that apply to them
#[derive(Debug, Clone, Eq, Default)]
pub struct MessageContents {
  /// The contents of the message
  pub contents: OptionalBody,
  /// Message metadata
  pub metadata: HashMap<String, Value>,
  /// Matching rules to use when matching the message
  pub matching_rules: MatchingRules,
  /// Generators to use when producing the message
  pub generators: Generators
}

impl MessageContents {
  /// Parses message contents from the V4 JSON form
  pub fn from_json(json: &Value) -> anyhow::Result<MessageContents> {
    let metadata = match json.get("metadata") {
      Some(Value::Object(map)) => map.iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect(),
      _ => HashMap::default()
    };
    Ok(MessageContents {
      contents: OptionalBody::from_v4_json(json.get("contents").unwrap_or(&Value::Null)),
      metadata,
      matching_rules: matchers_from_json(json, &None)?,
      generators: generators_from_json(json)?
    })
  }

  /// Converts these message contents to the V4 JSON form
  pub fn to_json(&self, spec_version: &PactSpecification) -> Value {
    let mut json = json!({});
    {
      let map = json.as_object_mut().unwrap();

      if self.contents.is_present() {
        map.insert("contents".to_string(), self.contents.to_v4_json());
      }

      if !self.metadata.is_empty() {
        map.insert("metadata".to_string(), Value::Object(self.metadata.iter()
          .sorted_by(|(a, _), (b, _)| Ord::cmp(a, b))
          .map(|(k, v)| (k.clone(), v.clone()))
          .collect()));
      }

      if self.matching_rules.is_not_empty() {
        map.insert("matchingRules".to_string(), matchers_to_json(&self.matching_rules, spec_version));
      }

      if self.generators.is_not_empty() {
        map.insert("generators".to_string(), generators_to_json(&self.generators, spec_version));
      }
    }
    json
  }

  /// Determines the content type of the message: the content type of the body, or the
  /// `contentType` metadata key
  pub fn content_type(&self) -> Option<ContentType> {
    self.contents.content_type()
      .or_else(|| self.metadata.iter()
        .find(|(k, _)| {
          let key = k.to_lowercase();
          key == "contenttype" || key == "content-type"
        })
        .and_then(|(_, v)| ContentType::parse(json_to_string(v).as_str()).ok()))
  }
}

impl Display for MessageContents {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "Message Contents ( contents: {}, metadata: {:?} )", self.contents, self.metadata)
  }
}

impl PartialEq for MessageContents {
  fn eq(&self, other: &Self) -> bool {
    self.contents == other.contents && self.metadata == other.metadata &&
      self.matching_rules == other.matching_rules && self.generators == other.generators
  }
}

impl Hash for MessageContents {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.contents.hash(state);
    for (k, v) in self.metadata.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
      k.hash(state);
      v.to_string().hash(state);
    }
    self.matching_rules.hash(state);
    self.generators.hash(state);
  }
}

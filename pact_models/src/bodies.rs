//! Module for handling interaction content (bodies)

use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::mem;
use std::str::from_utf8;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde_json::{json, Value};
use tracing::warn;

use crate::content_types::{ContentType, detect_content_type_from_bytes};
use crate::json_utils::json_to_string;

/// Enum that defines the states that a body of a request, response or message can be in.
#[derive(Debug, Clone)]
pub enum OptionalBody {
  /// A body is missing if it is not present in the pact file
  Missing,
  /// An empty body that is present in the pact file
  Empty,
  /// A JSON body that is the null value. Protects other language implementations
  /// from null values; treated as `Empty`.
  Null,
  /// A non-empty body that is present in the pact file
  Present(Bytes, Option<ContentType>)
}

impl OptionalBody {
  /// If the body is present in the pact file and not empty or null
  pub fn is_present(&self) -> bool {
    matches!(self, OptionalBody::Present(_, _))
  }

  /// Returns the body bytes if present, otherwise None
  pub fn value(&self) -> Option<Bytes> {
    match self {
      OptionalBody::Present(s, _) => Some(s.clone()),
      _ => None
    }
  }

  /// Returns the body as a UTF-8 string if present, otherwise None
  pub fn value_as_string(&self) -> Option<String> {
    match self {
      OptionalBody::Present(s, _) => from_utf8(s).map(|s| s.to_string()).ok(),
      _ => None
    }
  }

  /// For textual bodies, the body as a UTF-8 string. Binary bodies display the first
  /// 32 bytes in hexadecimal form. Otherwise the empty string.
  pub fn display_string(&self) -> String {
    match self {
      OptionalBody::Present(s, ct) => {
        if ct.as_ref().map(|ct| ct.is_text()).unwrap_or(false) {
          from_utf8(s).map(|s| s.to_string())
            .unwrap_or_else(|_| self.display_bytes(32))
        } else {
          self.display_bytes(32)
        }
      },
      _ => String::default()
    }
  }

  fn display_bytes(&self, max_bytes: usize) -> String {
    match self {
      OptionalBody::Present(s, _) => s.iter()
        .take(max_bytes)
        .map(|b| format!("{:02x}", b))
        .collect(),
      _ => String::default()
    }
  }

  /// Parsed content type of the body
  pub fn content_type(&self) -> Option<ContentType> {
    match self {
      OptionalBody::Present(_, content_type) => content_type.clone(),
      _ => None
    }
  }

  /// Clones this body, setting the content type if it is not already set
  pub fn with_content_type_if_not_set(&self, content_type: Option<ContentType>) -> Self {
    match self {
      OptionalBody::Present(b, ct) => OptionalBody::Present(b.clone(), ct.clone().or(content_type)),
      _ => self.clone()
    }
  }

  /// Converts this body into the V4 pact file JSON form
  /// (`content`/`contentType`/`encoded` attributes)
  pub fn to_v4_json(&self) -> Value {
    match self {
      OptionalBody::Present(bytes, content_type) => {
        let content_type = content_type.clone().unwrap_or_default();
        let (content, encoded) = if content_type.is_json() {
          match serde_json::from_slice(bytes) {
            Ok(json_body) => (json_body, Value::Bool(false)),
            Err(err) => {
              warn!("Failed to parse json body: {}", err);
              (Value::String(BASE64.encode(bytes)), Value::String("base64".to_string()))
            }
          }
        } else if content_type.is_binary() {
          (Value::String(BASE64.encode(bytes)), Value::String("base64".to_string()))
        } else {
          match from_utf8(bytes) {
            Ok(s) => (Value::String(s.to_string()), Value::Bool(false)),
            Err(_) => (Value::String(BASE64.encode(bytes)), Value::String("base64".to_string()))
          }
        };
        json!({
          "content": content,
          "contentType": content_type.to_string(),
          "encoded": encoded
        })
      },
      OptionalBody::Empty => json!({"content": ""}),
      _ => Value::Null
    }
  }

  /// Parses a body from the V4 pact file JSON form
  pub fn from_v4_json(json: &Value) -> OptionalBody {
    match json {
      Value::Object(attrs) => match attrs.get("content") {
        Some(content) => {
          let content_type = attrs.get("contentType")
            .map(json_to_string)
            .and_then(|ct| ContentType::parse(ct.as_str()).ok());
          let encoded = match attrs.get("encoded") {
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Bool(b)) => *b,
            _ => false
          };
          let bytes = if encoded {
            match content {
              Value::String(s) => match BASE64.decode(s) {
                Ok(bytes) => Bytes::from(bytes),
                Err(err) => {
                  warn!("Failed to base64 decode body content - {}", err);
                  Bytes::from(s.clone())
                }
              },
              _ => Bytes::from(content.to_string())
            }
          } else {
            match content {
              Value::String(s) => Bytes::from(s.clone()),
              _ => Bytes::from(content.to_string())
            }
          };
          if bytes.is_empty() {
            OptionalBody::Empty
          } else {
            OptionalBody::Present(bytes, content_type)
          }
        },
        None => OptionalBody::Missing
      },
      Value::Null => OptionalBody::Null,
      _ => OptionalBody::Missing
    }
  }
}

impl From<String> for OptionalBody {
  fn from(s: String) -> Self {
    if s.is_empty() {
      OptionalBody::Empty
    } else {
      let content_type = detect_content_type_from_bytes(s.as_bytes());
      OptionalBody::Present(Bytes::from(s), content_type)
    }
  }
}

impl From<&str> for OptionalBody {
  fn from(s: &str) -> Self {
    OptionalBody::from(s.to_string())
  }
}

impl From<&Value> for OptionalBody {
  fn from(json: &Value) -> Self {
    OptionalBody::Present(Bytes::from(json.to_string()), Some(crate::content_types::JSON.clone()))
  }
}

impl Display for OptionalBody {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      OptionalBody::Missing => write!(f, "Missing"),
      OptionalBody::Empty => write!(f, "Empty"),
      OptionalBody::Null => write!(f, "Null"),
      OptionalBody::Present(s, ct) => write!(f, "Present({} bytes, {})", s.len(),
        ct.as_ref().map(|ct| ct.to_string()).unwrap_or_else(|| "unknown".to_string()))
    }
  }
}

impl Default for OptionalBody {
  fn default() -> Self {
    OptionalBody::Missing
  }
}

impl PartialEq for OptionalBody {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      (OptionalBody::Present(b1, _), OptionalBody::Present(b2, _)) => b1 == b2,
      _ => mem::discriminant(self) == mem::discriminant(other)
    }
  }
}

impl Eq for OptionalBody {}

impl Hash for OptionalBody {
  fn hash<H: Hasher>(&self, state: &mut H) {
    mem::discriminant(self).hash(state);
    if let OptionalBody::Present(b, _) = self {
      b.hash(state);
    }
  }
}

//! Module for handling content types

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::{from_utf8, FromStr};

use itertools::Itertools;
use lazy_static::lazy_static;
use mime::Mime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Content type of a body
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Hash)]
pub struct ContentType {
  /// Main content type
  pub main_type: String,
  /// Sub content type
  pub sub_type: String,
  /// Content type attributes
  pub attributes: BTreeMap<String, String>,
  /// Suffix
  pub suffix: Option<String>
}

lazy_static! {
  /// XML content type
  pub static ref XML: ContentType = ContentType {
    main_type: "application".into(),
    sub_type: "xml".into(),
    .. ContentType::default()
  };

  /// JSON content type
  pub static ref JSON: ContentType = ContentType {
    main_type: "application".into(),
    sub_type: "json".into(),
    .. ContentType::default()
  };

  /// Plain text content type
  pub static ref TEXT: ContentType = ContentType {
    main_type: "text".into(),
    sub_type: "plain".into(),
    .. ContentType::default()
  };

  static ref XML_HEADER: Regex = Regex::new(r"^\s*<\?xml\s*version.*").unwrap();
  static ref XML_ELEMENT: Regex = Regex::new(r#"^\s*<\w+\s*(:\w+=["][^"]+["])?.*"#).unwrap();
  static ref JSON_VALUE: Regex = Regex::new(r#"^\s*(true|false|null|[0-9]+|"\w*|\{\s*(}|"\w+)|\[\s*)"#).unwrap();
}

impl ContentType {
  /// Parses a string into a ContentType
  pub fn parse<'a, S: Into<&'a str>>(content_type: S) -> Result<ContentType, String> {
    let content_type = content_type.into();
    match Mime::from_str(content_type) {
      Ok(mime) => Ok(ContentType {
        main_type: mime.type_().to_string(),
        sub_type: mime.subtype().to_string(),
        attributes: mime.params().map(|(key, value)| (key.to_string(), value.to_string())).collect(),
        suffix: mime.suffix().map(|name| name.to_string())
      }),
      Err(err) => {
        let message = format!("Failed to parse '{}' as a content type: {}", content_type, err);
        warn!("{}", message);
        Err(message)
      }
    }
  }

  /// If it is a JSON type
  pub fn is_json(&self) -> bool {
    self.main_type == "application" && (self.sub_type.starts_with("json") ||
      self.suffix.as_deref().unwrap_or_default() == "json")
  }

  /// If it is a XML type
  pub fn is_xml(&self) -> bool {
    (self.main_type == "application" || self.main_type == "text") && (self.sub_type == "xml" ||
      self.suffix.as_deref().unwrap_or_default() == "xml")
  }

  /// If it is a text type
  pub fn is_text(&self) -> bool {
    self.main_type == "text" || self.is_xml() || self.is_json() ||
      self.sub_type == "x-www-form-urlencoded"
  }

  /// If it is a known binary type
  pub fn is_binary(&self) -> bool {
    matches!(self.main_type.as_str(), "audio" | "font" | "image" | "video") ||
      (self.main_type == "application" && self.sub_type == "octet-stream")
  }

  /// If it is a multipart type
  pub fn is_multipart(&self) -> bool {
    self.main_type == "multipart"
  }

  /// If it is a form-urlencoded type
  pub fn is_form_urlencoded(&self) -> bool {
    self.main_type == "application" && self.sub_type == "x-www-form-urlencoded"
  }

  /// Returns the base type with no attributes or suffix
  pub fn base_type(&self) -> ContentType {
    match &self.suffix {
      Some(suffix) => ContentType {
        main_type: self.main_type.clone(),
        sub_type: suffix.clone(),
        .. ContentType::default()
      },
      None => ContentType {
        main_type: self.main_type.clone(),
        sub_type: self.sub_type.clone(),
        .. ContentType::default()
      }
    }
  }

  /// If the content type is the wildcard type
  pub fn is_unknown(&self) -> bool {
    self.main_type == "*" || self.sub_type == "*"
  }

  /// Equals, ignoring attributes if not present on self
  pub fn is_equivalent_to(&self, other: &ContentType) -> bool {
    if self.attributes.is_empty() {
      self.main_type == other.main_type && self.sub_type == other.sub_type
    } else {
      self == other
    }
  }

  /// The boundary attribute, if one is set (multipart types)
  pub fn boundary(&self) -> Option<&String> {
    self.attributes.get("boundary")
  }
}

impl Default for ContentType {
  fn default() -> Self {
    ContentType {
      main_type: "*".into(),
      sub_type: "*".into(),
      attributes: BTreeMap::new(),
      suffix: None
    }
  }
}

impl Display for ContentType {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let base = if let Some(suffix) = &self.suffix {
      format!("{}/{}+{}", self.main_type, self.sub_type, suffix)
    } else {
      format!("{}/{}", self.main_type, self.sub_type)
    };
    if self.attributes.is_empty() {
      write!(f, "{}", base)
    } else {
      write!(f, "{};{}", base, self.attributes.iter()
        .map(|(key, value)| format!("{}={}", key, value)).join(";"))
    }
  }
}

impl From<&str> for ContentType {
  fn from(s: &str) -> Self {
    ContentType::parse(s).unwrap_or_default()
  }
}

impl From<String> for ContentType {
  fn from(s: String) -> Self {
    ContentType::from(s.as_str())
  }
}

impl From<&String> for ContentType {
  fn from(s: &String) -> Self {
    ContentType::from(s.as_str())
  }
}

impl FromStr for ContentType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ContentType::parse(s)
  }
}

/// Tries to detect the content type from a byte sequence by looking at the leading bytes
pub fn detect_content_type_from_bytes(s: &[u8]) -> Option<ContentType> {
  let header = &s[0..if s.len() > 32 { 32 } else { s.len() }];
  match from_utf8(header) {
    Ok(s) => {
      if XML_HEADER.is_match(s) || XML_ELEMENT.is_match(s) {
        Some(XML.clone())
      } else if JSON_VALUE.is_match(s) {
        Some(JSON.clone())
      } else {
        Some(TEXT.clone())
      }
    },
    Err(_) => None
  }
}

/// Tries to detect the content type from a string by looking at the leading characters
pub fn detect_content_type_from_string(s: &str) -> Option<ContentType> {
  detect_content_type_from_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;

  use super::*;

  #[test]
  fn parse_content_type() {
    let ct = ContentType::parse("application/json;charset=UTF-8").unwrap();
    expect!(ct.main_type.as_str()).to(be_equal_to("application"));
    expect!(ct.sub_type.as_str()).to(be_equal_to("json"));
    expect!(ct.attributes.get("charset").unwrap().as_str()).to(be_equal_to("utf-8"));
    expect!(ContentType::parse("not a content type")).to(be_err());
  }

  #[test]
  fn content_type_classification() {
    expect!(ContentType::from("application/json").is_json()).to(be_true());
    expect!(ContentType::from("application/hal+json").is_json()).to(be_true());
    expect!(ContentType::from("application/xml").is_xml()).to(be_true());
    expect!(ContentType::from("application/atom+xml").is_xml()).to(be_true());
    expect!(ContentType::from("text/plain").is_text()).to(be_true());
    expect!(ContentType::from("image/png").is_binary()).to(be_true());
    expect!(ContentType::from("application/octet-stream").is_binary()).to(be_true());
    expect!(ContentType::from("multipart/form-data").is_multipart()).to(be_true());
    expect!(ContentType::from("application/x-www-form-urlencoded").is_form_urlencoded()).to(be_true());
  }

  #[test]
  fn detects_content_type_from_leading_bytes() {
    expect!(detect_content_type_from_string("{\"a\": 1}").unwrap()).to(be_equal_to(JSON.clone()));
    expect!(detect_content_type_from_string("<?xml version=\"1.0\"?><a/>").unwrap()).to(be_equal_to(XML.clone()));
    expect!(detect_content_type_from_string("<note></note>").unwrap()).to(be_equal_to(XML.clone()));
    expect!(detect_content_type_from_string("hello there").unwrap()).to(be_equal_to(TEXT.clone()));
  }

  #[test]
  fn equivalence_ignores_missing_attributes() {
    let plain = ContentType::from("application/json");
    let with_charset = ContentType::from("application/json;charset=UTF-8");
    expect!(plain.is_equivalent_to(&with_charset)).to(be_true());
    expect!(with_charset.is_equivalent_to(&plain)).to(be_false());
  }
}

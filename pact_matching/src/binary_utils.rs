//! Matching of binary and multipart bodies

use std::collections::HashMap;
use std::io::{Cursor, Read};

use anyhow::anyhow;
use bytes::Bytes;
use itertools::Itertools;
use multipart::server::Multipart;
use tracing::debug;

use pact_models::bodies::OptionalBody;
use pact_models::content_types::ContentType;
use pact_models::matchingrules::MatchingRule;

use crate::{MatchingContext, Mismatch};
use crate::matchers::match_values;

/// Checks that the content type detected from the data (using a magic file check)
/// matches the expected content type
pub fn match_content_type<S: Into<String>>(data: &[u8], expected_content_type: S) -> anyhow::Result<()> {
  let expected_content_type = expected_content_type.into();
  let detected = tree_magic_mini::from_u8(data);
  debug!("Detected content type '{}' from data, expected '{}'", detected, expected_content_type);

  let matches = detected == expected_content_type ||
    ContentType::parse(detected)
      .map(|detected_ct| ContentType::parse(expected_content_type.as_str())
        .map(|expected_ct| expected_ct.is_equivalent_to(&detected_ct.base_type()))
        .unwrap_or(false))
      .unwrap_or(false);
  if matches {
    Ok(())
  } else {
    Err(anyhow!("Expected binary contents to have content type '{}' but detected contents was '{}'",
      expected_content_type, detected))
  }
}

/// Matches binary bodies by byte equality, unless a content-type matcher applies
pub fn match_octet_stream(expected: &OptionalBody, actual: &OptionalBody, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_data = expected.value().unwrap_or_default();
  let actual_data = actual.value().unwrap_or_default();
  let path = vec!["$"];

  if context.matcher_is_defined(&path) {
    let rules = context.select_best_matcher(&path);
    let mut mismatches = vec![];
    for rule in &rules.rules {
      let result = match rule {
        MatchingRule::ContentType(content_type) => match_content_type(&actual_data, content_type.as_str()),
        MatchingRule::NotEmpty => if actual_data.is_empty() {
          Err(anyhow!("Expected a non-empty body"))
        } else {
          Ok(())
        },
        _ => if expected_data == actual_data {
          Ok(())
        } else {
          Err(anyhow!("Expected binary data of {} bytes to match {} bytes",
            actual_data.len(), expected_data.len()))
        }
      };
      if let Err(err) = result {
        mismatches.push(Mismatch::BodyMismatch {
          path: "$".to_string(),
          expected: Some(expected_data.clone()),
          actual: Some(actual_data.clone()),
          mismatch: err.to_string()
        });
      }
    }
    mismatches
  } else if expected_data != actual_data {
    vec![ Mismatch::BodyMismatch {
      path: "$".to_string(),
      expected: Some(expected_data.clone()),
      actual: Some(actual_data.clone()),
      mismatch: format!("Expected binary data of {} bytes to match {} bytes",
        actual_data.len(), expected_data.len())
    } ]
  } else {
    vec![]
  }
}

#[derive(Debug)]
struct MultipartPart {
  name: String,
  content_type: Option<String>,
  data: Vec<u8>
}

fn parse_multipart(body: &Bytes, content_type: &Option<ContentType>) -> anyhow::Result<HashMap<String, MultipartPart>> {
  let boundary = content_type.as_ref()
    .and_then(|ct| ct.boundary().cloned())
    .ok_or_else(|| anyhow!("No boundary parameter found in the content type"))?;
  let mut multipart = Multipart::with_body(Cursor::new(body.to_vec()), boundary);

  let mut parts = HashMap::new();
  loop {
    match multipart.read_entry() {
      Ok(Some(mut entry)) => {
        let name = entry.headers.name.to_string();
        let content_type = entry.headers.content_type.as_ref().map(|mime| mime.to_string());
        let mut data = vec![];
        entry.data.read_to_end(&mut data)
          .map_err(|err| anyhow!("Failed to read multipart entry '{}' - {}", name, err))?;
        parts.insert(name.clone(), MultipartPart { name, content_type, data });
      },
      Ok(None) => break,
      Err(err) => return Err(anyhow!("Failed to parse the multipart body - {}", err))
    }
  }
  Ok(parts)
}

fn compare_part(part_name: &str, expected: &MultipartPart, actual: &MultipartPart, context: &MatchingContext) -> Vec<Mismatch> {
  let mut mismatches = vec![];
  let path = vec!["$", part_name];

  if let (Some(expected_ct), Some(actual_ct)) = (&expected.content_type, &actual.content_type) {
    if expected_ct != actual_ct {
      mismatches.push(Mismatch::BodyTypeMismatch {
        expected: expected_ct.clone(),
        actual: actual_ct.clone(),
        mismatch: format!("Expected multipart part '{}' to have content type '{}' but was '{}'",
          part_name, expected_ct, actual_ct)
      });
      return mismatches;
    }
  }

  let result = if context.matcher_is_defined(&path) {
    match_values(&path, &context.select_best_matcher(&path),
      String::from_utf8_lossy(&expected.data).as_ref(),
      String::from_utf8_lossy(&actual.data).as_ref())
  } else if expected.data != actual.data {
    Err(vec![ format!("Expected contents of multipart part '{}' to match", part_name) ])
  } else {
    Ok(())
  };
  for message in result.err().unwrap_or_default() {
    mismatches.push(Mismatch::BodyMismatch {
      path: path.join("."),
      expected: Some(Bytes::from(expected.data.clone())),
      actual: Some(Bytes::from(actual.data.clone())),
      mismatch: message
    });
  }

  mismatches
}

/// Matches MIME multipart bodies: the parts are parsed and compared part-wise by name
pub fn match_mime_multipart(expected: &OptionalBody, actual: &OptionalBody, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_parts = parse_multipart(&expected.value().unwrap_or_default(), &expected.content_type());
  let actual_parts = parse_multipart(&actual.value().unwrap_or_default(), &actual.content_type());

  match (expected_parts, actual_parts) {
    (Ok(expected_parts), Ok(actual_parts)) => {
      let mut mismatches = vec![];
      for (name, expected_part) in expected_parts.iter().sorted_by(|(a, _), (b, _)| Ord::cmp(a, b)) {
        match actual_parts.get(name) {
          Some(actual_part) => mismatches.extend(compare_part(name, expected_part, actual_part, context)),
          None => mismatches.push(Mismatch::BodyMismatch {
            path: format!("$.{}", name),
            expected: Some(Bytes::from(expected_part.data.clone())),
            actual: None,
            mismatch: format!("Expected a multipart part '{}' but was missing", name)
          })
        }
      }
      mismatches
    },
    (Err(err), _) => vec![ Mismatch::BodyMismatch {
      path: "$".to_string(),
      expected: expected.value(),
      actual: actual.value(),
      mismatch: format!("Failed to parse the expected body as a MIME multipart body: {}", err)
    } ],
    (_, Err(err)) => vec![ Mismatch::BodyMismatch {
      path: "$".to_string(),
      expected: expected.value(),
      actual: actual.value(),
      mismatch: format!("Failed to parse the actual body as a MIME multipart body: {}", err)
    } ]
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use pact_models::content_types::ContentType;

  use crate::DiffConfig;

  use super::*;

  fn multipart_body(boundary: &str, name: &str, value: &str) -> OptionalBody {
    let body = format!(
      "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n--{boundary}--\r\n");
    OptionalBody::Present(Bytes::from(body),
      Some(ContentType::from(format!("multipart/form-data; boundary={}", boundary))))
  }

  fn empty_context() -> MatchingContext {
    MatchingContext::empty("body".into(), DiffConfig::AllowUnexpectedKeys)
  }

  #[test]
  fn equal_binary_bodies_match() {
    let body = OptionalBody::Present(Bytes::from(vec![1u8, 2, 3]), None);
    expect!(match_octet_stream(&body, &body.clone(), &empty_context()).is_empty()).to(be_true());
  }

  #[test]
  fn different_binary_bodies_mismatch() {
    let expected = OptionalBody::Present(Bytes::from(vec![1u8, 2, 3]), None);
    let actual = OptionalBody::Present(Bytes::from(vec![1u8, 2]), None);
    expect!(match_octet_stream(&expected, &actual, &empty_context()).len()).to(be_equal_to(1));
  }

  #[test]
  fn equal_multipart_bodies_match() {
    let expected = multipart_body("1234", "field", "value");
    let actual = multipart_body("4567", "field", "value");
    expect!(match_mime_multipart(&expected, &actual, &empty_context()).is_empty()).to(be_true());
  }

  #[test]
  fn missing_multipart_part_is_a_mismatch() {
    let expected = multipart_body("1234", "field", "value");
    let actual = multipart_body("1234", "other", "value");
    let mismatches = match_mime_multipart(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn different_part_values_mismatch() {
    let expected = multipart_body("1234", "field", "value");
    let actual = multipart_body("1234", "field", "other value");
    let mismatches = match_mime_multipart(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn body_without_boundary_fails_to_parse() {
    let body = OptionalBody::Present(Bytes::from("data"),
      Some(ContentType::from("multipart/form-data")));
    let mismatches = match_mime_multipart(&body, &body.clone(), &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }
}

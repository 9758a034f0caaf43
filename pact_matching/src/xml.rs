//! Matching of XML bodies using a DOM comparison

use sxd_document::dom::{Document, Element};
use sxd_document::parser;

use pact_models::bodies::OptionalBody;
use pact_models::matchingrules::MatchingRule;

use crate::{DiffConfig, MatchingContext, Mismatch};
use crate::matchers::{match_values, Matches};

fn xml_mismatch(path: &[String], message: String) -> Mismatch {
  Mismatch::BodyMismatch {
    path: path.join("."),
    expected: None,
    actual: None,
    mismatch: message
  }
}

/// Matches the expected XML body against the actual one. Bodies that fail to parse
/// fail the whole match with a single mismatch carrying the parse error.
pub fn match_xml(expected: &OptionalBody, actual: &OptionalBody, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_text = expected.value_as_string().unwrap_or_default();
  let actual_text = actual.value_as_string().unwrap_or_default();

  match (parser::parse(&expected_text), parser::parse(&actual_text)) {
    (Ok(expected_package), Ok(actual_package)) => {
      let expected_doc = expected_package.as_document();
      let actual_doc = actual_package.as_document();
      match (root_element(&expected_doc), root_element(&actual_doc)) {
        (Some(expected_root), Some(actual_root)) => {
          let path = vec!["$".to_string()];
          compare_element(&path, &expected_root, &actual_root, context)
        },
        _ => vec![ xml_mismatch(&["$".to_string()], "Could not find a root element in the XML document".to_string()) ]
      }
    },
    (Err(err), _) => vec![ Mismatch::BodyMismatch {
      path: "$".to_string(),
      expected: expected.value(),
      actual: actual.value(),
      mismatch: format!("Failed to parse the expected body as XML: {}", err)
    } ],
    (_, Err(err)) => vec![ Mismatch::BodyMismatch {
      path: "$".to_string(),
      expected: expected.value(),
      actual: actual.value(),
      mismatch: format!("Failed to parse the actual body as XML: {}", err)
    } ]
  }
}

fn root_element<'a>(doc: &Document<'a>) -> Option<Element<'a>> {
  doc.root().children().iter().find_map(|child| child.element())
}

fn qualified_name(element: &Element) -> String {
  let name = element.name();
  match name.namespace_uri() {
    Some(namespace) => format!("{{{}}}{}", namespace, name.local_part()),
    None => name.local_part().to_string()
  }
}

fn compare_element(path: &Vec<String>, expected: &Element, actual: &Element, context: &MatchingContext) -> Vec<Mismatch> {
  let mut result = vec![];

  let expected_name = qualified_name(expected);
  let actual_name = qualified_name(actual);
  if expected_name != actual_name {
    result.push(xml_mismatch(path, format!("Expected element '{}' but received '{}'",
      expected_name, actual_name)));
    return result;
  }

  let mut element_path = path.clone();
  element_path.push(expected.name().local_part().to_string());
  result.extend(compare_attributes(&element_path, expected, actual, context));
  result.extend(compare_text(&element_path, expected, actual, context));
  result.extend(compare_children(&element_path, expected, actual, context));

  result
}

fn compare_attributes(path: &Vec<String>, expected: &Element, actual: &Element, context: &MatchingContext) -> Vec<Mismatch> {
  let mut result = vec![];

  for attribute in expected.attributes() {
    let name = attribute.name();
    let mut attribute_path = path.clone();
    attribute_path.push(format!("@{}", name.local_part()));
    match actual.attribute_value(name) {
      Some(actual_value) => {
        let path_slice: Vec<&str> = attribute_path.iter().map(|p| p.as_str()).collect();
        let matcher_result = if context.matcher_is_defined(&path_slice) {
          match_values(&path_slice, &context.select_best_matcher(&path_slice),
            attribute.value(), actual_value)
        } else {
          attribute.value().matches_with(actual_value, &MatchingRule::Equality, false)
            .map_err(|err| vec![ err.to_string() ])
        };
        for message in matcher_result.err().unwrap_or_default() {
          result.push(xml_mismatch(&attribute_path, message));
        }
      },
      None => result.push(xml_mismatch(&attribute_path,
        format!("Expected attribute '{}' but was missing", name.local_part())))
    }
  }

  if context.config == DiffConfig::NoUnexpectedKeys {
    for attribute in actual.attributes() {
      if expected.attribute_value(attribute.name()).is_none() {
        let mut attribute_path = path.clone();
        attribute_path.push(format!("@{}", attribute.name().local_part()));
        result.push(xml_mismatch(&attribute_path,
          format!("Received unexpected attribute '{}'", attribute.name().local_part())));
      }
    }
  }

  result
}

fn text_content(element: &Element) -> String {
  element.children().iter()
    .filter_map(|child| child.text())
    .map(|text| text.text().trim())
    .collect::<Vec<&str>>()
    .join("")
}

fn compare_text(path: &Vec<String>, expected: &Element, actual: &Element, context: &MatchingContext) -> Vec<Mismatch> {
  let expected_text = text_content(expected);
  let actual_text = text_content(actual);
  let mut text_path = path.clone();
  text_path.push("#text".to_string());

  let path_slice: Vec<&str> = text_path.iter().map(|p| p.as_str()).collect();
  let matcher_result = if context.matcher_is_defined(&path_slice) {
    match_values(&path_slice, &context.select_best_matcher(&path_slice),
      expected_text.as_str(), actual_text.as_str())
  } else if expected_text != actual_text {
    Err(vec![ format!("Expected text '{}' but received '{}'", expected_text, actual_text) ])
  } else {
    Ok(())
  };
  matcher_result.err().unwrap_or_default().iter()
    .map(|message| xml_mismatch(&text_path, message.clone()))
    .collect()
}

fn child_elements<'a>(element: &Element<'a>) -> Vec<Element<'a>> {
  element.children().iter().filter_map(|child| child.element()).collect()
}

fn compare_children(path: &Vec<String>, expected: &Element, actual: &Element, context: &MatchingContext) -> Vec<Mismatch> {
  let mut result = vec![];
  let expected_children = child_elements(expected);
  let actual_children = child_elements(actual);

  let path_slice: Vec<&str> = path.iter().map(|p| p.as_str()).collect();
  let length_matcher = context.matcher_is_defined(&path_slice) &&
    context.select_best_matcher(&path_slice).type_matcher_defined();

  if !length_matcher && expected_children.len() != actual_children.len() {
    result.push(xml_mismatch(path,
      format!("Expected {} child elements but received {}",
        expected_children.len(), actual_children.len())));
  }

  for (index, actual_child) in actual_children.iter().enumerate() {
    let expected_child = expected_children.get(index)
      .or_else(|| expected_children.get(index % expected_children.len().max(1)));
    if let Some(expected_child) = expected_child {
      result.extend(compare_element(path, expected_child, actual_child, context));
    }
  }

  result
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use pact_models::matchingrules_list;

  use super::*;

  fn empty_context() -> MatchingContext {
    MatchingContext::empty("body".into(), DiffConfig::AllowUnexpectedKeys)
  }

  #[test]
  fn equal_xml_matches() {
    let body = OptionalBody::from("<note><to>Alice</to></note>");
    expect!(match_xml(&body, &body.clone(), &empty_context()).is_empty()).to(be_true());
  }

  #[test]
  fn different_element_names_mismatch() {
    let expected = OptionalBody::from("<note/>");
    let actual = OptionalBody::from("<memo/>");
    let mismatches = match_xml(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn different_text_content_mismatches() {
    let expected = OptionalBody::from("<note><to>Alice</to></note>");
    let actual = OptionalBody::from("<note><to>Bob</to></note>");
    let mismatches = match_xml(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn attribute_values_are_compared() {
    let expected = OptionalBody::from(r#"<user id="1"/>"#);
    let actual = OptionalBody::from(r#"<user id="2"/>"#);
    let mismatches = match_xml(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }

  #[test]
  fn type_matcher_on_text_allows_different_values() {
    let rules = matchingrules_list! {
      "body"; "$.note.to.#text" => [ MatchingRule::Type ]
    };
    let context = MatchingContext::new(DiffConfig::AllowUnexpectedKeys, &rules);
    let expected = OptionalBody::from("<note><to>Alice</to></note>");
    let actual = OptionalBody::from("<note><to>Bob</to></note>");
    expect!(match_xml(&expected, &actual, &context).is_empty()).to(be_true());
  }

  #[test]
  fn malformed_xml_fails_with_a_single_mismatch() {
    let expected = OptionalBody::from("<note/>");
    let actual = OptionalBody::from("<note");
    let mismatches = match_xml(&expected, &actual, &empty_context());
    expect!(mismatches.len()).to(be_equal_to(1));
  }
}

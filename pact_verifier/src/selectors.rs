//! Module to deal with consumer version selectors

use crate::pact_broker::ConsumerVersionSelector;

/// Parses a vector of JSON strings into a vector of consumer version selectors
pub fn json_to_selectors(selectors: Vec<&str>) -> Vec<ConsumerVersionSelector> {
  selectors.iter()
    .filter_map(|selector| serde_json::from_str(selector).ok())
    .collect()
}

/// Converts a vector of tags to a vector of consumer version selectors
pub fn consumer_tags_to_selectors(tags: Vec<&str>) -> Vec<ConsumerVersionSelector> {
  tags.iter().map(|tag| {
    ConsumerVersionSelector {
      tag: Some(tag.to_string()),
      latest: Some(true),
      .. ConsumerVersionSelector::default()
    }
  }).collect()
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;

  use super::*;

  #[test]
  fn parses_selectors_from_json_strings() {
    let selectors = json_to_selectors(vec![r#"{"tag": "prod", "latest": true}"#, "not json"]);
    expect!(selectors.len()).to(be_equal_to(1));
    expect!(selectors[0].tag.clone()).to(be_some().value("prod".to_string()));
  }

  #[test]
  fn converts_tags_to_selectors() {
    let selectors = consumer_tags_to_selectors(vec!["main", "prod"]);
    expect!(selectors.len()).to(be_equal_to(2));
    expect!(selectors[1].latest).to(be_some().value(true));
  }
}

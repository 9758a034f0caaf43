//! Functions for dealing with HTTP header values

const SINGLE_VALUE_HEADERS: [&str; 11] = [
  "date",
  "accept-datetime",
  "if-modified-since",
  "if-unmodified-since",
  "expires",
  "retry-after",
  "last-modified",
  "set-cookie",
  "user-agent",
  "authorization",
  "proxy-authorization"
];

/// Tries to parse the header value into multiple values, taking into account headers that
/// should not be split (like dates, which contain commas).
pub fn parse_header_value(name: &str, value: &str) -> Vec<String> {
  if SINGLE_VALUE_HEADERS.contains(&name.to_lowercase().as_str()) {
    vec![ value.trim().to_string() ]
  } else {
    value.split(',').map(|v| v.trim().to_string()).collect()
  }
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;

  use super::*;

  #[test]
  fn splits_comma_separated_values() {
    expect!(parse_header_value("Accept", "application/json, application/xml"))
      .to(be_equal_to(vec!["application/json".to_string(), "application/xml".to_string()]));
  }

  #[test]
  fn does_not_split_date_headers() {
    expect!(parse_header_value("Last-Modified", "Sun, 12 Mar 2023 01:21:35 GMT"))
      .to(be_equal_to(vec!["Sun, 12 Mar 2023 01:21:35 GMT".to_string()]));
  }
}

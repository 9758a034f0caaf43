//! Module for fetching documents via HTTP

use std::fmt::{Display, Formatter};

use anyhow::anyhow;
use reqwest::blocking::Client;
use serde_json::Value;

/// Type of authentication to use when fetching a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
  /// Username and optional password
  User(String, Option<String>),
  /// Bearer token
  Token(String)
}

impl Display for HttpAuth {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      HttpAuth::Token(t) =>
        write!(f, "Token({:*<width$})", t.get(0..4).unwrap_or(""), width = t.len()),
      HttpAuth::User(u, p) => match p {
        Some(pass) => write!(f, "User({}, {:*<width$})", u, pass.get(0..4).unwrap_or(""), width = pass.len()),
        None => write!(f, "User({}, [no password])", u)
      }
    }
  }
}

/// Fetches a JSON document from a URL, returning the URL it was fetched from and the
/// parsed document
pub fn fetch_json_from_url(url: &str, auth: &Option<HttpAuth>) -> anyhow::Result<(String, Value)> {
  let client = Client::new();
  let request = match auth {
    Some(HttpAuth::User(username, password)) => client.get(url).basic_auth(username, password.clone()),
    Some(HttpAuth::Token(token)) => client.get(url).bearer_auth(token),
    None => client.get(url)
  };

  match request.send() {
    Ok(res) => if res.status().is_success() {
      match res.json::<Value>() {
        Ok(json) => Ok((url.to_string(), json)),
        Err(err) => Err(anyhow!("Failed to parse JSON from '{}' - {}", url, err))
      }
    } else {
      Err(anyhow!("Request to '{}' failed with status - {}", url, res.status()))
    },
    Err(err) => Err(anyhow!("Request to '{}' failed - {}", url, err))
  }
}

//! Path expressions (JSON-path-like selectors) used to key matching rules and generators

use std::fmt::{Display, Formatter, Write};
use std::hash::{Hash, Hasher};
use std::iter::Peekable;
use std::str::CharIndices;

use anyhow::anyhow;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// Single token of a parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathToken {
  /// Root token `$`
  Root,
  /// Named field token
  Field(String),
  /// Integer index token
  Index(usize),
  /// `*` token
  Star,
  /// `[*]` token
  StarIndex
}

/// Weighting for a single token against a concrete path fragment. Exact matches weigh
/// double so that more specific selectors out-rank wildcards.
fn matches_token(path_fragment: &str, path_token: &PathToken) -> usize {
  match path_token {
    PathToken::Root if path_fragment == "$" => 2,
    PathToken::Field(name) if path_fragment == name => 2,
    PathToken::Index(index) => match path_fragment.parse::<usize>() {
      Ok(i) if *index == i => 2,
      _ => 0
    },
    PathToken::StarIndex => match path_fragment.parse::<usize>() {
      Ok(_) => 1,
      _ => 0
    },
    PathToken::Star => 1,
    _ => 0
  }
}

/// A parsed path expression, e.g. `$.items[*].id`
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
#[serde(into = "String")]
pub struct DocPath {
  path_tokens: Vec<PathToken>,
  expr: String
}

impl DocPath {
  /// Construct a new document path from the provided string expression
  pub fn new(expr: impl Into<String>) -> anyhow::Result<Self> {
    let expr = expr.into();
    let path_tokens = parse_path_exp(&expr)?;
    Ok(Self { path_tokens, expr })
  }

  /// Infallible construction for statically known expressions. Invalid expressions
  /// will panic, so this is intended for tests and literals.
  pub fn new_unwrap(expr: &'static str) -> Self {
    Self::new(expr).unwrap()
  }

  /// Construct a DocPath with an empty expression. Do not call the `push_*` methods on
  /// the result, as the expression would be missing its root token.
  pub fn empty() -> Self {
    Self { path_tokens: vec![], expr: "".into() }
  }

  /// Construct a DocPath containing just the root token
  pub fn root() -> Self {
    Self { path_tokens: vec![PathToken::Root], expr: "$".into() }
  }

  /// The list of tokens that comprise this path
  pub fn tokens(&self) -> &Vec<PathToken> {
    &self.path_tokens
  }

  /// Length of the path, in parsed tokens
  pub fn len(&self) -> usize {
    self.path_tokens.len()
  }

  /// If the path has no tokens
  pub fn is_empty(&self) -> bool {
    self.path_tokens.is_empty()
  }

  /// If this path is just the root token
  pub fn is_root(&self) -> bool {
    self.path_tokens == [PathToken::Root]
  }

  /// If the path ends in a wildcard (`*` or `[*]`)
  pub fn is_wildcard(&self) -> bool {
    matches!(self.path_tokens.last(), Some(PathToken::Star) | Some(PathToken::StarIndex))
  }

  /// First field name in the path, if any. Used for header and query selectors where
  /// the path form is `$.<name>`.
  pub fn first_field(&self) -> Option<&str> {
    self.path_tokens.iter().find_map(|t| match t {
      PathToken::Field(field) => Some(field.as_str()),
      _ => None
    })
  }

  /// Calculates the weight of this path expression against a concrete path. Returns
  /// a tuple of the weight and the number of tokens matched; a zero weight means no
  /// match.
  pub fn path_weight(&self, path: &[&str]) -> (usize, usize) {
    if path.len() < self.len() {
      return (0, self.len());
    }
    let weight = self.path_tokens.iter().zip(path.iter())
      .fold(1, |acc, (token, fragment)| acc * matches_token(fragment, token));
    (weight, self.len())
  }

  /// If this path expression matches the given concrete path (weight is non-zero)
  pub fn matches_path(&self, path: &[&str]) -> bool {
    self.path_weight(path).0 > 0
  }

  /// If this path matches the given path and both have the same length
  pub fn matches_path_exactly(&self, path: &[&str]) -> bool {
    self.len() == path.len() && self.matches_path(path)
  }

  /// Creates a new path by cloning this one and pushing a field onto the end
  pub fn join(&self, field: impl Into<String>) -> Self {
    let mut path = self.clone();
    path.push_field(field.into());
    path
  }

  /// Creates a new path by cloning this one and pushing an index onto the end
  pub fn join_index(&self, index: usize) -> Self {
    let mut path = self.clone();
    path.push_index(index);
    path
  }

  /// Mutates this path by pushing a field onto the end
  pub fn push_field(&mut self, field: impl Into<String>) -> &mut Self {
    let field = field.into();
    write_obj_key_for_path(&mut self.expr, &field);
    self.path_tokens.push(PathToken::Field(field));
    self
  }

  /// Mutates this path by pushing an index onto the end
  pub fn push_index(&mut self, index: usize) -> &mut Self {
    self.path_tokens.push(PathToken::Index(index));
    // write! to a String is infallible
    write!(self.expr, "[{}]", index).unwrap();
    self
  }

  /// Mutates this path by pushing a star onto the end
  pub fn push_star(&mut self) -> &mut Self {
    self.path_tokens.push(PathToken::Star);
    self.expr.push_str(".*");
    self
  }

  /// Mutates this path by pushing a star index onto the end
  pub fn push_star_index(&mut self) -> &mut Self {
    self.path_tokens.push(PathToken::StarIndex);
    self.expr.push_str("[*]");
    self
  }
}

/// Format a JSON object key for use in a path expression. Plain identifiers use the
/// dot syntax, anything else is quoted.
fn write_obj_key_for_path(mut out: impl Write, key: &str) {
  lazy_static! {
    static ref IDENT: Regex = Regex::new(r#"^[_A-Za-z][_A-Za-z0-9]*$"#)
      .expect("could not parse IDENT regex");
    static ref ESCAPE: Regex = Regex::new(r#"\\|'"#)
      .expect("could not parse ESCAPE regex");
  }

  if IDENT.is_match(key) {
    write!(out, ".{}", key).unwrap();
  } else {
    write!(out, "['{}']",
      ESCAPE.replace_all(key, |caps: &Captures| format!(r#"\{}"#, &caps[0]))).unwrap();
  }
}

impl From<DocPath> for String {
  fn from(doc_path: DocPath) -> String {
    doc_path.expr
  }
}

impl From<&DocPath> for String {
  fn from(doc_path: &DocPath) -> String {
    doc_path.expr.clone()
  }
}

impl TryFrom<String> for DocPath {
  type Error = anyhow::Error;

  fn try_from(path: String) -> Result<Self, Self::Error> {
    DocPath::new(path)
  }
}

impl TryFrom<&str> for DocPath {
  type Error = anyhow::Error;

  fn try_from(path: &str) -> Result<Self, Self::Error> {
    DocPath::new(path)
  }
}

impl PartialEq for DocPath {
  fn eq(&self, other: &Self) -> bool {
    self.expr == other.expr
  }
}

impl PartialOrd for DocPath {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for DocPath {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.expr.cmp(&other.expr)
  }
}

impl Hash for DocPath {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.expr.hash(state);
  }
}

impl Display for DocPath {
  fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
    write!(f, "{}", self.expr)
  }
}

fn is_identifier_char(ch: char) -> bool {
  ch.is_alphanumeric() || ch == '_' || ch == '-' || ch == ':' || ch == '#' || ch == '@'
}

fn parse_identifier(first: char, chars: &mut Peekable<CharIndices>, path: &str) -> anyhow::Result<PathToken> {
  let mut id = String::new();
  id.push(first);
  while let Some((index, ch)) = chars.peek().cloned() {
    if is_identifier_char(ch) {
      chars.next();
      id.push(ch);
    } else if ch == '.' || ch == '[' {
      break;
    } else {
      return Err(anyhow!("\"{}\" is not allowed in an identifier in path expression \"{}\" at index {}",
        ch, path, index));
    }
  }
  Ok(PathToken::Field(id))
}

fn parse_quoted_field(chars: &mut Peekable<CharIndices>, path: &str, start: usize) -> anyhow::Result<PathToken> {
  let mut id = String::new();
  loop {
    match chars.next() {
      Some((_, '\'')) => {
        if id.is_empty() {
          return Err(anyhow!("Empty strings are not allowed in path expression \"{}\" at index {}", path, start));
        }
        return Ok(PathToken::Field(id));
      },
      Some((index, '\\')) => match chars.next() {
        Some((_, ch)) => id.push(ch),
        None => return Err(anyhow!("Unterminated escape in path expression \"{}\" at index {}", path, index))
      },
      Some((_, ch)) => id.push(ch),
      None => return Err(anyhow!("Unterminated string in path expression \"{}\" at index {}", path, start))
    }
  }
}

fn parse_bracketed(chars: &mut Peekable<CharIndices>, path: &str, start: usize) -> anyhow::Result<PathToken> {
  let token = match chars.next() {
    Some((index, '\'')) => parse_quoted_field(chars, path, index)?,
    Some((_, '*')) => PathToken::StarIndex,
    Some((index, ch)) if ch.is_ascii_digit() => {
      let mut digits = String::new();
      digits.push(ch);
      while let Some((_, ch)) = chars.peek().cloned() {
        if ch.is_ascii_digit() {
          chars.next();
          digits.push(ch);
        } else {
          break;
        }
      }
      PathToken::Index(digits.parse().map_err(|err|
        anyhow!("Invalid index in path expression \"{}\" at index {} - {}", path, index, err))?)
    },
    Some((index, ch)) =>
      return Err(anyhow!("Indexes can only consist of numbers or a \"*\", found \"{}\" in path expression \"{}\" at index {}",
        ch, path, index)),
    None =>
      return Err(anyhow!("Expected a \"]\" at the end of the path expression \"{}\"", path))
  };
  match chars.next() {
    Some((_, ']')) => Ok(token),
    Some((index, ch)) =>
      Err(anyhow!("Expected a \"]\", found \"{}\" in path expression \"{}\" at index {}", ch, path, index)),
    None => Err(anyhow!("Unterminated index at index {} in path expression \"{}\"", start, path))
  }
}

/// Parse a path expression string into its tokens
pub fn parse_path_exp(path: &str) -> anyhow::Result<Vec<PathToken>> {
  let mut chars = path.char_indices().peekable();
  let mut tokens = vec![];

  match chars.next() {
    Some((_, '$')) => tokens.push(PathToken::Root),
    Some((index, ch)) =>
      return Err(anyhow!("Path expression \"{}\" does not start with a root marker \"$\", found \"{}\" at index {}",
        path, ch, index)),
    None => return Err(anyhow!("Path expression is empty"))
  }

  while let Some((index, ch)) = chars.next() {
    match ch {
      '.' => match chars.next() {
        Some((_, '*')) => tokens.push(PathToken::Star),
        Some((_, ch)) if is_identifier_char(ch) => tokens.push(parse_identifier(ch, &mut chars, path)?),
        Some((index, ch)) =>
          return Err(anyhow!("Expected either a \"*\" or path identifier, found \"{}\" in path expression \"{}\" at index {}",
            ch, path, index)),
        None => return Err(anyhow!("Expected a path after \".\" in path expression \"{}\" at index {}", path, index))
      },
      '[' => tokens.push(parse_bracketed(&mut chars, path, index)?),
      _ => return Err(anyhow!("Expected a \".\" or \"[\" instead of \"{}\" in path expression \"{}\" at index {}",
        ch, path, index))
    }
  }

  Ok(tokens)
}

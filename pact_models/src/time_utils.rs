//! Translation of Java DateTimeFormatter patterns (the format matchers and generators
//! are expressed in) to chrono format strings, plus date/time validation against them.

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

/// A single token of a Java date/time pattern
#[derive(Debug, Clone, PartialEq)]
enum PatternToken {
  /// Era (AD)
  Era,
  /// Year
  Year(usize),
  /// Month number or name
  Month(usize),
  /// Day of month
  DayOfMonth,
  /// Day name in week
  DayOfWeek(usize),
  /// Hour in day (0-23)
  Hour24,
  /// Hour in am/pm (1-12)
  Hour12,
  /// Minute in hour
  Minute,
  /// Second in minute
  Second,
  /// Fraction of second
  Millisecond(usize),
  /// Am/pm marker
  AmPm,
  /// RFC 822 time zone
  TimezoneOffset,
  /// ISO 8601 time zone
  TimezoneIso,
  /// Time zone name
  TimezoneName,
  /// Literal text
  Literal(String)
}

fn parse_pattern(pattern: &str) -> anyhow::Result<Vec<PatternToken>> {
  let mut tokens = vec![];
  let mut chars = pattern.chars().peekable();

  while let Some(ch) = chars.next() {
    match ch {
      '\'' => {
        // quoted literal, '' is an escaped quote
        let mut literal = String::new();
        loop {
          match chars.next() {
            Some('\'') => {
              if chars.peek() == Some(&'\'') {
                chars.next();
                literal.push('\'');
              } else {
                break;
              }
            },
            Some(ch) => literal.push(ch),
            None => return Err(anyhow!("Unterminated quoted literal in pattern '{}'", pattern))
          }
        }
        if literal.is_empty() {
          literal.push('\'');
        }
        tokens.push(PatternToken::Literal(literal));
      },
      'G' => {
        consume_repeats(&mut chars, 'G');
        tokens.push(PatternToken::Era);
      },
      'y' | 'u' => tokens.push(PatternToken::Year(1 + consume_repeats(&mut chars, ch))),
      'M' | 'L' => tokens.push(PatternToken::Month(1 + consume_repeats(&mut chars, ch))),
      'd' => {
        consume_repeats(&mut chars, 'd');
        tokens.push(PatternToken::DayOfMonth);
      },
      'E' => tokens.push(PatternToken::DayOfWeek(1 + consume_repeats(&mut chars, 'E'))),
      'H' => {
        consume_repeats(&mut chars, 'H');
        tokens.push(PatternToken::Hour24);
      },
      'h' => {
        consume_repeats(&mut chars, 'h');
        tokens.push(PatternToken::Hour12);
      },
      'm' => {
        consume_repeats(&mut chars, 'm');
        tokens.push(PatternToken::Minute);
      },
      's' => {
        consume_repeats(&mut chars, 's');
        tokens.push(PatternToken::Second);
      },
      'S' => tokens.push(PatternToken::Millisecond(1 + consume_repeats(&mut chars, 'S'))),
      'a' => {
        consume_repeats(&mut chars, 'a');
        tokens.push(PatternToken::AmPm);
      },
      'Z' => {
        consume_repeats(&mut chars, 'Z');
        tokens.push(PatternToken::TimezoneOffset);
      },
      'X' | 'x' => {
        consume_repeats(&mut chars, ch);
        tokens.push(PatternToken::TimezoneIso);
      },
      'z' => {
        consume_repeats(&mut chars, 'z');
        tokens.push(PatternToken::TimezoneName);
      },
      _ if ch.is_ascii_alphabetic() =>
        return Err(anyhow!("Pattern letter '{}' in pattern '{}' is not supported", ch, pattern)),
      _ => {
        let mut literal = String::new();
        literal.push(ch);
        while let Some(next) = chars.peek() {
          if next.is_ascii_alphabetic() || *next == '\'' {
            break;
          }
          literal.push(*next);
          chars.next();
        }
        tokens.push(PatternToken::Literal(literal));
      }
    }
  }

  Ok(tokens)
}

fn consume_repeats(chars: &mut std::iter::Peekable<std::str::Chars>, ch: char) -> usize {
  let mut count = 0;
  while chars.peek() == Some(&ch) {
    chars.next();
    count += 1;
  }
  count
}

fn token_to_chrono(token: &PatternToken, out: &mut String) {
  match token {
    PatternToken::Era => out.push_str("AD"),
    PatternToken::Year(digits) => out.push_str(if *digits == 2 { "%y" } else { "%Y" }),
    PatternToken::Month(digits) => out.push_str(match digits {
      1 | 2 => "%m",
      3 => "%b",
      _ => "%B"
    }),
    PatternToken::DayOfMonth => out.push_str("%d"),
    PatternToken::DayOfWeek(digits) => out.push_str(if *digits > 3 { "%A" } else { "%a" }),
    PatternToken::Hour24 => out.push_str("%H"),
    PatternToken::Hour12 => out.push_str("%I"),
    PatternToken::Minute => out.push_str("%M"),
    PatternToken::Second => out.push_str("%S"),
    PatternToken::Millisecond(_) => out.push_str("%3f"),
    PatternToken::AmPm => out.push_str("%p"),
    PatternToken::TimezoneOffset => out.push_str("%z"),
    PatternToken::TimezoneIso => out.push_str("%:z"),
    PatternToken::TimezoneName => out.push_str("%Z"),
    PatternToken::Literal(literal) => for ch in literal.chars() {
      if ch == '%' {
        out.push_str("%%");
      } else {
        out.push(ch);
      }
    }
  }
}

/// Translates a Java date/time pattern into the equivalent chrono format string
pub fn to_chrono_pattern(pattern: &str) -> anyhow::Result<String> {
  let tokens = parse_pattern(pattern)?;
  let mut result = String::new();
  for token in &tokens {
    token_to_chrono(token, &mut result);
  }
  Ok(result)
}

fn has_date_component(tokens: &[PatternToken]) -> bool {
  tokens.iter().any(|t| matches!(t,
    PatternToken::Year(_) | PatternToken::Month(_) | PatternToken::DayOfMonth | PatternToken::DayOfWeek(_)))
}

fn has_time_component(tokens: &[PatternToken]) -> bool {
  tokens.iter().any(|t| matches!(t,
    PatternToken::Hour24 | PatternToken::Hour12 | PatternToken::Minute | PatternToken::Second |
    PatternToken::Millisecond(_) | PatternToken::AmPm))
}

fn has_timezone_component(tokens: &[PatternToken]) -> bool {
  tokens.iter().any(|t| matches!(t,
    PatternToken::TimezoneOffset | PatternToken::TimezoneIso | PatternToken::TimezoneName))
}

/// Validates the given string against the Java date/time pattern. Returns an error if
/// the pattern is invalid or the value does not parse against it.
pub fn validate_datetime(value: &str, format: &str) -> anyhow::Result<()> {
  let tokens = parse_pattern(format)?;
  let mut chrono_pattern = String::new();
  for token in &tokens {
    token_to_chrono(token, &mut chrono_pattern);
  }

  let date = has_date_component(&tokens);
  let time = has_time_component(&tokens);
  let zone = has_timezone_component(&tokens);
  let result = match (date, time) {
    (true, true) => if zone {
      chrono::DateTime::parse_from_str(value, &chrono_pattern).map(|_| ())
    } else {
      NaiveDateTime::parse_from_str(value, &chrono_pattern).map(|_| ())
    },
    (true, false) => NaiveDate::parse_from_str(value, &chrono_pattern).map(|_| ()),
    (false, true) => NaiveTime::parse_from_str(value, &chrono_pattern).map(|_| ()),
    (false, false) => return Err(anyhow!("Pattern '{}' has no date or time components", format))
  };
  result.map_err(|err| anyhow!("'{}' does not match the pattern '{}' - {}", value, format, err))
}

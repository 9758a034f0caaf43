//! V4 specification models

use std::collections::HashMap;

use crate::bodies::OptionalBody;
use crate::content_types::{ContentType, detect_content_type_from_bytes};

pub mod http_parts;
pub mod message_parts;
pub mod interaction;
pub mod synch_http;
pub mod async_message;
pub mod sync_message;

/// Determines the content type of a body: the content type attached to the body wins,
/// then any `Content-Type` header, and finally the leading bytes are sniffed.
pub fn calc_content_type(body: &OptionalBody, headers: &Option<HashMap<String, Vec<String>>>) -> Option<ContentType> {
  body.content_type()
    .or_else(|| headers.as_ref().and_then(|headers| {
      headers.iter()
        .find(|(k, _)| k.to_lowercase() == "content-type")
        .and_then(|(_, v)| v.first())
        .and_then(|v| ContentType::parse(v.as_str()).ok())
    }))
    .or_else(|| body.value().and_then(|bytes| detect_content_type_from_bytes(&bytes)))
}

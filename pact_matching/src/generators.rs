//! Applying generators to requests, responses and message contents: value sites with
//! attached generators are rendered to concrete values before the mock server replies
//! or the verifier replays a request.

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use pact_models::bodies::OptionalBody;
use pact_models::generators::{Generator, GeneratorCategory, GeneratorContext, GeneratorTestMode};
use pact_models::json_utils::json_to_string;
use pact_models::path_exp::{DocPath, PathToken};
use pact_models::v4::http_parts::{HttpRequest, HttpResponse};
use pact_models::v4::message_parts::MessageContents;

/// Applies the generator to all the nodes of the JSON value selected by the path
/// tokens
fn apply_generator_to_json(value: &mut Value, tokens: &[PathToken], generator: &Generator, ctx: &mut GeneratorContext) {
  match tokens.split_first() {
    Some((PathToken::Root, rest)) => apply_generator_to_json(value, rest, generator, ctx),
    Some((PathToken::Field(name), rest)) => {
      if let Value::Object(map) = value {
        if let Some(entry) = map.get_mut(name) {
          apply_generator_to_json(entry, rest, generator, ctx);
        }
      }
    },
    Some((PathToken::Index(index), rest)) => {
      if let Value::Array(array) = value {
        if let Some(entry) = array.get_mut(*index) {
          apply_generator_to_json(entry, rest, generator, ctx);
        }
      }
    },
    Some((PathToken::Star, rest)) => match value {
      Value::Object(map) => for entry in map.values_mut() {
        apply_generator_to_json(entry, rest, generator, ctx);
      },
      Value::Array(array) => for entry in array.iter_mut() {
        apply_generator_to_json(entry, rest, generator, ctx);
      },
      _ => ()
    },
    Some((PathToken::StarIndex, rest)) => {
      if let Value::Array(array) = value {
        for entry in array.iter_mut() {
          apply_generator_to_json(entry, rest, generator, ctx);
        }
      }
    },
    None => match generator.generate_value(&value.clone(), ctx) {
      Ok(new_value) => *value = new_value,
      Err(err) => warn!("Failed to generate a value - {}", err)
    }
  }
}

/// Applies body generators to a JSON body, returning the rendered body
pub fn apply_body_generators(
  body: &OptionalBody,
  generators: &std::collections::HashMap<DocPath, Generator>,
  ctx: &mut GeneratorContext
) -> OptionalBody {
  if generators.is_empty() || !body.is_present() {
    return body.clone();
  }
  let is_json = body.content_type().map(|ct| ct.is_json()).unwrap_or(false);
  if !is_json {
    debug!("Body generators are only supported for JSON bodies");
    return body.clone();
  }

  match serde_json::from_slice::<Value>(&body.value().unwrap_or_default()) {
    Ok(mut json_body) => {
      for (path, generator) in generators {
        apply_generator_to_json(&mut json_body, path.tokens(), generator, ctx);
      }
      OptionalBody::Present(Bytes::from(json_body.to_string()), body.content_type())
    },
    Err(err) => {
      warn!("Failed to parse the body as JSON, not applying the generators - {}", err);
      body.clone()
    }
  }
}

fn apply_multimap_generators(
  map: &mut std::collections::HashMap<String, Vec<String>>,
  generators: &std::collections::HashMap<DocPath, Generator>,
  ctx: &mut GeneratorContext
) {
  for (path, generator) in generators {
    if let Some(name) = path.first_field() {
      if let Some(values) = map.get_mut(name) {
        for value in values.iter_mut() {
          match generator.generate_value(&Value::String(value.clone()), ctx) {
            Ok(new_value) => *value = json_to_string(&new_value),
            Err(err) => warn!("Failed to generate a value for '{}' - {}", name, err)
          }
        }
      }
    }
  }
}

/// Renders an expected request with its generators applied: path, query parameters,
/// headers and body value sites are replaced with generated values
pub fn generate_request(request: &HttpRequest, mode: &GeneratorTestMode, ctx: &mut GeneratorContext) -> HttpRequest {
  let mut request = request.clone();

  for (_, generator) in request.generators.for_category(&GeneratorCategory::PATH, mode) {
    match generator.generate_value(&Value::String(request.path.clone()), ctx) {
      Ok(new_path) => request.path = json_to_string(&new_path),
      Err(err) => warn!("Failed to generate a value for the request path - {}", err)
    }
  }

  let query_generators = request.generators.for_category(&GeneratorCategory::QUERY, mode);
  if let Some(query) = &mut request.query {
    apply_multimap_generators(query, &query_generators, ctx);
  }

  let header_generators = request.generators.for_category(&GeneratorCategory::HEADER, mode);
  if let Some(headers) = &mut request.headers {
    apply_multimap_generators(headers, &header_generators, ctx);
  }

  let body_generators = request.generators.for_category(&GeneratorCategory::BODY, mode);
  request.body = apply_body_generators(&request.body, &body_generators, ctx);

  request
}

/// Renders an expected response with its generators applied
pub fn generate_response(response: &HttpResponse, mode: &GeneratorTestMode, ctx: &mut GeneratorContext) -> HttpResponse {
  let mut response = response.clone();

  for (_, generator) in response.generators.for_category(&GeneratorCategory::STATUS, mode) {
    match generator.generate_value(&Value::from(response.status), ctx) {
      Ok(new_status) => match new_status.as_u64() {
        Some(status) => response.status = status as u16,
        None => warn!("Generated value '{}' is not a valid status code", new_status)
      },
      Err(err) => warn!("Failed to generate a value for the response status - {}", err)
    }
  }

  let header_generators = response.generators.for_category(&GeneratorCategory::HEADER, mode);
  if let Some(headers) = &mut response.headers {
    apply_multimap_generators(headers, &header_generators, ctx);
  }

  let body_generators = response.generators.for_category(&GeneratorCategory::BODY, mode);
  response.body = apply_body_generators(&response.body, &body_generators, ctx);

  response
}

/// Renders message contents with their generators applied (contents and metadata)
pub fn generate_message_contents(contents: &MessageContents, mode: &GeneratorTestMode, ctx: &mut GeneratorContext) -> MessageContents {
  let mut contents = contents.clone();

  let body_generators = contents.generators.for_category(&GeneratorCategory::BODY, mode);
  contents.contents = apply_body_generators(&contents.contents, &body_generators, ctx);

  for (path, generator) in contents.generators.for_category(&GeneratorCategory::METADATA, mode) {
    if let Some(name) = path.first_field() {
      if let Some(value) = contents.metadata.get(name).cloned() {
        match generator.generate_value(&value, ctx) {
          Ok(new_value) => {
            contents.metadata.insert(name.to_string(), new_value);
          },
          Err(err) => warn!("Failed to generate a value for metadata key '{}' - {}", name, err)
        }
      }
    }
  }

  contents
}

#[cfg(test)]
mod tests {
  use expectest::prelude::*;
  use maplit::hashmap;
  use serde_json::json;

  use pact_models::generators::Generators;
  use pact_models::path_exp::DocPath;

  use super::*;

  #[test]
  fn applies_a_generator_to_a_nested_json_value() {
    let mut value = json!({"user": {"id": 100}});
    let path = DocPath::new_unwrap("$.user.id");
    let mut ctx = GeneratorContext::new(42);
    apply_generator_to_json(&mut value, path.tokens(), &Generator::RandomInt(500, 1000), &mut ctx);
    let id = value["user"]["id"].as_i64().unwrap();
    expect!(id >= 500 && id <= 1000).to(be_true());
  }

  #[test]
  fn applies_a_generator_to_all_array_elements() {
    let mut value = json!({"items": [{"id": 1}, {"id": 2}]});
    let path = DocPath::new_unwrap("$.items[*].id");
    let mut ctx = GeneratorContext::new(42);
    apply_generator_to_json(&mut value, path.tokens(), &Generator::RandomInt(500, 1000), &mut ctx);
    for item in value["items"].as_array().unwrap() {
      let id = item["id"].as_i64().unwrap();
      expect!(id >= 500 && id <= 1000).to(be_true());
    }
  }

  #[test]
  fn generate_request_applies_path_and_body_generators() {
    let mut generators = Generators::default();
    generators.add_generator_with_subcategory(&GeneratorCategory::PATH,
      DocPath::root(), Generator::Regex("/users/\\d{3}".to_string()));
    generators.add_generator_with_subcategory(&GeneratorCategory::BODY,
      DocPath::new_unwrap("$.id"), Generator::RandomInt(0, 10));
    let request = HttpRequest {
      path: "/users/example".to_string(),
      body: OptionalBody::from(&json!({"id": 1234})),
      generators,
      .. HttpRequest::default()
    };

    let mut ctx = GeneratorContext::new(42);
    let generated = generate_request(&request, &GeneratorTestMode::Provider, &mut ctx);
    expect!(regex::Regex::new("^/users/\\d{3}$").unwrap()
      .is_match(&generated.path)).to(be_true());
    let body: Value = serde_json::from_slice(&generated.body.value().unwrap()).unwrap();
    let id = body["id"].as_i64().unwrap();
    expect!(id >= 0 && id <= 10).to(be_true());
  }

  #[test]
  fn generate_response_applies_header_generators() {
    let mut generators = Generators::default();
    generators.add_generator_with_subcategory(&GeneratorCategory::HEADER,
      DocPath::root().join("X-Req-ID"), Generator::Uuid);
    let response = HttpResponse {
      headers: Some(hashmap!{ "X-Req-ID".to_string() => vec!["to-be-generated".to_string()] }),
      generators,
      .. HttpResponse::default()
    };

    let mut ctx = GeneratorContext::new(42);
    let generated = generate_response(&response, &GeneratorTestMode::Consumer, &mut ctx);
    let value = &generated.headers.unwrap()["X-Req-ID"][0];
    expect!(uuid::Uuid::parse_str(value)).to(be_ok());
  }

  #[test]
  fn provider_state_generators_only_apply_in_provider_mode() {
    let mut generators = Generators::default();
    generators.add_generator_with_subcategory(&GeneratorCategory::BODY,
      DocPath::new_unwrap("$.id"), Generator::ProviderStateGenerator("userId".to_string(), None));
    let request = HttpRequest {
      body: OptionalBody::from(&json!({"id": "unset"})),
      generators,
      .. HttpRequest::default()
    };

    let mut ctx = GeneratorContext::new(42)
      .with_state_params(hashmap!{ "userId".to_string() => json!(666) });

    let generated = generate_request(&request, &GeneratorTestMode::Consumer, &mut ctx);
    let body: Value = serde_json::from_slice(&generated.body.value().unwrap()).unwrap();
    expect!(&body["id"]).to(be_equal_to(&json!("unset")));

    let generated = generate_request(&request, &GeneratorTestMode::Provider, &mut ctx);
    let body: Value = serde_json::from_slice(&generated.body.value().unwrap()).unwrap();
    expect!(&body["id"]).to(be_equal_to(&json!(666)));
  }
}

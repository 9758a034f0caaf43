//! The Pact document model: the contract between one consumer and one provider, with
//! reading, canonical writing and merge-on-write semantics.

use std::collections::BTreeMap;
#[cfg(not(target_family = "wasm"))] use std::fs;
#[cfg(not(target_family = "wasm"))] use std::fs::File;
#[cfg(not(target_family = "wasm"))] use std::io::{Read, Write};
#[cfg(not(target_family = "wasm"))] use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context};
use lazy_static::lazy_static;
use serde_json::{json, Map, Value};
use tracing::{debug, trace, warn};

use crate::{Consumer, PactSpecification, Provider};
#[cfg(not(target_family = "wasm"))] use crate::file_utils::{with_read_lock, with_write_lock};
#[cfg(not(target_family = "wasm"))] use crate::http_utils::{fetch_json_from_url, HttpAuth};
use crate::json_utils::json_to_string;
use crate::v4::interaction::Interaction;

/// A Pact: the contract between a consumer and a provider, made up of an ordered
/// sequence of interactions
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pact {
  /// Consumer side of the pact
  pub consumer: Consumer,
  /// Provider side of the pact
  pub provider: Provider,
  /// Ordered sequence of interactions
  pub interactions: Vec<Interaction>,
  /// Metadata associated with this pact
  pub metadata: BTreeMap<String, BTreeMap<String, String>>,
  /// Specification version of this pact
  pub specification_version: PactSpecification
}

impl Pact {
  /// Creates a new pact for the given consumer and provider with the default (V4)
  /// specification version
  pub fn new<C: Into<String>, P: Into<String>>(consumer: C, provider: P) -> Pact {
    Pact {
      consumer: Consumer { name: consumer.into() },
      provider: Provider { name: provider.into() },
      specification_version: PactSpecification::V4,
      .. Pact::default()
    }
  }

  /// Parses a pact from its JSON form. The decoder is strict about the required
  /// attributes (consumer, provider) and tolerant of unknown ones.
  pub fn from_json(source: &str, json: &Value) -> anyhow::Result<Pact> {
    let map = match json {
      Value::Object(map) => map,
      _ => bail!("Failed to parse Pact JSON from source '{}' - it is not a valid pact file", source)
    };

    let consumer = map.get("consumer")
      .map(Consumer::from_json)
      .ok_or_else(|| anyhow!("Pact file from source '{}' is missing the 'consumer' attribute", source))?;
    let provider = map.get("provider")
      .map(Provider::from_json)
      .ok_or_else(|| anyhow!("Pact file from source '{}' is missing the 'provider' attribute", source))?;

    let metadata = parse_meta_data(json);
    let specification_version = determine_spec_version(source, &metadata);
    trace!("from_json: found spec version {} in metadata", specification_version);

    let interactions_json = match map.get("interactions") {
      Some(Value::Array(interactions)) => interactions.clone(),
      // V3 message pacts store their interactions under a "messages" attribute
      None => match map.get("messages") {
        Some(Value::Array(messages)) => messages.clone(),
        _ => vec![]
      },
      _ => vec![]
    };
    let interactions = interactions_json.iter().enumerate()
      .map(|(index, json)| Interaction::from_json(json, index)
        .with_context(|| format!("Unable to parse interaction {} from source '{}'", index, source)))
      .collect::<anyhow::Result<Vec<Interaction>>>()?;

    Ok(Pact {
      consumer,
      provider,
      interactions,
      metadata,
      specification_version
    })
  }

  /// Converts this pact to its canonical JSON form for the given specification
  /// version. Fails if the pact invariants do not hold (empty consumer or provider
  /// name, duplicate interaction keys).
  pub fn to_json(&self, pact_spec: PactSpecification) -> anyhow::Result<Value> {
    self.validate()?;
    Ok(json!({
      "consumer": self.consumer.to_json(),
      "provider": self.provider.to_json(),
      "interactions": Value::Array(self.interactions.iter()
        .map(|interaction| interaction.to_json(&pact_spec))
        .collect()),
      "metadata": self.metadata_to_json(&pact_spec)
    }))
  }

  /// Checks the pact invariants: non-empty consumer and provider names and unique
  /// interaction keys
  pub fn validate(&self) -> anyhow::Result<()> {
    if self.consumer.name.is_empty() {
      bail!("Pact consumer name can not be empty");
    }
    if self.provider.name.is_empty() {
      bail!("Pact provider name can not be empty");
    }
    let mut keys = std::collections::HashSet::new();
    for interaction in &self.interactions {
      if !keys.insert(interaction.unique_key()) {
        bail!("Duplicate interaction found in pact: '{}' (description and provider states must be unique)",
          interaction.description());
      }
    }
    Ok(())
  }

  fn metadata_to_json(&self, pact_spec: &PactSpecification) -> Value {
    let mut metadata: BTreeMap<String, Value> = self.metadata.iter()
      .filter(|(key, _)| key.as_str() != "pactSpecification" && key.as_str() != "pact-python")
      .map(|(key, value)| (key.clone(), json!(value)))
      .collect();
    metadata.insert("pactSpecification".to_string(), json!({
      "version": pact_spec.version_str()
    }));
    metadata.insert("pact-python".to_string(), json!({
      "version": env!("CARGO_PKG_VERSION")
    }));
    json!(metadata)
  }

  /// Adds the interaction to this pact. An interaction with the same key (description
  /// plus provider states) replaces the existing one.
  pub fn add_interaction(&mut self, interaction: Interaction) {
    let key = interaction.unique_key();
    match self.interactions.iter().position(|i| i.unique_key() == key) {
      Some(index) => {
        debug!("Replacing existing interaction '{}'", interaction.description());
        self.interactions[index] = interaction;
      },
      None => self.interactions.push(interaction)
    }
  }

  /// Merges this pact (the newly recorded one) with the other pact (the previously
  /// existing one). Interactions from this pact replace existing ones with the same
  /// key; all other existing interactions are preserved. The resulting sequence is
  /// ordered by first appearance.
  pub fn merge(&self, other: &Pact) -> anyhow::Result<Pact> {
    if self.consumer.name != other.consumer.name || self.provider.name != other.provider.name {
      bail!("Unable to merge pacts, as they have different consumers or providers: ({}, {}) vs ({}, {})",
        self.consumer.name, self.provider.name, other.consumer.name, other.provider.name);
    }

    let mut interactions = other.interactions.clone();
    for interaction in &self.interactions {
      let key = interaction.unique_key();
      match interactions.iter().position(|i| i.unique_key() == key) {
        Some(index) => interactions[index] = interaction.clone(),
        None => interactions.push(interaction.clone())
      }
    }

    Ok(Pact {
      consumer: self.consumer.clone(),
      provider: self.provider.clone(),
      interactions,
      metadata: self.metadata.clone(),
      specification_version: self.specification_version.max(other.specification_version)
    })
  }

  /// The default file name for this pact, based on the consumer and provider names
  pub fn default_file_name(&self) -> String {
    format!("{}-{}.json", self.consumer.name, self.provider.name)
  }
}

/// Construct the pact metadata from the JSON `metadata` attribute
pub fn parse_meta_data(pact_json: &Value) -> BTreeMap<String, BTreeMap<String, String>> {
  match pact_json.get("metadata") {
    Some(Value::Object(obj)) => obj.iter().map(|(k, v)| {
      let val = match v {
        Value::Object(map) => map.iter().map(|(k, v)| match v {
          Value::String(s) => (k.clone(), s.clone()),
          _ => (k.clone(), v.to_string())
        }).collect(),
        _ => BTreeMap::default()
      };
      let key = match k.as_str() {
        "pact-specification" => "pactSpecification".to_string(),
        _ => k.clone()
      };
      (key, val)
    }).collect(),
    _ => BTreeMap::default()
  }
}

/// Determines the specification version from the pact metadata, defaulting to V3 for
/// files with no version information
pub fn determine_spec_version(file: &str, metadata: &BTreeMap<String, BTreeMap<String, String>>) -> PactSpecification {
  let specification = metadata.get("pactSpecification")
    .or_else(|| metadata.get("pactSpecificationVersion"));
  match specification.and_then(|spec| spec.get("version")) {
    Some(version) => match PactSpecification::parse_version(version) {
      Ok(spec) => spec,
      Err(err) => {
        warn!("Could not parse specification version '{}' in pact file '{}' - {}", version, file, err);
        PactSpecification::Unknown
      }
    },
    None => {
      warn!("No specification version found in pact file '{}', defaulting to V3", file);
      PactSpecification::V3
    }
  }
}

/// Parses a pact from a JSON value, resolving the specification version from the
/// metadata
pub fn load_pact_from_json(source: &str, json: &Value) -> anyhow::Result<Pact> {
  Pact::from_json(source, json)
}

lazy_static!{
  static ref WRITE_LOCK: Mutex<()> = Mutex::new(());
}

/// Reads the pact file and parses the resulting JSON into a `Pact` struct
#[cfg(not(target_family = "wasm"))]
pub fn read_pact(file: &Path) -> anyhow::Result<Pact> {
  let buf = with_read_lock(file, 3, &mut |f: &mut File| {
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    Ok(buf)
  })?;
  let pact_json: Value = serde_json::from_str(&buf)
    .with_context(|| format!("Failed to parse Pact JSON from file '{}'", file.display()))?;
  Pact::from_json(&file.to_string_lossy(), &pact_json)
}

/// Reads the pact file from a URL and parses the resulting JSON into a `Pact` struct
#[cfg(not(target_family = "wasm"))]
pub fn load_pact_from_url(url: &str, auth: &Option<HttpAuth>) -> anyhow::Result<Pact> {
  let (url, pact_json) = fetch_json_from_url(url, auth)?;
  Pact::from_json(&url, &pact_json)
}

/// Writes the pact out to the provided path. If there is an existing pact file at the
/// path, the two pacts will be merged unless overwrite is true. The write is atomic:
/// the contents go to a temporary file which is renamed over the target.
#[cfg(not(target_family = "wasm"))]
pub fn write_pact(pact: &Pact, path: &Path, pact_spec: PactSpecification, overwrite: bool) -> anyhow::Result<()> {
  if let Some(parent) = path.parent() {
    if !parent.as_os_str().is_empty() {
      fs::create_dir_all(parent)?;
    }
  }
  let _guard = WRITE_LOCK.lock().unwrap();

  let pact_to_write = if !overwrite && path.exists() {
    debug!("Merging pact with existing file {:?}", path);
    let existing_pact = read_pact(path)?;
    if existing_pact.specification_version < pact.specification_version {
      warn!("Note: Existing pact is an older specification version ({:?}), and will be upgraded",
        existing_pact.specification_version);
    }
    pact.merge(&existing_pact)?
  } else {
    pact.clone()
  };

  let pact_json = serde_json::to_string_pretty(&pact_to_write.to_json(pact_spec)?)?;
  let temp_path = path.with_extension(format!("json.{}.tmp", std::process::id()));
  debug!("Writing new pact file to {:?} via {:?}", path, temp_path);

  let mut file = File::create(&temp_path)?;
  let result = with_write_lock(&temp_path, &mut file, 3, &mut |f| {
    f.write_all(pact_json.as_bytes())?;
    Ok(())
  });
  match result {
    Ok(_) => fs::rename(&temp_path, path)
      .with_context(|| format!("Failed to rename '{}' to '{}'", temp_path.display(), path.display())),
    Err(err) => {
      let _ = fs::remove_file(&temp_path);
      Err(err)
    }
  }
}

/// Look up a value from the pact metadata in a case-insensitive manner
pub fn lookup_metadata<'a>(metadata: &'a Map<String, Value>, key: &str) -> Option<String> {
  metadata.iter()
    .find(|(k, _)| k.to_lowercase() == key.to_lowercase())
    .map(|(_, v)| json_to_string(v))
}

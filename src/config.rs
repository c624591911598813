// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Launcher configuration.
//!
//! The configuration is a properties file:
//!
//! ```text
//! # stores
//! source.url = file:/var/lib/progressive/source
//! meta.url = file:/var/lib/progressive/meta
//! tmp.url = memory:
//! port = 9000
//! chunkSize = 100000
//! ```

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

use serde::de::{self, Deserializer, Unexpected};
use serde::Deserialize;
use serde_json::map::Entry;
use serde_json::{Map, Value};
use tracing::info;

/// The default configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "progressive-db.conf";

/// The error type of configuration loading.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration {path:?}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration: {0}")]
    Properties(#[from] java_properties::PropertiesError),
    #[error("configuration key {0:?} is both a value and a section")]
    Conflict(String),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Where a store lives, and how to log in.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct StoreConfig {
    #[serde(deserialize_with = "non_empty")]
    pub url: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl StoreConfig {
    pub fn memory() -> Self {
        StoreConfig {
            url: "memory:".into(),
            user: None,
            password: None,
        }
    }
}

// credentials are never printed
impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("user", &self.user.as_ref().map(|_| "<set>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The `view.*` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ViewConfig {
    /// Chunks absorbed by a view before each `WITH FUTURE` read.
    #[serde(
        rename = "advanceChunks",
        default = "default_advance_chunks",
        deserialize_with = "positive"
    )]
    pub advance_chunks: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            advance_chunks: default_advance_chunks(),
        }
    }
}

/// The configuration of a server process.
///
/// Dotted property keys are sections, so `source.url` is the `url` of the
/// `source` store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub source: StoreConfig,
    pub meta: StoreConfig,
    pub tmp: StoreConfig,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "parsed")]
    pub port: u16,
    /// Rows per chunk. `None` for the default partitioning.
    #[serde(rename = "chunkSize", default, deserialize_with = "chunk_size")]
    pub chunk_size: Option<usize>,
    #[serde(
        rename = "cacheCapacity",
        default = "default_cache_capacity",
        deserialize_with = "parsed"
    )]
    pub cache_capacity: u64,
    #[serde(default)]
    pub view: ViewConfig,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    9000
}

fn default_cache_capacity() -> u64 {
    1024
}

fn default_advance_chunks() -> usize {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            source: StoreConfig::memory(),
            meta: StoreConfig::memory(),
            tmp: StoreConfig::memory(),
            host: default_host(),
            port: default_port(),
            chunk_size: None,
            cache_capacity: default_cache_capacity(),
            view: ViewConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a properties file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_properties(java_properties::read(BufReader::new(file))?)
    }

    fn from_properties(props: HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut root = Map::new();
        for (key, value) in props {
            nest(&mut root, &key, &key, value)?;
        }
        Ok(serde_json::from_value(Value::Object(root))?)
    }

    /// Log the configuration. Credentials are reported as present or absent.
    pub fn log(&self) {
        for (name, store) in [("source", &self.source), ("meta", &self.meta), ("tmp", &self.tmp)] {
            info!(
                store = name,
                url = %store.url,
                user = store.user.is_some(),
                password = store.password.is_some(),
                "store configured"
            );
        }
        info!(
            host = %self.host,
            port = self.port,
            chunk_size = ?self.chunk_size,
            cache_capacity = self.cache_capacity,
            advance_chunks = self.view.advance_chunks,
            "server configured"
        );
    }
}

impl FromStr for ServerConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_properties(java_properties::read(s.as_bytes())?)
    }
}

/// Insert `value` under the dotted `key`, one object per section.
fn nest(map: &mut Map<String, Value>, key: &str, full: &str, value: String) -> Result<(), ConfigError> {
    match key.split_once('.') {
        None => match map.entry(key) {
            Entry::Vacant(entry) => {
                entry.insert(Value::String(value));
                Ok(())
            }
            Entry::Occupied(_) => Err(ConfigError::Conflict(full.into())),
        },
        Some((section, rest)) => match map
            .entry(section)
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(inner) => nest(inner, rest, full, value),
            _ => Err(ConfigError::Conflict(full.into())),
        },
    }
}

/// Property values are strings.
fn parsed<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let s = String::deserialize(deserializer)?;
    s.trim()
        .parse()
        .map_err(|e| de::Error::custom(format!("{s:?}: {e}")))
}

fn positive<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let n: usize = parsed(deserializer)?;
    if n == 0 {
        return Err(de::Error::invalid_value(Unexpected::Unsigned(0), &"a positive number"));
    }
    Ok(n)
}

/// `-1` asks for the default partitioning.
fn chunk_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
    let n: i64 = parsed(deserializer)?;
    match n {
        -1 => Ok(None),
        n if n > 0 => usize::try_from(n).map(Some).map_err(de::Error::custom),
        n => Err(de::Error::invalid_value(
            Unexpected::Signed(n),
            &"a positive chunk size or -1",
        )),
    }
}

fn non_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let s = String::deserialize(deserializer)?;
    if s.trim().is_empty() {
        return Err(de::Error::invalid_value(Unexpected::Str(&s), &"a store url"));
    }
    Ok(s)
}

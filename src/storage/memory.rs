// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use super::*;

/// Process-local store. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    map: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        check_key(key)?;
        Ok(self.map.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> StorageResult<()> {
        check_key(key)?;
        self.map.write().insert(key.into(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        check_key(key)?;
        self.map.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        check_key(prefix)?;
        let prefix = format!("{prefix}/");
        let map = self.map.read();
        let mut children: Vec<String> = map
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(&prefix))
            .map(|k| {
                let rest = &k[prefix.len()..];
                rest.split('/').next().unwrap_or(rest).to_string()
            })
            .collect();
        children.sort();
        children.dedup();
        Ok(children)
    }
}

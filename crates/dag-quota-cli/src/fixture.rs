//! JSON fixtures describing a DAG, the mutable pointers into it and the
//! registered users, loaded into the in-memory backends.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use dag_quota::{
    Backends, ContentHash, MemoryBlockStore, MemoryDirectory, MemoryPointers, WriterData,
    WriterIdentity,
};

/// One block, named locally so links and pointers can refer to it.
#[derive(Debug, Deserialize)]
pub struct FixtureBlock {
    /// Payload size in bytes for data blocks.
    #[serde(default)]
    pub data: usize,
    #[serde(default)]
    pub links: Vec<String>,
    /// Present on writer roots: the payload becomes a writer data record.
    #[serde(default)]
    pub owned_keys: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub blocks: BTreeMap<String, FixtureBlock>,
    /// Writer identity → block name.
    #[serde(default)]
    pub pointers: BTreeMap<String, String>,
    /// Username → root writer identity.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

/// In-memory backends populated from a fixture.
pub struct LoadedFixture {
    pub store: Arc<MemoryBlockStore>,
    pub pointers: Arc<MemoryPointers>,
    pub directory: Arc<MemoryDirectory>,
    pub hashes: HashMap<String, ContentHash>,
}

impl LoadedFixture {
    pub fn backends(&self) -> Backends {
        Backends::new(
            self.store.clone(),
            self.directory.clone(),
            self.pointers.clone(),
        )
    }
}

impl Fixture {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read fixture {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("invalid fixture {}", path.display()))
    }

    pub fn load(&self) -> Result<LoadedFixture> {
        let mut loaded = LoadedFixture {
            store: Arc::new(MemoryBlockStore::new()),
            pointers: Arc::new(MemoryPointers::new()),
            directory: Arc::new(MemoryDirectory::new()),
            hashes: HashMap::new(),
        };

        for name in self.blocks.keys() {
            let mut path = Vec::new();
            self.put(name, &loaded.store, &mut loaded.hashes, &mut path)?;
        }

        for (writer, block) in &self.pointers {
            let root = loaded
                .hashes
                .get(block)
                .ok_or_else(|| anyhow!("pointer of {writer} names unknown block '{block}'"))?;
            loaded
                .pointers
                .set_root(&WriterIdentity::new(writer.as_str()), (*root).into());
        }

        for (username, identity) in &self.users {
            loaded
                .directory
                .register(username.as_str(), WriterIdentity::new(identity.as_str()));
        }

        Ok(loaded)
    }

    /// Store `name` after its links, memoising hashes. `path` catches link cycles.
    fn put(
        &self,
        name: &str,
        store: &MemoryBlockStore,
        hashes: &mut HashMap<String, ContentHash>,
        path: &mut Vec<String>,
    ) -> Result<ContentHash> {
        if let Some(hash) = hashes.get(name) {
            return Ok(*hash);
        }
        if path.iter().any(|p| p == name) {
            return Err(anyhow!("link cycle through block '{name}'"));
        }
        let block = self
            .blocks
            .get(name)
            .ok_or_else(|| anyhow!("unknown block '{name}'"))?;

        path.push(name.to_string());
        let mut links = Vec::with_capacity(block.links.len());
        for link in &block.links {
            links.push(self.put(link, store, hashes, path)?);
        }
        path.pop();

        let payload = match &block.owned_keys {
            Some(keys) => WriterData::new(keys.iter().map(|k| WriterIdentity::new(k.as_str())))
                .with_label(name)
                .encode()?,
            None => {
                let mut payload = name.as_bytes().to_vec();
                payload.resize(block.data.max(payload.len()), 0);
                payload
            }
        };
        let hash = store.put_block(payload, links);
        hashes.insert(name.to_string(), hash);
        Ok(hash)
    }
}

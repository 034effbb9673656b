//! # Contract Store
//!
//! Persists the public part of a contract (conditions, party keys and oracle
//! material) keyed by the funding transaction id.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use bitcoin::Txid;
use log::debug;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::{conditions::Conditions, error::Result, oracle::OracleAnnouncement, party::PartyPair, DlcError};

/// Contracts are identified by their funding transaction.
pub type ContractId = Txid;

/// What is stored for a contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ContractRecord {
    pub conditions: Conditions,
    pub pubkeys: PartyPair<PublicKey>,
    pub oracle: OracleAnnouncement,
}

/// Persistence operations.
pub trait ContractStore {
    /// Stores `record`, replacing any earlier record under `id`.
    fn put(&mut self, id: ContractId, record: &ContractRecord) -> Result<()>;

    fn get(&self, id: &ContractId) -> Result<Option<ContractRecord>>;

    /// All stored ids, sorted.
    fn list(&self) -> Result<Vec<ContractId>>;
}

#[derive(Default)]
pub struct MemoryStore {
    records: BTreeMap<ContractId, ContractRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ContractStore for MemoryStore {
    fn put(&mut self, id: ContractId, record: &ContractRecord) -> Result<()> {
        self.records.insert(id, record.clone());
        Ok(())
    }

    fn get(&self, id: &ContractId) -> Result<Option<ContractRecord>> {
        Ok(self.records.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<ContractId>> {
        Ok(self.records.keys().copied().collect())
    }
}

/// One pretty-printed JSON file per contract, named `<txid>.json`.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens `dir`, creating it if needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, id: &ContractId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl ContractStore for FileStore {
    fn put(&mut self, id: ContractId, record: &ContractRecord) -> Result<()> {
        let path = self.path(&id);
        fs::write(&path, serde_json::to_string_pretty(record)?)?;
        debug!("Stored contract {id} at {}", path.display());
        Ok(())
    }

    fn get(&self, id: &ContractId) -> Result<Option<ContractRecord>> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let record: ContractRecord = serde_json::from_str(&json)?;
        record.conditions.validate_terms()?;
        Ok(Some(record))
    }

    fn list(&self) -> Result<Vec<ContractId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| DlcError::Store(format!("bad file name {}", path.display())))?;
            match ContractId::from_str(stem) {
                Ok(id) => ids.push(id),
                Err(_) => debug!("Skipping {}", path.display()),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

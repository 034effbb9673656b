//! # Oracle
//!
//! The oracle announces a public key and one nonce point per message slot
//! ahead of the fixing time, then signs the outcome with those nonces.
//! [`LocalOracle`] derives everything from a seed so announcements can be
//! reproduced without storing keys.

use std::collections::HashMap;

use log::info;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{commitment, error::Result, DlcError};

/// Public material published before the fixing time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OracleAnnouncement {
    pub pubkey: PublicKey,
    pub nonces: Vec<PublicKey>,
}

/// Signed outcome, one signature per message slot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OracleAttestation {
    #[serde(with = "crate::conditions::hex_messages")]
    pub messages: Vec<Vec<u8>>,
    pub signatures: Vec<SecretKey>,
}

/// Oracle operations the protocol depends on.
pub trait Oracle {
    fn public_material(&self, fixing_time: u64) -> Result<OracleAnnouncement>;

    /// Fails until the oracle has attested to an outcome for `fixing_time`.
    fn signed_messages(&self, fixing_time: u64) -> Result<OracleAttestation>;
}

/// Seed-deterministic oracle.
pub struct LocalOracle {
    seed: [u8; 32],
    slots: usize,
    attested: HashMap<u64, Vec<Vec<u8>>>,
}

impl LocalOracle {
    /// Oracle announcing `slots` nonces per fixing time.
    pub fn new(seed: [u8; 32], slots: usize) -> Self {
        Self {
            seed,
            slots,
            attested: HashMap::new(),
        }
    }

    fn derive_key(&self, tag: &[u8], fixing_time: u64, slot: u32) -> Result<SecretKey> {
        let mut hasher = Sha256::new();
        hasher.update(tag);
        hasher.update(self.seed);
        hasher.update(fixing_time.to_be_bytes());
        hasher.update(slot.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        SecretKey::from_slice(&digest).map_err(|e| DlcError::Oracle(format!("key derivation: {e}")))
    }

    fn oracle_key(&self) -> Result<SecretKey> {
        self.derive_key(b"oracle", 0, 0)
    }

    fn nonce_keys(&self, fixing_time: u64) -> Result<Vec<SecretKey>> {
        (0..self.slots as u32)
            .map(|slot| self.derive_key(b"nonce", fixing_time, slot))
            .collect()
    }

    /// Commits the oracle to `messages` as the outcome at `fixing_time`.
    ///
    /// Repeating the same outcome is accepted. Signing a different outcome
    /// with the same nonces would leak the oracle key, so it is refused.
    pub fn attest(&mut self, fixing_time: u64, messages: Vec<Vec<u8>>) -> Result<()> {
        if messages.is_empty() || messages.len() > self.slots {
            return Err(DlcError::Oracle(format!(
                "{} messages for {} nonce slots",
                messages.len(),
                self.slots
            )));
        }
        match self.attested.get(&fixing_time) {
            Some(existing) if *existing == messages => Ok(()),
            Some(_) => Err(DlcError::Oracle(format!(
                "already attested to another outcome at {fixing_time}"
            ))),
            None => {
                info!("Oracle attests {} messages at {fixing_time}", messages.len());
                self.attested.insert(fixing_time, messages);
                Ok(())
            }
        }
    }
}

impl Oracle for LocalOracle {
    fn public_material(&self, fixing_time: u64) -> Result<OracleAnnouncement> {
        let secp = Secp256k1::signing_only();
        Ok(OracleAnnouncement {
            pubkey: PublicKey::from_secret_key(&secp, &self.oracle_key()?),
            nonces: self
                .nonce_keys(fixing_time)?
                .iter()
                .map(|k| PublicKey::from_secret_key(&secp, k))
                .collect(),
        })
    }

    fn signed_messages(&self, fixing_time: u64) -> Result<OracleAttestation> {
        let messages = self
            .attested
            .get(&fixing_time)
            .ok_or_else(|| DlcError::Oracle(format!("no attestation for {fixing_time}")))?;
        let oracle_key = self.oracle_key()?;
        let signatures = self
            .nonce_keys(fixing_time)?
            .iter()
            .zip(messages)
            .map(|(nonce_key, message)| commitment::sign(&oracle_key, nonce_key, message))
            .collect::<Result<Vec<_>>>()?;

        Ok(OracleAttestation {
            messages: messages.clone(),
            signatures,
        })
    }
}

//! # Wallet
//!
//! The wallet collaborator issues keys and addresses, selects and signs
//! funding inputs and broadcasts transactions. The protocol only reaches the
//! wallet through [`Wallet`]; [`MemoryWallet`] is a BIP32 reference
//! implementation that keeps its coins in memory.

use std::collections::{HashMap, HashSet};

use bitcoin::{
    bip32::{ChildNumber, Xpriv},
    hashes::{sha256d, Hash},
    Address, CompressedPublicKey, Network, OutPoint, Script, ScriptBuf, Transaction, Txid,
    Witness,
};
use log::{debug, info};
use secp256k1::{ecdsa::Signature, All, PublicKey, Scalar, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    fee::change_after_fee,
    script::{p2wpkh_script, sign_p2wpkh_input, sign_segwit_input},
    DlcError,
};

/// An unspent output a party can contribute to the funding transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Utxo {
    pub outpoint: OutPoint,
    /// Value in satoshis
    pub amount: u64,
    pub script_pubkey: ScriptBuf,
}

/// Wallet operations the protocol depends on.
pub trait Wallet {
    /// Fresh public key for contract scripts.
    fn new_pubkey(&mut self) -> Result<PublicKey>;

    /// Fresh receiving address for payouts and change.
    fn new_address(&mut self) -> Result<Address>;

    /// Reserves outputs worth at least `amount` plus their own input fees.
    ///
    /// Returns the outputs and the change left after paying for a change
    /// output (zero when there is none).
    fn select_utxos(
        &mut self,
        amount: u64,
        fee_per_input: u64,
        fee_per_output: u64,
    ) -> Result<(Vec<Utxo>, u64)>;

    /// `SIGHASH_ALL` signature over a P2WSH input with the key of `pubkey`.
    fn sign_witness(
        &self,
        tx: &Transaction,
        input_index: usize,
        amount: u64,
        script: &Script,
        pubkey: &PublicKey,
    ) -> Result<Signature>;

    /// Like [`Wallet::sign_witness`], signing with the key of `pubkey`
    /// shifted by `offset`, i.e. the key of `pubkey + offset·G`.
    fn sign_witness_with_offset(
        &self,
        tx: &Transaction,
        input_index: usize,
        amount: u64,
        script: &Script,
        pubkey: &PublicKey,
        offset: &SecretKey,
    ) -> Result<Signature>;

    /// P2WPKH witnesses for the given inputs, all owned by this wallet.
    fn sign_owned_inputs(&self, tx: &Transaction, indices: &[usize]) -> Result<Vec<Witness>>;

    fn broadcast(&mut self, tx: &Transaction) -> Result<Txid>;
}

/// In-memory BIP32 wallet.
///
/// Keys are derived at `m/i` from a seed. Coins are added with
/// [`MemoryWallet::fund`]; broadcast transactions spend the coins they use
/// and credit outputs paying back to the wallet.
pub struct MemoryWallet {
    secp: Secp256k1<All>,
    network: Network,
    master: Xpriv,
    next_index: u32,
    keys: HashMap<PublicKey, SecretKey>,
    scripts: HashMap<ScriptBuf, SecretKey>,
    utxos: Vec<Utxo>,
    reserved: HashSet<OutPoint>,
    broadcasts: Vec<Transaction>,
}

impl MemoryWallet {
    pub fn new(seed: &[u8], network: Network) -> Result<Self> {
        let master = Xpriv::new_master(network, seed)
            .map_err(|e| DlcError::Wallet(format!("master key: {e}")))?;
        Ok(Self {
            secp: Secp256k1::new(),
            network,
            master,
            next_index: 0,
            keys: HashMap::new(),
            scripts: HashMap::new(),
            utxos: Vec::new(),
            reserved: HashSet::new(),
            broadcasts: Vec::new(),
        })
    }

    fn next_key(&mut self) -> Result<(SecretKey, PublicKey)> {
        let child = ChildNumber::from_normal_idx(self.next_index)
            .map_err(|e| DlcError::Wallet(format!("key index {}: {e}", self.next_index)))?;
        let secret = self
            .master
            .derive_priv(&self.secp, &[child])
            .map_err(|e| DlcError::Wallet(format!("key derivation: {e}")))?
            .private_key;
        let pubkey = PublicKey::from_secret_key(&self.secp, &secret);

        self.next_index += 1;
        self.keys.insert(pubkey, secret);
        self.scripts.insert(p2wpkh_script(&pubkey), secret);
        Ok((secret, pubkey))
    }

    fn secret_for(&self, pubkey: &PublicKey) -> Result<&SecretKey> {
        self.keys
            .get(pubkey)
            .ok_or_else(|| DlcError::Wallet(format!("unknown public key {pubkey}")))
    }

    /// Credits a new coin of `amount` sats to a fresh key.
    ///
    /// The outpoint is synthetic; it only needs to be unique.
    pub fn fund(&mut self, amount: u64) -> Result<Utxo> {
        let (_, pubkey) = self.next_key()?;
        let mut preimage = pubkey.serialize().to_vec();
        preimage.extend_from_slice(&amount.to_le_bytes());
        let txid = Txid::from_raw_hash(sha256d::Hash::hash(&preimage));

        let utxo = Utxo {
            outpoint: OutPoint::new(txid, 0),
            amount,
            script_pubkey: p2wpkh_script(&pubkey),
        };
        debug!("Funded wallet with {amount} sats at {}", utxo.outpoint);
        self.utxos.push(utxo.clone());
        Ok(utxo)
    }

    /// Spendable balance, excluding reserved coins.
    pub fn balance(&self) -> u64 {
        self.available().map(|u| u.amount).sum()
    }

    fn available(&self) -> impl Iterator<Item = &Utxo> {
        self.utxos
            .iter()
            .filter(|u| !self.reserved.contains(&u.outpoint))
    }

    /// Every transaction passed to [`Wallet::broadcast`], in order.
    pub fn broadcasts(&self) -> &[Transaction] {
        &self.broadcasts
    }
}

impl Wallet for MemoryWallet {
    fn new_pubkey(&mut self) -> Result<PublicKey> {
        Ok(self.next_key()?.1)
    }

    fn new_address(&mut self) -> Result<Address> {
        let (_, pubkey) = self.next_key()?;
        Ok(Address::p2wpkh(&CompressedPublicKey(pubkey), self.network))
    }

    fn select_utxos(
        &mut self,
        amount: u64,
        fee_per_input: u64,
        fee_per_output: u64,
    ) -> Result<(Vec<Utxo>, u64)> {
        let mut candidates: Vec<Utxo> = self.available().cloned().collect();
        candidates.sort_by(|a, b| b.amount.cmp(&a.amount));

        let mut selected = Vec::new();
        let mut total = 0u64;
        let mut needed = amount;
        for utxo in candidates {
            if total >= needed && !selected.is_empty() {
                break;
            }
            total += utxo.amount;
            needed += fee_per_input;
            selected.push(utxo);
        }

        if total < needed || selected.is_empty() {
            return Err(DlcError::Wallet(format!(
                "cannot select {needed} sats, {} available",
                self.balance()
            )));
        }

        let change = change_after_fee(total - needed, fee_per_output);
        for utxo in &selected {
            self.reserved.insert(utxo.outpoint);
        }
        debug!(
            "Selected {} inputs worth {total} sats for {amount} sats, change {change}",
            selected.len()
        );
        Ok((selected, change))
    }

    fn sign_witness(
        &self,
        tx: &Transaction,
        input_index: usize,
        amount: u64,
        script: &Script,
        pubkey: &PublicKey,
    ) -> Result<Signature> {
        let secret = self.secret_for(pubkey)?;
        sign_segwit_input(tx, input_index, script, amount, secret)
    }

    fn sign_witness_with_offset(
        &self,
        tx: &Transaction,
        input_index: usize,
        amount: u64,
        script: &Script,
        pubkey: &PublicKey,
        offset: &SecretKey,
    ) -> Result<Signature> {
        let secret = self
            .secret_for(pubkey)?
            .add_tweak(&Scalar::from(*offset))
            .map_err(|_| DlcError::Degenerate("offset key is zero".to_string()))?;
        sign_segwit_input(tx, input_index, script, amount, &secret)
    }

    fn sign_owned_inputs(&self, tx: &Transaction, indices: &[usize]) -> Result<Vec<Witness>> {
        indices
            .iter()
            .map(|&index| {
                let input = tx.input.get(index).ok_or_else(|| {
                    DlcError::Wallet(format!("transaction has no input {index}"))
                })?;
                let utxo = self
                    .utxos
                    .iter()
                    .find(|u| u.outpoint == input.previous_output)
                    .ok_or_else(|| {
                        DlcError::Wallet(format!("input {index} spends an unknown output"))
                    })?;
                let secret = self.scripts.get(&utxo.script_pubkey).ok_or_else(|| {
                    DlcError::Wallet(format!("no key for the output spent by input {index}"))
                })?;
                sign_p2wpkh_input(tx, index, utxo.amount, secret)
            })
            .collect()
    }

    fn broadcast(&mut self, tx: &Transaction) -> Result<Txid> {
        let txid = tx.compute_txid();
        let spent: HashSet<OutPoint> = tx.input.iter().map(|i| i.previous_output).collect();
        self.utxos.retain(|u| !spent.contains(&u.outpoint));
        self.reserved.retain(|o| !spent.contains(o));

        for (vout, output) in tx.output.iter().enumerate() {
            if self.scripts.contains_key(&output.script_pubkey) {
                self.utxos.push(Utxo {
                    outpoint: OutPoint::new(txid, vout as u32),
                    amount: output.value.to_sat(),
                    script_pubkey: output.script_pubkey.clone(),
                });
            }
        }

        info!("Broadcast transaction {txid}");
        self.broadcasts.push(tx.clone());
        Ok(txid)
    }
}

//! # Contract State
//!
//! Everything one party knows about a contract: the agreed conditions, the
//! oracle's public material and the data contributed by each party.
//!
//! Each party keeps its own [`Dlc`]. Counterparty slots are filled only by
//! the builder's `accept_*` operations, and a filled field is never changed.

use bitcoin::{ScriptBuf, Witness};
use secp256k1::{ecdsa::Signature, PublicKey, SecretKey};
use serde::{Deserialize, Serialize};

use crate::{
    conditions::{Conditions, Deal},
    error::Result,
    fee::redeem_tx_fee,
    party::{Party, PartyPair},
    script::funding_script,
    wallet::Utxo,
    DlcError,
};

/// Fields contributed by one party.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PartyData {
    /// Key used in the funding and execution scripts
    pub pubkey: Option<PublicKey>,

    /// Where refunds and settlements are paid
    pub payout_script: Option<ScriptBuf>,

    /// Where funding change is paid, if the party has change
    pub change_script: Option<ScriptBuf>,

    /// Inputs this party contributes to the funding transaction
    pub utxos: Vec<Utxo>,

    /// Witnesses for `utxos`, in the same order
    pub fund_witnesses: Vec<Witness>,

    /// This party's signature on the refund transaction
    pub refund_sig: Option<Signature>,

    /// Counterparty signatures on this party's execution transactions,
    /// indexed by deal. `None` where this party receives nothing.
    pub cet_sigs: Vec<Option<Signature>>,
}

/// Deal selected by an oracle attestation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FixedDeal {
    pub index: usize,
    pub messages: Vec<Vec<u8>>,
    /// Aggregate oracle signature, the discrete log of the deal's commitment
    pub signature: SecretKey,
}

/// Oracle public material and the commitments derived from it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct OracleRequirements {
    pub pubkey: Option<PublicKey>,
    pub nonces: Vec<PublicKey>,
    /// One commitment point per deal, in deal order
    pub commitments: Vec<PublicKey>,
    pub fixed: Option<FixedDeal>,
}

/// Contract state held by one party.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Dlc {
    pub conditions: Conditions,
    pub oracle: OracleRequirements,
    pub parties: PartyPair<PartyData>,
}

impl Dlc {
    pub fn new(conditions: Conditions) -> Self {
        let deals = conditions.deals.len();
        let empty = || PartyData {
            cet_sigs: vec![None; deals],
            ..PartyData::default()
        };
        Self {
            conditions,
            oracle: OracleRequirements::default(),
            parties: PartyPair::new(empty(), empty()),
        }
    }

    pub fn pubkey(&self, party: Party) -> Result<PublicKey> {
        self.parties[party]
            .pubkey
            .ok_or(DlcError::MissingPublicKey(party))
    }

    /// Both public keys, or the first one missing.
    pub fn pubkeys(&self) -> Result<PartyPair<PublicKey>> {
        Ok(PartyPair::new(
            self.pubkey(Party::First)?,
            self.pubkey(Party::Second)?,
        ))
    }

    pub fn payout_script(&self, party: Party) -> Result<&ScriptBuf> {
        self.parties[party]
            .payout_script
            .as_ref()
            .ok_or(DlcError::MissingPayoutAddress(party))
    }

    pub fn deal(&self, index: usize) -> Result<&Deal> {
        self.conditions
            .deals
            .get(index)
            .ok_or(DlcError::UnknownDeal(index))
    }

    /// Commitment point of a deal, available once the oracle is committed.
    pub fn commitment(&self, index: usize) -> Result<PublicKey> {
        self.deal(index)?;
        self.oracle
            .commitments
            .get(index)
            .copied()
            .ok_or(DlcError::MissingCommitment(index))
    }

    pub fn fixed_deal(&self) -> Result<&FixedDeal> {
        self.oracle.fixed.as_ref().ok_or(DlcError::NotFixed)
    }

    /// 2-of-2 witness script of the funding output.
    pub fn fund_script(&self) -> Result<ScriptBuf> {
        Ok(funding_script(&self.pubkeys()?))
    }

    /// Value of the funding output: both deposits plus the pre-funded fee of
    /// the transaction spending it.
    pub fn fund_amount(&self) -> u64 {
        self.conditions.total_deposit() + redeem_tx_fee(&self.conditions)
    }

    /// Input indices of `party` in the funding transaction.
    pub fn fund_input_indices(&self, party: Party) -> std::ops::Range<usize> {
        let first = self.parties.first.utxos.len();
        match party {
            Party::First => 0..first,
            Party::Second => first..first + self.parties.second.utxos.len(),
        }
    }

    /// Whether `party` has an execution transaction for `deal`.
    pub fn has_cet(&self, index: usize, party: Party) -> bool {
        self.conditions
            .deals
            .get(index)
            .is_some_and(|deal| deal.amount(party) > 0)
    }
}

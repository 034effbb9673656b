//! # Contract Builder
//!
//! Drives one party through the contract handshake:
//!
//! 1. [`Builder::prepare_pubkey`] and [`Builder::prepare_funding`] fill the
//!    party's own slot from its wallet.
//! 2. [`Builder::public_offer`] / [`Builder::accept_public_offer`] exchange
//!    keys, payout scripts and funding inputs.
//! 3. [`Builder::commit_oracle`] computes the commitment of every deal.
//! 4. [`Builder::sign_contract`] / [`Builder::accept_signatures`] exchange
//!    CET and refund signatures. Incoming signatures are verified before any
//!    of them is stored.
//! 5. [`Builder::sign_funding`] / [`Builder::accept_funding`] exchange
//!    funding witnesses; the funding transaction can then be broadcast.
//! 6. [`Builder::fix_deal`] and [`Builder::settle`] close the contract on an
//!    oracle attestation, or [`Builder::refund`] returns the deposits.
//!
//! Offers are owned snapshots. An operation that fails leaves the builder
//! exactly as it was.

use std::fmt;

use bitcoin::{ScriptBuf, Transaction, Txid, Witness};
use log::{debug, info, warn};
use secp256k1::{ecdsa::Signature, PublicKey};
use serde::{Deserialize, Serialize};

use crate::{
    closing,
    commitment::{commit_multi, sum_sigs, verify},
    conditions::Conditions,
    contract::{Dlc, FixedDeal},
    error::Result,
    execution::{self, cet, cet_outpoint, cet_script, verify_cet_signature},
    fee::{fund_fee_per_input, fund_fee_per_output, required_amount},
    funding::{funding_outpoint, signed_funding_tx},
    oracle::{OracleAnnouncement, OracleAttestation},
    party::Party,
    refund::{refund_tx, signed_refund_tx, verify_refund_signature},
    script::{execution_witness, fallback_witness, verify_p2wpkh_witness, verify_segwit_signature},
    store::{ContractId, ContractRecord, ContractStore},
    wallet::{Utxo, Wallet},
    DlcError,
};

/// Protocol progress of one party, in the order stages are reached.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Negotiated,
    KeyPrepared,
    FundingPrepared,
    RequirementsExchanged,
    OracleCommitted,
    CetsAndRefundSigned,
    FundingSigned,
    Settled,
    Refunded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Negotiated => "negotiated",
            Stage::KeyPrepared => "key prepared",
            Stage::FundingPrepared => "funding prepared",
            Stage::RequirementsExchanged => "requirements exchanged",
            Stage::OracleCommitted => "oracle committed",
            Stage::CetsAndRefundSigned => "CETs and refund signed",
            Stage::FundingSigned => "funding signed",
            Stage::Settled => "settled",
            Stage::Refunded => "refunded",
        };
        f.write_str(name)
    }
}

/// Keys, scripts and inputs a party contributes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PublicOffer {
    pub party: Party,
    pub pubkey: PublicKey,
    pub payout_script: ScriptBuf,
    pub change_script: Option<ScriptBuf>,
    pub utxos: Vec<Utxo>,
}

/// Signatures a party gives its counterparty.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SignatureOffer {
    pub party: Party,
    /// Signatures on the counterparty's CETs, indexed by deal. `None` where
    /// the counterparty has no CET.
    pub cet_sigs: Vec<Option<Signature>>,
    pub refund_sig: Signature,
}

/// Witnesses for the funding inputs a party contributed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FundingOffer {
    pub party: Party,
    pub witnesses: Vec<Witness>,
}

/// Protocol driver for one party.
pub struct Builder<W: Wallet> {
    party: Party,
    wallet: W,
    dlc: Dlc,
    stage: Stage,
}

fn check_unchanged<T: PartialEq>(current: Option<&T>, offered: &T, what: &str) -> Result<()> {
    match current {
        Some(existing) if existing != offered => Err(DlcError::Conflict(format!(
            "{what} differs from the one already accepted"
        ))),
        _ => Ok(()),
    }
}

impl<W: Wallet> Builder<W> {
    pub fn new(party: Party, conditions: Conditions, wallet: W) -> Result<Self> {
        conditions.validate_terms()?;
        debug!("New {party} party builder with {} deals", conditions.deals.len());
        Ok(Self {
            party,
            wallet,
            dlc: Dlc::new(conditions),
            stage: Stage::Negotiated,
        })
    }

    pub fn party(&self) -> Party {
        self.party
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn dlc(&self) -> &Dlc {
        &self.dlc
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn wallet_mut(&mut self) -> &mut W {
        &mut self.wallet
    }

    fn counterparty(&self) -> Party {
        self.party.counterparty()
    }

    fn require(&self, expected: Stage) -> Result<()> {
        if self.stage < expected {
            return Err(DlcError::OutOfOrder {
                expected,
                actual: self.stage,
            });
        }
        Ok(())
    }

    fn require_open(&self) -> Result<()> {
        self.require(Stage::FundingSigned)?;
        if matches!(self.stage, Stage::Settled | Stage::Refunded) {
            return Err(DlcError::OutOfOrder {
                expected: Stage::FundingSigned,
                actual: self.stage,
            });
        }
        Ok(())
    }

    fn require_counterparty(&self, from: Party) -> Result<()> {
        if from != self.counterparty() {
            warn!("{} party rejected an offer from itself", self.party);
            return Err(DlcError::Conflict(format!(
                "offer comes from the {from} party, expected the {}",
                self.counterparty()
            )));
        }
        Ok(())
    }

    fn advance(&mut self, stage: Stage) {
        if stage > self.stage {
            info!("{} party: {} -> {stage}", self.party, self.stage);
            self.stage = stage;
        }
    }

    fn own_pubkey(&self) -> Result<PublicKey> {
        self.dlc.pubkey(self.party)
    }

    /// Whether both refund signatures and every counterparty CET signature
    /// this party needs are stored.
    fn contract_signed(&self) -> bool {
        let own = &self.dlc.parties[self.party];
        own.refund_sig.is_some()
            && self.dlc.parties[self.counterparty()].refund_sig.is_some()
            && (0..self.dlc.conditions.deals.len())
                .all(|i| !self.dlc.has_cet(i, self.party) || own.cet_sigs[i].is_some())
    }

    fn funding_signed(&self) -> bool {
        Party::ALL.iter().all(|&party| {
            self.dlc.parties[party].fund_witnesses.len()
                == self.dlc.fund_input_indices(party).len()
        })
    }

    /// Fresh contract key from the wallet. Returns the existing key if one
    /// was already prepared.
    pub fn prepare_pubkey(&mut self) -> Result<PublicKey> {
        if let Some(pubkey) = self.dlc.parties[self.party].pubkey {
            return Ok(pubkey);
        }
        let pubkey = self.wallet.new_pubkey()?;
        debug!("{} party contract key {pubkey}", self.party);
        self.dlc.parties[self.party].pubkey = Some(pubkey);
        self.advance(Stage::KeyPrepared);
        Ok(pubkey)
    }

    /// Selects funding inputs and requests payout and change addresses.
    pub fn prepare_funding(&mut self) -> Result<()> {
        self.prepare_funding_to(None)
    }

    /// Like [`Builder::prepare_funding`], paying the contract out to
    /// `payout` instead of a fresh wallet address when one is given.
    ///
    /// Addresses are requested before any coin is reserved, so a wallet
    /// failure leaves its coins selectable for a retry.
    pub fn prepare_funding_to(&mut self, payout: Option<ScriptBuf>) -> Result<()> {
        self.require(Stage::KeyPrepared)?;
        if !self.dlc.parties[self.party].utxos.is_empty() {
            return Ok(());
        }

        let payout_script = match payout {
            Some(script) => script,
            None => self.wallet.new_address()?.script_pubkey(),
        };
        let change_address = self.wallet.new_address()?.script_pubkey();

        let conditions = &self.dlc.conditions;
        let amount = required_amount(conditions, self.party);
        let (utxos, change) = self.wallet.select_utxos(
            amount,
            fund_fee_per_input(conditions),
            fund_fee_per_output(conditions),
        )?;
        debug!(
            "{} party selected {} inputs for {amount} sats, change {change}",
            self.party,
            utxos.len()
        );

        let own = &mut self.dlc.parties[self.party];
        own.utxos = utxos;
        own.payout_script = Some(payout_script);
        own.change_script = (change > 0).then_some(change_address);
        self.advance(Stage::FundingPrepared);
        Ok(())
    }

    /// This party's keys, scripts and inputs.
    pub fn public_offer(&self) -> Result<PublicOffer> {
        self.require(Stage::FundingPrepared)?;
        let own = &self.dlc.parties[self.party];
        Ok(PublicOffer {
            party: self.party,
            pubkey: self.own_pubkey()?,
            payout_script: self.dlc.payout_script(self.party)?.clone(),
            change_script: own.change_script.clone(),
            utxos: own.utxos.clone(),
        })
    }

    /// Merges the counterparty's public offer.
    ///
    /// Offered inputs are not checked here; insufficient inputs surface when
    /// the funding transaction is built.
    pub fn accept_public_offer(&mut self, offer: PublicOffer) -> Result<()> {
        self.require(Stage::FundingPrepared)?;
        self.require_counterparty(offer.party)?;

        let theirs = &self.dlc.parties[offer.party];
        check_unchanged(theirs.pubkey.as_ref(), &offer.pubkey, "public key")?;
        check_unchanged(theirs.payout_script.as_ref(), &offer.payout_script, "payout script")?;
        if theirs.pubkey.is_some() {
            check_unchanged(Some(&theirs.change_script), &offer.change_script, "change script")?;
            check_unchanged(Some(&theirs.utxos), &offer.utxos, "funding inputs")?;
        }

        debug!(
            "{} party accepted {} inputs from the {} party",
            self.party,
            offer.utxos.len(),
            offer.party
        );
        let theirs = &mut self.dlc.parties[offer.party];
        theirs.pubkey = Some(offer.pubkey);
        theirs.payout_script = Some(offer.payout_script);
        theirs.change_script = offer.change_script;
        theirs.utxos = offer.utxos;
        self.advance(Stage::RequirementsExchanged);
        Ok(())
    }

    /// Stores the oracle's public material and recomputes the commitment of
    /// every deal.
    pub fn commit_oracle(&mut self, announcement: &OracleAnnouncement) -> Result<()> {
        self.require(Stage::RequirementsExchanged)?;
        check_unchanged(self.dlc.oracle.pubkey.as_ref(), &announcement.pubkey, "oracle key")?;
        if self.dlc.oracle.pubkey.is_some() {
            check_unchanged(Some(&self.dlc.oracle.nonces), &announcement.nonces, "oracle nonces")?;
        }

        let commitments = self
            .dlc
            .conditions
            .deals
            .iter()
            .map(|deal| commit_multi(&announcement.pubkey, &announcement.nonces, &deal.messages))
            .collect::<Result<Vec<_>>>()?;
        debug!("{} party computed {} commitments", self.party, commitments.len());

        let oracle = &mut self.dlc.oracle;
        oracle.pubkey = Some(announcement.pubkey);
        oracle.nonces = announcement.nonces.clone();
        oracle.commitments = commitments;
        self.advance(Stage::OracleCommitted);
        Ok(())
    }

    /// Signs every counterparty CET and the refund transaction.
    pub fn sign_contract(&mut self) -> Result<SignatureOffer> {
        self.require(Stage::OracleCommitted)?;
        let pubkey = self.own_pubkey()?;
        let fund_script = self.dlc.fund_script()?;
        let fund_amount = self.dlc.fund_amount();
        let counterparty = self.counterparty();

        let mut cet_sigs = Vec::with_capacity(self.dlc.conditions.deals.len());
        for index in 0..self.dlc.conditions.deals.len() {
            if !self.dlc.has_cet(index, counterparty) {
                cet_sigs.push(None);
                continue;
            }
            let tx = cet(&self.dlc, index, counterparty)?;
            let sig = self
                .wallet
                .sign_witness(&tx, 0, fund_amount, &fund_script, &pubkey)?;
            cet_sigs.push(Some(sig));
        }

        let refund = refund_tx(&self.dlc)?;
        let refund_sig = self
            .wallet
            .sign_witness(&refund, 0, fund_amount, &fund_script, &pubkey)?;
        debug!(
            "{} party signed {} CETs and the refund",
            self.party,
            cet_sigs.iter().flatten().count()
        );

        self.dlc.parties[self.party].refund_sig = Some(refund_sig);
        if self.contract_signed() {
            self.advance(Stage::CetsAndRefundSigned);
        }
        Ok(SignatureOffer {
            party: self.party,
            cet_sigs,
            refund_sig,
        })
    }

    /// Verifies and stores the counterparty's CET and refund signatures.
    pub fn accept_signatures(&mut self, offer: SignatureOffer) -> Result<()> {
        self.require(Stage::OracleCommitted)?;
        self.require_counterparty(offer.party)?;
        if let Err(e) = self.verify_signatures(&offer) {
            warn!("{} party rejected signatures: {e}", self.party);
            return Err(e);
        }

        debug!("{} party stored signatures from the {} party", self.party, offer.party);
        self.dlc.parties[self.party].cet_sigs = offer.cet_sigs;
        self.dlc.parties[offer.party].refund_sig = Some(offer.refund_sig);
        if self.contract_signed() {
            self.advance(Stage::CetsAndRefundSigned);
        }
        Ok(())
    }

    fn verify_signatures(&self, offer: &SignatureOffer) -> Result<()> {
        let deals = self.dlc.conditions.deals.len();
        if offer.cet_sigs.len() != deals {
            return Err(DlcError::InvalidSignature(format!(
                "{} CET signatures for {deals} deals",
                offer.cet_sigs.len()
            )));
        }

        for (index, sig) in offer.cet_sigs.iter().enumerate() {
            match (self.dlc.has_cet(index, self.party), sig) {
                (true, Some(sig)) => {
                    verify_cet_signature(&self.dlc, index, self.party, offer.party, sig)?
                }
                (true, None) => {
                    return Err(DlcError::MissingSignature(format!("CET signature for deal {index}")))
                }
                (false, Some(_)) => {
                    return Err(DlcError::InvalidSignature(format!(
                        "signature for deal {index}, which has no CET"
                    )))
                }
                (false, None) => {}
            }
        }
        verify_refund_signature(&self.dlc, offer.party, &offer.refund_sig)?;

        let own = &self.dlc.parties[self.party];
        if own.cet_sigs.iter().any(Option::is_some) {
            check_unchanged(Some(&own.cet_sigs), &offer.cet_sigs, "CET signatures")?;
        }
        check_unchanged(
            self.dlc.parties[offer.party].refund_sig.as_ref(),
            &offer.refund_sig,
            "refund signature",
        )
    }

    /// Signs this party's funding inputs.
    ///
    /// Only allowed once both refund signatures and all counterparty CET
    /// signatures are verified and stored.
    pub fn sign_funding(&mut self) -> Result<FundingOffer> {
        if !self.contract_signed() {
            return Err(DlcError::OutOfOrder {
                expected: Stage::CetsAndRefundSigned,
                actual: self.stage,
            });
        }
        let tx = crate::funding::funding_tx(&self.dlc)?;
        let indices: Vec<usize> = self.dlc.fund_input_indices(self.party).collect();
        let witnesses = self.wallet.sign_owned_inputs(&tx, &indices)?;
        debug!("{} party signed {} funding inputs", self.party, witnesses.len());

        self.dlc.parties[self.party].fund_witnesses = witnesses.clone();
        if self.funding_signed() {
            self.advance(Stage::FundingSigned);
        }
        Ok(FundingOffer {
            party: self.party,
            witnesses,
        })
    }

    /// Verifies and stores the counterparty's funding witnesses.
    pub fn accept_funding(&mut self, offer: FundingOffer) -> Result<()> {
        self.require(Stage::CetsAndRefundSigned)?;
        self.require_counterparty(offer.party)?;
        if let Err(e) = self.verify_funding(&offer) {
            warn!("{} party rejected funding witnesses: {e}", self.party);
            return Err(e);
        }

        self.dlc.parties[offer.party].fund_witnesses = offer.witnesses;
        if self.funding_signed() {
            self.advance(Stage::FundingSigned);
        }
        Ok(())
    }

    fn verify_funding(&self, offer: &FundingOffer) -> Result<()> {
        let tx = crate::funding::funding_tx(&self.dlc)?;
        let theirs = &self.dlc.parties[offer.party];
        let indices = self.dlc.fund_input_indices(offer.party);
        if offer.witnesses.len() != indices.len() {
            return Err(DlcError::InvalidSignature(format!(
                "{} funding witnesses for {} inputs",
                offer.witnesses.len(),
                indices.len()
            )));
        }
        for ((index, witness), utxo) in indices.zip(&offer.witnesses).zip(&theirs.utxos) {
            verify_p2wpkh_witness(&tx, index, witness, &utxo.script_pubkey, utxo.amount)?;
        }
        if !theirs.fund_witnesses.is_empty() {
            check_unchanged(Some(&theirs.fund_witnesses), &offer.witnesses, "funding witnesses")?;
        }
        Ok(())
    }

    /// Fully signed funding transaction.
    pub fn funding_tx(&self) -> Result<Transaction> {
        signed_funding_tx(&self.dlc)
    }

    /// Broadcasts the funding transaction through this party's wallet.
    pub fn broadcast_funding(&mut self) -> Result<Txid> {
        self.require_open()?;
        let tx = self.funding_tx()?;
        self.wallet.broadcast(&tx)
    }

    /// Contract identifier: the funding transaction id.
    pub fn contract_id(&self) -> Result<ContractId> {
        Ok(funding_outpoint(&self.dlc)?.txid)
    }

    /// Public part of the contract, for persistence.
    pub fn record(&self) -> Result<ContractRecord> {
        let pubkey = self.dlc.oracle.pubkey.ok_or(DlcError::OutOfOrder {
            expected: Stage::OracleCommitted,
            actual: self.stage,
        })?;
        Ok(ContractRecord {
            conditions: self.dlc.conditions.clone(),
            pubkeys: self.dlc.pubkeys()?,
            oracle: OracleAnnouncement {
                pubkey,
                nonces: self.dlc.oracle.nonces.clone(),
            },
        })
    }

    /// Stores [`Builder::record`] under [`Builder::contract_id`].
    pub fn save(&self, store: &mut impl ContractStore) -> Result<ContractId> {
        let id = self.contract_id()?;
        store.put(id, &self.record()?)?;
        Ok(id)
    }

    /// Selects the deal the oracle attested to.
    ///
    /// The aggregate signature must open the deal's commitment. Fixing the
    /// same deal again is a no-op; a different deal is refused.
    pub fn fix_deal(&mut self, attestation: &OracleAttestation) -> Result<usize> {
        self.require(Stage::OracleCommitted)?;
        let index = self
            .dlc
            .conditions
            .find_deal(&attestation.messages)
            .ok_or(DlcError::DealNotFound)?;
        if attestation.signatures.len() != attestation.messages.len() {
            return Err(DlcError::OracleVerification(index));
        }

        let signature = sum_sigs(&attestation.signatures)?;
        if !verify(&self.dlc.commitment(index)?, &signature) {
            warn!("{} party: attestation does not open deal {index}", self.party);
            return Err(DlcError::OracleVerification(index));
        }

        if let Some(fixed) = &self.dlc.oracle.fixed {
            if fixed.index != index {
                return Err(DlcError::AlreadyFixed(fixed.index));
            }
            return Ok(index);
        }

        info!("{} party fixed deal {index}", self.party);
        self.dlc.oracle.fixed = Some(FixedDeal {
            index,
            messages: attestation.messages.clone(),
            signature,
        });
        Ok(index)
    }

    /// This party's CET for the fixed deal, signed by both parties.
    pub fn signed_cet(&self) -> Result<Transaction> {
        let fixed = self.dlc.fixed_deal()?;
        let tx = cet(&self.dlc, fixed.index, self.party)?;
        let sig = self.wallet.sign_witness(
            &tx,
            0,
            self.dlc.fund_amount(),
            &self.dlc.fund_script()?,
            &self.own_pubkey()?,
        )?;
        execution::signed_cet(&self.dlc, fixed.index, self.party, sig)
    }

    /// Closing transaction for the fixed deal, signed with the contract key
    /// shifted by the oracle signature.
    pub fn closing_tx(&self) -> Result<Transaction> {
        let fixed = self.dlc.fixed_deal()?;
        let pubkey = self.own_pubkey()?;
        let script = cet_script(&self.dlc, fixed.index, self.party)?;
        let (_, value) = cet_outpoint(&self.dlc, fixed.index, self.party)?;
        let mut tx = closing::closing_tx(&self.dlc, fixed.index, self.party)?;

        let sig = self.wallet.sign_witness_with_offset(
            &tx,
            0,
            value,
            &script,
            &pubkey,
            &fixed.signature,
        )?;
        let unlock_key = pubkey.combine(&self.dlc.commitment(fixed.index)?)?;
        verify_segwit_signature(&tx, 0, &script, value, &sig, &unlock_key)?;

        tx.input[0].witness = execution_witness(&sig, &script);
        Ok(tx)
    }

    /// Broadcasts the CET and closing transaction of the fixed deal.
    pub fn settle(&mut self) -> Result<(Txid, Txid)> {
        self.require_open()?;
        let cet_tx = self.signed_cet()?;
        let closing = self.closing_tx()?;

        let cet_txid = self.wallet.broadcast(&cet_tx)?;
        let closing_txid = self.wallet.broadcast(&closing)?;
        self.advance(Stage::Settled);
        Ok((cet_txid, closing_txid))
    }

    /// Refund transaction carrying both signatures.
    pub fn refund_tx(&self) -> Result<Transaction> {
        signed_refund_tx(&self.dlc)
    }

    /// Broadcasts the refund transaction.
    pub fn refund(&mut self) -> Result<Txid> {
        self.require_open()?;
        let tx = self.refund_tx()?;
        let txid = self.wallet.broadcast(&tx)?;
        self.advance(Stage::Refunded);
        Ok(txid)
    }

    /// Claims the counterparty's unspent CET output for `deal` after the
    /// relative delay.
    pub fn fallback_tx(&self, deal: usize) -> Result<Transaction> {
        let executing = self.counterparty();
        let script = cet_script(&self.dlc, deal, executing)?;
        let (_, value) = cet_outpoint(&self.dlc, deal, executing)?;
        let mut tx = closing::fallback_tx(&self.dlc, deal, executing)?;

        let sig = self
            .wallet
            .sign_witness(&tx, 0, value, &script, &self.own_pubkey()?)?;
        tx.input[0].witness = fallback_witness(&sig, &script);
        Ok(tx)
    }
}

//! Funding transaction.
//!
//! Both parties lock their deposits into a single 2-of-2 output. The output
//! also carries the fee of the transaction that will later spend it, so the
//! execution and refund transactions never have to add inputs.
//!
//! Inputs are ordered first party then second party, each party's inputs in
//! the order it selected them. Each party may receive one change output.

use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Witness,
};

use crate::{
    contract::Dlc,
    error::Result,
    fee::{change_after_fee, fund_fee_per_input, fund_fee_per_output, party_fee, split_shared, FUND_TX_BASE_SIZE},
    party::Party,
    script::p2wsh_script,
    DlcError,
};

/// How one party's inputs are spent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FundingShare {
    /// Sum of the party's inputs
    pub inputs: u64,
    /// Value of the party's change output, zero when there is none
    pub change: u64,
    /// Part of the funding transaction fee paid by the party, including any
    /// dust remainder
    pub fee: u64,
}

/// Splits a party's inputs into deposit, change and fee.
///
/// # Errors
/// `MissingUtxos` if the party has not selected inputs, `InvalidUtxos` if
/// they sum beyond the money supply, `InsufficientFunds` if the inputs do not
/// cover the deposit, the shared fees and the fees of the inputs themselves.
pub fn funding_share(dlc: &Dlc, party: Party) -> Result<FundingShare> {
    let conditions = &dlc.conditions;
    let utxos = &dlc.parties[party].utxos;
    if utxos.is_empty() {
        return Err(DlcError::MissingUtxos(party));
    }

    let inputs = utxos
        .iter()
        .try_fold(0u64, |total, utxo| total.checked_add(utxo.amount))
        .filter(|&total| total <= Amount::MAX_MONEY.to_sat())
        .ok_or(DlcError::InvalidUtxos(party))?;
    let required = conditions.deposits[party] + party_fee(conditions, party, utxos.len());
    let remainder = inputs
        .checked_sub(required)
        .ok_or(DlcError::InsufficientFunds {
            party,
            required,
            available: inputs,
        })?;

    let change = change_after_fee(remainder, fund_fee_per_output(conditions));
    let fee = split_shared(conditions.fund_feerate * FUND_TX_BASE_SIZE, party)
        + utxos.len() as u64 * fund_fee_per_input(conditions)
        + (remainder - change);

    Ok(FundingShare { inputs, change, fee })
}

fn change_output(dlc: &Dlc, party: Party, change: u64) -> Result<Option<TxOut>> {
    if change == 0 {
        return Ok(None);
    }
    let script_pubkey: ScriptBuf = dlc.parties[party]
        .change_script
        .clone()
        .ok_or(DlcError::MissingPayoutAddress(party))?;
    Ok(Some(TxOut {
        value: Amount::from_sat(change),
        script_pubkey,
    }))
}

/// Builds the unsigned funding transaction.
///
/// Output 0 is the P2WSH 2-of-2 output worth [`Dlc::fund_amount`], followed
/// by the first and second party's change outputs when they exist.
///
/// # Arguments
/// * `dlc` - Contract state with both public keys and both parties' inputs
///
/// # Returns
/// A version 2 transaction with empty witnesses
pub fn funding_tx(dlc: &Dlc) -> Result<Transaction> {
    let fund_script = dlc.fund_script()?;
    let shares = [
        funding_share(dlc, Party::First)?,
        funding_share(dlc, Party::Second)?,
    ];

    let input = Party::ALL
        .iter()
        .flat_map(|&party| dlc.parties[party].utxos.iter())
        .map(|utxo| TxIn {
            previous_output: utxo.outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        })
        .collect();

    let mut output = vec![TxOut {
        value: Amount::from_sat(dlc.fund_amount()),
        script_pubkey: p2wsh_script(&fund_script),
    }];
    for (party, share) in Party::ALL.into_iter().zip(shares) {
        output.extend(change_output(dlc, party, share.change)?);
    }

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}

/// Output 0 of the funding transaction.
pub fn funding_outpoint(dlc: &Dlc) -> Result<OutPoint> {
    Ok(OutPoint::new(funding_tx(dlc)?.compute_txid(), 0))
}

/// Funding transaction with the stored witnesses of both parties attached.
pub fn signed_funding_tx(dlc: &Dlc) -> Result<Transaction> {
    let mut tx = funding_tx(dlc)?;
    for party in Party::ALL {
        let witnesses = &dlc.parties[party].fund_witnesses;
        let indices = dlc.fund_input_indices(party);
        if witnesses.len() != indices.len() {
            return Err(DlcError::MissingSignature(format!(
                "funding witnesses of the {party} party"
            )));
        }
        for (index, witness) in indices.zip(witnesses) {
            tx.input[index].witness = witness.clone();
        }
    }
    Ok(tx)
}

//! Contract execution transactions (CETs).
//!
//! There is one CET per deal and executing party. It spends the funding
//! output, pays the executing party's amount to an oracle-conditional
//! output and the counterparty's amount straight to its payout script.
//! Each party holds the counterparty's signature on its own CETs, so it can
//! complete one on its own once the oracle has signed.

use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Witness,
};
use secp256k1::ecdsa::Signature;

use crate::{
    contract::Dlc,
    error::Result,
    funding::funding_outpoint,
    party::{Party, PartyPair},
    script::{execution_script, funding_witness, p2wsh_script, verify_segwit_signature},
    DlcError,
};

/// Witness script of output 0 of `party`'s CET for `deal`.
pub fn cet_script(dlc: &Dlc, deal: usize, party: Party) -> Result<ScriptBuf> {
    let pubkeys = dlc.pubkeys()?;
    let commitment = dlc.commitment(deal)?;
    execution_script(
        &pubkeys[party],
        &commitment,
        &pubkeys[party.counterparty()],
    )
}

/// Unsigned CET for `deal` executed by `party`.
///
/// # Arguments
/// * `dlc` - Contract state with keys, funding inputs and oracle commitments
/// * `deal` - Index of the deal in the conditions
/// * `party` - The executing party, paid through the oracle-conditional output
///
/// # Errors
/// Each missing piece is reported separately: `MissingPublicKey`,
/// `UnknownDeal`, `MissingCommitment`, `MalformedDeal` when `party` receives
/// nothing, `MissingPayoutAddress` when the counterparty output is needed.
pub fn cet(dlc: &Dlc, deal: usize, party: Party) -> Result<Transaction> {
    let script = cet_script(dlc, deal, party)?;
    let amounts = &dlc.deal(deal)?.amounts;
    let counterparty = party.counterparty();

    if amounts[party] == 0 {
        return Err(DlcError::MalformedDeal(deal));
    }

    let mut output = vec![TxOut {
        value: Amount::from_sat(amounts[party]),
        script_pubkey: p2wsh_script(&script),
    }];
    if amounts[counterparty] > 0 {
        output.push(TxOut {
            value: Amount::from_sat(amounts[counterparty]),
            script_pubkey: dlc.payout_script(counterparty)?.clone(),
        });
    }

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: funding_outpoint(dlc)?,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output,
    })
}

/// Output 0 of a CET, spent by the closing and fallback transactions.
pub fn cet_outpoint(dlc: &Dlc, deal: usize, party: Party) -> Result<(OutPoint, u64)> {
    let tx = cet(dlc, deal, party)?;
    Ok((OutPoint::new(tx.compute_txid(), 0), tx.output[0].value.to_sat()))
}

/// Checks `signer`'s funding-script signature on `party`'s CET for `deal`.
pub fn verify_cet_signature(
    dlc: &Dlc,
    deal: usize,
    party: Party,
    signer: Party,
    signature: &Signature,
) -> Result<()> {
    let tx = cet(dlc, deal, party)?;
    verify_segwit_signature(
        &tx,
        0,
        &dlc.fund_script()?,
        dlc.fund_amount(),
        signature,
        &dlc.pubkey(signer)?,
    )
}

/// `party`'s CET for `deal` with both funding signatures attached.
///
/// `own_signature` is `party`'s signature; the counterparty's comes from the
/// contract state.
pub fn signed_cet(dlc: &Dlc, deal: usize, party: Party, own_signature: Signature) -> Result<Transaction> {
    let counterparty_signature = dlc.parties[party]
        .cet_sigs
        .get(deal)
        .copied()
        .flatten()
        .ok_or_else(|| {
            DlcError::MissingSignature(format!("{} party's signature on CET {deal}", party.counterparty()))
        })?;

    let mut signatures = PartyPair::new(own_signature, own_signature);
    signatures[party.counterparty()] = counterparty_signature;

    let mut tx = cet(dlc, deal, party)?;
    tx.input[0].witness = funding_witness(&signatures, &dlc.fund_script()?);
    Ok(tx)
}

//! Refund transaction, returning both deposits once the refund height is
//! reached and no deal was settled.

use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Witness,
};
use secp256k1::ecdsa::Signature;

use crate::{
    contract::Dlc,
    error::Result,
    funding::funding_outpoint,
    party::{Party, PartyPair},
    script::{funding_witness, verify_segwit_signature},
    DlcError,
};

/// Unsigned refund transaction.
///
/// The input enables the absolute locktime, which is set to the agreed
/// refund height. Outputs pay each non-zero deposit to its owner's payout
/// script, first party first.
pub fn refund_tx(dlc: &Dlc) -> Result<Transaction> {
    let lock_time = LockTime::from_height(dlc.conditions.refund_locktime)
        .map_err(|e| DlcError::InvalidConditions(format!("refund locktime: {e}")))?;

    let mut output = Vec::with_capacity(2);
    for party in Party::ALL {
        let deposit = dlc.conditions.deposits[party];
        if deposit == 0 {
            continue;
        }
        output.push(TxOut {
            value: Amount::from_sat(deposit),
            script_pubkey: dlc.payout_script(party)?.clone(),
        });
    }

    Ok(Transaction {
        version: Version::TWO,
        lock_time,
        input: vec![TxIn {
            previous_output: funding_outpoint(dlc)?,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
            witness: Witness::new(),
        }],
        output,
    })
}

/// Checks `signer`'s funding-script signature on the refund transaction.
pub fn verify_refund_signature(dlc: &Dlc, signer: Party, signature: &Signature) -> Result<()> {
    verify_segwit_signature(
        &refund_tx(dlc)?,
        0,
        &dlc.fund_script()?,
        dlc.fund_amount(),
        signature,
        &dlc.pubkey(signer)?,
    )
}

/// Refund transaction carrying both stored signatures.
pub fn signed_refund_tx(dlc: &Dlc) -> Result<Transaction> {
    let signature = |party: Party| {
        dlc.parties[party].refund_sig.ok_or_else(|| {
            DlcError::MissingSignature(format!("{party} party's refund signature"))
        })
    };
    let signatures = PartyPair::new(signature(Party::First)?, signature(Party::Second)?);

    let mut tx = refund_tx(dlc)?;
    tx.input[0].witness = funding_witness(&signatures, &dlc.fund_script()?);
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::sign_segwit_input;
    use crate::test_utils::{funded_dlc, secret_key, test_utxo, BTC};

    #[test]
    fn test_refund_outputs_and_locktime() {
        let dlc = funded_dlc();
        let tx = refund_tx(&dlc).unwrap();

        let values: Vec<u64> = tx.output.iter().map(|o| o.value.to_sat()).collect();
        assert_eq!(values, vec![BTC, BTC]);
        assert_eq!(tx.output[0].script_pubkey, *dlc.payout_script(Party::First).unwrap());
        assert_eq!(tx.output[1].script_pubkey, *dlc.payout_script(Party::Second).unwrap());
        assert_eq!(tx.lock_time, LockTime::from_height(900_000).unwrap());
        assert_eq!(tx.input[0].sequence.0, 0xffff_fffe);
    }

    #[test]
    fn test_zero_deposit_has_no_output() {
        let mut dlc = funded_dlc();
        dlc.conditions.deposits = PartyPair::new(0, 2 * BTC);
        dlc.parties.second.utxos = vec![test_utxo(32, 3 * BTC)];
        let tx = refund_tx(&dlc).unwrap();
        assert_eq!(tx.output.len(), 1);
        assert_eq!(tx.output[0].script_pubkey, *dlc.payout_script(Party::Second).unwrap());
    }

    #[test]
    fn test_refund_needs_both_signatures() {
        let mut dlc = funded_dlc();
        let tx = refund_tx(&dlc).unwrap();
        let script = dlc.fund_script().unwrap();
        let amount = dlc.fund_amount();
        let first = sign_segwit_input(&tx, 0, &script, amount, &secret_key(1)).unwrap();
        let second = sign_segwit_input(&tx, 0, &script, amount, &secret_key(2)).unwrap();

        assert!(verify_refund_signature(&dlc, Party::First, &first).is_ok());
        assert!(verify_refund_signature(&dlc, Party::Second, &first).is_err());

        dlc.parties.first.refund_sig = Some(first);
        assert!(matches!(signed_refund_tx(&dlc), Err(DlcError::MissingSignature(_))));

        dlc.parties.second.refund_sig = Some(second);
        let signed = signed_refund_tx(&dlc).unwrap();
        assert_eq!(signed.input[0].witness.len(), 4);
        assert_eq!(signed.compute_txid(), tx.compute_txid());
    }
}

//! Transactions spending output 0 of a CET.
//!
//! The executing party closes through the if-branch with a signature under
//! its key shifted by the oracle signature. If it never does, the
//! counterparty sweeps the output through the else-branch after the
//! relative delay (the fallback transaction).

use bitcoin::{
    absolute::LockTime, transaction::Version, Amount, ScriptBuf, Sequence, Transaction, TxIn,
    TxOut, Witness,
};

use crate::{
    contract::Dlc,
    error::Result,
    execution::cet_outpoint,
    fee::{closing_tx_fee, CET_RELATIVE_DELAY},
    party::Party,
    DlcError,
};

/// Value left after paying `fee` out of `value`.
pub fn closing_value(value: u64, fee: u64) -> Result<u64> {
    match value.checked_sub(fee) {
        Some(rest) if rest > 0 => Ok(rest),
        _ => Err(DlcError::InsufficientFee { value, fee }),
    }
}

fn spend_cet_output(
    dlc: &Dlc,
    deal: usize,
    executing: Party,
    recipient: Party,
    sequence: Sequence,
) -> Result<Transaction> {
    let (outpoint, value) = cet_outpoint(dlc, deal, executing)?;
    let amount = closing_value(value, closing_tx_fee(&dlc.conditions))?;

    Ok(Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: vec![TxIn {
            previous_output: outpoint,
            script_sig: ScriptBuf::new(),
            sequence,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: dlc.payout_script(recipient)?.clone(),
        }],
    })
}

/// Unsigned closing transaction paying `party`'s CET output to its own
/// payout script, less the closing fee.
pub fn closing_tx(dlc: &Dlc, deal: usize, party: Party) -> Result<Transaction> {
    spend_cet_output(dlc, deal, party, party, Sequence::MAX)
}

/// Unsigned fallback transaction: the counterparty of `executing` claims
/// `executing`'s CET output once it is [`CET_RELATIVE_DELAY`] blocks deep.
pub fn fallback_tx(dlc: &Dlc, deal: usize, executing: Party) -> Result<Transaction> {
    spend_cet_output(
        dlc,
        deal,
        executing,
        executing.counterparty(),
        Sequence::from_height(CET_RELATIVE_DELAY),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::Deal;
    use crate::execution::cet;
    use crate::test_utils::{committed_dlc, BTC};

    #[test]
    fn test_closing_value() {
        assert_eq!(closing_value(10_000, 1_800).unwrap(), 8_200);
        assert!(matches!(
            closing_value(1_800, 1_800),
            Err(DlcError::InsufficientFee { value: 1_800, fee: 1_800 })
        ));
        assert!(closing_value(100, 1_800).is_err());
    }

    #[test]
    fn test_closing_spends_cet_output() {
        let dlc = committed_dlc();
        let cet_tx = cet(&dlc, 0, Party::First).unwrap();
        let tx = closing_tx(&dlc, 0, Party::First).unwrap();

        assert_eq!(tx.input[0].previous_output.txid, cet_tx.compute_txid());
        assert_eq!(tx.input[0].previous_output.vout, 0);
        assert_eq!(tx.output.len(), 1);
        assert_eq!(
            tx.output[0].value.to_sat(),
            2 * BTC - closing_tx_fee(&dlc.conditions)
        );
        assert_eq!(tx.output[0].script_pubkey, *dlc.payout_script(Party::First).unwrap());
    }

    #[test]
    fn test_closing_fails_when_fee_exceeds_output() {
        let mut dlc = committed_dlc();
        let fee = closing_tx_fee(&dlc.conditions);
        dlc.conditions.deals[0] = Deal::new(fee, 2 * BTC - fee, vec![vec![1]]);
        assert!(matches!(
            closing_tx(&dlc, 0, Party::First),
            Err(DlcError::InsufficientFee { value, .. }) if value == fee
        ));
        assert!(matches!(
            fallback_tx(&dlc, 0, Party::First),
            Err(DlcError::InsufficientFee { .. })
        ));
    }

    #[test]
    fn test_fallback_pays_counterparty_after_delay() {
        let dlc = committed_dlc();
        let tx = fallback_tx(&dlc, 0, Party::First).unwrap();

        assert_eq!(tx.input[0].sequence, Sequence::from_height(144));
        assert_eq!(tx.output[0].script_pubkey, *dlc.payout_script(Party::Second).unwrap());
    }
}

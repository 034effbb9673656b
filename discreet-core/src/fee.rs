//! Linear fee model.
//!
//! Fees are `size × feerate` with fixed size estimates in virtual bytes.
//! Components shared by both parties are split in half, the odd satoshi going
//! to the first party. Each party pays for its own inputs and change output.

use crate::{conditions::Conditions, party::Party};

/// Version, locktime, counts and the funding output of the funding transaction
pub const FUND_TX_BASE_SIZE: u64 = 55;

/// One funding input
pub const FUND_TX_IN_SIZE: u64 = 149;

/// One change output
pub const FUND_TX_OUT_SIZE: u64 = 31;

/// A contract execution transaction, also used for the refund transaction
pub const CET_SIZE: u64 = 345;

/// A closing (or fallback) transaction spending a CET output
pub const CLOSING_TX_SIZE: u64 = 180;

/// Outputs below this value are not created
pub const DUST_LIMIT: u64 = 546;

/// Relative delay (blocks) before the counterparty may sweep a CET output
pub const CET_RELATIVE_DELAY: u16 = 144;

/// Highest accepted feerate (sat/vbyte), Bitcoin Core's default `maxfeerate`
pub const MAX_FEERATE: u64 = 10_000;

/// Splits a shared amount; the first party carries the odd satoshi.
pub fn split_shared(amount: u64, party: Party) -> u64 {
    match party {
        Party::First => amount - amount / 2,
        Party::Second => amount / 2,
    }
}

/// Fee of the transaction spending the funding output, pre-funded in it.
pub fn redeem_tx_fee(conditions: &Conditions) -> u64 {
    conditions.redeem_feerate * CET_SIZE
}

/// Fee deducted from a CET output by the transaction spending it.
pub fn closing_tx_fee(conditions: &Conditions) -> u64 {
    conditions.redeem_feerate * CLOSING_TX_SIZE
}

/// Per-input funding fee.
pub fn fund_fee_per_input(conditions: &Conditions) -> u64 {
    conditions.fund_feerate * FUND_TX_IN_SIZE
}

/// Per-output funding fee.
pub fn fund_fee_per_output(conditions: &Conditions) -> u64 {
    conditions.fund_feerate * FUND_TX_OUT_SIZE
}

/// Fixed part of a party's fee: its share of the funding base and of the
/// pre-funded redemption fee.
pub fn common_fee(conditions: &Conditions, party: Party) -> u64 {
    split_shared(conditions.fund_feerate * FUND_TX_BASE_SIZE, party)
        + split_shared(redeem_tx_fee(conditions), party)
}

/// What a party must bring before input and change costs: deposit plus
/// common fee.
pub fn required_amount(conditions: &Conditions, party: Party) -> u64 {
    conditions.deposits[party] + common_fee(conditions, party)
}

/// Funding fee of a party contributing `inputs` inputs, without change.
pub fn party_fee(conditions: &Conditions, party: Party, inputs: usize) -> u64 {
    common_fee(conditions, party) + inputs as u64 * fund_fee_per_input(conditions)
}

/// Change left from `remainder` after paying for its own output.
///
/// Returns zero when the change would be dust; the whole remainder then goes
/// to fees.
pub fn change_after_fee(remainder: u64, fee_per_output: u64) -> u64 {
    match remainder.checked_sub(fee_per_output) {
        Some(change) if change >= DUST_LIMIT => change,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_test_conditions;

    #[test]
    fn test_split_shared_covers_whole_amount() {
        for amount in [0u64, 1, 2, 345, 3451] {
            assert_eq!(
                split_shared(amount, Party::First) + split_shared(amount, Party::Second),
                amount
            );
        }
        assert_eq!(split_shared(5, Party::First), 3);
        assert_eq!(split_shared(5, Party::Second), 2);
    }

    #[test]
    fn test_common_fees_cover_base_and_redeem() {
        let conditions = create_test_conditions();
        let total = common_fee(&conditions, Party::First) + common_fee(&conditions, Party::Second);
        assert_eq!(
            total,
            conditions.fund_feerate * FUND_TX_BASE_SIZE + redeem_tx_fee(&conditions)
        );
    }

    #[test]
    fn test_party_fee_grows_per_input() {
        let conditions = create_test_conditions();
        let one = party_fee(&conditions, Party::Second, 1);
        let three = party_fee(&conditions, Party::Second, 3);
        assert_eq!(three - one, 2 * conditions.fund_feerate * FUND_TX_IN_SIZE);
    }

    #[test]
    fn test_dust_change_is_dropped() {
        assert_eq!(change_after_fee(10_000, 310), 9_690);
        assert_eq!(change_after_fee(310 + DUST_LIMIT, 310), DUST_LIMIT);
        assert_eq!(change_after_fee(310 + DUST_LIMIT - 1, 310), 0);
        assert_eq!(change_after_fee(100, 310), 0);
    }
}

//! # Contract Conditions
//!
//! Terms both parties agree on before any key or coin is exchanged: deposits,
//! feerates, the refund height, the oracle fixing time and the list of deals.
//!
//! Conditions travel as JSON with integer satoshi amounts, a Unix fixing
//! time and hex-encoded oracle messages:
//!
//! ```json
//! {
//!   "fixing_time": 1767225600,
//!   "deposits": { "first": 100000000, "second": 100000000 },
//!   "fund_feerate": 10,
//!   "redeem_feerate": 10,
//!   "refund_locktime": 900000,
//!   "deals": [
//!     { "amounts": { "first": 200000000, "second": 0 }, "messages": ["01"] },
//!     { "amounts": { "first": 0, "second": 200000000 }, "messages": ["00"] }
//!   ]
//! }
//! ```

use std::collections::HashSet;

use bitcoin::Amount;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    fee::MAX_FEERATE,
    party::{Party, PartyPair},
    utils::now_timestamp,
    DlcError,
};

/// One possible outcome of the contract.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Deal {
    /// Satoshis each party receives under this outcome
    pub amounts: PartyPair<u64>,

    /// Messages the oracle must sign, one per nonce slot
    #[serde(with = "hex_messages")]
    pub messages: Vec<Vec<u8>>,
}

impl Deal {
    pub fn new(first: u64, second: u64, messages: Vec<Vec<u8>>) -> Self {
        Self {
            amounts: PartyPair::new(first, second),
            messages,
        }
    }

    /// Amount paid to `party` under this outcome.
    pub fn amount(&self, party: Party) -> u64 {
        self.amounts[party]
    }

    /// Sum of both payouts.
    pub fn total(&self) -> u64 {
        self.amounts.first.saturating_add(self.amounts.second)
    }
}

/// Negotiated contract terms.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Conditions {
    /// When the oracle attests to the outcome (Unix timestamp)
    pub fixing_time: u64,

    /// Satoshis each party locks into the contract
    pub deposits: PartyPair<u64>,

    /// Feerate of the funding transaction (sat/vbyte)
    pub fund_feerate: u64,

    /// Feerate of execution, refund and closing transactions (sat/vbyte)
    pub redeem_feerate: u64,

    /// Block height after which the refund transaction is valid
    pub refund_locktime: u32,

    /// Possible outcomes, looked up by their message tuple
    pub deals: Vec<Deal>,
}

impl Conditions {
    /// Creates validated conditions. The fixing time must lie in the future.
    pub fn new(
        fixing_time: u64,
        deposits: PartyPair<u64>,
        fund_feerate: u64,
        redeem_feerate: u64,
        refund_locktime: u32,
        deals: Vec<Deal>,
    ) -> Result<Self> {
        let conditions = Self {
            fixing_time,
            deposits,
            fund_feerate,
            redeem_feerate,
            refund_locktime,
            deals,
        };
        conditions.validate_at(now_timestamp())?;
        Ok(conditions)
    }

    /// Checks every invariant against the given current time.
    pub fn validate_at(&self, now: u64) -> Result<()> {
        if self.fixing_time <= now {
            return Err(DlcError::InvalidConditions(format!(
                "fixing time {} is not in the future",
                self.fixing_time
            )));
        }
        self.validate_terms()
    }

    /// Checks every invariant that does not depend on the clock.
    pub fn validate_terms(&self) -> Result<()> {
        if self.total_deposit() > Amount::MAX_MONEY.to_sat() {
            return Err(DlcError::InvalidConditions(format!(
                "deposits total more than {} sats",
                Amount::MAX_MONEY.to_sat()
            )));
        }
        if self.total_deposit() == 0 {
            return Err(DlcError::InvalidConditions(
                "at least one deposit must be positive".to_string(),
            ));
        }
        if self.fund_feerate == 0 || self.redeem_feerate == 0 {
            return Err(DlcError::InvalidConditions(
                "feerates must be positive".to_string(),
            ));
        }
        if self.fund_feerate > MAX_FEERATE || self.redeem_feerate > MAX_FEERATE {
            return Err(DlcError::InvalidConditions(format!(
                "feerates must not exceed {MAX_FEERATE} sat/vbyte"
            )));
        }
        if self.refund_locktime == 0 {
            return Err(DlcError::InvalidConditions(
                "refund locktime must be a positive block height".to_string(),
            ));
        }
        if bitcoin::absolute::LockTime::from_height(self.refund_locktime).is_err() {
            return Err(DlcError::InvalidConditions(format!(
                "refund locktime {} is not a block height",
                self.refund_locktime
            )));
        }
        if self.deals.is_empty() {
            return Err(DlcError::InvalidConditions(
                "deal list is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, deal) in self.deals.iter().enumerate() {
            if deal.messages.is_empty() {
                return Err(DlcError::InvalidConditions(format!(
                    "deal {index} has no oracle messages"
                )));
            }
            if !seen.insert(&deal.messages) {
                return Err(DlcError::InvalidConditions(format!(
                    "deal {index} repeats the messages of an earlier deal"
                )));
            }
            if deal.total() != self.total_deposit() {
                return Err(DlcError::InvalidConditions(format!(
                    "deal {index} pays {} sats but deposits total {} sats",
                    deal.total(),
                    self.total_deposit()
                )));
            }
        }
        Ok(())
    }

    /// Sum of both deposits.
    pub fn total_deposit(&self) -> u64 {
        self.deposits.first.saturating_add(self.deposits.second)
    }

    /// Index of the deal whose message tuple equals `messages` exactly.
    pub fn find_deal(&self, messages: &[Vec<u8>]) -> Option<usize> {
        self.deals.iter().position(|deal| deal.messages == messages)
    }

    /// Largest number of messages any deal asks the oracle to sign.
    pub fn max_messages(&self) -> usize {
        self.deals.iter().map(|d| d.messages.len()).max().unwrap_or(0)
    }

    /// Serializes the conditions to the JSON wire format.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses conditions from the JSON wire format.
    ///
    /// The fixing time is not checked, so stored contracts whose fixing time
    /// has passed still load.
    pub fn from_json(json: &str) -> Result<Self> {
        let conditions: Self = serde_json::from_str(json)?;
        conditions.validate_terms()?;
        Ok(conditions)
    }
}

/// Parses deals from CSV text, one deal per line:
/// `amount_first,amount_second,message_hex[,message_hex...]`.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn parse_deals_csv(text: &str) -> Result<Vec<Deal>> {
    let mut deals = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() < 3 {
            return Err(DlcError::InvalidDeal(format!(
                "line {}: expected two amounts and at least one message",
                number + 1
            )));
        }

        let parse_amount = |field: &str| {
            field.parse::<u64>().map_err(|_| {
                DlcError::InvalidDeal(format!("line {}: invalid amount {field}", number + 1))
            })
        };
        let first = parse_amount(fields[0])?;
        let second = parse_amount(fields[1])?;
        let messages = fields[2..]
            .iter()
            .map(hex::decode)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        deals.push(Deal::new(first, second, messages));
    }
    Ok(deals)
}

pub(crate) mod hex_messages {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(messages: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(messages.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|m| hex::decode(m).map_err(serde::de::Error::custom))
            .collect()
    }
}

//! Helpers shared by the library and the command line: clock, network and
//! address parsing, transaction hex.

use std::str::FromStr;

use bitcoin::{consensus::encode::serialize_hex, Address, Network, Transaction};
use chrono::{DateTime, SecondsFormat};

use crate::{error::Result, DlcError};

/// Current Unix time in seconds
pub fn now_timestamp() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Parses an address and checks that it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address> {
    Address::from_str(address)
        .map_err(|e| DlcError::InvalidConditions(format!("Invalid address {address}: {e}")))?
        .require_network(network)
        .map_err(|e| DlcError::InvalidConditions(format!("Address {address}: {e}")))
}

/// Network name to network conversion
pub fn parse_network(network: &str) -> Result<Network> {
    match network.to_ascii_lowercase().as_str() {
        "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
        "testnet" => Ok(Network::Testnet),
        "signet" => Ok(Network::Signet),
        "regtest" => Ok(Network::Regtest),
        other => Err(DlcError::InvalidConditions(format!(
            "Invalid network: {other}"
        ))),
    }
}

/// Consensus serialization of a transaction, hex-encoded
pub fn tx_hex(tx: &Transaction) -> String {
    serialize_hex(tx)
}

/// RFC 3339 form of a Unix timestamp, or the raw number when it is out of
/// chrono's range.
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map_or_else(
            || timestamp.to_string(),
            |time| time.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
}

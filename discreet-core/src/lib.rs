//! # Discreet Core
//!
//! Core Rust library for two-party Discreet Log Contracts on Bitcoin.
//!
//! Two parties lock deposits into a 2-of-2 output and pre-sign one
//! contract execution transaction (CET) per possible outcome. Each CET pays
//! its executing party through a key that can only be completed with an
//! oracle's signature on that outcome, so the oracle decides the payout
//! without ever seeing the contract.
//!
//! ## Features
//!
//! - **Oracle Commitments**: Schnorr-style commitment points `R - H(R||m)·V`
//!   opened by the oracle's signature scalar
//! - **Transaction Set**: funding, CET, refund, closing and fallback
//!   transactions with their SegWit v0 scripts and witnesses
//! - **Handshake**: a per-party [`Builder`] that exchanges owned offers and
//!   verifies every signature before storing it
//! - **Collaborators**: wallet, oracle and store traits with in-memory,
//!   seed-deterministic and JSON-file reference implementations
//!
//! ## Examples
//!
//! ```rust
//! use discreet_core::{Conditions, Deal, PartyPair};
//!
//! let conditions = Conditions::new(
//!     discreet_core::now_timestamp() + 86_400,
//!     PartyPair::new(100_000_000, 100_000_000),
//!     10,
//!     10,
//!     900_000,
//!     vec![
//!         Deal::new(200_000_000, 0, vec![vec![1]]),
//!         Deal::new(0, 200_000_000, vec![vec![0]]),
//!     ],
//! )?;
//! println!("{}", conditions.to_json()?);
//! Ok::<(), discreet_core::DlcError>(())
//! ```

pub mod builder;
pub mod closing;
pub mod commitment;
pub mod conditions;
pub mod contract;
pub mod error;
pub mod execution;
pub mod fee;
pub mod funding;
pub mod oracle;
pub mod party;
pub mod refund;
pub mod script;
pub mod store;
pub mod utils;
pub mod wallet;

#[cfg(test)]
mod test_utils;

pub use bitcoin;
pub use secp256k1;

pub use builder::{Builder, FundingOffer, PublicOffer, SignatureOffer, Stage};
pub use conditions::{parse_deals_csv, Conditions, Deal};
pub use contract::Dlc;
pub use error::{DlcError, ErrorKind, Result};
pub use oracle::{LocalOracle, Oracle, OracleAnnouncement, OracleAttestation};
pub use party::{Party, PartyPair};
pub use store::{ContractId, ContractRecord, ContractStore, FileStore, MemoryStore};
pub use utils::*;
pub use wallet::{MemoryWallet, Utxo, Wallet};

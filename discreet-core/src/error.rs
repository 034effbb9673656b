//! Error types for discreet-core

use thiserror::Error;

use crate::party::Party;

/// Result type alias for contract operations
pub type Result<T> = std::result::Result<T, DlcError>;

/// Broad category of a [`DlcError`], surfaced to whoever drives the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed contract conditions
    Validation,
    /// A protocol step was attempted before the data it needs exists
    Precondition,
    /// Inputs cannot cover deposits and fees, or an output would be non-positive
    InsufficientFunds,
    /// A deal that would force a zero-value output for the executing party
    MalformedDeal,
    /// A signature or an oracle attestation failed to verify
    Verification,
    /// Wallet, oracle, store, encoding or I/O failure
    Collaborator,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Precondition => "precondition",
            ErrorKind::InsufficientFunds => "insufficient funds",
            ErrorKind::MalformedDeal => "malformed deal",
            ErrorKind::Verification => "verification",
            ErrorKind::Collaborator => "collaborator",
        };
        f.write_str(name)
    }
}

/// Error types for contract operations
#[derive(Error, Debug)]
pub enum DlcError {
    /// Conditions validation errors
    #[error("Invalid conditions: {0}")]
    InvalidConditions(String),

    /// Deal list parsing errors
    #[error("Invalid deal: {0}")]
    InvalidDeal(String),

    /// Funding inputs offered by a party sum beyond the money supply
    #[error("Funding inputs of {0} party exceed the money supply")]
    InvalidUtxos(Party),

    /// Missing public key for a party
    #[error("Missing public key for {0} party")]
    MissingPublicKey(Party),

    /// Missing payout address for a party
    #[error("Missing payout address for {0} party")]
    MissingPayoutAddress(Party),

    /// Funding inputs have not been selected for a party
    #[error("Missing funding inputs for {0} party")]
    MissingUtxos(Party),

    /// Oracle public material has not been committed
    #[error("Missing oracle commitment for deal {0}")]
    MissingCommitment(usize),

    /// Deal index outside of the deal list
    #[error("Unknown deal index {0}")]
    UnknownDeal(usize),

    /// A signature needed for this step has not been received
    #[error("Missing signature: {0}")]
    MissingSignature(String),

    /// No deal has been fixed by an oracle attestation
    #[error("No deal has been fixed yet")]
    NotFixed,

    /// A protocol step was called before its predecessor completed
    #[error("Out of order: expected stage {expected}, contract is at {actual}")]
    OutOfOrder {
        expected: crate::builder::Stage,
        actual: crate::builder::Stage,
    },

    /// An accept would overwrite previously accepted data
    #[error("Conflicting data: {0}")]
    Conflict(String),

    /// Party inputs do not cover deposit plus fees
    #[error("Insufficient funds for {party} party: required {required} sats, available {available} sats")]
    InsufficientFunds {
        party: Party,
        required: u64,
        available: u64,
    },

    /// Output value after fee would be non-positive
    #[error("Insufficient fee coverage: output value {value} sats does not cover fee {fee} sats")]
    InsufficientFee { value: u64, fee: u64 },

    /// Deal pays nothing to the executing party
    #[error("Malformed deal {0}: executing party receives nothing")]
    MalformedDeal(usize),

    /// Oracle messages match no deal
    #[error("No deal matches the attested messages")]
    DealNotFound,

    /// A different deal was already fixed
    #[error("Deal {0} is already fixed")]
    AlreadyFixed(usize),

    /// Signature verification errors
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Aggregate oracle signature does not open the deal commitment
    #[error("Oracle signature does not match the commitment of deal {0}")]
    OracleVerification(usize),

    /// Commitment arithmetic produced the point at infinity or a zero scalar
    #[error("Degenerate commitment: {0}")]
    Degenerate(String),

    /// Wallet collaborator errors
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Oracle collaborator errors
    #[error("Oracle error: {0}")]
    Oracle(String),

    /// Persistence collaborator errors
    #[error("Store error: {0}")]
    Store(String),

    /// Transaction construction errors
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Secp256k1 errors
    #[error("Secp256k1 error: {0}")]
    Secp256k1(#[from] secp256k1::Error),

    /// Hex decoding errors
    #[error("Hex decoding error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// Serde JSON errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DlcError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DlcError::InvalidConditions(_)
            | DlcError::InvalidDeal(_)
            | DlcError::InvalidUtxos(_) => ErrorKind::Validation,
            DlcError::MissingPublicKey(_)
            | DlcError::MissingPayoutAddress(_)
            | DlcError::MissingUtxos(_)
            | DlcError::MissingCommitment(_)
            | DlcError::UnknownDeal(_)
            | DlcError::MissingSignature(_)
            | DlcError::NotFixed
            | DlcError::OutOfOrder { .. }
            | DlcError::Conflict(_)
            | DlcError::DealNotFound
            | DlcError::AlreadyFixed(_) => ErrorKind::Precondition,
            DlcError::InsufficientFunds { .. } | DlcError::InsufficientFee { .. } => {
                ErrorKind::InsufficientFunds
            }
            DlcError::MalformedDeal(_) => ErrorKind::MalformedDeal,
            DlcError::InvalidSignature(_)
            | DlcError::OracleVerification(_)
            | DlcError::Degenerate(_) => ErrorKind::Verification,
            DlcError::Wallet(_)
            | DlcError::Oracle(_)
            | DlcError::Store(_)
            | DlcError::Transaction(_)
            | DlcError::Secp256k1(_)
            | DlcError::Hex(_)
            | DlcError::Json(_)
            | DlcError::Io(_) => ErrorKind::Collaborator,
        }
    }
}

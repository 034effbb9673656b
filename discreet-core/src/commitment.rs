//! # Oracle Commitment Scheme
//!
//! Schnorr-style commitments binding a contract branch to an oracle message.
//!
//! For an oracle key pair `(v, V)` and a nonce pair `(k, R)` the commitment to
//! a message `m` is
//!
//! ```text
//! P = R - H(R || m)·V
//! ```
//!
//! and the oracle's eventual signature `s = k - H(R || m)·v` satisfies
//! `s·G = P`. Revealing `s` therefore reveals the discrete log of `P`, which a
//! contract party adds to its own key to unlock the matching execution branch.
//!
//! The point at infinity and the zero scalar cannot be represented by
//! [`PublicKey`] and [`SecretKey`]; intermediate sums use `Option` with `None`
//! standing for the identity.

use secp256k1::{constants::CURVE_ORDER, PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::{error::Result, DlcError};

/// `H(R || m)` reduced modulo the curve order.
pub fn challenge(nonce: &PublicKey, message: &[u8]) -> Scalar {
    let mut hasher = Sha256::new();
    hasher.update(nonce.serialize());
    hasher.update(message);
    let digest: [u8; 32] = hasher.finalize().into();
    reduce_mod_order(digest)
}

/// Reduce a 256-bit big-endian integer modulo the curve order.
///
/// The order is above `2^255`, so a single subtraction is enough.
fn reduce_mod_order(bytes: [u8; 32]) -> Scalar {
    if let Ok(scalar) = Scalar::from_be_bytes(bytes) {
        return scalar;
    }

    let mut reduced = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let mut diff = bytes[i] as i16 - CURVE_ORDER[i] as i16 - borrow;
        if diff < 0 {
            diff += 256;
            borrow = 1;
        } else {
            borrow = 0;
        }
        reduced[i] = diff as u8;
    }
    Scalar::from_be_bytes(reduced).unwrap_or(Scalar::ZERO)
}

/// Point addition where `None` is the identity.
pub fn add_points(a: Option<PublicKey>, b: Option<PublicKey>) -> Option<PublicKey> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => a.combine(&b).ok(),
    }
}

/// Scalar addition modulo the order where `None` is zero.
pub fn add_scalars(a: Option<SecretKey>, b: Option<SecretKey>) -> Option<SecretKey> {
    match (a, b) {
        (None, other) | (other, None) => other,
        (Some(a), Some(b)) => a.add_tweak(&Scalar::from(b)).ok(),
    }
}

/// Commit to `message` under the oracle key and one nonce point.
pub fn commit(oracle_pubkey: &PublicKey, nonce: &PublicKey, message: &[u8]) -> Result<PublicKey> {
    let secp = Secp256k1::verification_only();
    let h = challenge(nonce, message);
    let h_v = oracle_pubkey.mul_tweak(&secp, &h)?.negate(&secp);
    nonce
        .combine(&h_v)
        .map_err(|_| DlcError::Degenerate("commitment is the point at infinity".to_string()))
}

/// Sum of the per-slot commitments of a deal's message tuple.
///
/// Messages use the leading nonce slots, so a deal may have fewer messages
/// than the oracle announced nonces, but never more.
pub fn commit_multi(
    oracle_pubkey: &PublicKey,
    nonces: &[PublicKey],
    messages: &[Vec<u8>],
) -> Result<PublicKey> {
    if messages.is_empty() {
        return Err(DlcError::Degenerate("no messages to commit to".to_string()));
    }
    if messages.len() > nonces.len() {
        return Err(DlcError::Oracle(format!(
            "{} messages but only {} nonces announced",
            messages.len(),
            nonces.len()
        )));
    }

    let secp = Secp256k1::verification_only();
    let mut sum: Option<PublicKey> = None;
    for (nonce, message) in nonces.iter().zip(messages) {
        let h = challenge(nonce, message);
        let h_v = oracle_pubkey.mul_tweak(&secp, &h)?.negate(&secp);
        let slot = add_points(Some(*nonce), Some(h_v));
        sum = add_points(sum, slot);
    }
    sum.ok_or_else(|| DlcError::Degenerate("commitment is the point at infinity".to_string()))
}

/// Oracle signature `s = k - H(R || m)·v` for one message slot.
pub fn sign(oracle_key: &SecretKey, nonce_key: &SecretKey, message: &[u8]) -> Result<SecretKey> {
    let secp = Secp256k1::signing_only();
    let nonce = PublicKey::from_secret_key(&secp, nonce_key);
    let h = challenge(&nonce, message);
    let h_v = oracle_key.mul_tweak(&h)?.negate();
    nonce_key
        .add_tweak(&Scalar::from(h_v))
        .map_err(|_| DlcError::Degenerate("signature scalar is zero".to_string()))
}

/// Aggregate signature matching [`commit_multi`] over the same slots.
pub fn sum_sigs(signatures: &[SecretKey]) -> Result<SecretKey> {
    signatures
        .iter()
        .fold(None, |acc, s| add_scalars(acc, Some(*s)))
        .ok_or_else(|| DlcError::Degenerate("signature sum is zero".to_string()))
}

/// `s·G == P`
pub fn verify(commitment: &PublicKey, signature: &SecretKey) -> bool {
    let secp = Secp256k1::signing_only();
    PublicKey::from_secret_key(&secp, signature) == *commitment
}

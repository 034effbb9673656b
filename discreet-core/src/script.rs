//! Redeem scripts, witness stacks and BIP-143 signing helpers.
//!
//! All contract outputs are SegWit v0. The funding output is a 2-of-2
//! multisig, each execution output is an oracle-conditional script:
//!
//! ```text
//! OP_IF
//!     <exec_pubkey + commitment>
//! OP_ELSE
//!     144 OP_CHECKSEQUENCEVERIFY OP_DROP
//!     <counterparty_pubkey>
//! OP_ENDIF
//! OP_CHECKSIG
//! ```

use bitcoin::{
    ecdsa,
    hashes::Hash,
    opcodes::all::{
        OP_CHECKMULTISIG, OP_CHECKSIG, OP_CSV, OP_DROP, OP_ELSE, OP_ENDIF, OP_IF, OP_PUSHNUM_2,
    },
    script::Builder,
    sighash::{EcdsaSighashType, SighashCache},
    Amount, CompressedPublicKey, Script, ScriptBuf, Transaction, Witness,
};
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, SecretKey};

use crate::{
    error::Result,
    fee::CET_RELATIVE_DELAY,
    party::{Party, PartyPair},
    DlcError,
};

/// `2 <first> <second> 2 OP_CHECKMULTISIG`
pub fn funding_script(pubkeys: &PartyPair<PublicKey>) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_PUSHNUM_2)
        .push_key(&bitcoin::PublicKey::new(pubkeys.first))
        .push_key(&bitcoin::PublicKey::new(pubkeys.second))
        .push_opcode(OP_PUSHNUM_2)
        .push_opcode(OP_CHECKMULTISIG)
        .into_script()
}

/// Oracle-conditional script locking a CET output.
///
/// The executing party spends immediately with a key whose public half is
/// `exec_pubkey + commitment`; the counterparty spends after the relative
/// delay with its plain key.
pub fn execution_script(
    exec_pubkey: &PublicKey,
    commitment: &PublicKey,
    counterparty_pubkey: &PublicKey,
) -> Result<ScriptBuf> {
    let unlock_key = exec_pubkey
        .combine(commitment)
        .map_err(|_| DlcError::Degenerate("execution key is the point at infinity".to_string()))?;

    Ok(Builder::new()
        .push_opcode(OP_IF)
        .push_key(&bitcoin::PublicKey::new(unlock_key))
        .push_opcode(OP_ELSE)
        .push_int(CET_RELATIVE_DELAY as i64)
        .push_opcode(OP_CSV)
        .push_opcode(OP_DROP)
        .push_key(&bitcoin::PublicKey::new(*counterparty_pubkey))
        .push_opcode(OP_ENDIF)
        .push_opcode(OP_CHECKSIG)
        .into_script())
}

/// Pay-to-witness-pubkey-hash output script.
pub fn p2wpkh_script(pubkey: &PublicKey) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&CompressedPublicKey(*pubkey).wpubkey_hash())
}

/// Pay-to-witness-script-hash output script.
pub fn p2wsh_script(script: &Script) -> ScriptBuf {
    ScriptBuf::new_p2wsh(&script.wscript_hash())
}

fn sighash_all(signature: &Signature) -> Vec<u8> {
    ecdsa::Signature::sighash_all(*signature).to_vec()
}

/// `[<empty>, sig_first, sig_second, script]`
///
/// Signatures follow the pubkey order of the funding script, not signing order.
pub fn funding_witness(signatures: &PartyPair<Signature>, script: &Script) -> Witness {
    Witness::from_slice(&[
        Vec::new(),
        sighash_all(&signatures[Party::First]),
        sighash_all(&signatures[Party::Second]),
        script.to_bytes(),
    ])
}

/// If-branch witness: `[sig, 0x01, script]`
pub fn execution_witness(signature: &Signature, script: &Script) -> Witness {
    Witness::from_slice(&[sighash_all(signature), vec![1u8], script.to_bytes()])
}

/// Else-branch witness: `[sig, <empty>, script]`
pub fn fallback_witness(signature: &Signature, script: &Script) -> Witness {
    Witness::from_slice(&[sighash_all(signature), Vec::new(), script.to_bytes()])
}

/// BIP-143 `SIGHASH_ALL` message for a P2WSH input.
pub fn segwit_sighash(
    tx: &Transaction,
    input_index: usize,
    script: &Script,
    amount: u64,
) -> Result<Message> {
    let sighash = SighashCache::new(tx)
        .p2wsh_signature_hash(
            input_index,
            script,
            Amount::from_sat(amount),
            EcdsaSighashType::All,
        )
        .map_err(|e| DlcError::Transaction(format!("sighash of input {input_index}: {e}")))?;
    Ok(Message::from_digest(sighash.to_byte_array()))
}

/// Signs a P2WSH input with `SIGHASH_ALL`.
pub fn sign_segwit_input(
    tx: &Transaction,
    input_index: usize,
    script: &Script,
    amount: u64,
    secret_key: &SecretKey,
) -> Result<Signature> {
    let message = segwit_sighash(tx, input_index, script, amount)?;
    Ok(Secp256k1::signing_only().sign_ecdsa(&message, secret_key))
}

/// Checks a signature over a P2WSH input.
pub fn verify_segwit_signature(
    tx: &Transaction,
    input_index: usize,
    script: &Script,
    amount: u64,
    signature: &Signature,
    pubkey: &PublicKey,
) -> Result<()> {
    let message = segwit_sighash(tx, input_index, script, amount)?;
    Secp256k1::verification_only()
        .verify_ecdsa(&message, signature, pubkey)
        .map_err(|_| {
            DlcError::InvalidSignature(format!("signature on input {input_index} does not verify"))
        })
}

/// Signs a P2WPKH input and returns its `[sig, pubkey]` witness.
pub fn sign_p2wpkh_input(
    tx: &Transaction,
    input_index: usize,
    amount: u64,
    secret_key: &SecretKey,
) -> Result<Witness> {
    let secp = Secp256k1::new();
    let pubkey = PublicKey::from_secret_key(&secp, secret_key);
    let script_pubkey = p2wpkh_script(&pubkey);
    let sighash = SighashCache::new(tx)
        .p2wpkh_signature_hash(
            input_index,
            &script_pubkey,
            Amount::from_sat(amount),
            EcdsaSighashType::All,
        )
        .map_err(|e| DlcError::Transaction(format!("sighash of input {input_index}: {e}")))?;
    let message = Message::from_digest(sighash.to_byte_array());
    let signature = ecdsa::Signature::sighash_all(secp.sign_ecdsa(&message, secret_key));
    Ok(Witness::p2wpkh(&signature, &pubkey))
}

/// Checks a `[sig, pubkey]` witness against the P2WPKH output it spends.
pub fn verify_p2wpkh_witness(
    tx: &Transaction,
    input_index: usize,
    witness: &Witness,
    script_pubkey: &Script,
    amount: u64,
) -> Result<()> {
    let invalid = |reason: &str| {
        DlcError::InvalidSignature(format!("witness for input {input_index}: {reason}"))
    };

    if witness.len() != 2 {
        return Err(invalid("expected signature and public key"));
    }
    let signature = witness
        .nth(0)
        .and_then(|bytes| ecdsa::Signature::from_slice(bytes).ok())
        .ok_or_else(|| invalid("malformed signature"))?;
    let pubkey = witness
        .nth(1)
        .and_then(|bytes| PublicKey::from_slice(bytes).ok())
        .ok_or_else(|| invalid("malformed public key"))?;

    if signature.sighash_type != EcdsaSighashType::All {
        return Err(invalid("signature must commit to the whole transaction"));
    }
    if p2wpkh_script(&pubkey).as_script() != script_pubkey {
        return Err(invalid("public key does not match the spent output"));
    }

    let sighash = SighashCache::new(tx)
        .p2wpkh_signature_hash(
            input_index,
            script_pubkey,
            Amount::from_sat(amount),
            EcdsaSighashType::All,
        )
        .map_err(|e| DlcError::Transaction(format!("sighash of input {input_index}: {e}")))?;
    let message = Message::from_digest(sighash.to_byte_array());

    Secp256k1::verification_only()
        .verify_ecdsa(&message, &signature.signature, &pubkey)
        .map_err(|_| invalid("signature does not verify"))
}

//! Common test utilities for discreet-core tests.
//!
//! Deterministic keys, coins and contract states at each step of the
//! handshake, so module tests can start from the state they need.

use bitcoin::{
    absolute::LockTime, hashes::Hash, transaction::Version, Amount, Network, OutPoint, ScriptBuf,
    Sequence, Transaction, TxIn, TxOut, Txid, Witness,
};
use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::{
    builder::Builder,
    commitment::commit_multi,
    conditions::{Conditions, Deal},
    contract::Dlc,
    oracle::{LocalOracle, Oracle},
    party::{Party, PartyPair},
    script::p2wpkh_script,
    utils::now_timestamp,
    wallet::{MemoryWallet, Utxo},
};

/// One bitcoin in satoshis
pub const BTC: u64 = 100_000_000;

/// Deterministic secret key for `index` (must be non-zero).
pub fn secret_key(index: u8) -> SecretKey {
    let mut secret_bytes = [0u8; 32];
    secret_bytes[0] = index;
    secret_bytes[31] = index;
    SecretKey::from_slice(&secret_bytes).unwrap()
}

pub fn public_key(index: u8) -> PublicKey {
    PublicKey::from_secret_key(&Secp256k1::new(), &secret_key(index))
}

/// Coin of `amount` sats paying to the key of `index`.
pub fn test_utxo(index: u8, amount: u64) -> Utxo {
    Utxo {
        outpoint: OutPoint::new(Txid::from_byte_array([index; 32]), u32::from(index)),
        amount,
        script_pubkey: p2wpkh_script(&public_key(index)),
    }
}

/// Transaction with `inputs` dummy inputs and a single output.
pub fn spending_tx(inputs: u8) -> Transaction {
    Transaction {
        version: Version::TWO,
        lock_time: LockTime::ZERO,
        input: (0..inputs)
            .map(|i| TxIn {
                previous_output: OutPoint::new(Txid::from_byte_array([i + 1; 32]), 0),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(9_000),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

/// Deposits of 1 BTC each; deal `[01]` pays 2 BTC to the first party and
/// deal `[00]` pays 2 BTC to the second. Fixing time one day ahead.
pub fn create_test_conditions() -> Conditions {
    Conditions {
        fixing_time: now_timestamp() + 86_400,
        deposits: PartyPair::new(BTC, BTC),
        fund_feerate: 10,
        redeem_feerate: 10,
        refund_locktime: 900_000,
        deals: vec![
            Deal::new(2 * BTC, 0, vec![vec![1]]),
            Deal::new(0, 2 * BTC, vec![vec![0]]),
        ],
    }
}

/// Contract state with keys 1 and 2, payout keys 11 and 12, change keys 21
/// and 22.
pub fn keyed_dlc() -> Dlc {
    let mut dlc = Dlc::new(create_test_conditions());
    for (party, offset) in [(Party::First, 1u8), (Party::Second, 2u8)] {
        let slot = &mut dlc.parties[party];
        slot.pubkey = Some(public_key(offset));
        slot.payout_script = Some(p2wpkh_script(&public_key(10 + offset)));
        slot.change_script = Some(p2wpkh_script(&public_key(20 + offset)));
    }
    dlc
}

/// [`keyed_dlc`] with a 2 BTC input per party.
pub fn funded_dlc() -> Dlc {
    let mut dlc = keyed_dlc();
    dlc.parties.first.utxos = vec![test_utxo(31, 2 * BTC)];
    dlc.parties.second.utxos = vec![test_utxo(32, 2 * BTC)];
    dlc
}

/// [`funded_dlc`] with oracle key 50, nonce key 51 and every commitment.
pub fn committed_dlc() -> Dlc {
    let mut dlc = funded_dlc();
    let oracle = public_key(50);
    let nonces = vec![public_key(51)];
    dlc.oracle.commitments = dlc
        .conditions
        .deals
        .iter()
        .map(|deal| commit_multi(&oracle, &nonces, &deal.messages).unwrap())
        .collect();
    dlc.oracle.pubkey = Some(oracle);
    dlc.oracle.nonces = nonces;
    dlc
}

/// Regtest wallet holding one coin of `amount` sats.
pub fn funded_wallet(seed: u8, amount: u64) -> MemoryWallet {
    let mut wallet = MemoryWallet::new(&[seed; 32], Network::Regtest).unwrap();
    wallet.fund(amount).unwrap();
    wallet
}

/// Two builders that have exchanged public offers.
pub fn exchange_keys() -> (Builder<MemoryWallet>, Builder<MemoryWallet>) {
    let conditions = create_test_conditions();
    let mut a = Builder::new(Party::First, conditions.clone(), funded_wallet(1, 2 * BTC)).unwrap();
    let mut b = Builder::new(Party::Second, conditions, funded_wallet(2, 2 * BTC)).unwrap();

    for builder in [&mut a, &mut b] {
        builder.prepare_pubkey().unwrap();
        builder.prepare_funding().unwrap();
    }
    let offer_a = a.public_offer().unwrap();
    let offer_b = b.public_offer().unwrap();
    a.accept_public_offer(offer_b).unwrap();
    b.accept_public_offer(offer_a).unwrap();
    (a, b)
}

/// Builders committed to a one-slot oracle. With `sign_all`, signatures
/// and funding witnesses are exchanged too.
pub fn handshake(
    sign_all: bool,
) -> (Builder<MemoryWallet>, Builder<MemoryWallet>, LocalOracle) {
    let (mut a, mut b) = exchange_keys();
    let oracle = LocalOracle::new([42u8; 32], 1);
    let announcement = oracle
        .public_material(a.dlc().conditions.fixing_time)
        .unwrap();
    a.commit_oracle(&announcement).unwrap();
    b.commit_oracle(&announcement).unwrap();

    if sign_all {
        let sigs_a = a.sign_contract().unwrap();
        let sigs_b = b.sign_contract().unwrap();
        a.accept_signatures(sigs_b).unwrap();
        b.accept_signatures(sigs_a).unwrap();

        let fund_a = a.sign_funding().unwrap();
        let fund_b = b.sign_funding().unwrap();
        a.accept_funding(fund_b).unwrap();
        b.accept_funding(fund_a).unwrap();
    }
    (a, b, oracle)
}

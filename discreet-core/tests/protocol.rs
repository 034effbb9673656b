//! End-to-end contract runs between two in-process parties.

use discreet_core::{
    bitcoin::Network,
    closing::closing_value,
    commitment,
    fee::closing_tx_fee,
    now_timestamp,
    script::verify_segwit_signature,
    secp256k1::ecdsa::Signature,
    Builder, Conditions, ContractStore, Deal, DlcError, ErrorKind, LocalOracle, MemoryStore,
    MemoryWallet, Oracle, Party, PartyPair, Stage,
};

const BTC: u64 = 100_000_000;

fn conditions() -> Conditions {
    Conditions::new(
        now_timestamp() + 3_600,
        PartyPair::new(BTC, BTC),
        5,
        8,
        850_000,
        vec![
            Deal::new(2 * BTC, 0, vec![vec![1]]),
            Deal::new(0, 2 * BTC, vec![vec![0]]),
        ],
    )
    .unwrap()
}

fn wallet(seed: u8) -> MemoryWallet {
    let mut wallet = MemoryWallet::new(&[seed; 32], Network::Regtest).unwrap();
    wallet.fund(BTC / 2).unwrap();
    wallet.fund(BTC).unwrap();
    wallet
}

/// Both parties through funding, funding broadcast by the first party.
fn funded_contract() -> (Builder<MemoryWallet>, Builder<MemoryWallet>, LocalOracle) {
    let conditions = conditions();
    let mut a = Builder::new(Party::First, conditions.clone(), wallet(1)).unwrap();
    let mut b = Builder::new(Party::Second, conditions.clone(), wallet(2)).unwrap();

    for builder in [&mut a, &mut b] {
        builder.prepare_pubkey().unwrap();
        builder.prepare_funding().unwrap();
    }
    let offer_a = a.public_offer().unwrap();
    let offer_b = b.public_offer().unwrap();
    a.accept_public_offer(offer_b).unwrap();
    b.accept_public_offer(offer_a).unwrap();

    let oracle = LocalOracle::new([9u8; 32], 1);
    let announcement = oracle.public_material(conditions.fixing_time).unwrap();
    a.commit_oracle(&announcement).unwrap();
    b.commit_oracle(&announcement).unwrap();

    let sigs_a = a.sign_contract().unwrap();
    let sigs_b = b.sign_contract().unwrap();
    a.accept_signatures(sigs_b).unwrap();
    b.accept_signatures(sigs_a).unwrap();

    let fund_a = a.sign_funding().unwrap();
    let fund_b = b.sign_funding().unwrap();
    a.accept_funding(fund_b).unwrap();
    b.accept_funding(fund_a).unwrap();

    assert_eq!(a.stage(), Stage::FundingSigned);
    assert_eq!(b.stage(), Stage::FundingSigned);
    assert_eq!(a.funding_tx().unwrap(), b.funding_tx().unwrap());
    a.broadcast_funding().unwrap();
    (a, b, oracle)
}

#[test]
fn test_settlement_on_attested_outcome() {
    let (mut a, mut b, mut oracle) = funded_contract();
    let fixing_time = a.dlc().conditions.fixing_time;

    oracle.attest(fixing_time, vec![vec![1]]).unwrap();
    let attestation = oracle.signed_messages(fixing_time).unwrap();
    assert_eq!(a.fix_deal(&attestation).unwrap(), 0);
    assert_eq!(b.fix_deal(&attestation).unwrap(), 0);

    let cet = a.signed_cet().unwrap();
    let closing = a.closing_tx().unwrap();
    assert_eq!(closing.input[0].previous_output.txid, cet.compute_txid());

    let fee = closing_tx_fee(&a.dlc().conditions);
    assert_eq!(closing.output[0].value.to_sat(), 2 * BTC - fee);
    assert_eq!(closing_value(2 * BTC, fee).unwrap(), 2 * BTC - fee);

    // The closing signature only verifies under the key shifted by the commitment.
    let pubkey = a.dlc().pubkey(Party::First).unwrap();
    let commitment_point = a.dlc().commitment(0).unwrap();
    let witness = &closing.input[0].witness;
    let script = discreet_core::bitcoin::ScriptBuf::from_bytes(witness.nth(2).unwrap().to_vec());
    let der = witness.nth(0).unwrap();
    let sig = Signature::from_der(&der[..der.len() - 1]).unwrap();
    let shifted = pubkey.combine(&commitment_point).unwrap();
    assert!(verify_segwit_signature(&closing, 0, &script, 2 * BTC, &sig, &shifted).is_ok());
    assert!(verify_segwit_signature(&closing, 0, &script, 2 * BTC, &sig, &pubkey).is_err());

    let (cet_txid, closing_txid) = a.settle().unwrap();
    assert_eq!(cet_txid, cet.compute_txid());
    assert_eq!(closing_txid, closing.compute_txid());
    assert_eq!(a.stage(), Stage::Settled);
    assert_eq!(a.wallet().broadcasts().len(), 3);

    // The second party has nothing to execute under the fixed deal.
    assert_eq!(b.closing_tx().unwrap_err().kind(), ErrorKind::MalformedDeal);

    // Its own outcome stays locked: the published signature does not open it.
    let signature = commitment::sum_sigs(&attestation.signatures).unwrap();
    assert!(!commitment::verify(&b.dlc().commitment(1).unwrap(), &signature));
    let mut stale = attestation.clone();
    stale.messages = vec![vec![0]];
    assert!(matches!(b.fix_deal(&stale), Err(DlcError::OracleVerification(1))));
    assert!(a.settle().is_err());
}

#[test]
fn test_counterparty_fallback_on_unclaimed_cet() {
    let (a, b, _) = funded_contract();

    let tx = b.fallback_tx(0).unwrap();
    let witness = &tx.input[0].witness;
    assert_eq!(witness.len(), 3);
    assert!(witness.nth(1).unwrap().is_empty());
    assert_eq!(tx.output[0].script_pubkey, *b.dlc().payout_script(Party::Second).unwrap());
    assert_eq!(
        tx.output[0].value.to_sat(),
        2 * BTC - closing_tx_fee(&b.dlc().conditions)
    );

    assert_eq!(a.fallback_tx(1).unwrap().input[0].sequence.0, 144);
    assert!(matches!(b.fallback_tx(1), Err(DlcError::MalformedDeal(1))));
}

#[test]
fn test_refund_without_attestation() {
    let (mut a, b, _) = funded_contract();

    let refund = a.refund_tx().unwrap();
    assert_eq!(refund, b.refund_tx().unwrap());
    assert_eq!(refund.lock_time.to_consensus_u32(), 850_000);
    let values: Vec<u64> = refund.output.iter().map(|o| o.value.to_sat()).collect();
    assert_eq!(values, vec![BTC, BTC]);

    let before = a.wallet().balance();
    a.refund().unwrap();
    assert_eq!(a.stage(), Stage::Refunded);
    assert_eq!(a.wallet().balance(), before + BTC);
    assert!(a.refund().is_err());
}

#[test]
fn test_contract_record_is_stored_by_funding_txid() {
    let (a, b, _) = funded_contract();
    let mut store = MemoryStore::new();

    let id = a.save(&mut store).unwrap();
    assert_eq!(id, a.funding_tx().unwrap().compute_txid());
    assert_eq!(b.contract_id().unwrap(), id);

    let record = store.get(&id).unwrap().unwrap();
    assert_eq!(record.conditions, a.dlc().conditions);
    assert_eq!(record.pubkeys, b.dlc().pubkeys().unwrap());
    assert_eq!(store.list().unwrap(), vec![id]);
}

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use shroud_privacy::{
    Account, Amount, AssetId, Blake3Hasher, FieldElement, NoteCryptography, NoteRecord, NoteState,
    PoseidonHasher,
};

use super::{mock_session, note_for, params, publish, seal, usdc};
use crate::chain::{MemoryChain, MemoryLeafSource};
use crate::error::WalletError;
use crate::ledger::{Classification, ClassifiedNote};
use crate::session::{LedgerUpdate, MergeRequest, OperationRequest, WalletSession};
use crate::synthesis::Action;

fn rng() -> StdRng {
    StdRng::seed_from_u64(7)
}

#[tokio::test]
async fn transfer_plan_spends_the_biggest_note() {
    let (mut session, me, _chain) = mock_session(1);
    let source = MemoryLeafSource::new();
    publish(
        &source,
        &me,
        &[note_for(me.owner(), 3, 60, 1), note_for(me.owner(), 2, 40, 2)],
    );
    session.sync(&source).await.unwrap();
    assert_eq!(
        session.balance().ledger(&usdc()).unwrap().total_asset(),
        &Amount::from(100)
    );

    let them = FieldElement::from_u64(77);
    let recipient = shroud_privacy::Note::with_asset(
        Amount::zero(),
        usdc(),
        Amount::from(30),
        them,
        FieldElement::from_u64(5),
    )
    .unwrap();
    let plan = session
        .plan(&OperationRequest::transfer(usdc(), vec![recipient.clone()]), &mut rng())
        .unwrap();

    assert_eq!(plan.inputs.len(), 1);
    assert_eq!(plan.inputs[0].note.amount_of(&usdc()), Amount::from(60));
    assert_eq!(plan.fee, Amount::from(1));
    assert_eq!(plan.outputs[0], recipient);
    assert_eq!(plan.outputs[1].owner, me.owner());
    assert_eq!(plan.outputs[1].amount_of(&usdc()), Amount::from(30));
    assert_eq!(plan.outputs[1].native_amount(), Amount::from(2));
    assert_eq!(plan.output_commitments.len(), 2);
    assert!(plan.input_paths[0].verify(&plan.inputs[0].commitment, &plan.root, &Blake3Hasher));
}

#[tokio::test]
async fn reconcile_after_spend() {
    let (mut session, me, chain) = mock_session(1);
    let source = MemoryLeafSource::new();
    publish(
        &source,
        &me,
        &[note_for(me.owner(), 3, 60, 1), note_for(me.owner(), 2, 40, 2)],
    );
    session.sync(&source).await.unwrap();

    let spent = session
        .balance()
        .unspent_records(&usdc())
        .find(|r| r.note.amount_of(&usdc()) == Amount::from(60))
        .unwrap()
        .clone();
    chain.publish_nullifier(spent.nullifier);

    assert_eq!(session.reconcile().await.unwrap(), 1);
    assert_eq!(
        session.balance().ledger(&usdc()).unwrap().total_asset(),
        &Amount::from(40)
    );
    assert_eq!(session.reconcile().await.unwrap(), 0);
    assert!(session.balance().is_consistent());
}

#[tokio::test]
async fn reconcile_transport_failure_changes_nothing() {
    let (mut session, me, chain) = mock_session(1);
    let source = MemoryLeafSource::new();
    publish(&source, &me, &[note_for(me.owner(), 3, 60, 1)]);
    session.sync(&source).await.unwrap();

    let before = session.balance().clone();
    let record = session.balance().unspent_records(&usdc()).next().unwrap().clone();
    chain.publish_nullifier(record.nullifier);
    chain.set_failing(true);

    assert!(matches!(
        session.reconcile().await,
        Err(WalletError::Transport(_))
    ));
    assert_eq!(session.balance(), &before);
}

#[tokio::test]
async fn queued_notes_settle_through_reconcile() {
    let (mut session, me, chain) = mock_session(1);
    let source = MemoryLeafSource::new();
    let note = note_for(me.owner(), 10, 0, 3);
    let (commitment, _) = seal(&*me, &note, &Blake3Hasher);
    chain.queue_insertion(commitment);
    publish(&source, &me, &[note]);
    session.sync(&source).await.unwrap();

    assert_eq!(session.balance().count(NoteState::Queued), 1);
    let send = OperationRequest::transfer(
        AssetId::NATIVE,
        vec![note_for(FieldElement::from_u64(8), 4, 0, 9)],
    );
    assert!(matches!(
        session.plan(&send, &mut rng()),
        Err(WalletError::InsufficientFunds { .. })
    ));

    chain.complete_insertion(&commitment);
    assert_eq!(session.reconcile().await.unwrap(), 1);
    assert_eq!(session.balance().total_native(), Amount::from(10));
    assert!(session.plan(&send, &mut rng()).is_ok());
}

#[tokio::test]
async fn fund_and_withdraw_plans() {
    let (mut session, me, _chain) = mock_session(1);

    let deposit = note_for(me.owner(), 5, 100, 1);
    let fund =
        OperationRequest::fund(usdc(), Amount::from(5), Amount::from(100), vec![deposit.clone()]);
    let plan = session.plan(&fund, &mut rng()).unwrap();
    assert!(plan.inputs.is_empty());
    assert_eq!(plan.outputs, vec![deposit.clone()]);
    assert_eq!(plan.fee, Amount::zero());

    let source = MemoryLeafSource::new();
    publish(&source, &me, &[deposit]);
    session.sync(&source).await.unwrap();

    let withdraw = OperationRequest::withdraw(usdc(), Amount::zero(), Amount::from(100));
    let plan = session.plan(&withdraw, &mut rng()).unwrap();
    assert_eq!(plan.action, Action::Withdraw);
    assert_eq!(plan.inputs.len(), 1);
    assert_eq!(plan.outputs.len(), 1);
    assert_eq!(plan.outputs[0].assets, vec![AssetId::NATIVE]);
    assert_eq!(plan.outputs[0].native_amount(), Amount::from(4));

    let too_much = OperationRequest::withdraw(usdc(), Amount::zero(), Amount::from(101));
    assert_eq!(
        session.plan(&too_much, &mut rng()).unwrap_err(),
        WalletError::InsufficientFunds {
            asset: usdc(),
            requested: Amount::from(101),
            available: Amount::from(100),
        }
    );
}

#[tokio::test]
async fn merge_collapses_native_notes() {
    let (mut session, me, _chain) = mock_session(1);
    let source = MemoryLeafSource::new();
    publish(
        &source,
        &me,
        &[
            note_for(me.owner(), 5, 0, 1),
            note_for(me.owner(), 6, 0, 2),
            note_for(me.owner(), 7, 0, 3),
        ],
    );
    session.sync(&source).await.unwrap();

    let plan = session
        .plan_merge(
            &MergeRequest {
                asset: AssetId::NATIVE,
                commitments: None,
                fee: None,
            },
            &mut rng(),
        )
        .unwrap();
    assert_eq!(plan.inputs.len(), 3);
    assert_eq!(plan.outputs.len(), 1);
    assert_eq!(plan.outputs[0].native_amount(), Amount::from(17));
    assert_eq!(plan.input_paths.len(), 3);
}

#[tokio::test]
async fn snapshot_round_trip() {
    let (mut session, me, chain) = mock_session(1);
    let source = MemoryLeafSource::new();
    publish(
        &source,
        &me,
        &[note_for(me.owner(), 3, 60, 1), note_for(me.owner(), 9, 0, 2)],
    );
    session.sync(&source).await.unwrap();

    let json = session.snapshot().to_json().unwrap();
    let snapshot = crate::snapshot::WalletSnapshot::from_json(&json).unwrap();
    let restored: super::MockSession =
        WalletSession::restore(snapshot.clone(), me.clone(), chain.clone(), Blake3Hasher, params())
            .unwrap();
    assert_eq!(restored.root(), session.root());
    assert_eq!(restored.balance(), session.balance());
    assert_eq!(restored.tree().len(), 2);

    let mut deeper = params();
    deeper.tree_depth = 5;
    let err = super::MockSession::restore(snapshot, me, chain, Blake3Hasher, deeper)
        .err()
        .unwrap();
    assert!(matches!(err, WalletError::Snapshot(_)));
}

#[tokio::test]
async fn account_with_poseidon_end_to_end() {
    let hasher = PoseidonHasher::default();
    let account = Arc::new(Account::from_seed(&[7u8; 32], hasher.clone()));
    let chain = Arc::new(MemoryChain::new());
    let mut session =
        WalletSession::new(account.clone(), chain.clone(), hasher.clone(), params()).unwrap();

    let stranger = Account::from_seed(&[8u8; 32], hasher.clone());
    let mine = note_for(account.owner(), 12, 0, 1);
    let theirs = note_for(stranger.owner(), 4, 0, 2);
    let (c0, p0) = seal(&*account, &mine, &hasher);
    let (c1, p1) = seal(&stranger, &theirs, &hasher);
    let source = MemoryLeafSource::new();
    source.push_pair([c0, c1], [p0, p1]);

    let report = session.sync(&source).await.unwrap();
    assert_eq!(report.owned, 1);
    assert_eq!(report.new_leaves, 2);
    assert_eq!(session.balance().total_native(), Amount::from(12));

    let record = session.balance().unspent_records(&AssetId::NATIVE).next().unwrap().clone();
    assert_eq!(record.nullifier, account.nullifier(&record.note).unwrap());

    let send = OperationRequest::transfer(
        AssetId::NATIVE,
        vec![note_for(stranger.owner(), 5, 0, 3)],
    );
    let plan = session.plan(&send, &mut rng()).unwrap();
    assert!(plan.input_paths[0].verify(&c0, &plan.root, &hasher));
    assert_eq!(plan.outputs[1].native_amount(), Amount::from(6));
}

#[tokio::test]
async fn scan_payload_picks_up_a_missed_note() {
    let (mut session, me, _chain) = mock_session(1);
    let stranger = shroud_privacy::MockCryptography::new(999);
    let mine = note_for(me.owner(), 8, 0, 1);
    let filler = note_for(stranger.owner(), 1, 0, 2);

    // leaf 0 was announced under the wrong key
    let (c0, wrong) = seal(&stranger, &mine, &Blake3Hasher);
    let (c1, p1) = seal(&stranger, &filler, &Blake3Hasher);
    let source = MemoryLeafSource::new();
    source.push_pair([c0, c1], [wrong, p1]);
    session.sync(&source).await.unwrap();
    assert_eq!(session.balance().count(NoteState::Unspent), 0);

    let (_, payload) = seal(&*me, &mine, &Blake3Hasher);
    let class = session.scan_payload(&payload, 0).await.unwrap();
    assert!(matches!(class, Classification::Owned(_)));
    assert_eq!(session.balance().total_native(), Amount::from(8));

    assert!(matches!(
        session.scan_payload(&payload, 5).await,
        Err(WalletError::Privacy(
            shroud_privacy::PrivacyError::IndexOutOfRange { index: 5, len: 2 }
        ))
    ));
}

#[tokio::test]
async fn fund_credit_pays_the_fee() {
    let (session, me, _chain) = mock_session(1);
    let deposit = note_for(me.owner(), 5, 100, 1);
    let fund = OperationRequest::fund(usdc(), Amount::from(10), Amount::from(100), vec![deposit])
        .with_fee(Amount::from(2));

    let plan = session.plan(&fund, &mut rng()).unwrap();
    assert!(plan.inputs.is_empty());
    assert_eq!(plan.fee, Amount::from(2));
    assert_eq!(plan.outputs.len(), 2);
    assert_eq!(plan.outputs[1].assets, vec![AssetId::NATIVE]);
    assert_eq!(plan.outputs[1].native_amount(), Amount::from(3));

    // the credit no longer covers the fee, so a note has to
    let short = OperationRequest::fund(
        usdc(),
        Amount::from(6),
        Amount::from(100),
        vec![note_for(me.owner(), 5, 100, 2)],
    )
    .with_fee(Amount::from(2));
    assert_eq!(
        session.plan(&short, &mut rng()).unwrap_err(),
        WalletError::InsufficientFunds {
            asset: AssetId::NATIVE,
            requested: Amount::from(1),
            available: Amount::zero(),
        }
    );
}

#[tokio::test]
async fn spent_notes_stay_spent_across_commits() {
    let (mut session, me, _chain) = mock_session(1);
    let note = note_for(me.owner(), 9, 0, 1).with_leaf_index(0);
    let record = NoteRecord {
        commitment: note.commitment(&Blake3Hasher).unwrap(),
        nullifier: me.nullifier(&note).unwrap(),
        note,
    };
    let classified = |state| ClassifiedNote {
        asset: AssetId::NATIVE,
        state,
        record: record.clone(),
    };

    session
        .commit(LedgerUpdate {
            classified: vec![classified(NoteState::Spent)],
            ..Default::default()
        })
        .unwrap();
    let summary = session
        .commit(LedgerUpdate {
            classified: vec![classified(NoteState::Unspent), classified(NoteState::Queued)],
            ..Default::default()
        })
        .unwrap();

    assert_eq!(summary.added, 0);
    assert_eq!(session.balance().count(NoteState::Spent), 1);
    assert_eq!(session.balance().count(NoteState::Unspent), 0);
    assert_eq!(session.balance().count(NoteState::Queued), 0);
    assert_eq!(session.balance().total_native(), Amount::zero());
}

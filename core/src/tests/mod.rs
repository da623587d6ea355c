mod session;

use std::sync::Arc;

use shroud_privacy::{
    Amount, AssetId, Blake3Hasher, Commitment, EncryptedNote, FieldElement, HashFn,
    MockCryptography, Note, NoteCryptography,
};

use crate::chain::{MemoryChain, MemoryLeafSource};
use crate::params::WalletParams;
use crate::session::WalletSession;

pub(crate) type MockSession = WalletSession<MockCryptography, Arc<MemoryChain>, Blake3Hasher>;

pub(crate) fn usdc() -> AssetId {
    AssetId([9u8; 32])
}

/// Depth 4, 2-in/2-out, fee 1
pub(crate) fn params() -> WalletParams {
    WalletParams {
        tree_depth: 4,
        relayer_fee: Amount::from(1),
        max_concurrency: 3,
        ..WalletParams::default()
    }
}

pub(crate) fn mock_session(id: u64) -> (MockSession, Arc<MockCryptography>, Arc<MemoryChain>) {
    let me = Arc::new(MockCryptography::new(id));
    let chain = Arc::new(MemoryChain::new());
    let session = WalletSession::new(me.clone(), chain.clone(), Blake3Hasher, params()).unwrap();
    (session, me, chain)
}

/// A note for `owner` with a blinding derived from `salt`
pub(crate) fn note_for(owner: FieldElement, native: u64, asset: u64, salt: u64) -> Note {
    let blinding = FieldElement::from_u64(salt);
    if asset == 0 {
        Note::native(Amount::from(native), owner, blinding).unwrap()
    } else {
        Note::with_asset(Amount::from(native), usdc(), Amount::from(asset), owner, blinding)
            .unwrap()
    }
}

/// Commitment and payload of `note`, sealed for `recipient`
pub(crate) fn seal<C, H>(
    recipient: &C,
    note: &Note,
    hasher: &H,
) -> (Commitment, EncryptedNote)
where
    C: NoteCryptography + ?Sized,
    H: HashFn,
{
    let commitment = note.commitment(hasher).unwrap();
    let payload = recipient
        .encrypt(note, &recipient.encryption_public_key())
        .unwrap();
    (commitment, payload)
}

/// Publish `notes` for `recipient` as pairs, padding with a foreign note
pub(crate) fn publish(source: &MemoryLeafSource, recipient: &MockCryptography, notes: &[Note]) {
    let stranger = MockCryptography::new(999);
    let mut sealed: Vec<(Commitment, EncryptedNote)> = notes
        .iter()
        .map(|n| seal(recipient, n, &Blake3Hasher))
        .collect();
    if sealed.len() % 2 == 1 {
        let filler = note_for(stranger.owner(), 1, 0, 4242 + sealed.len() as u64);
        sealed.push(seal(&stranger, &filler, &Blake3Hasher));
    }
    for pair in sealed.chunks(2) {
        source.push_pair(
            [pair[0].0, pair[1].0],
            [pair[0].1.clone(), pair[1].1.clone()],
        );
    }
}

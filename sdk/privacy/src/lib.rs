//! Shroud Privacy SDK
//!
//! Note, commitment and tree primitives for a shielded-pool wallet.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Shielded Note                            │
//! │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────────┐  │
//! │  │  Nullifier   │  │  Commitment  │  │   Encrypted Payload   │  │
//! │  │  (spend tag) │  │  (tree leaf) │  │   (for recipient)     │  │
//! │  └──────────────┘  └──────────────┘  └───────────────────────┘  │
//! │         │                 │                     │               │
//! │         ▼                 ▼                     ▼               │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │ NoteCryptography (Account / MockCryptography)           │    │
//! │  │ MerkleMirror<H: HashFn> (inclusion paths)               │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod account;
pub mod commitment;
pub mod crypto;
pub mod encryption;
pub mod error;
pub mod field;
pub mod hash;
pub mod merkle;
pub mod mock;
pub mod note;
pub mod nullifier;

pub use account::Account;
pub use commitment::Commitment;
pub use crypto::{NoteCryptography, TrialDecryption};
pub use encryption::{EncryptedNote, encrypt_note, try_decrypt_note};
pub use error::{PrivacyError, Result};
pub use field::{Amount, AssetId, FieldElement, field_modulus};
pub use hash::{Blake3Hasher, HashFn, PoseidonHasher};
pub use merkle::{MAX_TREE_DEPTH, MerkleMirror, MerklePath, TreeSnapshot};
pub use mock::MockCryptography;
pub use note::{MAX_NOTE_ASSETS, Note, NoteRecord, NoteState};
pub use nullifier::{Nullifier, NullifierKey};

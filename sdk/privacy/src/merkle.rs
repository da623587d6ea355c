//! Merkle Mirror
//!
//! Client copy of the pool's append-only commitment tree, sufficient to
//! produce inclusion paths for owned notes.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               C0  C1 C2   z0     z0 = zero filler of level 0
//! ```
//!
//! Levels are stored densely: `layers[0]` holds the leaves in insertion
//! order, and `layers[l + 1][i] = H(layers[l][2i], layers[l][2i + 1])` with the
//! level's zero filler standing in for a missing right child. Cost is
//! proportional to the number of real leaves, not the capacity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::commitment::Commitment;
use crate::error::{PrivacyError, Result};
use crate::field::FieldElement;
use crate::hash::HashFn;

/// Largest supported tree depth
pub const MAX_TREE_DEPTH: usize = 32;

/// A Merkle path proving inclusion of a leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// Sibling hashes from leaf to root
    pub siblings: Vec<FieldElement>,
    /// Position bits (false = node is the left child, true = right)
    pub path_bits: Vec<bool>,
    /// The leaf index
    pub index: u64,
}

impl MerklePath {
    /// Fold the leaf up through the siblings
    pub fn compute_root<H: HashFn + ?Sized>(&self, leaf: &Commitment, hasher: &H) -> FieldElement {
        let mut current = leaf.to_element();
        for (sibling, is_right) in self.siblings.iter().zip(&self.path_bits) {
            current = if *is_right {
                hasher.hash2(sibling, &current)
            } else {
                hasher.hash2(&current, sibling)
            };
        }
        current
    }

    /// Verify that this path proves inclusion of `leaf` under `root`
    pub fn verify<H: HashFn + ?Sized>(
        &self,
        leaf: &Commitment,
        root: &FieldElement,
        hasher: &H,
    ) -> bool {
        self.compute_root(leaf, hasher) == *root
    }
}

/// Persisted form of a [`MerkleMirror`]
///
/// Every level is stored so that restoring never recomputes a hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSnapshot {
    pub depth: usize,
    /// Zero filler per level, `depth + 1` entries
    pub zeros: Vec<FieldElement>,
    /// Node values per level, `depth + 1` entries; `layers[0]` are the leaves
    pub layers: Vec<Vec<FieldElement>>,
}

/// Incremental replica of the commitment tree
pub struct MerkleMirror<H> {
    depth: usize,
    zeros: Vec<FieldElement>,
    layers: Vec<Vec<FieldElement>>,
    positions: HashMap<Commitment, u64>,
    hasher: H,
}

impl<H: HashFn> MerkleMirror<H> {
    /// Create an empty tree, precomputing one zero filler per level
    pub fn new(depth: usize, zero_value: FieldElement, hasher: H) -> Result<Self> {
        check_depth(depth)?;

        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(zero_value);
        for level in 0..depth {
            let z = zeros[level];
            zeros.push(hasher.hash2(&z, &z));
        }

        Ok(Self {
            depth,
            zeros,
            layers: vec![Vec::new(); depth + 1],
            positions: HashMap::new(),
            hasher,
        })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn capacity(&self) -> u64 {
        1u64 << self.depth
    }

    /// Number of leaves inserted so far
    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Zero filler of `level`
    pub fn zero(&self, level: usize) -> Option<&FieldElement> {
        self.zeros.get(level)
    }

    /// Current root, or the top-level zero filler when empty
    pub fn root(&self) -> FieldElement {
        self.layers[self.depth]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth])
    }

    pub fn leaf(&self, index: u64) -> Option<Commitment> {
        self.layers[0]
            .get(index as usize)
            .map(|fe| Commitment::from_element(*fe))
    }

    /// Index of the first occurrence of `leaf`
    pub fn index_of(&self, leaf: &Commitment) -> Option<u64> {
        self.positions.get(leaf).copied()
    }

    /// Append a leaf and recompute its path to the root
    pub fn insert(&mut self, leaf: Commitment) -> Result<u64> {
        let index = self.len();
        if index >= self.capacity() {
            return Err(PrivacyError::CapacityExceeded {
                capacity: self.capacity(),
                requested: index + 1,
            });
        }
        self.layers[0].push(leaf.to_element());
        self.positions.entry(leaf).or_insert(index);
        self.recompute_path(index);
        Ok(index)
    }

    /// Append many leaves, then rebuild every level once
    ///
    /// Nothing is inserted if the batch does not fit.
    pub fn bulk_insert(&mut self, leaves: &[Commitment]) -> Result<u64> {
        let first = self.len();
        let requested = first + leaves.len() as u64;
        if requested > self.capacity() {
            return Err(PrivacyError::CapacityExceeded {
                capacity: self.capacity(),
                requested,
            });
        }
        if leaves.is_empty() {
            return Ok(first);
        }

        for (offset, leaf) in leaves.iter().enumerate() {
            self.layers[0].push(leaf.to_element());
            self.positions.entry(*leaf).or_insert(first + offset as u64);
        }
        self.rebuild();
        Ok(first)
    }

    /// Replace the leaf at `index` and recompute its path
    pub fn update(&mut self, index: u64, leaf: Commitment) -> Result<()> {
        self.check_index(index)?;
        let slot = index as usize;
        let old = Commitment::from_element(self.layers[0][slot]);
        self.layers[0][slot] = leaf.to_element();
        if self.positions.get(&old) == Some(&index) {
            self.positions.remove(&old);
            // the same value may also sit further right
            let value = old.to_element();
            if let Some(next) = self.layers[0].iter().position(|e| *e == value) {
                self.positions.insert(old, next as u64);
            }
        }
        let first = self.positions.entry(leaf).or_insert(index);
        *first = (*first).min(index);
        self.recompute_path(index);
        Ok(())
    }

    /// Inclusion path for the leaf at `index`
    pub fn path(&self, index: u64) -> Result<MerklePath> {
        self.check_index(index)?;

        let mut siblings = Vec::with_capacity(self.depth);
        let mut path_bits = Vec::with_capacity(self.depth);
        let mut current = index as usize;

        for level in 0..self.depth {
            path_bits.push(current & 1 == 1);
            siblings.push(self.node(level, current ^ 1));
            current >>= 1;
        }

        Ok(MerklePath {
            siblings,
            path_bits,
            index,
        })
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            depth: self.depth,
            zeros: self.zeros.clone(),
            layers: self.layers.clone(),
        }
    }

    /// Rebuild a mirror from a snapshot without recomputing any hash
    ///
    /// Only the shape is checked: depth, filler count, capacity and the
    /// length of every level against the one below it.
    pub fn restore(snapshot: TreeSnapshot, hasher: H) -> Result<Self> {
        let TreeSnapshot {
            depth,
            zeros,
            layers,
        } = snapshot;
        check_depth(depth).map_err(|e| PrivacyError::Snapshot(e.to_string()))?;

        if zeros.len() != depth + 1 {
            return Err(PrivacyError::Snapshot(format!(
                "expected {} zero fillers, found {}",
                depth + 1,
                zeros.len()
            )));
        }
        if layers.len() != depth + 1 {
            return Err(PrivacyError::Snapshot(format!(
                "expected {} levels, found {}",
                depth + 1,
                layers.len()
            )));
        }
        let capacity = 1u64 << depth;
        if layers[0].len() as u64 > capacity {
            return Err(PrivacyError::Snapshot(format!(
                "{} leaves exceed capacity {}",
                layers[0].len(),
                capacity
            )));
        }
        for level in 1..=depth {
            let expected = layers[level - 1].len().div_ceil(2);
            if layers[level].len() != expected {
                return Err(PrivacyError::Snapshot(format!(
                    "level {} holds {} nodes, expected {}",
                    level,
                    layers[level].len(),
                    expected
                )));
            }
        }

        let mut positions = HashMap::with_capacity(layers[0].len());
        for (i, fe) in layers[0].iter().enumerate() {
            positions
                .entry(Commitment::from_element(*fe))
                .or_insert(i as u64);
        }

        Ok(Self {
            depth,
            zeros,
            layers,
            positions,
            hasher,
        })
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.len() {
            return Err(PrivacyError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(())
    }

    fn node(&self, level: usize, index: usize) -> FieldElement {
        self.layers[level]
            .get(index)
            .copied()
            .unwrap_or(self.zeros[level])
    }

    fn recompute_path(&mut self, index: u64) {
        let mut current = index as usize;
        for level in 0..self.depth {
            let left = self.node(level, current & !1);
            let right = self.node(level, current | 1);
            let parent = self.hasher.hash2(&left, &right);

            current >>= 1;
            let above = &mut self.layers[level + 1];
            if current < above.len() {
                above[current] = parent;
            } else {
                above.push(parent);
            }
        }
    }

    fn rebuild(&mut self) {
        for level in 0..self.depth {
            let zero = self.zeros[level];
            let next: Vec<FieldElement> = self.layers[level]
                .chunks(2)
                .map(|pair| self.hasher.hash2(&pair[0], pair.get(1).unwrap_or(&zero)))
                .collect();
            self.layers[level + 1] = next;
        }
    }
}

impl<H> std::fmt::Debug for MerkleMirror<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerkleMirror")
            .field("depth", &self.depth)
            .field("len", &self.layers[0].len())
            .finish_non_exhaustive()
    }
}

fn check_depth(depth: usize) -> Result<()> {
    if depth == 0 || depth > MAX_TREE_DEPTH {
        return Err(PrivacyError::validation(format!(
            "tree depth must be in 1..={MAX_TREE_DEPTH}, got {depth}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{Blake3Hasher, PoseidonHasher};

    fn leaf(i: u64) -> Commitment {
        Commitment::from_element(FieldElement::from_u64(1000 + i))
    }

    fn mirror(depth: usize) -> MerkleMirror<Blake3Hasher> {
        MerkleMirror::new(depth, FieldElement::from_u64(7), Blake3Hasher).unwrap()
    }

    #[test]
    fn test_empty_tree() {
        let tree = mirror(5);
        assert_eq!(tree.len(), 0);
        assert_eq!(tree.capacity(), 32);
        assert_eq!(tree.root(), *tree.zero(5).unwrap());
        assert!(matches!(
            tree.path(0),
            Err(PrivacyError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn test_rejects_bad_depth() {
        assert!(MerkleMirror::new(0, FieldElement::ZERO, Blake3Hasher).is_err());
        assert!(MerkleMirror::new(33, FieldElement::ZERO, Blake3Hasher).is_err());
    }

    #[test]
    fn test_every_path_recomputes_root() {
        let mut tree = mirror(4);
        for i in 0..11 {
            assert_eq!(tree.insert(leaf(i)).unwrap(), i);
        }
        let root = tree.root();
        for i in 0..11 {
            let path = tree.path(i).unwrap();
            assert_eq!(path.siblings.len(), 4);
            assert!(path.verify(&leaf(i), &root, &Blake3Hasher), "leaf {i}");
        }
        assert!(!tree.path(3).unwrap().verify(&leaf(4), &root, &Blake3Hasher));
    }

    #[test]
    fn test_bulk_insert_matches_incremental() {
        let leaves: Vec<_> = (0..13).map(leaf).collect();

        let mut incremental = mirror(6);
        for l in &leaves {
            incremental.insert(*l).unwrap();
        }

        let mut bulk = mirror(6);
        bulk.insert(leaves[0]).unwrap();
        assert_eq!(bulk.bulk_insert(&leaves[1..]).unwrap(), 1);

        assert_eq!(bulk.root(), incremental.root());
        assert_eq!(bulk.snapshot(), incremental.snapshot());
    }

    #[test]
    fn test_capacity_exceeded() {
        let mut tree = mirror(2);
        for i in 0..4 {
            tree.insert(leaf(i)).unwrap();
        }
        assert_eq!(
            tree.insert(leaf(4)),
            Err(PrivacyError::CapacityExceeded {
                capacity: 4,
                requested: 5
            })
        );
    }

    #[test]
    fn test_bulk_insert_is_atomic() {
        let mut tree = mirror(2);
        tree.insert(leaf(0)).unwrap();
        let root = tree.root();

        let batch: Vec<_> = (1..5).map(leaf).collect();
        assert!(tree.bulk_insert(&batch).is_err());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), root);
    }

    #[test]
    fn test_update_recomputes_path() {
        let mut tree = mirror(3);
        for i in 0..5 {
            tree.insert(leaf(i)).unwrap();
        }
        let before = tree.root();

        tree.update(2, leaf(99)).unwrap();
        assert_ne!(tree.root(), before);
        assert_eq!(tree.leaf(2), Some(leaf(99)));
        assert_eq!(tree.index_of(&leaf(99)), Some(2));
        assert_eq!(tree.index_of(&leaf(2)), None);
        assert!(tree.path(2).unwrap().verify(&leaf(99), &tree.root(), &Blake3Hasher));

        assert!(matches!(
            tree.update(5, leaf(1)),
            Err(PrivacyError::IndexOutOfRange { index: 5, len: 5 })
        ));
    }

    #[test]
    fn test_update_keeps_duplicate_leaves_indexed() {
        let mut tree = mirror(3);
        for c in [leaf(7), leaf(1), leaf(7), leaf(2)] {
            tree.insert(c).unwrap();
        }
        assert_eq!(tree.index_of(&leaf(7)), Some(0));

        tree.update(0, leaf(5)).unwrap();
        assert_eq!(tree.index_of(&leaf(7)), Some(2));
        assert_eq!(tree.index_of(&leaf(5)), Some(0));

        tree.update(3, leaf(5)).unwrap();
        assert_eq!(tree.index_of(&leaf(5)), Some(0));
        assert_eq!(tree.index_of(&leaf(2)), None);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut tree = mirror(8);
        for i in 0..9 {
            tree.insert(leaf(i)).unwrap();
        }

        let json = serde_json::to_string(&tree.snapshot()).unwrap();
        let snapshot: TreeSnapshot = serde_json::from_str(&json).unwrap();
        let restored = MerkleMirror::restore(snapshot, Blake3Hasher).unwrap();

        assert_eq!(restored.root(), tree.root());
        assert_eq!(restored.len(), 9);
        assert_eq!(restored.index_of(&leaf(4)), Some(4));
        assert_eq!(restored.path(6).unwrap(), tree.path(6).unwrap());
    }

    #[test]
    fn test_restore_rejects_inconsistent_shape() {
        let mut tree = mirror(3);
        tree.insert(leaf(0)).unwrap();
        tree.insert(leaf(1)).unwrap();

        let mut snapshot = tree.snapshot();
        snapshot.layers[1].push(FieldElement::ZERO);
        assert!(matches!(
            MerkleMirror::restore(snapshot, Blake3Hasher),
            Err(PrivacyError::Snapshot(_))
        ));

        let mut snapshot = tree.snapshot();
        snapshot.zeros.pop();
        assert!(MerkleMirror::restore(snapshot, Blake3Hasher).is_err());
    }

    #[test]
    fn test_poseidon_tree() {
        let mut tree = MerkleMirror::new(3, FieldElement::ZERO, PoseidonHasher::new()).unwrap();
        tree.insert(leaf(0)).unwrap();
        tree.insert(leaf(1)).unwrap();
        let path = tree.path(1).unwrap();
        assert!(path.verify(&leaf(1), &tree.root(), tree.hasher()));
    }
}

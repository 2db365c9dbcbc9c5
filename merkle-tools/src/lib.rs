//! Merkle tree over serialized cross-chain messages.
//!
//! Leaves are hashed with a `0x00` prefix and branches with a `0x01` prefix.
//! The tree is padded with empty-hash leaves to the next power of two, so
//! every node covers an aligned power-of-two range of leaf positions. A
//! *right witness* for a leaf prefix `[0, idx)` is the list of node hashes
//! covering `[idx, width)` from left to right; together with the prefix it
//! recomputes the root.

pub use interop_types::hash::{sha256, H256};

const LEAF_PREFIX: u8 = 0x00;
const BRANCH_PREFIX: u8 = 0x01;

#[must_use]
pub fn empty_hash() -> H256 {
    sha256(&[])
}

fn leaf_hash(data: &[u8]) -> H256 {
    let mut input = Vec::with_capacity(1 + data.len());
    input.push(LEAF_PREFIX);
    input.extend_from_slice(data);
    sha256(&input)
}

fn branch_hash(left: &H256, right: &H256) -> H256 {
    let mut input = Vec::with_capacity(1 + 2 * H256::LENGTH);
    input.push(BRANCH_PREFIX);
    input.extend(left.0);
    input.extend(right.0);
    sha256(&input)
}

fn padded_leaf_hashes(leaves: &[Vec<u8>]) -> Vec<H256> {
    let width = leaves.len().next_power_of_two().max(1);
    let mut hashes: Vec<H256> = leaves.iter().map(|leaf| leaf_hash(leaf)).collect();
    hashes.resize(width, empty_hash());
    hashes
}

fn subtree_root(hashes: &[H256], start: usize, size: usize) -> H256 {
    if size == 1 {
        return hashes[start].clone();
    }
    let half = size / 2;
    branch_hash(
        &subtree_root(hashes, start, half),
        &subtree_root(hashes, start + half, half),
    )
}

#[must_use]
pub fn calculate_merkle_root(leaves: &[Vec<u8>]) -> H256 {
    if leaves.is_empty() {
        return empty_hash();
    }
    let hashes = padded_leaf_hashes(leaves);
    let width = hashes.len();
    subtree_root(&hashes, 0, width)
}

/// Node hashes covering leaf positions `[idx, width)` from left to right.
/// Empty when `idx` already covers the padded width.
#[must_use]
pub fn calculate_right_witness(leaves: &[Vec<u8>], idx: usize) -> Vec<H256> {
    let hashes = padded_leaf_hashes(leaves);
    let width = hashes.len();
    if idx >= width {
        return Vec::new();
    }
    if idx == 0 {
        return vec![subtree_root(&hashes, 0, width)];
    }

    let mut witness = Vec::new();
    let mut offset = idx;
    while offset < width {
        // Largest aligned subtree starting at offset
        let size = 1 << offset.trailing_zeros();
        witness.push(subtree_root(&hashes, offset, size));
        offset += size;
    }
    witness
}

/// Recompute the root from the first `idx` leaves and a right witness
/// produced by [`calculate_right_witness`] over the full leaf set.
#[must_use]
pub fn calculate_root_from_right_witness(
    idx: usize,
    prefix_leaves: &[Vec<u8>],
    witness: &[H256],
) -> H256 {
    if idx == 0 {
        return witness.first().cloned().unwrap_or_else(empty_hash);
    }

    let hashes: Vec<H256> = prefix_leaves[..idx]
        .iter()
        .map(|leaf| leaf_hash(leaf))
        .collect();

    // Peaks of the prefix: aligned subtrees sized by the binary
    // decomposition of idx, largest first.
    let mut peaks: Vec<(H256, usize)> = Vec::new();
    let mut start = 0usize;
    let mut bit = idx.next_power_of_two();
    if bit > idx {
        bit >>= 1;
    }
    while bit > 0 {
        if idx & bit != 0 {
            peaks.push((subtree_root(&hashes, start, bit), bit));
            start += bit;
        }
        bit >>= 1;
    }

    let (mut acc, mut size) = peaks.pop().expect("idx > 0 yields at least one peak");
    let mut offset = idx - size;

    for right in witness {
        // Climb while the accumulator is a right child: its left sibling is
        // the next prefix peak.
        while (offset / size) % 2 == 1 {
            let (peak, _) = peaks.pop().expect("right child has a peak sibling");
            acc = branch_hash(&peak, &acc);
            offset -= size;
            size *= 2;
        }
        acc = branch_hash(&acc, right);
        size *= 2;
    }

    // Witness exhausted: the accumulator reaches the padded width and the
    // remaining peaks merge in as left siblings.
    while let Some((peak, _)) = peaks.pop() {
        acc = branch_hash(&peak, &acc);
    }

    acc
}

//! # Merkle Mountain Range over Integrity Hashes
//!
//! Integrity snapshots commit to every sealed row of the store with a single
//! root. The accumulator is a Merkle Mountain Range: appending rows never
//! rewrites existing subtrees, and any single row can be proven included
//! with a logarithmic path.
//!
//! Hashing is domain-separated SHA-256:
//! - leaf: `SHA256(0x00 || integrity_hash)`
//! - node: `SHA256(0x01 || left || right)`
//!
//! Peaks are bagged right to left:
//! `bag = peaks[last]; for p in peaks[..last].rev() { bag = node(p, bag) }`.

use cmate_core::{tagged_digest, ContentDigest, CryptoError};
use serde::{Deserialize, Serialize};

/// Root of an accumulator with no leaves.
pub const EMPTY_ROOT: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Leaf hash of a row's `integrity_hash`.
pub fn leaf_hash(integrity_hash: &str) -> Result<String, CryptoError> {
    let leaf = ContentDigest::from_hex(integrity_hash)?;
    Ok(tagged_digest(0x00, &[&leaf]).to_hex())
}

/// Parent hash of two subtree roots.
pub fn node_hash(left: &str, right: &str) -> Result<String, CryptoError> {
    let l = ContentDigest::from_hex(left)?;
    let r = ContentDigest::from_hex(right)?;
    Ok(tagged_digest(0x01, &[&l, &r]).to_hex())
}

/// Root of one perfect subtree of the range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peak {
    /// Subtree height; 0 is a single leaf.
    pub height: u32,
    /// Subtree root, hex.
    pub hash: String,
}

/// Fold leaf hashes, in append order, into peaks.
pub fn build_peaks(leaf_hashes: &[String]) -> Result<Vec<Peak>, CryptoError> {
    let mut peaks: Vec<Peak> = Vec::new();
    for leaf in leaf_hashes {
        let mut cur = Peak {
            height: 0,
            hash: ContentDigest::from_hex(leaf)?.to_hex(),
        };
        while let Some(top) = peaks.pop() {
            if top.height != cur.height {
                peaks.push(top);
                break;
            }
            cur = Peak {
                height: cur.height + 1,
                hash: node_hash(&top.hash, &cur.hash)?,
            };
        }
        peaks.push(cur);
    }
    Ok(peaks)
}

/// Bag peaks into a single root; [`EMPTY_ROOT`] when there are none.
pub fn bag_peaks(peaks: &[Peak]) -> Result<String, CryptoError> {
    let Some((last, rest)) = peaks.split_last() else {
        return Ok(EMPTY_ROOT.to_string());
    };
    let mut bag = last.hash.clone();
    for peak in rest.iter().rev() {
        bag = node_hash(&peak.hash, &bag)?;
    }
    Ok(bag)
}

/// Accumulator root over a sequence of integrity hashes.
pub fn mmr_root(integrity_hashes: &[String]) -> Result<String, CryptoError> {
    let leaves = integrity_hashes
        .iter()
        .map(|h| leaf_hash(h))
        .collect::<Result<Vec<_>, _>>()?;
    bag_peaks(&build_peaks(&leaves)?)
}

/// `(height, leaf_count)` of each peak, left to right, for `size` leaves.
fn peak_plan(size: usize) -> Vec<(u32, usize)> {
    let mut out = Vec::new();
    let mut n = size;
    while n > 0 {
        let height = usize::BITS - n.leading_zeros() - 1;
        let count = 1usize << height;
        out.push((height, count));
        n -= count;
    }
    out
}

/// `(peak_index, first_leaf, height)` of the peak holding `leaf_index`.
fn locate_peak(size: usize, leaf_index: usize) -> Option<(usize, usize, u32)> {
    let mut start = 0usize;
    for (i, (height, count)) in peak_plan(size).into_iter().enumerate() {
        if leaf_index < start + count {
            return Some((i, start, height));
        }
        start += count;
    }
    None
}

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling is the left operand.
    Left,
    /// Sibling is the right operand.
    Right,
}

/// One sibling on the path from a leaf to its peak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// Sibling position.
    pub side: Side,
    /// Sibling hash.
    pub hash: String,
}

/// Proof that one integrity hash is committed to by a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Leaves in the accumulator.
    pub size: usize,
    /// Accumulator root.
    pub root: String,
    /// Position of the proven leaf.
    pub leaf_index: usize,
    /// The proven row's `integrity_hash`.
    pub integrity_hash: String,
    /// Index of the peak holding the leaf.
    pub peak_index: usize,
    /// Height of that peak.
    pub peak_height: u32,
    /// Siblings from leaf to peak.
    pub path: Vec<PathStep>,
    /// All peaks.
    pub peaks: Vec<Peak>,
}

/// Build an inclusion proof for `leaf_index`.
pub fn build_inclusion_proof(
    integrity_hashes: &[String],
    leaf_index: usize,
) -> Result<InclusionProof, CryptoError> {
    let size = integrity_hashes.len();
    let (peak_index, peak_start, peak_height) = locate_peak(size, leaf_index).ok_or_else(|| {
        CryptoError::LeafOutOfRange {
            index: leaf_index,
            size,
        }
    })?;

    let leaves = integrity_hashes
        .iter()
        .map(|h| leaf_hash(h))
        .collect::<Result<Vec<_>, _>>()?;
    let peaks = build_peaks(&leaves)?;
    let root = bag_peaks(&peaks)?;

    let mut level: Vec<String> = leaves[peak_start..peak_start + (1usize << peak_height)].to_vec();
    let mut pos = leaf_index - peak_start;
    let mut path = Vec::with_capacity(peak_height as usize);
    while level.len() > 1 {
        let sibling = pos ^ 1;
        path.push(PathStep {
            side: if sibling < pos { Side::Left } else { Side::Right },
            hash: level[sibling].clone(),
        });
        level = level
            .chunks(2)
            .map(|pair| node_hash(&pair[0], &pair[1]))
            .collect::<Result<Vec<_>, _>>()?;
        pos /= 2;
    }

    Ok(InclusionProof {
        size,
        root,
        leaf_index,
        integrity_hash: integrity_hashes[leaf_index].to_lowercase(),
        peak_index,
        peak_height,
        path,
        peaks,
    })
}

/// Check a proof against its own root. Malformed proofs verify as `false`.
pub fn verify_inclusion_proof(proof: &InclusionProof) -> bool {
    let Some((peak_index, _, peak_height)) = locate_peak(proof.size, proof.leaf_index) else {
        return false;
    };
    if peak_index != proof.peak_index
        || peak_height != proof.peak_height
        || proof.path.len() != peak_height as usize
        || proof.peaks.len() != peak_plan(proof.size).len()
    {
        return false;
    }

    let Ok(mut cur) = leaf_hash(&proof.integrity_hash) else {
        return false;
    };
    for step in &proof.path {
        let next = match step.side {
            Side::Left => node_hash(&step.hash, &cur),
            Side::Right => node_hash(&cur, &step.hash),
        };
        match next {
            Ok(h) => cur = h,
            Err(_) => return false,
        }
    }
    if proof.peaks[peak_index].hash != cur {
        return false;
    }

    matches!(bag_peaks(&proof.peaks), Ok(root) if root == proof.root)
}

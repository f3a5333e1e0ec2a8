//! Merkle inclusion proofs
//!
//! A proof is the list of (sibling, expected parent) pairs from a leaf up to
//! the block's root. Peers do not say on which side the sibling sits, so each
//! level is checked with both concatenation orders.

use crate::crypto::{hash_concat, Sha256Hash};
use crate::error::{ClientError, Result};
use crate::network::ProofSource;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleStep {
    pub sibling: Sha256Hash,
    pub expected_parent: Sha256Hash,
}

impl MerkleStep {
    pub fn new(sibling: Sha256Hash, expected_parent: Sha256Hash) -> Self {
        Self {
            sibling,
            expected_parent,
        }
    }

    /// True when either `current || sibling` or `sibling || current` hashes
    /// to the expected parent.
    pub fn accepts(&self, current: &Sha256Hash) -> bool {
        hash_concat(current, &self.sibling) == self.expected_parent
            || hash_concat(&self.sibling, current) == self.expected_parent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleProof {
    pub steps: Vec<MerkleStep>,
}

impl MerkleProof {
    pub fn new(steps: Vec<MerkleStep>) -> Self {
        Self { steps }
    }

    /// Builds a proof from the flat node list peers send back:
    /// `[sibling0, parent0, sibling1, parent1, ...]`.
    pub fn from_flat_nodes(nodes: &[Sha256Hash]) -> Result<Self> {
        if nodes.len() % 2 != 0 {
            return Err(ClientError::MalformedInput(format!(
                "Merkle path must hold sibling/parent pairs, got {} nodes",
                nodes.len()
            )));
        }
        let steps = nodes
            .chunks_exact(2)
            .map(|pair| MerkleStep::new(pair[0], pair[1]))
            .collect();
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Hash the path ends at, i.e. the claimed root.
    pub fn root(&self) -> Option<Sha256Hash> {
        self.steps.last().map(|step| step.expected_parent)
    }
}

/// Checks that `claimed` is a leaf of the tree described by `proof`.
///
/// `recomputed` is the hash the caller derived from the transaction body; a
/// mismatch with `claimed` fails the proof. A level that matches neither
/// order fails the proof too, but folding continues from that level's
/// expected parent so every level is still evaluated.
pub fn verify(claimed: &Sha256Hash, recomputed: &Sha256Hash, proof: &MerkleProof) -> bool {
    let mut current = *claimed;
    let mut ok = claimed == recomputed;

    for (level, step) in proof.steps.iter().enumerate() {
        if !step.accepts(&current) {
            debug!(level, "merkle level mismatch");
            ok = false;
        }
        current = step.expected_parent;
    }

    ok
}

/// Fetches the sibling path for `tx_hash` in `block_hash` from a peer and
/// verifies it.
pub async fn verify_inclusion(
    source: &dyn ProofSource,
    endpoint: &str,
    block_hash: &Sha256Hash,
    tx_hash: &Sha256Hash,
    recomputed: &Sha256Hash,
) -> Result<bool> {
    let nodes = source
        .intermediate_nodes(endpoint, block_hash, tx_hash)
        .await
        .map_err(ClientError::from)?;
    // The node list comes from the peer, not the caller.
    let proof = MerkleProof::from_flat_nodes(&nodes).map_err(|_| {
        ClientError::network(format!(
            "peer {} sent a Merkle path of {} nodes, expected sibling/parent pairs",
            endpoint,
            nodes.len()
        ))
    })?;
    let valid = verify(tx_hash, recomputed, &proof);

    info!(
        tx_hash = %hex::encode(tx_hash),
        block_hash = %hex::encode(block_hash),
        levels = proof.len(),
        valid,
        "verified merkle inclusion"
    );
    Ok(valid)
}

use rs_merkle::{Hasher, MerkleTree, algorithms::Sha256};

use crate::event::EventRecord;

/// Merkle index over a sequence of event records, for compact inclusion
/// proofs handed to off-chain auditors.
pub struct MerkleAudit {
    tree: MerkleTree<Sha256>,
    leaves: Vec<[u8; 32]>,
}

fn record_to_leaf(record: &EventRecord) -> [u8; 32] {
    let data = format!("{}:{}", record.id, record.hash);
    Sha256::hash(data.as_bytes())
}

impl MerkleAudit {
    pub fn new() -> Self {
        Self {
            tree: MerkleTree::<Sha256>::new(),
            leaves: Vec::new(),
        }
    }

    /// Build an index over already-drained records.
    pub fn from_records(records: &[EventRecord]) -> Self {
        let mut audit = Self::new();
        for record in records {
            audit.insert(record);
        }
        audit
    }

    pub fn insert(&mut self, record: &EventRecord) {
        let leaf = record_to_leaf(record);
        self.leaves.push(leaf);
        self.tree.insert(leaf);
        self.tree.commit();
    }

    pub fn root_hex(&self) -> Option<String> {
        self.tree.root_hex()
    }

    /// Serialized inclusion proof for the record at `index`.
    pub fn proof(&self, index: usize) -> Option<Vec<u8>> {
        if index >= self.leaves.len() {
            return None;
        }
        Some(self.tree.proof(&[index]).to_bytes())
    }

    /// Check that the leaf at `index` is included under the current root.
    pub fn verify(&self, index: usize, record: &EventRecord) -> bool {
        let Some(root) = self.tree.root() else {
            return false;
        };
        if index >= self.leaves.len() {
            return false;
        }
        let proof = self.tree.proof(&[index]);
        proof.verify(root, &[index], &[record_to_leaf(record)], self.leaves.len())
    }
}

impl Default for MerkleAudit {
    fn default() -> Self {
        Self::new()
    }
}

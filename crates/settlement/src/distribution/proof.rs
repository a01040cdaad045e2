//! Merkle commitment over an epoch's distribution records.
//!
//! Each record becomes a fixed 48-byte leaf `epoch || sha256(participant) || amount` (little
//! endian), indexed in participant order.

use crate::types::{Amount, EpochId, ParticipantId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use svm_hash::merkle::{MerkleProof, merkle_root_from_indexed_byte_ref_leaves};

pub const LEAF_PREFIX: &[u8] = b"cocoon_pool_distribution";
pub const LEAF_LEN: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(value: &str) -> Option<Self> {
        let bytes = hex::decode(value).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl From<svm_hash::sha2::Hash> for Hash {
    fn from(value: svm_hash::sha2::Hash) -> Self {
        Self(value.to_bytes())
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::from_hex(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid 32-byte hex hash: {value}")))
    }
}

pub fn leaf(epoch: EpochId, participant: &ParticipantId, amount: Amount) -> [u8; LEAF_LEN] {
    let id: [u8; 32] = Sha256::digest(participant.as_str().as_bytes()).into();
    let mut leaf = [0u8; LEAF_LEN];
    leaf[..8].copy_from_slice(&epoch.to_le_bytes());
    leaf[8..40].copy_from_slice(&id);
    leaf[40..].copy_from_slice(&amount.to_le_bytes());
    leaf
}

/// What a participant presents to `claim`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimProof {
    pub amount: Amount,
    /// Borsh-encoded merkle path
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

impl ClaimProof {
    pub fn verify(&self, root: &Hash, epoch: EpochId, participant: &ParticipantId) -> bool {
        let Ok(proof) = borsh::from_slice::<MerkleProof>(&self.proof) else {
            return false;
        };
        let leaf = leaf(epoch, participant, self.amount);
        Hash::from(proof.root_from_leaf(&leaf[..], Some(LEAF_PREFIX))) == *root
    }
}

#[derive(Debug)]
pub struct DistributionTree {
    epoch: EpochId,
    participants: Vec<ParticipantId>,
    leaves: Vec<Vec<u8>>,
}

impl DistributionTree {
    /// `entries` must be in a stable order; callers pass `BTreeMap` iteration order.
    pub fn new<'a>(
        epoch: EpochId,
        entries: impl IntoIterator<Item = (&'a ParticipantId, Amount)>,
    ) -> Option<Self> {
        let (participants, leaves): (Vec<ParticipantId>, Vec<Vec<u8>>) = entries
            .into_iter()
            .map(|(participant, amount)| {
                (participant.clone(), leaf(epoch, participant, amount).to_vec())
            })
            .unzip();
        if leaves.is_empty() {
            return None;
        }
        Some(Self {
            epoch,
            participants,
            leaves,
        })
    }

    pub fn epoch(&self) -> EpochId {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn root(&self) -> Option<Hash> {
        merkle_root_from_indexed_byte_ref_leaves(&self.leaves, Some(LEAF_PREFIX)).map(Hash::from)
    }

    /// Borsh-encoded path for `participant`, ready to go into a [`ClaimProof`].
    pub fn proof_for(&self, participant: &ParticipantId) -> Option<Vec<u8>> {
        let index = self.participants.iter().position(|p| p == participant)?;
        let proof = MerkleProof::from_indexed_byte_ref_leaves(
            &self.leaves,
            u32::try_from(index).ok()?,
            Some(LEAF_PREFIX),
        )?;
        borsh::to_vec(&proof).ok()
    }
}

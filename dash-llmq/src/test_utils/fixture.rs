//! Deterministic quorums with key material consistent with [`MockBlsWorker`].

use std::sync::Arc;

use dash_llmq_types::bitcoin_hashes::Hash;
use dash_llmq_types::bls_sig_utils::verification_vector_hash;
use dash_llmq_types::{
    BLSIESEncryptedSecretKey, BLSPublicKey, BLSSecretKey, BLSSignature, BlockHash,
    FinalCommitment, LLMQType, ProTxHash, QuorumHash,
};
use tokio_util::sync::CancellationToken;

use super::mocks::{MockBlsWorker, xor_32};
use crate::dkg::VerifiedContributions;
use crate::quorum::Quorum;
use crate::types::BlockRef;

#[derive(Debug, Clone)]
pub struct QuorumFixture {
    pub llmq_type: LLMQType,
    pub members: Vec<ProTxHash>,
    pub valid_members: Vec<bool>,
    /// Member index of the local masternode.
    pub local_index: usize,
    pub vvec: Vec<BLSPublicKey>,
    pub quorum_block: BlockRef,
    pub mined_block_hash: BlockHash,
    seed: u8,
}

impl QuorumFixture {
    /// An `llmq_test` quorum of `size` members, all valid, based on a block at height 24.
    pub fn new(size: usize, local_index: usize) -> Self {
        Self::generate(LLMQType::LlmqtypeTest, size, local_index, 1, 24)
    }

    fn generate(
        llmq_type: LLMQType,
        size: usize,
        local_index: usize,
        seed: u8,
        height: u32,
    ) -> Self {
        let members = (0..size)
            .map(|i| {
                let mut bytes = [0x5a; 32];
                bytes[0] = seed;
                bytes[1] = i as u8 + 1;
                ProTxHash::from_byte_array(bytes)
            })
            .collect();

        let vvec = (0..llmq_type.threshold() as usize)
            .map(|j| {
                let value = seed.wrapping_mul(31).wrapping_add(j as u8 * 13 + 5);
                BLSPublicKey::from_bytes([value; 48])
            })
            .collect();

        let mut block = [0u8; 32];
        block[0] = 0xb0;
        block[1] = seed;
        block[2..6].copy_from_slice(&height.to_le_bytes());
        let mut mined = block;
        mined[0] = 0xc0;

        Self {
            llmq_type,
            members,
            valid_members: vec![true; size],
            local_index,
            vvec,
            quorum_block: BlockRef::new(BlockHash::from_byte_array(block), height),
            mined_block_hash: BlockHash::from_byte_array(mined),
            seed,
        }
    }

    /// Regenerates members, keys and block hash from another seed.
    pub fn with_seed(self, seed: u8) -> Self {
        let valid_members = self.valid_members.clone();
        let mut fixture = Self::generate(
            self.llmq_type,
            self.members.len(),
            self.local_index,
            seed,
            self.quorum_block.height,
        );
        fixture.valid_members = valid_members;
        fixture
    }

    /// Moves the quorum to a block at `height`.
    pub fn with_height(self, height: u32) -> Self {
        let valid_members = self.valid_members.clone();
        let mut fixture =
            Self::generate(self.llmq_type, self.members.len(), self.local_index, self.seed, height);
        fixture.valid_members = valid_members;
        fixture
    }

    pub fn with_invalid_member(mut self, index: usize) -> Self {
        self.valid_members[index] = false;
        self
    }

    pub fn quorum_hash(&self) -> QuorumHash {
        QuorumHash::from(self.quorum_block.hash)
    }

    pub fn local_pro_tx_hash(&self) -> ProTxHash {
        self.members[self.local_index]
    }

    pub fn commitment(&self) -> FinalCommitment {
        FinalCommitment {
            version: 1,
            llmq_type: self.llmq_type.into(),
            quorum_hash: self.quorum_hash(),
            quorum_index: None,
            signers: self.valid_members.clone(),
            valid_members: self.valid_members.clone(),
            quorum_public_key: self.vvec[0],
            quorum_vvec_hash: verification_vector_hash(&self.vvec),
            quorum_sig: BLSSignature::from_bytes([0x11; 96]),
            members_sig: BLSSignature::from_bytes([0x22; 96]),
        }
    }

    /// The quorum as seen by the local member.
    pub fn quorum(&self) -> Quorum {
        self.quorum_for(Some(self.local_pro_tx_hash()))
    }

    pub fn quorum_for(&self, local_pro_tx_hash: Option<ProTxHash>) -> Quorum {
        Quorum::new(
            self.llmq_type.params(),
            self.commitment(),
            self.quorum_block,
            self.mined_block_hash,
            self.members.clone(),
            local_pro_tx_hash,
            Arc::new(MockBlsWorker),
            CancellationToken::new(),
        )
    }

    pub fn secret_key_share(&self, index: usize) -> BLSSecretKey {
        MockBlsWorker::secret_key_share(&self.vvec, &self.members[index])
    }

    pub fn public_key_share(&self, index: usize) -> BLSPublicKey {
        MockBlsWorker::public_key_of(&self.secret_key_share(index))
    }

    /// Secret key contributions of every valid member to member `index`. They sum up to the
    /// member's secret key share.
    fn contributions_to(&self, index: usize) -> Vec<[u8; 32]> {
        let valid_count = self.valid_members.iter().filter(|valid| **valid).count();
        let mut contributions: Vec<[u8; 32]> =
            (0..valid_count).map(|j| [(j as u8 + 1).wrapping_mul(0x21); 32]).collect();
        let rest = contributions[1..].iter().fold([0u8; 32], |acc, c| xor_32(&acc, c));
        contributions[0] = xor_32(self.secret_key_share(index).as_bytes(), &rest);
        contributions
    }

    /// Encrypted contributions addressed to member `index`, as served by `qdata`.
    pub fn encrypted_contributions(&self, index: usize) -> Vec<BLSIESEncryptedSecretKey> {
        self.contributions_to(index)
            .into_iter()
            .enumerate()
            .map(|(j, data)| BLSIESEncryptedSecretKey {
                ephemeral_public_key: BLSPublicKey::from_bytes([0x77; 48]),
                iv: [j as u8; 32],
                data: data.to_vec(),
            })
            .collect()
    }

    /// What the DKG of member `index` verified: verification vectors that sum up to the
    /// quorum vector and the secret key contributions addressed to it.
    pub fn verified_contributions(&self, index: usize) -> VerifiedContributions {
        let member_indexes: Vec<usize> =
            (0..self.members.len()).filter(|i| self.valid_members[*i]).collect();

        let mut vvecs: Vec<Vec<BLSPublicKey>> = member_indexes
            .iter()
            .map(|i| {
                let filler = BLSPublicKey::from_bytes([(*i as u8 + 1).wrapping_mul(0x13); 48]);
                vec![filler; self.vvec.len()]
            })
            .collect();
        for k in 0..self.vvec.len() {
            let rest = vvecs[1..]
                .iter()
                .fold([0u8; 48], |acc, vvec| MockBlsWorker::xor_48(&acc, vvec[k].as_bytes()));
            let first = MockBlsWorker::xor_48(self.vvec[k].as_bytes(), &rest);
            vvecs[0][k] = BLSPublicKey::from_bytes(first);
        }

        VerifiedContributions {
            member_indexes,
            vvecs: vvecs.into_iter().map(Arc::new).collect(),
            sk_contributions: self
                .contributions_to(index)
                .into_iter()
                .map(BLSSecretKey::from_bytes)
                .collect(),
        }
    }
}

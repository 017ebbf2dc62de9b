// SPDX-License-Identifier: CC0-1.0

//! Dash hash types.
//!
//! This module defines types for hashes used throughout the LLMQ subsystem.

use bitcoin_hashes::{Hash, HashEngine, hash_newtype, sha256d};

use crate::internal_macros::impl_hashencode;
use crate::llmq_type::LLMQType;

hash_newtype! {
    /// A dash block hash.
    pub struct BlockHash(sha256d::Hash);
    /// The hash of the block a quorum was formed at. Identifies the quorum together with its type.
    pub struct QuorumHash(sha256d::Hash);
    /// The hash of a masternode's provider registration transaction.
    pub struct ProTxHash(sha256d::Hash);
    /// The hash committed to by a final commitment for the quorum verification vector.
    pub struct QuorumVVecHash(sha256d::Hash);
    /// Storage key under which the contributions of a quorum are persisted.
    pub struct QuorumDataKey(sha256d::Hash);
}

impl_hashencode!(BlockHash);
impl_hashencode!(QuorumHash);
impl_hashencode!(ProTxHash);
impl_hashencode!(QuorumVVecHash);
impl_hashencode!(QuorumDataKey);

impl QuorumDataKey {
    /// Computes the key for a quorum from its type, its quorum hash and its ordered members.
    ///
    /// Member hashes are written back to back without a length prefix.
    pub fn compute(llmq_type: LLMQType, quorum_hash: &QuorumHash, members: &[ProTxHash]) -> Self {
        let mut engine = QuorumDataKey::engine();
        engine.input(&[llmq_type as u8]);
        engine.input(quorum_hash.as_byte_array());
        for member in members {
            engine.input(member.as_byte_array());
        }
        QuorumDataKey::from_engine(engine)
    }
}

impl From<BlockHash> for QuorumHash {
    fn from(block_hash: BlockHash) -> Self {
        QuorumHash::from_byte_array(block_hash.to_byte_array())
    }
}

impl From<QuorumHash> for BlockHash {
    fn from(quorum_hash: QuorumHash) -> Self {
        BlockHash::from_byte_array(quorum_hash.to_byte_array())
    }
}

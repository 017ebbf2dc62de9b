// SPDX-License-Identifier: CC0-1.0

//! Final (mined) quorum commitment.
//!
//! It is described in the finalization section of DIP6:
//! [dip-0006.md#6-finalization-phase](https://github.com/dashpay/dips/blob/master/dip-0006.md#6-finalization-phase).
//! The commitment mined for a quorum decides which members took part in the DKG
//! successfully and which verification vector the quorum is bound to.

use std::io;

use crate::bls_sig_utils::{BLSPublicKey, BLSSignature};
use crate::consensus::encode::{self, VarInt, read_dyn_bitset, write_dyn_bitset};
use crate::consensus::{Decodable, Encodable};
use crate::hash_types::{QuorumHash, QuorumVVecHash};
use crate::llmq_type::LLMQType;

#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct FinalCommitment {
    pub version: u16,
    pub llmq_type: u8,
    pub quorum_hash: QuorumHash,
    pub quorum_index: Option<i16>,
    pub signers: Vec<bool>,
    pub valid_members: Vec<bool>,
    pub quorum_public_key: BLSPublicKey,
    pub quorum_vvec_hash: QuorumVVecHash,
    pub quorum_sig: BLSSignature,
    pub members_sig: BLSSignature,
}

impl FinalCommitment {
    fn has_quorum_index(version: u16) -> bool {
        version == 2 || version == 4
    }

    /// The size of the payload in bytes.
    pub fn size(&self) -> usize {
        let mut size = 2 + 1 + 32 + 48 + 32 + 96 + 96;
        size += VarInt(self.signers.len() as u64).size() + self.signers.len().div_ceil(8);
        size += VarInt(self.valid_members.len() as u64).size() + self.valid_members.len().div_ceil(8);
        if Self::has_quorum_index(self.version) {
            size += 2;
        }
        size
    }

    /// The quorum type, if the commitment names a known one.
    pub fn quorum_type(&self) -> Option<LLMQType> {
        LLMQType::try_from(self.llmq_type).ok()
    }

    /// Whether the member at `index` took part in the DKG successfully.
    /// Out of range indexes are never valid.
    pub fn is_valid_member(&self, index: usize) -> bool {
        self.valid_members.get(index).copied().unwrap_or(false)
    }

    pub fn count_valid_members(&self) -> usize {
        self.valid_members.iter().filter(|b| **b).count()
    }

    pub fn count_signers(&self) -> usize {
        self.signers.iter().filter(|b| **b).count()
    }

    /// A null commitment carries no valid members and is never mined.
    pub fn is_null(&self) -> bool {
        self.valid_members.iter().all(|b| !b) && self.quorum_public_key.is_zeroed()
    }
}

impl Encodable for FinalCommitment {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.version.consensus_encode(w)?;
        len += self.llmq_type.consensus_encode(w)?;
        len += self.quorum_hash.consensus_encode(w)?;
        if Self::has_quorum_index(self.version) {
            len += self.quorum_index.unwrap_or_default().consensus_encode(w)?;
        }
        len += write_dyn_bitset(w, &self.signers)?;
        len += write_dyn_bitset(w, &self.valid_members)?;
        len += self.quorum_public_key.consensus_encode(w)?;
        len += self.quorum_vvec_hash.consensus_encode(w)?;
        len += self.quorum_sig.consensus_encode(w)?;
        len += self.members_sig.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for FinalCommitment {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        let version = u16::consensus_decode(r)?;
        let llmq_type = u8::consensus_decode(r)?;
        let quorum_hash = QuorumHash::consensus_decode(r)?;
        let quorum_index =
            if Self::has_quorum_index(version) { Some(i16::consensus_decode(r)?) } else { None };
        let signers = read_dyn_bitset(r)?;
        let valid_members = read_dyn_bitset(r)?;
        let quorum_public_key = BLSPublicKey::consensus_decode(r)?;
        let quorum_vvec_hash = QuorumVVecHash::consensus_decode(r)?;
        let quorum_sig = BLSSignature::consensus_decode(r)?;
        let members_sig = BLSSignature::consensus_decode(r)?;
        Ok(FinalCommitment {
            version,
            llmq_type,
            quorum_hash,
            quorum_index,
            signers,
            valid_members,
            quorum_public_key,
            quorum_vvec_hash,
            quorum_sig,
            members_sig,
        })
    }
}

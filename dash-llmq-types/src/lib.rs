// SPDX-License-Identifier: CC0-1.0

//! # Dash LLMQ types
//!
//! Value types and the consensus encoding used by the long-living masternode quorum
//! (LLMQ) subsystem of a Dash node:
//!
//! * hash newtypes for blocks, quorums, masternodes and stored quorum data,
//! * opaque BLS key and signature containers,
//! * quorum type parameters,
//! * the final commitment mined for every quorum,
//! * the `qgetdata` / `qdata` messages used to recover quorum key material.

#![deny(unsafe_code)]

mod internal_macros;

pub mod bls_sig_utils;
pub mod commitment;
pub mod consensus;
pub mod hash_types;
pub mod llmq_type;
pub mod network;

pub use bitcoin_hashes;

pub use crate::bls_sig_utils::{BLSIESEncryptedSecretKey, BLSPublicKey, BLSSecretKey, BLSSignature};
pub use crate::commitment::FinalCommitment;
pub use crate::hash_types::{BlockHash, ProTxHash, QuorumDataKey, QuorumHash, QuorumVVecHash};
pub use crate::llmq_type::{LLMQParams, LLMQType};
pub use crate::network::message_qdata::{
    DataMask, LLMQ_DATA_MESSAGES_VERSION, QuorumData, QuorumDataError, QuorumDataPayload,
    QuorumDataRequest, QuorumMessage,
};

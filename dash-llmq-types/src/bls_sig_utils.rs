// SPDX-License-Identifier: CC0-1.0

//! BLS key and signature containers.
//!
//! These are opaque byte containers; the arithmetic lives behind the node's BLS worker.

use std::fmt;
use std::io;

use bitcoin_hashes::{Hash, HashEngine};

use crate::consensus::encode::{Error, VarInt};
use crate::consensus::{Decodable, Encodable};
use crate::hash_types::QuorumVVecHash;
use crate::internal_macros::{impl_bytes_newtype, impl_consensus_encoding};

/// A BLS public key (compressed G1 element).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BLSPublicKey([u8; 48]);

impl_bytes_newtype!(BLSPublicKey, 48);

impl fmt::Debug for BLSPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BLSPublicKey({:x})", self)
    }
}

/// A BLS signature (compressed G2 element).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BLSSignature([u8; 96]);

impl_bytes_newtype!(BLSSignature, 96);

impl fmt::Debug for BLSSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BLSSignature({:x})", self)
    }
}

/// A BLS secret key, or a member's secret key share of a quorum.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BLSSecretKey([u8; 32]);

impl_bytes_newtype!(BLSSecretKey, 32);

impl fmt::Debug for BLSSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("BLSSecretKey(..)")
    }
}

/// A secret key contribution encrypted to one member's operator key (BLS-IES).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BLSIESEncryptedSecretKey {
    pub ephemeral_public_key: BLSPublicKey,
    pub iv: [u8; 32],
    pub data: Vec<u8>,
}

impl_consensus_encoding!(BLSIESEncryptedSecretKey, ephemeral_public_key, iv, data);

/// Hash of a verification vector as committed to in a final commitment: the
/// compact-size element count followed by every public key.
pub fn verification_vector_hash(vvec: &[BLSPublicKey]) -> QuorumVVecHash {
    let mut engine = QuorumVVecHash::engine();
    let mut prefix = Vec::with_capacity(9);
    // Writing into a Vec cannot fail.
    let _ = VarInt(vvec.len() as u64).consensus_encode(&mut prefix);
    engine.input(&prefix);
    for key in vvec {
        engine.input(key.as_bytes());
    }
    QuorumVVecHash::from_engine(engine)
}

/// Decodes a verification vector, rejecting empty vectors.
pub fn decode_verification_vector<R: io::Read + ?Sized>(
    r: &mut R,
) -> Result<Vec<BLSPublicKey>, Error> {
    let vvec = Vec::<BLSPublicKey>::consensus_decode(r)?;
    if vvec.is_empty() {
        return Err(Error::ParseFailed("empty verification vector"));
    }
    Ok(vvec)
}

//! BLS operations needed to assemble quorum key material.
//!
//! Curve arithmetic lives outside this crate. Implementations are expected to be pure
//! functions of their inputs; every method is called from blocking worker threads as well as
//! from async tasks.

use std::sync::Arc;

use dash_llmq_types::{BLSIESEncryptedSecretKey, BLSPublicKey, BLSSecretKey, ProTxHash};

pub trait BlsWorker: Send + Sync {
    /// Sums the verification vectors of all contributors. `None` if they are empty or of
    /// different length.
    fn build_quorum_verification_vector(
        &self,
        vvecs: &[Arc<Vec<BLSPublicKey>>],
    ) -> Option<Vec<BLSPublicKey>>;

    /// Sums secret key contributions into a key share. `None` if the result is not a valid
    /// secret key.
    fn aggregate_secret_keys(&self, keys: &[BLSSecretKey]) -> Option<BLSSecretKey>;

    /// Evaluates the verification vector at the member id `pro_tx_hash`.
    fn build_public_key_share(
        &self,
        vvec: &[BLSPublicKey],
        pro_tx_hash: &ProTxHash,
    ) -> Option<BLSPublicKey>;

    /// Public key of `secret_key`. `None` if the secret key is invalid.
    fn public_key(&self, secret_key: &BLSSecretKey) -> Option<BLSPublicKey>;

    /// Decrypts the contribution of member `member_index` with our operator key.
    fn decrypt_contribution(
        &self,
        encrypted: &BLSIESEncryptedSecretKey,
        member_index: usize,
        operator_key: &BLSSecretKey,
    ) -> Option<BLSSecretKey>;
}

//! Precomputation of the public key shares of all valid members.

use super::Quorum;

impl Quorum {
    /// Computes every public key share in member order, stopping early once the quorum is
    /// stopped. Returns the number of shares available afterwards.
    ///
    /// Blocking: run it on a blocking worker thread.
    pub fn populate_public_key_share_cache(&self) -> usize {
        if !self.has_verification_vector() {
            return 0;
        }

        let mut populated = 0;
        for index in 0..self.members().len() {
            if self.stop_token().is_cancelled() {
                tracing::debug!(
                    "{}: public key share cache population stopped at member {}",
                    self.quorum_hash(),
                    index
                );
                break;
            }
            if self.public_key_share(index).is_some() {
                populated += 1;
            }
        }
        populated
    }
}

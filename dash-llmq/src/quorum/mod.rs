//! A single mined quorum and the key material known for it.
//!
//! A [`Quorum`] is created from its mined final commitment and the deterministic member
//! list. Verification vector and secret key share start out unknown and are filled in
//! once, either from storage, from the local DKG session or through data recovery. Both
//! are written at most once and read without locking.

mod cache_populator;
pub(crate) mod recovery;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use dash_llmq_types::bls_sig_utils::verification_vector_hash;
use dash_llmq_types::consensus::{deserialize, serialize};
use dash_llmq_types::{
    BLSPublicKey, BLSSecretKey, BlockHash, FinalCommitment, LLMQParams, LLMQType, ProTxHash,
    QuorumDataKey, QuorumHash,
};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::bls::BlsWorker;
use crate::error::{QuorumError, QuorumResult, StorageError, StorageResult};
use crate::storage::{QuorumDataStorage, RecordTag};
use crate::types::{BlockRef, QuorumDataState};

pub use recovery::RecoveryOutcome;

pub struct Quorum {
    params: &'static LLMQParams,
    commitment: FinalCommitment,
    quorum_block: BlockRef,
    mined_block_hash: BlockHash,
    members: Vec<ProTxHash>,
    /// Our own proTxHash when running as a masternode.
    local_pro_tx_hash: Option<ProTxHash>,
    bls: Arc<dyn BlsWorker>,

    verification_vector: OnceLock<Arc<Vec<BLSPublicKey>>>,
    secret_key_share: OnceLock<BLSSecretKey>,
    public_key_shares: Vec<OnceLock<BLSPublicKey>>,

    stop: CancellationToken,
    data_received: Notify,
    recovery_running: AtomicBool,
}

impl std::fmt::Debug for Quorum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Quorum")
            .field("llmq_type", &self.params.quorum_type)
            .field("quorum_hash", &self.quorum_hash())
            .field("height", &self.quorum_block.height)
            .field("members", &self.members.len())
            .field("state", &self.data_state())
            .finish()
    }
}

impl Quorum {
    /// Creates a quorum without key material.
    ///
    /// `stop` is cancelled when the quorum is evicted or the manager shuts down; every
    /// background task of the quorum watches it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: &'static LLMQParams,
        commitment: FinalCommitment,
        quorum_block: BlockRef,
        mined_block_hash: BlockHash,
        members: Vec<ProTxHash>,
        local_pro_tx_hash: Option<ProTxHash>,
        bls: Arc<dyn BlsWorker>,
        stop: CancellationToken,
    ) -> Self {
        let public_key_shares = (0..members.len()).map(|_| OnceLock::new()).collect();
        Self {
            params,
            commitment,
            quorum_block,
            mined_block_hash,
            members,
            local_pro_tx_hash,
            bls,
            verification_vector: OnceLock::new(),
            secret_key_share: OnceLock::new(),
            public_key_shares,
            stop,
            data_received: Notify::new(),
            recovery_running: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &'static LLMQParams {
        self.params
    }

    pub fn llmq_type(&self) -> LLMQType {
        self.params.quorum_type
    }

    pub fn quorum_hash(&self) -> QuorumHash {
        QuorumHash::from(self.quorum_block.hash)
    }

    pub fn quorum_block(&self) -> &BlockRef {
        &self.quorum_block
    }

    pub fn mined_block_hash(&self) -> &BlockHash {
        &self.mined_block_hash
    }

    pub fn commitment(&self) -> &FinalCommitment {
        &self.commitment
    }

    pub fn members(&self) -> &[ProTxHash] {
        &self.members
    }

    pub fn local_pro_tx_hash(&self) -> Option<&ProTxHash> {
        self.local_pro_tx_hash.as_ref()
    }

    /// Index of `pro_tx_hash` in the member list.
    pub fn member_index(&self, pro_tx_hash: &ProTxHash) -> Option<usize> {
        self.members.iter().position(|member| member == pro_tx_hash)
    }

    pub fn is_member(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.member_index(pro_tx_hash).is_some()
    }

    /// Member of the quorum and marked valid in the commitment.
    pub fn is_valid_member(&self, pro_tx_hash: &ProTxHash) -> bool {
        self.member_index(pro_tx_hash).is_some_and(|index| self.commitment.is_valid_member(index))
    }

    pub fn valid_member_count(&self) -> usize {
        self.commitment.count_valid_members()
    }

    /// Valid members other than `exclude`, in member order.
    pub fn valid_members_except(&self, exclude: Option<&ProTxHash>) -> Vec<ProTxHash> {
        self.members
            .iter()
            .enumerate()
            .filter(|(index, member)| {
                self.commitment.is_valid_member(*index) && Some(*member) != exclude
            })
            .map(|(_, member)| *member)
            .collect()
    }

    /// Key under which the contributions of this quorum are stored.
    pub fn quorum_data_key(&self) -> QuorumDataKey {
        QuorumDataKey::compute(self.llmq_type(), &self.quorum_hash(), &self.members)
    }

    pub fn verification_vector(&self) -> Option<Arc<Vec<BLSPublicKey>>> {
        self.verification_vector.get().cloned()
    }

    pub fn has_verification_vector(&self) -> bool {
        self.verification_vector.get().is_some()
    }

    pub fn secret_key_share(&self) -> Option<BLSSecretKey> {
        self.secret_key_share.get().copied()
    }

    pub fn data_state(&self) -> QuorumDataState {
        match (self.verification_vector.get(), self.secret_key_share.get()) {
            (Some(_), Some(_)) => QuorumDataState::HasFullData,
            (Some(_), None) => QuorumDataState::HasVerificationVector,
            _ => QuorumDataState::Committed,
        }
    }

    /// Installs the verification vector after checking it against the commitment.
    ///
    /// Setting the same vector again is a no-op. A different vector is rejected once one is
    /// known.
    pub fn set_verification_vector(&self, vvec: Vec<BLSPublicKey>) -> QuorumResult<()> {
        if let Some(existing) = self.verification_vector.get() {
            return if **existing == vvec {
                Ok(())
            } else {
                Err(QuorumError::ConflictingVerificationVector)
            };
        }

        if verification_vector_hash(&vvec) != self.commitment.quorum_vvec_hash {
            return Err(QuorumError::VerificationVectorHashMismatch);
        }

        let vvec = Arc::new(vvec);
        match self.verification_vector.set(vvec.clone()) {
            Ok(()) => Ok(()),
            Err(_) if self.verification_vector.get() == Some(&vvec) => Ok(()),
            Err(_) => Err(QuorumError::ConflictingVerificationVector),
        }
    }

    /// Installs our secret key share. Its public key must match the public key share the
    /// verification vector yields for our own member index.
    pub fn set_secret_key_share(&self, secret_key: BLSSecretKey) -> QuorumResult<()> {
        let public_key =
            self.bls.public_key(&secret_key).ok_or(QuorumError::InvalidSecretKeyShare)?;
        if !self.has_verification_vector() {
            return Err(QuorumError::MissingVerificationVector);
        }
        let index = self
            .local_pro_tx_hash
            .as_ref()
            .and_then(|pro_tx_hash| self.member_index(pro_tx_hash))
            .ok_or(QuorumError::NotAMember)?;

        if self.public_key_share(index) != Some(public_key) {
            return Err(QuorumError::PublicKeyShareMismatch(index));
        }

        if self.secret_key_share.set(secret_key).is_err() {
            tracing::trace!("{}: secret key share already set", self.quorum_hash());
        }
        Ok(())
    }

    /// Public key share of member `index`, computed on first use.
    ///
    /// `None` without a verification vector, for an out-of-range index or for a member the
    /// commitment marks invalid.
    pub fn public_key_share(&self, index: usize) -> Option<BLSPublicKey> {
        let vvec = self.verification_vector.get()?;
        if !self.commitment.is_valid_member(index) {
            return None;
        }
        let cell = self.public_key_shares.get(index)?;
        if let Some(share) = cell.get() {
            return Some(*share);
        }
        let share = self.bls.build_public_key_share(vvec, &self.members[index])?;
        Some(*cell.get_or_init(|| share))
    }

    /// Writes whatever key material is known.
    pub async fn persist_contributions(
        &self,
        storage: &dyn QuorumDataStorage,
    ) -> StorageResult<()> {
        let key = self.quorum_data_key();
        if let Some(vvec) = self.verification_vector.get() {
            storage
                .write_record(RecordTag::VerificationVector, &key, &serialize(vvec.as_ref()))
                .await?;
        }
        if let Some(secret_key) = self.secret_key_share.get() {
            storage.write_record(RecordTag::SecretKeyShare, &key, &serialize(secret_key)).await?;
        }
        Ok(())
    }

    /// Loads persisted key material. Returns whether a verification vector was found.
    ///
    /// A stored secret key share is only loaded together with its verification vector and
    /// only if it matches our public key share.
    pub async fn load_contributions(&self, storage: &dyn QuorumDataStorage) -> StorageResult<bool> {
        let key = self.quorum_data_key();
        let Some(raw) = storage.read_record(RecordTag::VerificationVector, &key).await? else {
            return Ok(false);
        };
        let vvec: Vec<BLSPublicKey> =
            deserialize(&raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.set_verification_vector(vvec)
            .map_err(|e| StorageError::Corruption(format!("{} vvec: {}", self.quorum_hash(), e)))?;

        if let Some(raw) = storage.read_record(RecordTag::SecretKeyShare, &key).await? {
            let secret_key: BLSSecretKey =
                deserialize(&raw).map_err(|e| StorageError::Serialization(e.to_string()))?;
            if let Err(e) = self.set_secret_key_share(secret_key) {
                tracing::warn!("{}: ignoring stored secret key share: {}", self.quorum_hash(), e);
            }
        }
        Ok(true)
    }

    /// Token cancelled when the quorum is evicted or the manager stops.
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Stops the background tasks of this quorum.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_data_recovery_running(&self) -> bool {
        self.recovery_running.load(Ordering::Acquire)
    }

    /// Marks a recovery as running. Returns false if one already runs.
    pub(crate) fn try_begin_recovery(&self) -> bool {
        self.recovery_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn end_recovery(&self) {
        self.recovery_running.store(false, Ordering::Release);
    }

    /// Wakes a recovery task waiting for a `qdata` answer.
    pub(crate) fn notify_data_received(&self) {
        self.data_received.notify_one();
    }

    pub(crate) fn data_received(&self) -> &Notify {
        &self.data_received
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use dash_llmq_types::bitcoin_hashes::Hash;

    use super::*;
    use crate::storage::MemoryQuorumStorage;
    use crate::test_utils::QuorumFixture;

    #[test]
    fn test_membership() {
        let fixture = QuorumFixture::new(4, 1).with_invalid_member(2);
        let quorum = fixture.quorum();

        assert_eq!(quorum.member_index(&fixture.members[3]), Some(3));
        assert!(quorum.is_member(&fixture.members[2]));
        assert!(!quorum.is_valid_member(&fixture.members[2]));
        assert!(!quorum.is_member(&ProTxHash::from_byte_array([0xee; 32])));
        assert_eq!(quorum.valid_member_count(), 3);
        assert_eq!(
            quorum.valid_members_except(Some(&fixture.members[1])),
            vec![fixture.members[0], fixture.members[3]]
        );
    }

    #[test]
    fn test_set_verification_vector() {
        let fixture = QuorumFixture::new(3, 0);
        let quorum = fixture.quorum();
        assert_eq!(quorum.data_state(), QuorumDataState::Committed);

        let mut wrong = fixture.vvec.clone();
        wrong.reverse();
        assert_matches!(
            quorum.set_verification_vector(wrong.clone()),
            Err(QuorumError::VerificationVectorHashMismatch)
        );
        assert!(!quorum.has_verification_vector());

        quorum.set_verification_vector(fixture.vvec.clone()).unwrap();
        quorum.set_verification_vector(fixture.vvec.clone()).unwrap();
        assert_matches!(
            quorum.set_verification_vector(wrong),
            Err(QuorumError::ConflictingVerificationVector)
        );
        assert_eq!(quorum.data_state(), QuorumDataState::HasVerificationVector);
    }

    #[test]
    fn test_concurrent_set_verification_vector() {
        let fixture = QuorumFixture::new(3, 0);
        let quorum = fixture.quorum();

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(|| quorum.set_verification_vector(fixture.vvec.clone())))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), Ok(()));
            }
        });
        assert_eq!(quorum.verification_vector().as_deref(), Some(&fixture.vvec));
    }

    #[test]
    fn test_public_key_shares() {
        let fixture = QuorumFixture::new(4, 0).with_invalid_member(1);
        let quorum = fixture.quorum();
        assert_eq!(quorum.public_key_share(0), None);

        quorum.set_verification_vector(fixture.vvec.clone()).unwrap();
        assert_eq!(quorum.public_key_share(0), Some(fixture.public_key_share(0)));
        assert_eq!(quorum.public_key_share(1), None);
        assert_eq!(quorum.public_key_share(4), None);
        // cached result is stable
        assert_eq!(quorum.public_key_share(0), quorum.public_key_share(0));
    }

    #[test]
    fn test_set_secret_key_share() {
        let fixture = QuorumFixture::new(3, 2);
        let quorum = fixture.quorum();
        let share = fixture.secret_key_share(2);

        assert_matches!(
            quorum.set_secret_key_share(share),
            Err(QuorumError::MissingVerificationVector)
        );
        assert_matches!(
            quorum.set_secret_key_share(BLSSecretKey::from_bytes([0; 32])),
            Err(QuorumError::InvalidSecretKeyShare)
        );

        quorum.set_verification_vector(fixture.vvec.clone()).unwrap();
        assert_matches!(
            quorum.set_secret_key_share(fixture.secret_key_share(0)),
            Err(QuorumError::PublicKeyShareMismatch(2))
        );
        quorum.set_secret_key_share(share).unwrap();
        assert_eq!(quorum.secret_key_share(), Some(share));
        assert_eq!(quorum.data_state(), QuorumDataState::HasFullData);
    }

    #[test]
    fn test_secret_key_share_requires_membership() {
        let fixture = QuorumFixture::new(3, 0);
        let quorum = fixture.quorum_for(None);
        quorum.set_verification_vector(fixture.vvec.clone()).unwrap();
        assert_matches!(
            quorum.set_secret_key_share(fixture.secret_key_share(0)),
            Err(QuorumError::NotAMember)
        );
    }

    #[tokio::test]
    async fn test_persist_and_load_contributions() {
        let fixture = QuorumFixture::new(3, 1);
        let storage = MemoryQuorumStorage::new();

        let quorum = fixture.quorum();
        // nothing stored yet
        assert!(!quorum.load_contributions(&storage).await.unwrap());

        quorum.set_verification_vector(fixture.vvec.clone()).unwrap();
        quorum.set_secret_key_share(fixture.secret_key_share(1)).unwrap();
        quorum.persist_contributions(&storage).await.unwrap();
        assert_eq!(storage.len().await, 2);

        let reloaded = fixture.quorum();
        assert!(reloaded.load_contributions(&storage).await.unwrap());
        assert_eq!(reloaded.verification_vector().as_deref(), Some(&fixture.vvec));
        assert_eq!(reloaded.secret_key_share(), Some(fixture.secret_key_share(1)));
    }

    #[tokio::test]
    async fn test_load_rejects_foreign_vvec() {
        let fixture = QuorumFixture::new(3, 1);
        let other = QuorumFixture::new(3, 1).with_seed(9);
        let storage = MemoryQuorumStorage::new();

        let key = fixture.quorum().quorum_data_key();
        storage
            .write_record(RecordTag::VerificationVector, &key, &serialize(&other.vvec))
            .await
            .unwrap();

        assert_matches!(
            fixture.quorum().load_contributions(&storage).await,
            Err(StorageError::Corruption(_))
        );
    }

    #[tokio::test]
    async fn test_load_skips_mismatching_secret_key_share() {
        let fixture = QuorumFixture::new(3, 1);
        let storage = MemoryQuorumStorage::new();

        let key = fixture.quorum().quorum_data_key();
        storage
            .write_record(RecordTag::VerificationVector, &key, &serialize(&fixture.vvec))
            .await
            .unwrap();
        // the share of another member
        storage
            .write_record(RecordTag::SecretKeyShare, &key, &serialize(&fixture.secret_key_share(0)))
            .await
            .unwrap();

        let quorum = fixture.quorum();
        assert!(quorum.load_contributions(&storage).await.unwrap());
        assert_eq!(quorum.secret_key_share(), None);
        assert_eq!(quorum.data_state(), QuorumDataState::HasVerificationVector);

        // recovery can still install the right one
        quorum.set_secret_key_share(fixture.secret_key_share(1)).unwrap();
        assert_eq!(quorum.data_state(), QuorumDataState::HasFullData);
    }

    #[test]
    fn test_recovery_flag() {
        let quorum = QuorumFixture::new(3, 0).quorum();
        assert!(quorum.try_begin_recovery());
        assert!(quorum.is_data_recovery_running());
        assert!(!quorum.try_begin_recovery());
        quorum.end_recovery();
        assert!(!quorum.is_data_recovery_running());
    }
}

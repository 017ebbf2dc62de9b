//! In-memory implementations of the node services.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use dash_llmq_types::{
    BLSIESEncryptedSecretKey, BLSPublicKey, BLSSecretKey, BlockHash, FinalCommitment,
    LLMQ_DATA_MESSAGES_VERSION, LLMQType, ProTxHash, QuorumHash, QuorumMessage,
};

use crate::bls::BlsWorker;
use crate::chain::{ChainView, MasternodeSyncStatus, QuorumBlockProcessor};
use crate::dkg::{DkgSessionManager, VerifiedContributions};
use crate::error::{NetworkError, NetworkResult};
use crate::masternode::MasternodeListProvider;
use crate::network::QuorumConnectionManager;
use crate::types::{BlockRef, PeerId, QuorumPeer};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn xor_32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a[i] ^ b[i];
    }
    out
}

/// XOR based stand-in for BLS arithmetic.
///
/// A public key is the secret key followed by 16 zero bytes, the all-zero secret key is
/// invalid, summing is XOR and the key share of a member is its proTxHash XOR the first
/// 32 bytes of the verification vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockBlsWorker;

impl MockBlsWorker {
    pub fn public_key_of(secret_key: &BLSSecretKey) -> BLSPublicKey {
        let mut bytes = [0u8; 48];
        bytes[..32].copy_from_slice(secret_key.as_bytes());
        BLSPublicKey::from_bytes(bytes)
    }

    pub fn secret_key_share(vvec: &[BLSPublicKey], pro_tx_hash: &ProTxHash) -> BLSSecretKey {
        use dash_llmq_types::bitcoin_hashes::Hash;

        let mut head = [0u8; 32];
        if let Some(first) = vvec.first() {
            head.copy_from_slice(&first.as_bytes()[..32]);
        }
        BLSSecretKey::from_bytes(xor_32(pro_tx_hash.as_byte_array(), &head))
    }

    pub fn xor_48(a: &[u8; 48], b: &[u8; 48]) -> [u8; 48] {
        let mut out = [0u8; 48];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = a[i] ^ b[i];
        }
        out
    }
}

impl BlsWorker for MockBlsWorker {
    fn build_quorum_verification_vector(
        &self,
        vvecs: &[Arc<Vec<BLSPublicKey>>],
    ) -> Option<Vec<BLSPublicKey>> {
        let len = vvecs.first()?.len();
        if len == 0 || vvecs.iter().any(|vvec| vvec.len() != len) {
            return None;
        }
        Some(
            (0..len)
                .map(|k| {
                    let sum = vvecs
                        .iter()
                        .fold([0u8; 48], |acc, vvec| Self::xor_48(&acc, vvec[k].as_bytes()));
                    BLSPublicKey::from_bytes(sum)
                })
                .collect(),
        )
    }

    fn aggregate_secret_keys(&self, keys: &[BLSSecretKey]) -> Option<BLSSecretKey> {
        if keys.is_empty() {
            return None;
        }
        let sum = keys.iter().fold([0u8; 32], |acc, key| xor_32(&acc, key.as_bytes()));
        let secret_key = BLSSecretKey::from_bytes(sum);
        (!secret_key.is_zeroed()).then_some(secret_key)
    }

    fn build_public_key_share(
        &self,
        vvec: &[BLSPublicKey],
        pro_tx_hash: &ProTxHash,
    ) -> Option<BLSPublicKey> {
        if vvec.is_empty() {
            return None;
        }
        self.public_key(&Self::secret_key_share(vvec, pro_tx_hash))
    }

    fn public_key(&self, secret_key: &BLSSecretKey) -> Option<BLSPublicKey> {
        (!secret_key.is_zeroed()).then(|| Self::public_key_of(secret_key))
    }

    fn decrypt_contribution(
        &self,
        encrypted: &BLSIESEncryptedSecretKey,
        _member_index: usize,
        _operator_key: &BLSSecretKey,
    ) -> Option<BLSSecretKey> {
        let bytes: [u8; 32] = encrypted.data.as_slice().try_into().ok()?;
        Some(BLSSecretKey::from_bytes(bytes))
    }
}

#[derive(Debug, Default)]
pub struct MockChain {
    by_hash: Mutex<HashMap<BlockHash, BlockRef>>,
    by_height: Mutex<BTreeMap<u32, BlockRef>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a block to the active chain, replacing any block at the same height.
    pub fn add_block(&self, block: BlockRef) {
        if let Some(old) = lock(&self.by_height).insert(block.height, block) {
            lock(&self.by_hash).remove(&old.hash);
        }
        lock(&self.by_hash).insert(block.hash, block);
    }

    /// Adds a filler block at `height` and returns it.
    pub fn add_block_at(&self, height: u32) -> BlockRef {
        use dash_llmq_types::bitcoin_hashes::Hash;

        let mut bytes = [0u8; 32];
        bytes[0] = 0xa0;
        bytes[1..5].copy_from_slice(&height.to_le_bytes());
        let block = BlockRef::new(BlockHash::from_byte_array(bytes), height);
        self.add_block(block);
        block
    }
}

impl ChainView for MockChain {
    fn lookup_block(&self, hash: &BlockHash) -> Option<BlockRef> {
        lock(&self.by_hash).get(hash).copied()
    }

    fn ancestor(&self, block: &BlockRef, height: u32) -> Option<BlockRef> {
        if height > block.height {
            return None;
        }
        lock(&self.by_height).get(&height).copied()
    }

    fn tip(&self) -> Option<BlockRef> {
        lock(&self.by_height).values().next_back().copied()
    }
}

#[derive(Debug, Default)]
pub struct MockBlockProcessor {
    commitments: Mutex<HashMap<(LLMQType, QuorumHash), (FinalCommitment, BlockHash, BlockRef)>>,
}

impl MockBlockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_commitment(
        &self,
        llmq_type: LLMQType,
        quorum_block: BlockRef,
        commitment: FinalCommitment,
        mined_block_hash: BlockHash,
    ) {
        lock(&self.commitments).insert(
            (llmq_type, QuorumHash::from(quorum_block.hash)),
            (commitment, mined_block_hash, quorum_block),
        );
    }

    /// Simulates a reorg that disconnects the block containing the commitment.
    pub fn remove_commitment(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash) {
        lock(&self.commitments).remove(&(llmq_type, *quorum_hash));
    }
}

impl QuorumBlockProcessor for MockBlockProcessor {
    fn has_mined_commitment(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash) -> bool {
        lock(&self.commitments).contains_key(&(llmq_type, *quorum_hash))
    }

    fn get_mined_commitment(
        &self,
        llmq_type: LLMQType,
        quorum_hash: &QuorumHash,
    ) -> Option<(FinalCommitment, BlockHash)> {
        lock(&self.commitments)
            .get(&(llmq_type, *quorum_hash))
            .map(|(commitment, mined, _)| (commitment.clone(), *mined))
    }

    fn mined_commitments_until_block(
        &self,
        llmq_type: LLMQType,
        block: &BlockRef,
        max_count: usize,
    ) -> Vec<BlockRef> {
        let mut blocks: Vec<BlockRef> = lock(&self.commitments)
            .iter()
            .filter(|((t, _), (_, _, quorum_block))| {
                *t == llmq_type && quorum_block.height <= block.height
            })
            .map(|(_, (_, _, quorum_block))| *quorum_block)
            .collect();
        blocks.sort_by(|a, b| b.height.cmp(&a.height));
        blocks.truncate(max_count);
        blocks
    }
}

#[derive(Debug, Default)]
pub struct MockMasternodeList {
    members: Mutex<HashMap<(LLMQType, BlockHash), Vec<ProTxHash>>>,
}

impl MockMasternodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_members(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        members: Vec<ProTxHash>,
    ) {
        lock(&self.members).insert((llmq_type, quorum_block.hash), members);
    }
}

impl MasternodeListProvider for MockMasternodeList {
    fn quorum_members(&self, llmq_type: LLMQType, quorum_block: &BlockRef) -> Vec<ProTxHash> {
        lock(&self.members).get(&(llmq_type, quorum_block.hash)).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub struct MockDkgSessionManager {
    verified: Mutex<HashMap<(LLMQType, BlockHash), VerifiedContributions>>,
    encrypted: Mutex<HashMap<(LLMQType, BlockHash, ProTxHash), Vec<BLSIESEncryptedSecretKey>>>,
}

impl MockDkgSessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verified_contributions(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        contributions: VerifiedContributions,
    ) {
        lock(&self.verified).insert((llmq_type, quorum_block.hash), contributions);
    }

    pub fn set_encrypted_contributions(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        pro_tx_hash: ProTxHash,
        contributions: Vec<BLSIESEncryptedSecretKey>,
    ) {
        lock(&self.encrypted).insert((llmq_type, quorum_block.hash, pro_tx_hash), contributions);
    }
}

impl DkgSessionManager for MockDkgSessionManager {
    fn get_verified_contributions(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        _valid_members: &[bool],
    ) -> Option<VerifiedContributions> {
        lock(&self.verified).get(&(llmq_type, quorum_block.hash)).cloned()
    }

    fn get_encrypted_contributions(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        _valid_members: &[bool],
        pro_tx_hash: &ProTxHash,
    ) -> Option<Vec<BLSIESEncryptedSecretKey>> {
        lock(&self.encrypted).get(&(llmq_type, quorum_block.hash, *pro_tx_hash)).cloned()
    }
}

/// Records everything the manager asks of the network.
#[derive(Debug, Default)]
pub struct MockConnectionManager {
    peers: Mutex<HashMap<ProTxHash, QuorumPeer>>,
    sent: Mutex<Vec<(PeerId, QuorumMessage)>>,
    pending_masternodes: Mutex<Vec<ProTxHash>>,
    disconnected: Mutex<Vec<PeerId>>,
    quorum_nodes: Mutex<HashMap<(LLMQType, QuorumHash), Vec<ProTxHash>>>,
    unreachable: Mutex<HashSet<ProTxHash>>,
    auto_connect: AtomicBool,
    next_peer_id: AtomicU64,
}

impl MockConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to a masternode as soon as a connection is requested.
    pub fn with_auto_connect(self) -> Self {
        self.auto_connect.store(true, Ordering::SeqCst);
        self
    }

    /// Masternodes that never accept a connection.
    pub fn set_unreachable(&self, pro_tx_hash: ProTxHash) {
        lock(&self.unreachable).insert(pro_tx_hash);
    }

    /// Registers a connected peer authenticated as `pro_tx_hash`.
    pub fn connect_masternode(&self, pro_tx_hash: ProTxHash) -> QuorumPeer {
        let peer = QuorumPeer {
            id: PeerId(self.next_peer_id.fetch_add(1, Ordering::SeqCst) + 1),
            version: LLMQ_DATA_MESSAGES_VERSION,
            verified_pro_reg_tx_hash: Some(pro_tx_hash),
            qwatch: false,
        };
        lock(&self.peers).insert(pro_tx_hash, peer.clone());
        peer
    }

    pub fn sent_messages(&self) -> Vec<(PeerId, QuorumMessage)> {
        lock(&self.sent).clone()
    }

    pub fn take_sent_messages(&self) -> Vec<(PeerId, QuorumMessage)> {
        std::mem::take(&mut *lock(&self.sent))
    }

    pub fn pending_masternodes(&self) -> Vec<ProTxHash> {
        lock(&self.pending_masternodes).clone()
    }

    pub fn disconnected(&self) -> Vec<PeerId> {
        lock(&self.disconnected).clone()
    }

    pub fn quorum_nodes(&self) -> HashMap<(LLMQType, QuorumHash), Vec<ProTxHash>> {
        lock(&self.quorum_nodes).clone()
    }

    /// The masternode a connected peer authenticated as.
    pub fn masternode_of(&self, peer: PeerId) -> Option<ProTxHash> {
        lock(&self.peers)
            .values()
            .find(|p| p.id == peer)
            .and_then(|p| p.verified_pro_reg_tx_hash)
    }
}

#[async_trait]
impl QuorumConnectionManager for MockConnectionManager {
    async fn add_pending_masternode(&self, pro_tx_hash: ProTxHash) {
        lock(&self.pending_masternodes).push(pro_tx_hash);
        if self.auto_connect.load(Ordering::SeqCst)
            && !lock(&self.unreachable).contains(&pro_tx_hash)
            && !lock(&self.peers).contains_key(&pro_tx_hash)
        {
            self.connect_masternode(pro_tx_hash);
        }
    }

    async fn connected_peer(&self, pro_tx_hash: &ProTxHash) -> Option<QuorumPeer> {
        lock(&self.peers).get(pro_tx_hash).cloned()
    }

    async fn send_message(&self, peer: PeerId, message: QuorumMessage) -> NetworkResult<()> {
        if !lock(&self.peers).values().any(|p| p.id == peer) {
            return Err(NetworkError::NotConnected(peer));
        }
        lock(&self.sent).push((peer, message));
        Ok(())
    }

    async fn disconnect(&self, peer: PeerId) {
        lock(&self.peers).retain(|_, p| p.id != peer);
        lock(&self.disconnected).push(peer);
    }

    async fn masternode_quorums(&self, llmq_type: LLMQType) -> HashSet<QuorumHash> {
        lock(&self.quorum_nodes)
            .keys()
            .filter(|(t, _)| *t == llmq_type)
            .map(|(_, quorum_hash)| *quorum_hash)
            .collect()
    }

    async fn set_masternode_quorum_nodes(
        &self,
        llmq_type: LLMQType,
        quorum_hash: QuorumHash,
        members: Vec<ProTxHash>,
    ) {
        lock(&self.quorum_nodes).insert((llmq_type, quorum_hash), members);
    }

    async fn remove_masternode_quorum_nodes(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash) {
        lock(&self.quorum_nodes).remove(&(llmq_type, *quorum_hash));
    }
}

#[derive(Debug)]
pub struct MockSyncStatus {
    synced: AtomicBool,
}

impl MockSyncStatus {
    pub fn new(synced: bool) -> Self {
        Self {
            synced: AtomicBool::new(synced),
        }
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }
}

impl MasternodeSyncStatus for MockSyncStatus {
    fn is_blockchain_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

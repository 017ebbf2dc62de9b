//! The quorum manager.
//!
//! Owns the cache of built quorums, the per-type scan cache, the outstanding data request
//! bookkeeping and every background task started for a quorum. All state is behind `Arc`,
//! so the manager is cheap to clone into spawned tasks.

mod connections;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dash_llmq_types::{
    BlockHash, DataMask, LLMQ_DATA_MESSAGES_VERSION, LLMQType, ProTxHash, QuorumDataRequest,
    QuorumHash, QuorumMessage, network::message_qdata::unix_time_now,
};
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bls::BlsWorker;
use crate::chain::{ChainView, MasternodeSyncStatus, QuorumBlockProcessor};
use crate::config::LlmqConfig;
use crate::dkg::DkgSessionManager;
use crate::error::Result;
use crate::masternode::MasternodeListProvider;
use crate::network::{MisbehaviorTracker, PeerKey, PendingDataRequests, QuorumConnectionManager};
use crate::quorum::Quorum;
use crate::quorum::recovery::run_data_recovery;
use crate::storage::QuorumDataStorage;
use crate::types::{BlockRef, PeerId, QuorumPeer};

/// Node services the quorum manager is built on.
#[derive(Clone)]
pub struct QuorumServices {
    pub chain: Arc<dyn ChainView>,
    pub block_processor: Arc<dyn QuorumBlockProcessor>,
    pub masternodes: Arc<dyn MasternodeListProvider>,
    pub dkg: Arc<dyn DkgSessionManager>,
    pub bls: Arc<dyn BlsWorker>,
    pub connections: Arc<dyn QuorumConnectionManager>,
    pub sync_status: Arc<dyn MasternodeSyncStatus>,
    pub storage: Arc<dyn QuorumDataStorage>,
}

#[derive(Default)]
struct QuorumCaches {
    quorums: HashMap<(LLMQType, QuorumHash), Arc<Quorum>>,
    /// Scan results per type keyed by the scan start block, least recently used first.
    scans: HashMap<LLMQType, IndexMap<BlockHash, Vec<Arc<Quorum>>>>,
}

#[derive(Clone)]
pub struct QuorumManager {
    pub(crate) config: Arc<LlmqConfig>,
    pub(crate) services: QuorumServices,
    caches: Arc<Mutex<QuorumCaches>>,
    pub(crate) pending_requests: Arc<Mutex<PendingDataRequests>>,
    pub(crate) misbehavior: Arc<MisbehaviorTracker>,
    tasks: Arc<Mutex<JoinSet<()>>>,
    shutdown_token: CancellationToken,
}

impl QuorumManager {
    /// Creates a manager after validating `config`.
    pub fn new(config: LlmqConfig, services: QuorumServices) -> Result<Self> {
        config.validate()?;
        info!(
            "Quorum manager for {} quorum types (masternode mode: {}, data recovery: {})",
            config.llmq_types.len(),
            config.masternode_mode,
            config.quorum_data_recovery
        );
        Ok(Self {
            config: Arc::new(config),
            services,
            caches: Arc::new(Mutex::new(QuorumCaches::default())),
            pending_requests: Arc::new(Mutex::new(PendingDataRequests::new())),
            misbehavior: Arc::new(MisbehaviorTracker::new()),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            shutdown_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &LlmqConfig {
        &self.config
    }

    pub(crate) fn connections(&self) -> &dyn QuorumConnectionManager {
        self.services.connections.as_ref()
    }

    pub(crate) fn sync_status(&self) -> &dyn MasternodeSyncStatus {
        self.services.sync_status.as_ref()
    }

    pub(crate) fn block_processor(&self) -> &dyn QuorumBlockProcessor {
        self.services.block_processor.as_ref()
    }

    /// Our proTxHash, if running as a masternode.
    pub fn local_pro_tx_hash(&self) -> Option<ProTxHash> {
        if !self.config.masternode_mode {
            return None;
        }
        self.config.active_masternode.as_ref().map(|info| info.pro_tx_hash)
    }

    /// Whether a commitment for the quorum is mined on the active chain.
    pub fn has_quorum(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash) -> bool {
        self.block_processor().has_mined_commitment(llmq_type, quorum_hash)
    }

    /// Looks up a quorum by its hash, building it on first access.
    pub async fn get_quorum(
        &self,
        llmq_type: LLMQType,
        quorum_hash: &QuorumHash,
    ) -> Option<Arc<Quorum>> {
        let Some(block) = self.services.chain.lookup_block(&BlockHash::from(*quorum_hash)) else {
            debug!("{} {}: quorum block not found", llmq_type, quorum_hash);
            return None;
        };
        self.get_quorum_for_block(llmq_type, &block).await
    }

    /// The quorum formed at `quorum_block`.
    ///
    /// The mined commitment is checked on every call: a cached quorum whose commitment was
    /// reorged away is evicted and its tasks are stopped.
    pub async fn get_quorum_for_block(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
    ) -> Option<Arc<Quorum>> {
        let quorum_hash = QuorumHash::from(quorum_block.hash);

        if !self.has_quorum(llmq_type, &quorum_hash) {
            self.evict_quorum(llmq_type, &quorum_hash).await;
            return None;
        }

        if let Some(quorum) = self.caches.lock().await.quorums.get(&(llmq_type, quorum_hash)) {
            return Some(quorum.clone());
        }

        self.build_quorum_from_commitment(llmq_type, quorum_block).await
    }

    async fn evict_quorum(&self, llmq_type: LLMQType, quorum_hash: &QuorumHash) {
        let mut caches = self.caches.lock().await;
        if let Some(quorum) = caches.quorums.remove(&(llmq_type, *quorum_hash)) {
            quorum.stop();
            if let Some(scans) = caches.scans.get_mut(&llmq_type) {
                scans.retain(|_, quorums| quorums.iter().all(|q| !Arc::ptr_eq(q, &quorum)));
            }
            debug!("{} {}: evicted, commitment no longer mined", llmq_type, quorum_hash);
        }
    }

    async fn build_quorum_from_commitment(
        &self,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
    ) -> Option<Arc<Quorum>> {
        let quorum_hash = QuorumHash::from(quorum_block.hash);
        let (commitment, mined_block_hash) =
            self.block_processor().get_mined_commitment(llmq_type, &quorum_hash)?;

        let members = self.services.masternodes.quorum_members(llmq_type, quorum_block);
        if members.len() != commitment.valid_members.len() {
            warn!(
                "{} {}: member count {} does not match commitment size {}",
                llmq_type,
                quorum_hash,
                members.len(),
                commitment.valid_members.len()
            );
            return None;
        }

        let quorum = Arc::new(Quorum::new(
            llmq_type.params(),
            commitment,
            *quorum_block,
            mined_block_hash,
            members,
            self.local_pro_tx_hash(),
            self.services.bls.clone(),
            self.shutdown_token.child_token(),
        ));

        let has_vvec = match quorum.load_contributions(self.services.storage.as_ref()).await {
            Ok(true) => true,
            Ok(false) => self.build_quorum_contributions(&quorum).await,
            Err(e) => {
                warn!("{} {}: failed to load contributions: {}", llmq_type, quorum_hash, e);
                self.build_quorum_contributions(&quorum).await
            }
        };

        let (quorum, inserted) = {
            let mut caches = self.caches.lock().await;
            match caches.quorums.get(&(llmq_type, quorum_hash)) {
                Some(existing) => (existing.clone(), false),
                None => {
                    caches.quorums.insert((llmq_type, quorum_hash), quorum.clone());
                    (quorum, true)
                }
            }
        };

        if inserted && has_vvec {
            self.start_cache_populator(quorum.clone()).await;
        }
        Some(quorum)
    }

    /// Assembles key material from the contributions we verified during the DKG and
    /// persists it. Returns whether a verification vector is now known.
    async fn build_quorum_contributions(&self, quorum: &Arc<Quorum>) -> bool {
        let dkg = self.services.dkg.clone();
        let bls = self.services.bls.clone();
        let target = quorum.clone();

        let built = tokio::task::spawn_blocking(move || {
            let contributions = dkg.get_verified_contributions(
                target.llmq_type(),
                target.quorum_block(),
                &target.commitment().valid_members,
            )?;
            let vvec = bls.build_quorum_verification_vector(&contributions.vvecs)?;
            let secret_key = bls.aggregate_secret_keys(&contributions.sk_contributions);
            Some((vvec, secret_key))
        })
        .await;

        let (vvec, secret_key) = match built {
            Ok(Some(built)) => built,
            Ok(None) => return false,
            Err(e) => {
                error!("{}: contribution building task failed: {}", quorum.quorum_hash(), e);
                return false;
            }
        };

        if let Err(e) = quorum.set_verification_vector(vvec) {
            warn!("{}: built verification vector rejected: {}", quorum.quorum_hash(), e);
            return false;
        }
        match secret_key {
            Some(secret_key) => {
                if let Err(e) = quorum.set_secret_key_share(secret_key) {
                    warn!("{}: built secret key share rejected: {}", quorum.quorum_hash(), e);
                }
            }
            None => warn!("{}: failed to build skShare", quorum.quorum_hash()),
        }

        if let Err(e) = quorum.persist_contributions(self.services.storage.as_ref()).await {
            warn!("{}: failed to persist contributions: {}", quorum.quorum_hash(), e);
        }
        true
    }

    /// The last `max_count` quorums of `llmq_type` mined up to `start`, newest first.
    ///
    /// Scans of up to `signing_active_quorum_count + 1` quorums are cached per start block.
    pub async fn scan_quorums(
        &self,
        llmq_type: LLMQType,
        start: &BlockRef,
        max_count: usize,
    ) -> Vec<Arc<Quorum>> {
        if !self.config.is_type_enabled(llmq_type) {
            return vec![];
        }

        let cache_max = llmq_type.params().signing_active_quorum_count as usize + 1;
        let store_cache = max_count <= cache_max;

        if store_cache {
            let mut caches = self.caches.lock().await;
            if let Some(scans) = caches.scans.get_mut(&llmq_type) {
                if let Some(quorums) = scans.shift_remove(&start.hash) {
                    let result = quorums.iter().take(max_count).cloned().collect();
                    scans.insert(start.hash, quorums);
                    return result;
                }
            }
        }

        let fetch = max_count.max(cache_max);
        let blocks =
            self.block_processor().mined_commitments_until_block(llmq_type, start, fetch);

        let mut quorums = Vec::with_capacity(blocks.len());
        for block in &blocks {
            match self.get_quorum_for_block(llmq_type, block).await {
                Some(quorum) => quorums.push(quorum),
                None => warn!("{} {}: mined quorum could not be built", llmq_type, block.hash),
            }
        }

        if store_cache {
            let mut caches = self.caches.lock().await;
            let scans = caches.scans.entry(llmq_type).or_default();
            scans.shift_remove(&start.hash);
            scans.insert(start.hash, quorums.clone());
            while scans.len() > cache_max {
                scans.shift_remove_index(0);
            }
        }

        quorums.truncate(max_count);
        quorums
    }

    /// Scans from the current chain tip.
    pub async fn scan_quorums_at_tip(
        &self,
        llmq_type: LLMQType,
        max_count: usize,
    ) -> Vec<Arc<Quorum>> {
        match self.services.chain.tip() {
            Some(tip) => self.scan_quorums(llmq_type, &tip, max_count).await,
            None => vec![],
        }
    }

    /// Block tip notification: maintain quorum connections, drop expired requests and
    /// start data recovery where needed.
    pub async fn on_new_chain_tip(&self, tip: &BlockRef) {
        if !self.sync_status().is_blockchain_synced() {
            trace!("Ignoring tip {} before sync", tip.height);
            return;
        }

        for llmq_type in self.config.llmq_types.clone() {
            self.ensure_quorum_connections(llmq_type, tip).await;
        }

        self.purge_expired_requests().await;
        self.trigger_data_recovery(tip).await;
    }

    /// Drops expired request bookkeeping in both directions.
    pub async fn purge_expired_requests(&self) -> usize {
        let purged = self.pending_requests.lock().await.purge_expired(unix_time_now());
        if purged > 0 {
            debug!("Purged {} expired quorum data requests", purged);
        }
        purged
    }

    /// Starts a recovery task for every recent quorum we lack data for.
    pub async fn trigger_data_recovery(&self, tip: &BlockRef) {
        if !self.config.quorum_data_recovery {
            return;
        }
        let Some(local_pro_tx_hash) = self.local_pro_tx_hash() else {
            return;
        };

        for llmq_type in self.config.llmq_types.clone() {
            let scan_count = llmq_type.params().signing_active_quorum_count as usize + 1;
            for quorum in self.scan_quorums(llmq_type, tip, scan_count).await {
                if quorum.is_data_recovery_running() {
                    continue;
                }

                let is_member = quorum.is_valid_member(&local_pro_tx_hash);
                let wants_vvec = is_member || self.config.requests_qvvec.contains(&llmq_type);

                let mut data_mask = DataMask::empty();
                if wants_vvec && !quorum.has_verification_vector() {
                    data_mask |= DataMask::QUORUM_VERIFICATION_VECTOR;
                }
                if is_member && quorum.secret_key_share().is_none() {
                    data_mask |= DataMask::ENCRYPTED_CONTRIBUTIONS;
                }

                if data_mask.is_empty() {
                    trace!("{} {}: No data needed", llmq_type, quorum.quorum_hash());
                    continue;
                }

                self.start_data_recovery(quorum, data_mask, local_pro_tx_hash).await;
            }
        }
    }

    /// Starts the recovery task of `quorum` unless one is already running.
    pub async fn start_data_recovery(
        &self,
        quorum: Arc<Quorum>,
        data_mask: DataMask,
        local_pro_tx_hash: ProTxHash,
    ) -> bool {
        if !quorum.try_begin_recovery() {
            return false;
        }

        let manager = self.clone();
        let task_quorum = quorum.clone();
        let spawned = self
            .spawn(async move {
                run_data_recovery(manager, task_quorum, data_mask, local_pro_tx_hash).await;
            })
            .await;
        if !spawned {
            quorum.end_recovery();
        }
        spawned
    }

    /// Precomputes public key shares on a blocking worker.
    pub(crate) async fn start_cache_populator(&self, quorum: Arc<Quorum>) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        let mut tasks = self.tasks.lock().await;
        reap_finished(&mut tasks);
        tasks.spawn_blocking(move || {
            let populated = quorum.populate_public_key_share_cache();
            trace!("{}: cached {} public key shares", quorum.quorum_hash(), populated);
        });
    }

    async fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutdown_token.is_cancelled() {
            return false;
        }
        let mut tasks = self.tasks.lock().await;
        reap_finished(&mut tasks);
        tasks.spawn(task);
        true
    }

    /// Sends a `qgetdata` for the quorum at `quorum_block` to `peer`.
    ///
    /// Returns false without sending if the peer cannot serve quorum data, the quorum is
    /// unknown or an unexpired request to the same peer is outstanding.
    pub async fn request_quorum_data(
        &self,
        peer: &QuorumPeer,
        llmq_type: LLMQType,
        quorum_block: &BlockRef,
        data_mask: DataMask,
        pro_tx_hash: &ProTxHash,
    ) -> bool {
        if peer.version < LLMQ_DATA_MESSAGES_VERSION {
            warn!("{}: Version must be {} or greater", peer.id, LLMQ_DATA_MESSAGES_VERSION);
            return false;
        }
        if !peer.is_quorum_peer() {
            warn!("{}: not a verified masternode or a qwatch connection", peer.id);
            return false;
        }
        if !self.config.is_type_enabled(llmq_type) {
            warn!("{}: Invalid llmqType: {}", peer.id, llmq_type);
            return false;
        }
        if self.get_quorum_for_block(llmq_type, quorum_block).await.is_none() {
            warn!("{}: Quorum not found: {}", peer.id, quorum_block.hash);
            return false;
        }

        let request = QuorumDataRequest::new(
            llmq_type.into(),
            QuorumHash::from(quorum_block.hash),
            data_mask,
            *pro_tx_hash,
        );
        let inserted = self.pending_requests.lock().await.insert(
            PeerKey::for_peer(peer),
            true,
            request.clone(),
            unix_time_now(),
        );
        if !inserted {
            trace!("{}: Already requested", peer.id);
            return false;
        }

        let message = QuorumMessage::GetData(request);
        if let Err(e) = self.connections().send_message(peer.id, message).await {
            warn!("{}: failed to send qgetdata: {}", peer.id, e);
            self.pending_requests.lock().await.remove(&PeerKey::for_peer(peer), true);
            return false;
        }
        debug!("{}: requested {:?} of {} {}", peer.id, data_mask, llmq_type, quorum_block.hash);
        true
    }

    /// Whether an unexpired outbound request to the masternode is outstanding.
    pub async fn has_pending_outbound_request(&self, pro_tx_hash: &ProTxHash) -> bool {
        let now = unix_time_now();
        self.pending_requests
            .lock()
            .await
            .get(&PeerKey::Masternode(*pro_tx_hash), true)
            .is_some_and(|request| !request.is_expired_at(now))
    }

    /// Processed flag of the outbound request to the masternode, `None` without one.
    pub async fn outbound_request_processed(&self, pro_tx_hash: &ProTxHash) -> Option<bool> {
        self.pending_requests
            .lock()
            .await
            .get(&PeerKey::Masternode(*pro_tx_hash), true)
            .map(|request| request.is_processed())
    }

    /// Charges `score` to the peer and disconnects it once banned.
    pub(crate) async fn misbehaving(&self, peer: PeerId, score: i32, reason: &str) {
        if self.misbehavior.misbehaving(peer, score, reason).await {
            self.connections().disconnect(peer).await;
        }
    }

    pub async fn peer_misbehavior_score(&self, peer: &PeerId) -> i32 {
        self.misbehavior.score(peer).await
    }

    pub async fn cached_quorum_count(&self) -> usize {
        self.caches.lock().await.quorums.len()
    }

    /// Looks up a cached quorum without building it.
    pub(crate) async fn cached_quorum(
        &self,
        llmq_type: LLMQType,
        quorum_hash: &QuorumHash,
    ) -> Option<Arc<Quorum>> {
        self.caches.lock().await.quorums.get(&(llmq_type, *quorum_hash)).cloned()
    }

    /// Stops every background task and waits for them to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down quorum manager");
        self.shutdown_token.cancel();

        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    error!("Quorum task failed: {}", e);
                }
            }
        }

        let mut caches = self.caches.lock().await;
        caches.scans.clear();
        caches.quorums.clear();
    }
}

fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            error!("Quorum task failed: {}", e);
        }
    }
}

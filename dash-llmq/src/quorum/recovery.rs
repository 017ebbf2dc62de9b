//! Recovery of missing quorum data from other members.
//!
//! One task per quorum walks the valid members in random order. For each candidate it asks
//! the connection manager for a connection, sends a `qgetdata` once connected and waits for
//! the answer. A candidate is given up after [`REQUEST_TIMEOUT`] without progress; the task
//! ends once all requested data is present, every candidate was tried, the quorum is no
//! longer mined or the quorum is stopped.

use std::sync::Arc;

use dash_llmq_types::{DataMask, ProTxHash};
use rand::seq::SliceRandom;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::Quorum;
use crate::config::REQUEST_TIMEOUT;
use crate::manager::QuorumManager;

/// How a recovery task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// All requested data is present.
    Success,
    /// Every candidate was tried without getting the data.
    Exhausted,
    /// Stopped by shutdown, eviction or a reorg of the quorum.
    Aborted,
}

/// Drops the bits of data the quorum already has.
fn remaining_mask(quorum: &Quorum, mut mask: DataMask) -> DataMask {
    if quorum.has_verification_vector() {
        mask.remove(DataMask::QUORUM_VERIFICATION_VECTOR);
    }
    if quorum.secret_key_share().is_some() {
        mask.remove(DataMask::ENCRYPTED_CONTRIBUTIONS);
    }
    mask
}

/// Sleeps for one request period. Returns true if the quorum was stopped meanwhile.
async fn wait(quorum: &Quorum) -> bool {
    tokio::select! {
        _ = quorum.stop_token().cancelled() => true,
        _ = quorum.data_received().notified() => false,
        _ = tokio::time::sleep(REQUEST_TIMEOUT) => false,
    }
}

pub(crate) async fn run_data_recovery(
    manager: QuorumManager,
    quorum: Arc<Quorum>,
    data_mask: DataMask,
    local_pro_tx_hash: ProTxHash,
) -> RecoveryOutcome {
    let outcome = recover(&manager, &quorum, data_mask, local_pro_tx_hash).await;
    quorum.end_recovery();
    debug!(
        "{} {}: Data recovery done: {:?}",
        quorum.llmq_type(),
        quorum.quorum_hash(),
        outcome
    );
    outcome
}

async fn recover(
    manager: &QuorumManager,
    quorum: &Quorum,
    mut data_mask: DataMask,
    local_pro_tx_hash: ProTxHash,
) -> RecoveryOutcome {
    let llmq_type = quorum.llmq_type();
    let quorum_hash = quorum.quorum_hash();

    while !manager.sync_status().is_blockchain_synced() {
        if wait(quorum).await {
            debug!("{} {}: Aborted while waiting for sync", llmq_type, quorum_hash);
            return RecoveryOutcome::Aborted;
        }
    }

    let mut candidates = quorum.valid_members_except(Some(&local_pro_tx_hash));
    candidates.shuffle(&mut rand::thread_rng());

    let mut tries = 0;
    let mut last_success: Option<Instant> = None;
    let mut current: Option<ProTxHash> = None;

    debug!(
        "{} {}: Start data recovery, mask {:?}, {} candidates",
        llmq_type,
        quorum_hash,
        data_mask,
        candidates.len()
    );

    loop {
        if quorum.stop_token().is_cancelled() {
            return RecoveryOutcome::Aborted;
        }
        if !manager.block_processor().has_mined_commitment(llmq_type, &quorum_hash) {
            debug!("{} {}: Aborted, commitment no longer mined", llmq_type, quorum_hash);
            return RecoveryOutcome::Aborted;
        }

        data_mask = remaining_mask(quorum, data_mask);
        if data_mask.is_empty() {
            debug!("{} {}: Success", llmq_type, quorum_hash);
            return RecoveryOutcome::Success;
        }

        if last_success.is_none_or(|at| at.elapsed() > REQUEST_TIMEOUT) {
            let Some(member) = candidates.get(tries).copied() else {
                debug!(
                    "{} {}: All tried but failed, tries {}",
                    llmq_type,
                    quorum_hash,
                    tries
                );
                return RecoveryOutcome::Exhausted;
            };
            tries += 1;
            current = Some(member);

            if manager.has_pending_outbound_request(&member).await {
                debug!("{} {}: Already asked {}", llmq_type, quorum_hash, member);
                continue;
            }

            last_success = Some(Instant::now());
            manager.connections().add_pending_masternode(member).await;
            debug!("{} {}: Connect to {}", llmq_type, quorum_hash, member);
        }

        if let Some(member) = current {
            if let Some(peer) = manager.connections().connected_peer(&member).await {
                if manager
                    .request_quorum_data(
                        &peer,
                        llmq_type,
                        quorum.quorum_block(),
                        data_mask,
                        &local_pro_tx_hash,
                    )
                    .await
                {
                    last_success = Some(Instant::now());
                    debug!("{} {}: Requested data from {}", llmq_type, quorum_hash, member);
                } else {
                    match manager.outbound_request_processed(&member).await {
                        Some(false) => {
                            trace!("{} {}: Waiting for {}", llmq_type, quorum_hash, member);
                        }
                        processed => {
                            debug!(
                                "{} {}: Done with {} (answered: {})",
                                llmq_type,
                                quorum_hash,
                                member,
                                processed.is_some()
                            );
                            manager.connections().disconnect(peer.id).await;
                            current = None;
                        }
                    }
                }
            }
        }

        if wait(quorum).await {
            return RecoveryOutcome::Aborted;
        }
    }
}

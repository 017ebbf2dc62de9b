//! Misbehavior tracking for peers exchanging quorum data.
//!
//! Scores accumulate per connection and decay over time. A peer reaching
//! [`MAX_MISBEHAVIOR_SCORE`] is banned; the caller disconnects it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::types::PeerId;

/// Ban duration for misbehaving peers
pub const BAN_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Score decay interval
const DECAY_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Amount to decay the score per interval
const DECAY_AMOUNT: i32 = 5;

/// Score at which a peer is banned
pub const MAX_MISBEHAVIOR_SCORE: i32 = 100;

#[derive(Debug, Clone)]
pub struct PeerMisbehavior {
    pub score: i32,
    pub ban_count: u32,
    pub banned_until: Option<Instant>,
    pub last_update: Instant,
}

impl Default for PeerMisbehavior {
    fn default() -> Self {
        Self {
            score: 0,
            ban_count: 0,
            banned_until: None,
            last_update: Instant::now(),
        }
    }
}

impl PeerMisbehavior {
    pub fn is_banned(&self) -> bool {
        self.banned_until.is_some_and(|until| Instant::now() < until)
    }

    fn apply_decay(&mut self) {
        let now = Instant::now();
        let intervals = (now - self.last_update).as_secs() / DECAY_INTERVAL.as_secs();
        if intervals > 0 {
            let intervals = intervals.min(i32::MAX as u64) as i32;
            self.score = (self.score - intervals.saturating_mul(DECAY_AMOUNT)).max(0);
            self.last_update = now;
        }

        if self.banned_until.is_some_and(|until| now >= until) {
            self.banned_until = None;
        }
    }
}

/// Misbehavior scores of connected peers.
#[derive(Debug, Default)]
pub struct MisbehaviorTracker {
    peers: Arc<RwLock<HashMap<PeerId, PeerMisbehavior>>>,
}

impl MisbehaviorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `score` to the peer. Returns true if the peer just got banned.
    pub async fn misbehaving(&self, peer: PeerId, score: i32, reason: &str) -> bool {
        let mut peers = self.peers.write().await;
        let entry = peers.entry(peer).or_default();
        entry.apply_decay();

        let old_score = entry.score;
        entry.score = (entry.score + score).clamp(0, MAX_MISBEHAVIOR_SCORE);

        let should_ban = entry.score >= MAX_MISBEHAVIOR_SCORE && !entry.is_banned();
        if should_ban {
            entry.banned_until = Some(Instant::now() + BAN_DURATION);
            entry.ban_count += 1;
            tracing::warn!(
                "{} banned for misbehavior (score: {}, ban #{}, reason: {})",
                peer,
                entry.score,
                entry.ban_count,
                reason
            );
        } else {
            tracing::info!(
                "{} misbehaving: {} -> {} (reason: {})",
                peer,
                old_score,
                entry.score,
                reason
            );
        }

        should_ban
    }

    pub async fn score(&self, peer: &PeerId) -> i32 {
        let mut peers = self.peers.write().await;
        match peers.get_mut(peer) {
            Some(entry) => {
                entry.apply_decay();
                entry.score
            }
            None => 0,
        }
    }

    pub async fn is_banned(&self, peer: &PeerId) -> bool {
        let mut peers = self.peers.write().await;
        match peers.get_mut(peer) {
            Some(entry) => {
                entry.apply_decay();
                entry.is_banned()
            }
            None => false,
        }
    }

    /// Forgets a peer once its connection is gone.
    pub async fn remove_peer(&self, peer: &PeerId) {
        self.peers.write().await.remove(peer);
    }
}

// Include tests module
#[cfg(test)]
#[path = "misbehavior_tests.rs"]
mod misbehavior_tests;

//! Unit tests for misbehavior tracking (in-module tests)

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::*;

    #[tokio::test]
    async fn test_scores_accumulate() {
        let tracker = MisbehaviorTracker::new();
        let peer = PeerId(1);

        assert_eq!(tracker.score(&peer).await, 0);
        assert!(!tracker.misbehaving(peer, 10, "Not requested").await);
        assert!(!tracker.misbehaving(peer, 25, "Request limit exceeded").await);
        assert_eq!(tracker.score(&peer).await, 35);

        // other peers are unaffected
        assert_eq!(tracker.score(&PeerId(2)).await, 0);
    }

    #[tokio::test]
    async fn test_ban_at_threshold() {
        let tracker = MisbehaviorTracker::new();
        let peer = PeerId(7);

        for i in 0..10 {
            let banned = tracker.misbehaving(peer, 10, &format!("Violation {}", i)).await;
            // Should be banned on the 10th violation (total score = 100)
            assert_eq!(banned, i == 9);
        }
        assert!(tracker.is_banned(&peer).await);

        // already banned peers are not reported again
        assert!(!tracker.misbehaving(peer, 10, "Another").await);
        assert_eq!(tracker.score(&peer).await, MAX_MISBEHAVIOR_SCORE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_decays_and_ban_expires() {
        let tracker = MisbehaviorTracker::new();
        let peer = PeerId(3);

        tracker.misbehaving(peer, 20, "Malformed payload").await;
        tokio::time::advance(Duration::from_secs(2 * 60 * 60)).await;
        assert_eq!(tracker.score(&peer).await, 10);

        for _ in 0..4 {
            tracker.misbehaving(peer, 25, "Request limit exceeded").await;
        }
        assert!(tracker.is_banned(&peer).await);

        tokio::time::advance(BAN_DURATION).await;
        assert!(!tracker.is_banned(&peer).await);
    }

    #[tokio::test]
    async fn test_remove_peer() {
        let tracker = MisbehaviorTracker::new();
        let peer = PeerId(9);
        tracker.misbehaving(peer, 10, "Already received").await;
        tracker.remove_peer(&peer).await;
        assert_eq!(tracker.score(&peer).await, 0);
    }
}

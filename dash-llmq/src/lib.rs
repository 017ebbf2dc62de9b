//! Long-living masternode quorum (LLMQ) management for Dash nodes.
//!
//! This crate keeps track of the quorums mined on the active chain and of the key material
//! the local node holds for them:
//!
//! - Builds quorums from their mined final commitment and the deterministic member list
//! - Loads and persists verification vectors and secret key shares
//! - Recovers missing key material from other quorum members with `qgetdata` / `qdata`
//! - Serves quorum data to other members and rate limits requesting peers
//! - Maintains the connections to the members of recent quorums
//!
//! Chain access, the masternode list, the DKG session state, BLS arithmetic and the peer
//! connections are provided by the embedding node through the traits in [`chain`],
//! [`masternode`], [`dkg`], [`bls`] and [`network`].
//!
//! # Example
//!
//! ```no_run
//! use dash_llmq::{LlmqConfig, QuorumManager, QuorumServices};
//!
//! # async fn run(services: QuorumServices, tip: dash_llmq::BlockRef) -> dash_llmq::Result<()> {
//! let _logging = dash_llmq::init_console_logging(tracing::level_filters::LevelFilter::INFO)?;
//!
//! let manager = QuorumManager::new(LlmqConfig::mainnet(), services)?;
//! manager.on_new_chain_tip(&tip).await;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub mod bls;
pub mod chain;
pub mod config;
pub mod dkg;
pub mod error;
pub mod logging;
pub mod manager;
pub mod masternode;
pub mod network;
pub mod quorum;
pub mod storage;
pub mod types;

// Re-export main types for convenience
pub use config::{LlmqConfig, parse_data_recovery_flag, parse_requests_qvvec};
pub use error::{
    ConfigError, LlmqError, LoggingError, LoggingResult, NetworkError, QuorumError,
    QuorumMessageError, Result, StorageError,
};
pub use logging::{LogFileConfig, LoggingConfig, LoggingGuard, init_console_logging, init_logging};
pub use manager::{QuorumManager, QuorumServices};
pub use quorum::{Quorum, RecoveryOutcome};
pub use storage::{DiskQuorumStorage, MemoryQuorumStorage, QuorumDataStorage};
pub use types::{ActiveMasternodeInfo, BlockRef, PeerId, QuorumDataState, QuorumPeer};

pub use dash_llmq_types;

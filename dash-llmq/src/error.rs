//! Error types for the LLMQ subsystem.

use std::io;

use dash_llmq_types::QuorumDataError;
use thiserror::Error;

use crate::types::PeerId;

/// Main error type for the LLMQ subsystem.
#[derive(Debug, Error)]
pub enum LlmqError {
    #[error("Quorum error: {0}")]
    Quorum(#[from] QuorumError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Message error: {0}")]
    Message(#[from] QuorumMessageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] dash_llmq_types::consensus::encode::Error),
}

/// Validation failures of a single quorum's key material.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuorumError {
    #[error("Verification vector hash does not match the mined commitment")]
    VerificationVectorHashMismatch,

    #[error("A different verification vector is already set")]
    ConflictingVerificationVector,

    #[error("Secret key share is not a valid BLS secret key")]
    InvalidSecretKeyShare,

    #[error("Public key of the secret key share does not match the expected share of member {0}")]
    PublicKeyShareMismatch(usize),

    #[error("Verification vector is not set")]
    MissingVerificationVector,

    #[error("Local masternode is not a member of the quorum")]
    NotAMember,
}

/// Logging-related errors.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to create log directory: {0}")]
    DirectoryCreation(#[from] std::io::Error),

    #[error("Subscriber initialization failed: {0}")]
    SubscriberInit(String),

    #[error("Log rotation failed: {0}")]
    RotationFailed(String),
}

/// Storage-related errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Clone for StorageError {
    fn clone(&self) -> Self {
        match self {
            StorageError::Corruption(s) => StorageError::Corruption(s.clone()),
            StorageError::WriteFailed(s) => StorageError::WriteFailed(s.clone()),
            StorageError::ReadFailed(s) => StorageError::ReadFailed(s.clone()),
            StorageError::Io(err) => StorageError::Io(io::Error::new(err.kind(), err.to_string())),
            StorageError::Serialization(s) => StorageError::Serialization(s.clone()),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid llmqType in -llmq-requests-qvvec: {0}")]
    InvalidRequestsQvvecType(String),

    #[error("Duplicated llmqType in -llmq-requests-qvvec: {0}")]
    DuplicatedRequestsQvvecType(String),

    #[error("Invalid value for -llmq-quorum-data-recovery: {0}")]
    InvalidDataRecoveryValue(String),

    #[error("llmqType {0} in -llmq-requests-qvvec is not enabled on this network")]
    RequestsQvvecTypeNotEnabled(String),

    #[error("Duplicated quorum type {0}")]
    DuplicatedQuorumType(String),

    #[error("Masternode mode requires an active masternode identity")]
    MissingActiveMasternode,
}

/// Errors returned by the quorum connection manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Peer {0} is not connected")]
    NotConnected(PeerId),

    #[error("Failed to send message to peer {0}: {1}")]
    SendFailed(PeerId, String),
}

/// Reasons an inbound `qgetdata` / `qdata` message is rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuorumMessageError {
    #[error("Not a verified masternode or a qwatch connection")]
    Unauthenticated,

    #[error("Request limit exceeded")]
    RequestLimitExceeded,

    #[error("Not requested")]
    NotRequested,

    #[error("Already received")]
    AlreadyReceived,

    #[error("Not like requested")]
    NotLikeRequested,

    #[error("Error {0:?}")]
    PeerReportedError(QuorumDataError),

    #[error("Quorum not found")]
    QuorumNotFound,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid quorum verification vector")]
    InvalidVerificationVector,

    #[error("No valid quorum verification vector available")]
    VerificationVectorUnavailable,

    #[error("Not a member of the quorum")]
    NotAMember,

    #[error("Failed to decrypt")]
    DecryptionFailed,

    #[error("Invalid secret key share received")]
    InvalidSecretKeyShare,
}

impl QuorumMessageError {
    /// Misbehavior score charged to the sending peer. Zero means the rejection is only logged:
    /// the peer either legitimately could not serve us or the failure is on our side.
    pub fn misbehavior_score(&self) -> i32 {
        match self {
            QuorumMessageError::RequestLimitExceeded => 25,
            QuorumMessageError::Unauthenticated
            | QuorumMessageError::NotRequested
            | QuorumMessageError::AlreadyReceived
            | QuorumMessageError::NotLikeRequested
            | QuorumMessageError::MalformedPayload(_)
            | QuorumMessageError::InvalidVerificationVector
            | QuorumMessageError::DecryptionFailed
            | QuorumMessageError::InvalidSecretKeyShare => 10,
            QuorumMessageError::PeerReportedError(_)
            | QuorumMessageError::QuorumNotFound
            | QuorumMessageError::VerificationVectorUnavailable
            | QuorumMessageError::NotAMember => 0,
        }
    }
}

/// Type alias for Result with LlmqError.
pub type Result<T> = std::result::Result<T, LlmqError>;

/// Type alias for quorum validation results.
pub type QuorumResult<T> = std::result::Result<T, QuorumError>;

/// Type alias for storage operation results.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Type alias for configuration results.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Type alias for logging operation results.
pub type LoggingResult<T> = std::result::Result<T, LoggingError>;

/// Type alias for network operation results.
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;

/// Type alias for inbound message processing results.
pub type MessageResult<T> = std::result::Result<T, QuorumMessageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misbehavior_scores() {
        assert_eq!(QuorumMessageError::Unauthenticated.misbehavior_score(), 10);
        assert_eq!(QuorumMessageError::RequestLimitExceeded.misbehavior_score(), 25);
        assert_eq!(QuorumMessageError::NotLikeRequested.misbehavior_score(), 10);
        assert_eq!(QuorumMessageError::InvalidSecretKeyShare.misbehavior_score(), 10);

        // rejections caused by us or reported by the peer are only logged
        assert_eq!(
            QuorumMessageError::PeerReportedError(QuorumDataError::QuorumNotFound)
                .misbehavior_score(),
            0
        );
        assert_eq!(QuorumMessageError::QuorumNotFound.misbehavior_score(), 0);
        assert_eq!(QuorumMessageError::NotAMember.misbehavior_score(), 0);
    }

    #[test]
    fn test_config_error_messages() {
        assert_eq!(
            ConfigError::InvalidRequestsQvvecType("llmq_foo".to_string()).to_string(),
            "Invalid llmqType in -llmq-requests-qvvec: llmq_foo"
        );
        assert_eq!(
            ConfigError::DuplicatedRequestsQvvecType("llmq_test".to_string()).to_string(),
            "Duplicated llmqType in -llmq-requests-qvvec: llmq_test"
        );
    }

    #[test]
    fn test_storage_error_clone_keeps_io_kind() {
        let err = StorageError::Io(io::Error::new(io::ErrorKind::NotFound, "gone"));
        match err.clone() {
            StorageError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {:?}", other),
        }
    }
}

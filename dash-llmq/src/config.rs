//! Configuration for the LLMQ subsystem.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use dash_llmq_types::LLMQType;

use crate::error::{ConfigError, ConfigResult};
use crate::types::ActiveMasternodeInfo;

/// Time without progress after which a recovery task gives up on the remaining candidates,
/// and the pause between two recovery attempts.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Age at which an outstanding quorum data request expires.
pub const REQUEST_EXPIRY: Duration =
    Duration::from_secs(dash_llmq_types::network::message_qdata::REQUEST_EXPIRY_SECS);

/// Configuration for the quorum manager.
#[derive(Debug, Clone)]
pub struct LlmqConfig {
    /// Quorum types enabled on the network this node runs on.
    pub llmq_types: Vec<LLMQType>,

    /// Whether the node runs as a masternode.
    pub masternode_mode: bool,

    /// Identity of the local masternode, required in masternode mode.
    pub active_masternode: Option<ActiveMasternodeInfo>,

    /// Recover missing quorum data from other members (`-llmq-quorum-data-recovery`).
    pub quorum_data_recovery: bool,

    /// Keep connections to every quorum, not only our own (`-watchquorums`).
    pub watch_quorums: bool,

    /// Types for which verification vectors are requested even if we are not a member
    /// (`-llmq-requests-qvvec`).
    pub requests_qvvec: Vec<LLMQType>,

    /// Directory for persisted quorum contributions. In-memory storage when unset.
    pub storage_path: Option<PathBuf>,
}

impl Default for LlmqConfig {
    fn default() -> Self {
        Self {
            llmq_types: Self::mainnet_types(),
            masternode_mode: false,
            active_masternode: None,
            quorum_data_recovery: true,
            watch_quorums: false,
            requests_qvvec: vec![],
            storage_path: None,
        }
    }
}

impl LlmqConfig {
    /// Configuration with the quorum types active on mainnet.
    pub fn mainnet() -> Self {
        Self::default()
    }

    /// Configuration with the quorum types of a regtest network.
    pub fn regtest() -> Self {
        Self {
            llmq_types: vec![
                LLMQType::LlmqtypeTest,
                LLMQType::LlmqtypeTestInstantSend,
                LLMQType::LlmqtypeTestV17,
                LLMQType::LlmqtypeTestDIP0024,
                LLMQType::LlmqtypeTestnetPlatform,
            ],
            ..Self::default()
        }
    }

    fn mainnet_types() -> Vec<LLMQType> {
        vec![
            LLMQType::Llmqtype50_60,
            LLMQType::Llmqtype60_75,
            LLMQType::Llmqtype400_60,
            LLMQType::Llmqtype400_85,
            LLMQType::Llmqtype100_67,
        ]
    }

    /// Set the enabled quorum types.
    pub fn with_llmq_types(mut self, types: Vec<LLMQType>) -> Self {
        self.llmq_types = types;
        self
    }

    /// Run as the given masternode.
    pub fn with_masternode(mut self, info: ActiveMasternodeInfo) -> Self {
        self.masternode_mode = true;
        self.active_masternode = Some(info);
        self
    }

    pub fn with_quorum_data_recovery(mut self, enabled: bool) -> Self {
        self.quorum_data_recovery = enabled;
        self
    }

    pub fn with_watch_quorums(mut self, enabled: bool) -> Self {
        self.watch_quorums = enabled;
        self
    }

    pub fn with_requests_qvvec(mut self, types: Vec<LLMQType>) -> Self {
        self.requests_qvvec = types;
        self
    }

    /// Persist contributions below `path`.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Whether `llmq_type` is enabled on this network.
    pub fn is_type_enabled(&self, llmq_type: LLMQType) -> bool {
        self.llmq_types.contains(&llmq_type)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut seen = HashSet::new();
        for llmq_type in &self.llmq_types {
            if !seen.insert(*llmq_type) {
                return Err(ConfigError::DuplicatedQuorumType(llmq_type.name().to_string()));
            }
        }

        if self.masternode_mode && self.active_masternode.is_none() {
            return Err(ConfigError::MissingActiveMasternode);
        }

        let mut seen = HashSet::new();
        for llmq_type in &self.requests_qvvec {
            if !seen.insert(*llmq_type) {
                return Err(ConfigError::DuplicatedRequestsQvvecType(llmq_type.name().to_string()));
            }
            if !self.is_type_enabled(*llmq_type) {
                return Err(ConfigError::RequestsQvvecTypeNotEnabled(llmq_type.name().to_string()));
            }
        }

        Ok(())
    }
}

/// Parses the value of `-llmq-quorum-data-recovery`. Only `0` and `1` are accepted.
pub fn parse_data_recovery_flag(value: &str) -> ConfigResult<bool> {
    match value {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ConfigError::InvalidDataRecoveryValue(other.to_string())),
    }
}

/// Parses every `-llmq-requests-qvvec` occurrence. Values are quorum type names such as
/// `llmq_test`; numeric indexes are not accepted.
pub fn parse_requests_qvvec(values: &[&str]) -> ConfigResult<Vec<LLMQType>> {
    let mut types = Vec::with_capacity(values.len());
    for value in values {
        let llmq_type = LLMQType::from_name(value)
            .ok_or_else(|| ConfigError::InvalidRequestsQvvecType(value.to_string()))?;
        if types.contains(&llmq_type) {
            return Err(ConfigError::DuplicatedRequestsQvvecType(value.to_string()));
        }
        types.push(llmq_type);
    }
    Ok(types)
}

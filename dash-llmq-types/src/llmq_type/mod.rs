// SPDX-License-Identifier: CC0-1.0

//! Long-living masternode quorum types and their consensus parameters.

use std::fmt::{Display, Formatter};
use std::io;

use crate::consensus::encode::Error;
use crate::consensus::{Decodable, Encodable};

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DKGParams {
    pub interval: u32, // one DKG per hour
    pub phase_blocks: u32,
    pub mining_window_start: u32, // dkg_phase_blocks * 5 = after finalization
    pub mining_window_end: u32,
    pub bad_votes_threshold: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct LLMQParams {
    pub quorum_type: LLMQType,
    pub name: &'static str,
    pub size: u32,
    pub min_size: u32,
    pub threshold: u32,
    pub dkg_params: DKGParams,
    pub signing_active_quorum_count: u32, // just a few ones to allow easier testing
    pub keep_old_connections: u32,
    pub recovery_members: u32,
}

pub const DKG_TEST: DKGParams = DKGParams {
    interval: 24,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 2,
};
pub const DKG_DEVNET: DKGParams = DKGParams {
    interval: 24,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 7,
};
pub const DKG_DEVNET_DIP_0024: DKGParams = DKGParams {
    interval: 48,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 7,
};
pub const DKG_50_60: DKGParams = DKGParams {
    interval: 24,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 40,
};
pub const DKG_400_60: DKGParams = DKGParams {
    interval: 24 * 12,
    phase_blocks: 4,
    mining_window_start: 20,
    mining_window_end: 28,
    bad_votes_threshold: 300,
};
pub const DKG_400_85: DKGParams = DKGParams {
    interval: 24 * 24,
    phase_blocks: 4,
    mining_window_start: 20,
    mining_window_end: 48,
    bad_votes_threshold: 300,
};
pub const DKG_100_67: DKGParams = DKGParams {
    interval: 24,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 80,
};
pub const DKG_60_75: DKGParams = DKGParams {
    interval: 24 * 12,
    phase_blocks: 2,
    mining_window_start: 42,
    mining_window_end: 50,
    bad_votes_threshold: 48,
};
pub const DKG_25_67: DKGParams = DKGParams {
    interval: 24,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 22,
};
pub const DKG_PLATFORM_TESTNET: DKGParams = DKGParams {
    interval: 24 * 12,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 2,
};
pub const DKG_PLATFORM_DEVNET: DKGParams = DKGParams {
    interval: 24 * 12,
    phase_blocks: 2,
    mining_window_start: 10,
    mining_window_end: 18,
    bad_votes_threshold: 7,
};

pub const LLMQ_TEST: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeTest,
    name: "llmq_test",
    size: 4,
    min_size: 2,
    threshold: 2,
    dkg_params: DKG_TEST,
    signing_active_quorum_count: 2,
    keep_old_connections: 3,
    recovery_members: 3,
};
pub const LLMQ_V017: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeTestV17,
    name: "llmq_test_v17",
    size: 3,
    min_size: 2,
    threshold: 2,
    dkg_params: DKG_TEST,
    signing_active_quorum_count: 2,
    keep_old_connections: 3,
    recovery_members: 3,
};
pub const LLMQ_0024: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeDevnetDIP0024,
    name: "llmq_devnet_dip0024",
    size: 8,
    min_size: 6,
    threshold: 4,
    dkg_params: DKG_DEVNET_DIP_0024,
    signing_active_quorum_count: 2,
    keep_old_connections: 4,
    recovery_members: 4,
};
pub const LLMQ_TEST_DIP00024: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeTestDIP0024,
    name: "llmq_test_dip0024",
    size: 4,
    min_size: 3,
    threshold: 2,
    dkg_params: DKG_TEST,
    signing_active_quorum_count: 2,
    keep_old_connections: 3,
    recovery_members: 3,
};
pub const LLMQ_TEST_INSTANT_SEND: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeTestInstantSend,
    name: "llmq_test_instantsend",
    size: 3,
    min_size: 2,
    threshold: 2,
    dkg_params: DKG_TEST,
    signing_active_quorum_count: 2,
    keep_old_connections: 3,
    recovery_members: 3,
};
pub const LLMQ_DEVNET: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeDevnet,
    name: "llmq_devnet",
    size: 12,
    min_size: 7,
    threshold: 6,
    dkg_params: DKG_DEVNET,
    signing_active_quorum_count: 4,
    keep_old_connections: 4,
    recovery_members: 6,
};
pub const LLMQ_50_60: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype50_60,
    name: "llmq_50_60",
    size: 50,
    min_size: 40,
    threshold: 30,
    dkg_params: DKG_50_60,
    signing_active_quorum_count: 24,
    keep_old_connections: 25,
    recovery_members: 25,
};
pub const LLMQ_400_60: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype400_60,
    name: "llmq_400_60",
    size: 400,
    min_size: 300,
    threshold: 240,
    dkg_params: DKG_400_60,
    signing_active_quorum_count: 4,
    keep_old_connections: 5,
    recovery_members: 100,
};
pub const LLMQ_400_85: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype400_85,
    name: "llmq_400_85",
    size: 400,
    min_size: 350,
    threshold: 340,
    dkg_params: DKG_400_85,
    signing_active_quorum_count: 4,
    keep_old_connections: 5,
    recovery_members: 100,
};
pub const LLMQ_100_67: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype100_67,
    name: "llmq_100_67",
    size: 100,
    min_size: 80,
    threshold: 67,
    dkg_params: DKG_100_67,
    signing_active_quorum_count: 24,
    keep_old_connections: 25,
    recovery_members: 50,
};
pub const LLMQ_60_75: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype60_75,
    name: "llmq_60_75",
    size: 60,
    min_size: 50,
    threshold: 45,
    dkg_params: DKG_60_75,
    signing_active_quorum_count: 32,
    keep_old_connections: 64,
    recovery_members: 25,
};
pub const LLMQ_25_67: LLMQParams = LLMQParams {
    quorum_type: LLMQType::Llmqtype25_67,
    name: "llmq_25_67",
    size: 25,
    min_size: 22,
    threshold: 17,
    dkg_params: DKG_25_67,
    signing_active_quorum_count: 24,
    keep_old_connections: 25,
    recovery_members: 12,
};
pub const LLMQ_TEST_PLATFORM: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeTestnetPlatform,
    name: "llmq_test_platform",
    size: 3,
    min_size: 2,
    threshold: 2,
    dkg_params: DKG_PLATFORM_TESTNET,
    signing_active_quorum_count: 2,
    keep_old_connections: 4,
    recovery_members: 3,
};
pub const LLMQ_DEV_PLATFORM: LLMQParams = LLMQParams {
    quorum_type: LLMQType::LlmqtypeDevnetPlatform,
    name: "llmq_dev_platform",
    size: 12,
    min_size: 9,
    threshold: 8,
    dkg_params: DKG_PLATFORM_DEVNET,
    signing_active_quorum_count: 4,
    keep_old_connections: 4,
    recovery_members: 3,
};

/// A known quorum type. Unknown wire values are rejected by [`TryFrom<u8>`] rather than
/// mapped to a placeholder, so a `qgetdata` for an unknown type can be answered with an
/// explicit error.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Hash, Ord)]
#[repr(u8)]
pub enum LLMQType {
    Llmqtype50_60 = 1,  // 50 members,  30  (60%) threshold, 24 / day
    Llmqtype400_60 = 2, // 400 members, 240 (60%) threshold, 2  / day
    Llmqtype400_85 = 3, // 400 members, 340 (85%) threshold, 1  / day
    Llmqtype100_67 = 4, // 100 members, 67  (67%) threshold, 24 / day
    Llmqtype60_75 = 5,  // 60 members,  45  (75%) threshold, 2  / day
    Llmqtype25_67 = 6,  // 25 members,  67  (67%) threshold, 24 / day

    // dev-only
    LlmqtypeTest = 100,            // 3 members, 2 (66%) threshold, one per hour
    LlmqtypeDevnet = 101,          // 10 members, 6 (60%) threshold, one per hour
    LlmqtypeTestV17 = 102,         // 3 members, 2 (66%) threshold, one per hour
    LlmqtypeTestDIP0024 = 103,     // 4 members, 2 (66%) threshold, one per hour
    LlmqtypeTestInstantSend = 104, // 3 members, 2 (66%) threshold, one per hour
    LlmqtypeDevnetDIP0024 = 105,   // 8 members, 4 (50%) threshold, one per hour
    LlmqtypeTestnetPlatform = 106,
    LlmqtypeDevnetPlatform = 107,
}

impl Display for LLMQType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.params().name)
    }
}

const ALL_TYPES: [LLMQType; 14] = [
    LLMQType::Llmqtype50_60,
    LLMQType::Llmqtype400_60,
    LLMQType::Llmqtype400_85,
    LLMQType::Llmqtype100_67,
    LLMQType::Llmqtype60_75,
    LLMQType::Llmqtype25_67,
    LLMQType::LlmqtypeTest,
    LLMQType::LlmqtypeDevnet,
    LLMQType::LlmqtypeTestV17,
    LLMQType::LlmqtypeTestDIP0024,
    LLMQType::LlmqtypeTestInstantSend,
    LLMQType::LlmqtypeDevnetDIP0024,
    LLMQType::LlmqtypeTestnetPlatform,
    LLMQType::LlmqtypeDevnetPlatform,
];

impl LLMQType {
    pub fn params(&self) -> &'static LLMQParams {
        match self {
            LLMQType::Llmqtype50_60 => &LLMQ_50_60,
            LLMQType::Llmqtype400_60 => &LLMQ_400_60,
            LLMQType::Llmqtype400_85 => &LLMQ_400_85,
            LLMQType::Llmqtype100_67 => &LLMQ_100_67,
            LLMQType::Llmqtype60_75 => &LLMQ_60_75,
            LLMQType::Llmqtype25_67 => &LLMQ_25_67,
            LLMQType::LlmqtypeTest => &LLMQ_TEST,
            LLMQType::LlmqtypeDevnet => &LLMQ_DEVNET,
            LLMQType::LlmqtypeTestV17 => &LLMQ_V017,
            LLMQType::LlmqtypeTestDIP0024 => &LLMQ_TEST_DIP00024,
            LLMQType::LlmqtypeTestInstantSend => &LLMQ_TEST_INSTANT_SEND,
            LLMQType::LlmqtypeDevnetDIP0024 => &LLMQ_0024,
            LLMQType::LlmqtypeTestnetPlatform => &LLMQ_TEST_PLATFORM,
            LLMQType::LlmqtypeDevnetPlatform => &LLMQ_DEV_PLATFORM,
        }
    }

    /// Every known quorum type.
    pub fn all() -> &'static [LLMQType] {
        &ALL_TYPES
    }

    /// Looks a type up by its parameter name, e.g. `llmq_test`.
    pub fn from_name(name: &str) -> Option<LLMQType> {
        ALL_TYPES.iter().copied().find(|t| t.params().name == name)
    }

    pub fn name(&self) -> &'static str {
        self.params().name
    }

    pub fn index(&self) -> u8 {
        *self as u8
    }

    pub fn size(&self) -> u32 {
        self.params().size
    }

    pub fn threshold(&self) -> u32 {
        self.params().threshold
    }

    pub fn active_quorum_count(&self) -> u32 {
        self.params().signing_active_quorum_count
    }

    /// Calculate the cycle base height for a given block height
    pub fn get_cycle_base_height(&self, height: u32) -> u32 {
        let interval = self.params().dkg_params.interval;
        (height / interval) * interval
    }
}

impl TryFrom<u8> for LLMQType {
    type Error = Error;

    fn try_from(orig: u8) -> Result<Self, Self::Error> {
        ALL_TYPES
            .iter()
            .copied()
            .find(|t| *t as u8 == orig)
            .ok_or(Error::ParseFailed("unknown llmq type"))
    }
}

impl From<LLMQType> for u8 {
    fn from(value: LLMQType) -> Self {
        value as u8
    }
}

impl Encodable for LLMQType {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        self.index().consensus_encode(w)
    }
}

impl Decodable for LLMQType {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<LLMQType, Error> {
        LLMQType::try_from(u8::consensus_decode(r)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_get_cycle_base_height() {
        let llmq = LLMQType::Llmqtype50_60; // interval 24
        assert_eq!(llmq.get_cycle_base_height(0), 0);
        assert_eq!(llmq.get_cycle_base_height(23), 0);
        assert_eq!(llmq.get_cycle_base_height(24), 24);
        assert_eq!(llmq.get_cycle_base_height(50), 48);
        assert_eq!(llmq.get_cycle_base_height(100), 96);
    }

    #[test]
    fn test_every_type_round_trips_through_its_index_and_name() {
        for llmq_type in LLMQType::all() {
            assert_eq!(LLMQType::try_from(llmq_type.index()).unwrap(), *llmq_type);
            assert_eq!(LLMQType::from_name(llmq_type.name()), Some(*llmq_type));
            assert_eq!(llmq_type.params().quorum_type, *llmq_type);
        }
    }

    #[test]
    fn test_unknown_index_is_rejected() {
        assert_matches!(LLMQType::try_from(0), Err(Error::ParseFailed(_)));
        assert_matches!(LLMQType::try_from(99), Err(Error::ParseFailed(_)));
        assert!(LLMQType::from_name("llmq_nope").is_none());
    }

    #[test]
    fn test_llmq_test_params() {
        let params = LLMQType::LlmqtypeTest.params();
        assert_eq!(params.size, 4);
        assert_eq!(params.threshold, 2);
        assert_eq!(params.signing_active_quorum_count, 2);
        assert_eq!(params.keep_old_connections, 3);
        assert_eq!(params.dkg_params.interval, 24);
    }
}

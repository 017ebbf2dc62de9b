// SPDX-License-Identifier: CC0-1.0

//! Quorum data messages.
//!
//! `qgetdata` asks a quorum member for the verification vector of a quorum and/or the
//! encrypted secret key contributions addressed to one member. `qdata` echoes the
//! request, adds an error code and, only when the error code is [`QuorumDataError::None`],
//! the requested data in mask order.

use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;

use crate::bls_sig_utils::{BLSIESEncryptedSecretKey, BLSPublicKey, decode_verification_vector};
use crate::consensus::encode::{self, Error};
use crate::consensus::{Decodable, Encodable, deserialize, serialize};
use crate::hash_types::{ProTxHash, QuorumHash};

/// Minimum protocol version a peer must announce to be sent `qgetdata`.
pub const LLMQ_DATA_MESSAGES_VERSION: u32 = 70219;

/// Seconds after creation at which a request expires.
pub const REQUEST_EXPIRY_SECS: u64 = 300;

bitflags! {
    /// Which pieces of quorum data a request asks for.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct DataMask: u16 {
        const QUORUM_VERIFICATION_VECTOR = 0x0001;
        const ENCRYPTED_CONTRIBUTIONS = 0x0002;
    }
}

impl Encodable for DataMask {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        self.bits().consensus_encode(w)
    }
}

impl Decodable for DataMask {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        // Unknown bits are kept so the request echoes back byte for byte.
        Ok(DataMask::from_bits_retain(u16::consensus_decode(r)?))
    }
}

/// Error code carried by a `qdata` message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum QuorumDataError {
    None = 0,
    QuorumTypeInvalid = 1,
    QuorumBlockNotFound = 2,
    QuorumNotFound = 3,
    MasternodeIsNoMember = 4,
    QuorumVerificationVectorMissing = 5,
    EncryptedContributionsMissing = 6,
    Undefined = 7,
}

impl TryFrom<u8> for QuorumDataError {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => QuorumDataError::None,
            1 => QuorumDataError::QuorumTypeInvalid,
            2 => QuorumDataError::QuorumBlockNotFound,
            3 => QuorumDataError::QuorumNotFound,
            4 => QuorumDataError::MasternodeIsNoMember,
            5 => QuorumDataError::QuorumVerificationVectorMissing,
            6 => QuorumDataError::EncryptedContributionsMissing,
            7 => QuorumDataError::Undefined,
            other => return Err(Error::UnknownErrorCode(other)),
        })
    }
}

impl Encodable for QuorumDataError {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        (*self as u8).consensus_encode(w)
    }
}

impl Decodable for QuorumDataError {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        QuorumDataError::try_from(u8::consensus_decode(r)?)
    }
}

/// Current unix time in seconds.
pub fn unix_time_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

/// The `qgetdata` message, also kept locally as the bookkeeping entry of an outstanding
/// request.
///
/// Only the four wire fields take part in equality: a `qdata` answer must echo exactly
/// what was asked for, while the creation time and the processed flag are local state.
#[derive(Clone, Debug)]
pub struct QuorumDataRequest {
    /// Kept as the raw wire value so requests for unknown types can be answered.
    pub llmq_type: u8,
    pub quorum_hash: QuorumHash,
    pub data_mask: DataMask,
    /// The member whose encrypted contributions are requested.
    pub pro_tx_hash: ProTxHash,
    created_at: u64,
    processed: bool,
}

impl QuorumDataRequest {
    pub fn new(
        llmq_type: u8,
        quorum_hash: QuorumHash,
        data_mask: DataMask,
        pro_tx_hash: ProTxHash,
    ) -> Self {
        QuorumDataRequest {
            llmq_type,
            quorum_hash,
            data_mask,
            pro_tx_hash,
            created_at: unix_time_now(),
            processed: false,
        }
    }

    /// Overrides the creation time (unix seconds).
    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_time_now())
    }

    /// A request is expired once [`REQUEST_EXPIRY_SECS`] have elapsed since creation.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) >= REQUEST_EXPIRY_SECS
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn set_processed(&mut self) {
        self.processed = true;
    }
}

impl PartialEq for QuorumDataRequest {
    fn eq(&self, other: &Self) -> bool {
        self.llmq_type == other.llmq_type
            && self.quorum_hash == other.quorum_hash
            && self.data_mask == other.data_mask
            && self.pro_tx_hash == other.pro_tx_hash
    }
}

impl Eq for QuorumDataRequest {}

impl Encodable for QuorumDataRequest {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.llmq_type.consensus_encode(w)?;
        len += self.quorum_hash.consensus_encode(w)?;
        len += self.data_mask.consensus_encode(w)?;
        len += self.pro_tx_hash.consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for QuorumDataRequest {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        Ok(QuorumDataRequest::new(
            u8::consensus_decode(r)?,
            QuorumHash::consensus_decode(r)?,
            DataMask::consensus_decode(r)?,
            ProTxHash::consensus_decode(r)?,
        ))
    }
}

/// The data carried by a successful `qdata`, one entry per requested mask bit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuorumDataPayload {
    pub verification_vector: Option<Vec<BLSPublicKey>>,
    pub encrypted_contributions: Option<Vec<BLSIESEncryptedSecretKey>>,
}

/// The `qdata` message.
///
/// The body after the error code is kept raw: the receiver marks the matching request
/// as processed before the body is interpreted, so a malformed body still consumes the
/// request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumData {
    pub request: QuorumDataRequest,
    pub error: QuorumDataError,
    body: Vec<u8>,
}

impl QuorumData {
    /// An answer carrying only an error code.
    pub fn error(request: QuorumDataRequest, error: QuorumDataError) -> Self {
        QuorumData { request, error, body: Vec::new() }
    }

    /// A successful answer. Payload parts are written in mask order.
    pub fn with_payload(request: QuorumDataRequest, payload: &QuorumDataPayload) -> Self {
        let mut body = Vec::new();
        if let Some(vvec) = &payload.verification_vector {
            body.extend(serialize(vvec));
        }
        if let Some(contributions) = &payload.encrypted_contributions {
            body.extend(serialize(contributions));
        }
        QuorumData { request, error: QuorumDataError::None, body }
    }

    /// Interprets the body according to the echoed data mask.
    pub fn payload(&self) -> Result<QuorumDataPayload, Error> {
        let mut cursor = io::Cursor::new(&self.body);
        let mut payload = QuorumDataPayload::default();
        if self.request.data_mask.contains(DataMask::QUORUM_VERIFICATION_VECTOR) {
            payload.verification_vector = Some(decode_verification_vector(&mut cursor)?);
        }
        if self.request.data_mask.contains(DataMask::ENCRYPTED_CONTRIBUTIONS) {
            payload.encrypted_contributions =
                Some(Vec::<BLSIESEncryptedSecretKey>::consensus_decode(&mut cursor)?);
        }
        if cursor.position() as usize != self.body.len() {
            return Err(Error::ParseFailed("trailing bytes in qdata payload"));
        }
        Ok(payload)
    }
}

impl Encodable for QuorumData {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = self.request.consensus_encode(w)?;
        len += self.error.consensus_encode(w)?;
        if self.error == QuorumDataError::None {
            w.write_all(&self.body)?;
            len += self.body.len();
        }
        Ok(len)
    }
}

impl Decodable for QuorumData {
    fn consensus_decode<R: io::Read + ?Sized>(r: &mut R) -> Result<Self, Error> {
        let request = QuorumDataRequest::consensus_decode(r)?;
        let error = QuorumDataError::consensus_decode(r)?;
        let mut body = Vec::new();
        if error == QuorumDataError::None {
            r.read_to_end(&mut body)?;
        }
        Ok(QuorumData { request, error, body })
    }
}

/// A quorum data message as exchanged between masternodes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuorumMessage {
    GetData(QuorumDataRequest),
    Data(QuorumData),
}

impl QuorumMessage {
    /// Return the message command as a static string reference.
    pub fn cmd(&self) -> &'static str {
        match self {
            QuorumMessage::GetData(_) => "qgetdata",
            QuorumMessage::Data(_) => "qdata",
        }
    }

    /// Serializes the message payload.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            QuorumMessage::GetData(request) => serialize(request),
            QuorumMessage::Data(data) => serialize(data),
        }
    }

    /// Decodes a payload received under `cmd`. Returns `Ok(None)` for other commands.
    pub fn from_payload(cmd: &str, payload: &[u8]) -> Result<Option<QuorumMessage>, encode::Error> {
        match cmd {
            "qgetdata" => Ok(Some(QuorumMessage::GetData(deserialize(payload)?))),
            "qdata" => Ok(Some(QuorumMessage::Data(deserialize(payload)?))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use bitcoin_hashes::Hash;

    use super::*;

    fn request(mask: DataMask) -> QuorumDataRequest {
        QuorumDataRequest::new(
            100,
            QuorumHash::from_byte_array([0x11; 32]),
            mask,
            ProTxHash::from_byte_array([0x22; 32]),
        )
    }

    #[test]
    fn qgetdata_wire_layout() {
        let req = request(DataMask::all());
        let bytes = serialize(&req);
        assert_eq!(bytes.len(), 1 + 32 + 2 + 32);
        assert_eq!(bytes[0], 100);
        assert_eq!(&bytes[33..35], &[0x03, 0x00]);
        let decoded: QuorumDataRequest = deserialize(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn unknown_mask_bits_are_echoed() {
        let mut bytes = serialize(&request(DataMask::QUORUM_VERIFICATION_VECTOR));
        bytes[33] = 0x81;
        let decoded: QuorumDataRequest = deserialize(&bytes).unwrap();
        assert_eq!(decoded.data_mask.bits(), 0x81);
        assert_eq!(serialize(&decoded), bytes);
    }

    #[test]
    fn expiry_boundary() {
        let req = request(DataMask::QUORUM_VERIFICATION_VECTOR).with_created_at(1_000);
        assert!(!req.is_expired_at(1_000));
        assert!(!req.is_expired_at(1_299));
        assert!(req.is_expired_at(1_300));
        assert!(req.is_expired_at(5_000));
        // clock going backwards never expires a request
        assert!(!req.is_expired_at(10));
        assert!(!request(DataMask::QUORUM_VERIFICATION_VECTOR).is_expired());
    }

    #[test]
    fn equality_ignores_local_state() {
        let mut a = request(DataMask::QUORUM_VERIFICATION_VECTOR).with_created_at(1);
        let b = request(DataMask::QUORUM_VERIFICATION_VECTOR).with_created_at(2);
        a.set_processed();
        assert_eq!(a, b);
        assert_ne!(a, request(DataMask::ENCRYPTED_CONTRIBUTIONS));

        let mut other_type = request(DataMask::QUORUM_VERIFICATION_VECTOR);
        other_type.llmq_type = 101;
        assert_ne!(b, other_type);
    }

    #[test]
    fn qdata_error_carries_no_body() {
        let data = QuorumData::error(
            request(DataMask::QUORUM_VERIFICATION_VECTOR),
            QuorumDataError::QuorumNotFound,
        );
        let bytes = serialize(&data);
        assert_eq!(bytes.len(), 67 + 1);
        assert_eq!(bytes[67], 3);
        let decoded: QuorumData = deserialize(&bytes).unwrap();
        assert_eq!(decoded.error, QuorumDataError::QuorumNotFound);
    }

    #[test]
    fn qdata_payload_follows_mask_order() {
        let vvec = vec![BLSPublicKey::from_bytes([1; 48]), BLSPublicKey::from_bytes([2; 48])];
        let contributions = vec![BLSIESEncryptedSecretKey {
            ephemeral_public_key: BLSPublicKey::from_bytes([3; 48]),
            iv: [4; 32],
            data: vec![5; 32],
        }];
        let payload = QuorumDataPayload {
            verification_vector: Some(vvec.clone()),
            encrypted_contributions: Some(contributions.clone()),
        };
        let data = QuorumData::with_payload(request(DataMask::all()), &payload);

        let msg = QuorumMessage::Data(data);
        assert_eq!(msg.cmd(), "qdata");
        let decoded = QuorumMessage::from_payload("qdata", &msg.payload()).unwrap().unwrap();
        let QuorumMessage::Data(decoded) = decoded else {
            panic!("expected qdata");
        };
        assert_eq!(decoded.error, QuorumDataError::None);
        assert_eq!(decoded.payload().unwrap(), payload);
    }

    #[test]
    fn qdata_payload_not_matching_mask_is_rejected() {
        let payload = QuorumDataPayload {
            verification_vector: Some(vec![BLSPublicKey::from_bytes([1; 48])]),
            encrypted_contributions: None,
        };
        // body holds a vvec but the echoed mask claims contributions
        let data = QuorumData::with_payload(request(DataMask::ENCRYPTED_CONTRIBUTIONS), &payload);
        assert!(data.payload().is_err());
    }

    #[test]
    fn unknown_error_code_is_rejected() {
        let mut bytes = serialize(&request(DataMask::QUORUM_VERIFICATION_VECTOR));
        bytes.push(42);
        assert_matches!(deserialize::<QuorumData>(&bytes), Err(Error::UnknownErrorCode(42)));
        assert_eq!(QuorumMessage::from_payload("ping", &[]).unwrap(), None);
    }
}

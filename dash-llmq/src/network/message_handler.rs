//! Handling of inbound `qgetdata` and `qdata` messages.

use dash_llmq_types::network::message_qdata::unix_time_now;
use dash_llmq_types::{
    BLSIESEncryptedSecretKey, BlockHash, DataMask, LLMQType, QuorumData, QuorumDataError,
    QuorumDataPayload, QuorumDataRequest, QuorumMessage,
};
use tracing::{debug, warn};

use super::PeerKey;
use crate::error::{MessageResult, QuorumMessageError};
use crate::manager::QuorumManager;
use crate::quorum::Quorum;
use crate::types::QuorumPeer;

impl QuorumManager {
    /// Processes a quorum data message received from `peer`.
    ///
    /// A rejected message charges the peer the misbehavior score of the returned error.
    pub async fn process_message(
        &self,
        peer: &QuorumPeer,
        message: QuorumMessage,
    ) -> MessageResult<()> {
        let cmd = message.cmd();
        let result = match message {
            QuorumMessage::GetData(request) => self.handle_data_request(peer, request).await,
            QuorumMessage::Data(data) => self.handle_data_response(peer, data).await,
        };

        if let Err(ref e) = result {
            let score = e.misbehavior_score();
            if score > 0 {
                warn!("{}: {} rejected: {}", peer.id, cmd, e);
                self.misbehaving(peer.id, score, &format!("{}: {}", cmd, e)).await;
            } else {
                debug!("{}: {} rejected: {}", peer.id, cmd, e);
            }
        }
        result
    }

    /// Answers a `qgetdata`.
    ///
    /// Only requests from unauthenticated peers and requests over the rate limit are errors;
    /// everything else is answered, with an error code if the data cannot be served.
    pub async fn handle_data_request(
        &self,
        peer: &QuorumPeer,
        request: QuorumDataRequest,
    ) -> MessageResult<()> {
        if !self.config.masternode_mode || !peer.is_quorum_peer() {
            return Err(QuorumMessageError::Unauthenticated);
        }

        let registered = self.pending_requests.lock().await.insert(
            PeerKey::for_peer(peer),
            false,
            request.clone(),
            unix_time_now(),
        );
        if !registered {
            self.send_data(peer, QuorumData::error(request, QuorumDataError::Undefined)).await;
            return Err(QuorumMessageError::RequestLimitExceeded);
        }

        let answer = match self.serve_data_request(&request).await {
            Ok(payload) => QuorumData::with_payload(request, &payload),
            Err(error) => {
                debug!("{}: cannot serve {:?}: {:?}", peer.id, request.data_mask, error);
                QuorumData::error(request, error)
            }
        };
        self.send_data(peer, answer).await;
        Ok(())
    }

    async fn serve_data_request(
        &self,
        request: &QuorumDataRequest,
    ) -> Result<QuorumDataPayload, QuorumDataError> {
        let llmq_type = LLMQType::try_from(request.llmq_type)
            .ok()
            .filter(|llmq_type| self.config.is_type_enabled(*llmq_type))
            .ok_or(QuorumDataError::QuorumTypeInvalid)?;

        let quorum_block = self
            .services
            .chain
            .lookup_block(&BlockHash::from(request.quorum_hash))
            .ok_or(QuorumDataError::QuorumBlockNotFound)?;

        let quorum = self
            .get_quorum_for_block(llmq_type, &quorum_block)
            .await
            .ok_or(QuorumDataError::QuorumNotFound)?;

        let mut payload = QuorumDataPayload::default();

        if request.data_mask.contains(DataMask::QUORUM_VERIFICATION_VECTOR) {
            let vvec = quorum
                .verification_vector()
                .ok_or(QuorumDataError::QuorumVerificationVectorMissing)?;
            payload.verification_vector = Some(vvec.as_ref().clone());
        }

        if request.data_mask.contains(DataMask::ENCRYPTED_CONTRIBUTIONS) {
            if !quorum.is_member(&request.pro_tx_hash) {
                return Err(QuorumDataError::MasternodeIsNoMember);
            }
            let contributions = self
                .services
                .dkg
                .get_encrypted_contributions(
                    llmq_type,
                    &quorum_block,
                    &quorum.commitment().valid_members,
                    &request.pro_tx_hash,
                )
                .ok_or(QuorumDataError::EncryptedContributionsMissing)?;
            payload.encrypted_contributions = Some(contributions);
        }

        Ok(payload)
    }

    async fn send_data(&self, peer: &QuorumPeer, data: QuorumData) {
        if let Err(e) = self.connections().send_message(peer.id, QuorumMessage::Data(data)).await {
            warn!("{}: failed to send qdata: {}", peer.id, e);
        }
    }

    /// Consumes a `qdata` answer to one of our requests.
    pub async fn handle_data_response(
        &self,
        peer: &QuorumPeer,
        data: QuorumData,
    ) -> MessageResult<()> {
        if !self.config.masternode_mode || !peer.is_quorum_peer() {
            return Err(QuorumMessageError::Unauthenticated);
        }

        {
            let mut pending = self.pending_requests.lock().await;
            let request = pending
                .get_mut(&PeerKey::for_peer(peer), true)
                .ok_or(QuorumMessageError::NotRequested)?;
            if request.is_processed() {
                return Err(QuorumMessageError::AlreadyReceived);
            }
            if *request != data.request {
                return Err(QuorumMessageError::NotLikeRequested);
            }
            request.set_processed();
        }

        if data.error != QuorumDataError::None {
            return Err(QuorumMessageError::PeerReportedError(data.error));
        }

        let quorum = match LLMQType::try_from(data.request.llmq_type) {
            Ok(llmq_type) => self.cached_quorum(llmq_type, &data.request.quorum_hash).await,
            Err(_) => None,
        };
        let quorum = quorum.ok_or(QuorumMessageError::QuorumNotFound)?;

        let payload =
            data.payload().map_err(|e| QuorumMessageError::MalformedPayload(e.to_string()))?;

        let vvec_accepted = match payload.verification_vector {
            Some(vvec) => {
                quorum
                    .set_verification_vector(vvec)
                    .map_err(|_| QuorumMessageError::InvalidVerificationVector)?;
                self.start_cache_populator(quorum.clone()).await;
                true
            }
            None => false,
        };

        let result = payload.encrypted_contributions.map_or(Ok(()), |contributions| {
            self.install_contributions(&quorum, &data.request, &contributions)
        });

        if vvec_accepted || result.is_ok() {
            if let Err(e) = quorum.persist_contributions(self.services.storage.as_ref()).await {
                warn!("{}: failed to persist contributions: {}", quorum.quorum_hash(), e);
            }
            quorum.notify_data_received();
        }
        result?;
        debug!("{}: processed qdata for {}", peer.id, quorum.quorum_hash());
        Ok(())
    }

    /// Decrypts and aggregates our contributions into the secret key share of `quorum`.
    fn install_contributions(
        &self,
        quorum: &Quorum,
        request: &QuorumDataRequest,
        contributions: &[BLSIESEncryptedSecretKey],
    ) -> MessageResult<()> {
        let vvec_len = quorum.verification_vector().map(|vvec| vvec.len());
        if vvec_len != Some(quorum.params().threshold as usize) {
            return Err(QuorumMessageError::VerificationVectorUnavailable);
        }

        let operator_key = self
            .config
            .active_masternode
            .as_ref()
            .map(|info| info.operator_secret_key)
            .ok_or(QuorumMessageError::NotAMember)?;
        let member_index =
            quorum.member_index(&request.pro_tx_hash).ok_or(QuorumMessageError::NotAMember)?;

        let secret_keys = contributions
            .iter()
            .map(|encrypted| {
                self.services.bls.decrypt_contribution(encrypted, member_index, &operator_key)
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(QuorumMessageError::DecryptionFailed)?;

        let secret_key = self
            .services
            .bls
            .aggregate_secret_keys(&secret_keys)
            .ok_or(QuorumMessageError::InvalidSecretKeyShare)?;
        quorum
            .set_secret_key_share(secret_key)
            .map_err(|_| QuorumMessageError::InvalidSecretKeyShare)
    }
}

use crate::cryptography::backend::{ShareCombiner, SignatureVerifier};
use crate::engine::validation::{check_signer_response, ResponseCheck, SeenSigners};
use crate::error::{Error, Rejection, Result};
use crate::input::codec::ClearValue;
use alloy_primitives::Address;
use futures::{Stream, StreamExt};
use relayer_wire::rpc_types::SignerResponseJson;
use relayer_wire::Handle;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// One signer's answer to a decryption request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerResponse {
    pub party_id: u32,
    pub verification_key: Address,
    /// Digest of the request being answered.
    pub digest: Vec<u8>,
    /// Encrypted share or plaintext result, depending on the request.
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
    pub extra_data: Vec<u8>,
}

fn decode_hex_field(name: &str, value: &str) -> std::result::Result<Vec<u8>, Rejection> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| Rejection::Malformed(format!("{name} is not valid hex: {e}")))
}

impl TryFrom<&SignerResponseJson> for SignerResponse {
    type Error = Rejection;

    fn try_from(value: &SignerResponseJson) -> std::result::Result<Self, Self::Error> {
        let verification_key = Address::from_str(&value.verification_key).map_err(|e| {
            Rejection::Malformed(format!("verification key is not an address: {e}"))
        })?;
        Ok(Self {
            party_id: value.party_id,
            verification_key,
            digest: decode_hex_field("digest", &value.digest)?,
            payload: decode_hex_field("payload", &value.payload)?,
            signature: decode_hex_field("signature", &value.signature)?,
            extra_data: match &value.extra_data {
                Some(extra) => decode_hex_field("extra data", extra)?,
                None => Vec::new(),
            },
        })
    }
}

/// The configured KMS committee: party id to signing address, and how many distinct valid
/// responses are required.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignerSet {
    parties: HashMap<u32, Address>,
    shares_needed: usize,
}

impl SignerSet {
    pub fn new(parties: HashMap<u32, Address>, shares_needed: usize) -> Result<Self> {
        if shares_needed == 0 {
            return Err(Error::Config("shares_needed must be at least 1".to_string()));
        }
        if shares_needed > parties.len() {
            return Err(Error::Config(format!(
                "shares_needed ({shares_needed}) exceeds the number of signers ({})",
                parties.len()
            )));
        }
        Ok(Self {
            parties,
            shares_needed,
        })
    }

    pub fn parties(&self) -> &HashMap<u32, Address> {
        &self.parties
    }

    pub fn shares_needed(&self) -> usize {
        self.shares_needed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// No response offered yet.
    Pending,
    Collecting,
    /// Enough responses were accepted, later ones are ignored. When agreement is required they
    /// must also carry the same payload.
    Satisfied,
    /// No more responses can arrive and the threshold was not reached.
    Failed,
}

/// Plaintexts reconstructed from an accepted set of responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdResult {
    pub handles: Vec<Handle>,
    pub values: Vec<ClearValue>,
    /// Party ids whose responses were used, in acceptance order.
    pub signers: Vec<u32>,
}

/// Verifies and aggregates signer responses for decryption requests.
pub struct ThresholdDecryptClient {
    signers: SignerSet,
    verify: bool,
    require_agreement: bool,
    verifier: Arc<dyn SignatureVerifier>,
    combiner: Arc<dyn ShareCombiner>,
}

impl ThresholdDecryptClient {
    pub fn new(
        signers: SignerSet,
        verifier: Arc<dyn SignatureVerifier>,
        combiner: Arc<dyn ShareCombiner>,
    ) -> Self {
        Self {
            signers,
            verify: true,
            require_agreement: false,
            verifier,
            combiner,
        }
    }

    /// Turns off the signer-set and signature checks.
    ///
    /// This does *not* verify who produced the responses and is thus insecure. It should be
    /// used only for debugging. Digests and duplicates are still checked.
    pub fn insecure_without_verification(mut self) -> Self {
        tracing::warn!(
            "Threshold decryption client created WITHOUT signature verification, responses are not authenticated"
        );
        self.verify = false;
        self
    }

    /// Only counts the threshold as reached once `shares_needed` accepted responses carry the
    /// identical payload. Responses that disagree stay accepted but do not end collection.
    pub fn requiring_agreement(mut self) -> Self {
        self.require_agreement = true;
        self
    }

    pub fn shares_needed(&self) -> usize {
        self.signers.shares_needed()
    }

    /// Starts collecting responses for the request identified by `digest`.
    pub fn session(&self, digest: Vec<u8>, handles: Vec<Handle>) -> DecryptionSession<'_> {
        DecryptionSession {
            client: self,
            digest,
            handles,
            accepted: Vec::new(),
            seen: SeenSigners::default(),
            rejected: Vec::new(),
            state: SessionState::Pending,
        }
    }

    /// Aggregates a complete set of responses: nothing else will arrive once `responses` is
    /// exhausted.
    pub fn aggregate(
        &self,
        digest: Vec<u8>,
        handles: Vec<Handle>,
        responses: impl IntoIterator<Item = SignerResponse>,
    ) -> Result<ThresholdResult> {
        let mut session = self.session(digest, handles);
        for response in responses {
            if session.offer(response) == SessionState::Satisfied {
                break;
            }
        }
        session.finish()
    }

    /// Consumes `responses` until the threshold is reached, the stream ends or `deadline`
    /// elapses. In the latter two cases the result is [`Error::InsufficientShares`] unless
    /// enough responses were already accepted.
    pub async fn collect<S>(
        &self,
        digest: Vec<u8>,
        handles: Vec<Handle>,
        mut responses: S,
        deadline: Duration,
    ) -> Result<ThresholdResult>
    where
        S: Stream<Item = SignerResponse> + Unpin,
    {
        let mut session = self.session(digest, handles);
        let outcome = tokio::time::timeout(deadline, async {
            while let Some(response) = responses.next().await {
                if session.offer(response) == SessionState::Satisfied {
                    break;
                }
            }
        })
        .await;
        if outcome.is_err() {
            tracing::warn!(
                "Deadline of {:?} elapsed with {} of {} responses accepted",
                deadline,
                session.accepted_count(),
                self.shares_needed()
            );
        }
        session.finish()
    }
}

/// Responses collected for one request. Dropping the session discards them.
pub struct DecryptionSession<'a> {
    client: &'a ThresholdDecryptClient,
    digest: Vec<u8>,
    handles: Vec<Handle>,
    accepted: Vec<SignerResponse>,
    seen: SeenSigners,
    rejected: Vec<(u32, Rejection)>,
    state: SessionState,
}

impl DecryptionSession<'_> {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    /// Party ids and reasons of every response left out so far.
    pub fn rejections(&self) -> &[(u32, Rejection)] {
        &self.rejected
    }

    /// Validates one response and counts it if it passes. Returns the new state.
    pub fn offer(&mut self, response: SignerResponse) -> SessionState {
        match self.state {
            SessionState::Satisfied | SessionState::Failed => {
                tracing::debug!(
                    "Ignoring late response from party {} in state {:?}",
                    response.party_id,
                    self.state
                );
                return self.state;
            }
            SessionState::Pending => self.state = SessionState::Collecting,
            SessionState::Collecting => {}
        }

        let check = ResponseCheck {
            digest: &self.digest,
            signers: self.client.signers.parties(),
            verifier: self.client.verifier.as_ref(),
            verify: self.client.verify,
        };
        match check_signer_response(&check, &self.seen, &response) {
            Ok(()) => {
                self.seen.record(&response);
                self.accepted.push(response);
                if self.threshold_reached() {
                    self.state = SessionState::Satisfied;
                }
            }
            Err(rejection) => {
                tracing::warn!(
                    "Discarding response from party {}: {rejection}",
                    response.party_id
                );
                self.rejected.push((response.party_id, rejection));
            }
        }
        self.state
    }

    /// Only the latest accepted response can complete a group of identical payloads.
    fn threshold_reached(&self) -> bool {
        let needed = self.client.shares_needed();
        if !self.client.require_agreement {
            return self.accepted.len() >= needed;
        }
        match self.accepted.last() {
            Some(latest) => {
                self.accepted
                    .iter()
                    .filter(|r| r.payload == latest.payload)
                    .count()
                    >= needed
            }
            None => false,
        }
    }

    /// Closes the session. Reconstructs the plaintexts if the threshold was reached.
    pub fn finish(mut self) -> Result<ThresholdResult> {
        let needed = self.client.shares_needed();
        if self.state != SessionState::Satisfied {
            self.state = SessionState::Failed;
            if self.client.require_agreement && self.accepted.len() >= needed {
                return Err(Error::CryptoBackend(anyhow::anyhow!(
                    "Signers do not agree on a decryption result, at least {needed} identical results are needed"
                )));
            }
            return Err(Error::InsufficientShares {
                accepted: self.accepted.len(),
                required: needed,
            });
        }
        if self.client.require_agreement {
            if let Some(agreed) = self.accepted.last().map(|r| r.payload.clone()) {
                let dissenting: Vec<u32> = self
                    .accepted
                    .iter()
                    .filter(|r| r.payload != agreed)
                    .map(|r| r.party_id)
                    .collect();
                if !dissenting.is_empty() {
                    tracing::warn!("Parties {dissenting:?} returned a result the quorum disagrees with");
                }
                self.accepted.retain(|r| r.payload == agreed);
            }
        }
        let values = self
            .client
            .combiner
            .combine(&self.handles, &self.accepted)
            .map_err(Error::CryptoBackend)?;
        if values.len() != self.handles.len() {
            return Err(Error::CryptoBackend(anyhow::anyhow!(
                "combiner returned {} values for {} handles",
                values.len(),
                self.handles.len()
            )));
        }
        Ok(ThresholdResult {
            signers: self.accepted.iter().map(|r| r.party_id).collect(),
            handles: self.handles,
            values,
        })
    }
}

//! JSON bodies exchanged with the relayer.
//!
//! Every reply is an envelope tagged on `status`. A `success` envelope must carry a `response`
//! of the endpoint's schema, anything missing fails deserialization instead of surfacing later
//! as an absent value.
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};

/// Relayer endpoints used by the SDK, relative to the relayer base url.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, AsRefStr)]
pub enum RelayerEndpoint {
    #[strum(serialize = "v1/input-proof")]
    InputProof,
    #[strum(serialize = "v1/user-decrypt")]
    UserDecrypt,
    #[strum(serialize = "v1/public-decrypt")]
    PublicDecrypt,
}

impl RelayerEndpoint {
    /// Joins the endpoint path to a base url, tolerating a trailing slash on the base.
    pub fn url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.as_ref())
    }
}

/// Status-tagged reply envelope.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RelayerReply<T> {
    Success {
        response: T,
    },
    #[serde(alias = "error")]
    Failed {
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InputProofRequest {
    /// Checksummed address of the contract the input is bound to.
    pub contract_address: String,
    /// Checksummed address of the user submitting the input.
    pub user_address: String,
    /// Packed ciphertext list with its proof, hex without prefix.
    pub ciphertext_with_zkpok: String,
    /// Host chain id as `0x`-prefixed hex.
    pub contract_chain_id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct InputProofResponse {
    /// Handles computed by the relayer, hex without prefix. Optional, an absent or empty list
    /// means the relayer did not echo them.
    #[serde(default)]
    pub handles: Option<Vec<String>>,
    /// Coprocessor signatures over the handles, `0x`-prefixed 65-byte hex.
    pub signatures: Vec<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HandleContractPair {
    pub handle: String,
    pub contract_address: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RequestValidity {
    pub start_timestamp: String,
    pub duration_days: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserDecryptRequestPayload {
    pub handle_contract_pairs: Vec<HandleContractPair>,
    pub request_validity: RequestValidity,
    pub contracts_chain_id: String,
    pub contract_addresses: Vec<String>,
    pub user_address: String,
    /// EIP-712 signature of the user, hex without prefix.
    pub signature: String,
    /// Ephemeral public key the shares are encrypted under, hex without prefix.
    pub public_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_account: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublicDecryptRequestPayload {
    pub ciphertext_handles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
}

/// One signer's answer as forwarded by the relayer.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignerResponseJson {
    /// 1-based id of the signer in the KMS committee.
    pub party_id: u32,
    /// Address the signer signs with, `0x`-prefixed.
    pub verification_key: String,
    /// Digest of the request this response answers.
    pub digest: String,
    /// Encrypted share (user decryption) or plaintext result (public decryption).
    pub payload: String,
    /// 65-byte signature over the payload.
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_data: Option<String>,
}

/// Replies of both decryption endpoints carry one entry per answering signer.
pub type DecryptResponse = Vec<SignerResponseJson>;

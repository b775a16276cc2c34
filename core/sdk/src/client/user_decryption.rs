use crate::client::threshold::{ThresholdDecryptClient, ThresholdResult};
use crate::client::{check_decryption_bits, parse_signer_responses, DecryptionContext};
use crate::cryptography::backend::ShareCombiner;
use crate::cryptography::signatures::Eip712ResponseVerifier;
use crate::eip712::{build_domain, UserDecryptRequest};
use crate::error::{Result, ValidationError};
use crate::input::codec::parse_address;
use crate::input::proof::parse_signature;
use crate::transport::call_relayer;
use alloy_primitives::Address;
use relayer_wire::rpc_types::{
    DecryptResponse, HandleContractPair as HandleContractPairJson, RelayerEndpoint,
    RequestValidity, UserDecryptRequestPayload,
};
use relayer_wire::Handle;
use std::sync::Arc;

pub(crate) const ERR_INVALID_USER_ADDRESS: &str = "Invalid user address.";
pub(crate) const ERR_CONTRACT_NOT_AUTHORIZED: &str =
    "Contract address of a handle is not listed in the signed request.";

/// A ciphertext and the contract that is allowed to use it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandleContractPair {
    pub handle: Handle,
    pub contract_address: String,
}

/// Asks the KMS, through the relayer, to re-encrypt `pairs` under the public key of `request`
/// and combines the signer shares.
///
/// `signature` is the wallet signature over the request digest, `0x`-prefixed or bare hex.
/// Only the limits of the request are checked before anything is sent, the signature itself is
/// checked by the KMS. With response verification on it is also checked locally.
pub async fn user_decrypt(
    context: &DecryptionContext,
    combiner: Arc<dyn ShareCombiner>,
    pairs: &[HandleContractPair],
    request: &UserDecryptRequest,
    user_address: &str,
    signature: &str,
    now: u64,
) -> Result<ThresholdResult> {
    let user_address = parse_address(user_address)
        .ok_or_else(|| ValidationError::Address(ERR_INVALID_USER_ADDRESS.to_string()))?;
    request.validate(now)?;

    let mut handles = Vec::with_capacity(pairs.len());
    let mut handle_contract_pairs = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let contract = parse_address(&pair.contract_address).ok_or_else(|| {
            ValidationError::Address(format!(
                "Invalid contract address {} for handle {}.",
                pair.contract_address, pair.handle
            ))
        })?;
        if !request.contract_addresses().contains(&contract) {
            return Err(ValidationError::Address(format!(
                "{ERR_CONTRACT_NOT_AUTHORIZED} ({contract})"
            ))
            .into());
        }
        handles.push(pair.handle);
        handle_contract_pairs.push(HandleContractPairJson {
            handle: pair.handle.to_relayer_hex(),
            contract_address: contract.to_checksum(None),
        });
    }
    check_decryption_bits(&handles)?;

    let signature = parse_signature(signature)?;
    if context.verify_responses {
        let signer: Address = request.delegated_account().unwrap_or(user_address);
        request.verify_signature(&signature, &signer)?;
    }

    let payload = UserDecryptRequestPayload {
        handle_contract_pairs,
        request_validity: RequestValidity {
            start_timestamp: request.start_timestamp().to_string(),
            duration_days: request.duration_days().to_string(),
        },
        contracts_chain_id: request.contracts_chain_id().to_string(),
        contract_addresses: request
            .contract_addresses()
            .iter()
            .map(|a| a.to_checksum(None))
            .collect(),
        user_address: user_address.to_checksum(None),
        signature: hex::encode(signature),
        public_key: hex::encode(request.public_key()),
        delegated_account: request.delegated_account().map(|a| a.to_checksum(None)),
    };
    let responses: DecryptResponse = call_relayer(
        context.transport.as_ref(),
        &context.relayer_url,
        RelayerEndpoint::UserDecrypt,
        &payload,
    )
    .await?;
    tracing::info!(
        "Received {} user decryption responses for {} handles",
        responses.len(),
        handles.len()
    );
    let responses = parse_signer_responses(&responses);

    let domain = build_domain(context.gateway_chain_id, context.verifying_contract);
    let verifier =
        Eip712ResponseVerifier::for_user_decryption(domain, request.public_key().to_vec(), handles.clone());
    let mut client = ThresholdDecryptClient::new(context.signers.clone(), Arc::new(verifier), combiner);
    if !context.verify_responses {
        client = client.insecure_without_verification();
    }
    client
        .collect(
            request.signing_hash().to_vec(),
            handles,
            futures::stream::iter(responses),
            context.timeout,
        )
        .await
}

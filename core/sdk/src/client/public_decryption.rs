use crate::client::threshold::{ThresholdDecryptClient, ThresholdResult};
use crate::client::{check_decryption_bits, parse_signer_responses, DecryptionContext};
use crate::cryptography::signatures::{AgreementCombiner, Eip712ResponseVerifier};
use crate::eip712::{build_domain, build_public_decrypt_request};
use crate::error::{Result, ValidationError};
use crate::transport::call_relayer;
use relayer_wire::rpc_types::{DecryptResponse, PublicDecryptRequestPayload, RelayerEndpoint};
use relayer_wire::Handle;
use std::sync::Arc;

/// Decrypts handles that were made publicly decryptable.
///
/// Every signer returns the ABI-encoded plaintexts signed under the decryption domain. The
/// result is accepted once `shares_needed` verified signers returned the same encoding, whatever
/// the order in which dissenting signers answer.
pub async fn public_decrypt(
    context: &DecryptionContext,
    handles: &[Handle],
) -> Result<ThresholdResult> {
    if handles.is_empty() {
        return Err(ValidationError::Type("No handle to decrypt.".to_string()).into());
    }
    check_decryption_bits(handles)?;

    let domain = build_domain(context.gateway_chain_id, context.verifying_contract);
    let request = build_public_decrypt_request(domain.clone(), handles, Vec::new());
    let payload = PublicDecryptRequestPayload {
        ciphertext_handles: handles.iter().map(|h| h.to_relayer_hex()).collect(),
        extra_data: None,
    };
    let responses: DecryptResponse = call_relayer(
        context.transport.as_ref(),
        &context.relayer_url,
        RelayerEndpoint::PublicDecrypt,
        &payload,
    )
    .await?;
    tracing::info!(
        "Received {} public decryption responses for {} handles",
        responses.len(),
        handles.len()
    );
    let responses = parse_signer_responses(&responses);

    let verifier = Eip712ResponseVerifier::for_public_decryption(domain, handles.to_vec());
    let combiner = AgreementCombiner::new(context.signers.shares_needed());
    let mut client = ThresholdDecryptClient::new(
        context.signers.clone(),
        Arc::new(verifier),
        Arc::new(combiner),
    )
    .requiring_agreement();
    if !context.verify_responses {
        client = client.insecure_without_verification();
    }
    client
        .collect(
            request.signing_hash().to_vec(),
            handles.to_vec(),
            futures::stream::iter(responses),
            context.timeout,
        )
        .await
}

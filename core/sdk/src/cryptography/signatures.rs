use crate::client::threshold::SignerResponse;
use crate::consts::SIGNATURE_BYTES;
use crate::cryptography::backend::{ShareCombiner, SignatureVerifier};
use crate::engine::validation::select_most_common;
use crate::input::codec::{ClearValue, FheKind};
use crate::input::handles::HandleKind;
use alloy_dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use relayer_wire::solidity_types::{PublicDecryptVerification, UserDecryptResponseVerification};
use relayer_wire::Handle;

pub(crate) const ERR_SIG_BAD_LENGTH: &str = "Expected external signature of length 65 Bytes";
pub(crate) const ERR_SIG_BAD_RECOVERY_ID: &str = "Unexpected recovery id in external signature";

/// Recovers the signing address of a 65-byte `r || s || v` signature over `digest`.
///
/// `v` may be given as 0/1 or 27/28.
pub fn recover_signer(digest: &B256, signature: &[u8]) -> anyhow::Result<Address> {
    if signature.len() != SIGNATURE_BYTES {
        anyhow::bail!("{ERR_SIG_BAD_LENGTH}, but got {}", signature.len());
    }
    let parity = match signature[64] {
        0 | 27 => false,
        1 | 28 => true,
        v => anyhow::bail!("{ERR_SIG_BAD_RECOVERY_ID}: {v}"),
    };
    let sig = alloy_signer::Signature::from_bytes_and_parity(&signature[..64], parity);
    Ok(sig.recover_address_from_prehash(digest)?)
}

/// Which gateway struct a signer signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignedResult {
    /// Re-encrypted share for the holder of `public_key`.
    UserShare { public_key: Vec<u8> },
    /// ABI-encoded plaintexts.
    PublicResult,
}

/// Verifies signer responses the way the gateway contract does: the signature is an EIP-712
/// signature over the response struct under the decryption domain.
#[derive(Clone, Debug)]
pub struct Eip712ResponseVerifier {
    domain: Eip712Domain,
    handles: Vec<Handle>,
    extra_data: Vec<u8>,
    signed: SignedResult,
}

impl Eip712ResponseVerifier {
    pub fn for_user_decryption(domain: Eip712Domain, public_key: Vec<u8>, handles: Vec<Handle>) -> Self {
        Self {
            domain,
            handles,
            extra_data: Vec::new(),
            signed: SignedResult::UserShare { public_key },
        }
    }

    pub fn for_public_decryption(domain: Eip712Domain, handles: Vec<Handle>) -> Self {
        Self {
            domain,
            handles,
            extra_data: Vec::new(),
            signed: SignedResult::PublicResult,
        }
    }

    pub fn with_extra_data(mut self, extra_data: Vec<u8>) -> Self {
        self.extra_data = extra_data;
        self
    }

    /// EIP-712 hash a correct signer signs for `payload`.
    pub fn signing_hash(&self, payload: &[u8]) -> B256 {
        match &self.signed {
            SignedResult::UserShare { public_key } => UserDecryptResponseVerification::new(
                public_key.clone(),
                &self.handles,
                payload.to_vec(),
                self.extra_data.clone(),
            )
            .eip712_signing_hash(&self.domain),
            SignedResult::PublicResult => PublicDecryptVerification::new(
                &self.handles,
                payload.to_vec(),
                self.extra_data.clone(),
            )
            .eip712_signing_hash(&self.domain),
        }
    }
}

impl SignatureVerifier for Eip712ResponseVerifier {
    fn verify(
        &self,
        verification_key: &Address,
        _digest: &[u8],
        payload: &[u8],
        signature: &[u8],
    ) -> anyhow::Result<bool> {
        let hash = self.signing_hash(payload);
        let recovered = recover_signer(&hash, signature)?;
        tracing::debug!("recovered address: {}", recovered);
        Ok(recovered == *verification_key)
    }
}

/// Public decryption needs no secret reconstruction: every honest signer returns the same
/// ABI-encoded result. The combiner takes the most common payload, which must be backed by
/// `min_agreement` responses, and decodes it using the kind recorded in each handle.
#[derive(Clone, Debug)]
pub struct AgreementCombiner {
    min_agreement: usize,
}

impl AgreementCombiner {
    pub fn new(min_agreement: usize) -> Self {
        Self { min_agreement }
    }
}

impl ShareCombiner for AgreementCombiner {
    fn combine(
        &self,
        handles: &[Handle],
        responses: &[SignerResponse],
    ) -> anyhow::Result<Vec<ClearValue>> {
        let payloads: Vec<&Vec<u8>> = responses.iter().map(|r| &r.payload).collect();
        let idx = match select_most_common(self.min_agreement, payloads.iter().copied()) {
            Some(idx) => idx,
            None => anyhow::bail!(
                "Signers do not agree on a public decryption result, at least {} identical results are needed",
                self.min_agreement
            ),
        };
        decode_public_result(handles, payloads[idx])
    }
}

fn sol_type(kind: FheKind) -> DynSolType {
    match kind {
        FheKind::Bool => DynSolType::Bool,
        FheKind::Address => DynSolType::Address,
        FheKind::Bytes64 | FheKind::Bytes128 | FheKind::Bytes256 => DynSolType::Bytes,
        // euint4 travels as a uint8
        FheKind::Uint4 => DynSolType::Uint(8),
        other => DynSolType::Uint(other.bits() as usize),
    }
}

/// Decodes the ABI encoding of a public decryption result, one value per handle.
pub fn decode_public_result(handles: &[Handle], result: &[u8]) -> anyhow::Result<Vec<ClearValue>> {
    let kinds = handles
        .iter()
        .map(|h| {
            h.kind()
                .ok_or_else(|| anyhow::anyhow!("Unknown type tag {} in handle {h}", h.type_tag()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let ty = DynSolType::Tuple(kinds.iter().copied().map(sol_type).collect());
    let decoded = ty.abi_decode_params(result)?;
    let values = match decoded {
        DynSolValue::Tuple(values) => values,
        other => anyhow::bail!("Unexpected decoded value {other:?}"),
    };
    kinds
        .into_iter()
        .zip(values)
        .map(|(kind, value)| {
            let clear = match value {
                DynSolValue::Bool(b) => ClearValue::Bool(b),
                DynSolValue::Address(a) => ClearValue::Address(a.to_checksum(None)),
                DynSolValue::Bytes(bytes) => ClearValue::Bytes(bytes),
                DynSolValue::Uint(v, _) => ClearValue::Uint(v),
                other => anyhow::bail!("Unexpected value {other:?} for {kind}"),
            };
            // the plaintext must still satisfy the range of its kind
            crate::input::codec::encode(kind, &clear)?;
            Ok(clear)
        })
        .collect()
}

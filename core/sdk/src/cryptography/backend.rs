//! Narrow interfaces to the FHE and signature machinery the SDK depends on but does not
//! implement. Implementations report failures as [`anyhow::Error`]; callers wrap them into
//! [`crate::error::Error::CryptoBackend`] without further interpretation.
use crate::client::threshold::SignerResponse;
use crate::input::codec::{ClearValue, TypedValue};
use alloy_primitives::{Address, U256};
use relayer_wire::Handle;

/// Packed ciphertext list together with its zero-knowledge proof, serialized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofPayload(Vec<u8>);

impl ProofPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Everything a packer binds into the proof besides the values themselves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackContext {
    pub contract_address: Address,
    pub user_address: Address,
    pub acl_contract_address: Address,
    pub chain_id: u64,
}

impl PackContext {
    /// Auxiliary proof data: `contract (20) || user (20) || acl (20) || chain_id (32, BE)`.
    pub fn zk_metadata(&self) -> Vec<u8> {
        let mut metadata = Vec::with_capacity(92);
        metadata.extend_from_slice(self.contract_address.as_slice());
        metadata.extend_from_slice(self.user_address.as_slice());
        metadata.extend_from_slice(self.acl_contract_address.as_slice());
        metadata.extend_from_slice(&U256::from(self.chain_id).to_be_bytes::<32>());
        metadata
    }
}

/// Encrypts, proves and serializes a bundle of values.
pub trait InputPacker: Send + Sync {
    fn pack(&self, values: &[TypedValue], context: &PackContext) -> anyhow::Result<ProofPayload>;
}

/// Checks a signer's signature over a response.
pub trait SignatureVerifier: Send + Sync {
    fn verify(
        &self,
        verification_key: &Address,
        digest: &[u8],
        payload: &[u8],
        signature: &[u8],
    ) -> anyhow::Result<bool>;
}

/// Reconstructs plaintexts from a set of accepted signer responses.
///
/// The responses given are distinct, digest-matching and verified. Their number is at least the
/// configured threshold.
pub trait ShareCombiner: Send + Sync {
    fn combine(
        &self,
        handles: &[Handle],
        responses: &[SignerResponse],
    ) -> anyhow::Result<Vec<ClearValue>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn zk_metadata_layout() {
        let context = PackContext {
            contract_address: Address::from_str("0x8ba1f109551bD432803012645Ac136ddd64DBA72")
                .unwrap(),
            user_address: Address::from_str("0xa5e1defb98EFe38EBb2D958CEe052410247F4c80")
                .unwrap(),
            acl_contract_address: Address::repeat_byte(0x11),
            chain_id: 9000,
        };
        let metadata = context.zk_metadata();
        assert_eq!(metadata.len(), 92);
        assert_eq!(&metadata[..20], context.contract_address.as_slice());
        assert_eq!(&metadata[20..40], context.user_address.as_slice());
        assert_eq!(&metadata[40..60], &[0x11; 20]);
        assert_eq!(&metadata[60..90], &[0; 30]);
        assert_eq!(&metadata[90..], &[0x23, 0x28]);
    }
}

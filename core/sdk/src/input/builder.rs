use crate::consts::{CIPHERTEXT_VERSION, MAX_INPUT_BITS, MAX_INPUT_VALUES};
use crate::cryptography::backend::{InputPacker, PackContext};
use crate::error::{Error, HandleMismatch, Result, ValidationError};
use crate::input::codec::{parse_address, ClearValue, FheKind, TypedValue};
use crate::input::handles::compute_handles;
use crate::input::proof::InputProof;
use crate::transport::{call_relayer, Transport};
use alloy_primitives::{Address, U256};
use relayer_wire::rpc_types::{InputProofRequest, InputProofResponse, RelayerEndpoint};
use relayer_wire::Handle;
use std::sync::Arc;

pub(crate) const ERR_INVALID_CONTRACT_ADDRESS: &str = "Contract address is not a valid address.";
pub(crate) const ERR_INVALID_USER_ADDRESS: &str = "User address is not a valid address.";
pub(crate) const ERR_EMPTY_INPUT: &str = "Encrypted input must contain at least one value.";

/// Result of [`InputBuilder::finalize`]: one handle per added value and the proof the contract
/// verifies them with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedInput {
    pub handles: Vec<Handle>,
    pub input_proof: InputProof,
}

/// Ordered collection of values to encrypt for one `(contract, user)` pair.
///
/// Values are range checked as they are added. The bit budget is only enforced by
/// [`InputBuilder::finalize`], so a bundle may temporarily exceed it while being built.
///
/// The builder is not meant to be shared between tasks: insertion order defines the handle
/// indices.
pub struct InputBuilder {
    contract_address: Address,
    user_address: Address,
    acl_contract_address: Address,
    chain_id: u64,
    relayer_url: String,
    values: Vec<TypedValue>,
    total_bits: u32,
    packer: Arc<dyn InputPacker>,
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for InputBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBuilder")
            .field("contract_address", &self.contract_address)
            .field("user_address", &self.user_address)
            .field("chain_id", &self.chain_id)
            .field("values", &self.values.len())
            .field("total_bits", &self.total_bits)
            .finish()
    }
}

impl InputBuilder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        contract_address: &str,
        user_address: &str,
        acl_contract_address: Address,
        chain_id: u64,
        relayer_url: &str,
        packer: Arc<dyn InputPacker>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let contract_address = parse_address(contract_address).ok_or_else(|| {
            ValidationError::Address(ERR_INVALID_CONTRACT_ADDRESS.to_string())
        })?;
        let user_address = parse_address(user_address)
            .ok_or_else(|| ValidationError::Address(ERR_INVALID_USER_ADDRESS.to_string()))?;
        Ok(Self {
            contract_address,
            user_address,
            acl_contract_address,
            chain_id,
            relayer_url: relayer_url.to_string(),
            values: Vec::new(),
            total_bits: 0,
            packer,
            transport,
        })
    }

    /// Appends a value. Fails without modifying the bundle if the value does not fit `kind`.
    pub fn add(&mut self, kind: FheKind, value: impl Into<ClearValue>) -> Result<&mut Self> {
        let value = TypedValue::new(kind, &value.into())?;
        self.total_bits = self.total_bits.saturating_add(kind.budget_bits());
        self.values.push(value);
        Ok(self)
    }

    pub fn add_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.add(FheKind::Bool, value)
    }

    pub fn add_u4(&mut self, value: u8) -> Result<&mut Self> {
        self.add(FheKind::Uint4, value as u64)
    }

    pub fn add_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.add(FheKind::Uint8, value as u64)
    }

    pub fn add_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.add(FheKind::Uint16, value as u64)
    }

    pub fn add_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.add(FheKind::Uint32, value as u64)
    }

    pub fn add_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.add(FheKind::Uint64, value)
    }

    pub fn add_u128(&mut self, value: u128) -> Result<&mut Self> {
        self.add(FheKind::Uint128, value)
    }

    pub fn add_u256(&mut self, value: U256) -> Result<&mut Self> {
        self.add(FheKind::Uint256, value)
    }

    pub fn add_address(&mut self, value: &str) -> Result<&mut Self> {
        self.add(FheKind::Address, ClearValue::Address(value.to_string()))
    }

    pub fn add_bytes64(&mut self, value: &[u8]) -> Result<&mut Self> {
        self.add(FheKind::Bytes64, value.to_vec())
    }

    pub fn add_bytes128(&mut self, value: &[u8]) -> Result<&mut Self> {
        self.add(FheKind::Bytes128, value.to_vec())
    }

    pub fn add_bytes256(&mut self, value: &[u8]) -> Result<&mut Self> {
        self.add(FheKind::Bytes256, value.to_vec())
    }

    /// Budget width of every value, in insertion order.
    pub fn bits(&self) -> Vec<u32> {
        self.values.iter().map(|v| v.kind().budget_bits()).collect()
    }

    pub fn total_bits(&self) -> u32 {
        self.total_bits
    }

    pub fn values(&self) -> &[TypedValue] {
        &self.values
    }

    fn pack_context(&self) -> PackContext {
        PackContext {
            contract_address: self.contract_address,
            user_address: self.user_address,
            acl_contract_address: self.acl_contract_address,
            chain_id: self.chain_id,
        }
    }

    /// Packs and proves the bundle, has the relayer attest it and checks the relayer's handles
    /// against the locally derived ones.
    ///
    /// Nothing is sent when the bundle is over budget. The relayer's reply is used only if every
    /// handle it returns matches, the returned handles are always the local ones.
    pub async fn finalize(&self) -> Result<EncryptedInput> {
        if self.total_bits > MAX_INPUT_BITS {
            return Err(Error::BudgetExceeded {
                total: self.total_bits,
                max: MAX_INPUT_BITS,
            });
        }
        if self.values.is_empty() {
            return Err(ValidationError::Type(ERR_EMPTY_INPUT.to_string()).into());
        }
        if self.values.len() > MAX_INPUT_VALUES {
            return Err(ValidationError::Range(format!(
                "Too many values in one input: {} (maximum is {MAX_INPUT_VALUES}).",
                self.values.len()
            ))
            .into());
        }

        let payload = self
            .packer
            .pack(&self.values, &self.pack_context())
            .map_err(Error::CryptoBackend)?;
        tracing::info!(
            "Packed {} values ({} bits) into {} bytes for contract {}",
            self.values.len(),
            self.total_bits,
            payload.as_bytes().len(),
            self.contract_address
        );

        let request = InputProofRequest {
            contract_address: self.contract_address.to_checksum(None),
            user_address: self.user_address.to_checksum(None),
            ciphertext_with_zkpok: hex::encode(payload.as_bytes()),
            contract_chain_id: format!("0x{:x}", self.chain_id),
        };
        let response: InputProofResponse = call_relayer(
            self.transport.as_ref(),
            &self.relayer_url,
            RelayerEndpoint::InputProof,
            &request,
        )
        .await?;

        let kinds: Vec<FheKind> = self.values.iter().map(|v| v.kind()).collect();
        let handles = compute_handles(
            payload.as_bytes(),
            &kinds,
            &self.acl_contract_address,
            self.chain_id,
            CIPHERTEXT_VERSION,
        );

        match response.handles.as_deref() {
            Some(received) if !received.is_empty() => check_handles(&handles, received)?,
            _ => tracing::debug!("Relayer did not echo handles, using local ones"),
        }

        let input_proof = InputProof::from_hex_signatures(handles.clone(), &response.signatures)
            .map_err(|e| {
                Error::relayer(
                    RelayerEndpoint::InputProof.url(&self.relayer_url),
                    None,
                    format!("invalid coprocessor signature: {e}"),
                )
            })?;
        Ok(EncryptedInput {
            handles,
            input_proof,
        })
    }
}

fn check_handles(expected: &[Handle], received: &[String]) -> Result<()> {
    if expected.len() != received.len() {
        return Err(Error::HandleMismatch(HandleMismatch::Length {
            expected: expected.len(),
            received: received.len(),
        }));
    }
    for (index, (local, remote)) in expected.iter().zip(received).enumerate() {
        let matches = remote
            .parse::<Handle>()
            .map(|parsed| parsed == *local)
            .unwrap_or(false);
        if !matches {
            tracing::error!("Relayer handle {index} does not match the local computation");
            return Err(Error::HandleMismatch(HandleMismatch::Value {
                index,
                expected: local.to_relayer_hex(),
                received: remote.clone(),
            }));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{input_proof_responder, FakePacker, FakeTransport};
    use serde_json::json;

    const CONTRACT: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";
    const USER: &str = "0xa5e1defb98EFe38EBb2D958CEe052410247F4c80";
    const RELAYER: &str = "https://relayer.test/";
    const CHAIN_ID: u64 = 9000;

    fn acl() -> Address {
        Address::repeat_byte(0x42)
    }

    fn builder(packer: Arc<FakePacker>, transport: Arc<FakeTransport>) -> InputBuilder {
        InputBuilder::new(CONTRACT, USER, acl(), CHAIN_ID, RELAYER, packer, transport).unwrap()
    }

    #[test]
    fn rejects_malformed_addresses() {
        let err = InputBuilder::new(
            "0xabc",
            USER,
            acl(),
            CHAIN_ID,
            RELAYER,
            Arc::new(FakePacker::default()),
            Arc::new(FakeTransport::with_reply(200, "")),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ERR_INVALID_CONTRACT_ADDRESS));
        let err = InputBuilder::new(
            CONTRACT,
            "not an address",
            acl(),
            CHAIN_ID,
            RELAYER,
            Arc::new(FakePacker::default()),
            Arc::new(FakeTransport::with_reply(200, "")),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ERR_INVALID_USER_ADDRESS));
    }

    #[test]
    fn add_checks_range_immediately() {
        let mut input = builder(
            Arc::new(FakePacker::default()),
            Arc::new(FakeTransport::with_reply(200, "")),
        );
        input.add_u8(255).unwrap().add_bool(true).unwrap();
        assert!(input.add_u4(16).is_err());
        assert!(input.add(FheKind::Uint8, 256u64).is_err());
        assert_eq!(input.values().len(), 2);
        assert_eq!(input.bits(), vec![8, 2]);
        assert_eq!(input.total_bits(), 10);
    }

    #[tokio::test]
    async fn budget_is_checked_at_finalize_without_network() {
        let packer = Arc::new(FakePacker::default());
        let transport = Arc::new(FakeTransport::with_reply(200, ""));
        let mut input = builder(packer.clone(), transport.clone());
        input.add_bytes256(&[1; 256]).unwrap();
        input.add_bool(false).unwrap();
        assert_eq!(input.total_bits(), 2050);

        match input.finalize().await.unwrap_err() {
            Error::BudgetExceeded { total, max } => {
                assert_eq!(total, 2050);
                assert_eq!(max, 2048);
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(packer.calls(), 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn bit_count_saturates() {
        let transport = Arc::new(FakeTransport::with_reply(200, ""));
        let mut input = builder(Arc::new(FakePacker::default()), transport);
        input.add_u8(1).unwrap();
        input.total_bits = u32::MAX - 1;
        input.add_bytes256(&[1; 256]).unwrap();
        assert_eq!(input.total_bits(), u32::MAX);
        assert!(matches!(
            input.finalize().await.unwrap_err(),
            Error::BudgetExceeded { total: u32::MAX, .. }
        ));
    }

    #[tokio::test]
    async fn finalize_matches_relayer_handles() {
        let packer = Arc::new(FakePacker::default());
        let transport = Arc::new(FakeTransport::new(input_proof_responder(acl(), CHAIN_ID, 2)));
        let mut input = builder(packer.clone(), transport.clone());
        input
            .add_u64(42)
            .unwrap()
            .add_address(USER)
            .unwrap()
            .add_bool(true)
            .unwrap();

        let encrypted = input.finalize().await.unwrap();
        assert_eq!(encrypted.handles.len(), 3);
        for (i, handle) in encrypted.handles.iter().enumerate() {
            assert_eq!(handle.index() as usize, i);
            assert_eq!(handle.chain_id(), CHAIN_ID);
            assert_eq!(handle.version(), CIPHERTEXT_VERSION);
        }
        assert_eq!(encrypted.handles[1].type_tag(), FheKind::Address.type_tag());
        assert_eq!(encrypted.input_proof.handles(), encrypted.handles.as_slice());
        assert_eq!(encrypted.input_proof.signatures().len(), 2);
        assert_eq!(packer.calls(), 1);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        let (url, body) = &calls[0];
        assert_eq!(url, "https://relayer.test/v1/input-proof");
        assert_eq!(body["contractAddress"], CONTRACT);
        assert_eq!(body["userAddress"], USER);
        assert_eq!(body["contractChainId"], "0x2328");
        assert!(!body["ciphertextWithZkpok"].as_str().unwrap().starts_with("0x"));
    }

    #[tokio::test]
    async fn handle_count_mismatch_is_fatal() {
        let transport = Arc::new(FakeTransport::with_json(
            200,
            json!({
                "status": "success",
                "response": {"handles": ["00".repeat(32)], "signatures": []}
            }),
        ));
        let mut input = builder(Arc::new(FakePacker::default()), transport);
        input.add_u8(1).unwrap().add_u8(2).unwrap();
        match input.finalize().await.unwrap_err() {
            Error::HandleMismatch(HandleMismatch::Length { expected, received }) => {
                assert_eq!(expected, 2);
                assert_eq!(received, 1);
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn handle_value_mismatch_is_fatal() {
        let transport = Arc::new(FakeTransport::with_json(
            200,
            json!({
                "status": "success",
                "response": {"handles": ["00".repeat(32)], "signatures": []}
            }),
        ));
        let mut input = builder(Arc::new(FakePacker::default()), transport);
        input.add_u8(1).unwrap();
        let err = input.finalize().await.unwrap_err();
        assert!(matches!(
            err,
            Error::HandleMismatch(HandleMismatch::Value { index: 0, .. })
        ));
        assert!(err.to_string().contains("Incorrect Handle 0"));
    }

    #[tokio::test]
    async fn missing_handles_fall_back_to_local() {
        let transport = Arc::new(FakeTransport::with_json(
            200,
            json!({"status": "success", "response": {"signatures": []}}),
        ));
        let mut input = builder(Arc::new(FakePacker::default()), transport);
        input.add_u32(7).unwrap();
        let encrypted = input.finalize().await.unwrap();
        assert_eq!(encrypted.handles.len(), 1);
        assert_eq!(encrypted.input_proof.to_bytes()[..2], [1, 0]);
    }

    #[tokio::test]
    async fn packer_failure_is_propagated() {
        let packer = Arc::new(FakePacker::failing());
        let transport = Arc::new(FakeTransport::with_reply(200, ""));
        let mut input = builder(packer, transport.clone());
        input.add_u8(3).unwrap();
        assert!(matches!(
            input.finalize().await.unwrap_err(),
            Error::CryptoBackend(_)
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_rejected() {
        let input = builder(
            Arc::new(FakePacker::default()),
            Arc::new(FakeTransport::with_reply(200, "")),
        );
        let err = input.finalize().await.unwrap_err();
        assert!(err.to_string().contains(ERR_EMPTY_INPUT));
    }
}

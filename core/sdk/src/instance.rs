use crate::client::public_decryption::public_decrypt;
use crate::client::threshold::ThresholdResult;
use crate::client::user_decryption::{user_decrypt, HandleContractPair};
use crate::client::{unix_now, DecryptionContext};
use crate::conf::SdkConfig;
use crate::cryptography::backend::{InputPacker, ShareCombiner};
use crate::eip712::{build_domain, build_user_decrypt_request, UserDecryptRequest};
use crate::error::{Error, Result, ValidationError};
use crate::input::codec::ClearValue;
use crate::input::builder::InputBuilder;
use crate::transport::{ReqwestTransport, Transport};
use crate::{anyhow_error_and_log, some_or_err};
use relayer_wire::Handle;
use std::sync::Arc;
use typed_builder::TypedBuilder;

/// External machinery the SDK delegates to.
#[derive(TypedBuilder, Clone)]
pub struct Capabilities {
    /// Encrypts and proves input bundles.
    packer: Arc<dyn InputPacker>,
    /// Reconstructs user decryption results from signer shares.
    combiner: Arc<dyn ShareCombiner>,
    transport: Arc<dyn Transport>,
}

/// Entry point for applications: encrypted inputs, decryption requests and decryptions against
/// one relayer and one KMS committee.
pub struct RelayerInstance {
    config: SdkConfig,
    capabilities: Capabilities,
}

impl RelayerInstance {
    pub fn new(config: SdkConfig, capabilities: Capabilities) -> Result<Self> {
        // fail early on addresses, they are only parsed lazily afterwards
        config.acl_contract_address()?;
        config.verifying_contract_address_decryption()?;
        if !config.verify_responses {
            tracing::warn!("Relayer instance configured without signer response verification");
        }
        Ok(Self {
            config,
            capabilities,
        })
    }

    /// Same as [`RelayerInstance::new`] with an HTTP transport whose timeout is the configured
    /// decryption timeout.
    pub fn with_http(
        config: SdkConfig,
        packer: Arc<dyn InputPacker>,
        combiner: Arc<dyn ShareCombiner>,
    ) -> Result<Self> {
        let transport =
            ReqwestTransport::new(config.decryption_timeout()).map_err(|e| Error::Transport {
                endpoint: config.relayer_url.clone(),
                source: anyhow_error_and_log(format!("cannot create the HTTP client: {e}")),
            })?;
        let capabilities = Capabilities::builder()
            .packer(packer)
            .combiner(combiner)
            .transport(Arc::new(transport))
            .build();
        Self::new(config, capabilities)
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    /// Starts a new bundle of values to encrypt for `contract_address` on behalf of
    /// `user_address`.
    pub fn create_encrypted_input(
        &self,
        contract_address: &str,
        user_address: &str,
    ) -> Result<InputBuilder> {
        InputBuilder::new(
            contract_address,
            user_address,
            self.config.acl_contract_address()?,
            self.config.chain_id,
            &self.config.relayer_url,
            self.capabilities.packer.clone(),
            self.capabilities.transport.clone(),
        )
    }

    /// Typed data a user signs to decrypt values of `contract_addresses` under `public_key`
    /// (hex, with or without `0x`).
    pub fn create_eip712<S: AsRef<str>>(
        &self,
        public_key: &str,
        contract_addresses: &[S],
        start_timestamp: u64,
        duration_days: u64,
    ) -> Result<UserDecryptRequest> {
        self.eip712_request(public_key, contract_addresses, start_timestamp, duration_days, None)
    }

    /// Like [`RelayerInstance::create_eip712`], signed by `delegated_account` on behalf of the
    /// user.
    pub fn create_delegated_eip712<S: AsRef<str>>(
        &self,
        public_key: &str,
        contract_addresses: &[S],
        start_timestamp: u64,
        duration_days: u64,
        delegated_account: &str,
    ) -> Result<UserDecryptRequest> {
        self.eip712_request(
            public_key,
            contract_addresses,
            start_timestamp,
            duration_days,
            Some(delegated_account),
        )
    }

    fn eip712_request<S: AsRef<str>>(
        &self,
        public_key: &str,
        contract_addresses: &[S],
        start_timestamp: u64,
        duration_days: u64,
        delegated_account: Option<&str>,
    ) -> Result<UserDecryptRequest> {
        let public_key = decode_public_key(public_key)?;
        let domain = build_domain(
            self.config.gateway_chain_id,
            self.config.verifying_contract_address_decryption()?,
        );
        build_user_decrypt_request(
            domain,
            &public_key,
            contract_addresses,
            self.config.chain_id,
            start_timestamp,
            duration_days,
            delegated_account,
        )
    }

    fn decryption_context(&self) -> Result<DecryptionContext> {
        Ok(DecryptionContext {
            relayer_url: self.config.relayer_url.clone(),
            gateway_chain_id: self.config.gateway_chain_id,
            verifying_contract: self.config.verifying_contract_address_decryption()?,
            signers: self.config.signer_set()?,
            verify_responses: self.config.verify_responses,
            timeout: self.config.decryption_timeout(),
            transport: self.capabilities.transport.clone(),
        })
    }

    /// Decrypts `pairs` for the user who signed `request` with `signature`.
    pub async fn user_decrypt(
        &self,
        pairs: &[HandleContractPair],
        request: &UserDecryptRequest,
        user_address: &str,
        signature: &str,
    ) -> Result<ThresholdResult> {
        let context = self.decryption_context()?;
        user_decrypt(
            &context,
            self.capabilities.combiner.clone(),
            pairs,
            request,
            user_address,
            signature,
            unix_now()?,
        )
        .await
    }

    pub async fn public_decrypt(&self, handles: &[Handle]) -> Result<ThresholdResult> {
        let context = self.decryption_context()?;
        public_decrypt(&context, handles).await
    }

    /// Decrypts a single publicly decryptable handle.
    pub async fn public_decrypt_one(&self, handle: Handle) -> Result<ClearValue> {
        let result = self.public_decrypt(&[handle]).await?;
        some_or_err(
            result.values.into_iter().next(),
            "public decryption returned no value".to_string(),
        )
        .map_err(Error::CryptoBackend)
    }
}

fn decode_public_key(public_key: &str) -> Result<Vec<u8>> {
    let stripped = public_key.strip_prefix("0x").unwrap_or(public_key);
    let bytes = hex::decode(stripped)
        .map_err(|e| ValidationError::Key(format!("Invalid public key: {e}.")))?;
    if bytes.is_empty() {
        return Err(ValidationError::Key("Public key must not be empty.".to_string()).into());
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{input_proof_responder, FakeCombiner, FakePacker, FakeTransport};
    use alloy_primitives::Address;

    const CONTRACT: &str = "0x8Fdb26641d14a80FCCBE87BF455338Dd9C539a50";
    const USER: &str = "0xa5e1defb98EFe38EBb2D958CEe052410247F4c80";

    fn config(verify_responses: bool) -> SdkConfig {
        let conf = serde_json::json!({
            "relayer_url": "https://relayer.test",
            "chain_id": 9000,
            "gateway_chain_id": 654321,
            "acl_contract_address": "0x8ba1f109551bD432803012645Ac136ddd64DBA72",
            "verifying_contract_address_decryption": "0x857Ca72A957920Fa0FB138602995839866Bd4005",
            "signers": [{"party_id": 1, "address": "0x9403A2A708a19E6940c5bc3471F54f4FB5C12d57"}],
            "verify_responses": verify_responses,
        });
        serde_json::from_value(conf).unwrap()
    }

    fn instance(transport: FakeTransport) -> RelayerInstance {
        let capabilities = Capabilities::builder()
            .packer(Arc::new(FakePacker::default()))
            .combiner(Arc::new(FakeCombiner::returning(vec![ClearValue::Bool(true)])))
            .transport(Arc::new(transport))
            .build();
        RelayerInstance::new(config(true), capabilities).unwrap()
    }

    #[tokio::test]
    async fn encrypted_input_uses_configured_acl_and_chain() {
        let acl = Address::parse_checksummed("0x8ba1f109551bD432803012645Ac136ddd64DBA72", None)
            .unwrap();
        let instance = instance(FakeTransport::new(input_proof_responder(acl, 9000, 1)));
        let mut input = instance.create_encrypted_input(CONTRACT, USER).unwrap();
        input.add_u16(7).unwrap();
        let encrypted = input.finalize().await.unwrap();
        assert_eq!(encrypted.handles[0].chain_id(), 9000);
    }

    #[test]
    fn eip712_uses_gateway_domain_and_host_chain() {
        let instance = instance(FakeTransport::with_reply(200, ""));
        let request = instance
            .create_eip712(
                "0x2000000000000000f119229d0276d44fe73c32889f140f64ffeb8d4b0b4e898edf6bd1edc119062e",
                &[CONTRACT],
                1742371207,
                10,
            )
            .unwrap();
        let typed = request.typed_data();
        assert_eq!(typed.domain.chain_id, 654321);
        assert_eq!(
            typed.domain.verifying_contract,
            "0x857Ca72A957920Fa0FB138602995839866Bd4005"
        );
        assert_eq!(typed.message["contractsChainId"], "9000");
        assert!(request.delegated_account().is_none());

        let delegated = instance
            .create_delegated_eip712("abcd", &[CONTRACT], 1742371207, 10, USER)
            .unwrap();
        assert_eq!(
            delegated.delegated_account().map(|a| a.to_checksum(None)),
            Some(USER.to_string())
        );
    }

    #[test]
    fn malformed_public_key() {
        let instance = instance(FakeTransport::with_reply(200, ""));
        let err = instance
            .create_eip712("0xzz", &[CONTRACT], 1, 1)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::Key(_))));
    }

    #[tokio::test]
    async fn public_decrypt_needs_a_handle() {
        let instance = instance(FakeTransport::with_reply(200, ""));
        assert!(matches!(
            instance.public_decrypt(&[]).await.unwrap_err(),
            Error::Validation(ValidationError::Type(_))
        ));
    }
}

use crate::client::threshold::SignerSet;
use crate::consts::DEFAULT_DECRYPTION_TIMEOUT_SECS;
use crate::error::{Error, Result};
use crate::input::codec::parse_address;
use alloy_primitives::Address;
use observability::conf::{Settings, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const CONFIG_ENV_PREFIX: &str = "RELAYER_SDK";

fn default_decryption_timeout_secs() -> u64 {
    DEFAULT_DECRYPTION_TIMEOUT_SECS
}

fn default_verify_responses() -> bool {
    true
}

#[derive(Serialize, Clone, Validate, Debug)]
#[validate(schema(function = validate_sdk_conf))]
pub struct SdkConfig {
    /// Base url of the relayer, without the `v1/...` path.
    #[validate(url)]
    pub relayer_url: String,
    /// Host chain the encrypted inputs are bound to.
    #[validate(range(min = 1))]
    pub chain_id: u64,
    /// Chain of the gateway hosting the decryption and input verification contracts.
    #[validate(range(min = 1))]
    pub gateway_chain_id: u64,
    pub acl_contract_address: String,
    pub verifying_contract_address_decryption: String,
    /// KMS committee. Decryption is unavailable when empty.
    #[validate(nested)]
    pub signers: Vec<SignerConf>,
    #[validate(range(min = 1))]
    pub shares_needed: usize,
    #[validate(range(min = 1))]
    pub decryption_timeout_secs: u64,
    /// Turning this off accepts responses from any signer and is insecure.
    pub verify_responses: bool,
    pub telemetry: Option<TelemetryConfig>,
}

#[derive(Deserialize, Serialize, Clone, Validate, Default, Debug, PartialEq, Eq)]
pub struct SignerConf {
    /// Id of the KMS party (monotonically increasing positive integer starting at 1)
    #[validate(range(min = 1))]
    pub party_id: u32,
    /// Checksummed address the party signs its responses with.
    #[validate(length(min = 1))]
    pub address: String,
}

fn invalid_address(field: &str, value: &str) -> ValidationError {
    ValidationError::new("Invalid Address")
        .with_message(format!("{field} is not a valid checksummed address: {value}").into())
}

fn validate_sdk_conf(conf: &SdkConfig) -> std::result::Result<(), ValidationError> {
    for (field, value) in [
        ("acl_contract_address", &conf.acl_contract_address),
        (
            "verifying_contract_address_decryption",
            &conf.verifying_contract_address_decryption,
        ),
    ] {
        if parse_address(value).is_none() {
            return Err(invalid_address(field, value));
        }
    }

    for signer in &conf.signers {
        if parse_address(&signer.address).is_none() {
            return Err(invalid_address("signer address", &signer.address));
        }
        if conf
            .signers
            .iter()
            .filter(|x| x.party_id == signer.party_id)
            .count()
            > 1
        {
            return Err(ValidationError::new("Duplicate Party ID").with_message(
                format!(
                    "Party ID {} is duplicated in the configuration.",
                    signer.party_id
                )
                .into(),
            ));
        }
        if conf
            .signers
            .iter()
            .filter(|x| x.address.eq_ignore_ascii_case(&signer.address))
            .count()
            > 1
        {
            return Err(ValidationError::new("Duplicate Address").with_message(
                format!(
                    "Address {} is duplicated in the configuration.",
                    signer.address
                )
                .into(),
            ));
        }
    }
    if !conf.signers.is_empty() && conf.shares_needed > conf.signers.len() {
        return Err(ValidationError::new("Shares Needed Error").with_message(format!("Number of shares needed ({}) must be smaller than or equal to the number of signers ({}).", conf.shares_needed, conf.signers.len()).into()));
    }
    if let Some(telemetry) = &conf.telemetry {
        telemetry.validate().map_err(|e| {
            ValidationError::new("Telemetry Error").with_message(e.to_string().into())
        })?;
    }
    Ok(())
}

impl<'de> Deserialize<'de> for SdkConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize, Clone, Debug)]
        pub struct SdkConfigBuffer {
            pub relayer_url: String,
            pub chain_id: u64,
            pub gateway_chain_id: u64,
            pub acl_contract_address: String,
            pub verifying_contract_address_decryption: String,
            #[serde(default)]
            pub signers: Vec<SignerConf>,
            #[serde(default)]
            pub shares_needed: Option<usize>,
            #[serde(default = "default_decryption_timeout_secs")]
            pub decryption_timeout_secs: u64,
            #[serde(default = "default_verify_responses")]
            pub verify_responses: bool,
            #[serde(default)]
            pub telemetry: Option<TelemetryConfig>,
        }

        let temp = SdkConfigBuffer::deserialize(deserializer)?;

        let conf = SdkConfig {
            relayer_url: temp.relayer_url,
            chain_id: temp.chain_id,
            gateway_chain_id: temp.gateway_chain_id,
            acl_contract_address: temp.acl_contract_address,
            verifying_contract_address_decryption: temp.verifying_contract_address_decryption,
            // a single honest answer is enough by default
            shares_needed: temp.shares_needed.unwrap_or(1),
            signers: temp.signers,
            decryption_timeout_secs: temp.decryption_timeout_secs,
            verify_responses: temp.verify_responses,
            telemetry: temp.telemetry,
        };

        conf.validate().map_err(serde::de::Error::custom)?;

        Ok(conf)
    }
}

fn checked_address(field: &str, value: &str) -> Result<Address> {
    parse_address(value).ok_or_else(|| Error::Config(format!("{field} is not a valid address")))
}

impl SdkConfig {
    /// Loads the configuration from `path` (if any), the default locations and `RELAYER_SDK__*`
    /// environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let settings = match path {
            Some(path) => Settings::builder()
                .path(path)
                .env_prefix(CONFIG_ENV_PREFIX)
                .build(),
            None => Settings::builder().env_prefix(CONFIG_ENV_PREFIX).build(),
        };
        settings
            .init_conf()
            .map_err(|e| Error::Config(e.to_string()))
    }

    pub fn acl_contract_address(&self) -> Result<Address> {
        checked_address("acl_contract_address", &self.acl_contract_address)
    }

    pub fn verifying_contract_address_decryption(&self) -> Result<Address> {
        checked_address(
            "verifying_contract_address_decryption",
            &self.verifying_contract_address_decryption,
        )
    }

    pub fn decryption_timeout(&self) -> Duration {
        Duration::from_secs(self.decryption_timeout_secs)
    }

    /// The configured committee. Fails when no signer is configured.
    pub fn signer_set(&self) -> Result<SignerSet> {
        let parties = self
            .signers
            .iter()
            .map(|s| Ok((s.party_id, checked_address("signer address", &s.address)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        SignerSet::new(parties, self.shares_needed)
    }
}

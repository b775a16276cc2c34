//! EIP-712 typed data for decryption requests.
//!
//! A user decryption request is signed by the user's wallet (or by the account a user delegated
//! to) before it is sent to the relayer. The KMS signers recompute the same digest, so the
//! domain, the struct layout and the field encoding here must match the gateway contracts
//! exactly.
use crate::consts::{
    DECRYPTION_DOMAIN_NAME, DECRYPTION_DOMAIN_VERSION, MAX_USER_DECRYPT_CONTRACT_ADDRESSES,
    MAX_USER_DECRYPT_DURATION_DAYS, SECONDS_PER_DAY,
};
use crate::cryptography::signatures::recover_signer;
use crate::error::{Error, Result, ValidationError};
use crate::input::codec::parse_address;
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use relayer_wire::solidity_types::{delegated, EIP712UserDecryptRequest, PublicDecryptRequest};
use relayer_wire::Handle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub(crate) const ERR_INVALID_CONTRACT_ADDRESS: &str = "Invalid contract address.";
pub(crate) const ERR_INVALID_DELEGATED_ACCOUNT: &str = "Invalid delegated account.";
pub(crate) const ERR_REQUEST_NOT_STARTED: &str = "User decrypt request starts in the future.";
pub(crate) const ERR_REQUEST_EXPIRED: &str = "User decrypt request has expired.";

/// Domain of the `DecryptionManager` contract deployed at `verifying_contract` on the gateway
/// chain `chain_id`.
pub fn build_domain(chain_id: u64, verifying_contract: Address) -> Eip712Domain {
    Eip712Domain::new(
        Some(DECRYPTION_DOMAIN_NAME.into()),
        Some(DECRYPTION_DOMAIN_VERSION.into()),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    )
}

/// The struct a user signs. The delegated variant keeps the primary type name and the five
/// base fields and appends `delegatedAccount`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserDecryptMessage {
    Plain(EIP712UserDecryptRequest),
    Delegated(delegated::EIP712UserDecryptRequest),
}

/// A user decryption request ready to be signed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserDecryptRequest {
    domain: Eip712Domain,
    message: UserDecryptMessage,
}

/// Validates the addresses and assembles the request. Timing rules are checked separately by
/// [`UserDecryptRequest::validate`] since they depend on the current time.
#[allow(clippy::too_many_arguments)]
pub fn build_user_decrypt_request<S: AsRef<str>>(
    domain: Eip712Domain,
    public_key: &[u8],
    contract_addresses: &[S],
    contracts_chain_id: u64,
    start_timestamp: u64,
    duration_days: u64,
    delegated_account: Option<&str>,
) -> Result<UserDecryptRequest> {
    let contract_addresses = contract_addresses
        .iter()
        .map(|a| {
            parse_address(a.as_ref())
                .ok_or_else(|| ValidationError::Address(ERR_INVALID_CONTRACT_ADDRESS.to_string()))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let base = EIP712UserDecryptRequest::new(
        public_key.to_vec(),
        contract_addresses,
        contracts_chain_id,
        start_timestamp,
        duration_days,
    );
    let message = match delegated_account {
        None => UserDecryptMessage::Plain(base),
        Some(account) => {
            let account = parse_address(account).ok_or_else(|| {
                ValidationError::Address(ERR_INVALID_DELEGATED_ACCOUNT.to_string())
            })?;
            UserDecryptMessage::Delegated(base.with_delegation(account))
        }
    };
    Ok(UserDecryptRequest { domain, message })
}

impl UserDecryptRequest {
    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn message(&self) -> &UserDecryptMessage {
        &self.message
    }

    pub fn public_key(&self) -> &[u8] {
        match &self.message {
            UserDecryptMessage::Plain(m) => &m.publicKey,
            UserDecryptMessage::Delegated(m) => &m.publicKey,
        }
    }

    pub fn contract_addresses(&self) -> &[Address] {
        match &self.message {
            UserDecryptMessage::Plain(m) => &m.contractAddresses,
            UserDecryptMessage::Delegated(m) => &m.contractAddresses,
        }
    }

    fn uint_fields(&self) -> (U256, U256, U256) {
        match &self.message {
            UserDecryptMessage::Plain(m) => (m.contractsChainId, m.startTimestamp, m.durationDays),
            UserDecryptMessage::Delegated(m) => {
                (m.contractsChainId, m.startTimestamp, m.durationDays)
            }
        }
    }

    // the uint256 fields are only ever built from u64 values
    pub fn contracts_chain_id(&self) -> u64 {
        self.uint_fields().0.saturating_to()
    }

    pub fn start_timestamp(&self) -> u64 {
        self.uint_fields().1.saturating_to()
    }

    pub fn duration_days(&self) -> u64 {
        self.uint_fields().2.saturating_to()
    }

    pub fn delegated_account(&self) -> Option<Address> {
        match &self.message {
            UserDecryptMessage::Plain(_) => None,
            UserDecryptMessage::Delegated(m) => Some(m.delegatedAccount),
        }
    }

    pub fn struct_hash(&self) -> B256 {
        match &self.message {
            UserDecryptMessage::Plain(m) => m.eip712_hash_struct(),
            UserDecryptMessage::Delegated(m) => m.eip712_hash_struct(),
        }
    }

    /// The digest the wallet signs.
    pub fn signing_hash(&self) -> B256 {
        match &self.message {
            UserDecryptMessage::Plain(m) => m.eip712_signing_hash(&self.domain),
            UserDecryptMessage::Delegated(m) => m.eip712_signing_hash(&self.domain),
        }
    }

    /// Checks the limits the KMS enforces on user decryption requests, at time `now` (seconds
    /// since the epoch).
    pub fn validate(&self, now: u64) -> Result<()> {
        let duration_days = self.duration_days();
        if duration_days == 0 || duration_days > MAX_USER_DECRYPT_DURATION_DAYS {
            return Err(ValidationError::Range(format!(
                "durationDays must be between 1 and {MAX_USER_DECRYPT_DURATION_DAYS}, got {duration_days}."
            ))
            .into());
        }
        let count = self.contract_addresses().len();
        if count == 0 {
            return Err(
                ValidationError::Range("contractAddresses must not be empty.".to_string()).into(),
            );
        }
        if count > MAX_USER_DECRYPT_CONTRACT_ADDRESSES {
            return Err(ValidationError::Range(format!(
                "contractAddresses max length of {MAX_USER_DECRYPT_CONTRACT_ADDRESSES} exceeded, got {count}."
            ))
            .into());
        }
        let start = self.start_timestamp();
        if start > now {
            return Err(ValidationError::Range(ERR_REQUEST_NOT_STARTED.to_string()).into());
        }
        let end = start.saturating_add(duration_days.saturating_mul(SECONDS_PER_DAY));
        if end < now {
            return Err(ValidationError::Range(ERR_REQUEST_EXPIRED.to_string()).into());
        }
        Ok(())
    }

    /// Checks that `signature` over [`Self::signing_hash`] was produced by `expected`.
    pub fn verify_signature(&self, signature: &[u8], expected: &Address) -> Result<()> {
        let recovered = recover_signer(&self.signing_hash(), signature).map_err(|e| {
            ValidationError::Key(format!("cannot recover request signer: {e}"))
        })?;
        if recovered != *expected {
            return Err(ValidationError::Key(format!(
                "request signed by {recovered}, expected {expected}"
            ))
            .into());
        }
        Ok(())
    }

    /// JSON typed data as expected by `eth_signTypedData_v4`.
    pub fn typed_data(&self) -> TypedDataMessage {
        let (contracts_chain_id, start_timestamp, duration_days) = self.uint_fields();
        let mut message = Map::new();
        message.insert(
            "publicKey".to_string(),
            json!(format!("0x{}", hex::encode(self.public_key()))),
        );
        message.insert(
            "contractAddresses".to_string(),
            json!(self
                .contract_addresses()
                .iter()
                .map(|a| a.to_checksum(None))
                .collect::<Vec<_>>()),
        );
        message.insert(
            "contractsChainId".to_string(),
            json!(contracts_chain_id.to_string()),
        );
        message.insert(
            "startTimestamp".to_string(),
            json!(start_timestamp.to_string()),
        );
        message.insert("durationDays".to_string(), json!(duration_days.to_string()));
        if let Some(account) = self.delegated_account() {
            message.insert(
                "delegatedAccount".to_string(),
                json!(account.to_checksum(None)),
            );
        }
        let root_type = match &self.message {
            UserDecryptMessage::Plain(_) => EIP712UserDecryptRequest::eip712_root_type(),
            UserDecryptMessage::Delegated(_) => {
                delegated::EIP712UserDecryptRequest::eip712_root_type()
            }
        };
        TypedDataMessage::new(&self.domain, &root_type, message)
    }
}

/// A public decryption request. It is not signed by the caller, the digest only identifies the
/// request in the signer responses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicDecryptTypedRequest {
    domain: Eip712Domain,
    message: PublicDecryptRequest,
}

pub fn build_public_decrypt_request(
    domain: Eip712Domain,
    handles: &[Handle],
    extra_data: Vec<u8>,
) -> PublicDecryptTypedRequest {
    PublicDecryptTypedRequest {
        domain,
        message: PublicDecryptRequest::new(handles, extra_data),
    }
}

impl PublicDecryptTypedRequest {
    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn message(&self) -> &PublicDecryptRequest {
        &self.message
    }

    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }

    pub fn typed_data(&self) -> TypedDataMessage {
        let mut message = Map::new();
        message.insert(
            "ctHandles".to_string(),
            json!(self
                .message
                .ctHandles
                .iter()
                .map(|h| h.to_string())
                .collect::<Vec<_>>()),
        );
        message.insert(
            "extraData".to_string(),
            json!(self.message.extraData.to_string()),
        );
        TypedDataMessage::new(
            &self.domain,
            &PublicDecryptRequest::eip712_root_type(),
            message,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eip712Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedDataMessage {
    pub types: BTreeMap<String, Vec<Eip712Field>>,
    pub primary_type: String,
    pub domain: TypedDataDomain,
    pub message: Map<String, Value>,
}

impl TypedDataMessage {
    fn new(domain: &Eip712Domain, root_type: &str, message: Map<String, Value>) -> Self {
        let (primary_type, fields) = parse_root_type(root_type);
        let mut types = BTreeMap::new();
        types.insert(
            "EIP712Domain".to_string(),
            vec![
                field("name", "string"),
                field("version", "string"),
                field("chainId", "uint256"),
                field("verifyingContract", "address"),
            ],
        );
        types.insert(primary_type.clone(), fields);
        Self {
            types,
            primary_type,
            domain: TypedDataDomain {
                name: domain.name.as_deref().unwrap_or_default().to_string(),
                version: domain.version.as_deref().unwrap_or_default().to_string(),
                chain_id: domain.chain_id.unwrap_or_default().saturating_to(),
                verifying_contract: domain
                    .verifying_contract
                    .unwrap_or_default()
                    .to_checksum(None),
            },
            message,
        }
    }
}

fn field(name: &str, ty: &str) -> Eip712Field {
    Eip712Field {
        name: name.to_string(),
        ty: ty.to_string(),
    }
}

// "Name(type1 name1,type2 name2)" into the name and its fields
fn parse_root_type(root_type: &str) -> (String, Vec<Eip712Field>) {
    let (name, rest) = root_type.split_once('(').unwrap_or((root_type, ")"));
    let fields = rest
        .trim_end_matches(')')
        .split(',')
        .filter(|f| !f.is_empty())
        .filter_map(|f| f.split_once(' '))
        .map(|(ty, name)| field(name, ty))
        .collect();
    (name.to_string(), fields)
}

/// Parses the verifying contract of a domain given as a string.
pub fn parse_verifying_contract(address: &str) -> Result<Address> {
    parse_address(address).ok_or_else(|| {
        Error::Validation(ValidationError::Address(
            ERR_INVALID_CONTRACT_ADDRESS.to_string(),
        ))
    })
}

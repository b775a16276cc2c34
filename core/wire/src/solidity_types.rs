//! Solidity types used in EIP-712 signing and verification.
//! WARNING: any changes to these structures is a breaking change.

use alloy_primitives::{Address, Bytes, B256, U256};

use crate::Handle;

// Struct needs to match the gateway `DecryptionManager` contract; the name is part of the type
// hash the contract recomputes.
alloy_sol_types::sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct EIP712UserDecryptRequest {
        bytes publicKey;
        address[] contractAddresses;
        uint256 contractsChainId;
        uint256 startTimestamp;
        uint256 durationDays;
    }
}

/// Delegated variant of the user decryption request. Same primary type name, one extra
/// trailing field.
pub mod delegated {
    alloy_sol_types::sol! {
        #[derive(Debug, PartialEq, Eq)]
        struct EIP712UserDecryptRequest {
            bytes publicKey;
            address[] contractAddresses;
            uint256 contractsChainId;
            uint256 startTimestamp;
            uint256 durationDays;
            address delegatedAccount;
        }
    }
}

alloy_sol_types::sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct PublicDecryptRequest {
        bytes32[] ctHandles;
        bytes extraData;
    }
}

alloy_sol_types::sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct UserDecryptResponseVerification {
        bytes publicKey;
        bytes32[] ctHandles;
        bytes userDecryptedShare;
        bytes extraData;
    }
}

alloy_sol_types::sol! {
    #[derive(Debug, PartialEq, Eq)]
    struct PublicDecryptVerification {
        bytes32[] ctHandles;
        bytes decryptedResult;
        bytes extraData;
    }
}

fn handle_words(handles: &[Handle]) -> Vec<B256> {
    handles.iter().map(|h| B256::from(*h)).collect()
}

impl EIP712UserDecryptRequest {
    pub fn new(
        public_key: Vec<u8>,
        contract_addresses: Vec<Address>,
        contracts_chain_id: u64,
        start_timestamp: u64,
        duration_days: u64,
    ) -> Self {
        Self {
            publicKey: Bytes::from(public_key),
            contractAddresses: contract_addresses,
            contractsChainId: U256::from(contracts_chain_id),
            startTimestamp: U256::from(start_timestamp),
            durationDays: U256::from(duration_days),
        }
    }

    pub fn with_delegation(self, delegated_account: Address) -> delegated::EIP712UserDecryptRequest {
        delegated::EIP712UserDecryptRequest {
            publicKey: self.publicKey,
            contractAddresses: self.contractAddresses,
            contractsChainId: self.contractsChainId,
            startTimestamp: self.startTimestamp,
            durationDays: self.durationDays,
            delegatedAccount: delegated_account,
        }
    }
}

impl PublicDecryptRequest {
    pub fn new(handles: &[Handle], extra_data: Vec<u8>) -> Self {
        Self {
            ctHandles: handle_words(handles),
            extraData: extra_data.into(),
        }
    }
}

impl UserDecryptResponseVerification {
    pub fn new(
        public_key: Vec<u8>,
        handles: &[Handle],
        user_decrypted_share: Vec<u8>,
        extra_data: Vec<u8>,
    ) -> Self {
        Self {
            publicKey: public_key.into(),
            ctHandles: handle_words(handles),
            userDecryptedShare: user_decrypted_share.into(),
            extraData: extra_data.into(),
        }
    }
}

impl PublicDecryptVerification {
    pub fn new(handles: &[Handle], decrypted_result: Vec<u8>, extra_data: Vec<u8>) -> Self {
        Self {
            ctHandles: handle_words(handles),
            decryptedResult: decrypted_result.into(),
            extraData: extra_data.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::keccak256;
    use alloy_sol_types::SolStruct;

    #[test]
    fn user_decrypt_type_matches_gateway() {
        assert_eq!(
            EIP712UserDecryptRequest::eip712_encode_type(),
            "EIP712UserDecryptRequest(bytes publicKey,address[] contractAddresses,uint256 contractsChainId,uint256 startTimestamp,uint256 durationDays)"
        );
        assert_eq!(
            keccak256(EIP712UserDecryptRequest::eip712_encode_type().as_bytes()).to_string(),
            "0x0e00510175e72dedf518f1316a1bf0031fa5e2daf706fe5ded235ce3e6b15675"
        );
    }

    #[test]
    fn delegated_type_appends_one_field() {
        assert_eq!(
            delegated::EIP712UserDecryptRequest::eip712_encode_type(),
            "EIP712UserDecryptRequest(bytes publicKey,address[] contractAddresses,uint256 contractsChainId,uint256 startTimestamp,uint256 durationDays,address delegatedAccount)"
        );
    }

    #[test]
    fn public_decrypt_verification_type() {
        assert_eq!(
            PublicDecryptVerification::eip712_encode_type(),
            "PublicDecryptVerification(bytes32[] ctHandles,bytes decryptedResult,bytes extraData)"
        );
    }
}

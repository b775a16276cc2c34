use crate::consts::HANDLE_BYTES;
use crate::input::codec::FheKind;
use alloy_primitives::{keccak256, Address, U256};
use relayer_wire::identifiers::{
    HANDLE_CHAIN_ID_END, HANDLE_CHAIN_ID_START, HANDLE_INDEX_BYTE, HANDLE_TYPE_TAG_BYTE,
    HANDLE_VERSION_BYTE,
};
use relayer_wire::Handle;

/// Derives the handle of the value at `index` of a packed ciphertext list.
///
/// The digest binds the whole packed list, the position, the ACL contract and the chain. The
/// trailing bytes are then overwritten with plain metadata so contracts can read the type and
/// origin of a handle without a lookup.
pub fn compute_handle(
    ciphertext_with_proof: &[u8],
    index: u8,
    kind: FheKind,
    acl_contract_address: &Address,
    chain_id: u64,
    version: u8,
) -> Handle {
    compute_handle_from_blob(
        &keccak256(ciphertext_with_proof).0,
        index,
        kind,
        acl_contract_address,
        chain_id,
        version,
    )
}

/// Handles of every value of a bundle, in insertion order.
pub fn compute_handles(
    ciphertext_with_proof: &[u8],
    kinds: &[FheKind],
    acl_contract_address: &Address,
    chain_id: u64,
    version: u8,
) -> Vec<Handle> {
    let blob_hash = keccak256(ciphertext_with_proof).0;
    kinds
        .iter()
        .enumerate()
        .map(|(index, kind)| {
            // bundles are capped at 255 values before packing
            compute_handle_from_blob(
                &blob_hash,
                index as u8,
                *kind,
                acl_contract_address,
                chain_id,
                version,
            )
        })
        .collect()
}

/// Kind of the value a handle refers to, read from its type tag byte.
pub trait HandleKind {
    fn kind(&self) -> Option<FheKind>;
}

impl HandleKind for Handle {
    fn kind(&self) -> Option<FheKind> {
        FheKind::from_type_tag(self.type_tag())
    }
}

fn compute_handle_from_blob(
    blob_hash: &[u8; 32],
    index: u8,
    kind: FheKind,
    acl_contract_address: &Address,
    chain_id: u64,
    version: u8,
) -> Handle {
    let mut preimage = Vec::with_capacity(32 + 1 + 20 + 32);
    preimage.extend_from_slice(blob_hash);
    preimage.push(index);
    preimage.extend_from_slice(acl_contract_address.as_slice());
    preimage.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());

    let mut bytes: [u8; HANDLE_BYTES] = keccak256(&preimage).0;
    bytes[HANDLE_INDEX_BYTE] = index;
    bytes[HANDLE_CHAIN_ID_START..HANDLE_CHAIN_ID_END].copy_from_slice(&chain_id.to_be_bytes());
    bytes[HANDLE_TYPE_TAG_BYTE] = kind.type_tag();
    bytes[HANDLE_VERSION_BYTE] = version;
    Handle::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn acl() -> Address {
        Address::from_str("0x8ba1f109551bD432803012645Ac136ddd64DBA72").unwrap()
    }

    #[test]
    fn known_handles() {
        let handles = compute_handles(&[1, 2, 3], &[FheKind::Uint64, FheKind::Bool], &acl(), 9000, 0);
        assert_eq!(
            handles[0].to_relayer_hex(),
            "26d352bc6322dd12cd055b5f731650189b5280c18b0000000000000023280500"
        );
        assert_eq!(
            handles[1].to_relayer_hex(),
            "bdb36376dc8094379a8835cdcbe96742218c368d6d0100000000000023280000"
        );
        assert_eq!(handles[1].index(), 1);
        assert_eq!(handles[1].chain_id(), 9000);
        assert_eq!(handles[0].type_tag(), FheKind::Uint64.type_tag());
        assert_eq!(handles[0].kind(), Some(FheKind::Uint64));
        assert_eq!(handles[1].kind(), Some(FheKind::Bool));
    }

    #[test]
    fn single_and_batch_agree() {
        let batch = compute_handles(b"payload", &[FheKind::Uint8, FheKind::Address], &acl(), 1, 0);
        let single = compute_handle(b"payload", 1, FheKind::Address, &acl(), 1, 0);
        assert_eq!(batch[1], single);
    }

    #[test]
    fn every_input_changes_the_handle() {
        let base = compute_handle(b"payload", 0, FheKind::Uint8, &acl(), 1, 0);
        assert_eq!(base, compute_handle(b"payload", 0, FheKind::Uint8, &acl(), 1, 0));
        let variants = [
            compute_handle(b"payloae", 0, FheKind::Uint8, &acl(), 1, 0),
            compute_handle(b"payload", 1, FheKind::Uint8, &acl(), 1, 0),
            compute_handle(b"payload", 0, FheKind::Uint8, &Address::ZERO, 1, 0),
            compute_handle(b"payload", 0, FheKind::Uint8, &acl(), 2, 0),
            compute_handle(b"payload", 0, FheKind::Uint8, &acl(), 1, 1),
            compute_handle(b"payload", 0, FheKind::Uint16, &acl(), 1, 0),
        ];
        for variant in variants {
            assert_ne!(base, variant);
        }
    }
}

//! [`InputPacker`] backed by tfhe-rs: the bundle is encrypted under the network's compact public
//! key and proven against its CRS.
use crate::anyhow_error_and_log;
use crate::consts::SAFE_SER_SIZE_LIMIT;
use crate::cryptography::backend::{InputPacker, PackContext, ProofPayload};
use crate::input::codec::{ClearValue, FheKind, TypedValue};
use tfhe::integer::bigint::StaticUnsignedBigInt;
use tfhe::safe_serialization::{safe_deserialize, safe_serialize};
use tfhe::zk::{CompactPkeCrs, ZkComputeLoad};
use tfhe::{CompactPublicKey, ProvenCompactCiphertextList};

pub struct TfhePacker {
    public_key: CompactPublicKey,
    crs: CompactPkeCrs,
}

impl TfhePacker {
    pub fn new(public_key: CompactPublicKey, crs: CompactPkeCrs) -> Self {
        Self { public_key, crs }
    }

    /// Loads the key and the CRS from their safe serialization, as published by the KMS.
    pub fn from_bytes(public_key: &[u8], crs: &[u8]) -> anyhow::Result<Self> {
        let public_key: CompactPublicKey =
            safe_deserialize(std::io::Cursor::new(public_key), SAFE_SER_SIZE_LIMIT)
                .map_err(|e| anyhow_error_and_log(format!("invalid compact public key: {e}")))?;
        let crs: CompactPkeCrs = safe_deserialize(std::io::Cursor::new(crs), SAFE_SER_SIZE_LIMIT)
            .map_err(|e| anyhow_error_and_log(format!("invalid CRS: {e}")))?;
        Ok(Self::new(public_key, crs))
    }
}

/// Left pads a big-endian encoding to the width of a `N`-limb integer.
fn to_big_uint<const N: usize>(encoded: &[u8]) -> anyhow::Result<StaticUnsignedBigInt<N>> {
    let width = N * 8;
    if encoded.len() > width {
        anyhow::bail!("{} bytes do not fit in {width} bytes", encoded.len());
    }
    let mut padded = vec![0u8; width];
    padded[width - encoded.len()..].copy_from_slice(encoded);
    let mut value = StaticUnsignedBigInt::<N>::default();
    value.copy_from_be_byte_slice(&padded);
    Ok(value)
}

fn small_uint(value: &TypedValue) -> anyhow::Result<u128> {
    match value.value() {
        ClearValue::Uint(v) => u128::try_from(v)
            .map_err(|_| anyhow::anyhow!("{v} does not fit in {}", value.kind())),
        other => anyhow::bail!("expected an integer for {}, got {other:?}", value.kind()),
    }
}

impl InputPacker for TfhePacker {
    fn pack(&self, values: &[TypedValue], context: &PackContext) -> anyhow::Result<ProofPayload> {
        let mut builder = ProvenCompactCiphertextList::builder(&self.public_key);
        for value in values {
            let bits = value.kind().bits() as usize;
            match value.kind() {
                FheKind::Bool => {
                    builder.push(value.encoded().first().copied().unwrap_or(0) == 1);
                }
                FheKind::Uint4
                | FheKind::Uint8
                | FheKind::Uint16
                | FheKind::Uint32
                | FheKind::Uint64
                | FheKind::Uint128 => {
                    builder.push_with_num_bits(small_uint(value)?, bits)?;
                }
                FheKind::Address | FheKind::Uint256 => {
                    builder.push_with_num_bits(to_big_uint::<4>(value.encoded())?, bits)?;
                }
                FheKind::Bytes64 => {
                    builder.push_with_num_bits(to_big_uint::<8>(value.encoded())?, bits)?;
                }
                FheKind::Bytes128 => {
                    builder.push_with_num_bits(to_big_uint::<16>(value.encoded())?, bits)?;
                }
                FheKind::Bytes256 => {
                    builder.push_with_num_bits(to_big_uint::<32>(value.encoded())?, bits)?;
                }
            }
        }
        let proven = builder.build_with_proof_packed(
            &self.crs,
            &context.zk_metadata(),
            ZkComputeLoad::Proof,
        )?;
        let mut out = Vec::new();
        safe_serialize(&proven, &mut out, SAFE_SER_SIZE_LIMIT)
            .map_err(|e| anyhow_error_and_log(format!("cannot serialize the proven list: {e}")))?;
        Ok(ProofPayload::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_uint_padding() {
        let value = to_big_uint::<4>(&[0x12, 0x34]).unwrap();
        let mut expected = StaticUnsignedBigInt::<4>::default();
        let mut bytes = [0u8; 32];
        bytes[30] = 0x12;
        bytes[31] = 0x34;
        expected.copy_from_be_byte_slice(&bytes);
        assert_eq!(value, expected);
        assert!(to_big_uint::<4>(&[1; 33]).is_err());
    }

    #[test]
    fn small_uint_rejects_non_integers() {
        let value = TypedValue::new(FheKind::Uint64, &ClearValue::from(77u64)).unwrap();
        assert_eq!(small_uint(&value).unwrap(), 77);
        let value = TypedValue::new(FheKind::Bool, &ClearValue::Bool(true)).unwrap();
        assert!(small_uint(&value).is_err());
    }
}

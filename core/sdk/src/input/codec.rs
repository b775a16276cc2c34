use crate::error::ValidationError;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

pub(crate) const ERR_NOT_NUMERIC: &str = "The value must be a number or a bigint.";
pub(crate) const ERR_NOT_BOOLEAN: &str = "The value must be a boolean, a number or a bigint.";
pub(crate) const ERR_NOT_BIT: &str = "The value must be 1 or 0.";
pub(crate) const ERR_NOT_ADDRESS: &str = "The value must be a valid address.";
pub(crate) const ERR_NOT_BYTES: &str = "The value must be a byte array.";

/// Encrypted value kinds supported by the input packer.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, EnumString, EnumIter, Display, Serialize, Deserialize,
)]
pub enum FheKind {
    #[strum(serialize = "ebool")]
    Bool,
    #[strum(serialize = "euint4")]
    Uint4,
    #[strum(serialize = "euint8")]
    Uint8,
    #[strum(serialize = "euint16")]
    Uint16,
    #[strum(serialize = "euint32")]
    Uint32,
    #[strum(serialize = "euint64")]
    Uint64,
    #[strum(serialize = "euint128")]
    Uint128,
    #[strum(serialize = "eaddress")]
    Address,
    #[strum(serialize = "euint256")]
    Uint256,
    #[strum(serialize = "ebytes64")]
    Bytes64,
    #[strum(serialize = "ebytes128")]
    Bytes128,
    #[strum(serialize = "ebytes256")]
    Bytes256,
}

impl FheKind {
    /// Plaintext width of the kind.
    pub fn bits(&self) -> u32 {
        match self {
            FheKind::Bool => 1,
            FheKind::Uint4 => 4,
            FheKind::Uint8 => 8,
            FheKind::Uint16 => 16,
            FheKind::Uint32 => 32,
            FheKind::Uint64 => 64,
            FheKind::Uint128 => 128,
            FheKind::Address => 160,
            FheKind::Uint256 => 256,
            FheKind::Bytes64 => 512,
            FheKind::Bytes128 => 1024,
            FheKind::Bytes256 => 2048,
        }
    }

    /// Width charged against the bundle budget. Booleans occupy two bits once packed.
    pub fn budget_bits(&self) -> u32 {
        match self {
            FheKind::Bool => 2,
            other => other.bits(),
        }
    }

    /// Tag stored in byte 30 of a handle.
    pub fn type_tag(&self) -> u8 {
        match self {
            FheKind::Bool => 0,
            FheKind::Uint4 => 1,
            FheKind::Uint8 => 2,
            FheKind::Uint16 => 3,
            FheKind::Uint32 => 4,
            FheKind::Uint64 => 5,
            FheKind::Uint128 => 6,
            FheKind::Address => 7,
            FheKind::Uint256 => 8,
            FheKind::Bytes64 => 9,
            FheKind::Bytes128 => 10,
            FheKind::Bytes256 => 11,
        }
    }

    pub fn from_type_tag(tag: u8) -> Option<Self> {
        let kind = match tag {
            0 => FheKind::Bool,
            1 => FheKind::Uint4,
            2 => FheKind::Uint8,
            3 => FheKind::Uint16,
            4 => FheKind::Uint32,
            5 => FheKind::Uint64,
            6 => FheKind::Uint128,
            7 => FheKind::Address,
            8 => FheKind::Uint256,
            9 => FheKind::Bytes64,
            10 => FheKind::Bytes128,
            11 => FheKind::Bytes256,
            _ => return None,
        };
        Some(kind)
    }

    /// Length of the canonical big-endian encoding.
    pub fn byte_len(&self) -> usize {
        (self.bits() as usize).div_ceil(8)
    }

    pub fn is_bytes(&self) -> bool {
        matches!(
            self,
            FheKind::Bytes64 | FheKind::Bytes128 | FheKind::Bytes256
        )
    }
}

/// A plaintext as supplied by the application or returned by a decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClearValue {
    Bool(bool),
    Uint(U256),
    Bytes(Vec<u8>),
    /// `0x`-prefixed hex; checksummed when produced by [`decode`].
    Address(String),
}

impl From<bool> for ClearValue {
    fn from(value: bool) -> Self {
        ClearValue::Bool(value)
    }
}

impl From<u64> for ClearValue {
    fn from(value: u64) -> Self {
        ClearValue::Uint(U256::from(value))
    }
}

impl From<u128> for ClearValue {
    fn from(value: u128) -> Self {
        ClearValue::Uint(U256::from(value))
    }
}

impl From<U256> for ClearValue {
    fn from(value: U256) -> Self {
        ClearValue::Uint(value)
    }
}

impl From<Vec<u8>> for ClearValue {
    fn from(value: Vec<u8>) -> Self {
        ClearValue::Bytes(value)
    }
}

/// Parses a `0x`-prefixed 20-byte address. Mixed-case input must carry a valid EIP-55 checksum,
/// all-lowercase and all-uppercase input is accepted as is.
pub fn parse_address(s: &str) -> Option<Address> {
    let body = s.strip_prefix("0x")?;
    if body.len() != 2 * crate::consts::ADDRESS_BYTES
        || !body.chars().all(|c| c.is_ascii_hexdigit())
    {
        return None;
    }
    let has_lower = body.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = body.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(s, None).ok()
    } else {
        Address::from_str(body).ok()
    }
}

fn uint_limit(bits: u32) -> Option<U256> {
    if bits >= 256 {
        None
    } else {
        Some(U256::from(1u8) << bits as usize)
    }
}

/// Canonical fixed-length big-endian encoding of `value` as `kind`.
pub fn encode(kind: FheKind, value: &ClearValue) -> Result<Vec<u8>, ValidationError> {
    match kind {
        FheKind::Bool => match value {
            ClearValue::Bool(b) => Ok(vec![*b as u8]),
            ClearValue::Uint(v) if *v <= U256::from(1u8) => Ok(vec![v.to::<u8>()]),
            ClearValue::Uint(_) => Err(ValidationError::Range(ERR_NOT_BIT.to_string())),
            _ => Err(ValidationError::Type(ERR_NOT_BOOLEAN.to_string())),
        },
        FheKind::Address => match value {
            ClearValue::Address(s) => parse_address(s)
                .map(|a| a.to_vec())
                .ok_or_else(|| ValidationError::Address(ERR_NOT_ADDRESS.to_string())),
            _ => Err(ValidationError::Type(ERR_NOT_ADDRESS.to_string())),
        },
        FheKind::Bytes64 | FheKind::Bytes128 | FheKind::Bytes256 => match value {
            ClearValue::Bytes(bytes) if bytes.len() == kind.byte_len() => Ok(bytes.clone()),
            ClearValue::Bytes(bytes) => Err(ValidationError::Type(format!(
                "The value must be a byte array of exactly {} bytes, got {}.",
                kind.byte_len(),
                bytes.len()
            ))),
            _ => Err(ValidationError::Type(ERR_NOT_BYTES.to_string())),
        },
        _ => match value {
            ClearValue::Uint(v) => {
                let bits = kind.bits();
                if let Some(limit) = uint_limit(bits) {
                    if *v >= limit {
                        return Err(ValidationError::Range(format!(
                            "The value exceeds the limit for {bits}bits integer ({}).",
                            limit - U256::from(1u8)
                        )));
                    }
                }
                let full = v.to_be_bytes::<32>();
                Ok(full[32 - kind.byte_len()..].to_vec())
            }
            _ => Err(ValidationError::Type(ERR_NOT_NUMERIC.to_string())),
        },
    }
}

/// Inverse of [`encode`].
pub fn decode(kind: FheKind, bytes: &[u8]) -> Result<ClearValue, ValidationError> {
    if bytes.len() != kind.byte_len() {
        return Err(ValidationError::Type(format!(
            "expected {} bytes for {kind}, got {}",
            kind.byte_len(),
            bytes.len()
        )));
    }
    let value = match kind {
        FheKind::Bool => match bytes[0] {
            0 => ClearValue::Bool(false),
            1 => ClearValue::Bool(true),
            _ => return Err(ValidationError::Range(ERR_NOT_BIT.to_string())),
        },
        FheKind::Address => ClearValue::Address(Address::from_slice(bytes).to_checksum(None)),
        FheKind::Bytes64 | FheKind::Bytes128 | FheKind::Bytes256 => {
            ClearValue::Bytes(bytes.to_vec())
        }
        _ => {
            let value = U256::from_be_slice(bytes);
            if uint_limit(kind.bits()).is_some_and(|limit| value >= limit) {
                return Err(ValidationError::Range(format!(
                    "value does not fit in {} bits",
                    kind.bits()
                )));
            }
            ClearValue::Uint(value)
        }
    };
    Ok(value)
}

/// A range-checked value together with its kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypedValue {
    kind: FheKind,
    encoded: Vec<u8>,
}

impl TypedValue {
    pub fn new(kind: FheKind, value: &ClearValue) -> Result<Self, ValidationError> {
        let encoded = encode(kind, value)?;
        Ok(Self { kind, encoded })
    }

    pub fn kind(&self) -> FheKind {
        self.kind
    }

    /// Canonical big-endian bytes.
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn value(&self) -> ClearValue {
        // the encoding was produced by `encode` for the same kind
        decode(self.kind, &self.encoded).unwrap_or_else(|_| ClearValue::Bytes(self.encoded.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn tags_round_trip() {
        for kind in FheKind::iter() {
            assert_eq!(FheKind::from_type_tag(kind.type_tag()), Some(kind));
        }
        assert_eq!(FheKind::from_type_tag(12), None);
        assert_eq!(FheKind::Address.type_tag(), 7);
        assert_eq!(FheKind::Uint256.type_tag(), 8);
    }

    #[test]
    fn uint_round_trip_at_max() {
        for kind in FheKind::iter().filter(|k| {
            !k.is_bytes() && !matches!(k, FheKind::Bool | FheKind::Address)
        }) {
            let max = match uint_limit(kind.bits()) {
                Some(limit) => limit - U256::from(1u8),
                None => U256::MAX,
            };
            let encoded = encode(kind, &ClearValue::Uint(max)).unwrap();
            assert_eq!(encoded.len(), kind.byte_len());
            assert_eq!(decode(kind, &encoded).unwrap(), ClearValue::Uint(max));
        }
    }

    #[test]
    fn exact_power_of_two_is_out_of_range() {
        for kind in [
            FheKind::Uint4,
            FheKind::Uint8,
            FheKind::Uint16,
            FheKind::Uint32,
            FheKind::Uint64,
            FheKind::Uint128,
        ] {
            let limit = U256::from(1u8) << kind.bits() as usize;
            let err = encode(kind, &ClearValue::Uint(limit)).unwrap_err();
            assert!(matches!(err, ValidationError::Range(_)), "{kind}");
        }
        let err = encode(FheKind::Uint4, &ClearValue::from(16u64)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "range error: The value exceeds the limit for 4bits integer (15)."
        );
    }

    #[test]
    fn booleans() {
        assert_eq!(encode(FheKind::Bool, &true.into()).unwrap(), vec![1]);
        assert_eq!(encode(FheKind::Bool, &ClearValue::from(0u64)).unwrap(), vec![0]);
        let err = encode(FheKind::Bool, &ClearValue::from(2u64)).unwrap_err();
        assert!(err.to_string().contains(ERR_NOT_BIT));
        let err = encode(FheKind::Bool, &ClearValue::Bytes(vec![1])).unwrap_err();
        assert!(matches!(err, ValidationError::Type(_)));
        assert_eq!(decode(FheKind::Bool, &[1]).unwrap(), ClearValue::Bool(true));
        assert!(decode(FheKind::Bool, &[2]).is_err());
    }

    #[test]
    fn numeric_kinds_reject_other_shapes() {
        let err = encode(FheKind::Uint8, &ClearValue::Bool(true)).unwrap_err();
        assert!(err.to_string().contains(ERR_NOT_NUMERIC));
    }

    #[test]
    fn addresses() {
        let checksummed = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";
        let lower = checksummed.to_lowercase();
        let encoded = encode(FheKind::Address, &ClearValue::Address(lower)).unwrap();
        assert_eq!(encoded.len(), 20);
        assert_eq!(
            decode(FheKind::Address, &encoded).unwrap(),
            ClearValue::Address(checksummed.to_string())
        );

        // broken checksum
        let bad = "0x8ba1f109551bd432803012645Ac136ddd64DBA72";
        let err = encode(FheKind::Address, &ClearValue::Address(bad.to_string())).unwrap_err();
        assert!(matches!(err, ValidationError::Address(_)));
        for bad in ["99", "8ba1f109551bd432803012645ac136ddd64dba72", "0x1234"] {
            assert!(parse_address(bad).is_none(), "{bad}");
        }
    }

    #[test]
    fn byte_kinds_need_exact_length() {
        let ok = encode(FheKind::Bytes64, &ClearValue::Bytes(vec![7; 64])).unwrap();
        assert_eq!(ok, vec![7; 64]);
        assert!(encode(FheKind::Bytes64, &ClearValue::Bytes(vec![7; 63])).is_err());
        assert!(encode(FheKind::Bytes128, &ClearValue::Bytes(vec![7; 64])).is_err());
        assert!(encode(FheKind::Bytes256, &ClearValue::Uint(U256::ZERO)).is_err());
        assert_eq!(
            decode(FheKind::Bytes256, &[9; 256]).unwrap(),
            ClearValue::Bytes(vec![9; 256])
        );
    }

    #[test]
    fn typed_value_keeps_canonical_bytes() {
        let v = TypedValue::new(FheKind::Uint16, &ClearValue::from(0x1234u64)).unwrap();
        assert_eq!(v.encoded(), &[0x12, 0x34]);
        assert_eq!(v.value(), ClearValue::from(0x1234u64));
        assert_eq!(v.kind().budget_bits(), 16);
        assert_eq!(FheKind::Bool.budget_bits(), 2);
    }
}

use crate::consts::{HANDLE_BYTES, SIGNATURE_BYTES};
use crate::error::{Error, Result, ValidationError};
use relayer_wire::Handle;

/// Proof bytes handed to the contract together with the handles.
///
/// Layout: `num_handles (1) || num_signers (1) || handles (32 each) || signatures (65 each)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputProof {
    handles: Vec<Handle>,
    signatures: Vec<[u8; SIGNATURE_BYTES]>,
}

impl InputProof {
    pub fn new(handles: Vec<Handle>, signatures: Vec<[u8; SIGNATURE_BYTES]>) -> Result<Self> {
        if handles.len() > u8::MAX as usize || signatures.len() > u8::MAX as usize {
            return Err(Error::Validation(ValidationError::Range(format!(
                "input proof cannot hold {} handles and {} signatures",
                handles.len(),
                signatures.len()
            ))));
        }
        Ok(Self {
            handles,
            signatures,
        })
    }

    /// Builds the proof from relayer-formatted signatures (`0x`-prefixed or bare hex).
    pub fn from_hex_signatures(handles: Vec<Handle>, signatures: &[String]) -> Result<Self> {
        let signatures = signatures
            .iter()
            .map(|s| parse_signature(s))
            .collect::<Result<Vec<_>>>()?;
        Self::new(handles, signatures)
    }

    pub fn handles(&self) -> &[Handle] {
        &self.handles
    }

    pub fn signatures(&self) -> &[[u8; SIGNATURE_BYTES]] {
        &self.signatures
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            2 + self.handles.len() * HANDLE_BYTES + self.signatures.len() * SIGNATURE_BYTES,
        );
        out.push(self.handles.len() as u8);
        out.push(self.signatures.len() as u8);
        for handle in &self.handles {
            out.extend_from_slice(handle.as_bytes());
        }
        for signature in &self.signatures {
            out.extend_from_slice(signature);
        }
        out
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parses and validates the layout. Trailing bytes are rejected.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let malformed = |msg: String| Error::Validation(ValidationError::Type(msg));
        if bytes.len() < 2 {
            return Err(malformed(format!(
                "input proof too short: {} bytes",
                bytes.len()
            )));
        }
        let num_handles = bytes[0] as usize;
        let num_signers = bytes[1] as usize;
        let expected = 2 + num_handles * HANDLE_BYTES + num_signers * SIGNATURE_BYTES;
        if bytes.len() != expected {
            return Err(malformed(format!(
                "input proof declares {num_handles} handles and {num_signers} signatures, expected {expected} bytes but got {}",
                bytes.len()
            )));
        }
        let (handle_bytes, signature_bytes) = bytes[2..].split_at(num_handles * HANDLE_BYTES);
        let handles = handle_bytes
            .chunks_exact(HANDLE_BYTES)
            .map(Handle::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let signatures = signature_bytes
            .chunks_exact(SIGNATURE_BYTES)
            .map(|chunk| {
                let mut sig = [0u8; SIGNATURE_BYTES];
                sig.copy_from_slice(chunk);
                sig
            })
            .collect();
        Ok(Self {
            handles,
            signatures,
        })
    }
}

pub(crate) fn parse_signature(s: &str) -> Result<[u8; SIGNATURE_BYTES]> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(stripped).map_err(|e| {
        Error::Validation(ValidationError::Type(format!(
            "signature is not valid hex: {e}"
        )))
    })?;
    bytes.as_slice().try_into().map_err(|_| {
        Error::Validation(ValidationError::Type(format!(
            "signature must be {SIGNATURE_BYTES} bytes, got {}",
            bytes.len()
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let handles = vec![
            Handle::from_bytes([0xaa; HANDLE_BYTES]),
            Handle::from_bytes([0xbb; HANDLE_BYTES]),
        ];
        let sig = format!("0x{}", "cc".repeat(SIGNATURE_BYTES));
        let proof = InputProof::from_hex_signatures(handles.clone(), &[sig]).unwrap();
        let bytes = proof.to_bytes();
        assert_eq!(bytes.len(), 2 + 2 * 32 + 65);
        assert_eq!(bytes[0], 2);
        assert_eq!(bytes[1], 1);
        assert_eq!(&bytes[2..34], &[0xaa; 32]);
        assert_eq!(&bytes[66..], &[0xcc; 65]);
        assert_eq!(InputProof::parse(&bytes).unwrap(), proof);
        assert!(proof.to_hex().starts_with("0x0201aaaa"));
    }

    #[test]
    fn empty_proof() {
        let proof = InputProof::new(vec![], vec![]).unwrap();
        assert_eq!(proof.to_bytes(), vec![0, 0]);
    }

    #[test]
    fn rejects_bad_layouts() {
        assert!(InputProof::parse(&[1]).is_err());
        // declares one handle but carries none
        assert!(InputProof::parse(&[1, 0]).is_err());
        let mut bytes = vec![0, 1];
        bytes.extend_from_slice(&[0; 64]);
        assert!(InputProof::parse(&bytes).is_err());
    }

    #[test]
    fn rejects_short_signatures() {
        let err = InputProof::from_hex_signatures(vec![], &["0x1234".to_string()]).unwrap_err();
        assert!(err.to_string().contains("must be 65 bytes"));
    }
}

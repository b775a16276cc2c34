//! Fake collaborators for tests. They record their calls so tests can assert that nothing
//! reached the network or the crypto backend.
use crate::client::threshold::{SignerResponse, SignerSet};
use crate::consts::CIPHERTEXT_VERSION;
use crate::cryptography::backend::{
    InputPacker, PackContext, ProofPayload, ShareCombiner, SignatureVerifier,
};
use crate::input::codec::{ClearValue, FheKind, TypedValue};
use crate::input::handles::compute_handles;
use crate::transport::{Transport, TransportResponse};
use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use relayer_wire::Handle;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const FAKE_PAYLOAD_MAGIC: &[u8; 4] = b"FAKE";
const ZK_METADATA_LEN: usize = 92;

/// Packer that "encrypts" by concatenation:
/// `FAKE || zk metadata || count || type tags || encoded values`.
#[derive(Debug, Default)]
pub struct FakePacker {
    fail: bool,
    calls: AtomicUsize,
}

impl FakePacker {
    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Kinds of the values in a payload produced by this packer.
    pub fn decode_kinds(payload: &[u8]) -> Option<Vec<FheKind>> {
        let rest = payload.strip_prefix(FAKE_PAYLOAD_MAGIC.as_slice())?;
        let rest = rest.get(ZK_METADATA_LEN..)?;
        let (count, rest) = rest.split_first()?;
        rest.get(..*count as usize)?
            .iter()
            .map(|tag| FheKind::from_type_tag(*tag))
            .collect()
    }
}

impl InputPacker for FakePacker {
    fn pack(&self, values: &[TypedValue], context: &PackContext) -> anyhow::Result<ProofPayload> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("fake packer failure");
        }
        let mut out = FAKE_PAYLOAD_MAGIC.to_vec();
        out.extend(context.zk_metadata());
        out.push(values.len() as u8);
        out.extend(values.iter().map(|v| v.kind().type_tag()));
        for value in values {
            out.extend_from_slice(value.encoded());
        }
        Ok(ProofPayload::new(out))
    }
}

type Responder = dyn Fn(&str, &Value) -> anyhow::Result<TransportResponse> + Send + Sync;

/// Transport answering from a closure and recording every `(url, body)` it was given.
pub struct FakeTransport {
    responder: Box<Responder>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl FakeTransport {
    pub fn new(
        responder: impl Fn(&str, &Value) -> anyhow::Result<TransportResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::new(move |_, _| {
            Ok(TransportResponse {
                status,
                body: body.clone(),
            })
        })
    }

    pub fn with_json(status: u16, body: Value) -> Self {
        Self::with_reply(status, &body.to_string())
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_, _| Err(anyhow::anyhow!(message.clone())))
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn post_json(&self, url: &str, body: &Value) -> anyhow::Result<TransportResponse> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((url.to_string(), body.clone()));
        }
        (self.responder)(url, body)
    }
}

/// Relayer input-proof endpoint in front of a [`FakePacker`]: echoes the handles of the posted
/// ciphertext and attaches `num_signers` dummy coprocessor signatures.
pub fn input_proof_responder(
    acl_contract_address: Address,
    chain_id: u64,
    num_signers: usize,
) -> impl Fn(&str, &Value) -> anyhow::Result<TransportResponse> + Send + Sync + 'static {
    move |_, body| {
        let ciphertext = body["ciphertextWithZkpok"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing ciphertextWithZkpok"))?;
        let ciphertext = hex::decode(ciphertext)?;
        let kinds = FakePacker::decode_kinds(&ciphertext)
            .ok_or_else(|| anyhow::anyhow!("not a fake payload"))?;
        let handles: Vec<String> = compute_handles(
            &ciphertext,
            &kinds,
            &acl_contract_address,
            chain_id,
            CIPHERTEXT_VERSION,
        )
        .iter()
        .map(Handle::to_relayer_hex)
        .collect();
        let signatures: Vec<String> = (0..num_signers)
            .map(|i| format!("0x{}", hex::encode([i as u8 + 1; 65])))
            .collect();
        Ok(TransportResponse {
            status: 200,
            body: json!({
                "status": "success",
                "response": {"handles": handles, "signatures": signatures}
            })
            .to_string(),
        })
    }
}

/// Verifier with a fixed answer.
#[derive(Debug)]
pub struct FixedVerifier(bool);

impl FixedVerifier {
    pub fn accepting() -> Self {
        Self(true)
    }

    pub fn rejecting() -> Self {
        Self(false)
    }
}

impl SignatureVerifier for FixedVerifier {
    fn verify(&self, _: &Address, _: &[u8], _: &[u8], _: &[u8]) -> anyhow::Result<bool> {
        Ok(self.0)
    }
}

/// Combiner returning fixed values, remembering how many responses it was given each time.
#[derive(Debug, Default)]
pub struct FakeCombiner {
    values: Option<Vec<ClearValue>>,
    seen: Mutex<Vec<usize>>,
}

impl FakeCombiner {
    pub fn returning(values: Vec<ClearValue>) -> Self {
        Self {
            values: Some(values),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn seen_counts(&self) -> Vec<usize> {
        self.seen
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

impl ShareCombiner for FakeCombiner {
    fn combine(
        &self,
        _handles: &[Handle],
        responses: &[SignerResponse],
    ) -> anyhow::Result<Vec<ClearValue>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(responses.len());
        }
        self.values
            .clone()
            .ok_or_else(|| anyhow::anyhow!("fake combiner failure"))
    }
}

/// `n` random signer keys with party ids `1..=n`.
pub fn random_committee(n: usize, shares_needed: usize) -> (Vec<PrivateKeySigner>, SignerSet) {
    let keys: Vec<_> = (0..n).map(|_| PrivateKeySigner::random()).collect();
    let parties: HashMap<u32, Address> = keys
        .iter()
        .enumerate()
        .map(|(i, k)| (i as u32 + 1, k.address()))
        .collect();
    let set = SignerSet::new(parties, shares_needed).expect("invalid committee size");
    (keys, set)
}


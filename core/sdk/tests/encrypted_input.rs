use alloy_primitives::{Address, U256};
use observability::telemetry::init_testing;
use relayer_sdk::conf::SdkConfig;
use relayer_sdk::input::handles::HandleKind;
use relayer_sdk::input::proof::InputProof;
use relayer_sdk::testing::{input_proof_responder, FakeCombiner, FakePacker, FakeTransport};
use relayer_sdk::{Capabilities, Error, FheKind, RelayerInstance};
use serde_json::json;
use std::sync::Arc;

const ACL: &str = "0x8ba1f109551bD432803012645Ac136ddd64DBA72";
const CONTRACT: &str = "0x8Fdb26641d14a80FCCBE87BF455338Dd9C539a50";
const USER: &str = "0xa5e1defb98EFe38EBb2D958CEe052410247F4c80";
const CHAIN_ID: u64 = 12345;

fn config() -> SdkConfig {
    init_testing();
    serde_json::from_value(json!({
        "relayer_url": "https://relayer.test",
        "chain_id": CHAIN_ID,
        "gateway_chain_id": 54321,
        "acl_contract_address": ACL,
        "verifying_contract_address_decryption": "0x857Ca72A957920Fa0FB138602995839866Bd4005",
    }))
    .unwrap()
}

fn instance(packer: Arc<FakePacker>, transport: Arc<FakeTransport>) -> RelayerInstance {
    let capabilities = Capabilities::builder()
        .packer(packer)
        .combiner(Arc::new(FakeCombiner::failing()))
        .transport(transport)
        .build();
    RelayerInstance::new(config(), capabilities).unwrap()
}

fn acl() -> Address {
    ACL.parse().unwrap()
}

#[tokio::test]
async fn mixed_bundle_is_attested_and_bound_to_the_chain() {
    let packer = Arc::new(FakePacker::default());
    let transport = Arc::new(FakeTransport::new(input_proof_responder(acl(), CHAIN_ID, 2)));
    let instance = instance(packer.clone(), transport.clone());

    let mut input = instance.create_encrypted_input(CONTRACT, USER).unwrap();
    input
        .add_bool(true)
        .unwrap()
        .add_u8(200)
        .unwrap()
        .add_u256(U256::MAX)
        .unwrap()
        .add_address(USER)
        .unwrap()
        .add_bytes64(&[7; 64])
        .unwrap();
    assert_eq!(input.total_bits(), 2 + 8 + 256 + 160 + 512);

    let encrypted = input.finalize().await.unwrap();
    assert_eq!(packer.calls(), 1);
    assert_eq!(encrypted.handles.len(), 5);
    let kinds: Vec<_> = encrypted.handles.iter().map(|h| h.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            Some(FheKind::Bool),
            Some(FheKind::Uint8),
            Some(FheKind::Uint256),
            Some(FheKind::Address),
            Some(FheKind::Bytes64),
        ]
    );
    for (i, handle) in encrypted.handles.iter().enumerate() {
        assert_eq!(handle.index() as usize, i);
        assert_eq!(handle.chain_id(), CHAIN_ID);
    }

    let proof_bytes = encrypted.input_proof.to_bytes();
    let parsed = InputProof::parse(&proof_bytes).unwrap();
    assert_eq!(parsed, encrypted.input_proof);
    assert_eq!(parsed.signatures().len(), 2);

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "https://relayer.test/v1/input-proof");
    assert_eq!(calls[0].1["contractChainId"], format!("0x{CHAIN_ID:x}"));
    assert_eq!(calls[0].1["userAddress"], USER);
}

#[tokio::test]
async fn relayer_with_different_handles_is_rejected() {
    // the relayer derives handles for another chain
    let transport = Arc::new(FakeTransport::new(input_proof_responder(acl(), 1, 1)));
    let instance = instance(Arc::new(FakePacker::default()), transport);
    let mut input = instance.create_encrypted_input(CONTRACT, USER).unwrap();
    input.add_u64(1).unwrap();
    let err = input.finalize().await.unwrap_err();
    assert!(matches!(err, Error::HandleMismatch(_)));
}

#[tokio::test]
async fn over_budget_bundle_never_reaches_the_packer() {
    let packer = Arc::new(FakePacker::default());
    let transport = Arc::new(FakeTransport::with_reply(500, "unused"));
    let instance = instance(packer.clone(), transport.clone());
    let mut input = instance.create_encrypted_input(CONTRACT, USER).unwrap();
    input.add_bytes256(&[1; 256]).unwrap();
    input.add_u8(1).unwrap();
    let err = input.finalize().await.unwrap_err();
    assert!(matches!(err, Error::BudgetExceeded { .. }));
    assert_eq!(packer.calls(), 0);
    assert!(transport.calls().is_empty());
}

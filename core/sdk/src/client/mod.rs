use crate::client::threshold::{SignerResponse, SignerSet};
use crate::consts::MAX_USER_DECRYPT_BITS;
use crate::error::{Error, Result, ValidationError};
use crate::input::handles::HandleKind;
use crate::transport::Transport;
use alloy_primitives::Address;
use relayer_wire::rpc_types::SignerResponseJson;
use relayer_wire::Handle;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub mod public_decryption;
pub mod threshold;
pub mod user_decryption;

/// Everything the decryption flows need besides the request itself.
#[derive(Clone)]
pub struct DecryptionContext {
    pub relayer_url: String,
    /// Chain of the gateway hosting the decryption contract.
    pub gateway_chain_id: u64,
    pub verifying_contract: Address,
    pub signers: SignerSet,
    pub verify_responses: bool,
    pub timeout: Duration,
    pub transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for DecryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionContext")
            .field("relayer_url", &self.relayer_url)
            .field("gateway_chain_id", &self.gateway_chain_id)
            .field("verifying_contract", &self.verifying_contract)
            .field("signers", &self.signers)
            .field("verify_responses", &self.verify_responses)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Seconds since the epoch.
pub(crate) fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| Error::Config(format!("system clock is before the epoch: {e}")))
}

/// Rejects handles of unknown kind and requests over the decryption bit budget.
pub(crate) fn check_decryption_bits(handles: &[Handle]) -> Result<()> {
    let mut total = 0u32;
    for handle in handles {
        let kind = handle.kind().ok_or_else(|| {
            ValidationError::Type(format!(
                "Handle {handle} has unknown type tag {}.",
                handle.type_tag()
            ))
        })?;
        total += kind.bits();
    }
    if total > MAX_USER_DECRYPT_BITS {
        return Err(Error::BudgetExceeded {
            total,
            max: MAX_USER_DECRYPT_BITS,
        });
    }
    Ok(())
}

/// Converts the relayer's signer responses. Malformed entries are logged and dropped, they
/// simply do not count towards the threshold.
pub(crate) fn parse_signer_responses(responses: &[SignerResponseJson]) -> Vec<SignerResponse> {
    responses
        .iter()
        .filter_map(|json| match SignerResponse::try_from(json) {
            Ok(response) => Some(response),
            Err(rejection) => {
                tracing::warn!(
                    "Discarding response from party {}: {rejection}",
                    json.party_id
                );
                None
            }
        })
        .collect()
}

use crate::client::threshold::SignerResponse;
use crate::cryptography::backend::SignatureVerifier;
use crate::error::Rejection;
use alloy_primitives::Address;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// What a response is checked against.
pub(crate) struct ResponseCheck<'a> {
    pub digest: &'a [u8],
    pub signers: &'a HashMap<u32, Address>,
    pub verifier: &'a dyn SignatureVerifier,
    /// When false the signer set and the signatures are not consulted.
    pub verify: bool,
}

/// Distinct parties and keys already counted for one request.
#[derive(Default, Debug)]
pub(crate) struct SeenSigners {
    party_ids: HashSet<u32>,
    verification_keys: HashSet<Address>,
}

impl SeenSigners {
    pub fn record(&mut self, response: &SignerResponse) {
        self.party_ids.insert(response.party_id);
        self.verification_keys.insert(response.verification_key);
    }
}

/// Decides whether a single response may be counted towards the threshold.
///
/// Rejections are not errors: the caller logs them and keeps waiting for other signers.
pub(crate) fn check_signer_response(
    check: &ResponseCheck<'_>,
    seen: &SeenSigners,
    response: &SignerResponse,
) -> Result<(), Rejection> {
    if response.digest != check.digest {
        return Err(Rejection::DigestMismatch);
    }
    if seen.party_ids.contains(&response.party_id) {
        return Err(Rejection::DuplicateSigner(response.party_id));
    }
    if seen.verification_keys.contains(&response.verification_key) {
        return Err(Rejection::DuplicateKey(
            response.verification_key.to_checksum(None),
        ));
    }
    if !check.verify {
        return Ok(());
    }

    let expected_key = check
        .signers
        .get(&response.party_id)
        .ok_or(Rejection::UnknownSigner(response.party_id))?;
    if *expected_key != response.verification_key {
        return Err(Rejection::SignerKeyMismatch {
            party_id: response.party_id,
            received: response.verification_key.to_checksum(None),
        });
    }
    match check.verifier.verify(
        expected_key,
        &response.digest,
        &response.payload,
        &response.signature,
    ) {
        Ok(true) => Ok(()),
        Ok(false) => Err(Rejection::InvalidSignature),
        Err(e) => {
            tracing::warn!(
                "Signature check of party {} failed: {e}",
                response.party_id
            );
            Err(Rejection::InvalidSignature)
        }
    }
}

/// Index of the first occurrence of the most common item, provided it occurs at least
/// `min_occurence` times.
pub(crate) fn select_most_common<T: Eq + Hash>(
    min_occurence: usize,
    items: impl Iterator<Item = T>,
) -> Option<usize> {
    // keyed on the item, values are (occurence, first index)
    let mut occurence_map: HashMap<T, (usize, usize)> = HashMap::new();
    for (i, item) in items.enumerate() {
        occurence_map.entry(item).or_insert((0, i)).0 += 1;
    }

    // ties are broken towards the earliest response
    let first = occurence_map
        .into_values()
        .sorted_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .next_back();

    match first {
        Some((count, idx)) if count >= min_occurence => Some(idx),
        _ => None,
    }
}

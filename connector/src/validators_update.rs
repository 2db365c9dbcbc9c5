use interop_types::{ActiveValidatorsUpdate, BlsPublicKey, ValidatorsData};
use std::collections::{BTreeMap, BTreeSet};

/// Compute the minimal diff turning `prev` into `next`, plus the
/// certificate-threshold signal (0 = unchanged). An identical validators
/// hash yields the empty update.
#[must_use]
pub fn compute_validators_update(
    prev: &ValidatorsData,
    next: &ValidatorsData,
) -> (ActiveValidatorsUpdate, u64) {
    if next.validators_hash == prev.validators_hash {
        return (ActiveValidatorsUpdate::default(), 0);
    }

    let prev_weights: BTreeMap<&BlsPublicKey, u64> = prev
        .validators
        .iter()
        .map(|validator| (&validator.bls_key, validator.bft_weight))
        .collect();
    let next_weights: BTreeMap<&BlsPublicKey, u64> = next
        .validators
        .iter()
        .map(|validator| (&validator.bls_key, validator.bft_weight))
        .collect();

    let bls_keys_update: Vec<BlsPublicKey> = next_weights
        .keys()
        .filter(|key| !prev_weights.contains_key(*key))
        .map(|key| (*key).clone())
        .collect();

    // Lexicographically sorted union of both key sets.
    let union: BTreeSet<&BlsPublicKey> = prev_weights.keys().chain(next_weights.keys()).copied().collect();

    let mut bft_weights_update = Vec::new();
    let mut changed_positions = Vec::new();
    for (position, key) in union.iter().enumerate() {
        let prev_weight = prev_weights.get(*key).copied().unwrap_or(0);
        let next_weight = next_weights.get(*key).copied().unwrap_or(0);
        if next_weight != prev_weight {
            bft_weights_update.push(next_weight);
            changed_positions.push(position);
        }
    }

    let bft_weights_update_bitmap = build_union_bitmap(union.len(), &changed_positions);

    let certificate_threshold = if next.certificate_threshold == prev.certificate_threshold {
        0
    } else {
        next.certificate_threshold
    };

    (
        ActiveValidatorsUpdate {
            bls_keys_update,
            bft_weights_update,
            bft_weights_update_bitmap,
        },
        certificate_threshold,
    )
}

/// Big-endian bitmap over `len` union positions: position 0 is the most
/// significant bit, padded with leading zeros to whole bytes.
fn build_union_bitmap(len: usize, set_positions: &[usize]) -> Vec<u8> {
    let byte_count = len.div_ceil(8);
    let mut bitmap = vec![0u8; byte_count];
    for &position in set_positions {
        let bit = len - 1 - position;
        bitmap[byte_count - 1 - bit / 8] |= 1 << (bit % 8);
    }
    bitmap
}

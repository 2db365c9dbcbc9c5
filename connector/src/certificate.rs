use blst::min_pk::{AggregatePublicKey, PublicKey, Signature};
use blst::BLST_ERROR;
use interop_types::{AggregateCommit, BlockHeader, Certificate, ChainId, ValidatorsData};
use log::{debug, trace};

use crate::error::ConnectorError;
use crate::sending_client::BftHeights;

/// Ciphersuite for proof-of-possession BLS signatures over BLS12-381.
pub const BLS_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

/// Choose the highest aggregate commit whose signature verifies under the
/// validator set known at its height, strictly advancing the last certified
/// height. Returns `None` when no candidate verifies.
///
/// # Errors
/// * a candidate height has no stored header or validator set
pub fn select_certificate(
    headers: &[BlockHeader],
    commits: &[AggregateCommit],
    validators_data: &[ValidatorsData],
    bft_heights: &BftHeights,
    last_certified_height: u32,
    chain_id: ChainId,
) -> Result<Option<Certificate>, ConnectorError> {
    let mut candidates: Vec<&AggregateCommit> = commits
        .iter()
        .filter(|commit| {
            commit.height > last_certified_height
                && commit.height <= bft_heights.max_height_certified
                && commit.has_signature()
        })
        .collect();
    candidates.sort_by(|a, b| b.height.cmp(&a.height));

    for commit in candidates {
        let header = headers
            .iter()
            .find(|header| header.height == commit.height)
            .ok_or_else(|| {
                ConnectorError::MissingDependency(format!(
                    "no header stored for aggregate commit at height {}",
                    commit.height
                ))
            })?;
        let validators = validators_data
            .iter()
            .find(|data| data.validators_hash == header.validators_hash)
            .ok_or_else(|| {
                ConnectorError::MissingDependency(format!(
                    "no validator set stored for hash {}",
                    header.validators_hash
                ))
            })?;

        let certificate = Certificate::from_header(header, commit);
        if verify_certificate_signature(&certificate, validators, chain_id) {
            debug!(target: "connector", "certificate extracted at height {}", certificate.height);
            return Ok(Some(certificate));
        }
        trace!(target: "connector", "aggregate commit at height {} failed verification", commit.height);
    }

    Ok(None)
}

/// Verify the weighted aggregate BLS signature of a certificate: the
/// validators selected by the aggregation bits must reach the certificate
/// threshold, and their aggregated key must verify the signature over the
/// certificate's signing bytes.
#[must_use]
pub fn verify_certificate_signature(
    certificate: &Certificate,
    validators: &ValidatorsData,
    chain_id: ChainId,
) -> bool {
    let weight = validators.selected_weight(|index| certificate.aggregation_bits.is_set(index));
    if weight < validators.certificate_threshold {
        return false;
    }

    let mut keys = Vec::new();
    for (index, validator) in validators.validators.iter().enumerate() {
        if !certificate.aggregation_bits.is_set(index) {
            continue;
        }
        let Ok(key) = PublicKey::from_bytes(validator.bls_key.as_bytes()) else {
            return false;
        };
        keys.push(key);
    }
    if keys.is_empty() {
        return false;
    }

    let Ok(signature) = Signature::from_bytes(certificate.signature.as_bytes()) else {
        return false;
    };
    let key_refs: Vec<&PublicKey> = keys.iter().collect();
    let Ok(aggregate) = AggregatePublicKey::aggregate(&key_refs, true) else {
        return false;
    };

    signature.verify(
        true,
        &certificate.signing_bytes(chain_id),
        BLS_DST,
        &[],
        &aggregate.to_public_key(),
        true,
    ) == BLST_ERROR::BLST_SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use blst::min_pk::{AggregateSignature, SecretKey};
    use interop_types::{
        compute_validators_hash, ActiveValidator, AggregationBits, BlsPublicKey, BlsSignature,
        H256,
    };

    const CHAIN_ID: ChainId = ChainId([1, 0, 0, 1]);

    fn secret_key(seed: u8) -> SecretKey {
        SecretKey::key_gen(&[seed; 32], &[]).unwrap()
    }

    fn validator_set(secret_keys: &[SecretKey], weights: &[u64], threshold: u64) -> ValidatorsData {
        let mut validators: Vec<ActiveValidator> = secret_keys
            .iter()
            .zip(weights)
            .map(|(sk, weight)| ActiveValidator {
                bls_key: BlsPublicKey(sk.sk_to_pk().to_bytes()),
                bft_weight: *weight,
            })
            .collect();
        validators.sort_by(|a, b| a.bls_key.cmp(&b.bls_key));
        let validators_hash = compute_validators_hash(&validators, threshold);
        ValidatorsData {
            validators,
            certificate_threshold: threshold,
            validators_hash,
        }
    }

    fn header_at(height: u32, validators_hash: H256) -> BlockHeader {
        BlockHeader {
            height,
            timestamp: 1_700_000_000 + height * 10,
            previous_block_id: H256([height as u8; 32]),
            state_root: H256([4u8; 32]),
            validators_hash,
            aggregate_commit: None,
        }
    }

    /// Sign `header`'s certificate with every validator whose aggregation
    /// bit is set.
    fn signed_commit(
        header: &BlockHeader,
        validators: &ValidatorsData,
        secret_keys: &[SecretKey],
        bits: Vec<u8>,
    ) -> AggregateCommit {
        let unsigned = AggregateCommit {
            height: header.height,
            aggregation_bits: AggregationBits(bits.clone()),
            certificate_signature: BlsSignature(vec![0u8; 96]),
        };
        let certificate = Certificate::from_header(header, &unsigned);
        let message = certificate.signing_bytes(CHAIN_ID);

        let mut by_key: Vec<&SecretKey> = secret_keys.iter().collect();
        by_key.sort_by_key(|sk| sk.sk_to_pk().to_bytes());
        let signatures: Vec<_> = by_key
            .iter()
            .enumerate()
            .filter(|(i, _)| AggregationBits(bits.clone()).is_set(*i))
            .map(|(_, sk)| sk.sign(&message, BLS_DST, &[]))
            .collect();
        let signature_refs: Vec<&blst::min_pk::Signature> = signatures.iter().collect();
        let aggregate = AggregateSignature::aggregate(&signature_refs, true).unwrap();

        AggregateCommit {
            height: header.height,
            aggregation_bits: AggregationBits(bits),
            certificate_signature: BlsSignature(aggregate.to_signature().to_bytes().to_vec()),
        }
    }

    fn bft_heights(max_height_certified: u32) -> BftHeights {
        BftHeights {
            max_height_prevoted: max_height_certified + 2,
            max_height_precommitted: max_height_certified + 1,
            max_height_certified,
        }
    }

    #[test]
    fn test_selects_highest_verifiable_commit() {
        let secret_keys = [secret_key(1), secret_key(2)];
        let validators = validator_set(&secret_keys, &[10, 10], 15);
        let headers = vec![
            header_at(8, validators.validators_hash.clone()),
            header_at(10, validators.validators_hash.clone()),
        ];
        let commits = vec![
            signed_commit(&headers[0], &validators, &secret_keys, vec![0b11]),
            signed_commit(&headers[1], &validators, &secret_keys, vec![0b11]),
        ];

        let certificate = select_certificate(
            &headers,
            &commits,
            &[validators],
            &bft_heights(10),
            0,
            CHAIN_ID,
        )
        .unwrap()
        .expect("a certificate should verify");
        assert_eq!(certificate.height, 10);
    }

    #[test]
    fn test_skips_unverifiable_and_falls_back() {
        let secret_keys = [secret_key(1), secret_key(2)];
        let validators = validator_set(&secret_keys, &[10, 10], 15);
        let headers = vec![
            header_at(8, validators.validators_hash.clone()),
            header_at(10, validators.validators_hash.clone()),
        ];
        let mut broken = signed_commit(&headers[1], &validators, &secret_keys, vec![0b11]);
        broken.certificate_signature.0[0] ^= 0xff;
        let commits = vec![
            signed_commit(&headers[0], &validators, &secret_keys, vec![0b11]),
            broken,
        ];

        let certificate = select_certificate(
            &headers,
            &commits,
            &[validators],
            &bft_heights(10),
            0,
            CHAIN_ID,
        )
        .unwrap()
        .expect("the lower commit should verify");
        assert_eq!(certificate.height, 8);
    }

    #[test]
    fn test_no_candidate_verifies() {
        let secret_keys = [secret_key(1), secret_key(2)];
        let validators = validator_set(&secret_keys, &[10, 10], 15);
        let headers = vec![header_at(10, validators.validators_hash.clone())];
        let mut broken = signed_commit(&headers[0], &validators, &secret_keys, vec![0b11]);
        broken.certificate_signature.0[1] ^= 0xff;

        let selected = select_certificate(
            &headers,
            &[broken],
            &[validators],
            &bft_heights(10),
            0,
            CHAIN_ID,
        )
        .unwrap();
        assert!(selected.is_none());
    }

    #[test]
    fn test_below_threshold_fails() {
        let secret_keys = [secret_key(1), secret_key(2)];
        let validators = validator_set(&secret_keys, &[10, 10], 15);
        let headers = vec![header_at(10, validators.validators_hash.clone())];
        // Only one signer participates: weight 10 < threshold 15.
        let commits = vec![signed_commit(&headers[0], &validators, &secret_keys, vec![0b01])];

        let selected = select_certificate(
            &headers,
            &commits,
            &[validators],
            &bft_heights(10),
            0,
            CHAIN_ID,
        )
        .unwrap();
        assert!(selected.is_none());
    }

    #[test]
    fn test_candidates_above_certified_ceiling_are_ignored() {
        let secret_keys = [secret_key(1), secret_key(2)];
        let validators = validator_set(&secret_keys, &[10, 10], 15);
        let headers = vec![header_at(10, validators.validators_hash.clone())];
        let commits = vec![signed_commit(&headers[0], &validators, &secret_keys, vec![0b11])];

        let selected = select_certificate(
            &headers,
            &commits,
            &[validators],
            &bft_heights(9),
            0,
            CHAIN_ID,
        )
        .unwrap();
        assert!(selected.is_none());
    }

    #[test]
    fn test_missing_header_is_an_error() {
        let secret_keys = [secret_key(1)];
        let validators = validator_set(&secret_keys, &[20], 15);
        let header = header_at(10, validators.validators_hash.clone());
        let commits = vec![signed_commit(&header, &validators, &secret_keys, vec![0b01])];

        let result = select_certificate(&[], &commits, &[validators], &bft_heights(10), 0, CHAIN_ID);
        assert!(matches!(result, Err(ConnectorError::MissingDependency(_))));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let secret_keys = [secret_key(1), secret_key(2)];
        let validators = validator_set(&secret_keys, &[10, 10], 15);
        let headers = vec![
            header_at(8, validators.validators_hash.clone()),
            header_at(10, validators.validators_hash.clone()),
        ];
        let commits = vec![
            signed_commit(&headers[0], &validators, &secret_keys, vec![0b11]),
            signed_commit(&headers[1], &validators, &secret_keys, vec![0b11]),
        ];

        let first = select_certificate(
            &headers,
            &commits,
            std::slice::from_ref(&validators),
            &bft_heights(10),
            0,
            CHAIN_ID,
        )
        .unwrap();
        let second = select_certificate(
            &headers,
            &commits,
            std::slice::from_ref(&validators),
            &bft_heights(10),
            0,
            CHAIN_ID,
        )
        .unwrap();
        assert_eq!(first, second);
    }
}

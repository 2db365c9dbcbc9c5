use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::block::{AggregateCommit, AggregationBits, BlockHeader};
use crate::bls::BlsSignature;
use crate::chain::ChainId;
use crate::hash::H256;

/// Domain separation tag mixed into the bytes validators sign over a
/// certificate.
pub const MESSAGE_TAG_CERTIFICATE: &[u8] = b"INTEROP_CERTIFICATE_";

/// A BFT-signed commitment to a block header, sufficient for another chain
/// to trust the state root at that height.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub block_id: H256,
    pub height: u32,
    pub timestamp: u32,
    pub state_root: H256,
    pub validators_hash: H256,
    pub aggregation_bits: AggregationBits,
    pub signature: BlsSignature,
}

impl Certificate {
    /// Assemble a certificate from a header's certifying fields and the
    /// aggregate commit signed at that height.
    #[must_use]
    pub fn from_header(header: &BlockHeader, commit: &AggregateCommit) -> Self {
        Certificate {
            block_id: header.id(),
            height: header.height,
            timestamp: header.timestamp,
            state_root: header.state_root.clone(),
            validators_hash: header.validators_hash.clone(),
            aggregation_bits: commit.aggregation_bits.clone(),
            signature: commit.certificate_signature.clone(),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).expect("certificate encoding is infallible")
    }

    /// Encoding of the certificate without aggregation bits and signature.
    #[must_use]
    pub fn unsigned_bytes(&self) -> Vec<u8> {
        borsh::to_vec(&(
            &self.block_id,
            self.height,
            self.timestamp,
            &self.state_root,
            &self.validators_hash,
        ))
        .expect("certificate encoding is infallible")
    }

    /// The exact bytes validators sign: tag, chain ID, unsigned encoding.
    #[must_use]
    pub fn signing_bytes(&self, chain_id: ChainId) -> Vec<u8> {
        let unsigned = self.unsigned_bytes();
        let mut message =
            Vec::with_capacity(MESSAGE_TAG_CERTIFICATE.len() + ChainId::LENGTH + unsigned.len());
        message.extend_from_slice(MESSAGE_TAG_CERTIFICATE);
        message.extend_from_slice(chain_id.as_bytes());
        message.extend_from_slice(&unsigned);
        message
    }
}

/// The receiving chain's view of the sending chain: the most recent
/// certificate it has accepted.
#[derive(BorshDeserialize, BorshSerialize, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastCertificate {
    pub height: u32,
    pub timestamp: u32,
    pub state_root: H256,
    pub validators_hash: H256,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit() -> AggregateCommit {
        AggregateCommit {
            height: 42,
            aggregation_bits: AggregationBits(vec![0b11]),
            certificate_signature: BlsSignature(vec![7u8; 96]),
        }
    }

    fn header() -> BlockHeader {
        BlockHeader {
            height: 42,
            timestamp: 1_700_000_420,
            previous_block_id: H256([1u8; 32]),
            state_root: H256([2u8; 32]),
            validators_hash: H256([3u8; 32]),
            aggregate_commit: Some(commit()),
        }
    }

    #[test]
    fn test_certificate_carries_certifying_fields() {
        let header = header();
        let cert = Certificate::from_header(&header, &commit());
        assert_eq!(cert.block_id, header.id());
        assert_eq!(cert.height, 42);
        assert_eq!(cert.state_root, header.state_root);
        assert_eq!(cert.validators_hash, header.validators_hash);
    }

    #[test]
    fn test_signing_bytes_exclude_signature() {
        let header = header();
        let mut cert = Certificate::from_header(&header, &commit());
        let chain_id = ChainId([1, 0, 0, 0]);
        let before = cert.signing_bytes(chain_id);
        cert.signature = BlsSignature(vec![9u8; 96]);
        cert.aggregation_bits = AggregationBits(vec![0b01]);
        assert_eq!(before, cert.signing_bytes(chain_id));
    }

    #[test]
    fn test_signing_bytes_bind_chain_id() {
        let cert = Certificate::from_header(&header(), &commit());
        assert_ne!(
            cert.signing_bytes(ChainId([1, 0, 0, 0])),
            cert.signing_bytes(ChainId([2, 0, 0, 0]))
        );
    }
}

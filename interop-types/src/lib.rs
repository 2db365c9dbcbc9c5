pub mod block;
pub mod bls;
pub mod ccm;
pub mod certificate;
pub mod chain;
pub mod hash;
pub mod transaction;
pub mod validators;

pub use block::{AggregateCommit, AggregationBits, BlockHeader};
pub use bls::{BlsPublicKey, BlsSignature};
pub use ccm::{
    CcmProcessedData, CcmProcessedResult, CcmSendSuccessData, CcmsAtHeight, CrossChainMessage,
    LastSentCcm, OutboxRootWitness,
};
pub use certificate::{Certificate, LastCertificate};
pub use chain::ChainId;
pub use hash::{sha256, H256};
pub use transaction::{
    CrossChainUpdateParams, InboxUpdate, SentCcu, Signature, Transaction,
};
pub use validators::{
    compute_validators_hash, ActiveValidator, ActiveValidatorsUpdate, ValidatorsData,
};

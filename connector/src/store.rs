use borsh::{BorshDeserialize, BorshSerialize};
use interop_types::{
    AggregateCommit, BlockHeader, CcmsAtHeight, LastCertificate, LastSentCcm, SentCcu,
    ValidatorsData,
};
use std::path::Path;

use crate::error::ConnectorError;

const KEY_BLOCK_HEADERS: &[u8] = &[0x01];
const KEY_AGGREGATE_COMMITS: &[u8] = &[0x02];
const KEY_VALIDATORS_PREIMAGE: &[u8] = &[0x03];
const KEY_CROSS_CHAIN_MESSAGES: &[u8] = &[0x04];
const KEY_LAST_SENT_CCM: &[u8] = &[0x05];
const KEY_LIST_OF_CCUS: &[u8] = &[0x06];
const KEY_LAST_CERTIFICATE: &[u8] = &[0x07];

/// Typed record store over an opaque byte KV. List-valued keys hold encoded
/// arrays, scalar keys hold single records; every write is individually
/// durable and idempotent under replay.
#[derive(Clone)]
pub struct ConnectorStore {
    db: sled::Db,
}

impl ConnectorStore {
    /// # Errors
    /// * store cannot be opened (fatal)
    pub fn open(path: &Path) -> Result<Self, ConnectorError> {
        Ok(ConnectorStore {
            db: sled::open(path)?,
        })
    }

    /// An in-memory store that is discarded on drop. Used by tests.
    ///
    /// # Errors
    /// * store cannot be created
    pub fn temporary() -> Result<Self, ConnectorError> {
        Ok(ConnectorStore {
            db: sled::Config::new().temporary(true).open()?,
        })
    }

    fn get_record<T: BorshDeserialize>(&self, key: &[u8]) -> Result<Option<T>, ConnectorError> {
        match self.db.get(key)? {
            None => Ok(None),
            Some(bytes) => borsh::from_slice(&bytes).map(Some).map_err(|err| {
                ConnectorError::Corrupted(format!("record 0x{}: {err}", hex::encode(key)))
            }),
        }
    }

    fn get_list<T: BorshDeserialize>(&self, key: &[u8]) -> Result<Vec<T>, ConnectorError> {
        Ok(self.get_record(key)?.unwrap_or_default())
    }

    fn put<T: BorshSerialize>(&self, key: &[u8], value: &T) -> Result<(), ConnectorError> {
        let bytes = borsh::to_vec(value)
            .map_err(|err| ConnectorError::Corrupted(format!("encoding failed: {err}")))?;
        self.db.insert(key, bytes)?;
        Ok(())
    }

    pub fn get_block_headers(&self) -> Result<Vec<BlockHeader>, ConnectorError> {
        self.get_list(KEY_BLOCK_HEADERS)
    }

    pub fn set_block_headers(&self, headers: &[BlockHeader]) -> Result<(), ConnectorError> {
        self.put(KEY_BLOCK_HEADERS, &headers)
    }

    pub fn get_aggregate_commits(&self) -> Result<Vec<AggregateCommit>, ConnectorError> {
        self.get_list(KEY_AGGREGATE_COMMITS)
    }

    pub fn set_aggregate_commits(
        &self,
        commits: &[AggregateCommit],
    ) -> Result<(), ConnectorError> {
        self.put(KEY_AGGREGATE_COMMITS, &commits)
    }

    pub fn get_validators_data(&self) -> Result<Vec<ValidatorsData>, ConnectorError> {
        self.get_list(KEY_VALIDATORS_PREIMAGE)
    }

    pub fn set_validators_data(&self, data: &[ValidatorsData]) -> Result<(), ConnectorError> {
        self.put(KEY_VALIDATORS_PREIMAGE, &data)
    }

    pub fn get_ccms(&self) -> Result<Vec<CcmsAtHeight>, ConnectorError> {
        self.get_list(KEY_CROSS_CHAIN_MESSAGES)
    }

    pub fn set_ccms(&self, records: &[CcmsAtHeight]) -> Result<(), ConnectorError> {
        self.put(KEY_CROSS_CHAIN_MESSAGES, &records)
    }

    pub fn get_last_sent_ccm(&self) -> Result<Option<LastSentCcm>, ConnectorError> {
        self.get_record(KEY_LAST_SENT_CCM)
    }

    pub fn set_last_sent_ccm(&self, last_sent: &LastSentCcm) -> Result<(), ConnectorError> {
        self.put(KEY_LAST_SENT_CCM, last_sent)
    }

    pub fn get_sent_ccus(&self) -> Result<Vec<SentCcu>, ConnectorError> {
        self.get_list(KEY_LIST_OF_CCUS)
    }

    pub fn set_sent_ccus(&self, ccus: &[SentCcu]) -> Result<(), ConnectorError> {
        self.put(KEY_LIST_OF_CCUS, &ccus)
    }

    pub fn get_last_certificate(&self) -> Result<Option<LastCertificate>, ConnectorError> {
        self.get_record(KEY_LAST_CERTIFICATE)
    }

    pub fn set_last_certificate(
        &self,
        certificate: &LastCertificate,
    ) -> Result<(), ConnectorError> {
        self.put(KEY_LAST_CERTIFICATE, certificate)
    }

    /// # Errors
    /// * flush failure (fatal)
    pub fn flush(&self) -> Result<(), ConnectorError> {
        self.db.flush()?;
        Ok(())
    }

    /// Flush and release the store.
    ///
    /// # Errors
    /// * flush failure (fatal)
    pub fn close(&self) -> Result<(), ConnectorError> {
        self.flush()
    }
}

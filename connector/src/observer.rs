use interop_types::ccm::{
    CcmProcessedData, CcmProcessedResult, CcmSendSuccessData, EVENT_CCM_PROCESSED,
    EVENT_CCM_SEND_SUCCESS, MODULE_INTEROPERABILITY,
};
use interop_types::{BlockHeader, CcmsAtHeight, ChainId, CrossChainMessage};
use log::{debug, info, warn};

use crate::error::ConnectorError;
use crate::sending_client::{ChainEvent, SendingChainApi};
use crate::store::ConnectorStore;

/// Maintains the store from the sending-chain subscription: headers,
/// aggregate commits, validator sets and CCM batches with their outbox
/// proofs.
pub struct Observer {
    outbox_key: Vec<u8>,
    forward_bounced_ccms: bool,
}

impl Observer {
    #[must_use]
    pub fn new(outbox_store_prefix: &[u8], own_chain_id: ChainId, forward_bounced_ccms: bool) -> Self {
        let mut outbox_key =
            Vec::with_capacity(outbox_store_prefix.len() + ChainId::LENGTH);
        outbox_key.extend_from_slice(outbox_store_prefix);
        outbox_key.extend_from_slice(own_chain_id.as_bytes());
        Observer {
            outbox_key,
            forward_bounced_ccms,
        }
    }

    /// Ingest one new block: fetch its events and BFT parameters, then
    /// persist the header, aggregate commit, validator set and CCM batch.
    /// Nothing is persisted when any fetch or decode fails; the next block
    /// retries.
    ///
    /// # Errors
    /// * RPC failure against the sending chain
    /// * store failure (fatal)
    pub async fn on_new_block<S: SendingChainApi>(
        &self,
        chain: &S,
        store: &ConnectorStore,
        header: &BlockHeader,
    ) -> Result<(), ConnectorError> {
        let events = chain.get_events(header.height).await?;
        let ccms = extract_ccms(&events, self.forward_bounced_ccms);
        let inclusion_proof = if ccms.is_empty() {
            None
        } else {
            Some(chain.get_inclusion_proof(&self.outbox_key).await?)
        };
        let bft_parameters = chain.get_bft_parameters(header.height).await?;

        // All reads done; persist.
        let mut headers = store.get_block_headers()?;
        upsert_by_height(&mut headers, header.clone(), |h| h.height);
        store.set_block_headers(&headers)?;

        if let Some(commit) = &header.aggregate_commit {
            let mut commits = store.get_aggregate_commits()?;
            upsert_by_height(&mut commits, commit.clone(), |c| c.height);
            store.set_aggregate_commits(&commits)?;
        }

        let mut validators_data = store.get_validators_data()?;
        if !validators_data
            .iter()
            .any(|data| data.validators_hash == bft_parameters.validators_hash)
        {
            debug!(target: "connector", "new validators hash {} at height {}",
                bft_parameters.validators_hash, header.height);
            validators_data.push(bft_parameters);
            store.set_validators_data(&validators_data)?;
        }

        if let Some(inclusion_proof) = inclusion_proof {
            info!(target: "connector", "{} ccm(s) observed at height {}", ccms.len(), header.height);
            let mut records = store.get_ccms()?;
            upsert_by_height(
                &mut records,
                CcmsAtHeight {
                    height: header.height,
                    ccms,
                    inclusion_proof,
                },
                |record| record.height,
            );
            store.set_ccms(&records)?;
        }

        store.flush()
    }

    /// Undo one rolled-back block: drop the header and aggregate commit at
    /// its height and the validator set carrying its validators hash. CCM
    /// records are left for the next cleanup at a certified height.
    ///
    /// # Errors
    /// * store failure (fatal)
    pub fn on_delete_block(
        &self,
        store: &ConnectorStore,
        header: &BlockHeader,
    ) -> Result<(), ConnectorError> {
        let mut headers = store.get_block_headers()?;
        headers.retain(|h| h.height != header.height);
        store.set_block_headers(&headers)?;

        let mut commits = store.get_aggregate_commits()?;
        commits.retain(|c| c.height != header.height);
        store.set_aggregate_commits(&commits)?;

        let mut validators_data = store.get_validators_data()?;
        validators_data.retain(|data| data.validators_hash != header.validators_hash);
        store.set_validators_data(&validators_data)?;

        store.flush()
    }
}

fn upsert_by_height<T>(records: &mut Vec<T>, record: T, height: impl Fn(&T) -> u32) {
    let key = height(&record);
    match records.binary_search_by_key(&key, height) {
        Ok(position) => records[position] = record,
        Err(position) => records.insert(position, record),
    }
}

/// Extract relayable CCMs from a block's events: every `ccmSendSuccess`,
/// plus every `ccmProcessed` whose result forwarded (or, when enabled,
/// bounced) the message. Undecodable payloads are logged and skipped.
#[must_use]
pub fn extract_ccms(events: &[ChainEvent], forward_bounced_ccms: bool) -> Vec<CrossChainMessage> {
    let mut ccms = Vec::new();
    for event in events {
        if event.module != MODULE_INTEROPERABILITY {
            continue;
        }
        let data = match hex::decode(&event.data) {
            Ok(data) => data,
            Err(err) => {
                warn!(target: "connector", "event {} data is not valid hex: {err}", event.name);
                continue;
            }
        };
        match event.name.as_str() {
            EVENT_CCM_SEND_SUCCESS => match borsh::from_slice::<CcmSendSuccessData>(&data) {
                Ok(payload) => ccms.push(payload.ccm),
                Err(err) => {
                    warn!(target: "connector", "undecodable ccmSendSuccess payload: {err}");
                }
            },
            EVENT_CCM_PROCESSED => match borsh::from_slice::<CcmProcessedData>(&data) {
                Ok(payload) => match payload.result {
                    CcmProcessedResult::Forwarded => ccms.push(payload.ccm),
                    CcmProcessedResult::Bounced if forward_bounced_ccms => {
                        ccms.push(payload.ccm);
                    }
                    result => {
                        debug!(target: "connector", "ccm with nonce {} not relayed: {result:?}",
                            payload.ccm.nonce);
                    }
                },
                Err(err) => {
                    warn!(target: "connector", "undecodable ccmProcessed payload: {err}");
                }
            },
            _ => {}
        }
    }
    ccms
}

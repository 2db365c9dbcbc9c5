use ed25519_dalek::{Signer, SigningKey};
use interop_types::ccm::MODULE_INTEROPERABILITY;
use interop_types::transaction::{
    address_from_public_key, COMMAND_SUBMIT_MAINCHAIN_CCU, COMMAND_SUBMIT_SIDECHAIN_CCU,
};
use interop_types::{
    ChainId, CrossChainUpdateParams, LastCertificate, SentCcu, Signature, Transaction, H256,
};
use log::{info, warn};

use crate::error::ConnectorError;
use crate::receiving_client::ReceivingChainApi;
use crate::store::ConnectorStore;

/// Signs assembled CCU parameters into receiving-chain transactions and
/// posts them to the transaction pool.
pub struct CcuSubmitter {
    signing_key: SigningKey,
    sender_public_key: Vec<u8>,
    sender_address: String,
    own_chain_id: ChainId,
    receiving_chain_id: ChainId,
    ccu_fee: u64,
    save_ccu: bool,
}

impl CcuSubmitter {
    #[must_use]
    pub fn new(
        signing_key: SigningKey,
        own_chain_id: ChainId,
        receiving_chain_id: ChainId,
        ccu_fee: u64,
        save_ccu: bool,
    ) -> Self {
        let sender_public_key = signing_key.verifying_key().to_bytes().to_vec();
        let sender_address = address_from_public_key(&sender_public_key);
        CcuSubmitter {
            signing_key,
            sender_public_key,
            sender_address,
            own_chain_id,
            receiving_chain_id,
            ccu_fee,
            save_ccu,
        }
    }

    /// The interoperability command on the receiving chain: the mainchain
    /// command when the receiving chain is its network's mainchain,
    /// otherwise the sidechain command.
    #[must_use]
    pub fn ccu_command(&self) -> &'static str {
        if self.receiving_chain_id == self.own_chain_id.mainchain_id() {
            COMMAND_SUBMIT_MAINCHAIN_CCU
        } else {
            COMMAND_SUBMIT_SIDECHAIN_CCU
        }
    }

    /// Wrap CCU parameters in a signed transaction with the given account
    /// nonce.
    #[must_use]
    pub fn assemble(&self, params: &CrossChainUpdateParams, nonce: u64) -> Transaction {
        let mut transaction = Transaction {
            module: MODULE_INTEROPERABILITY.to_string(),
            command: self.ccu_command().to_string(),
            nonce,
            fee: self.ccu_fee,
            sender_public_key: self.sender_public_key.clone(),
            params: params.to_bytes(),
            signatures: Vec::new(),
        };
        let signature = self
            .signing_key
            .sign(&transaction.signing_bytes(self.receiving_chain_id));
        transaction.signatures.push(Signature(signature.to_bytes().to_vec()));
        transaction
    }

    /// Sign and post one CCU, recording it in the sent list. With `save_ccu`
    /// the transaction is recorded without being posted.
    ///
    /// # Errors
    /// * nonce lookup or post failure against the receiving chain
    /// * store failure (fatal)
    pub async fn submit<R: ReceivingChainApi>(
        &self,
        chain: &R,
        store: &ConnectorStore,
        params: &CrossChainUpdateParams,
    ) -> Result<H256, ConnectorError> {
        let nonce = chain.get_auth_nonce(&self.sender_address).await?;
        let transaction = self.assemble(params, nonce);
        let id = transaction.id();

        if self.save_ccu {
            info!(target: "connector", "dry run: recorded ccu {id} without posting");
        } else {
            let posted_id = chain
                .post_transaction(&hex::encode(transaction.to_bytes()))
                .await
                .map_err(|err| match err {
                    ConnectorError::Rpc { message, .. } => ConnectorError::Rejected {
                        id: id.clone(),
                        message,
                    },
                    other => other,
                })?;
            info!(target: "connector", "ccu posted: id = {posted_id}, nonce = {nonce}");
        }

        // Newest first, keyed by nonce.
        let mut sent = store.get_sent_ccus()?;
        sent.retain(|ccu| ccu.nonce != nonce);
        sent.insert(
            0,
            SentCcu {
                id: id.clone(),
                nonce,
                transaction: transaction.to_bytes(),
            },
        );
        sent.sort_by(|a, b| b.nonce.cmp(&a.nonce));
        store.set_sent_ccus(&sent)?;
        store.flush()?;

        Ok(id)
    }

    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.save_ccu
    }
}

/// Drop records the receiving chain no longer needs: headers, aggregate
/// commits and CCM batches strictly below the last certified height, and
/// validator sets no longer referenced by a retained header or by the last
/// certificate itself.
///
/// # Errors
/// * store failure (fatal)
pub fn run_cleanup(
    store: &ConnectorStore,
    last_certificate: &LastCertificate,
) -> Result<(), ConnectorError> {
    let floor = last_certificate.height;

    let mut headers = store.get_block_headers()?;
    let before = headers.len();
    headers.retain(|header| header.height >= floor);
    store.set_block_headers(&headers)?;

    let mut commits = store.get_aggregate_commits()?;
    commits.retain(|commit| commit.height >= floor);
    store.set_aggregate_commits(&commits)?;

    let mut records = store.get_ccms()?;
    records.retain(|record| record.height >= floor);
    store.set_ccms(&records)?;

    let mut validators_data = store.get_validators_data()?;
    validators_data.retain(|data| {
        data.validators_hash == last_certificate.validators_hash
            || headers
                .iter()
                .any(|header| header.validators_hash == data.validators_hash)
    });
    store.set_validators_data(&validators_data)?;

    if before > headers.len() {
        info!(target: "connector", "cleanup dropped {} header(s) below height {floor}",
            before - headers.len());
    }
    store.flush()
}

/// Warn-level record of a submission failure; the cursor stays unchanged
/// and the next cadence retries.
pub fn log_submission_failure(error: &ConnectorError) {
    match error {
        ConnectorError::Rejected { id, message } => {
            warn!(target: "connector", "ccu {id} rejected by the receiving chain: {message}");
        }
        other => warn!(target: "connector", "ccu submission failed: {other}"),
    }
}

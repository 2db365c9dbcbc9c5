use interop_types::{
    ActiveValidatorsUpdate, BlockHeader, ChainId, CrossChainUpdateParams, InboxUpdate,
    LastCertificate, LastSentCcm,
};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

use crate::ccu::{log_submission_failure, run_cleanup, CcuSubmitter};
use crate::certificate::select_certificate;
use crate::config::Config;
use crate::endpoint::Endpoint;
use crate::error::ConnectorError;
use crate::inbox_update::build_inbox_update;
use crate::keys::decrypt_private_key;
use crate::observer::Observer;
use crate::receiving_client::{ReceivingChainApi, ReceivingChainClient};
use crate::sending_client::{BlockEvent, SendingChainApi, SendingChainClient};
use crate::store::ConnectorStore;
use crate::validators_update::compute_validators_update;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectorState {
    Init,
    Ready,
    Observing,
    Building,
    Submitting,
    Cleanup,
    Rollback,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectorState::Init => "init",
            ConnectorState::Ready => "ready",
            ConnectorState::Observing => "observing",
            ConnectorState::Building => "building",
            ConnectorState::Submitting => "submitting",
            ConnectorState::Cleanup => "cleanup",
            ConnectorState::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Snapshot of the connector exposed through the plugin endpoint.
#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    pub state: ConnectorState,
    pub observed_tip: Option<u32>,
    pub last_certificate: Option<LastCertificate>,
    pub last_sent_ccm: Option<LastSentCcm>,
    pub dry_run: bool,
}

/// The connector instance: consumes the sending-chain event queue one item
/// at a time and drives observation, CCU assembly, submission and cleanup.
pub struct Connector<S, R> {
    sending: S,
    receiving: R,
    store: ConnectorStore,
    observer: Observer,
    submitter: CcuSubmitter,
    own_chain_id: ChainId,
    ccu_frequency: u32,
    max_ccu_size: usize,
    status: Arc<RwLock<ConnectorStatus>>,
}

impl Connector<SendingChainClient, ReceivingChainClient> {
    /// Construct the connector against live chain endpoints. Key decryption,
    /// store opening, transport selection and the network identity check all
    /// happen here; their failures are fatal.
    ///
    /// # Errors
    /// * invalid configuration or undecryptable key
    /// * store cannot be opened
    /// * either chain unreachable
    /// * sending and receiving chains belong to different networks
    pub async fn load(
        config: &Config,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BlockEvent>), ConnectorError> {
        config.validate()?;
        let signing_key = decrypt_private_key(
            &config.encrypted_private_key,
            config.password.as_deref().unwrap_or_default(),
        )?;
        let store = ConnectorStore::open(&config.store_path)?;

        let sending = SendingChainClient::connect(&config.sending_chain_ws_url).await?;
        let receiving = match (
            config.receiving_chain_ws_url.as_ref(),
            config.receiving_chain_ipc_path.as_ref(),
        ) {
            (Some(url), None) => ReceivingChainClient::connect_ws(url).await?,
            (None, Some(path)) => ReceivingChainClient::connect_ipc(path.as_ref()).await?,
            _ => unreachable!("validated above"),
        };

        let own_account = sending.get_own_chain_account().await?;
        let receiving_chain_id = receiving.get_node_chain_id().await?;
        if receiving_chain_id.network_byte() != own_account.chain_id.network_byte() {
            return Err(ConnectorError::Config(format!(
                "chain id mismatch: sending chain {} and receiving chain {} are on different networks",
                own_account.chain_id, receiving_chain_id
            )));
        }

        let outbox_store_prefix = sending.get_outbox_store_prefix().await?;
        let observer = Observer::new(
            &outbox_store_prefix,
            own_account.chain_id,
            config.forward_bounced_ccms,
        );
        let submitter = CcuSubmitter::new(
            signing_key,
            own_account.chain_id,
            receiving_chain_id,
            config.ccu_fee,
            config.save_ccu,
        );

        let events = sending.subscribe_blocks().await?;
        info!(target: "connector", "connector loaded for chain {} (\"{}\")",
            own_account.chain_id, own_account.name);

        Ok((
            Connector::new(
                sending,
                receiving,
                store,
                observer,
                submitter,
                own_account.chain_id,
                config.ccu_frequency,
                config.max_ccu_size,
            ),
            events,
        ))
    }

    /// Close the store before shutdown. The caller drains the event queue
    /// first; handlers are never interrupted mid-flight, and dropping the
    /// connector terminates both chain connections and the subscription.
    ///
    /// # Errors
    /// * store flush failure
    pub fn unload(&self) -> Result<(), ConnectorError> {
        self.store.close()
    }
}

impl<S: SendingChainApi, R: ReceivingChainApi> Connector<S, R> {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        sending: S,
        receiving: R,
        store: ConnectorStore,
        observer: Observer,
        submitter: CcuSubmitter,
        own_chain_id: ChainId,
        ccu_frequency: u32,
        max_ccu_size: usize,
    ) -> Self {
        let dry_run = submitter.is_dry_run();
        Connector {
            sending,
            receiving,
            store,
            observer,
            submitter,
            own_chain_id,
            ccu_frequency,
            max_ccu_size,
            status: Arc::new(RwLock::new(ConnectorStatus {
                state: ConnectorState::Ready,
                observed_tip: None,
                last_certificate: None,
                last_sent_ccm: None,
                dry_run,
            })),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.store.clone(), Arc::clone(&self.status))
    }

    /// Consume the event queue until it closes. Recoverable errors are
    /// logged and retried on the next block; fatal errors are returned.
    ///
    /// # Errors
    /// * fatal store, key or configuration failure
    pub async fn run(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<BlockEvent>,
    ) -> Result<(), ConnectorError> {
        while let Some(event) = events.recv().await {
            if let Err(err) = self.handle_event(event).await {
                if err.is_fatal() {
                    return Err(err);
                }
                warn!(target: "connector", "{err}; retrying on next block");
                self.set_state(ConnectorState::Ready);
            }
        }
        Ok(())
    }

    /// # Errors
    /// * any handler failure; the caller decides between retry and abort
    pub async fn handle_event(&mut self, event: BlockEvent) -> Result<(), ConnectorError> {
        match event {
            BlockEvent::NewBlock(header) => self.on_new_block(header).await,
            BlockEvent::DeleteBlock(header) => self.on_delete_block(&header),
        }
    }

    async fn on_new_block(&mut self, header: BlockHeader) -> Result<(), ConnectorError> {
        self.set_state(ConnectorState::Observing);
        self.observer
            .on_new_block(&self.sending, &self.store, &header)
            .await?;
        {
            let mut status = self.status.write().expect("status lock poisoned");
            status.observed_tip = Some(header.height);
        }

        let last_certificate = self.last_certificate().await?;
        if header.height.saturating_sub(last_certificate.height) >= self.ccu_frequency {
            self.attempt_ccu(&last_certificate).await?;
        } else {
            debug!(target: "connector", "height {} within ccu frequency of certified height {}",
                header.height, last_certificate.height);
        }

        self.set_state(ConnectorState::Ready);
        Ok(())
    }

    fn on_delete_block(&mut self, header: &BlockHeader) -> Result<(), ConnectorError> {
        self.set_state(ConnectorState::Rollback);
        info!(target: "connector", "rollback of block at height {}", header.height);
        self.observer.on_delete_block(&self.store, header)?;
        {
            let mut status = self.status.write().expect("status lock poisoned");
            status.observed_tip = self
                .store
                .get_block_headers()?
                .last()
                .map(|header| header.height);
        }
        self.set_state(ConnectorState::Ready);
        Ok(())
    }

    /// The last certificate as the receiving chain sees it, fetched once and
    /// then maintained across submissions.
    async fn last_certificate(&mut self) -> Result<LastCertificate, ConnectorError> {
        if let Some(certificate) = self.store.get_last_certificate()? {
            return Ok(certificate);
        }
        let certificate = self.receiving.get_chain_account(self.own_chain_id).await?;
        self.store.set_last_certificate(&certificate)?;
        Ok(certificate)
    }

    async fn attempt_ccu(&mut self, last_certificate: &LastCertificate) -> Result<(), ConnectorError> {
        self.set_state(ConnectorState::Building);

        let headers = self.store.get_block_headers()?;
        let commits = self.store.get_aggregate_commits()?;
        let validators_data = self.store.get_validators_data()?;
        let bft_heights = self.sending.get_bft_heights().await?;

        let certificate = select_certificate(
            &headers,
            &commits,
            &validators_data,
            &bft_heights,
            last_certificate.height,
            self.own_chain_id,
        )?;

        let (active_validators_update, certificate_threshold) = match &certificate {
            Some(cert) if cert.validators_hash != last_certificate.validators_hash => {
                let prev = validators_data
                    .iter()
                    .find(|data| data.validators_hash == last_certificate.validators_hash)
                    .ok_or_else(|| {
                        ConnectorError::MissingDependency(format!(
                            "no validator set stored for certified hash {}",
                            last_certificate.validators_hash
                        ))
                    })?;
                let next = validators_data
                    .iter()
                    .find(|data| data.validators_hash == cert.validators_hash)
                    .ok_or_else(|| {
                        ConnectorError::MissingDependency(format!(
                            "no validator set stored for certificate hash {}",
                            cert.validators_hash
                        ))
                    })?;
                compute_validators_update(prev, next)
            }
            _ => (ActiveValidatorsUpdate::default(), 0),
        };

        let from = self.store.get_last_sent_ccm()?.unwrap_or(LastSentCcm {
            height: last_certificate.height,
            nonce: 0,
        });
        let base_params = CrossChainUpdateParams {
            sending_chain_id: self.own_chain_id,
            certificate: certificate
                .as_ref()
                .map(interop_types::Certificate::to_bytes)
                .unwrap_or_default(),
            active_validators_update,
            certificate_threshold,
            inbox_update: InboxUpdate::default(),
        };

        let ccm_records = self.store.get_ccms()?;
        let outcome = build_inbox_update(
            &ccm_records,
            from,
            certificate
                .as_ref()
                .map_or(last_certificate.height, |cert| cert.height),
            &base_params,
            self.max_ccu_size,
        );

        if certificate.is_none() && outcome.included == 0 {
            debug!(target: "connector", "no certificate and no pending ccms; skipping ccu");
            return Ok(());
        }

        let mut params = base_params;
        params.inbox_update = outcome.inbox_update;

        self.set_state(ConnectorState::Submitting);
        let submitted = self
            .submitter
            .submit(&self.receiving, &self.store, &params)
            .await;

        // C* mirrors the receiving chain after every attempted submission.
        self.set_state(ConnectorState::Cleanup);
        let refreshed = self.receiving.get_chain_account(self.own_chain_id).await?;
        self.store.set_last_certificate(&refreshed)?;

        match submitted {
            Ok(id) => {
                if !self.submitter.is_dry_run() {
                    if let Some(cursor) = outcome.last_included {
                        self.store.set_last_sent_ccm(&cursor)?;
                    }
                }
                info!(target: "connector", "ccu {id} submitted with {} of {} pending ccm(s), certificate {}",
                    outcome.included,
                    outcome.pending,
                    certificate.as_ref().map_or(0, |cert| cert.height));
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => log_submission_failure(&err),
        }

        run_cleanup(&self.store, &refreshed)?;

        let mut status = self.status.write().expect("status lock poisoned");
        status.last_certificate = Some(refreshed);
        status.last_sent_ccm = self.store.get_last_sent_ccm()?;
        Ok(())
    }

    fn set_state(&self, state: ConnectorState) {
        let mut status = self.status.write().expect("status lock poisoned");
        status.state = state;
    }
}

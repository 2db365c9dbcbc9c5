use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use blst::min_pk::{AggregateSignature, SecretKey};
use ed25519_dalek::SigningKey;

use chain_connector::ccu::CcuSubmitter;
use chain_connector::certificate::BLS_DST;
use chain_connector::error::ConnectorError;
use chain_connector::observer::Observer;
use chain_connector::orchestrator::Connector;
use chain_connector::receiving_client::ReceivingChainApi;
use chain_connector::sending_client::{BftHeights, BlockEvent, ChainEvent, SendingChainApi};
use chain_connector::store::ConnectorStore;

use interop_types::ccm::{EVENT_CCM_SEND_SUCCESS, MODULE_INTEROPERABILITY};
use interop_types::transaction::COMMAND_SUBMIT_MAINCHAIN_CCU;
use interop_types::{
    compute_validators_hash, ActiveValidator, AggregateCommit, AggregationBits, BlockHeader,
    BlsPublicKey, BlsSignature, CcmSendSuccessData, Certificate, ChainId, CrossChainMessage,
    CrossChainUpdateParams, LastCertificate, LastSentCcm, OutboxRootWitness, Transaction,
    ValidatorsData, H256,
};

#[macro_use]
extern crate lazy_static;

lazy_static! {
    static ref INIT: () = {
        let _ = env_logger::builder().is_test(true).try_init();
    };
}

const OWN_CHAIN_ID: ChainId = ChainId([1, 0, 0, 1]);
const MAINCHAIN_ID: ChainId = ChainId([1, 0, 0, 0]);
const CCU_FREQUENCY: u32 = 10;
const MAX_CCU_SIZE: usize = 10_240;

struct StubSendingChain {
    events_by_height: HashMap<u32, Vec<ChainEvent>>,
    parameters_by_height: HashMap<u32, ValidatorsData>,
    default_parameters: ValidatorsData,
    bft_heights: Mutex<BftHeights>,
    inclusion_proof: OutboxRootWitness,
}

impl StubSendingChain {
    fn new(default_parameters: ValidatorsData) -> Self {
        StubSendingChain {
            events_by_height: HashMap::new(),
            parameters_by_height: HashMap::new(),
            default_parameters,
            bft_heights: Mutex::new(BftHeights {
                max_height_prevoted: 0,
                max_height_precommitted: 0,
                max_height_certified: 0,
            }),
            inclusion_proof: OutboxRootWitness {
                bitmap: vec![0x01],
                sibling_hashes: vec![H256([0xaa; 32])],
            },
        }
    }

    fn set_certified_height(&self, height: u32) {
        let mut heights = self.bft_heights.lock().unwrap();
        heights.max_height_certified = height;
        heights.max_height_precommitted = height + 1;
        heights.max_height_prevoted = height + 2;
    }
}

impl SendingChainApi for StubSendingChain {
    async fn get_events(&self, height: u32) -> Result<Vec<ChainEvent>, ConnectorError> {
        Ok(self.events_by_height.get(&height).cloned().unwrap_or_default())
    }

    async fn get_bft_parameters(&self, height: u32) -> Result<ValidatorsData, ConnectorError> {
        Ok(self
            .parameters_by_height
            .get(&height)
            .unwrap_or(&self.default_parameters)
            .clone())
    }

    async fn get_bft_heights(&self) -> Result<BftHeights, ConnectorError> {
        Ok(*self.bft_heights.lock().unwrap())
    }

    async fn get_inclusion_proof(
        &self,
        _key: &[u8],
    ) -> Result<OutboxRootWitness, ConnectorError> {
        Ok(self.inclusion_proof.clone())
    }
}

struct StubReceivingChain {
    chain_account: Mutex<LastCertificate>,
    nonce: Mutex<u64>,
    posted: Arc<Mutex<Vec<String>>>,
    reject_posts: bool,
}

impl StubReceivingChain {
    fn new(last_certificate: LastCertificate) -> Self {
        StubReceivingChain {
            chain_account: Mutex::new(last_certificate),
            nonce: Mutex::new(0),
            posted: Arc::new(Mutex::new(Vec::new())),
            reject_posts: false,
        }
    }

    fn posted_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.posted)
    }
}

impl ReceivingChainApi for StubReceivingChain {
    async fn get_chain_account(
        &self,
        _chain_id: ChainId,
    ) -> Result<LastCertificate, ConnectorError> {
        Ok(self.chain_account.lock().unwrap().clone())
    }

    async fn get_auth_nonce(&self, _address: &str) -> Result<u64, ConnectorError> {
        Ok(*self.nonce.lock().unwrap())
    }

    async fn get_node_chain_id(&self) -> Result<ChainId, ConnectorError> {
        Ok(MAINCHAIN_ID)
    }

    async fn post_transaction(&self, transaction: &str) -> Result<String, ConnectorError> {
        if self.reject_posts {
            return Err(ConnectorError::Rpc {
                code: -32600,
                message: "transaction pool is full".to_string(),
            });
        }
        self.posted.lock().unwrap().push(transaction.to_string());
        *self.nonce.lock().unwrap() += 1;
        Ok("stub-transaction-id".to_string())
    }
}

fn secret_key(seed: u8) -> SecretKey {
    SecretKey::key_gen(&[seed; 32], &[]).unwrap()
}

fn validator_set(secret_keys: &[SecretKey], threshold: u64) -> ValidatorsData {
    let mut validators: Vec<ActiveValidator> = secret_keys
        .iter()
        .map(|sk| ActiveValidator {
            bls_key: BlsPublicKey(sk.sk_to_pk().to_bytes()),
            bft_weight: 10,
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

fn chained_headers(count: u32, validators_hash: &H256) -> Vec<BlockHeader> {
    let mut headers: Vec<BlockHeader> = Vec::new();
    for height in 1..=count {
        let previous_block_id = headers
            .last()
            .map(BlockHeader::id)
            .unwrap_or_else(|| H256([0u8; 32]));
        headers.push(BlockHeader {
            height,
            timestamp: 1_700_000_000 + height * 10,
            previous_block_id,
            state_root: H256([height as u8; 32]),
            validators_hash: validators_hash.clone(),
            aggregate_commit: None,
        });
    }
    headers
}

/// Aggregate-sign the certificate of `certified` with every validator.
fn signed_commit(certified: &BlockHeader, secret_keys: &[SecretKey]) -> AggregateCommit {
    let bits = AggregationBits(vec![0b11]);
    let unsigned = AggregateCommit {
        height: certified.height,
        aggregation_bits: bits.clone(),
        certificate_signature: BlsSignature(Vec::new()),
    };
    let certificate = Certificate::from_header(certified, &unsigned);
    let message = certificate.signing_bytes(OWN_CHAIN_ID);

    let mut by_key: Vec<&SecretKey> = secret_keys.iter().collect();
    by_key.sort_by_key(|sk| sk.sk_to_pk().to_bytes());
    let signatures: Vec<_> = by_key
        .iter()
        .map(|sk| sk.sign(&message, BLS_DST, &[]))
        .collect();
    let signature_refs: Vec<_> = signatures.iter().collect();
    let aggregate = AggregateSignature::aggregate(&signature_refs, true).unwrap();

    AggregateCommit {
        height: certified.height,
        aggregation_bits: bits,
        certificate_signature: BlsSignature(aggregate.to_signature().to_bytes().to_vec()),
    }
}

fn send_success_event(nonce: u64) -> ChainEvent {
    let ccm = CrossChainMessage {
        module: "token".to_string(),
        command: "crossChainTransfer".to_string(),
        nonce,
        fee: 1000,
        sending_chain_id: OWN_CHAIN_ID,
        receiving_chain_id: MAINCHAIN_ID,
        params: vec![0xab; 16],
        status: 0,
    };
    ChainEvent {
        module: MODULE_INTEROPERABILITY.to_string(),
        name: EVENT_CCM_SEND_SUCCESS.to_string(),
        data: hex::encode(borsh::to_vec(&CcmSendSuccessData { ccm }).unwrap()),
    }
}

fn genesis_certificate(validators_hash: &H256) -> LastCertificate {
    certificate_at(0, validators_hash)
}

fn certificate_at(height: u32, validators_hash: &H256) -> LastCertificate {
    LastCertificate {
        height,
        timestamp: height * 10,
        state_root: H256([height as u8; 32]),
        validators_hash: validators_hash.clone(),
    }
}

/// Build a connector over stub chains; the returned store handle shares the
/// connector's database.
fn connector(
    sending: StubSendingChain,
    receiving: StubReceivingChain,
    save_ccu: bool,
) -> (Connector<StubSendingChain, StubReceivingChain>, ConnectorStore) {
    lazy_static::initialize(&INIT);
    let store = ConnectorStore::temporary().unwrap();
    let store_handle = store.clone();
    let observer = Observer::new(&[0x83, 0xed, 0x00, 0x00], OWN_CHAIN_ID, false);
    let submitter = CcuSubmitter::new(
        SigningKey::from_bytes(&[9u8; 32]),
        OWN_CHAIN_ID,
        MAINCHAIN_ID,
        50_000_000,
        save_ccu,
    );
    let connector = Connector::new(
        sending,
        receiving,
        store,
        observer,
        submitter,
        OWN_CHAIN_ID,
        CCU_FREQUENCY,
        MAX_CCU_SIZE,
    );
    (connector, store_handle)
}

fn decode_params(transaction: &Transaction) -> CrossChainUpdateParams {
    borsh::from_slice(&transaction.params).expect("ccu params decode")
}

async fn feed_new_blocks(
    connector: &mut Connector<StubSendingChain, StubReceivingChain>,
    headers: &[BlockHeader],
) {
    for header in headers {
        connector
            .handle_event(BlockEvent::NewBlock(header.clone()))
            .await
            .expect("new block handled");
    }
}

// Cold start: ten empty blocks, then a block carrying a verifiable
// aggregate commit for height 10. The first CCU carries the certificate,
// no validator diff and no messages.
#[tokio::test]
async fn cold_start_produces_certificate_only_ccu() {
    let secret_keys = [secret_key(1), secret_key(2)];
    let validators = validator_set(&secret_keys, 15);
    let mut headers = chained_headers(11, &validators.validators_hash);
    let commit = signed_commit(&headers[9], &secret_keys);
    headers[10].aggregate_commit = Some(commit.clone());

    let sending = StubSendingChain::new(validators.clone());
    sending.set_certified_height(10);
    let receiving = StubReceivingChain::new(genesis_certificate(&validators.validators_hash));
    let (mut connector, _store) = connector(sending, receiving, false);

    feed_new_blocks(&mut connector, &headers).await;

    let endpoint = connector.endpoint();
    let sent = endpoint.get_sent_ccus().unwrap();
    assert_eq!(sent.len(), 1, "exactly one ccu should be submitted");

    let transaction: Transaction = borsh::from_slice(&sent[0].transaction).unwrap();
    assert_eq!(transaction.command, COMMAND_SUBMIT_MAINCHAIN_CCU);

    let params = decode_params(&transaction);
    let expected = Certificate::from_header(&headers[9], &commit);
    assert_eq!(params.certificate, expected.to_bytes());
    assert!(params.active_validators_update.is_empty());
    assert_eq!(params.certificate_threshold, 0);
    assert!(params.inbox_update.cross_chain_messages.is_empty());
    assert!(params.inbox_update.message_witness_hashes.is_empty());
}

// No verifiable certificate but CCMs pending below the standing certified
// height: the connector falls back to a partial-only CCU and advances the
// sent-CCM cursor.
#[tokio::test]
async fn pending_ccms_without_certificate_yield_partial_ccu() {
    let secret_keys = [secret_key(1), secret_key(2)];
    let validators = validator_set(&secret_keys, 15);
    let headers = chained_headers(15, &validators.validators_hash);

    let mut sending = StubSendingChain::new(validators.clone());
    sending
        .events_by_height
        .insert(5, vec![send_success_event(1), send_success_event(2)]);
    let receiving =
        StubReceivingChain::new(certificate_at(5, &validators.validators_hash));
    let (mut connector, _store) = connector(sending, receiving, false);

    feed_new_blocks(&mut connector, &headers).await;

    let endpoint = connector.endpoint();
    let sent = endpoint.get_sent_ccus().unwrap();
    assert_eq!(sent.len(), 1);

    let transaction: Transaction = borsh::from_slice(&sent[0].transaction).unwrap();
    let params = decode_params(&transaction);
    assert!(params.certificate.is_empty());
    assert_eq!(params.certificate_threshold, 0);
    assert!(params.active_validators_update.is_empty());
    assert_eq!(params.inbox_update.cross_chain_messages.len(), 2);

    let status = endpoint.get_status();
    assert_eq!(status.last_sent_ccm, Some(LastSentCcm { height: 5, nonce: 2 }));
}

// No certificate and nothing pending: the cadence hit is skipped entirely.
#[tokio::test]
async fn nothing_to_relay_skips_submission() {
    let secret_keys = [secret_key(1), secret_key(2)];
    let validators = validator_set(&secret_keys, 15);
    let headers = chained_headers(10, &validators.validators_hash);

    let sending = StubSendingChain::new(validators.clone());
    let receiving = StubReceivingChain::new(genesis_certificate(&validators.validators_hash));
    let (mut connector, _store) = connector(sending, receiving, false);

    feed_new_blocks(&mut connector, &headers).await;

    assert!(connector.endpoint().get_sent_ccus().unwrap().is_empty());
}

// Rollback removes exactly the header, commit and validator set of the
// deleted height; CCM records stay until the next cleanup.
#[tokio::test]
async fn rollback_removes_height_scoped_records() {
    let secret_keys = [secret_key(1), secret_key(2)];
    let validators = validator_set(&secret_keys, 15);
    let rotated = validator_set(&[secret_key(3), secret_key(4)], 15);

    let mut headers = chained_headers(5, &validators.validators_hash);
    headers[4].validators_hash = rotated.validators_hash.clone();
    headers[4].aggregate_commit = Some(AggregateCommit {
        height: 5,
        aggregation_bits: AggregationBits(vec![0b11]),
        certificate_signature: BlsSignature(vec![1u8; 96]),
    });

    let mut sending = StubSendingChain::new(validators.clone());
    sending.parameters_by_height.insert(5, rotated.clone());
    sending.events_by_height.insert(5, vec![send_success_event(0)]);
    let receiving = StubReceivingChain::new(genesis_certificate(&validators.validators_hash));
    let (mut connector, store) = connector(sending, receiving, false);

    feed_new_blocks(&mut connector, &headers).await;
    assert_eq!(connector.endpoint().get_status().observed_tip, Some(5));

    connector
        .handle_event(BlockEvent::DeleteBlock(headers[4].clone()))
        .await
        .unwrap();

    assert_eq!(connector.endpoint().get_status().observed_tip, Some(4));
    assert!(connector.endpoint().get_sent_ccus().unwrap().is_empty());

    let heights: Vec<u32> = store
        .get_block_headers()
        .unwrap()
        .iter()
        .map(|header| header.height)
        .collect();
    assert_eq!(heights, vec![1, 2, 3, 4]);
    assert!(store.get_aggregate_commits().unwrap().is_empty());
    assert!(store
        .get_validators_data()
        .unwrap()
        .iter()
        .all(|data| data.validators_hash != rotated.validators_hash));
    let ccm_heights: Vec<u32> = store
        .get_ccms()
        .unwrap()
        .iter()
        .map(|record| record.height)
        .collect();
    assert_eq!(ccm_heights, vec![5]);
}

// Feeding the same block twice leaves the store identical to feeding it
// once.
#[tokio::test]
async fn replayed_block_is_idempotent() {
    let secret_keys = [secret_key(1), secret_key(2)];
    let validators = validator_set(&secret_keys, 15);
    let headers = chained_headers(5, &validators.validators_hash);

    let mut sending = StubSendingChain::new(validators.clone());
    sending.events_by_height.insert(4, vec![send_success_event(0)]);
    let receiving = StubReceivingChain::new(genesis_certificate(&validators.validators_hash));
    let (mut connector, store) = connector(sending, receiving, false);

    feed_new_blocks(&mut connector, &headers).await;
    let headers_before = store.get_block_headers().unwrap();
    let commits_before = store.get_aggregate_commits().unwrap();
    let validators_before = store.get_validators_data().unwrap();
    let ccms_before = store.get_ccms().unwrap();

    connector
        .handle_event(BlockEvent::NewBlock(headers[3].clone()))
        .await
        .unwrap();

    assert_eq!(store.get_block_headers().unwrap(), headers_before);
    assert_eq!(store.get_aggregate_commits().unwrap(), commits_before);
    assert_eq!(store.get_validators_data().unwrap(), validators_before);
    assert_eq!(store.get_ccms().unwrap(), ccms_before);
}

// A rejected submission keeps the cursor unchanged and retries later.
#[tokio::test]
async fn rejected_submission_keeps_cursor() {
    let secret_keys = [secret_key(1), secret_key(2)];
    let validators = validator_set(&secret_keys, 15);
    let headers = chained_headers(15, &validators.validators_hash);

    let mut sending = StubSendingChain::new(validators.clone());
    sending.events_by_height.insert(5, vec![send_success_event(1)]);
    let mut receiving =
        StubReceivingChain::new(certificate_at(5, &validators.validators_hash));
    receiving.reject_posts = true;
    let (mut connector, store) = connector(sending, receiving, false);

    feed_new_blocks(&mut connector, &headers).await;

    assert_eq!(connector.endpoint().get_status().last_sent_ccm, None);
    assert_eq!(store.get_last_sent_ccm().unwrap(), None);
}

// Dry run records the CCU without posting and without advancing the cursor.
#[tokio::test]
async fn dry_run_records_without_posting() {
    let secret_keys = [secret_key(1), secret_key(2)];
    let validators = validator_set(&secret_keys, 15);
    let headers = chained_headers(15, &validators.validators_hash);

    let mut sending = StubSendingChain::new(validators.clone());
    sending.events_by_height.insert(5, vec![send_success_event(1)]);
    let receiving =
        StubReceivingChain::new(certificate_at(5, &validators.validators_hash));
    let posted = receiving.posted_handle();
    let (mut connector, store) = connector(sending, receiving, true);

    feed_new_blocks(&mut connector, &headers).await;

    assert_eq!(connector.endpoint().get_sent_ccus().unwrap().len(), 1);
    assert_eq!(store.get_last_sent_ccm().unwrap(), None);
    assert!(posted.lock().unwrap().is_empty());
}

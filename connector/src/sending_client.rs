use interop_types::{BlockHeader, ChainId, OutboxRootWitness, ValidatorsData};
use log::warn;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::error::ConnectorError;
use crate::rpc::WsRpc;

pub const TOPIC_NEW_BLOCK: &str = "chain_newBlock";
pub const TOPIC_DELETE_BLOCK: &str = "chain_deleteBlock";

/// An event emitted by a module during block execution.
#[derive(Deserialize, Clone, Debug)]
pub struct ChainEvent {
    pub module: String,
    pub name: String,
    /// Hex-encoded event payload.
    pub data: String,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BftHeights {
    pub max_height_prevoted: u32,
    pub max_height_precommitted: u32,
    pub max_height_certified: u32,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OwnChainAccount {
    pub chain_id: ChainId,
    pub name: String,
    pub nonce: u64,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    pub name: String,
    /// Hex-encoded prefix of the module's state store keys.
    pub store_key_prefix: String,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Deserialize, Clone, Debug)]
struct MetadataResponse {
    modules: Vec<ModuleMetadata>,
}

/// A sending-chain subscription event, delivered in block-height order.
#[derive(Clone, Debug)]
pub enum BlockEvent {
    NewBlock(BlockHeader),
    DeleteBlock(BlockHeader),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockEventPayload {
    block_header: BlockHeader,
}

/// The sending-chain surface the connector consumes on every block.
#[allow(async_fn_in_trait)]
pub trait SendingChainApi {
    async fn get_events(&self, height: u32) -> Result<Vec<ChainEvent>, ConnectorError>;
    async fn get_bft_parameters(&self, height: u32) -> Result<ValidatorsData, ConnectorError>;
    async fn get_bft_heights(&self) -> Result<BftHeights, ConnectorError>;
    /// State proof for a single key, returned as the outbox-root witness.
    async fn get_inclusion_proof(&self, key: &[u8]) -> Result<OutboxRootWitness, ConnectorError>;
}

pub struct SendingChainClient {
    rpc: WsRpc,
}

impl SendingChainClient {
    /// # Errors
    /// * endpoint unreachable
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        Ok(SendingChainClient {
            rpc: WsRpc::connect(url).await?,
        })
    }

    /// # Errors
    /// * connection issue
    pub async fn get_own_chain_account(&self) -> Result<OwnChainAccount, ConnectorError> {
        self.rpc
            .request("interoperability_getOwnChainAccount", json!({}))
            .await
    }

    /// Store key prefix of the interoperability module, taken from the node
    /// metadata.
    ///
    /// # Errors
    /// * connection issue
    /// * metadata carries no interoperability module
    pub async fn get_outbox_store_prefix(&self) -> Result<Vec<u8>, ConnectorError> {
        let metadata: MetadataResponse = self.rpc.request("system_getMetadata", json!({})).await?;
        let module = metadata
            .modules
            .into_iter()
            .find(|module| module.name == interop_types::ccm::MODULE_INTEROPERABILITY)
            .ok_or_else(|| {
                ConnectorError::MissingDependency(
                    "interoperability module metadata not found".to_string(),
                )
            })?;
        hex::decode(&module.store_key_prefix)
            .map_err(|_| ConnectorError::Decode("store key prefix is not valid hex".to_string()))
    }

    /// Subscribe to new-block and delete-block events. Undecodable payloads
    /// are logged and dropped; each stream is delivered in block-height
    /// order.
    ///
    /// # Errors
    /// * connection issue
    pub async fn subscribe_blocks(
        &self,
    ) -> Result<mpsc::UnboundedReceiver<BlockEvent>, ConnectorError> {
        let mut new_blocks = self
            .rpc
            .subscribe_to_method::<BlockEventPayload>(TOPIC_NEW_BLOCK)
            .await?;
        let mut deleted_blocks = self
            .rpc
            .subscribe_to_method::<BlockEventPayload>(TOPIC_DELETE_BLOCK)
            .await?;
        let _: Value = self
            .rpc
            .request(
                "subscribe",
                json!({ "topics": [TOPIC_NEW_BLOCK, TOPIC_DELETE_BLOCK] }),
            )
            .await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    item = new_blocks.next() => match item {
                        Some(Ok(payload)) => BlockEvent::NewBlock(payload.block_header),
                        Some(Err(err)) => {
                            warn!(target: "connector", "undecodable {TOPIC_NEW_BLOCK} payload: {err}");
                            continue;
                        }
                        None => break,
                    },
                    item = deleted_blocks.next() => match item {
                        Some(Ok(payload)) => BlockEvent::DeleteBlock(payload.block_header),
                        Some(Err(err)) => {
                            warn!(target: "connector", "undecodable {TOPIC_DELETE_BLOCK} payload: {err}");
                            continue;
                        }
                        None => break,
                    },
                };
                if sender.send(event).is_err() {
                    break;
                }
            }
        });
        Ok(receiver)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProveResponse {
    proof: StateProof,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateProof {
    sibling_hashes: Vec<interop_types::H256>,
    queries: Vec<ProofQuery>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProofQuery {
    bitmap: String,
    #[allow(dead_code)]
    key: String,
    #[allow(dead_code)]
    value: String,
}

impl SendingChainApi for SendingChainClient {
    async fn get_events(&self, height: u32) -> Result<Vec<ChainEvent>, ConnectorError> {
        self.rpc
            .request("chain_getEvents", json!({ "height": height }))
            .await
    }

    async fn get_bft_parameters(&self, height: u32) -> Result<ValidatorsData, ConnectorError> {
        self.rpc
            .request("consensus_getBFTParameters", json!({ "height": height }))
            .await
    }

    async fn get_bft_heights(&self) -> Result<BftHeights, ConnectorError> {
        self.rpc.request("consensus_getBFTHeights", json!({})).await
    }

    async fn get_inclusion_proof(&self, key: &[u8]) -> Result<OutboxRootWitness, ConnectorError> {
        let response: ProveResponse = self
            .rpc
            .request("state_prove", json!({ "queries": [hex::encode(key)] }))
            .await?;
        let query = response.proof.queries.into_iter().next().ok_or_else(|| {
            ConnectorError::Decode("state proof carries no query result".to_string())
        })?;
        Ok(OutboxRootWitness {
            bitmap: hex::decode(&query.bitmap)
                .map_err(|_| ConnectorError::Decode("proof bitmap is not valid hex".to_string()))?,
            sibling_hashes: response.proof.sibling_hashes,
        })
    }
}

use interop_types::{ChainId, LastCertificate};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use crate::error::ConnectorError;
use crate::rpc::{IpcRpc, RpcTransport, WsRpc};

/// The receiving-chain surface used for submissions and `C*` refreshes.
#[allow(async_fn_in_trait)]
pub trait ReceivingChainApi {
    /// The receiving chain's last accepted certificate for `chain_id`.
    async fn get_chain_account(&self, chain_id: ChainId)
        -> Result<LastCertificate, ConnectorError>;
    async fn get_auth_nonce(&self, address: &str) -> Result<u64, ConnectorError>;
    async fn get_node_chain_id(&self) -> Result<ChainId, ConnectorError>;
    /// Post a hex-encoded transaction to the pool, returning its id.
    async fn post_transaction(&self, transaction: &str) -> Result<String, ConnectorError>;
}

pub struct ReceivingChainClient {
    rpc: RpcTransport,
}

impl ReceivingChainClient {
    /// # Errors
    /// * endpoint unreachable
    pub async fn connect_ws(url: &str) -> Result<Self, ConnectorError> {
        Ok(ReceivingChainClient {
            rpc: RpcTransport::Ws(WsRpc::connect(url).await?),
        })
    }

    /// # Errors
    /// * socket unreachable
    pub async fn connect_ipc(path: &Path) -> Result<Self, ConnectorError> {
        Ok(ReceivingChainClient {
            rpc: RpcTransport::Ipc(IpcRpc::connect(path).await?),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainAccountResponse {
    last_certificate: LastCertificate,
}

#[derive(Deserialize)]
struct AuthAccountResponse {
    nonce: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeInfoResponse {
    chain_id: ChainId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostTransactionResponse {
    transaction_id: String,
}

impl ReceivingChainApi for ReceivingChainClient {
    async fn get_chain_account(
        &self,
        chain_id: ChainId,
    ) -> Result<LastCertificate, ConnectorError> {
        let response: ChainAccountResponse = self
            .rpc
            .request(
                "interoperability_getChainAccount",
                json!({ "chainID": chain_id }),
            )
            .await?;
        Ok(response.last_certificate)
    }

    async fn get_auth_nonce(&self, address: &str) -> Result<u64, ConnectorError> {
        let response: AuthAccountResponse = self
            .rpc
            .request("auth_getAuthAccount", json!({ "address": address }))
            .await?;
        Ok(response.nonce)
    }

    async fn get_node_chain_id(&self) -> Result<ChainId, ConnectorError> {
        let response: NodeInfoResponse = self.rpc.request("system_getNodeInfo", json!({})).await?;
        Ok(response.chain_id)
    }

    async fn post_transaction(&self, transaction: &str) -> Result<String, ConnectorError> {
        let response: PostTransactionResponse = self
            .rpc
            .request(
                "txpool_postTransaction",
                json!({ "transaction": transaction }),
            )
            .await?;
        Ok(response.transaction_id)
    }
}

//! RPC clients towards both chains.
//!
//! WebSocket endpoints are served by `jsonrpsee`'s client: id-correlated
//! requests plus persistent method notifications for the block
//! subscriptions. The receiving chain may instead be reached over a Unix
//! socket carrying newline-delimited JSON-RPC frames, a transport jsonrpsee
//! does not provide; [`IpcRpc`] is a minimal request/response client for
//! that path only.

use jsonrpsee::core::client::{ClientT, Subscription, SubscriptionClientT};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use crate::error::ConnectorError;

pub struct WsRpc {
    inner: WsClient,
}

impl WsRpc {
    /// # Errors
    /// * endpoint unreachable or handshake failure
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let inner = WsClientBuilder::default().build(url).await?;
        debug!(target: "connector", "connected to {url}");
        Ok(WsRpc { inner })
    }

    /// Issue a request and decode its result.
    ///
    /// # Errors
    /// * transport failure or closed connection
    /// * error response from the node
    /// * result does not match the expected shape
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ConnectorError> {
        Ok(self.inner.request(method, object_params(&params)?).await?)
    }

    /// Persistent stream of `method` notifications pushed by the node.
    ///
    /// # Errors
    /// * transport failure or closed connection
    pub async fn subscribe_to_method<N: DeserializeOwned>(
        &self,
        method: &str,
    ) -> Result<Subscription<N>, ConnectorError> {
        Ok(self.inner.subscribe_to_method(method).await?)
    }
}

/// The chain nodes take named parameter objects; jsonrpsee's builders are
/// positional by default, so requests go through [`ObjectParams`].
fn object_params<P: Serialize>(params: &P) -> Result<ObjectParams, ConnectorError> {
    let value = serde_json::to_value(params)?;
    let mut object = ObjectParams::new();
    if let Value::Object(map) = value {
        for (name, item) in map {
            object.insert(&name, item)?;
        }
    }
    Ok(object)
}

/// Either receiving-chain transport behind one request surface.
pub enum RpcTransport {
    Ws(WsRpc),
    Ipc(IpcRpc),
}

impl RpcTransport {
    /// # Errors
    /// * transport failure, error response, or shape mismatch
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ConnectorError> {
        match self {
            RpcTransport::Ws(client) => client.request(method, params).await,
            RpcTransport::Ipc(client) => client.request(method, params).await,
        }
    }
}

/// Request/response JSON-RPC over a Unix socket with newline-delimited
/// frames. Requests are serialized over the connection, which the
/// connector's one-handler-at-a-time contract already guarantees; the
/// receiving-chain surface carries no subscriptions.
pub struct IpcRpc {
    next_id: AtomicU64,
    connection: Mutex<IpcConnection>,
}

struct IpcConnection {
    reader: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl IpcRpc {
    /// # Errors
    /// * socket unreachable
    pub async fn connect(path: &Path) -> Result<Self, ConnectorError> {
        let stream = UnixStream::connect(path).await?;
        let (read, write) = stream.into_split();
        debug!(target: "connector", "connected to {}", path.display());
        Ok(IpcRpc {
            next_id: AtomicU64::new(1),
            connection: Mutex::new(IpcConnection {
                reader: BufReader::new(read).lines(),
                writer: write,
            }),
        })
    }

    /// # Errors
    /// * transport failure or closed connection
    /// * error response from the node
    /// * result does not match the expected shape
    pub async fn request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R, ConnectorError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": serde_json::to_value(params)?,
        })
        .to_string();

        let mut connection = self.connection.lock().await;
        connection.writer.write_all(frame.as_bytes()).await?;
        connection.writer.write_all(b"\n").await?;

        loop {
            let Some(line) = connection.reader.next_line().await? else {
                return Err(ConnectorError::Closed);
            };
            let response: Value = serde_json::from_str(&line)?;
            if response.get("id").and_then(Value::as_u64) != Some(id) {
                warn!(target: "connector", "dropping ipc frame without matching request id");
                continue;
            }
            if let Some(error) = response.get("error") {
                return Err(ConnectorError::Rpc {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown")
                        .to_string(),
                });
            }
            let result = response.get("result").cloned().unwrap_or(Value::Null);
            return Ok(serde_json::from_value(result)?);
        }
    }
}

//! Peer client for TrinityChain nodes
//!
//! Every request opens a fresh TCP connection, writes one frame and reads one
//! frame back. A frame is a big-endian `u32` length followed by a
//! bincode-encoded [`WireMessage`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::crypto::{short_hex, Sha256Hash};
use crate::error::ClientError;
use crate::transaction::SignedTransaction;

pub const INTER_NODES_REQ: u8 = 32;
pub const INTER_NODES_RES: u8 = 33;
pub const TX_ACK: u8 = 100;
pub const NOT_FOUND: u8 = 110;
pub const REJECTED: u8 = 111;

/// Upper bound on a single frame, in bytes.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub type_id: u8,
    pub payload: Vec<u8>,
}

impl WireMessage {
    pub fn new(type_id: u8, payload: Vec<u8>) -> Self {
        Self { type_id, payload }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("timed out talking to {0}")]
    Timeout(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(String),
    #[error("frame of {0} bytes exceeds the size limit")]
    FrameTooLarge(usize),
    #[error("peer rejected request: {0}")]
    Rejected(String),
    #[error("unexpected response type {0}")]
    UnexpectedResponse(u8),
}

impl From<Box<bincode::ErrorKind>> for TransportError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        TransportError::Codec(err.to_string())
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::network(err.to_string())
    }
}

pub async fn write_frame<W>(writer: &mut W, message: &WireMessage) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let body = bincode::serialize(message)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(body.len()));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_frame<R>(reader: &mut R) -> Result<WireMessage, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(bincode::deserialize(&body)?)
}

/// Submits signed transactions to the network.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn send(&self, endpoint: &str, tx: &SignedTransaction) -> Result<(), TransportError>;
}

/// Supplies Merkle sibling paths for a transaction in a block.
#[async_trait]
pub trait ProofSource: Send + Sync {
    /// Flat `[sibling, parent, sibling, parent, ...]` list from leaf to root.
    async fn intermediate_nodes(
        &self,
        endpoint: &str,
        block_hash: &Sha256Hash,
        tx_hash: &Sha256Hash,
    ) -> Result<Vec<Sha256Hash>, TransportError>;
}

#[derive(Debug, Clone)]
pub struct PeerClient {
    timeout: Duration,
}

impl PeerClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// One request/response exchange, bounded by the client timeout.
    pub async fn request(
        &self,
        endpoint: &str,
        message: &WireMessage,
    ) -> Result<WireMessage, TransportError> {
        let exchange = async {
            let mut stream = TcpStream::connect(endpoint).await.map_err(|e| {
                TransportError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }
            })?;
            write_frame(&mut stream, message).await?;
            read_frame(&mut stream).await
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(endpoint.to_string()))?
    }
}

fn rejection(response: WireMessage) -> TransportError {
    match response.type_id {
        NOT_FOUND | REJECTED => {
            TransportError::Rejected(String::from_utf8_lossy(&response.payload).into_owned())
        }
        other => TransportError::UnexpectedResponse(other),
    }
}

#[async_trait]
impl Broadcaster for PeerClient {
    async fn send(&self, endpoint: &str, tx: &SignedTransaction) -> Result<(), TransportError> {
        let message = WireMessage::new(tx.kind().broadcast_code(), tx.encode());
        debug!(endpoint, kind = %tx.kind(), tx_hash = %short_hex(&tx.hash()), "broadcasting");

        let response = self.request(endpoint, &message).await?;
        if response.type_id == TX_ACK {
            Ok(())
        } else {
            let err = rejection(response);
            warn!(endpoint, error = %err, "broadcast not acknowledged");
            Err(err)
        }
    }
}

#[async_trait]
impl ProofSource for PeerClient {
    async fn intermediate_nodes(
        &self,
        endpoint: &str,
        block_hash: &Sha256Hash,
        tx_hash: &Sha256Hash,
    ) -> Result<Vec<Sha256Hash>, TransportError> {
        let mut payload = Vec::with_capacity(64);
        payload.extend_from_slice(block_hash);
        payload.extend_from_slice(tx_hash);

        let response = self
            .request(endpoint, &WireMessage::new(INTER_NODES_REQ, payload))
            .await?;
        if response.type_id != INTER_NODES_RES {
            return Err(rejection(response));
        }
        Ok(bincode::deserialize(&response.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{ConfigTx, TxKind, UnsignedTransaction};
    use tokio::net::TcpListener;

    fn signed_config() -> SignedTransaction {
        UnsignedTransaction::Config(ConfigTx {
            header: 0,
            id: 2,
            payload: 30,
            fee: 1,
            tx_cnt: 0,
        })
        .sign([0x33; 64])
    }

    /// Accepts one connection, records the request and answers with `reply`.
    async fn one_shot_peer(
        reply: WireMessage,
    ) -> (String, tokio::task::JoinHandle<WireMessage>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut socket).await.unwrap();
            write_frame(&mut socket, &reply).await.unwrap();
            request
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn test_frame_round_trip_in_memory() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let message = WireMessage::new(7, vec![1, 2, 3]);

        write_frame(&mut client, &message).await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap(), message);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected_on_read() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, TransportError::FrameTooLarge(_)));
    }

    #[tokio::test]
    async fn test_broadcast_acknowledged() {
        let (addr, peer) = one_shot_peer(WireMessage::new(TX_ACK, Vec::new())).await;
        let client = PeerClient::new(Duration::from_secs(5));
        let tx = signed_config();

        client.send(&addr, &tx).await.unwrap();

        let request = peer.await.unwrap();
        assert_eq!(request.type_id, TxKind::Config.broadcast_code());
        assert_eq!(request.payload, tx.encode());
    }

    #[tokio::test]
    async fn test_broadcast_rejected() {
        let reply = WireMessage::new(REJECTED, b"bad signature".to_vec());
        let (addr, _peer) = one_shot_peer(reply).await;
        let client = PeerClient::new(Duration::from_secs(5));

        let err = client.send(&addr, &signed_config()).await.unwrap_err();
        assert_eq!(err.to_string(), "peer rejected request: bad signature");
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let client = PeerClient::new(Duration::from_secs(5));
        let err = client.send(&addr, &signed_config()).await.unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let _peer = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = PeerClient::new(Duration::from_millis(200));
        let err = client.send(&addr, &signed_config()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_intermediate_nodes_request() {
        let nodes = vec![[1u8; 32], [2u8; 32], [3u8; 32], [4u8; 32]];
        let reply = WireMessage::new(INTER_NODES_RES, bincode::serialize(&nodes).unwrap());
        let (addr, peer) = one_shot_peer(reply).await;
        let client = PeerClient::new(Duration::from_secs(5));

        let block_hash = [0xB0; 32];
        let tx_hash = [0x70; 32];
        let fetched = client
            .intermediate_nodes(&addr, &block_hash, &tx_hash)
            .await
            .unwrap();
        assert_eq!(fetched, nodes);

        let request = peer.await.unwrap();
        assert_eq!(request.type_id, INTER_NODES_REQ);
        assert_eq!(&request.payload[..32], &block_hash);
        assert_eq!(&request.payload[32..], &tx_hash);
    }

    #[tokio::test]
    async fn test_intermediate_nodes_not_found() {
        let reply = WireMessage::new(NOT_FOUND, b"unknown block".to_vec());
        let (addr, _peer) = one_shot_peer(reply).await;
        let client = PeerClient::new(Duration::from_secs(5));

        let err = client
            .intermediate_nodes(&addr, &[0; 32], &[0; 32])
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Rejected(msg) if msg == "unknown block"));
    }

    #[test]
    fn test_transport_error_maps_to_network_error() {
        let err: ClientError = TransportError::Timeout("peer:1".to_string()).into();
        assert_eq!(
            err,
            ClientError::NetworkError {
                reason: "timed out talking to peer:1".to_string(),
                retryable: false,
            }
        );
    }
}

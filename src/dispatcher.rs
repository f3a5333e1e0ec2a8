//! Sign-and-broadcast dispatcher
//!
//! Attaches an externally produced signature to a staged transaction and hands
//! it to the network. The staged entry is taken out of the registry before
//! the broadcast starts, so concurrent dispatches of one hash submit it at
//! most once.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::crypto::{short_hex, KeyPair, Sha256Hash, SignatureBytes};
use crate::error::{ClientError, Result};
use crate::network::Broadcaster;
use crate::registry::{not_found, PendingRegistry};
use crate::transaction::{FundsTransfer, TxKind, UnsignedTransaction};

/// What happens to a staged transaction whose broadcast failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// The entry is gone whatever the outcome; a retry means creating a new
    /// unsigned transaction.
    #[default]
    Always,
    /// A failed broadcast puts the unsigned transaction back and reports a
    /// retryable error.
    OnSuccess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub kind: TxKind,
    pub hash: Sha256Hash,
}

impl DispatchReceipt {
    pub fn message(&self) -> String {
        format!(
            "Transaction {} successfully sent to network.",
            short_hex(&self.hash)
        )
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<PendingRegistry>,
    broadcaster: Arc<dyn Broadcaster>,
    endpoint: String,
    policy: EvictionPolicy,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<PendingRegistry>,
        broadcaster: Arc<dyn Broadcaster>,
        endpoint: impl Into<String>,
        policy: EvictionPolicy,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            endpoint: endpoint.into(),
            policy,
        }
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn dispatch(
        &self,
        kind: TxKind,
        hash: &Sha256Hash,
        signature: SignatureBytes,
    ) -> Result<DispatchReceipt> {
        let Some(unsigned) = self.registry.take(kind, hash) else {
            warn!(kind = %kind, tx_hash = %short_hex(hash), "dispatch for unknown transaction");
            return Err(not_found(hash));
        };

        let signed = unsigned.sign(signature);
        match self.broadcaster.send(&self.endpoint, &signed).await {
            Ok(()) => {
                info!(
                    kind = %kind,
                    tx_hash = %short_hex(hash),
                    endpoint = %self.endpoint,
                    "transaction sent to network"
                );
                Ok(DispatchReceipt { kind, hash: *hash })
            }
            Err(err) => {
                let retryable = self.policy == EvictionPolicy::OnSuccess;
                if retryable {
                    self.registry.put(signed.into_unsigned());
                }
                warn!(
                    kind = %kind,
                    tx_hash = %short_hex(hash),
                    error = %err,
                    retained = retryable,
                    "sending transaction failed"
                );
                Err(ClientError::NetworkError {
                    reason: err.to_string(),
                    retryable,
                })
            }
        }
    }
}

/// Builds a funds transfer from `sender`, signs it with the same key and
/// broadcasts it. Nothing is staged, so a failure leaves no state behind.
pub async fn send_funds(
    broadcaster: &dyn Broadcaster,
    endpoint: &str,
    sender: &KeyPair,
    transfer: &FundsTransfer,
) -> Result<DispatchReceipt> {
    let tx = UnsignedTransaction::Funds(transfer.build(sender)?);
    let hash = tx.hash();
    let signed = tx.sign(sender.sign_digest(&hash));

    if let Err(err) = broadcaster.send(endpoint, &signed).await {
        warn!(tx_hash = %short_hex(&hash), endpoint, error = %err, "sending funds failed");
        return Err(err.into());
    }

    info!(tx_hash = %short_hex(&hash), endpoint, "funds transfer sent to network");
    Ok(DispatchReceipt {
        kind: TxKind::Funds,
        hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{
        read_frame, write_frame, PeerClient, TransportError, WireMessage, TX_ACK,
    };
    use crate::transaction::{FundsTx, SignedTransaction};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Records every broadcast; fails them all when `fail` is set.
    #[derive(Default)]
    struct RecordingBroadcaster {
        fail: bool,
        sent: Mutex<Vec<(String, SignedTransaction)>>,
    }

    #[async_trait]
    impl Broadcaster for RecordingBroadcaster {
        async fn send(
            &self,
            endpoint: &str,
            tx: &SignedTransaction,
        ) -> std::result::Result<(), TransportError> {
            self.sent.lock().push((endpoint.to_string(), tx.clone()));
            if self.fail {
                Err(TransportError::Rejected("peer unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn setup(
        fail: bool,
        policy: EvictionPolicy,
    ) -> (Dispatcher, Arc<PendingRegistry>, Arc<RecordingBroadcaster>) {
        let registry = Arc::new(PendingRegistry::new());
        let broadcaster = Arc::new(RecordingBroadcaster {
            fail,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(
            registry.clone(),
            broadcaster.clone(),
            "10.0.0.1:8000",
            policy,
        );
        (dispatcher, registry, broadcaster)
    }

    fn funds_tx() -> UnsignedTransaction {
        UnsignedTransaction::Funds(FundsTx {
            header: 0,
            amount: 500,
            fee: 1,
            tx_cnt: 3,
            from: [0x01; 64],
            to: [0x02; 64],
        })
    }

    #[tokio::test]
    async fn test_successful_dispatch_evicts_and_broadcasts() {
        let (dispatcher, registry, broadcaster) = setup(false, EvictionPolicy::Always);
        let hash = registry.put(funds_tx());

        let receipt = dispatcher
            .dispatch(TxKind::Funds, &hash, [0x99; 64])
            .await
            .unwrap();
        assert_eq!(receipt.hash, hash);
        assert_eq!(
            receipt.message(),
            format!(
                "Transaction {} successfully sent to network.",
                hex::encode(&hash[..8])
            )
        );

        assert!(matches!(
            registry.get(TxKind::Funds, &hash),
            Err(ClientError::NotFound(_))
        ));

        let sent = broadcaster.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "10.0.0.1:8000");
        assert_eq!(sent[0].1, funds_tx().sign([0x99; 64]));
    }

    #[tokio::test]
    async fn test_failed_dispatch_still_evicts() {
        let (dispatcher, registry, broadcaster) = setup(true, EvictionPolicy::Always);
        let hash = registry.put(funds_tx());

        let err = dispatcher
            .dispatch(TxKind::Funds, &hash, [0x99; 64])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ClientError::NetworkError {
                reason: "peer rejected request: peer unavailable".to_string(),
                retryable: false,
            }
        );
        assert!(!registry.contains(TxKind::Funds, &hash));
        assert_eq!(broadcaster.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_dispatch_retained_with_on_success_policy() {
        let (dispatcher, registry, _) = setup(true, EvictionPolicy::OnSuccess);
        let hash = registry.put(funds_tx());

        let err = dispatcher
            .dispatch(TxKind::Funds, &hash, [0x99; 64])
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NetworkError { retryable: true, .. }));
        assert_eq!(registry.get(TxKind::Funds, &hash).unwrap(), funds_tx());
    }

    #[tokio::test]
    async fn test_dispatch_without_staging_is_not_found() {
        let (dispatcher, _, broadcaster) = setup(false, EvictionPolicy::Always);
        let hash = funds_tx().hash();

        let err = dispatcher.dispatch(TxKind::Funds, &hash, [0; 64]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert!(broadcaster.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_second_dispatch_is_not_found() {
        let (dispatcher, registry, broadcaster) = setup(false, EvictionPolicy::Always);
        let hash = registry.put(funds_tx());

        dispatcher.dispatch(TxKind::Funds, &hash, [1; 64]).await.unwrap();
        let err = dispatcher.dispatch(TxKind::Funds, &hash, [1; 64]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert_eq!(broadcaster.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_uses_kind_tag() {
        let (dispatcher, registry, broadcaster) = setup(false, EvictionPolicy::Always);
        let hash = registry.put(funds_tx());

        // staged as funds, dispatched as config
        let err = dispatcher.dispatch(TxKind::Config, &hash, [1; 64]).await.unwrap_err();
        assert!(matches!(err, ClientError::NotFound(_)));
        assert!(registry.contains(TxKind::Funds, &hash));
        assert!(broadcaster.sent.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_broadcasts_once() {
        let (dispatcher, registry, broadcaster) = setup(false, EvictionPolicy::Always);
        let hash = registry.put(funds_tx());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    dispatcher.dispatch(TxKind::Funds, &hash, [7; 64]).await
                })
            })
            .collect();

        let mut ok = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(broadcaster.sent.lock().len(), 1);
    }

    fn transfer(amount: &str) -> FundsTransfer {
        FundsTransfer {
            header: "0".to_string(),
            amount: amount.to_string(),
            fee: "1".to_string(),
            tx_cnt: "2".to_string(),
            to: "22".repeat(64),
        }
    }

    #[tokio::test]
    async fn test_send_funds_signs_with_sender_key() {
        let broadcaster = RecordingBroadcaster::default();
        let sender = KeyPair::generate();

        let receipt = send_funds(&broadcaster, "10.0.0.1:8000", &sender, &transfer("75"))
            .await
            .unwrap();
        assert_eq!(receipt.kind, TxKind::Funds);

        let sent = broadcaster.sent.lock();
        assert_eq!(sent.len(), 1);
        let signed = &sent[0].1;
        assert_eq!(signed.hash(), receipt.hash);
        assert_eq!(signed.signature, sender.sign_digest(&receipt.hash));
        match &signed.tx {
            UnsignedTransaction::Funds(tx) => {
                assert_eq!(tx.from, sender.public_key_xy());
                assert_eq!(tx.amount, 75);
            }
            other => panic!("unexpected transaction {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_funds_rejects_before_broadcast() {
        let broadcaster = RecordingBroadcaster::default();
        let sender = KeyPair::generate();

        let err = send_funds(&broadcaster, "10.0.0.1:8000", &sender, &transfer("0"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::MalformedInput(_)));
        assert!(broadcaster.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_send_funds_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let peer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_frame(&mut socket).await.unwrap();
            write_frame(&mut socket, &WireMessage::new(TX_ACK, Vec::new()))
                .await
                .unwrap();
            request
        });

        let client = PeerClient::new(Duration::from_secs(5));
        let sender = KeyPair::generate();
        let receipt = send_funds(&client, &addr, &sender, &transfer("9"))
            .await
            .unwrap();

        let request = peer.await.unwrap();
        assert_eq!(request.type_id, TxKind::Funds.broadcast_code());

        let tx = UnsignedTransaction::Funds(transfer("9").build(&sender).unwrap());
        assert_eq!(tx.hash(), receipt.hash);
        assert_eq!(request.payload, tx.sign(sender.sign_digest(&receipt.hash)).encode());
    }
}

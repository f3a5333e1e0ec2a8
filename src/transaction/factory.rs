//! Builds unsigned transactions from raw request fields and stages them.
//!
//! Every field is parsed before anything touches the registry, so a request
//! that fails with [`ClientError::MalformedInput`] leaves no trace.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use super::types::{ConfigTx, ContractTx, FundsTx, UnsignedTransaction};
use crate::crypto::{short_hex, KeyPair, Sha256Hash};
use crate::error::{ClientError, Result};
use crate::registry::PendingRegistry;

/// Raw, unparsed fields of a creation request, as they arrive from the API.
#[derive(Debug, Clone)]
pub enum TxRequest {
    Contract {
        header: String,
        fee: String,
        issuer: String,
        /// `None` asks the factory to generate a fresh key pair.
        public_key: Option<String>,
    },
    Config {
        header: String,
        id: String,
        payload: String,
        fee: String,
        tx_cnt: String,
    },
    Funds {
        header: String,
        amount: String,
        fee: String,
        tx_cnt: String,
        from: String,
        to: String,
    },
}

/// Outcome of a successful creation
#[derive(Debug, Clone)]
pub struct Created {
    pub tx: UnsignedTransaction,
    pub hash: Sha256Hash,
    /// Present only when the factory generated the contract key pair. Holds
    /// private key material that the caller is expected to hand back to the
    /// requester.
    pub generated_key: Option<KeyPair>,
}

#[derive(Clone)]
pub struct TxFactory {
    registry: Arc<PendingRegistry>,
    allow_key_generation: bool,
}

impl TxFactory {
    pub fn new(registry: Arc<PendingRegistry>, allow_key_generation: bool) -> Self {
        Self {
            registry,
            allow_key_generation,
        }
    }

    pub fn allows_key_generation(&self) -> bool {
        self.allow_key_generation
    }

    /// Parse, hash and stage. An entry with the same hash is overwritten.
    pub fn create(&self, request: &TxRequest) -> Result<Created> {
        let (tx, generated_key) = self.build(request)?;
        let kind = tx.kind();
        let hash = self.registry.put(tx.clone());

        info!(
            kind = %kind,
            tx_hash = %short_hex(&hash),
            generated_key = generated_key.is_some(),
            "staged unsigned transaction"
        );

        Ok(Created {
            tx,
            hash,
            generated_key,
        })
    }

    /// Parse the request into a transaction without staging it.
    pub fn build(&self, request: &TxRequest) -> Result<(UnsignedTransaction, Option<KeyPair>)> {
        match request {
            TxRequest::Contract {
                header,
                fee,
                issuer,
                public_key,
            } => {
                let header = parse_number::<u8>("header", header)?;
                let fee = parse_number::<u64>("fee", fee)?;
                let issuer = parse_hex::<64>("issuer", issuer)?;

                let (public_key, generated_key) = match public_key {
                    Some(pk) => (parse_hex::<64>("pubKey", pk)?, None),
                    None => {
                        if !self.allow_key_generation {
                            return Err(ClientError::KeyGenerationDisabled);
                        }
                        let keypair = KeyPair::generate();
                        (keypair.public_key_xy(), Some(keypair))
                    }
                };

                let tx = UnsignedTransaction::Contract(ContractTx {
                    header,
                    fee,
                    issuer,
                    public_key,
                });
                Ok((tx, generated_key))
            }
            TxRequest::Config {
                header,
                id,
                payload,
                fee,
                tx_cnt,
            } => {
                let tx = UnsignedTransaction::Config(ConfigTx {
                    header: parse_number("header", header)?,
                    id: parse_number("id", id)?,
                    payload: parse_number("payload", payload)?,
                    fee: parse_number("fee", fee)?,
                    tx_cnt: parse_number("txCnt", tx_cnt)?,
                });
                Ok((tx, None))
            }
            TxRequest::Funds {
                header,
                amount,
                fee,
                tx_cnt,
                from,
                to,
            } => {
                let tx = UnsignedTransaction::Funds(FundsTx {
                    header: parse_number("header", header)?,
                    amount: parse_number("amount", amount)?,
                    fee: parse_number("fee", fee)?,
                    tx_cnt: parse_number("txCnt", tx_cnt)?,
                    from: parse_hex::<64>("fromPub", from)?,
                    to: parse_hex::<64>("toPub", to)?,
                });
                Ok((tx, None))
            }
        }
    }
}

/// Raw fields of a funds transfer that is signed locally and sent right away,
/// without going through the registry. The sender is the signing key.
#[derive(Debug, Clone)]
pub struct FundsTransfer {
    pub header: String,
    pub amount: String,
    pub fee: String,
    pub tx_cnt: String,
    /// Recipient public key, 128 hex characters.
    pub to: String,
}

impl FundsTransfer {
    /// Parses the fields and rejects transfers that move nothing or pay no fee.
    pub fn build(&self, sender: &KeyPair) -> Result<FundsTx> {
        let tx = FundsTx {
            header: parse_number("header", &self.header)?,
            amount: parse_number("amount", &self.amount)?,
            fee: parse_number("fee", &self.fee)?,
            tx_cnt: parse_number("txCnt", &self.tx_cnt)?,
            from: sender.public_key_xy(),
            to: parse_hex::<64>("toPub", &self.to)?,
        };

        if tx.amount == 0 {
            return Err(ClientError::MalformedInput(
                "amount must be > 0".to_string(),
            ));
        }
        if tx.fee == 0 {
            return Err(ClientError::MalformedInput("fee must be > 0".to_string()));
        }
        Ok(tx)
    }
}

/// Parses a decimal field, rejecting anything that does not fit `T`.
pub fn parse_number<T: FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        ClientError::MalformedInput(format!("{} is not a valid number: {:?}", field, value))
    })
}

/// Parses a hex field of exactly `N` bytes.
pub fn parse_hex<const N: usize>(field: &str, value: &str) -> Result<[u8; N]> {
    let digits = value.trim();
    if digits.len() != N * 2 {
        return Err(ClientError::MalformedInput(format!(
            "{} must be {} hex characters, got {}",
            field,
            N * 2,
            digits.len()
        )));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(digits, &mut out)
        .map_err(|e| ClientError::MalformedInput(format!("{} is not valid hex: {}", field, e)))?;
    Ok(out)
}

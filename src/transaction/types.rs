/// Transaction types for the TrinityChain light client
use crate::crypto::{hash_bytes, PublicKeyBytes, Sha256Hash, SignatureBytes};
use std::fmt;

/// Broadcast type codes understood by TrinityChain peers.
pub const FUNDSTX_BRDCST: u8 = 1;
pub const CONTRACTTX_BRDCST: u8 = 2;
pub const CONFIGTX_BRDCST: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxKind {
    Contract,
    Config,
    Funds,
}

impl TxKind {
    pub const ALL: [TxKind; 3] = [TxKind::Contract, TxKind::Config, TxKind::Funds];

    /// Type code sent alongside the transaction on the wire.
    pub fn broadcast_code(self) -> u8 {
        match self {
            TxKind::Contract => CONTRACTTX_BRDCST,
            TxKind::Config => CONFIGTX_BRDCST,
            TxKind::Funds => FUNDSTX_BRDCST,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TxKind::Contract => "contract",
            TxKind::Config => "config",
            TxKind::Funds => "funds",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contract transaction: registers a new account public key under an issuer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTx {
    pub header: u8,
    pub fee: u64,
    pub issuer: PublicKeyBytes,
    pub public_key: PublicKeyBytes,
}

impl ContractTx {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.push(self.header);
        out.extend_from_slice(&self.issuer);
        out.extend_from_slice(&self.fee.to_le_bytes());
        out.extend_from_slice(&self.public_key);
    }
}

/// Config transaction: proposes a change to a chain parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigTx {
    pub header: u8,
    pub id: u8,
    pub payload: u64,
    pub fee: u64,
    pub tx_cnt: u8,
}

impl ConfigTx {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.push(self.header);
        out.push(self.id);
        out.extend_from_slice(&self.payload.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
        out.push(self.tx_cnt);
    }
}

/// Funds transaction: moves an amount between two accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundsTx {
    pub header: u8,
    pub amount: u64,
    pub fee: u64,
    pub tx_cnt: u32,
    pub from: PublicKeyBytes,
    pub to: PublicKeyBytes,
}

impl FundsTx {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        out.push(self.header);
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
        out.extend_from_slice(&self.tx_cnt.to_le_bytes());
        out.extend_from_slice(&self.from);
        out.extend_from_slice(&self.to);
    }
}

/// A transaction with every field set except its signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedTransaction {
    Contract(ContractTx),
    Config(ConfigTx),
    Funds(FundsTx),
}

impl UnsignedTransaction {
    pub fn kind(&self) -> TxKind {
        match self {
            UnsignedTransaction::Contract(_) => TxKind::Contract,
            UnsignedTransaction::Config(_) => TxKind::Config,
            UnsignedTransaction::Funds(_) => TxKind::Funds,
        }
    }

    pub fn header(&self) -> u8 {
        match self {
            UnsignedTransaction::Contract(tx) => tx.header,
            UnsignedTransaction::Config(tx) => tx.header,
            UnsignedTransaction::Funds(tx) => tx.header,
        }
    }

    pub fn fee(&self) -> u64 {
        match self {
            UnsignedTransaction::Contract(tx) => tx.fee,
            UnsignedTransaction::Config(tx) => tx.fee,
            UnsignedTransaction::Funds(tx) => tx.fee,
        }
    }

    /// Canonical field encoding, shared by hashing and the wire format.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(160);
        match self {
            UnsignedTransaction::Contract(tx) => tx.encode_fields(&mut out),
            UnsignedTransaction::Config(tx) => tx.encode_fields(&mut out),
            UnsignedTransaction::Funds(tx) => tx.encode_fields(&mut out),
        }
        out
    }

    /// Identity of the transaction. The kind tag keeps equal field bytes of
    /// different kinds from colliding.
    pub fn hash(&self) -> Sha256Hash {
        let mut preimage = self.kind().as_str().as_bytes().to_vec();
        preimage.extend_from_slice(&self.encode());
        hash_bytes(&preimage)
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash())
    }

    pub fn sign(self, signature: SignatureBytes) -> SignedTransaction {
        SignedTransaction {
            tx: self,
            signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub tx: UnsignedTransaction,
    pub signature: SignatureBytes,
}

impl SignedTransaction {
    pub fn kind(&self) -> TxKind {
        self.tx.kind()
    }

    pub fn hash(&self) -> Sha256Hash {
        self.tx.hash()
    }

    /// Field encoding followed by the 64 signature bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = self.tx.encode();
        out.extend_from_slice(&self.signature);
        out
    }

    pub fn into_unsigned(self) -> UnsignedTransaction {
        self.tx
    }
}

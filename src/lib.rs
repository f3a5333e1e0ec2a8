//! TrinityChain light client - stage, sign and broadcast transactions
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Transactions
//! - [`transaction`] - Transaction kinds, canonical encoding and the factory
//! - [`registry`] - Unsigned transactions waiting for a signature
//! - [`dispatcher`] - Attaches signatures and broadcasts
//!
//! ## Verification
//! - [`merkle`] - Merkle inclusion proofs
//!
//! ## Cryptography
//! - [`crypto`] - Hashing and secp256k1 keys
//!
//! ## Networking & Integration
//! - [`network`] - Peer client and wire framing
//! - [`api`] - REST API
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Transactions
// ============================================================================
pub mod dispatcher;
pub mod registry;
pub mod transaction;

// ============================================================================
// Verification
// ============================================================================
pub mod merkle;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Networking
// ============================================================================
pub mod network;

// ============================================================================
// Integration
// ============================================================================
#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;

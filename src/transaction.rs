//! Transaction module split into types and the staging factory

pub mod factory;
pub mod types;

pub use factory::{Created, FundsTransfer, TxFactory, TxRequest};
pub use types::*;

//! Shared types for the zkSync two-owner multisig client.
//!
//! The core logic talks to the outside world only through the traits in [`network`]; the
//! constants in [`protocol`] pin the network-specific encodings both sides must agree on.

pub mod network;
pub mod protocol;

pub use network::{
    AccountFactory, CallRequest, Funder, LogEntry, Network, NetworkError, Receipt, TxHash,
};

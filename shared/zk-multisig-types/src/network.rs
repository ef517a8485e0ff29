use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;

pub type TxHash = B256;

/// Errors reported by the network or by a wallet-backed collaborator.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    /// The node refused the request (estimation revert, validation failure, bad nonce, ...).
    #[error("rejected by node: {0}")]
    Rejected(String),
    /// The request never got an answer from the node.
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Unsigned call used for resource estimation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_per_pubdata: U256,
    /// Raw bytecode of every contract the call may deploy.
    pub factory_deps: Vec<Bytes>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// Outcome of an included transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    /// `false` when the transaction was included but reverted.
    pub success: bool,
    pub block_number: Option<u64>,
    pub gas_used: U256,
    pub effective_gas_price: U256,
    pub logs: Vec<LogEntry>,
}

/// Read-only queries and raw submission against a node.
#[async_trait]
pub trait Network: Send + Sync {
    async fn estimate_resource_cost(&self, call: &CallRequest) -> Result<U256, NetworkError>;

    async fn resource_unit_price(&self) -> Result<U256, NetworkError>;

    async fn chain_id(&self) -> Result<u64, NetworkError>;

    async fn account_nonce(&self, address: Address) -> Result<u64, NetworkError>;

    async fn balance_of(&self, address: Address) -> Result<U256, NetworkError>;

    /// Hand a serialized transaction to the node.
    async fn submit(&self, raw: Bytes) -> Result<TxHash, NetworkError>;

    /// Wait until the transaction is included. Implementations may wait indefinitely;
    /// callers bound the wait with their own deadline.
    async fn await_receipt(&self, tx_hash: TxHash) -> Result<Receipt, NetworkError>;
}

/// Factory contract that instantiates multisig accounts, bound to the deployer wallet.
#[async_trait]
pub trait AccountFactory: Send + Sync {
    fn address(&self) -> Address;

    /// Versioned hash of the account bytecode the factory instantiates.
    async fn code_identity_hash(&self) -> Result<B256, NetworkError>;

    async fn deploy_account(
        &self,
        salt: B256,
        owner1: Address,
        owner2: Address,
    ) -> Result<TxHash, NetworkError>;
}

/// Externally owned wallet used to fund freshly deployed accounts.
#[async_trait]
pub trait Funder: Send + Sync {
    fn address(&self) -> Address;

    async fn transfer(&self, to: Address, value: U256) -> Result<TxHash, NetworkError>;
}

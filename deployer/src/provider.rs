//! JSON-RPC backed collaborators for the multisig client.

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider, ProviderError, RpcError},
    signers::LocalWallet,
    types::{
        transaction::eip2718::TypedTransaction, TransactionReceipt, TransactionRequest, H160,
        H256,
    },
};
use serde_json::json;
use zk_multisig_client::abi::IAAFactory;
use zk_multisig_types::{
    protocol::EIP712_TX_TYPE, AccountFactory, CallRequest, Funder, LogEntry, Network,
    NetworkError, Receipt, TxHash,
};

/// Deployer wallet bound to the node.
pub type DeployerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

pub fn to_h160(address: Address) -> H160 {
    H160::from(address.into_array())
}

pub fn from_h160(address: H160) -> Address {
    Address::from(address.0)
}

pub fn to_ethers_u256(value: U256) -> ethers::types::U256 {
    ethers::types::U256::from_big_endian(&value.to_be_bytes::<32>())
}

pub fn from_ethers_u256(value: ethers::types::U256) -> U256 {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    U256::from_be_bytes(buf)
}

fn from_h256(hash: H256) -> B256 {
    B256::from(hash.0)
}

fn rejected_or_transport(err: ProviderError) -> NetworkError {
    match err.as_error_response() {
        Some(response) => NetworkError::Rejected(response.message.clone()),
        None => NetworkError::Transport(err.to_string()),
    }
}

fn transport(err: ProviderError) -> NetworkError {
    NetworkError::Transport(err.to_string())
}

fn from_ethers_receipt(receipt: TransactionReceipt) -> Receipt {
    Receipt {
        tx_hash: from_h256(receipt.transaction_hash),
        success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
        block_number: receipt.block_number.map(|n| n.as_u64()),
        gas_used: receipt.gas_used.map(from_ethers_u256).unwrap_or_default(),
        effective_gas_price: receipt
            .effective_gas_price
            .map(from_ethers_u256)
            .unwrap_or_default(),
        logs: receipt
            .logs
            .into_iter()
            .map(|log| LogEntry {
                address: from_h160(log.address),
                topics: log.topics.into_iter().map(from_h256).collect(),
                data: log.data.to_vec().into(),
            })
            .collect(),
    }
}

/// Read-only node access plus raw submission.
#[derive(Clone)]
pub struct RpcNetwork {
    provider: Provider<Http>,
    poll_interval: Duration,
}

impl RpcNetwork {
    pub fn new(provider: Provider<Http>, poll_interval: Duration) -> Self {
        Self {
            provider,
            poll_interval,
        }
    }

    pub fn provider(&self) -> &Provider<Http> {
        &self.provider
    }
}

#[async_trait]
impl Network for RpcNetwork {
    async fn estimate_resource_cost(&self, call: &CallRequest) -> Result<U256, NetworkError> {
        // eip712Meta lets the node account for published bytecode and pubdata pricing
        let request = json!({
            "from": call.from.to_string(),
            "to": call.to.to_string(),
            "data": call.data.to_string(),
            "value": format!("0x{:x}", call.value),
            "type": format!("0x{:x}", EIP712_TX_TYPE),
            "eip712Meta": {
                "gasPerPubdata": format!("0x{:x}", call.gas_per_pubdata),
                "factoryDeps": call
                    .factory_deps
                    .iter()
                    .map(|dep| dep.to_vec())
                    .collect::<Vec<_>>(),
            },
        });
        let gas: ethers::types::U256 = self
            .provider
            .request("eth_estimateGas", [request])
            .await
            .map_err(rejected_or_transport)?;
        Ok(from_ethers_u256(gas))
    }

    async fn resource_unit_price(&self) -> Result<U256, NetworkError> {
        let price = self.provider.get_gas_price().await.map_err(transport)?;
        Ok(from_ethers_u256(price))
    }

    async fn chain_id(&self) -> Result<u64, NetworkError> {
        let chain_id = self.provider.get_chainid().await.map_err(transport)?;
        Ok(chain_id.as_u64())
    }

    async fn account_nonce(&self, address: Address) -> Result<u64, NetworkError> {
        let nonce = self
            .provider
            .get_transaction_count(to_h160(address), None)
            .await
            .map_err(transport)?;
        Ok(nonce.as_u64())
    }

    async fn balance_of(&self, address: Address) -> Result<U256, NetworkError> {
        let balance = self
            .provider
            .get_balance(to_h160(address), None)
            .await
            .map_err(transport)?;
        Ok(from_ethers_u256(balance))
    }

    async fn submit(&self, raw: Bytes) -> Result<TxHash, NetworkError> {
        let pending = self
            .provider
            .send_raw_transaction(raw.to_vec().into())
            .await
            .map_err(rejected_or_transport)?;
        Ok(from_h256(pending.tx_hash()))
    }

    async fn await_receipt(&self, tx_hash: TxHash) -> Result<Receipt, NetworkError> {
        let hash = H256::from(tx_hash.0);
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(transport)?;
            match receipt {
                Some(receipt) => return Ok(from_ethers_receipt(receipt)),
                None => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

/// The deployed `AAFactory`, called through `client`.
pub struct RpcFactory<M> {
    client: Arc<M>,
    address: Address,
}

impl<M> RpcFactory<M> {
    pub fn new(client: Arc<M>, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait]
impl<M: Middleware + 'static> AccountFactory for RpcFactory<M> {
    fn address(&self) -> Address {
        self.address
    }

    async fn code_identity_hash(&self) -> Result<B256, NetworkError> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(to_h160(self.address))
            .data(IAAFactory::aaBytecodeHashCall {}.abi_encode())
            .into();
        let output = self
            .client
            .call(&tx, None)
            .await
            .map_err(|e| NetworkError::Transport(e.to_string()))?;
        let decoded = IAAFactory::aaBytecodeHashCall::abi_decode_returns(&output, true)
            .map_err(|e| NetworkError::Rejected(format!("malformed aaBytecodeHash return: {e}")))?;
        Ok(decoded.hash)
    }

    async fn deploy_account(
        &self,
        salt: B256,
        owner1: Address,
        owner2: Address,
    ) -> Result<TxHash, NetworkError> {
        let data = IAAFactory::deployAccountCall {
            salt,
            owner1,
            owner2,
        }
        .abi_encode();
        let tx = TransactionRequest::new().to(to_h160(self.address)).data(data);
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        Ok(from_h256(pending.tx_hash()))
    }
}

/// Plain value transfers from the deployer wallet.
pub struct RpcFunder<M: Middleware> {
    client: Arc<M>,
    address: Address,
}

impl<M: Middleware> RpcFunder<M> {
    pub fn new(client: Arc<M>, address: Address) -> Self {
        Self { client, address }
    }
}

#[async_trait]
impl<M: Middleware + 'static> Funder for RpcFunder<M> {
    fn address(&self) -> Address {
        self.address
    }

    async fn transfer(&self, to: Address, value: U256) -> Result<TxHash, NetworkError> {
        let tx = TransactionRequest::pay(to_h160(to), to_ethers_u256(value)).from(to_h160(self.address));
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;
        Ok(from_h256(pending.tx_hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u256_conversions_preserve_value() {
        let value = U256::from(5_000_000_000_000_000u64) << 100;
        assert_eq!(from_ethers_u256(to_ethers_u256(value)), value);
    }

    #[test]
    fn address_conversions_preserve_bytes() {
        let address = Address::repeat_byte(0xab);
        assert_eq!(from_h160(to_h160(address)), address);
    }
}

//! In-memory network for off-chain testing.
//!
//! Behaves like a node as far as the client can observe: submissions are decoded from their
//! wire encoding, the digest is recomputed and each 65-byte signature slot is checked against the
//! owner registered for that slot. Nonces, balances, fees and deployment logs are tracked so the
//! coordinator's post-confirmation checks run against realistic state.
//!
//! The mock does not compute `create2` addresses itself. Every account the factory may deploy is
//! registered up front with [`MockNetwork::expect_deployment`].

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use zk_multisig_types::{
    protocol::{CONTRACT_DEPLOYER_ADDRESS, ECDSA_SIGNATURE_LENGTH, OWNER_COUNT},
    AccountFactory, CallRequest, Funder, LogEntry, Network, NetworkError, Receipt, TxHash,
};

use crate::{
    abi::{IAAFactory, IContractDeployer},
    digest::signing_digest,
    encoder::decode_envelope,
    signer::recover_signer,
};

pub const DEFAULT_GAS_PRICE: u64 = 250_000_000;
pub const DEFAULT_GAS_ESTIMATE: u64 = 1_000_000;
pub const DEFAULT_GAS_USED: u64 = 600_000;

struct ChainState {
    chain_id: u64,
    gas_price: U256,
    gas_estimate: U256,
    gas_used: U256,
    factory: Address,
    account_code_hash: B256,
    deployer: Address,
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    accounts: HashMap<Address, [Address; OWNER_COUNT]>,
    deployment_fixtures: HashMap<(B256, Address, Address), Address>,
    receipts: HashMap<TxHash, Receipt>,
    block_number: u64,
    estimation_failure: Option<String>,
    hang_receipts: bool,
    reported_deployment: Option<Address>,
}

impl ChainState {
    fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    fn nonce(&self, address: Address) -> u64 {
        self.nonces.get(&address).copied().unwrap_or_default()
    }

    fn fee(&self, gas_limit: U256, gas_price: U256) -> Result<U256, NetworkError> {
        self.gas_used
            .min(gas_limit)
            .checked_mul(gas_price)
            .ok_or_else(|| NetworkError::Rejected("fee overflows uint256".to_string()))
    }

    fn credit(&mut self, address: Address, value: U256) -> Result<(), NetworkError> {
        let credited = self
            .balance(address)
            .checked_add(value)
            .ok_or_else(|| NetworkError::Rejected(format!("balance of {address} overflows")))?;
        self.balances.insert(address, credited);
        Ok(())
    }

    fn next_block(&mut self) -> u64 {
        self.block_number += 1;
        self.block_number
    }

    fn deploy_account(
        &mut self,
        salt: B256,
        owner1: Address,
        owner2: Address,
    ) -> Result<LogEntry, NetworkError> {
        let address = self
            .deployment_fixtures
            .get(&(salt, owner1, owner2))
            .copied()
            .ok_or_else(|| {
                NetworkError::Rejected(format!(
                    "execution reverted: no deployment fixture for salt {salt}, owners {owner1}, {owner2}"
                ))
            })?;
        if self.accounts.contains_key(&address) {
            return Err(NetworkError::Rejected(format!(
                "execution reverted: code already deployed at {address}"
            )));
        }
        self.accounts.insert(address, [owner1, owner2]);
        let reported = self.reported_deployment.unwrap_or(address);
        Ok(LogEntry {
            address: CONTRACT_DEPLOYER_ADDRESS,
            topics: vec![
                IContractDeployer::ContractDeployed::SIGNATURE_HASH,
                self.factory.into_word(),
                self.account_code_hash,
                reported.into_word(),
            ],
            data: Bytes::new(),
        })
    }

    fn record(&mut self, tx_hash: TxHash, success: bool, gas_price: U256, logs: Vec<LogEntry>) {
        let block_number = self.next_block();
        let receipt = Receipt {
            tx_hash,
            success,
            block_number: Some(block_number),
            gas_used: self.gas_used,
            effective_gas_price: gas_price,
            logs,
        };
        self.receipts.insert(tx_hash, receipt);
    }

    /// Authorization check the account contract would run for `from`.
    fn validate(&self, from: Address, digest: B256, signature: &[u8]) -> Result<(), String> {
        match self.accounts.get(&from) {
            Some(owners) => {
                if signature.len() != ECDSA_SIGNATURE_LENGTH * OWNER_COUNT {
                    return Err(format!(
                        "signature length is {}, expected {}",
                        signature.len(),
                        ECDSA_SIGNATURE_LENGTH * OWNER_COUNT
                    ));
                }
                for (slot, chunk) in signature.chunks(ECDSA_SIGNATURE_LENGTH).enumerate() {
                    let signer = recover_signer(digest, chunk).map_err(|e| e.to_string())?;
                    if signer != owners[slot] {
                        return Err(format!("signature {slot} is not from owner {}", slot + 1));
                    }
                }
                Ok(())
            }
            None => {
                let signer = recover_signer(digest, signature).map_err(|e| e.to_string())?;
                if signer != from {
                    return Err(format!("signed by {signer}, not by {from}"));
                }
                Ok(())
            }
        }
    }
}

/// Shared handle to an in-memory chain. Clones observe the same state.
#[derive(Clone)]
pub struct MockNetwork {
    state: Arc<Mutex<ChainState>>,
}

impl MockNetwork {
    /// A chain with a factory at `factory` instantiating accounts of `account_code_hash`, and a
    /// funded-by-the-test deployer wallet at `deployer`.
    pub fn new(chain_id: u64, factory: Address, account_code_hash: B256, deployer: Address) -> Self {
        let state = ChainState {
            chain_id,
            gas_price: U256::from(DEFAULT_GAS_PRICE),
            gas_estimate: U256::from(DEFAULT_GAS_ESTIMATE),
            gas_used: U256::from(DEFAULT_GAS_USED),
            factory,
            account_code_hash,
            deployer,
            balances: HashMap::new(),
            nonces: HashMap::new(),
            accounts: HashMap::new(),
            deployment_fixtures: HashMap::new(),
            receipts: HashMap::new(),
            block_number: 0,
            estimation_failure: None,
            hang_receipts: false,
            reported_deployment: None,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        // a panic in another test thread must not hide this chain's state
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register the address the factory deploys `(salt, owner1, owner2)` to.
    pub fn expect_deployment(&self, salt: B256, owner1: Address, owner2: Address, address: Address) {
        self.lock()
            .deployment_fixtures
            .insert((salt, owner1, owner2), address);
    }

    pub fn set_balance(&self, address: Address, amount: U256) {
        self.lock().balances.insert(address, amount);
    }

    pub fn set_gas_price(&self, gas_price: U256) {
        self.lock().gas_price = gas_price;
    }

    /// Make every estimation fail with `reason`, as a node does for a reverting call.
    pub fn fail_estimation(&self, reason: impl Into<String>) {
        self.lock().estimation_failure = Some(reason.into());
    }

    /// Never answer receipt queries.
    pub fn hang_receipts(&self, hang: bool) {
        self.lock().hang_receipts = hang;
    }

    /// Report `address` in deployment logs instead of the real one.
    pub fn misreport_deployments(&self, address: Address) {
        self.lock().reported_deployment = Some(address);
    }

    pub fn owners_of(&self, account: Address) -> Option<[Address; OWNER_COUNT]> {
        self.lock().accounts.get(&account).copied()
    }

    pub fn fee_per_transaction(&self) -> U256 {
        let state = self.lock();
        state.gas_used.saturating_mul(state.gas_price)
    }
}

#[async_trait]
impl Network for MockNetwork {
    async fn estimate_resource_cost(&self, call: &CallRequest) -> Result<U256, NetworkError> {
        let state = self.lock();
        if let Some(reason) = &state.estimation_failure {
            return Err(NetworkError::Rejected(reason.clone()));
        }
        if call.value > state.balance(call.from) {
            return Err(NetworkError::Rejected(
                "insufficient balance for transfer".to_string(),
            ));
        }
        Ok(state.gas_estimate)
    }

    async fn resource_unit_price(&self) -> Result<U256, NetworkError> {
        Ok(self.lock().gas_price)
    }

    async fn chain_id(&self) -> Result<u64, NetworkError> {
        Ok(self.lock().chain_id)
    }

    async fn account_nonce(&self, address: Address) -> Result<u64, NetworkError> {
        Ok(self.lock().nonce(address))
    }

    async fn balance_of(&self, address: Address) -> Result<U256, NetworkError> {
        Ok(self.lock().balance(address))
    }

    async fn submit(&self, raw: Bytes) -> Result<TxHash, NetworkError> {
        let decoded = decode_envelope(&raw).map_err(|e| NetworkError::Rejected(e.to_string()))?;
        let tx = decoded.envelope;
        let mut state = self.lock();

        if tx.chain_id != state.chain_id {
            return Err(NetworkError::Rejected(format!(
                "invalid chain id {}",
                tx.chain_id
            )));
        }
        let expected_nonce = state.nonce(tx.from);
        if tx.nonce != expected_nonce {
            return Err(NetworkError::Rejected(format!(
                "nonce mismatch: expected {expected_nonce}, got {}",
                tx.nonce
            )));
        }
        let digest = signing_digest(&tx);
        if let Err(reason) = state.validate(tx.from, digest, &decoded.custom_signature) {
            return Err(NetworkError::Rejected(format!(
                "failed to validate the transaction. reason: Validation revert: Account validation error: {reason}"
            )));
        }
        let fee = state.fee(tx.gas_limit, tx.max_fee_per_gas)?;
        let total = tx
            .value
            .checked_add(fee)
            .ok_or_else(|| NetworkError::Rejected("value plus fee overflows uint256".to_string()))?;
        let balance = state.balance(tx.from);
        if balance < total {
            return Err(NetworkError::Rejected(format!(
                "insufficient balance: {balance} < {total}"
            )));
        }

        // credit first: it is the only step that can fail
        state.credit(tx.to, tx.value)?;
        let balance = state.balance(tx.from);
        state.nonces.insert(tx.from, expected_nonce + 1);
        state.balances.insert(tx.from, balance - total);

        let mut success = true;
        let mut logs = Vec::new();
        if tx.to == state.factory && tx.data.starts_with(&IAAFactory::deployAccountCall::SELECTOR) {
            let deployed = IAAFactory::deployAccountCall::abi_decode(&tx.data, true)
                .map_err(|e| NetworkError::Rejected(e.to_string()))
                .and_then(|call| state.deploy_account(call.salt, call.owner1, call.owner2));
            match deployed {
                Ok(log) => logs.push(log),
                Err(_) => success = false,
            }
        }

        let tx_hash = keccak256(&raw);
        state.record(tx_hash, success, tx.max_fee_per_gas, logs);
        Ok(tx_hash)
    }

    async fn await_receipt(&self, tx_hash: TxHash) -> Result<Receipt, NetworkError> {
        let hang = self.lock().hang_receipts;
        if hang {
            std::future::pending::<()>().await;
        }
        self.lock()
            .receipts
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| NetworkError::Rejected(format!("unknown transaction {tx_hash}")))
    }
}

#[async_trait]
impl AccountFactory for MockNetwork {
    fn address(&self) -> Address {
        self.lock().factory
    }

    async fn code_identity_hash(&self) -> Result<B256, NetworkError> {
        Ok(self.lock().account_code_hash)
    }

    async fn deploy_account(
        &self,
        salt: B256,
        owner1: Address,
        owner2: Address,
    ) -> Result<TxHash, NetworkError> {
        let mut state = self.lock();
        let deployer = state.deployer;
        let nonce = state.nonce(deployer);
        let log = state.deploy_account(salt, owner1, owner2)?;
        state.nonces.insert(deployer, nonce + 1);

        let gas_price = state.gas_price;
        let tx_hash = keccak256([deployer.as_slice(), &nonce.to_be_bytes()[..]].concat());
        state.record(tx_hash, true, gas_price, vec![log]);
        Ok(tx_hash)
    }
}

#[async_trait]
impl Funder for MockNetwork {
    fn address(&self) -> Address {
        self.lock().deployer
    }

    async fn transfer(&self, to: Address, value: U256) -> Result<TxHash, NetworkError> {
        let mut state = self.lock();
        let deployer = state.deployer;
        let gas_price = state.gas_price;
        let fee = state.fee(state.gas_estimate, gas_price)?;
        let total = value
            .checked_add(fee)
            .ok_or_else(|| NetworkError::Rejected("value plus fee overflows uint256".to_string()))?;
        let balance = state.balance(deployer);
        if balance < total {
            return Err(NetworkError::Rejected(format!(
                "insufficient funds for transfer: {balance} < {total}"
            )));
        }
        state.credit(to, value)?;
        let balance = state.balance(deployer);
        let nonce = state.nonce(deployer);
        state.nonces.insert(deployer, nonce + 1);
        state.balances.insert(deployer, balance - total);

        let tx_hash = keccak256([deployer.as_slice(), &nonce.to_be_bytes()[..]].concat());
        state.record(tx_hash, true, gas_price, Vec::new());
        Ok(tx_hash)
    }
}

use alloy_primitives::{Address, Bytes, B256, U256};
use zk_multisig_types::protocol::{DEFAULT_GAS_PER_PUBDATA_LIMIT, EIP712_TX_TYPE};

use crate::{address::hash_bytecode, Result};

/// A call to be executed on behalf of an account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}

impl Call {
    pub fn new(to: Address, data: Bytes, value: U256) -> Self {
        Self { to, data, value }
    }

    /// Plain value transfer with empty calldata.
    pub fn transfer(to: Address, value: U256) -> Self {
        Self::new(to, Bytes::new(), value)
    }
}

/// Bytecode published alongside a transaction, with its versioned hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactoryDep {
    bytecode: Bytes,
    hash: B256,
}

impl FactoryDep {
    pub fn new(bytecode: Bytes) -> Result<Self> {
        let hash = hash_bytecode(&bytecode)?;
        Ok(Self { bytecode, hash })
    }

    pub fn bytecode(&self) -> &Bytes {
        &self.bytecode
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymasterParams {
    pub paymaster: Address,
    pub input: Bytes,
}

/// Account-abstraction specific fields of the envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eip712Meta {
    /// Resource-accounting parameter: gas charged per byte of published data.
    pub gas_per_pubdata: U256,
    pub factory_deps: Vec<FactoryDep>,
    pub paymaster_params: Option<PaymasterParams>,
}

impl Default for Eip712Meta {
    fn default() -> Self {
        Self {
            gas_per_pubdata: U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT),
            factory_deps: Vec::new(),
            paymaster_params: None,
        }
    }
}

/// Unsigned transaction issued by an account. Freely mutable until sealed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionEnvelope {
    pub tx_type: u8,
    pub chain_id: u64,
    pub nonce: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub meta: Eip712Meta,
}

impl Default for TransactionEnvelope {
    fn default() -> Self {
        Self {
            tx_type: EIP712_TX_TYPE,
            chain_id: 0,
            nonce: 0,
            from: Address::ZERO,
            to: Address::ZERO,
            value: U256::ZERO,
            data: Bytes::new(),
            gas_limit: U256::ZERO,
            max_fee_per_gas: U256::ZERO,
            max_priority_fee_per_gas: U256::ZERO,
            meta: Eip712Meta::default(),
        }
    }
}

//! Deterministic account addresses.
//!
//! The factory deploys through the system deployer with `create2`, so the account address is
//! known before any transaction is sent. The derivation must use the exact constructor input the
//! factory encodes internally (`abi.encode(owner1, owner2)`), otherwise the predicted address
//! never matches the deployed one.

use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_sol_types::SolEvent;
use serde::Serialize;
use sha2::{Digest, Sha256};
use zk_multisig_types::{
    protocol::{CONTRACT_DEPLOYER_ADDRESS, MAX_BYTECODE_WORDS, OWNER_COUNT},
    LogEntry,
};

use crate::{abi::IContractDeployer, Error, Result};

/// Domain prefix mixed into every `create2` preimage: `keccak256("zksyncCreate2")`.
pub fn create2_prefix() -> B256 {
    keccak256(b"zksyncCreate2")
}

/// ABI-encode the account constructor arguments: one left-padded word per owner, in order.
pub fn encode_owner_args(owners: &[Address]) -> Result<Bytes> {
    if owners.len() != OWNER_COUNT {
        return Err(Error::encoding(format!(
            "account constructor takes {OWNER_COUNT} owner addresses, got {}",
            owners.len()
        )));
    }
    let mut buf = Vec::with_capacity(32 * OWNER_COUNT);
    for owner in owners {
        let mut padded = [0u8; 32];
        padded[12..32].copy_from_slice(owner.as_slice());
        buf.extend_from_slice(&padded);
    }
    Ok(buf.into())
}

/// Address a `create2` deployment by `sender` will land on.
///
/// `keccak256(prefix || pad32(sender) || salt || code_hash || keccak256(input))[12..]`
pub fn derive(
    sender: Address,
    code_hash: B256,
    salt: B256,
    constructor_input: &[u8],
) -> Result<Address> {
    if constructor_input.len() % 32 != 0 {
        return Err(Error::encoding(format!(
            "constructor input must be whole 32-byte words, got {} bytes",
            constructor_input.len()
        )));
    }

    let mut buf = Vec::with_capacity(32 * 5);
    buf.extend_from_slice(create2_prefix().as_slice());
    let mut sender_padded = [0u8; 32];
    sender_padded[12..32].copy_from_slice(sender.as_slice());
    buf.extend_from_slice(&sender_padded);
    buf.extend_from_slice(salt.as_slice());
    buf.extend_from_slice(code_hash.as_slice());
    buf.extend_from_slice(keccak256(constructor_input).as_slice());

    Ok(Address::from_slice(&keccak256(buf)[12..]))
}

/// Versioned code identity hash of a compiled contract.
///
/// Layout: `0x01 0x00 || u16be(length in words) || sha256(bytecode)[4..]`.
pub fn hash_bytecode(bytecode: &[u8]) -> Result<B256> {
    if bytecode.is_empty() {
        return Err(Error::encoding("bytecode is empty"));
    }
    if bytecode.len() % 32 != 0 {
        return Err(Error::encoding(format!(
            "bytecode length must be divisible by 32, got {}",
            bytecode.len()
        )));
    }
    let words = bytecode.len() / 32;
    if words > MAX_BYTECODE_WORDS {
        return Err(Error::encoding(format!("bytecode too long: {words} words")));
    }
    if words % 2 == 0 {
        return Err(Error::encoding(format!(
            "bytecode must have an odd number of words, got {words}"
        )));
    }

    let sha = Sha256::digest(bytecode);
    let mut out = [0u8; 32];
    out[0] = 1;
    out[2..4].copy_from_slice(&(words as u16).to_be_bytes());
    out[4..].copy_from_slice(&sha[4..]);
    Ok(B256::from(out))
}

/// A multisig account identified before deployment. Immutable once derived.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Account {
    factory: Address,
    code_hash: B256,
    salt: B256,
    owners: [Address; OWNER_COUNT],
    address: Address,
}

impl Account {
    pub fn derive(
        factory: Address,
        code_hash: B256,
        salt: B256,
        owner1: Address,
        owner2: Address,
    ) -> Result<Self> {
        let owners = [owner1, owner2];
        let input = encode_owner_args(&owners)?;
        let address = derive(factory, code_hash, salt, &input)?;
        Ok(Self {
            factory,
            code_hash,
            salt,
            owners,
            address,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn code_hash(&self) -> B256 {
        self.code_hash
    }

    pub fn salt(&self) -> B256 {
        self.salt
    }

    /// Owners in signature order.
    pub fn owners(&self) -> [Address; OWNER_COUNT] {
        self.owners
    }
}

/// Contracts reported as deployed by `deployer` in a receipt's logs, from the system deployer's
/// `ContractDeployed` events.
pub fn deployed_contracts(logs: &[LogEntry], deployer: Address) -> Vec<Address> {
    logs.iter()
        .filter(|log| log.address == CONTRACT_DEPLOYER_ADDRESS)
        .filter(|log| {
            log.topics.len() == 4 && log.topics[0] == IContractDeployer::ContractDeployed::SIGNATURE_HASH
        })
        .filter(|log| Address::from_word(log.topics[1]) == deployer)
        .map(|log| Address::from_word(log.topics[3]))
        .collect()
}

//! Typed-data digest of a transaction envelope.
//!
//! The validating account contract re-derives this digest from the transaction it receives, so
//! every field listed in [`TRANSACTION_TYPE`] is bound by the owner signatures.

use alloy_primitives::{keccak256, Address, B256, U256};
use zk_multisig_types::protocol::{EIP712_DOMAIN_NAME, EIP712_DOMAIN_VERSION};

use crate::types::TransactionEnvelope;

pub const DOMAIN_TYPE: &[u8] = b"EIP712Domain(string name,string version,uint256 chainId)";

pub const TRANSACTION_TYPE: &[u8] = b"Transaction(uint256 txType,uint256 from,uint256 to,uint256 gasLimit,uint256 gasPerPubdataByteLimit,uint256 maxFeePerGas,uint256 maxPriorityFeePerGas,uint256 paymaster,uint256 nonce,uint256 value,bytes data,bytes32[] factoryDeps,bytes paymasterInput)";

fn address_word(address: Address) -> [u8; 32] {
    let mut padded = [0u8; 32];
    padded[12..32].copy_from_slice(address.as_slice());
    padded
}

pub fn domain_separator(chain_id: u64) -> B256 {
    let mut domain_buf = Vec::with_capacity(32 * 4);
    domain_buf.extend_from_slice(keccak256(DOMAIN_TYPE).as_slice());
    domain_buf.extend_from_slice(keccak256(EIP712_DOMAIN_NAME.as_bytes()).as_slice());
    domain_buf.extend_from_slice(keccak256(EIP712_DOMAIN_VERSION.as_bytes()).as_slice());
    domain_buf.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    keccak256(domain_buf)
}

pub fn struct_hash(envelope: &TransactionEnvelope) -> B256 {
    let meta = &envelope.meta;
    let (paymaster, paymaster_input) = match &meta.paymaster_params {
        Some(params) => (params.paymaster, &params.input[..]),
        None => (Address::ZERO, &[][..]),
    };

    // bytes32[] is hashed as the concatenation of its elements
    let mut deps_buf = Vec::with_capacity(32 * meta.factory_deps.len());
    for dep in &meta.factory_deps {
        deps_buf.extend_from_slice(dep.hash().as_slice());
    }

    let mut struct_buf = Vec::with_capacity(32 * 14);
    struct_buf.extend_from_slice(keccak256(TRANSACTION_TYPE).as_slice());
    struct_buf.extend_from_slice(&U256::from(envelope.tx_type).to_be_bytes::<32>());
    struct_buf.extend_from_slice(&address_word(envelope.from));
    struct_buf.extend_from_slice(&address_word(envelope.to));
    struct_buf.extend_from_slice(&envelope.gas_limit.to_be_bytes::<32>());
    struct_buf.extend_from_slice(&meta.gas_per_pubdata.to_be_bytes::<32>());
    struct_buf.extend_from_slice(&envelope.max_fee_per_gas.to_be_bytes::<32>());
    struct_buf.extend_from_slice(&envelope.max_priority_fee_per_gas.to_be_bytes::<32>());
    struct_buf.extend_from_slice(&address_word(paymaster));
    struct_buf.extend_from_slice(&U256::from(envelope.nonce).to_be_bytes::<32>());
    struct_buf.extend_from_slice(&envelope.value.to_be_bytes::<32>());
    struct_buf.extend_from_slice(keccak256(&envelope.data).as_slice());
    struct_buf.extend_from_slice(keccak256(deps_buf).as_slice());
    struct_buf.extend_from_slice(keccak256(paymaster_input).as_slice());
    keccak256(struct_buf)
}

/// Digest the owners sign: `keccak256("\x19\x01" || domainSeparator || structHash)`.
pub fn signing_digest(envelope: &TransactionEnvelope) -> B256 {
    let mut final_buf = Vec::with_capacity(2 + 32 + 32);
    final_buf.extend_from_slice(b"\x19\x01");
    final_buf.extend_from_slice(domain_separator(envelope.chain_id).as_slice());
    final_buf.extend_from_slice(struct_hash(envelope).as_slice());
    keccak256(final_buf)
}

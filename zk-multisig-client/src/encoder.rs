//! Wire format of account-abstraction transactions.
//!
//! Layout (after the `0x71` type byte, one RLP list):
//! - nonce, maxPriorityFeePerGas, maxFeePerGas, gasLimit, to, value, data
//! - chainId, "", "" (ECDSA slots unused, the authorization travels in customSignature)
//! - chainId, from, gasPerPubdata
//! - [factoryDeps...]
//! - customSignature
//! - [paymaster, paymasterInput] or []

use alloy_primitives::{Address, Bytes, U256};
use rlp::{Rlp, RlpStream};
use zk_multisig_types::protocol::EIP712_TX_TYPE;

use crate::{
    types::{Eip712Meta, FactoryDep, PaymasterParams, TransactionEnvelope},
    Error, Result,
};

const FIELD_COUNT: usize = 16;

/// Encode a signed envelope.
pub fn encode_envelope(envelope: &TransactionEnvelope, custom_signature: &[u8]) -> Result<Bytes> {
    if envelope.tx_type != EIP712_TX_TYPE {
        return Err(Error::encoding(format!(
            "unsupported transaction type {:#04x}",
            envelope.tx_type
        )));
    }
    if custom_signature.is_empty() {
        return Err(Error::encoding("empty custom signatures are not supported"));
    }
    let meta = &envelope.meta;

    let mut stream = RlpStream::new_list(FIELD_COUNT);
    stream.append(&envelope.nonce);
    stream.append(&envelope.max_priority_fee_per_gas.to_be_bytes_trimmed_vec());
    stream.append(&envelope.max_fee_per_gas.to_be_bytes_trimmed_vec());
    stream.append(&envelope.gas_limit.to_be_bytes_trimmed_vec());
    stream.append(&envelope.to.to_vec());
    stream.append(&envelope.value.to_be_bytes_trimmed_vec());
    stream.append(&envelope.data.to_vec());

    stream.append(&envelope.chain_id);
    stream.append_empty_data();
    stream.append_empty_data();

    stream.append(&envelope.chain_id);
    stream.append(&envelope.from.to_vec());
    stream.append(&meta.gas_per_pubdata.to_be_bytes_trimmed_vec());

    stream.begin_list(meta.factory_deps.len());
    for dep in &meta.factory_deps {
        stream.append(&dep.bytecode().to_vec());
    }

    stream.append(&custom_signature.to_vec());

    match &meta.paymaster_params {
        Some(params) => {
            stream.begin_list(2);
            stream.append(&params.paymaster.to_vec());
            stream.append(&params.input.to_vec());
        }
        None => {
            stream.begin_list(0);
        }
    }

    let body = stream.out();
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(EIP712_TX_TYPE);
    out.extend_from_slice(&body);
    Ok(out.into())
}

/// A transaction read back from its wire encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedEnvelope {
    pub envelope: TransactionEnvelope,
    pub custom_signature: Bytes,
}

fn u256_at(rlp: &Rlp<'_>, index: usize) -> Result<U256> {
    let bytes: Vec<u8> = rlp.val_at(index)?;
    if bytes.len() > 32 || bytes.first() == Some(&0) {
        return Err(Error::encoding(format!("field {index} is not a canonical uint256")));
    }
    if bytes.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::try_from_be_slice(&bytes)
        .ok_or_else(|| Error::encoding(format!("field {index} overflows uint256")))
}

fn address_from(bytes: &[u8], what: &str) -> Result<Address> {
    if bytes.len() != 20 {
        return Err(Error::encoding(format!(
            "{what} must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

/// Decode the wire encoding produced by [`encode_envelope`].
pub fn decode_envelope(raw: &[u8]) -> Result<DecodedEnvelope> {
    let (&tag, body) = raw
        .split_first()
        .ok_or_else(|| Error::encoding("empty transaction"))?;
    if tag != EIP712_TX_TYPE {
        return Err(Error::encoding(format!("unsupported transaction type {tag:#04x}")));
    }

    let rlp = Rlp::new(body);
    if rlp.payload_info()?.total() != body.len() {
        // reject trailing bytes for determinism
        return Err(Error::encoding("trailing bytes after transaction"));
    }
    if rlp.item_count()? != FIELD_COUNT {
        return Err(Error::encoding(format!(
            "expected {FIELD_COUNT} fields, got {}",
            rlp.item_count()?
        )));
    }

    let chain_id: u64 = rlp.val_at(7)?;
    let signed_chain_id: u64 = rlp.val_at(10)?;
    if chain_id != signed_chain_id {
        return Err(Error::encoding("chain id fields disagree"));
    }

    let factory_deps = rlp
        .list_at::<Vec<u8>>(13)?
        .into_iter()
        .map(|bytecode| FactoryDep::new(bytecode.into()))
        .collect::<Result<Vec<_>>>()?;

    let paymaster = rlp.at(15)?;
    let paymaster_params = match paymaster.item_count()? {
        0 => None,
        2 => {
            let address: Vec<u8> = paymaster.val_at(0)?;
            let input: Vec<u8> = paymaster.val_at(1)?;
            Some(PaymasterParams {
                paymaster: address_from(&address, "paymaster")?,
                input: input.into(),
            })
        }
        n => return Err(Error::encoding(format!("paymaster params have {n} fields"))),
    };

    let to: Vec<u8> = rlp.val_at(4)?;
    let from: Vec<u8> = rlp.val_at(11)?;
    let data: Vec<u8> = rlp.val_at(6)?;
    let custom_signature: Vec<u8> = rlp.val_at(14)?;

    let envelope = TransactionEnvelope {
        tx_type: tag,
        chain_id,
        nonce: rlp.val_at(0)?,
        from: address_from(&from, "from")?,
        to: address_from(&to, "to")?,
        value: u256_at(&rlp, 5)?,
        data: data.into(),
        gas_limit: u256_at(&rlp, 3)?,
        max_fee_per_gas: u256_at(&rlp, 2)?,
        max_priority_fee_per_gas: u256_at(&rlp, 1)?,
        meta: Eip712Meta {
            gas_per_pubdata: u256_at(&rlp, 12)?,
            factory_deps,
            paymaster_params,
        },
    };

    Ok(DecodedEnvelope {
        envelope,
        custom_signature: custom_signature.into(),
    })
}

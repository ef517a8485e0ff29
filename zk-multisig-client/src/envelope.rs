//! Envelope construction and the sealed/signed stages that follow it.
//!
//! [`TransactionEnvelope`] is mutable. Sealing computes the digest and freezes the fields; the
//! only way back to a mutable envelope is [`SealedEnvelope::into_draft`], which drops the digest
//! so anything signed before must be signed again.

use alloy_primitives::{Address, Bytes, B256, U256};
use tracing::debug;
use zk_multisig_types::{
    protocol::{DEFAULT_GAS_PER_PUBDATA_LIMIT, EIP712_TX_TYPE},
    CallRequest, Network,
};

use crate::{
    aggregate::AggregatedAuthorization,
    digest::signing_digest,
    encoder::encode_envelope,
    error::OpContext,
    types::{Call, Eip712Meta, FactoryDep, PaymasterParams, TransactionEnvelope},
    Error, Result,
};

/// Populates an envelope from a call and a fresh network snapshot (gas, price, chain id, nonce).
pub struct EnvelopeBuilder<'a, N: ?Sized> {
    network: &'a N,
    gas_per_pubdata: U256,
    factory_deps: Vec<FactoryDep>,
    paymaster_params: Option<PaymasterParams>,
}

impl<'a, N: Network + ?Sized> EnvelopeBuilder<'a, N> {
    pub fn new(network: &'a N) -> Self {
        Self {
            network,
            gas_per_pubdata: U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT),
            factory_deps: Vec::new(),
            paymaster_params: None,
        }
    }

    pub fn gas_per_pubdata(mut self, gas_per_pubdata: U256) -> Self {
        self.gas_per_pubdata = gas_per_pubdata;
        self
    }

    pub fn factory_deps(mut self, deps: Vec<FactoryDep>) -> Self {
        self.factory_deps = deps;
        self
    }

    pub fn paymaster(mut self, params: PaymasterParams) -> Self {
        self.paymaster_params = Some(params);
        self
    }

    /// Query the network and assemble the unsigned envelope.
    ///
    /// Estimation failures are returned as is: retrying would take a new snapshot.
    pub async fn build(self, from: Address, call: &Call) -> Result<TransactionEnvelope> {
        let context = OpContext::new("build-envelope", from);
        let request = CallRequest {
            from,
            to: call.to,
            data: call.data.clone(),
            value: call.value,
            gas_per_pubdata: self.gas_per_pubdata,
            factory_deps: self
                .factory_deps
                .iter()
                .map(|dep| dep.bytecode().clone())
                .collect(),
        };

        let gas_limit = self
            .network
            .estimate_resource_cost(&request)
            .await
            .map_err(|source| Error::Estimation {
                context: context.clone(),
                source,
            })?;
        let gas_price = self
            .network
            .resource_unit_price()
            .await
            .map_err(|e| Error::provider(&context, e))?;
        let chain_id = self
            .network
            .chain_id()
            .await
            .map_err(|e| Error::provider(&context, e))?;
        let nonce = self
            .network
            .account_nonce(from)
            .await
            .map_err(|e| Error::provider(&context, e))?;

        debug!(%from, to = %call.to, %gas_limit, %gas_price, chain_id, nonce, "envelope built");

        Ok(TransactionEnvelope {
            tx_type: EIP712_TX_TYPE,
            chain_id,
            nonce,
            from,
            to: call.to,
            value: call.value,
            data: call.data.clone(),
            gas_limit,
            max_fee_per_gas: gas_price,
            max_priority_fee_per_gas: gas_price,
            meta: Eip712Meta {
                gas_per_pubdata: self.gas_per_pubdata,
                factory_deps: self.factory_deps,
                paymaster_params: self.paymaster_params,
            },
        })
    }
}

impl TransactionEnvelope {
    /// Freeze the envelope and compute the digest owners will sign.
    pub fn seal(self) -> SealedEnvelope {
        let digest = signing_digest(&self);
        SealedEnvelope {
            envelope: self,
            digest,
        }
    }
}

/// Envelope whose digest has been computed. Read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedEnvelope {
    envelope: TransactionEnvelope,
    digest: B256,
}

impl SealedEnvelope {
    pub fn envelope(&self) -> &TransactionEnvelope {
        &self.envelope
    }

    pub fn digest(&self) -> B256 {
        self.digest
    }

    /// Give up the digest to edit fields again.
    pub fn into_draft(self) -> TransactionEnvelope {
        self.envelope
    }

    /// Attach the aggregated owner signatures.
    pub fn authorize(self, authorization: AggregatedAuthorization) -> SignedEnvelope {
        SignedEnvelope {
            sealed: self,
            authorization: authorization.into_bytes(),
        }
    }

    /// Attach an arbitrary authorization blob, e.g. a single EOA signature or signatures
    /// collected out of band. The network decides whether it validates.
    pub fn with_custom_signature(self, authorization: Bytes) -> Result<SignedEnvelope> {
        if authorization.is_empty() {
            return Err(Error::encoding("empty custom signatures are not supported"));
        }
        Ok(SignedEnvelope {
            sealed: self,
            authorization,
        })
    }
}

/// Sealed envelope plus its authorization, ready to serialize.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedEnvelope {
    sealed: SealedEnvelope,
    authorization: Bytes,
}

impl SignedEnvelope {
    pub fn envelope(&self) -> &TransactionEnvelope {
        self.sealed.envelope()
    }

    pub fn digest(&self) -> B256 {
        self.sealed.digest()
    }

    pub fn authorization(&self) -> &Bytes {
        &self.authorization
    }

    /// Wire encoding accepted by `eth_sendRawTransaction`.
    pub fn encode(&self) -> Result<Bytes> {
        encode_envelope(self.envelope(), &self.authorization)
    }
}

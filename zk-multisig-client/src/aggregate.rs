//! Assembly of the account authorization blob.
//!
//! The account contract checks the first 65 bytes against owner 1 and the next 65 against
//! owner 2, by position. This module only concatenates; it never verifies.

use alloy_primitives::Bytes;
use zk_multisig_types::protocol::{ECDSA_SIGNATURE_LENGTH, OWNER_COUNT};

use crate::{signer::OwnerSignature, Error, Result};

/// Concatenated owner signatures, exactly `OWNER_COUNT * 65` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatedAuthorization(Bytes);

impl AggregatedAuthorization {
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

/// Concatenate signatures in the order given: slot 0 is checked against owner 1.
pub fn aggregate(signatures: &[OwnerSignature]) -> Result<AggregatedAuthorization> {
    if signatures.len() != OWNER_COUNT {
        return Err(Error::Arity {
            expected: OWNER_COUNT,
            actual: signatures.len(),
        });
    }
    let mut buf = Vec::with_capacity(ECDSA_SIGNATURE_LENGTH * OWNER_COUNT);
    for signature in signatures {
        buf.extend_from_slice(&signature.bytes);
    }
    Ok(AggregatedAuthorization(buf.into()))
}

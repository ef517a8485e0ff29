//! Owner keys and raw-digest signatures.
//!
//! Owners sign the typed-data digest directly. Wallet "personal sign" would prefix the digest
//! with `\x19Ethereum Signed Message:\n32` and the account contract would reject it.

use std::fmt;

use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use zk_multisig_types::protocol::{ECDSA_SIGNATURE_LENGTH, OWNER_COUNT};

use crate::{Error, Result};

fn address_of(key: &VerifyingKey) -> Address {
    let point = key.to_encoded_point(false);
    Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..])
}

/// Private key of one owner. Never printed: `Debug` shows the address only.
#[derive(Clone)]
pub struct OwnerKey {
    key: SigningKey,
    address: Address,
}

impl OwnerKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key = SigningKey::from_slice(bytes)?;
        let address = address_of(key.verifying_key());
        Ok(Self { key, address })
    }

    /// Parse a hex private key, with or without `0x`.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let trimmed = hex_key.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes =
            hex::decode(stripped).map_err(|_| Error::Signing("private key is not valid hex".into()))?;
        Self::from_bytes(&bytes)
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest as is, returning `r || s || v` with `v` in {27, 28}.
    pub fn sign_digest(&self, digest: B256) -> Result<[u8; ECDSA_SIGNATURE_LENGTH]> {
        let (signature, recovery_id) = self.key.sign_prehash_recoverable(digest.as_slice())?;
        let mut out = [0u8; ECDSA_SIGNATURE_LENGTH];
        out[..64].copy_from_slice(&signature.to_bytes());
        out[64] = 27 + recovery_id.to_byte();
        Ok(out)
    }
}

impl fmt::Debug for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("OwnerKey").field(&self.address).finish()
    }
}

/// One owner's signature over a digest, tagged with the owner's slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OwnerSignature {
    pub owner_index: usize,
    pub bytes: [u8; ECDSA_SIGNATURE_LENGTH],
}

/// Recover the address that produced `signature` over `digest`.
///
/// Accepts `v` in {0, 1, 27, 28}.
pub fn recover_signer(digest: B256, signature: &[u8]) -> Result<Address> {
    if signature.len() != ECDSA_SIGNATURE_LENGTH {
        return Err(Error::Signing(format!(
            "signature must be {ECDSA_SIGNATURE_LENGTH} bytes, got {}",
            signature.len()
        )));
    }
    let v = match signature[64] {
        v @ (27 | 28) => v - 27,
        v @ (0 | 1) => v,
        other => return Err(Error::Signing(format!("invalid recovery byte {other}"))),
    };
    let recovery_id =
        RecoveryId::from_byte(v).ok_or_else(|| Error::Signing("invalid recovery id".into()))?;
    let signature = Signature::from_slice(&signature[..64])?;
    let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)?;
    Ok(address_of(&key))
}

/// The two key-holders of a multisig, in signature order.
#[derive(Clone, Debug)]
pub struct MultisigOwners {
    keys: [OwnerKey; OWNER_COUNT],
}

impl MultisigOwners {
    pub fn new(owner1: OwnerKey, owner2: OwnerKey) -> Self {
        Self {
            keys: [owner1, owner2],
        }
    }

    pub fn addresses(&self) -> [Address; OWNER_COUNT] {
        [self.keys[0].address(), self.keys[1].address()]
    }

    pub fn key(&self, owner_index: usize) -> Option<&OwnerKey> {
        self.keys.get(owner_index)
    }

    /// Sign with a single owner.
    pub fn sign(&self, owner_index: usize, digest: B256) -> Result<OwnerSignature> {
        let key = self
            .key(owner_index)
            .ok_or_else(|| Error::Signing(format!("no owner at index {owner_index}")))?;
        Ok(OwnerSignature {
            owner_index,
            bytes: key.sign_digest(digest)?,
        })
    }

    /// Collect every owner's signature, owner 1 first.
    pub fn sign_in_order(&self, digest: B256) -> Result<Vec<OwnerSignature>> {
        (0..OWNER_COUNT).map(|index| self.sign(index, digest)).collect()
    }
}

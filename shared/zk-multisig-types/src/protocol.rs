use alloy_primitives::{address, Address};

/// Transaction type reserved for account-abstraction (EIP-712) transactions.
pub const EIP712_TX_TYPE: u8 = 0x71;

/// Network-mandated default for the per-pubdata-byte gas limit.
pub const DEFAULT_GAS_PER_PUBDATA_LIMIT: u64 = 50_000;

/// System contract that performs every contract deployment and emits `ContractDeployed`.
pub const CONTRACT_DEPLOYER_ADDRESS: Address =
    address!("0000000000000000000000000000000000008006");

/// Typed-data domain used for transaction digests.
pub const EIP712_DOMAIN_NAME: &str = "zkSync";
pub const EIP712_DOMAIN_VERSION: &str = "2";

/// Length of one owner signature (r || s || v).
pub const ECDSA_SIGNATURE_LENGTH: usize = 65;

/// The multisig is fixed at exactly two owners.
pub const OWNER_COUNT: usize = 2;

/// Upper bound on the number of 32-byte words a versioned bytecode hash can describe.
pub const MAX_BYTECODE_WORDS: usize = (1 << 16) - 1;

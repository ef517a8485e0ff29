//! Client-side construction and submission protocol for zkSync two-owner multisig accounts.
//!
//! - [`address`]: deterministic account addresses and bytecode hashes.
//! - [`envelope`]: envelope construction from a network snapshot, sealing, authorization.
//! - [`digest`] / [`signer`]: typed-data digest and raw-digest owner signatures.
//! - [`aggregate`]: fixed-order concatenation of the two owner signatures.
//! - [`encoder`]: wire encoding of `0x71` transactions.
//! - [`coordinator`]: the deploy and send sagas.

pub mod abi;
pub mod address;
pub mod aggregate;
pub mod coordinator;
pub mod digest;
pub mod encoder;
pub mod envelope;
pub mod error;
pub mod mock;
pub mod signer;
pub mod types;


pub use address::Account;
pub use aggregate::{aggregate, AggregatedAuthorization};
pub use coordinator::{
    CoordinatorConfig, DeploymentRecord, Operation, OperationKind, SendOutcome, SubmissionCoordinator,
    SubmissionState,
};
pub use envelope::{EnvelopeBuilder, SealedEnvelope, SignedEnvelope};
pub use error::{Error, OpContext, Result};
pub use signer::{MultisigOwners, OwnerKey, OwnerSignature};
pub use types::{Call, Eip712Meta, FactoryDep, PaymasterParams, TransactionEnvelope};

use std::{fmt, time::Duration};

use alloy_primitives::Address;
use zk_multisig_types::NetworkError;

use crate::coordinator::SubmissionState;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Where a failure happened: enough for a caller to log it and to re-query the chain
/// by account and nonce before deciding on a retry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpContext {
    pub operation: &'static str,
    pub account: Address,
    pub nonce: Option<u64>,
}

impl OpContext {
    pub fn new(operation: &'static str, account: Address) -> Self {
        Self {
            operation,
            account,
            nonce: None,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

impl fmt::Display for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [account {}", self.operation, self.account)?;
        if let Some(nonce) = self.nonce {
            write!(f, ", nonce {nonce}")?;
        }
        f.write_str("]")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Constructor arguments, salt, bytecode or wire bytes could not be canonically encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The node refused to price the call; usually the call itself would revert.
    #[error("{context}: resource estimation failed: {source}")]
    Estimation {
        context: OpContext,
        #[source]
        source: NetworkError,
    },

    #[error("expected exactly {expected} owner signatures, got {actual}")]
    Arity { expected: usize, actual: usize },

    /// The node rejected the serialized envelope, or included it and it reverted.
    #[error("{context}: submission failed: {reason}")]
    Submission { context: OpContext, reason: String },

    /// No answer within the deadline. The transaction may still confirm later.
    #[error("{context}: no response within {limit:?}, outcome is indeterminate")]
    Timeout { context: OpContext, limit: Duration },

    /// A post-confirmation check failed; points at an encoding or protocol mismatch.
    #[error("{context}: verification failed: {reason}")]
    Verification { context: OpContext, reason: String },

    /// A read-only collaborator call (balance, nonce, chain id, ...) failed.
    #[error("{context}: provider call failed: {source}")]
    Provider {
        context: OpContext,
        #[source]
        source: NetworkError,
    },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("operation in state {from:?} cannot move to {to:?}")]
    InvalidTransition {
        from: SubmissionState,
        to: SubmissionState,
    },
}

impl Error {
    pub(crate) fn encoding(msg: impl Into<String>) -> Self {
        Error::Encoding(msg.into())
    }

    pub(crate) fn provider(context: &OpContext, source: NetworkError) -> Self {
        Error::Provider {
            context: context.clone(),
            source,
        }
    }

    pub(crate) fn verification(context: &OpContext, reason: impl Into<String>) -> Self {
        Error::Verification {
            context: context.clone(),
            reason: reason.into(),
        }
    }

    pub(crate) fn submission(context: &OpContext, reason: impl Into<String>) -> Self {
        Error::Submission {
            context: context.clone(),
            reason: reason.into(),
        }
    }

    /// `true` when the transaction may still land on chain and the caller must re-query
    /// by account and nonce before resending.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<k256::ecdsa::Error> for Error {
    fn from(err: k256::ecdsa::Error) -> Self {
        Error::Signing(err.to_string())
    }
}

impl From<rlp::DecoderError> for Error {
    fn from(err: rlp::DecoderError) -> Self {
        Error::Encoding(format!("malformed rlp: {err}"))
    }
}

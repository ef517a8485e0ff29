//! Submission sequencing for multisig accounts.
//!
//! Every logical operation is an explicit saga ([`Operation`]) that walks
//!
//! ```text
//! UNSTARTED -> ADDRESS_DERIVED -> [DEPLOYED] -> FUNDED -> ENVELOPE_BUILT -> DIGEST_COMPUTED
//!   -> SIGNATURES_COLLECTED -> SIGNED_ENVELOPE_READY -> SUBMITTED -> CONFIRMED | FAILED
//! ```
//!
//! A failed operation drops its envelope, digest and signatures. Operations are single use:
//! a retry starts from a new [`Operation`] and therefore from a fresh nonce/gas snapshot.
//!
//! Callers must serialize operations per account address; the nonce is read once per operation.

use std::{future::Future, time::Duration};

use alloy_primitives::{Address, B256, U256};
use serde::Serialize;
use tracing::{debug, info, warn};
use zk_multisig_types::{
    protocol::DEFAULT_GAS_PER_PUBDATA_LIMIT, AccountFactory, Funder, LogEntry, Network,
    NetworkError, Receipt, TxHash,
};

use crate::{
    address::{deployed_contracts, Account},
    aggregate::aggregate,
    envelope::{EnvelopeBuilder, SignedEnvelope},
    error::OpContext,
    signer::{MultisigOwners, OwnerSignature},
    types::Call,
    Error, Result,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionState {
    Unstarted,
    AddressDerived,
    Deployed,
    Funded,
    EnvelopeBuilt,
    DigestComputed,
    SignaturesCollected,
    SignedEnvelopeReady,
    Submitted,
    Confirmed,
    Failed,
}

impl SubmissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionState::Confirmed | SubmissionState::Failed)
    }

    fn can_advance_to(self, next: SubmissionState) -> bool {
        use SubmissionState::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Unstarted, AddressDerived)
            | (AddressDerived, Deployed)
            | (Deployed, Funded)
            | (Deployed, Confirmed)
            | (Funded, Confirmed)
            | (Funded, EnvelopeBuilt)
            | (Unstarted, EnvelopeBuilt)
            | (EnvelopeBuilt, DigestComputed)
            | (DigestComputed, SignaturesCollected)
            | (SignaturesCollected, SignedEnvelopeReady)
            // envelopes authorized out of band enter here
            | (Unstarted, SignedEnvelopeReady)
            | (SignedEnvelopeReady, Submitted)
            | (Submitted, Confirmed) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    DeployAccount,
    SendFromAccount,
}

impl OperationKind {
    fn name(self) -> &'static str {
        match self {
            OperationKind::DeployAccount => "deploy-account",
            OperationKind::SendFromAccount => "send-from-account",
        }
    }
}

/// Inspectable progress of one operation, keyed by account address and intended nonce.
#[derive(Clone, Debug)]
pub struct Operation {
    kind: OperationKind,
    state: SubmissionState,
    account: Option<Address>,
    nonce: Option<u64>,
    digest: Option<B256>,
    signatures: Vec<OwnerSignature>,
    tx_hashes: Vec<TxHash>,
    failure: Option<String>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            state: SubmissionState::Unstarted,
            account: None,
            nonce: None,
            digest: None,
            signatures: Vec::new(),
            tx_hashes: Vec::new(),
            failure: None,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn state(&self) -> SubmissionState {
        self.state
    }

    /// `(account, intended nonce)` once both are known.
    pub fn key(&self) -> Option<(Address, u64)> {
        Some((self.account?, self.nonce?))
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn nonce(&self) -> Option<u64> {
        self.nonce
    }

    pub fn digest(&self) -> Option<B256> {
        self.digest
    }

    pub fn signatures(&self) -> &[OwnerSignature] {
        &self.signatures
    }

    /// Hashes of every transaction this operation handed to the network, in order.
    pub fn tx_hashes(&self) -> &[TxHash] {
        &self.tx_hashes
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn advance(&mut self, next: SubmissionState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        debug!(kind = self.kind.name(), from = ?self.state, to = ?next, "operation advanced");
        self.state = next;
        Ok(())
    }

    fn expect_kind(&self, kind: OperationKind, entry: SubmissionState) -> Result<()> {
        if self.kind != kind || self.state != SubmissionState::Unstarted {
            return Err(Error::InvalidTransition {
                from: self.state,
                to: entry,
            });
        }
        Ok(())
    }

    pub(crate) fn fail(&mut self, err: &Error) {
        // partial progress is never reused
        self.digest = None;
        self.signatures.clear();
        self.failure = Some(err.to_string());
        self.state = SubmissionState::Failed;
    }
}

/// Immutable configuration handed to the coordinator at construction.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    pub owners: MultisigOwners,
    pub salt: B256,
    pub gas_per_pubdata: U256,
    /// Deadline applied to every network round trip.
    pub call_timeout: Option<Duration>,
}

impl CoordinatorConfig {
    pub fn new(owners: MultisigOwners) -> Self {
        Self {
            owners,
            salt: B256::ZERO,
            gas_per_pubdata: U256::from(DEFAULT_GAS_PER_PUBDATA_LIMIT),
            call_timeout: None,
        }
    }

    pub fn with_salt(mut self, salt: B256) -> Self {
        self.salt = salt;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// What the deploy path observed on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeploymentRecord {
    pub address: Address,
    pub owner1: Address,
    pub owner2: Address,
    pub funded_balance: U256,
    pub tx_hashes: Vec<TxHash>,
}

/// What the send path observed on chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub tx_hash: TxHash,
    pub nonce_before: u64,
    pub nonce_after: u64,
    pub balance_before: U256,
    pub balance_after: U256,
    /// Everything the account paid beyond the transferred value.
    pub fee: U256,
    /// Logs of the confirmed transaction.
    #[serde(skip)]
    pub logs: Vec<LogEntry>,
}

pub struct SubmissionCoordinator<N, F, D> {
    network: N,
    factory: F,
    funder: D,
    config: CoordinatorConfig,
}

impl<N, F, D> SubmissionCoordinator<N, F, D>
where
    N: Network,
    F: AccountFactory,
    D: Funder,
{
    pub fn new(network: N, factory: F, funder: D, config: CoordinatorConfig) -> Self {
        Self {
            network,
            factory,
            funder,
            config,
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Predict the multisig address for the configured owners and salt.
    pub async fn derive_account(&self) -> Result<Account> {
        let context = OpContext::new("derive-account", self.factory.address());
        let code_hash = self
            .bounded(&context, async {
                self.factory
                    .code_identity_hash()
                    .await
                    .map_err(|e| Error::provider(&context, e))
            })
            .await?;
        let [owner1, owner2] = self.config.owners.addresses();
        Account::derive(
            self.factory.address(),
            code_hash,
            self.config.salt,
            owner1,
            owner2,
        )
    }

    /// Derive, deploy and optionally fund the multisig account.
    pub async fn deploy_account(
        &self,
        op: &mut Operation,
        funding: Option<U256>,
    ) -> Result<DeploymentRecord> {
        op.expect_kind(OperationKind::DeployAccount, SubmissionState::AddressDerived)?;
        let result = self.run_deploy(op, funding).await;
        if let Err(ref err) = result {
            warn!(operation = "deploy-account", error = %err, "operation failed");
            op.fail(err);
        }
        result
    }

    /// Build, sign with both owners, submit and verify a call from `account`.
    pub async fn send_from_account(
        &self,
        op: &mut Operation,
        account: &Account,
        call: Call,
    ) -> Result<SendOutcome> {
        op.expect_kind(OperationKind::SendFromAccount, SubmissionState::EnvelopeBuilt)?;
        let result = self.run_send(op, account, call).await;
        if let Err(ref err) = result {
            warn!(operation = "send-from-account", account = %account.address(), error = %err, "operation failed");
            op.fail(err);
        }
        result
    }

    /// Submit an envelope whose authorization was assembled elsewhere.
    pub async fn submit_signed(
        &self,
        op: &mut Operation,
        signed: SignedEnvelope,
    ) -> Result<SendOutcome> {
        op.expect_kind(
            OperationKind::SendFromAccount,
            SubmissionState::SignedEnvelopeReady,
        )?;
        let result = self.run_submit_signed(op, signed).await;
        if let Err(ref err) = result {
            warn!(operation = "send-from-account", error = %err, "operation failed");
            op.fail(err);
        }
        result
    }

    async fn run_deploy(
        &self,
        op: &mut Operation,
        funding: Option<U256>,
    ) -> Result<DeploymentRecord> {
        let account = self.derive_account().await?;
        let address = account.address();
        let [owner1, owner2] = account.owners();
        op.account = Some(address);
        op.advance(SubmissionState::AddressDerived)?;
        info!(%address, %owner1, %owner2, "multisig address derived");

        let context = OpContext::new("deploy-account", address);
        let tx_hash = self
            .bounded(&context, async {
                self.factory
                    .deploy_account(account.salt(), owner1, owner2)
                    .await
                    .map_err(|e| submission_error(&context, e))
            })
            .await?;
        op.tx_hashes.push(tx_hash);
        let receipt = self.confirm(&context, tx_hash).await?;

        let deployed = deployed_contracts(&receipt.logs, account.factory());
        if !deployed.contains(&address) {
            return Err(Error::verification(
                &context,
                format!("factory deployed {deployed:?}, derived address is {address}"),
            ));
        }
        op.advance(SubmissionState::Deployed)?;
        info!(%address, %tx_hash, "multisig deployed");

        let mut funded_balance = self.read_balance(&context, address).await?;
        if let Some(amount) = funding {
            let before = funded_balance;
            let fund_tx = self
                .bounded(&context, async {
                    self.funder
                        .transfer(address, amount)
                        .await
                        .map_err(|e| submission_error(&context, e))
                })
                .await?;
            op.tx_hashes.push(fund_tx);
            self.confirm(&context, fund_tx).await?;

            funded_balance = self.read_balance(&context, address).await?;
            if funded_balance < before.saturating_add(amount) {
                return Err(Error::verification(
                    &context,
                    format!("balance {funded_balance} after funding {amount} on top of {before}"),
                ));
            }
            op.advance(SubmissionState::Funded)?;
            info!(%address, balance = %funded_balance, "multisig funded");
        }

        op.advance(SubmissionState::Confirmed)?;
        Ok(DeploymentRecord {
            address,
            owner1,
            owner2,
            funded_balance,
            tx_hashes: op.tx_hashes.clone(),
        })
    }

    async fn run_send(
        &self,
        op: &mut Operation,
        account: &Account,
        call: Call,
    ) -> Result<SendOutcome> {
        let from = account.address();
        op.account = Some(from);
        let context = OpContext::new("send-from-account", from);

        let envelope = self
            .bounded(
                &context,
                EnvelopeBuilder::new(&self.network)
                    .gas_per_pubdata(self.config.gas_per_pubdata)
                    .build(from, &call),
            )
            .await?;
        op.nonce = Some(envelope.nonce);
        op.advance(SubmissionState::EnvelopeBuilt)?;

        let sealed = envelope.seal();
        op.digest = Some(sealed.digest());
        op.advance(SubmissionState::DigestComputed)?;
        debug!(%from, digest = %sealed.digest(), "digest computed");

        let signatures = self.config.owners.sign_in_order(sealed.digest())?;
        op.signatures = signatures.clone();
        op.advance(SubmissionState::SignaturesCollected)?;

        let signed = sealed.authorize(aggregate(&signatures)?);
        op.advance(SubmissionState::SignedEnvelopeReady)?;

        self.submit_and_verify(op, signed).await
    }

    async fn run_submit_signed(
        &self,
        op: &mut Operation,
        signed: SignedEnvelope,
    ) -> Result<SendOutcome> {
        op.account = Some(signed.envelope().from);
        op.nonce = Some(signed.envelope().nonce);
        op.digest = Some(signed.digest());
        op.advance(SubmissionState::SignedEnvelopeReady)?;
        self.submit_and_verify(op, signed).await
    }

    async fn submit_and_verify(
        &self,
        op: &mut Operation,
        signed: SignedEnvelope,
    ) -> Result<SendOutcome> {
        let envelope = signed.envelope();
        let from = envelope.from;
        let nonce_before = envelope.nonce;
        let value = envelope.value;
        let context = OpContext::new("send-from-account", from).with_nonce(nonce_before);

        let balance_before = self.read_balance(&context, from).await?;
        let raw = signed.encode()?;

        let tx_hash = self
            .bounded(&context, async {
                self.network
                    .submit(raw)
                    .await
                    .map_err(|e| submission_error(&context, e))
            })
            .await?;
        op.tx_hashes.push(tx_hash);
        op.advance(SubmissionState::Submitted)?;
        info!(%from, nonce = nonce_before, %tx_hash, "transaction submitted");

        let receipt = self.confirm(&context, tx_hash).await?;

        let nonce_after = self.read_nonce(&context, from).await?;
        if nonce_after != nonce_before + 1 {
            return Err(Error::verification(
                &context,
                format!("nonce moved from {nonce_before} to {nonce_after}, expected exactly one step"),
            ));
        }

        let balance_after = self.read_balance(&context, from).await?;
        let spent = balance_before.checked_sub(balance_after).ok_or_else(|| {
            Error::verification(
                &context,
                format!("balance grew from {balance_before} to {balance_after}"),
            )
        })?;
        if spent < value {
            return Err(Error::verification(
                &context,
                format!("balance dropped by {spent}, less than the transferred {value}"),
            ));
        }

        op.advance(SubmissionState::Confirmed)?;
        info!(%from, nonce = nonce_after, %tx_hash, fee = %(spent - value), "transaction confirmed");
        Ok(SendOutcome {
            tx_hash,
            nonce_before,
            nonce_after,
            balance_before,
            balance_after,
            fee: spent - value,
            logs: receipt.logs,
        })
    }

    async fn confirm(&self, context: &OpContext, tx_hash: TxHash) -> Result<Receipt> {
        let receipt = self
            .bounded(context, async {
                self.network
                    .await_receipt(tx_hash)
                    .await
                    .map_err(|e| submission_error(context, e))
            })
            .await?;
        if !receipt.success {
            return Err(Error::submission(
                context,
                format!("transaction {tx_hash} reverted"),
            ));
        }
        Ok(receipt)
    }

    async fn read_balance(&self, context: &OpContext, address: Address) -> Result<U256> {
        self.bounded(context, async {
            self.network
                .balance_of(address)
                .await
                .map_err(|e| Error::provider(context, e))
        })
        .await
    }

    async fn read_nonce(&self, context: &OpContext, address: Address) -> Result<u64> {
        self.bounded(context, async {
            self.network
                .account_nonce(address)
                .await
                .map_err(|e| Error::provider(context, e))
        })
        .await
    }

    async fn bounded<T>(
        &self,
        context: &OpContext,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| Error::Timeout {
                    context: context.clone(),
                    limit,
                })?,
            None => fut.await,
        }
    }
}

fn submission_error(context: &OpContext, err: NetworkError) -> Error {
    let reason = match err {
        NetworkError::Rejected(reason) => reason,
        NetworkError::Transport(reason) => format!("transport failure: {reason}"),
    };
    Error::submission(context, reason)
}

//! End-to-end deploy and send flows against the in-memory network.

use std::time::Duration;

use alloy_primitives::{address, b256, Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use zk_multisig_client::{
    abi::IAAFactory,
    address::{deployed_contracts, hash_bytecode},
    aggregate,
    mock::MockNetwork,
    Account, Call, CoordinatorConfig, EnvelopeBuilder, Error, MultisigOwners, Operation,
    OperationKind, OwnerKey, SubmissionCoordinator, SubmissionState,
};
use zk_multisig_types::{AccountFactory, Funder, Network, NetworkError};

type Coordinator = SubmissionCoordinator<MockNetwork, MockNetwork, MockNetwork>;

const CHAIN_ID: u64 = 270;
const ONE_ETHER: u128 = 1_000_000_000_000_000_000;
const FUNDING: u128 = 5_000_000_000_000_000;

fn factory_address() -> Address {
    address!("000000000000000000000000000000000000000f")
}

fn recipient() -> Address {
    address!("00000000000000000000000000000000000000c3")
}

/// Where the factory puts the (0xa1, 0xa2) account with a zero salt.
fn known_account() -> Address {
    address!("15c0d813ebf7501d56f59ec3dc0095e719692b14")
}

/// Where the factory puts the (0xb1, 0xb2) account with a zero salt.
fn known_nested_account() -> Address {
    address!("f7f360b87994ab06d1cccb7f260e193d8d1e0d6b")
}

fn owner(byte: u8) -> OwnerKey {
    OwnerKey::from_bytes(&[byte; 32]).unwrap()
}

fn account_code_hash() -> B256 {
    hash_bytecode(&[0x60; 32 * 5]).unwrap()
}

fn setup(config: impl FnOnce(CoordinatorConfig) -> CoordinatorConfig) -> (MockNetwork, Coordinator) {
    let deployer = owner(0xde).address();
    let chain = MockNetwork::new(CHAIN_ID, factory_address(), account_code_hash(), deployer);
    chain.set_balance(deployer, U256::from(ONE_ETHER));
    chain.expect_deployment(
        B256::ZERO,
        owner(0xa1).address(),
        owner(0xa2).address(),
        known_account(),
    );

    let owners = MultisigOwners::new(owner(0xa1), owner(0xa2));
    let coordinator = SubmissionCoordinator::new(
        chain.clone(),
        chain.clone(),
        chain.clone(),
        config(CoordinatorConfig::new(owners)),
    );
    (chain, coordinator)
}

async fn deployed_account(coordinator: &Coordinator, funding: Option<U256>) -> Account {
    let mut op = Operation::new(OperationKind::DeployAccount);
    coordinator.deploy_account(&mut op, funding).await.unwrap();
    coordinator.derive_account().await.unwrap()
}

#[tokio::test]
async fn derived_address_matches_factory_deployment() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let predicted = coordinator.derive_account().await?;
    assert_eq!(
        owner(0xa1).address(),
        address!("5d5c99edf529335160ff180fa141dd4967fc00d2")
    );
    assert_eq!(
        owner(0xa2).address(),
        address!("a64c3a7db2a92f47bc3c0729563d8b1f351a62a4")
    );
    assert_eq!(
        account_code_hash(),
        b256!("010000057f70150503cbb988f612ea42a313c2c623633097a088703a1591b346")
    );
    assert_eq!(predicted.address(), known_account());

    let mut op = Operation::new(OperationKind::DeployAccount);
    let record = coordinator.deploy_account(&mut op, None).await?;

    assert_eq!(record.address, predicted.address());
    assert_eq!(op.state(), SubmissionState::Confirmed);
    assert_eq!(op.account(), Some(predicted.address()));
    assert_eq!(op.tx_hashes().len(), 1);
    assert_eq!(
        chain.owners_of(predicted.address()),
        Some([owner(0xa1).address(), owner(0xa2).address()])
    );
    assert_eq!(record.owner1, owner(0xa1).address());
    assert_eq!(record.owner2, owner(0xa2).address());
    Ok(())
}

#[tokio::test]
async fn deploy_funds_the_new_account() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let mut op = Operation::new(OperationKind::DeployAccount);
    let record = coordinator
        .deploy_account(&mut op, Some(U256::from(FUNDING)))
        .await?;

    assert_eq!(record.funded_balance, U256::from(FUNDING));
    assert_eq!(chain.balance_of(record.address).await?, U256::from(FUNDING));
    assert_eq!(record.tx_hashes.len(), 2);
    assert_eq!(op.state(), SubmissionState::Confirmed);
    Ok(())
}

#[tokio::test]
async fn deploy_fails_when_factory_reports_another_address() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    chain.misreport_deployments(address!("00000000000000000000000000000000000000ee"));

    let mut op = Operation::new(OperationKind::DeployAccount);
    let err = coordinator.deploy_account(&mut op, None).await.unwrap_err();

    assert!(matches!(err, Error::Verification { .. }), "{err}");
    assert_eq!(op.state(), SubmissionState::Failed);
    Ok(())
}

#[tokio::test]
async fn multisig_transfer_moves_value_and_nonce() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    let address = account.address();
    let half = U256::from(FUNDING / 2);

    let nonce_before = chain.account_nonce(address).await?;
    let balance_before = chain.balance_of(address).await?;

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let outcome = coordinator
        .send_from_account(&mut op, &account, Call::transfer(recipient(), half))
        .await?;

    assert_eq!(chain.account_nonce(address).await?, nonce_before + 1);
    let balance_after = chain.balance_of(address).await?;
    assert_eq!(balance_after, balance_before - half - outcome.fee);
    assert_eq!(outcome.fee, chain.fee_per_transaction());
    assert_eq!(chain.balance_of(recipient()).await?, half);

    assert_eq!(op.state(), SubmissionState::Confirmed);
    assert_eq!(op.key(), Some((address, nonce_before)));
    assert_eq!(op.signatures().len(), 2);
    assert_eq!(op.tx_hashes(), &[outcome.tx_hash]);
    Ok(())
}

#[tokio::test]
async fn single_owner_signature_is_rejected() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    let address = account.address();
    let nonce_before = chain.account_nonce(address).await?;

    let call = Call::transfer(recipient(), U256::from(FUNDING / 2));
    let sealed = EnvelopeBuilder::new(&chain).build(address, &call).await?.seal();
    let lone = owner(0xa1).sign_digest(sealed.digest())?;
    let signed = sealed.with_custom_signature(Bytes::from(lone.to_vec()))?;

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let err = coordinator.submit_signed(&mut op, signed).await.unwrap_err();

    assert!(matches!(err, Error::Submission { .. }), "{err}");
    assert_eq!(op.state(), SubmissionState::Failed);
    assert_eq!(chain.account_nonce(address).await?, nonce_before);
    Ok(())
}

#[tokio::test]
async fn swapped_signature_order_is_rejected() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    let address = account.address();

    let call = Call::transfer(recipient(), U256::from(1_000u64));
    let sealed = EnvelopeBuilder::new(&chain).build(address, &call).await?.seal();
    let signatures = coordinator.config().owners.sign_in_order(sealed.digest())?;
    let signed = sealed.authorize(aggregate(&[signatures[1], signatures[0]])?);

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let err = coordinator.submit_signed(&mut op, signed).await.unwrap_err();

    assert!(matches!(err, Error::Submission { .. }), "{err}");
    assert_eq!(chain.account_nonce(address).await?, 0);
    Ok(())
}

#[tokio::test]
async fn three_signatures_fail_before_any_io() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    let address = account.address();
    let balance_before = chain.balance_of(address).await?;

    let call = Call::transfer(recipient(), U256::from(1_000u64));
    let sealed = EnvelopeBuilder::new(&chain).build(address, &call).await?.seal();
    let mut signatures = coordinator.config().owners.sign_in_order(sealed.digest())?;
    signatures.push(signatures[0]);

    let err = aggregate(&signatures).unwrap_err();
    assert!(matches!(err, Error::Arity { expected: 2, actual: 3 }));
    assert_eq!(chain.account_nonce(address).await?, 0);
    assert_eq!(chain.balance_of(address).await?, balance_before);
    Ok(())
}

#[tokio::test]
async fn nonce_advances_exactly_once_per_confirmed_transaction() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    let address = account.address();

    for expected in 0..5u64 {
        assert_eq!(chain.account_nonce(address).await?, expected);
        let mut op = Operation::new(OperationKind::SendFromAccount);
        let outcome = coordinator
            .send_from_account(&mut op, &account, Call::transfer(recipient(), U256::from(10u64)))
            .await?;
        assert_eq!(outcome.nonce_before, expected);
        assert_eq!(outcome.nonce_after, expected + 1);
    }

    // a rejected submission leaves the nonce alone
    let sealed = EnvelopeBuilder::new(&chain)
        .build(address, &Call::transfer(recipient(), U256::from(10u64)))
        .await?
        .seal();
    let lone = owner(0xa2).sign_digest(sealed.digest())?;
    let mut op = Operation::new(OperationKind::SendFromAccount);
    assert!(coordinator
        .submit_signed(&mut op, sealed.with_custom_signature(Bytes::from(lone.to_vec()))?)
        .await
        .is_err());
    assert_eq!(chain.account_nonce(address).await?, 5);
    Ok(())
}

#[tokio::test]
async fn multisig_deploys_another_account_through_the_factory() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;

    let (new_owner1, new_owner2) = (owner(0xb1).address(), owner(0xb2).address());
    chain.expect_deployment(B256::ZERO, new_owner1, new_owner2, known_nested_account());
    let data = IAAFactory::deployAccountCall {
        salt: B256::ZERO,
        owner1: new_owner1,
        owner2: new_owner2,
    }
    .abi_encode();
    let call = Call::new(AccountFactory::address(&chain), data.into(), U256::ZERO);

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let outcome = coordinator.send_from_account(&mut op, &account, call).await?;

    let nested = Account::derive(
        factory_address(),
        account_code_hash(),
        B256::ZERO,
        new_owner1,
        new_owner2,
    )?;
    assert_eq!(nested.address(), known_nested_account());
    assert_eq!(
        deployed_contracts(&outcome.logs, factory_address()),
        vec![known_nested_account()]
    );
    assert_eq!(chain.owners_of(nested.address()), Some([new_owner1, new_owner2]));
    Ok(())
}

#[tokio::test]
async fn deployment_without_a_known_address_reverts() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;

    let data = IAAFactory::deployAccountCall {
        salt: B256::ZERO,
        owner1: owner(0xc1).address(),
        owner2: owner(0xc2).address(),
    }
    .abi_encode();
    let call = Call::new(factory_address(), data.into(), U256::ZERO);

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let err = coordinator
        .send_from_account(&mut op, &account, call)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Submission { .. }), "{err}");
    assert_eq!(op.state(), SubmissionState::Failed);
    Ok(())
}

#[tokio::test]
async fn overflowing_fee_or_value_is_rejected() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    let address = account.address();
    let balance_before = chain.balance_of(address).await?;
    let owners = &coordinator.config().owners;

    let call = Call::transfer(recipient(), U256::from(1u64));
    let mut huge_fee = EnvelopeBuilder::new(&chain).build(address, &call).await?;
    huge_fee.max_fee_per_gas = U256::MAX;
    let mut huge_value = EnvelopeBuilder::new(&chain).build(address, &call).await?;
    huge_value.value = U256::MAX;

    for envelope in [huge_fee, huge_value] {
        let sealed = envelope.seal();
        let signatures = owners.sign_in_order(sealed.digest())?;
        let signed = sealed.authorize(aggregate(&signatures)?);

        let result = chain.submit(signed.encode()?).await;
        assert!(matches!(result, Err(NetworkError::Rejected(_))), "{result:?}");
    }
    assert_eq!(chain.account_nonce(address).await?, 0);
    assert_eq!(chain.balance_of(address).await?, balance_before);
    assert_eq!(chain.balance_of(recipient()).await?, U256::ZERO);
    Ok(())
}

#[tokio::test]
async fn estimation_failure_surfaces_without_signing() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    chain.fail_estimation("execution reverted");

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let err = coordinator
        .send_from_account(&mut op, &account, Call::transfer(recipient(), U256::from(1u64)))
        .await
        .unwrap_err();

    match err {
        Error::Estimation { context, source } => {
            assert_eq!(context.account, account.address());
            assert!(source.to_string().contains("execution reverted"));
        }
        other => panic!("expected estimation error, got {other}"),
    }
    assert_eq!(op.state(), SubmissionState::Failed);
    assert!(op.signatures().is_empty());
    assert!(op.digest().is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn receipt_timeout_is_indeterminate() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c.with_call_timeout(Duration::from_secs(30)));
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;
    let address = account.address();
    chain.hang_receipts(true);

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let err = coordinator
        .send_from_account(&mut op, &account, Call::transfer(recipient(), U256::from(1u64)))
        .await
        .unwrap_err();

    assert!(err.is_indeterminate(), "{err}");
    match &err {
        Error::Timeout { context, .. } => assert_eq!(context.nonce, Some(0)),
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(op.state(), SubmissionState::Failed);
    assert_eq!(op.tx_hashes().len(), 1);
    // the node accepted it: the caller has to re-query before resending
    assert_eq!(chain.account_nonce(address).await?, 1);
    Ok(())
}

#[tokio::test]
async fn finished_operation_cannot_be_replayed() -> eyre::Result<()> {
    let (_chain, coordinator) = setup(|c| c);
    let account = deployed_account(&coordinator, Some(U256::from(FUNDING))).await;

    let mut op = Operation::new(OperationKind::SendFromAccount);
    let call = Call::transfer(recipient(), U256::from(1u64));
    coordinator
        .send_from_account(&mut op, &account, call.clone())
        .await?;

    let err = coordinator
        .send_from_account(&mut op, &account, call)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));
    assert_eq!(op.state(), SubmissionState::Confirmed);
    Ok(())
}

#[tokio::test]
async fn funding_draws_from_the_deployer() -> eyre::Result<()> {
    let (chain, coordinator) = setup(|c| c);
    let deployer = Funder::address(&chain);
    let before = chain.balance_of(deployer).await?;

    deployed_account(&coordinator, Some(U256::from(FUNDING))).await;

    let after = chain.balance_of(deployer).await?;
    assert!(before - after >= U256::from(FUNDING));
    Ok(())
}

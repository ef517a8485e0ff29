//! Publishing the `AAFactory` through the system contract deployer.

use std::{future::Future, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use anyhow::{anyhow, ensure, Context, Result};
use serde::Serialize;
use tracing::info;
use zk_multisig_client::{
    abi::IContractDeployer,
    address::{deployed_contracts, hash_bytecode},
    Call, EnvelopeBuilder, FactoryDep, OwnerKey,
};
use zk_multisig_types::{protocol::CONTRACT_DEPLOYER_ADDRESS, Network, TxHash};

#[derive(Debug, Clone, Serialize)]
pub struct FactoryDeployment {
    pub address: Address,
    pub account_code_hash: B256,
    pub tx_hash: TxHash,
}

/// Calldata for `ContractDeployer.create`, passing the account bytecode hash as the
/// factory's only constructor argument.
pub fn create_calldata(factory_hash: B256, account_code_hash: B256) -> Bytes {
    IContractDeployer::createCall {
        salt: B256::ZERO,
        bytecodeHash: factory_hash,
        input: account_code_hash.to_vec().into(),
    }
    .abi_encode()
    .into()
}

/// Deploy the factory from `deployer`, publishing both bytecodes as factory deps.
pub async fn deploy_factory<N: Network>(
    network: &N,
    deployer: &OwnerKey,
    factory_bytecode: Bytes,
    account_bytecode: Bytes,
    timeout: Duration,
) -> Result<FactoryDeployment> {
    let account_code_hash = hash_bytecode(&account_bytecode).context("account bytecode")?;
    let factory_dep = FactoryDep::new(factory_bytecode).context("factory bytecode")?;
    let account_dep = FactoryDep::new(account_bytecode)?;

    let call = Call::new(
        CONTRACT_DEPLOYER_ADDRESS,
        create_calldata(factory_dep.hash(), account_code_hash),
        U256::ZERO,
    );
    let envelope = bounded(
        timeout,
        "building the deployment transaction",
        EnvelopeBuilder::new(network)
            .factory_deps(vec![factory_dep, account_dep])
            .build(deployer.address(), &call),
    )
    .await?;
    let nonce = envelope.nonce;

    let sealed = envelope.seal();
    let signature = deployer.sign_digest(sealed.digest())?;
    let signed = sealed.with_custom_signature(Bytes::from(signature.to_vec()))?;

    let tx_hash = bounded(
        timeout,
        "submitting the deployment",
        network.submit(signed.encode()?),
    )
    .await?;
    info!(%tx_hash, nonce, deployer = %deployer.address(), "factory deployment submitted");

    let receipt = bounded(
        timeout,
        "waiting for the deployment receipt",
        network.await_receipt(tx_hash),
    )
    .await?;
    ensure!(receipt.success, "factory deployment {tx_hash} reverted");

    let address = deployed_contracts(&receipt.logs, deployer.address())
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("receipt for {tx_hash} reports no deployed contract"))?;
    info!(%address, %account_code_hash, "factory deployed");

    Ok(FactoryDeployment {
        address,
        account_code_hash,
        tx_hash,
    })
}

/// Run one network step under `limit`, naming the step in either failure.
async fn bounded<T, E>(
    limit: Duration,
    step: &str,
    fut: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| anyhow!("{step}: no response within {limit:?}"))?
        .with_context(|| step.to_string())
}

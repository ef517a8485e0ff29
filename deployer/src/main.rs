use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::SolCall;
use anyhow::{anyhow, ensure, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ethers::{
    middleware::SignerMiddleware,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    utils::{format_ether, parse_ether},
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zk_multisig_client::{
    abi::IAAFactory,
    address::{deployed_contracts, hash_bytecode},
    Account, Call, CoordinatorConfig, MultisigOwners,
    Operation, OperationKind, OwnerKey, SubmissionCoordinator,
};
use zk_multisig_types::{LogEntry, Network};

mod artifact;
mod deployments;
mod factory;
mod provider;

use deployments::LedgerTarget;
use provider::{from_ethers_u256, to_ethers_u256, DeployerClient, RpcFactory, RpcFunder, RpcNetwork};

const LOCAL_RPC_URL: &str = "http://localhost:3050";
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Deploy and drive zkSync two-owner multisig accounts.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Which node to talk to.
    #[arg(long, value_enum, default_value = "testnet", global = true)]
    network: Chain,

    /// RPC URL; required for testnet, defaults to a local node otherwise.
    #[arg(long, env = "ZKSYNC_TESTNET_URL", global = true)]
    rpc_url: Option<String>,

    /// Deployer private key (hex string, 0x...). Pays for deployments and funding.
    #[arg(long, env = "DEPLOY_PRIVATE_KEY", hide_env_values = true, global = true)]
    deploy_private_key: Option<String>,

    /// Path to write deployment info.
    #[arg(long, default_value = "deployments.json", global = true)]
    deployments_path: PathBuf,

    /// Deadline for each network call, including waiting for receipts.
    #[arg(long, default_value_t = 120, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Chain {
    Testnet,
    Local,
}

impl Chain {
    fn name(self) -> &'static str {
        match self {
            Chain::Testnet => "testnet",
            Chain::Local => "local",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the versioned bytecode hash of a compiled artifact.
    HashBytecode {
        #[arg(long)]
        artifact: PathBuf,
    },
    /// Deploy the account factory, publishing the multisig bytecode alongside it.
    DeployFactory {
        #[arg(long)]
        factory_artifact: PathBuf,
        #[arg(long)]
        account_artifact: PathBuf,
    },
    /// Print the address the multisig will have, without deploying it.
    Derive {
        #[command(flatten)]
        multisig: MultisigArgs,
        /// Account bytecode hash; read from the factory when omitted.
        #[arg(long)]
        code_hash: Option<B256>,
    },
    /// Deploy the multisig through the factory and optionally fund it.
    DeployAccount {
        #[command(flatten)]
        multisig: MultisigArgs,
        /// Amount of ether to send to the new account (eg, 0.005).
        #[arg(long)]
        fund: Option<String>,
    },
    /// Send a call from the multisig, authorized by both owners.
    Send {
        #[command(flatten)]
        multisig: MultisigArgs,
        #[arg(long)]
        to: Address,
        /// Amount of ether to transfer.
        #[arg(long, default_value = "0")]
        value: String,
        #[arg(long)]
        data: Option<Bytes>,
    },
    /// Have the multisig itself call the factory to deploy another multisig.
    DeployNested {
        #[command(flatten)]
        multisig: MultisigArgs,
        #[arg(long)]
        owner1: Address,
        #[arg(long)]
        owner2: Address,
        /// Salt for the nested account.
        #[arg(long, default_value_t = B256::ZERO)]
        nested_salt: B256,
    },
}

#[derive(Args, Debug)]
struct MultisigArgs {
    /// Address of the deployed `AAFactory`; read from the deployments file when omitted.
    #[arg(long, env = "AA_FACTORY_ADDRESS")]
    factory: Option<Address>,

    #[arg(long, env = "OWNER1_PRIVATE_KEY", hide_env_values = true)]
    owner1_key: String,

    #[arg(long, env = "OWNER2_PRIVATE_KEY", hide_env_values = true)]
    owner2_key: String,

    #[arg(long, default_value_t = B256::ZERO)]
    salt: B256,
}

impl MultisigArgs {
    fn owners(&self) -> Result<MultisigOwners> {
        let owner1 = OwnerKey::from_hex(&self.owner1_key).context("invalid OWNER1_PRIVATE_KEY")?;
        let owner2 = OwnerKey::from_hex(&self.owner2_key).context("invalid OWNER2_PRIVATE_KEY")?;
        Ok(MultisigOwners::new(owner1, owner2))
    }

    fn factory(&self, cli: &Cli) -> Result<Address> {
        if let Some(factory) = self.factory {
            return Ok(factory);
        }
        let recorded =
            deployments::recorded_address(&cli.deployments_path, cli.network.name(), "aa-factory")?
                .ok_or_else(|| {
                    anyhow!(
                        "missing factory: provide --factory (or set AA_FACTORY_ADDRESS), or run deploy-factory first"
                    )
                })?;
        recorded
            .parse()
            .with_context(|| format!("invalid factory address {recorded} in {}", cli.deployments_path.display()))
    }
}

/// Resolved connection settings shared by every command.
struct Session {
    chain: Chain,
    rpc_url: String,
    network: RpcNetwork,
    timeout: Duration,
}

impl Session {
    fn connect(cli: &Cli) -> Result<Self> {
        let rpc_url = match (cli.network, &cli.rpc_url) {
            (_, Some(url)) => url.clone(),
            (Chain::Local, None) => LOCAL_RPC_URL.to_string(),
            (Chain::Testnet, None) => {
                return Err(anyhow!(
                    "missing RPC endpoint: provide --rpc-url (or set ZKSYNC_TESTNET_URL)"
                ))
            }
        };
        let provider = Provider::<Http>::try_from(rpc_url.as_str())
            .with_context(|| format!("invalid RPC URL {rpc_url}"))?
            .interval(RECEIPT_POLL_INTERVAL);
        Ok(Self {
            chain: cli.network,
            rpc_url,
            network: RpcNetwork::new(provider, RECEIPT_POLL_INTERVAL),
            timeout: Duration::from_secs(cli.timeout_secs),
        })
    }

    async fn ledger_target(&self) -> Result<LedgerTarget<'_>> {
        let chain_id = self.network.chain_id().await?;
        Ok(LedgerTarget {
            network: self.chain.name(),
            rpc_url: &self.rpc_url,
            chain_id,
        })
    }

    async fn deployer_client(&self, key: Option<&str>) -> Result<Arc<DeployerClient>> {
        let key = key.ok_or_else(|| {
            anyhow!("missing deployer key: provide --deploy-private-key (or set DEPLOY_PRIVATE_KEY)")
        })?;
        let chain_id = self.network.chain_id().await?;
        let wallet: LocalWallet = key
            .trim_start_matches("0x")
            .parse()
            .context("invalid DEPLOY_PRIVATE_KEY")?;
        Ok(Arc::new(SignerMiddleware::new(
            self.network.provider().clone(),
            wallet.with_chain_id(chain_id),
        )))
    }

    async fn coordinator(
        &self,
        cli: &Cli,
        multisig: &MultisigArgs,
    ) -> Result<SubmissionCoordinator<RpcNetwork, RpcFactory<DeployerClient>, RpcFunder<DeployerClient>>>
    {
        let factory = multisig.factory(cli)?;
        let client = self.deployer_client(cli.deploy_private_key.as_deref()).await?;
        let deployer = provider::from_h160(client.address());
        let config = CoordinatorConfig::new(multisig.owners()?)
            .with_salt(multisig.salt)
            .with_call_timeout(self.timeout);
        Ok(SubmissionCoordinator::new(
            self.network.clone(),
            RpcFactory::new(client.clone(), factory),
            RpcFunder::new(client, deployer),
            config,
        ))
    }
}

fn parse_amount(amount: &str) -> Result<U256> {
    let wei = parse_ether(amount).with_context(|| format!("invalid ether amount `{amount}`"))?;
    Ok(from_ethers_u256(wei))
}

fn load_dotenv() {
    let path = std::env::var("DOTENV_CONFIG_PATH").unwrap_or_else(|_| "./.env".to_string());
    dotenv::from_path(&path).ok();
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    run(&cli).await
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::HashBytecode { artifact } => {
            let contract = artifact::load(artifact)?;
            let hash = hash_bytecode(&contract.bytecode)
                .with_context(|| format!("cannot hash {}", contract.name))?;
            println!("{}: {hash}", contract.name);
        }
        Command::DeployFactory {
            factory_artifact,
            account_artifact,
        } => {
            let session = Session::connect(cli)?;
            let key = cli.deploy_private_key.as_deref().ok_or_else(|| {
                anyhow!("missing deployer key: provide --deploy-private-key (or set DEPLOY_PRIVATE_KEY)")
            })?;
            let deployer = OwnerKey::from_hex(key).context("invalid DEPLOY_PRIVATE_KEY")?;
            let factory_contract = artifact::load(factory_artifact)?;
            let account_contract = artifact::load(account_artifact)?;

            let deployment = factory::deploy_factory(
                &session.network,
                &deployer,
                factory_contract.bytecode,
                account_contract.bytecode,
                session.timeout,
            )
            .await?;

            let target = session.ledger_target().await?;
            deployments::record_deployment(&cli.deployments_path, &target, "aa-factory", &deployment)?;
            println!("Deployed `AAFactory` to {}", deployment.address);
        }
        Command::Derive {
            multisig,
            code_hash,
        } => {
            let owners = multisig.owners()?;
            let factory = multisig.factory(cli)?;
            let code_hash = match code_hash {
                Some(hash) => *hash,
                None => {
                    let session = Session::connect(cli)?;
                    let reader = Arc::new(session.network.provider().clone());
                    zk_multisig_types::AccountFactory::code_identity_hash(&RpcFactory::new(
                        reader, factory,
                    ))
                    .await?
                }
            };
            let [owner1, owner2] = owners.addresses();
            let account = Account::derive(factory, code_hash, multisig.salt, owner1, owner2)?;
            println!("{}", serde_json::to_string_pretty(&account)?);
        }
        Command::DeployAccount { multisig, fund } => {
            let session = Session::connect(cli)?;
            let coordinator = session.coordinator(cli, multisig).await?;
            let funding = fund.as_deref().map(parse_amount).transpose()?;

            let mut op = Operation::new(OperationKind::DeployAccount);
            let record = coordinator.deploy_account(&mut op, funding).await?;

            let target = session.ledger_target().await?;
            deployments::record_deployment(&cli.deployments_path, &target, "multisig", &record)?;
            println!(
                "Deployed multisig to {} (balance {} ETH)",
                record.address,
                format_ether(to_ethers_u256(record.funded_balance))
            );
        }
        Command::Send {
            multisig,
            to,
            value,
            data,
        } => {
            let session = Session::connect(cli)?;
            let coordinator = session.coordinator(cli, multisig).await?;
            let account = coordinator.derive_account().await?;
            let call = Call::new(*to, data.clone().unwrap_or_default(), parse_amount(value)?);

            let mut op = Operation::new(OperationKind::SendFromAccount);
            let outcome = coordinator.send_from_account(&mut op, &account, call).await?;
            info!(tx_hash = %outcome.tx_hash, nonce = outcome.nonce_after, "send confirmed");
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::DeployNested {
            multisig,
            owner1,
            owner2,
            nested_salt,
        } => {
            let session = Session::connect(cli)?;
            let coordinator = session.coordinator(cli, multisig).await?;
            let account = coordinator.derive_account().await?;
            let nested = Account::derive(
                account.factory(),
                account.code_hash(),
                *nested_salt,
                *owner1,
                *owner2,
            )?;

            let data = IAAFactory::deployAccountCall {
                salt: *nested_salt,
                owner1: *owner1,
                owner2: *owner2,
            }
            .abi_encode();
            let call = Call::new(account.factory(), data.into(), U256::ZERO);

            let mut op = Operation::new(OperationKind::SendFromAccount);
            let outcome = coordinator.send_from_account(&mut op, &account, call).await?;
            confirm_nested_deployment(&outcome.logs, account.factory(), nested.address())?;

            let target = session.ledger_target().await?;
            deployments::record_deployment(
                &cli.deployments_path,
                &target,
                "multisig-nested",
                &json!({
                    "address": nested.address(),
                    "owner1": owner1,
                    "owner2": owner2,
                    "deployed_by": account.address(),
                    "tx_hash": outcome.tx_hash,
                }),
            )?;
            println!("Deployed nested multisig to {}", nested.address());
        }
    }
    Ok(())
}

/// The factory must report `expected` among the contracts it deployed in `logs`.
fn confirm_nested_deployment(logs: &[LogEntry], factory: Address, expected: Address) -> Result<()> {
    let deployed = deployed_contracts(logs, factory);
    ensure!(
        deployed.contains(&expected),
        "factory {factory} did not deploy the expected nested account {expected} (reported: {deployed:?})"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_sol_types::SolEvent;
    use zk_multisig_client::abi::IContractDeployer;
    use zk_multisig_types::protocol::CONTRACT_DEPLOYER_ADDRESS;

    fn contract_deployed(factory: Address, address: Address) -> LogEntry {
        LogEntry {
            address: CONTRACT_DEPLOYER_ADDRESS,
            topics: vec![
                IContractDeployer::ContractDeployed::SIGNATURE_HASH,
                factory.into_word(),
                B256::repeat_byte(0x01),
                address.into_word(),
            ],
            data: Bytes::new(),
        }
    }

    #[test]
    fn nested_deployment_is_confirmed_from_logs() {
        let factory = Address::repeat_byte(0x0f);
        let nested = Address::repeat_byte(0x4e);
        let logs = vec![contract_deployed(factory, nested)];

        confirm_nested_deployment(&logs, factory, nested).unwrap();
    }

    #[test]
    fn nested_deployment_mismatch_is_refused() {
        let factory = Address::repeat_byte(0x0f);
        let expected = Address::repeat_byte(0x4e);

        let other = vec![contract_deployed(factory, Address::repeat_byte(0x99))];
        let err = confirm_nested_deployment(&other, factory, expected).unwrap_err();
        assert!(err.to_string().contains("did not deploy"), "{err}");

        // a deployment by some other deployer does not count
        let foreign = vec![contract_deployed(Address::repeat_byte(0x77), expected)];
        assert!(confirm_nested_deployment(&foreign, factory, expected).is_err());
        assert!(confirm_nested_deployment(&[], factory, expected).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_send_with_defaults() {
        let cli = Cli::try_parse_from([
            "zk-multisig-deployer",
            "--network",
            "local",
            "send",
            "--factory",
            "0x000000000000000000000000000000000000000f",
            "--owner1-key",
            "0x01",
            "--owner2-key",
            "0x02",
            "--to",
            "0x00000000000000000000000000000000000000aa",
        ])
        .unwrap();

        assert_eq!(cli.network, Chain::Local);
        assert_eq!(cli.timeout_secs, 120);
        match cli.command {
            Command::Send { multisig, value, data, .. } => {
                assert_eq!(multisig.salt, B256::ZERO);
                assert_eq!(value, "0");
                assert!(data.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_ether_amounts() {
        assert_eq!(parse_amount("0.005").unwrap(), U256::from(5_000_000_000_000_000u64));
        assert!(parse_amount("five").is_err());
    }
}

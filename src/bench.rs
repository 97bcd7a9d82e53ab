//! Orchestration of the gas measurements.
//!
//! [`execute`] walks every contract variant of a [`Suite`] and measures, in order:
//!
//! 1. the deployment of one instance;
//! 2. one mint per configured batch size, each on a fresh instance;
//! 3. one transfer per scenario and token index, each on a fresh instance with the needed tokens minted and their ids
//!    discovered. The token indices of a scenario are measured concurrently.
//!
//! Every measurement runs on its own instance so no measurement pays for state left behind by another. The first
//! failure aborts the whole run.
//!
//! # Examples
//!
//! ```no_run
//! use std::{path::PathBuf, time::Duration};
//!
//! use gas_bench::{
//!     bench::{execute, Options},
//!     chain::RpcChain,
//!     deployable::compile,
//!     suite::Suite,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let suite = Suite::default();
//! let names: Vec<_> = suite.variants.iter().map(|v| v.name.clone()).collect();
//! let artifacts = compile(&PathBuf::from("."), &names, &suite.compiler)?;
//! let chain = RpcChain::connect("http://127.0.0.1:8545", Duration::from_millis(50))?;
//!
//! let results = execute(&chain, &artifacts, &suite, &Options::default()).await?;
//! #     Ok(())
//! # }
//! ```

use std::time::Duration;

use futures::future::try_join_all;

use crate::{
    chain::Chain,
    deployable::{Artifacts, Deployable},
    discovery::discover,
    results::{Operation, Results},
    scenarios::{prepare, Roster, Scenario},
    suite::{Identifier, Suite, Variant},
};

/// Default bound on waiting for mint notifications.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(120);

/// Tunables of a run that are not part of the suite.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// How long token discovery waits for mint notifications, forever when absent.
    pub discovery_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            discovery_timeout: Some(DEFAULT_DISCOVERY_TIMEOUT),
        }
    }
}

/// Runs every measurement of `suite` and returns the collected results.
///
/// # Errors
///
/// If the suite is invalid, the environment has too few accounts, or any deployment, mint, discovery or transfer
/// fails.
pub async fn execute<C: Chain>(
    chain: &C,
    artifacts: &Artifacts,
    suite: &Suite,
    options: &Options,
) -> anyhow::Result<Results> {
    suite.validate()?;
    let roster = Roster::new(chain.accounts().await?)?;
    log::debug!("roster: {roster:#?}");
    let deployable = Deployable::new(chain, artifacts, roster.owner);

    let mut results = Results::default();
    for variant in &suite.variants {
        log::info!("[{}] running benchmarks...", variant.name);

        let gas = measure_deploy(&deployable, &variant.name).await?;
        results.record(&variant.name, Operation::Deploy, gas)?;

        for amount in &suite.mint_amounts {
            let gas = measure_mint(chain, &deployable, &roster, variant, *amount).await?;
            results.record(&variant.name, Operation::Mint(*amount), gas)?;
        }

        for sweep in &suite.scenarios {
            let measurements = try_join_all(sweep.token_indices.iter().map(|token_index| {
                measure_transfer(
                    chain,
                    &deployable,
                    &roster,
                    &variant.name,
                    sweep.scenario,
                    *token_index,
                    options,
                )
            }))
            .await?;
            for (token_index, gas) in sweep.token_indices.iter().zip(measurements) {
                results.record(
                    &variant.name,
                    Operation::Transfer(sweep.scenario, *token_index),
                    gas,
                )?;
            }
        }

        log::info!(
            "completed benchmarks for {}",
            variant.name.display_name()
        );
    }
    log::trace!("results: {results:#?}");

    Ok(results)
}

async fn measure_deploy<C: Chain>(
    deployable: &Deployable<'_, C>,
    name: &Identifier,
) -> anyhow::Result<u64> {
    let (_, receipt) = deployable.deploy_new(name, &[]).await?;
    log::info!("[{name}/{}] {} gas", Operation::Deploy, receipt.gas_used);
    Ok(receipt.gas_used)
}

async fn measure_mint<C: Chain>(
    chain: &C,
    deployable: &Deployable<'_, C>,
    roster: &Roster,
    variant: &Variant,
    amount: u64,
) -> anyhow::Result<u64> {
    let id = format!("{}/{}", variant.name, Operation::Mint(amount));
    let (instance, _) = deployable.deploy_new(&variant.name, &[]).await?;

    if variant.warm_up {
        let account = roster.warm_up_account();
        log::debug!("[{id}] warming up with a mint from {account:?}");
        chain.confirm(instance.mint(chain, account, 1).await?).await?;
    }

    let receipt = chain
        .confirm(instance.mint(chain, roster.owner, amount).await?)
        .await?;
    log::info!("[{id}] {} gas", receipt.gas_used);
    Ok(receipt.gas_used)
}

async fn measure_transfer<C: Chain>(
    chain: &C,
    deployable: &Deployable<'_, C>,
    roster: &Roster,
    name: &Identifier,
    scenario: Scenario,
    token_index: u64,
    options: &Options,
) -> anyhow::Result<u64> {
    let id = format!("{name}/{}", Operation::Transfer(scenario, token_index));
    let (instance, _) = deployable.deploy_new(name, &[]).await?;

    let (tokens, _) = discover(
        chain,
        &instance,
        roster.owner,
        token_index + 1,
        options.discovery_timeout,
    )
    .await?;
    let transfer = prepare(chain, &instance, roster, &tokens, scenario, token_index).await?;
    log::debug!(
        "[{id}] transferring {:#x} from {:?} to {:?}",
        transfer.token_id,
        transfer.sender,
        transfer.recipient
    );

    let hash = instance
        .transfer_from(
            chain,
            transfer.sender,
            transfer.sender,
            transfer.recipient,
            transfer.token_id,
        )
        .await?;
    let receipt = chain.confirm(hash).await?;
    log::info!("[{id}] {} gas", receipt.gas_used);
    Ok(receipt.gas_used)
}

//! Access to the ledger the benchmarks run against.
//!
//! Everything the benchmarks need from an execution environment is captured by the [`Chain`] trait: a roster of
//! signer accounts, submitting deployments and calls as a given signer, waiting for receipts and subscribing to
//! emitted logs. [`RpcChain`] implements it over the JSON-RPC interface of a development node with unlocked accounts
//! (Anvil, Hardhat, ...).
//!
//! # Examples
//!
//! ```no_run
//! use std::{
//!     panic::{self, AssertUnwindSafe},
//!     time::Duration,
//! };
//!
//! use gas_bench::chain::{Chain, RpcChain};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let chain = RpcChain::connect("http://127.0.0.1:8545", Duration::from_millis(50))?;
//! let accounts = chain.accounts().await?;
//! #     Ok(())
//! # }
//! ```

use std::{
    panic::{self, AssertUnwindSafe},
    time::Duration,
};

use anyhow::Context;
use ethers_core::types::{
    Address, Bytes, Filter, Log, TransactionReceipt, TransactionRequest, TxHash, U256,
};
use ethers_core::utils::{Anvil, AnvilInstance};
use ethers_providers::{Http, Middleware, PendingTransaction, Provider};
use futures::stream::{LocalBoxStream, StreamExt};

use crate::Error;

#[cfg(test)]
pub mod sandbox;

/// Launches a local Anvil node with its default accounts.
///
/// The node is killed when the returned instance is dropped.
///
/// # Errors
///
/// If the node cannot be started, typically because `anvil` is not installed.
pub fn spawn_anvil() -> anyhow::Result<AnvilInstance> {
    log::info!("spawning anvil...");
    let anvil = without_panic(|| Anvil::new().spawn())
        .context("could not spawn anvil, is it installed?")?;
    log::info!("anvil listening at {}", anvil.endpoint());
    Ok(anvil)
}

/// Runs `f`, reporting a panic as an error without printing it.
fn without_panic<T>(f: impl FnOnce() -> T) -> anyhow::Result<T> {
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    panic::set_hook(hook);

    outcome.map_err(|payload| {
        let reason = payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| payload.downcast_ref::<&str>().copied())
            .unwrap_or("unknown panic");
        anyhow::anyhow!("{reason}")
    })
}

/// The part of a transaction receipt the benchmarks care about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the mined transaction.
    pub hash: TxHash,
    /// Gas consumed by the transaction.
    pub gas_used: u64,
    /// Address of the created contract, for deployments.
    pub contract_address: Option<Address>,
}

impl TryFrom<TransactionReceipt> for Receipt {
    type Error = anyhow::Error;

    fn try_from(receipt: TransactionReceipt) -> Result<Self, Self::Error> {
        let hash = receipt.transaction_hash;
        if receipt.status.is_some_and(|status| status.is_zero()) {
            return Err(Error::Reverted { hash }.into());
        }
        let gas_used = receipt
            .gas_used
            .context(format!("receipt for {hash:?} has no gas used"))?;
        anyhow::ensure!(
            gas_used <= u64::MAX.into(),
            "gas used by {hash:?} does not fit in 64 bits"
        );
        Ok(Self {
            hash,
            gas_used: gas_used.as_u64(),
            contract_address: receipt.contract_address,
        })
    }
}

/// Logs delivered by a filter installed with [`Chain::watch`].
pub struct Subscription<'a> {
    /// Filter id, to be passed to [`Chain::unwatch`] once the logs are no longer needed.
    pub id: U256,
    /// Matching logs, in emission order.
    pub logs: LocalBoxStream<'a, Log>,
}

/// Execution environment consumed by the benchmarks.
///
/// Submitting a transaction and confirming it are separate steps so that several submissions from the same signer can
/// be issued in order and then awaited together.
#[allow(async_fn_in_trait)]
pub trait Chain {
    /// Signer accounts, the first one being the owner that deploys and mints.
    async fn accounts(&self) -> anyhow::Result<Vec<Address>>;

    /// Submits a contract creation transaction.
    async fn deploy(&self, from: Address, init_code: Bytes) -> anyhow::Result<TxHash>;

    /// Submits a call to `to` signed by `from`.
    async fn send(&self, from: Address, to: Address, calldata: Bytes) -> anyhow::Result<TxHash>;

    /// Waits until the transaction is mined, failing if it reverted or was dropped.
    async fn confirm(&self, hash: TxHash) -> anyhow::Result<Receipt>;

    /// Subscribes to logs matching `filter`.
    ///
    /// The subscription is installed before this returns, so every matching log emitted afterwards is delivered, in
    /// emission order. The filter stays installed until [`Chain::unwatch`] is called with its id.
    async fn watch(&self, filter: &Filter) -> anyhow::Result<Subscription<'_>>;

    /// Uninstalls the filter of a subscription.
    async fn unwatch(&self, id: U256) -> anyhow::Result<()>;
}

/// [`Chain`] backed by a JSON-RPC node.
#[derive(Clone, Debug)]
pub struct RpcChain {
    provider: Provider<Http>,
    poll_interval: Duration,
}

impl RpcChain {
    /// Connects to the node at `url`, polling filters and receipts every `poll_interval`.
    ///
    /// # Errors
    ///
    /// If `url` is not a valid URL.
    pub fn connect(url: &str, poll_interval: Duration) -> anyhow::Result<Self> {
        log::info!("connecting to node at {url}...");
        let provider = Provider::<Http>::try_from(url)
            .context(format!("could not create provider for {url}"))?
            .interval(poll_interval);
        Ok(Self {
            provider,
            poll_interval,
        })
    }

    async fn submit(&self, tx: TransactionRequest) -> anyhow::Result<TxHash> {
        log::trace!("submitting transaction: {tx:#?}");
        let pending = self
            .provider
            .send_transaction(tx, None)
            .await
            .context("could not submit transaction")?;
        Ok(pending.tx_hash())
    }
}

impl Chain for RpcChain {
    async fn accounts(&self) -> anyhow::Result<Vec<Address>> {
        self.provider
            .get_accounts()
            .await
            .context("could not get node accounts")
    }

    async fn deploy(&self, from: Address, init_code: Bytes) -> anyhow::Result<TxHash> {
        self.submit(TransactionRequest::new().from(from).data(init_code))
            .await
    }

    async fn send(&self, from: Address, to: Address, calldata: Bytes) -> anyhow::Result<TxHash> {
        self.submit(TransactionRequest::new().from(from).to(to).data(calldata))
            .await
    }

    async fn confirm(&self, hash: TxHash) -> anyhow::Result<Receipt> {
        let receipt = PendingTransaction::new(hash, &self.provider)
            .interval(self.poll_interval)
            .await
            .context(format!("could not confirm transaction {hash:?}"))?
            .ok_or(Error::Dropped { hash })?;
        log::trace!("receipt: {receipt:#?}");
        receipt.try_into()
    }

    async fn watch(&self, filter: &Filter) -> anyhow::Result<Subscription<'_>> {
        let watcher = self
            .provider
            .watch(filter)
            .await
            .context("could not install log filter")?;
        let id = watcher.id;
        log::debug!("installed log filter {id:#x}");
        Ok(Subscription {
            id,
            logs: watcher.boxed_local(),
        })
    }

    async fn unwatch(&self, id: U256) -> anyhow::Result<()> {
        let removed = self
            .provider
            .uninstall_filter(id)
            .await
            .context(format!("could not uninstall log filter {id:#x}"))?;
        if removed {
            log::debug!("uninstalled log filter {id:#x}");
        } else {
            log::warn!("log filter {id:#x} was already gone");
        }
        Ok(())
    }
}

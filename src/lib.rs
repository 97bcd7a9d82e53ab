//! Gas benchmarks for interchangeable ERC-721 implementations.
//!
//! gas-bench deploys several implementations of the same token contract on an Ethereum development node and measures
//! the gas used by deployment, by minting batches of various sizes and by transferring tokens under a matrix of
//! ownership scenarios. The results are rendered as Markdown tables so implementations can be compared side by side
//! and regressions spotted.
//!
//! # Pipeline
//! - [`deployable`] compiles the contract variants and deploys fresh instances of them.
//! - [`discovery`] mints tokens and learns their ids from the emitted `Transfer` logs.
//! - [`scenarios`] decides, for each ownership scenario, who sends the measured transfer to whom and performs the
//!   setup that scenario needs.
//! - [`bench`] drives all of the above for every variant and collects [`results`].
//! - [`report`] renders the results.
//!
//! The ledger itself is abstracted behind the [`chain::Chain`] trait, implemented over JSON-RPC by
//! [`chain::RpcChain`].
//!
//! # Usage
//!
//! ## As an executable
//! ```console
//! $ anvil &
//! $ RUST_LOG=info cargo run --release -- --root path/to/project
//! ```
//!
//! The report is written to `benchmarks.md` and echoed to standard output. Refer to `--help` for all options.
//!
//! ## As a library
//! ```no_run
//! use std::{path::PathBuf, time::Duration};
//!
//! use gas_bench::{bench::Options, chain::RpcChain, deployable::compile, execute, report::render, Suite};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let suite = Suite::default();
//! let names: Vec<_> = suite.variants.iter().map(|v| v.name.clone()).collect();
//! let artifacts = compile(&PathBuf::from("."), &names, &suite.compiler)?;
//! let chain = RpcChain::connect("http://127.0.0.1:8545", Duration::from_millis(50))?;
//!
//! let results = execute(&chain, &artifacts, &suite, &Options::default()).await?;
//! println!("{}", render(&suite, &results));
//! #     Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]

pub mod bench;
pub mod chain;
pub mod deployable;
pub mod discovery;
mod error;
pub mod report;
pub mod results;
pub mod scenarios;
pub mod suite;

pub use bench::execute;
pub use error::Error;
pub use results::Results;
pub use suite::Suite;

//! Domain errors raised while benchmarking.
//!
//! Most of the crate propagates [`anyhow::Error`] with added context, these are the failures that callers may want to
//! match on.

use std::time::Duration;

use ethers_core::types::TxHash;
use thiserror::Error;

/// Errors that abort a benchmarking run.
#[derive(Debug, Error)]
pub enum Error {
    /// The suite configuration is malformed.
    #[error("invalid suite: {0}")]
    InvalidSuite(String),
    /// The execution environment exposes too few signer accounts.
    #[error("not enough accounts: need at least {required}, found {found}")]
    NotEnoughAccounts {
        /// Minimum roster size.
        required: usize,
        /// Roster size reported by the environment.
        found: usize,
    },
    /// No compiled artifact exists for the named contract.
    #[error("no artifact for contract {0}")]
    UnknownContract(String),
    /// The contract ABI lacks a function or event the benchmark needs.
    #[error("contract {contract} has no {item} in its ABI")]
    MissingAbiItem {
        /// Contract name.
        contract: String,
        /// Missing function or event name.
        item: String,
    },
    /// A transaction was mined but reverted.
    #[error("transaction {hash:?} reverted")]
    Reverted {
        /// Hash of the reverted transaction.
        hash: TxHash,
    },
    /// A transaction was dropped from the mempool before being mined.
    #[error("transaction {hash:?} was dropped")]
    Dropped {
        /// Hash of the dropped transaction.
        hash: TxHash,
    },
    /// A deployment receipt did not carry a contract address.
    #[error("deployment {hash:?} has no contract address")]
    MissingContractAddress {
        /// Hash of the deployment transaction.
        hash: TxHash,
    },
    /// Fewer mint notifications than expected arrived within the discovery timeout.
    #[error("discovered {found} of {expected} minted tokens after {waited:?}")]
    DiscoveryTimeout {
        /// Number of tokens that were minted.
        expected: usize,
        /// Number of tokens that were observed.
        found: usize,
        /// How long discovery waited.
        waited: Duration,
    },
    /// The notification stream ended before all minted tokens were observed.
    #[error("subscription closed after discovering {found} of {expected} minted tokens")]
    SubscriptionClosed {
        /// Number of tokens that were minted.
        expected: usize,
        /// Number of tokens that were observed.
        found: usize,
    },
    /// A measurement was recorded twice under the same key.
    #[error("measurement {0} was already recorded")]
    DuplicateMeasurement(String),
}

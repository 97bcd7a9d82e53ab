//! Accumulating gas measurements.
//!
//! [`Results`] maps contract variant → operation kind → operation parameter → gas used. Every measurement is recorded
//! exactly once; recording the same key twice is an error rather than an overwrite.
//!
//! # Examples
//!
//! ```
//! use gas_bench::{
//!     results::{Operation, Results},
//!     scenarios::Scenario,
//!     suite::Identifier,
//! };
//!
//! let mut results = Results::default();
//! let variant = Identifier::from("Optimint");
//!
//! results.record(&variant, Operation::Deploy, 100_000).unwrap();
//! results.record(&variant, Operation::Mint(1), 50_000).unwrap();
//! results.record(&variant, Operation::Transfer(Scenario::MinterToOwner, 1), 40_000).unwrap();
//!
//! assert_eq!(results.get(&variant, Operation::Mint(1)), Some(50_000));
//! assert!(results.record(&variant, Operation::Mint(1), 1).is_err());
//! assert_eq!(results.len(), 3);
//! ```

use std::{
    collections::{btree_map, BTreeMap},
    fmt::{self, Display, Formatter},
};

use serde::{Deserialize, Serialize};

use crate::{scenarios::Scenario, suite::Identifier, Error};

/// A measured operation together with its parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    /// Deployment of a fresh instance.
    Deploy,
    /// Mint of a batch of the given size.
    Mint(u64),
    /// Transfer of the n-th minted token under a scenario.
    Transfer(Scenario, u64),
}

impl Display for Operation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deploy => write!(f, "deploy"),
            Self::Mint(amount) => write!(f, "mint-{amount}"),
            Self::Transfer(scenario, token_index) => write!(f, "{scenario}-#{token_index}"),
        }
    }
}

/// Measurements of a single contract variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantResults {
    /// Contract variant.
    pub name: Identifier,
    /// Gas used by the deployment.
    pub deploy: Option<u64>,
    /// Gas used per mint batch size.
    pub mint: BTreeMap<u64, u64>,
    /// Gas used per scenario and token index.
    pub transfer: BTreeMap<Scenario, BTreeMap<u64, u64>>,
}

impl VariantResults {
    fn new(name: Identifier) -> Self {
        Self {
            name,
            deploy: None,
            mint: BTreeMap::new(),
            transfer: BTreeMap::new(),
        }
    }

    /// Gas recorded for `operation`.
    #[must_use]
    pub fn get(&self, operation: Operation) -> Option<u64> {
        match operation {
            Operation::Deploy => self.deploy,
            Operation::Mint(amount) => self.mint.get(&amount).copied(),
            Operation::Transfer(scenario, token_index) => self
                .transfer
                .get(&scenario)?
                .get(&token_index)
                .copied(),
        }
    }

    fn len(&self) -> usize {
        usize::from(self.deploy.is_some())
            + self.mint.len()
            + self.transfer.values().map(BTreeMap::len).sum::<usize>()
    }
}

/// All measurements of a run, variants kept in the order they were first recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Results {
    variants: Vec<VariantResults>,
}

impl Results {
    /// Records the gas used by `operation` on `variant`.
    ///
    /// # Errors
    ///
    /// [`Error::DuplicateMeasurement`] if that measurement was already recorded.
    pub fn record(
        &mut self,
        variant: &Identifier,
        operation: Operation,
        gas: u64,
    ) -> Result<(), Error> {
        let index = match self.variants.iter().position(|v| &v.name == variant) {
            Some(index) => index,
            None => {
                self.variants.push(VariantResults::new(variant.clone()));
                self.variants.len() - 1
            }
        };
        let entry = &mut self.variants[index];

        let fresh = match operation {
            Operation::Deploy => {
                let fresh = entry.deploy.is_none();
                if fresh {
                    entry.deploy = Some(gas);
                }
                fresh
            }
            Operation::Mint(amount) => insert_new(entry.mint.entry(amount), gas),
            Operation::Transfer(scenario, token_index) => insert_new(
                entry.transfer.entry(scenario).or_default().entry(token_index),
                gas,
            ),
        };
        if fresh {
            Ok(())
        } else {
            Err(Error::DuplicateMeasurement(format!("{variant}/{operation}")))
        }
    }

    /// Gas recorded for `operation` on `variant`.
    #[must_use]
    pub fn get(&self, variant: &Identifier, operation: Operation) -> Option<u64> {
        self.variant(variant)?.get(operation)
    }

    /// Measurements of one variant.
    #[must_use]
    pub fn variant(&self, variant: &Identifier) -> Option<&VariantResults> {
        self.variants.iter().find(|v| &v.name == variant)
    }

    /// Measurements of every variant, in recording order.
    pub fn variants(&self) -> impl Iterator<Item = &VariantResults> {
        self.variants.iter()
    }

    /// Total number of measurements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variants.iter().map(VariantResults::len).sum()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn insert_new(entry: btree_map::Entry<'_, u64, u64>, gas: u64) -> bool {
    match entry {
        btree_map::Entry::Vacant(slot) => {
            slot.insert(gas);
            true
        }
        btree_map::Entry::Occupied(_) => false,
    }
}

//! Configuration of what gets benchmarked.
//!
//! A [`Suite`] names the contract variants under comparison, the batch sizes swept when measuring mints and the token
//! indices measured for each transfer [`Scenario`]. Suites are typically loaded from a JSON file with
//! [`Suite::from_path`], but [`Suite::default`] reproduces the standard comparison of `Optimint`,
//! `OptimintEnumerable` and `ERC721A`.
//!
//! # Examples
//!
//! ```
//! use gas_bench::suite::Suite;
//!
//! let suite: Suite = serde_json::from_str(r#"{
//!     "variants": [{ "name": "Optimint" }, { "name": "ERC721AMock", "warm_up": true }],
//!     "mint_amounts": [1, 2],
//!     "scenarios": [{ "scenario": "MinterToNonOwner", "token_indices": [1] }]
//! }"#).unwrap();
//!
//! assert!(suite.validate().is_ok());
//! assert_eq!(suite.variants[1].name.display_name(), "ERC721A");
//! ```

use std::{
    collections::HashSet,
    fmt::{self, Display, Formatter},
    fs::File,
    path::Path,
};

use anyhow::Context;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::{scenarios::Scenario, Error};

/// Suffix marking test-only mock variants, stripped from display names.
pub const MOCK_SUFFIX: &str = "Mock";

/// Name of a contract variant, as it appears in the compiled artifacts.
///
/// # Examples
///
/// ```
/// use gas_bench::suite::Identifier;
///
/// let identifier = Identifier::from("ERC721AMock");
///
/// assert_eq!(identifier.to_string(), "ERC721AMock");
/// assert_eq!(identifier.display_name(), "ERC721A");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Identifier(String);

impl Identifier {
    /// Contract name as used to look up artifacts.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name shown in reports, with any trailing [`MOCK_SUFFIX`] removed.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.0.strip_suffix(MOCK_SUFFIX).unwrap_or(&self.0)
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A contract variant under comparison.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Variant {
    /// Contract name.
    pub name: Identifier,
    /// Whether an unrelated account mints once before each mint measurement, so the measured mint does not pay for
    /// first-time initialisation of shared storage.
    #[serde(default)]
    pub warm_up: bool,
}

impl Variant {
    /// Creates a variant without warm-up.
    pub fn new(name: impl Into<Identifier>) -> Self {
        Self {
            name: name.into(),
            warm_up: false,
        }
    }

    /// Enables the pre-measurement warm-up mint.
    #[must_use]
    pub fn with_warm_up(mut self) -> Self {
        self.warm_up = true;
        self
    }
}

/// Token indices to measure for one transfer scenario.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSweep {
    /// Ownership scenario.
    pub scenario: Scenario,
    /// One-based ordinals of the minted token whose transfer is measured.
    pub token_indices: Vec<u64>,
}

/// Solidity compiler settings used to build the variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerSettings {
    /// Pinned solc version, auto-detected from pragmas when absent.
    pub solc_version: Option<Version>,
    /// Compile through the IR pipeline.
    pub via_ir: bool,
    /// Optimizer runs, optimizer disabled when absent.
    pub optimizer_runs: Option<usize>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            solc_version: Some(Version::new(0, 8, 15)),
            via_ir: true,
            optimizer_runs: Some(200),
        }
    }
}

/// Full description of a benchmarking run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Suite {
    /// Contract variants, in report order.
    pub variants: Vec<Variant>,
    /// Batch sizes swept when measuring mints.
    pub mint_amounts: Vec<u64>,
    /// Transfer scenarios, in report order.
    pub scenarios: Vec<ScenarioSweep>,
    /// Compiler settings.
    #[serde(default)]
    pub compiler: CompilerSettings,
}

impl Default for Suite {
    fn default() -> Self {
        const SWEEP: [u64; 8] = [1, 2, 3, 4, 5, 10, 50, 100];
        Self {
            variants: vec![
                Variant::new("Optimint"),
                Variant::new("OptimintEnumerable"),
                Variant::new("ERC721AMock").with_warm_up(),
            ],
            mint_amounts: SWEEP.to_vec(),
            scenarios: vec![
                ScenarioSweep {
                    scenario: Scenario::OwnerToNonOwner,
                    token_indices: vec![1],
                },
                ScenarioSweep {
                    scenario: Scenario::OwnerToOwner,
                    token_indices: vec![1],
                },
                ScenarioSweep {
                    scenario: Scenario::MinterToNonOwner,
                    token_indices: SWEEP.to_vec(),
                },
                ScenarioSweep {
                    scenario: Scenario::MinterToOwner,
                    token_indices: SWEEP.to_vec(),
                },
            ],
            compiler: CompilerSettings::default(),
        }
    }
}

impl Suite {
    /// Reads and validates a suite from a JSON file.
    ///
    /// # Errors
    ///
    /// If the file cannot be opened or deserialized, or if the suite fails [`Suite::validate`].
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        log::info!("reading suite from {}...", path.display());
        let suite: Self = serde_json::from_reader(
            File::open(path).context(format!("could not open suite file {}", path.display()))?,
        )
        .context(format!("could not deserialize suite file {}", path.display()))?;
        suite.validate()?;
        log::trace!("suite: {suite:#?}");
        Ok(suite)
    }

    /// Checks the suite for empty, duplicate or zero-valued entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSuite`] describing the first problem found.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::InvalidSuite(msg));

        if self.variants.is_empty() {
            return invalid("no contract variants".to_string());
        }
        let mut names = HashSet::new();
        for variant in &self.variants {
            if !names.insert(&variant.name) {
                return invalid(format!("variant {} listed twice", variant.name));
            }
        }

        check_sweep("mint amounts", &self.mint_amounts)?;

        let mut scenarios = HashSet::new();
        for sweep in &self.scenarios {
            if !scenarios.insert(sweep.scenario) {
                return invalid(format!("scenario {} listed twice", sweep.scenario));
            }
            check_sweep(
                &format!("token indices of {}", sweep.scenario),
                &sweep.token_indices,
            )?;
        }

        Ok(())
    }
}

fn check_sweep(what: &str, values: &[u64]) -> Result<(), Error> {
    if values.contains(&0) {
        return Err(Error::InvalidSuite(format!("{what} must be at least 1")));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = values.iter().find(|v| !seen.insert(**v)) {
        return Err(Error::InvalidSuite(format!("{what} contain {dup} twice")));
    }
    Ok(())
}

//! Ownership scenarios under which transfers are measured.
//!
//! Each [`Scenario`] maps to a fixed [`ScenarioPlan`]: which account sends the measured transfer, which account
//! receives it, and the setup that runs beforehand. Setup is never measured. Two setup steps exist:
//!
//! - an extra mint of a single token by some account, so that account already holds a token;
//! - redistribution of the owner's first tokens to another account, so the measured transfer is sent by an account
//!   that received its tokens rather than minted them.
//!
//! The `Minter*` scenarios measure a transfer from the owner (who minted) to account 0, the `Owner*` scenarios measure
//! a transfer from account 0 (who received the tokens) to account 1. The `*ToOwner` variants differ from their
//! `*ToNonOwner` counterparts only by the recipient holding a token already.

use std::fmt::{self, Display, Formatter};

use anyhow::Context;
use ethers_core::types::{Address, U256};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::{chain::Chain, deployable::Instance, discovery::TokenSet, Error};

/// Transfer scenario.
///
/// # Examples
///
/// ```
/// use gas_bench::scenarios::{Role, Scenario};
///
/// let plan = Scenario::OwnerToOwner.plan();
///
/// assert_eq!(plan.sender, Role::Account(0));
/// assert_eq!(plan.recipient, Role::Account(1));
/// assert_eq!(plan.pre_mint, Some(Role::Account(1)));
/// assert_eq!(Scenario::OwnerToOwner.label(), "Owner to owner");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scenario {
    /// Account 0 received the owner's tokens and sends one to account 1, who holds nothing.
    OwnerToNonOwner,
    /// Same as [`Scenario::OwnerToNonOwner`], but account 1 minted a token of its own first.
    OwnerToOwner,
    /// The owner sends one of the tokens it minted to account 0, who holds nothing.
    MinterToNonOwner,
    /// Same as [`Scenario::MinterToNonOwner`], but account 0 minted a token of its own first.
    MinterToOwner,
}

impl Scenario {
    /// Every scenario, in report order.
    pub const ALL: [Self; 4] = [
        Self::OwnerToNonOwner,
        Self::OwnerToOwner,
        Self::MinterToNonOwner,
        Self::MinterToOwner,
    ];

    /// Human readable label used as report heading.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::OwnerToNonOwner => "Owner to non-owner",
            Self::OwnerToOwner => "Owner to owner",
            Self::MinterToNonOwner => "Minter to non-owner",
            Self::MinterToOwner => "Minter to owner",
        }
    }

    /// Roles and setup of this scenario.
    #[must_use]
    pub fn plan(self) -> ScenarioPlan {
        match self {
            Self::OwnerToNonOwner => ScenarioPlan {
                sender: Role::Account(0),
                recipient: Role::Account(1),
                pre_mint: None,
                redistribute_to: Some(Role::Account(0)),
            },
            Self::OwnerToOwner => ScenarioPlan {
                sender: Role::Account(0),
                recipient: Role::Account(1),
                pre_mint: Some(Role::Account(1)),
                redistribute_to: Some(Role::Account(0)),
            },
            Self::MinterToNonOwner => ScenarioPlan {
                sender: Role::Owner,
                recipient: Role::Account(0),
                pre_mint: None,
                redistribute_to: None,
            },
            Self::MinterToOwner => ScenarioPlan {
                sender: Role::Owner,
                recipient: Role::Account(0),
                pre_mint: Some(Role::Account(0)),
                redistribute_to: None,
            },
        }
    }
}

impl Display for Scenario {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An account in terms of its place in the [`Roster`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The account that deploys and mints.
    Owner,
    /// The n-th auxiliary account.
    Account(usize),
}

/// What a scenario does before and during the measured transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScenarioPlan {
    /// Signer and current holder of the transferred token.
    pub sender: Role,
    /// Receiver of the transferred token.
    pub recipient: Role,
    /// Account minting one extra token before anything else happens.
    pub pre_mint: Option<Role>,
    /// Account receiving the owner's first tokens before the measured transfer.
    pub redistribute_to: Option<Role>,
}

/// The fixed set of accounts shared by every measurement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roster {
    /// Deploys every instance and mints the measured tokens.
    pub owner: Address,
    /// Auxiliary accounts, at least [`Roster::MIN_ACCOUNTS`] minus the owner.
    pub accounts: Vec<Address>,
}

impl Roster {
    /// Smallest roster, owner included, that every scenario can run with.
    pub const MIN_ACCOUNTS: usize = 3;

    /// Splits the environment's accounts into the owner and the auxiliary accounts.
    ///
    /// # Errors
    ///
    /// [`Error::NotEnoughAccounts`] if fewer than [`Roster::MIN_ACCOUNTS`] accounts are given.
    pub fn new(accounts: Vec<Address>) -> Result<Self, Error> {
        match accounts.split_first() {
            Some((owner, rest)) if accounts.len() >= Self::MIN_ACCOUNTS => Ok(Self {
                owner: *owner,
                accounts: rest.to_vec(),
            }),
            _ => Err(Error::NotEnoughAccounts {
                required: Self::MIN_ACCOUNTS,
                found: accounts.len(),
            }),
        }
    }

    /// Address playing `role`.
    ///
    /// # Panics
    ///
    /// If `role` is an auxiliary account beyond the roster. Scenario plans only use accounts 0 and 1, which
    /// [`Roster::new`] guarantees.
    #[must_use]
    pub fn resolve(&self, role: Role) -> Address {
        match role {
            Role::Owner => self.owner,
            Role::Account(n) => self.accounts[n],
        }
    }

    /// Account used for warm-up mints, the last one so it never takes part in a measurement.
    #[must_use]
    pub fn warm_up_account(&self) -> Address {
        self.accounts.last().copied().unwrap_or(self.owner)
    }
}

/// The transfer a scenario measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transfer {
    /// Signer, and holder of the token.
    pub sender: Address,
    /// Receiver of the token.
    pub recipient: Address,
    /// Transferred token.
    pub token_id: U256,
}

/// Runs the setup of `scenario` on `instance` and returns the transfer to measure.
///
/// `tokens` are the ids minted to the owner, `token_index` the one-based ordinal of the token to transfer. When the
/// scenario redistributes, the first `token_index + 1` tokens are moved; the transfers are submitted one after the
/// other and then confirmed together.
///
/// # Errors
///
/// If `tokens` holds fewer than `token_index + 1` ids, or if any setup transaction fails.
pub async fn prepare<C: Chain>(
    chain: &C,
    instance: &Instance,
    roster: &Roster,
    tokens: &TokenSet,
    scenario: Scenario,
    token_index: u64,
) -> anyhow::Result<Transfer> {
    let plan = scenario.plan();
    let token_id = tokens.nth(token_index).context(format!(
        "[{}] token #{token_index} was not minted",
        instance.name
    ))?;

    if let Some(minter) = plan.pre_mint {
        let minter = roster.resolve(minter);
        log::debug!("[{}] {minter:?} mints an extra token", instance.name);
        let hash = instance.mint(chain, minter, 1).await?;
        chain.confirm(hash).await?;
    }

    if let Some(receiver) = plan.redistribute_to {
        let receiver = roster.resolve(receiver);
        let moved = usize::try_from(token_index)? + 1;
        anyhow::ensure!(
            tokens.len() >= moved,
            "[{}] cannot redistribute {moved} of {} tokens",
            instance.name,
            tokens.len()
        );
        log::debug!(
            "[{}] moving {moved} tokens from owner to {receiver:?}",
            instance.name
        );

        let mut hashes = Vec::with_capacity(moved);
        for id in tokens.iter().take(moved) {
            hashes.push(
                instance
                    .transfer_from(chain, roster.owner, roster.owner, receiver, id)
                    .await?,
            );
        }
        try_join_all(hashes.into_iter().map(|hash| chain.confirm(hash))).await?;
    }

    Ok(Transfer {
        sender: roster.resolve(plan.sender),
        recipient: roster.resolve(plan.recipient),
        token_id,
    })
}

//! Discovering the ids of freshly minted tokens.
//!
//! Contracts do not return the ids they mint, so [`discover`] subscribes to the instance's `Transfer` logs, submits
//! the mint and then collects every creation transfer (from the zero address) to the minter until the expected number
//! of distinct ids has been seen. Ids are kept in arrival order, never sorted, since implementations are free to emit
//! them in any order.
//!
//! Waiting is bounded by an optional timeout. Without one, a contract that emits fewer notifications than it mints
//! blocks discovery forever.

use std::{collections::HashMap, time::Duration};

use ethers_core::types::{Address, Log, U256};
use futures::{stream::LocalBoxStream, StreamExt};

use crate::{
    chain::{Chain, Receipt, Subscription},
    deployable::Instance,
    Error,
};

/// Minted token ids in the order their notifications arrived.
///
/// # Examples
///
/// ```
/// use ethers_core::types::U256;
/// use gas_bench::discovery::TokenSet;
///
/// let mut tokens = TokenSet::default();
/// assert!(tokens.insert(U256::from(7)));
/// assert!(tokens.insert(U256::from(3)));
/// assert!(!tokens.insert(U256::from(7)));
///
/// assert_eq!(tokens.len(), 2);
/// assert_eq!(tokens.nth(1), Some(U256::from(7)));
/// assert_eq!(tokens.position(U256::from(3)), Some(1));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenSet {
    ids: Vec<U256>,
    positions: HashMap<U256, usize>,
}

impl TokenSet {
    /// Records an id, returning `false` if it was already known.
    pub fn insert(&mut self, id: U256) -> bool {
        if self.positions.contains_key(&id) {
            return false;
        }
        self.positions.insert(id, self.ids.len());
        self.ids.push(id);
        true
    }

    /// Number of distinct ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether no id was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// The `ordinal`-th id to arrive, counting from one.
    #[must_use]
    pub fn nth(&self, ordinal: u64) -> Option<U256> {
        let index = usize::try_from(ordinal.checked_sub(1)?).ok()?;
        self.ids.get(index).copied()
    }

    /// Zero-based arrival position of an id.
    #[must_use]
    pub fn position(&self, id: U256) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Ids in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = U256> + '_ {
        self.ids.iter().copied()
    }
}

/// Mints `count` tokens to `owner` and waits for their ids.
///
/// The log subscription is installed before the mint is submitted and uninstalled once discovery ends, whatever the
/// outcome. Confirmation of the mint and collection of its notifications proceed together; the first failure of either
/// aborts discovery. Returns the discovered ids together with the mint receipt.
///
/// # Errors
///
/// If the mint fails, if a notification cannot be decoded, if the subscription ends early
/// ([`Error::SubscriptionClosed`]), if `timeout` elapses first ([`Error::DiscoveryTimeout`]) or if the subscription
/// cannot be uninstalled.
pub async fn discover<C: Chain>(
    chain: &C,
    instance: &Instance,
    owner: Address,
    count: u64,
    timeout: Option<Duration>,
) -> anyhow::Result<(TokenSet, Receipt)> {
    let Subscription { id, mut logs } = chain.watch(&instance.transfer_filter()?).await?;

    let discovered = mint_and_collect(chain, instance, &mut logs, owner, count, timeout).await;
    drop(logs);
    let unwatched = chain.unwatch(id).await;

    let discovered = discovered?;
    unwatched?;
    Ok(discovered)
}

async fn mint_and_collect<C: Chain>(
    chain: &C,
    instance: &Instance,
    logs: &mut LocalBoxStream<'_, Log>,
    owner: Address,
    count: u64,
    timeout: Option<Duration>,
) -> anyhow::Result<(TokenSet, Receipt)> {
    let expected = usize::try_from(count)?;
    let hash = instance.mint(chain, owner, count).await?;
    log::debug!(
        "[{}] submitted mint of {count} to {owner:?} ({hash:?}), discovering ids...",
        instance.name
    );

    let mut tokens = TokenSet::default();
    let collected = async {
        let collecting = collect(instance, logs, owner, expected, &mut tokens);
        let Some(limit) = timeout else {
            return collecting.await;
        };
        if let Ok(result) = tokio::time::timeout(limit, collecting).await {
            return result;
        }
        Err(Error::DiscoveryTimeout {
            expected,
            found: tokens.len(),
            waited: limit,
        }
        .into())
    };
    let (receipt, ()) = futures::try_join!(chain.confirm(hash), collected)?;

    log::debug!(
        "[{}] discovered {} ids: {:?}",
        instance.name,
        tokens.len(),
        tokens.ids
    );
    Ok((tokens, receipt))
}

async fn collect(
    instance: &Instance,
    logs: &mut LocalBoxStream<'_, Log>,
    owner: Address,
    expected: usize,
    tokens: &mut TokenSet,
) -> anyhow::Result<()> {
    while tokens.len() < expected {
        let Some(log) = logs.next().await else {
            return Err(Error::SubscriptionClosed {
                expected,
                found: tokens.len(),
            }
            .into());
        };
        let event = instance.decode_transfer(log)?;
        if !event.from.is_zero() || event.to != owner {
            continue;
        }
        if tokens.insert(event.token_id) {
            log::trace!("[{}] discovered id {:#x}", instance.name, event.token_id);
        } else {
            log::debug!(
                "[{}] id {:#x} notified twice, ignoring...",
                instance.name,
                event.token_id
            );
        }
    }
    Ok(())
}

//! Deterministic in-memory [`Chain`] used by the unit tests.
//!
//! Every deployed contract behaves like a minimal ERC-721: `mint(uint256)` mints consecutive ids to the caller and
//! `transferFrom(address,address,uint256)` moves a token owned by the caller. Transactions are mined as soon as they
//! are submitted. Gas is a simple function of the call and of the contract state so tests can reason about it.

use std::{cell::RefCell, collections::HashMap};

use anyhow::Context;
use ethers_core::{
    abi::{self, Abi, Token},
    types::{Address, BigEndianHash, Bytes, Filter, Log, TxHash, ValueOrArray, H256, U256},
};
use futures::{
    channel::mpsc::{unbounded, UnboundedSender},
    stream::StreamExt,
};
use semver::Version;

use super::{Chain, Receipt, Subscription};
use crate::{deployable::Artifact, Error};

/// Gas of a deployment, on top of 200 per byte of init code.
pub const DEPLOY_BASE_GAS: u64 = 100_000;
/// Gas every call pays.
pub const TX_BASE_GAS: u64 = 21_000;
/// Extra gas of the first mint of a contract.
pub const FIRST_MINT_GAS: u64 = 20_000;
/// Extra gas of a transfer to an account holding no token.
pub const NEW_HOLDER_GAS: u64 = 20_000;
/// Extra gas of a transfer to an account already holding a token.
pub const EXISTING_HOLDER_GAS: u64 = 2_900;

/// ABI shared by every sandbox contract.
pub fn token_abi() -> Abi {
    abi::parse_abi(&[
        "function mint(uint256 quantity)",
        "function transferFrom(address from, address to, uint256 tokenId)",
        "event Transfer(address indexed from, address indexed to, uint256 indexed tokenId)",
    ])
    .unwrap()
}

/// Artifact whose per-token mint cost grows with `weight`.
pub fn artifact(name: &str, weight: u8) -> Artifact {
    Artifact {
        name: name.into(),
        abi: token_abi(),
        bytecode: Bytes::from(vec![weight; 8]),
        solc_version: Version::new(0, 8, 15),
    }
}

/// Misbehaviours a [`Sandbox`] can be told to exhibit.
#[derive(Clone, Copy, Debug, Default)]
pub struct SandboxOptions {
    /// Emit the mint notifications of a batch from the highest id down.
    pub reverse_mint_events: bool,
    /// Never emit this many of the last notifications of each mint.
    pub withheld_mint_events: usize,
    /// Revert every mint without emitting anything.
    pub revert_mints: bool,
}

#[derive(Debug, Default)]
struct Collection {
    per_token_gas: u64,
    next_id: u64,
    owners: HashMap<U256, Address>,
    balances: HashMap<Address, u64>,
}

#[derive(Default)]
struct State {
    tx_count: u64,
    watch_count: u64,
    contracts: HashMap<Address, Collection>,
    receipts: HashMap<TxHash, Result<Receipt, Error>>,
    watchers: Vec<Watcher>,
}

struct Watcher {
    id: U256,
    contract: Address,
    sender: UnboundedSender<Log>,
}

/// In-memory ledger of minimal ERC-721 contracts.
pub struct Sandbox {
    accounts: Vec<Address>,
    options: SandboxOptions,
    state: RefCell<State>,
}

impl Sandbox {
    /// Sandbox with `num_accounts` signers, the first one being the owner.
    pub fn new(num_accounts: u64) -> Self {
        Self::with_options(num_accounts, SandboxOptions::default())
    }

    /// Sandbox misbehaving as told by `options`.
    pub fn with_options(num_accounts: u64, options: SandboxOptions) -> Self {
        Self {
            accounts: (1..=num_accounts).map(Address::from_low_u64_be).collect(),
            options,
            state: RefCell::default(),
        }
    }

    /// Holder of a token.
    pub fn owner_of(&self, contract: Address, id: U256) -> Option<Address> {
        self.state.borrow().contracts[&contract]
            .owners
            .get(&id)
            .copied()
    }

    /// Number of tokens held by `account`.
    pub fn balance_of(&self, contract: Address, account: Address) -> u64 {
        self.state.borrow().contracts[&contract]
            .balances
            .get(&account)
            .copied()
            .unwrap_or_default()
    }

    /// Number of deployed contracts.
    pub fn deployments(&self) -> usize {
        self.state.borrow().contracts.len()
    }

    /// Number of log subscriptions not yet removed with [`Chain::unwatch`].
    pub fn active_watchers(&self) -> usize {
        self.state.borrow().watchers.len()
    }

    fn next_hash(state: &mut State) -> TxHash {
        state.tx_count += 1;
        H256::from_low_u64_be(state.tx_count)
    }

    fn emit(state: &State, contract: Address, from: Address, to: Address, id: U256) {
        let log = transfer_log(contract, from, to, id);
        for watcher in &state.watchers {
            if watcher.contract == contract {
                // A dropped receiver only loses its own logs.
                let _ = watcher.sender.unbounded_send(log.clone());
            }
        }
    }

    fn mint(
        state: &mut State,
        options: SandboxOptions,
        contract: Address,
        caller: Address,
        count: u64,
    ) -> Option<u64> {
        if options.revert_mints {
            return None;
        }
        let token = state.contracts.get_mut(&contract).unwrap();
        let mut gas = TX_BASE_GAS + token.per_token_gas * count;
        if token.next_id == 0 {
            gas += FIRST_MINT_GAS;
        }
        let ids: Vec<U256> = (token.next_id..token.next_id + count).map(U256::from).collect();
        token.next_id += count;
        for id in &ids {
            token.owners.insert(*id, caller);
        }
        *token.balances.entry(caller).or_default() += count;

        let mut emitted = ids;
        emitted.truncate(emitted.len().saturating_sub(options.withheld_mint_events));
        if options.reverse_mint_events {
            emitted.reverse();
        }
        for id in emitted {
            Self::emit(state, contract, Address::zero(), caller, id);
        }
        Some(gas)
    }

    fn transfer(
        state: &mut State,
        contract: Address,
        caller: Address,
        from: Address,
        to: Address,
        id: U256,
    ) -> Option<u64> {
        let token = state.contracts.get_mut(&contract).unwrap();
        if caller != from || token.owners.get(&id) != Some(&from) || from == to {
            return None;
        }
        let mut gas = TX_BASE_GAS;
        gas += if token.balances.get(&to).copied().unwrap_or_default() == 0 {
            NEW_HOLDER_GAS
        } else {
            EXISTING_HOLDER_GAS
        };
        token.owners.insert(id, to);
        *token.balances.entry(from).or_default() -= 1;
        *token.balances.entry(to).or_default() += 1;
        Self::emit(state, contract, from, to, id);
        Some(gas)
    }
}

/// Topic of the `Transfer` event.
pub fn transfer_topic() -> H256 {
    token_abi().event("Transfer").unwrap().signature()
}

/// Log of `Transfer(from, to, id)` emitted by `contract`.
pub fn transfer_log(contract: Address, from: Address, to: Address, id: U256) -> Log {
    Log {
        address: contract,
        topics: vec![
            transfer_topic(),
            H256::from(from),
            H256::from(to),
            H256::from_uint(&id),
        ],
        ..Default::default()
    }
}

impl Chain for Sandbox {
    async fn accounts(&self) -> anyhow::Result<Vec<Address>> {
        Ok(self.accounts.clone())
    }

    async fn deploy(&self, _from: Address, init_code: Bytes) -> anyhow::Result<TxHash> {
        let mut state = self.state.borrow_mut();
        let hash = Self::next_hash(&mut state);
        let address = Address::from_low_u64_be(0xc0_0000 + state.tx_count);
        let weight = u64::from(init_code.first().copied().unwrap_or_default());
        state.contracts.insert(
            address,
            Collection {
                per_token_gas: 2_000 + 100 * weight,
                ..Default::default()
            },
        );
        let receipt = Receipt {
            hash,
            gas_used: DEPLOY_BASE_GAS + 200 * init_code.len() as u64,
            contract_address: Some(address),
        };
        state.receipts.insert(hash, Ok(receipt));
        Ok(hash)
    }

    async fn send(&self, from: Address, to: Address, calldata: Bytes) -> anyhow::Result<TxHash> {
        let abi = token_abi();
        let (selector, args) = calldata.split_at(4);
        let function = abi
            .functions()
            .find(|f| f.short_signature() == selector)
            .context("unknown selector")?;
        let inputs = function.decode_input(args)?;

        let mut state = self.state.borrow_mut();
        anyhow::ensure!(state.contracts.contains_key(&to), "no contract at {to:?}");
        let hash = Self::next_hash(&mut state);
        let gas = match (function.name.as_str(), inputs.as_slice()) {
            ("mint", [Token::Uint(count)]) => {
                Self::mint(&mut state, self.options, to, from, count.as_u64())
            }
            (
                "transferFrom",
                [Token::Address(owner), Token::Address(recipient), Token::Uint(id)],
            ) => Self::transfer(&mut state, to, from, *owner, *recipient, *id),
            _ => None,
        };
        let receipt = match gas {
            Some(gas_used) => Ok(Receipt {
                hash,
                gas_used,
                contract_address: None,
            }),
            None => Err(Error::Reverted { hash }),
        };
        state.receipts.insert(hash, receipt);
        Ok(hash)
    }

    async fn confirm(&self, hash: TxHash) -> anyhow::Result<Receipt> {
        tokio::task::yield_now().await;
        let receipt = self
            .state
            .borrow_mut()
            .receipts
            .remove(&hash)
            .ok_or(Error::Dropped { hash })?;
        Ok(receipt?)
    }

    async fn watch(&self, filter: &Filter) -> anyhow::Result<Subscription<'_>> {
        let Some(ValueOrArray::Value(contract)) = &filter.address else {
            anyhow::bail!("sandbox filters need a single address");
        };
        let (sender, receiver) = unbounded();
        let mut state = self.state.borrow_mut();
        state.watch_count += 1;
        let id = U256::from(state.watch_count);
        state.watchers.push(Watcher {
            id,
            contract: *contract,
            sender,
        });
        Ok(Subscription {
            id,
            logs: receiver.boxed_local(),
        })
    }

    async fn unwatch(&self, id: U256) -> anyhow::Result<()> {
        let mut state = self.state.borrow_mut();
        let before = state.watchers.len();
        state.watchers.retain(|watcher| watcher.id != id);
        anyhow::ensure!(state.watchers.len() < before, "no log filter {id}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mint_call(count: u64) -> Bytes {
        token_abi()
            .function("mint")
            .unwrap()
            .encode_input(&[Token::Uint(count.into())])
            .unwrap()
            .into()
    }

    async fn deployed(sandbox: &Sandbox) -> Address {
        let hash = sandbox
            .deploy(Address::zero(), Bytes::from(vec![0; 4]))
            .await
            .unwrap();
        sandbox.confirm(hash).await.unwrap().contract_address.unwrap()
    }

    #[tokio::test]
    async fn first_mint_costs_more() {
        let sandbox = Sandbox::new(3);
        let contract = deployed(&sandbox).await;
        let owner = sandbox.accounts[0];

        let first = sandbox.send(owner, contract, mint_call(1)).await.unwrap();
        let second = sandbox.send(owner, contract, mint_call(1)).await.unwrap();
        let first = sandbox.confirm(first).await.unwrap().gas_used;
        let second = sandbox.confirm(second).await.unwrap().gas_used;

        assert_eq!(first - second, FIRST_MINT_GAS);
        assert_eq!(sandbox.balance_of(contract, owner), 2);
    }

    #[tokio::test]
    async fn transfer_by_non_owner_reverts() {
        let sandbox = Sandbox::new(3);
        let contract = deployed(&sandbox).await;
        let [owner, other, _] = sandbox.accounts[..] else {
            unreachable!()
        };
        let hash = sandbox.send(owner, contract, mint_call(1)).await.unwrap();
        sandbox.confirm(hash).await.unwrap();

        let call = token_abi()
            .function("transferFrom")
            .unwrap()
            .encode_input(&[
                Token::Address(owner),
                Token::Address(other),
                Token::Uint(U256::zero()),
            ])
            .unwrap();
        let hash = sandbox.send(other, contract, call.into()).await.unwrap();
        let err = sandbox.confirm(hash).await.unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Reverted { .. })
        ));
        assert_eq!(sandbox.owner_of(contract, U256::zero()), Some(owner));
    }

    #[tokio::test]
    async fn unwatch_removes_only_that_subscription() {
        let sandbox = Sandbox::new(3);
        let contract = deployed(&sandbox).await;
        let filter = Filter::new().address(contract);
        let first = sandbox.watch(&filter).await.unwrap();
        let second = sandbox.watch(&filter).await.unwrap();
        assert_eq!(sandbox.active_watchers(), 2);

        sandbox.unwatch(first.id).await.unwrap();

        assert_eq!(sandbox.active_watchers(), 1);
        assert!(sandbox.unwatch(first.id).await.is_err());
        sandbox.unwatch(second.id).await.unwrap();
        assert_eq!(sandbox.active_watchers(), 0);
    }
}

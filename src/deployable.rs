//! Turning contract names into deployed, invocable instances.
//!
//! [`compile`] builds the Solidity sources of a project with [`ethers_solc`] and keeps the [`Artifact`] of every
//! requested contract variant. A [`Deployable`] then resolves a variant by name and deploys fresh [`Instance`]s of it,
//! waiting for each deployment to be mined so the instance is usable as soon as it is returned.
//!
//! # Examples
//!
//! ```no_run
//! use std::{path::PathBuf, time::Duration};
//!
//! use gas_bench::{
//!     chain::{Chain, RpcChain},
//!     deployable::{compile, Deployable},
//!     suite::{CompilerSettings, Identifier},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let name = Identifier::from("Optimint");
//! let artifacts = compile(&PathBuf::from("."), &[name.clone()], &CompilerSettings::default())?;
//!
//! let chain = RpcChain::connect("http://127.0.0.1:8545", Duration::from_millis(50))?;
//! let owner = chain.accounts().await?[0];
//!
//! let (instance, receipt) = Deployable::new(&chain, &artifacts, owner).deploy_new(&name, &[]).await?;
//! println!("deployed {} at {:?} for {} gas", instance.name, instance.address, receipt.gas_used);
//! #     Ok(())
//! # }
//! ```

use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use ethers_core::{
    abi::{Abi, RawLog, Token},
    types::{Address, Bytes, Filter, Log, TxHash, U256},
};
use ethers_solc::{
    artifacts::Settings, Artifact as _, Project, ProjectPathsConfig, Solc, SolcConfig,
};
use semver::Version;

use crate::{
    chain::{Chain, Receipt},
    suite::{CompilerSettings, Identifier},
    Error,
};

/// Name of the directory holding the Solidity sources, relative to the project root.
pub const SOURCES_DIR: &str = "contracts";

/// Compiled form of a contract variant.
#[derive(Clone, Debug)]
pub struct Artifact {
    /// Contract name.
    pub name: Identifier,
    /// Contract ABI.
    pub abi: Abi,
    /// Creation bytecode, without constructor arguments.
    pub bytecode: Bytes,
    /// Version of the Solidity compiler that produced this artifact.
    pub solc_version: Version,
}

/// Compiled artifacts, keyed by contract name.
pub type Artifacts = BTreeMap<Identifier, Artifact>;

/// Compiles the project at `root` and returns the artifacts of the requested contracts.
///
/// Sources are read from the [`SOURCES_DIR`] directory under `root`.
///
/// # Errors
///
/// If the project cannot be set up or compiled, if the compiler reports errors, or if any requested contract has no
/// deployable artifact ([`Error::UnknownContract`]).
pub fn compile(
    root: &Path,
    names: &[Identifier],
    settings: &CompilerSettings,
) -> anyhow::Result<Artifacts> {
    let mut solc_settings = Settings::default();
    solc_settings.via_ir = Some(settings.via_ir);
    solc_settings.optimizer.enabled = Some(settings.optimizer_runs.is_some());
    solc_settings.optimizer.runs = settings.optimizer_runs;

    let mut builder = Project::builder()
        .paths(
            ProjectPathsConfig::builder()
                .root(root)
                .sources(root.join(SOURCES_DIR))
                .build()?,
        )
        .solc_config(SolcConfig::builder().settings(solc_settings).build());
    if let Some(version) = &settings.solc_version {
        log::info!("resolving solc {version}...");
        let solc = Solc::find_or_install_svm_version(version.to_string())
            .context(format!("could not find or install solc {version}"))?;
        builder = builder.solc(solc).no_auto_detect();
    }

    log::info!("compiling contracts under {}...", root.display());
    let output = builder
        .build()
        .context("could not set up project")?
        .compile()
        .context("could not compile project")?;
    if output.has_compiler_errors() {
        anyhow::bail!("compilation failed:\n{output}");
    }

    let artifacts: Artifacts = output
        .into_artifacts()
        .filter_map(|(artifact_id, artifact)| {
            let name = Identifier::from(artifact_id.name.clone());
            if !names.contains(&name) {
                log::trace!("[{name}] not a requested variant, skipping...");
                return None;
            }

            let abi = artifact.get_abi().or_else(|| {
                log::warn!("[{name}] no abi, skipping...");
                None
            })?;
            let bytecode = artifact
                .get_bytecode_bytes()
                .filter(|bytecode| !bytecode.is_empty())
                .or_else(|| {
                    log::debug!("[{name}] no creation bytecode, skipping...");
                    None
                })?;

            log::info!(
                "[{name}] compiled with solc {} ({} bytes)",
                artifact_id.version,
                bytecode.len()
            );
            Some((
                name.clone(),
                Artifact {
                    name,
                    abi: abi.into_owned(),
                    bytecode: bytecode.into_owned(),
                    solc_version: artifact_id.version,
                },
            ))
        })
        .collect();

    if let Some(missing) = names.iter().find(|name| !artifacts.contains_key(*name)) {
        return Err(Error::UnknownContract(missing.to_string()).into());
    }
    log::trace!("artifacts: {artifacts:#?}");

    Ok(artifacts)
}

/// Uniform access to deploying any of a set of compiled contracts.
///
/// Deployments are sent from a fixed deployer account.
#[derive(Debug)]
pub struct Deployable<'a, C> {
    chain: &'a C,
    artifacts: &'a Artifacts,
    deployer: Address,
}

impl<'a, C: Chain> Deployable<'a, C> {
    /// Creates a deployer over `artifacts`, signing deployments with `deployer`.
    pub fn new(chain: &'a C, artifacts: &'a Artifacts, deployer: Address) -> Self {
        Self {
            chain,
            artifacts,
            deployer,
        }
    }

    /// Looks up the artifact of a contract.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownContract`] if no artifact has that name.
    pub fn get_factory(&self, name: &Identifier) -> Result<&'a Artifact, Error> {
        self.artifacts
            .get(name)
            .ok_or_else(|| Error::UnknownContract(name.to_string()))
    }

    /// Deploys a new instance of a contract and waits for the deployment to be mined.
    ///
    /// # Errors
    ///
    /// If the contract is unknown, the constructor arguments cannot be encoded, or the deployment fails.
    pub async fn deploy_new(
        &self,
        name: &Identifier,
        args: &[Token],
    ) -> anyhow::Result<(Instance, Receipt)> {
        let artifact = self.get_factory(name)?;
        let init_code: Bytes = match artifact.abi.constructor() {
            Some(constructor) => constructor
                .encode_input(artifact.bytecode.to_vec(), args)
                .context(format!("[{name}] could not encode constructor arguments"))?
                .into(),
            None if args.is_empty() => artifact.bytecode.clone(),
            None => anyhow::bail!("[{name}] takes no constructor arguments"),
        };

        let hash = self.chain.deploy(self.deployer, init_code).await?;
        log::debug!("[{name}] submitted deployment {hash:?}");
        let receipt = self.chain.confirm(hash).await?;
        let address = receipt
            .contract_address
            .ok_or(Error::MissingContractAddress { hash })?;
        log::debug!(
            "[{name}] deployed at {address:?} for {} gas",
            receipt.gas_used
        );

        Ok((Instance::new(artifact, address), receipt))
    }

    /// Binds to an already deployed instance of a contract.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownContract`] if no artifact has that name.
    pub fn get_at(&self, name: &Identifier, address: Address) -> Result<Instance, Error> {
        Ok(Instance::new(self.get_factory(name)?, address))
    }
}

/// A `Transfer` notification decoded from a log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferEvent {
    /// Previous holder, the zero address for mints.
    pub from: Address,
    /// New holder.
    pub to: Address,
    /// Transferred token.
    pub token_id: U256,
}

/// A deployed contract variant.
#[derive(Clone, Debug)]
pub struct Instance {
    /// Contract name.
    pub name: Identifier,
    /// Deployment address.
    pub address: Address,
    abi: Abi,
}

impl Instance {
    fn new(artifact: &Artifact, address: Address) -> Self {
        Self {
            name: artifact.name.clone(),
            address,
            abi: artifact.abi.clone(),
        }
    }

    fn missing(&self, item: &str) -> Error {
        Error::MissingAbiItem {
            contract: self.name.to_string(),
            item: item.to_string(),
        }
    }

    fn encode(&self, function: &str, args: &[Token]) -> anyhow::Result<Bytes> {
        let calldata = self
            .abi
            .function(function)
            .map_err(|_| self.missing(function))?
            .encode_input(args)
            .context(format!("[{}] could not encode {function} call", self.name))?;
        Ok(calldata.into())
    }

    /// Submits `mint(quantity)` signed by `from`.
    ///
    /// # Errors
    ///
    /// If the ABI has no `mint` function or the submission fails.
    pub async fn mint<C: Chain>(
        &self,
        chain: &C,
        from: Address,
        quantity: u64,
    ) -> anyhow::Result<TxHash> {
        let calldata = self.encode("mint", &[Token::Uint(quantity.into())])?;
        chain.send(from, self.address, calldata).await
    }

    /// Submits `transferFrom(from, to, token_id)` signed by `sender`.
    ///
    /// # Errors
    ///
    /// If the ABI has no `transferFrom` function or the submission fails.
    pub async fn transfer_from<C: Chain>(
        &self,
        chain: &C,
        sender: Address,
        from: Address,
        to: Address,
        token_id: U256,
    ) -> anyhow::Result<TxHash> {
        let calldata = self.encode(
            "transferFrom",
            &[Token::Address(from), Token::Address(to), Token::Uint(token_id)],
        )?;
        chain.send(sender, self.address, calldata).await
    }

    /// Filter matching every `Transfer` log of this instance.
    ///
    /// # Errors
    ///
    /// [`Error::MissingAbiItem`] if the ABI has no `Transfer` event.
    pub fn transfer_filter(&self) -> Result<Filter, Error> {
        let event = self
            .abi
            .event("Transfer")
            .map_err(|_| self.missing("Transfer"))?;
        Ok(Filter::new().address(self.address).topic0(event.signature()))
    }

    /// Decodes a `Transfer` log emitted by this instance.
    ///
    /// # Errors
    ///
    /// If the log does not decode as `Transfer(address,address,uint256)`.
    pub fn decode_transfer(&self, log: Log) -> anyhow::Result<TransferEvent> {
        let event = self
            .abi
            .event("Transfer")
            .map_err(|_| self.missing("Transfer"))?;
        let parsed = event
            .parse_log(RawLog {
                topics: log.topics,
                data: log.data.to_vec(),
            })
            .context(format!("[{}] could not decode Transfer log", self.name))?;
        match parsed
            .params
            .into_iter()
            .map(|param| param.value)
            .collect::<Vec<_>>()
            .as_slice()
        {
            [Token::Address(from), Token::Address(to), Token::Uint(token_id)] => {
                Ok(TransferEvent {
                    from: *from,
                    to: *to,
                    token_id: *token_id,
                })
            }
            params => anyhow::bail!("[{}] unexpected Transfer params: {params:?}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::sandbox::{self, Sandbox, DEPLOY_BASE_GAS};

    fn artifacts() -> Artifacts {
        [sandbox::artifact("Optimint", 1)]
            .into_iter()
            .map(|artifact| (artifact.name.clone(), artifact))
            .collect()
    }

    #[tokio::test]
    async fn deploy_new_waits_for_address() {
        let chain = Sandbox::new(3);
        let artifacts = artifacts();
        let deployable = Deployable::new(&chain, &artifacts, Address::from_low_u64_be(1));

        let (instance, receipt) = deployable
            .deploy_new(&"Optimint".into(), &[])
            .await
            .unwrap();

        assert_eq!(receipt.contract_address, Some(instance.address));
        assert_eq!(receipt.gas_used, DEPLOY_BASE_GAS + 200 * 8);
        assert_eq!(chain.deployments(), 1);
    }

    #[tokio::test]
    async fn unknown_contract_is_an_error() {
        let chain = Sandbox::new(3);
        let artifacts = artifacts();
        let deployable = Deployable::new(&chain, &artifacts, Address::from_low_u64_be(1));

        let err = deployable
            .deploy_new(&"ERC721AMock".into(), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnknownContract(name)) if name == "ERC721AMock"
        ));
        assert!(deployable.get_at(&"Nope".into(), Address::zero()).is_err());
    }

    #[tokio::test]
    async fn arguments_without_constructor_are_rejected() {
        let chain = Sandbox::new(3);
        let artifacts = artifacts();
        let deployable = Deployable::new(&chain, &artifacts, Address::from_low_u64_be(1));

        let result = deployable
            .deploy_new(&"Optimint".into(), &[Token::Uint(1.into())])
            .await;
        assert!(result.is_err());
        assert_eq!(chain.deployments(), 0);
    }

    #[tokio::test]
    async fn decodes_mint_transfer() {
        let chain = Sandbox::new(3);
        let artifacts = artifacts();
        let owner = Address::from_low_u64_be(1);
        let (instance, _) = Deployable::new(&chain, &artifacts, owner)
            .deploy_new(&"Optimint".into(), &[])
            .await
            .unwrap();

        let mut subscription = chain
            .watch(&instance.transfer_filter().unwrap())
            .await
            .unwrap();
        let hash = instance.mint(&chain, owner, 1).await.unwrap();
        chain.confirm(hash).await.unwrap();

        let log = futures::StreamExt::next(&mut subscription.logs)
            .await
            .unwrap();
        let event = instance.decode_transfer(log).unwrap();
        assert_eq!(
            event,
            TransferEvent {
                from: Address::zero(),
                to: owner,
                token_id: U256::zero(),
            }
        );
    }

    #[test]
    fn get_at_binds_without_transactions() {
        let chain = Sandbox::new(3);
        let artifacts = artifacts();
        let deployable = Deployable::new(&chain, &artifacts, Address::zero());
        let address = Address::from_low_u64_be(42);

        let instance = deployable.get_at(&"Optimint".into(), address).unwrap();

        assert_eq!(instance.address, address);
        assert_eq!(chain.deployments(), 0);
    }
}

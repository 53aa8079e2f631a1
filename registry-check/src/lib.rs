//! Audits an on-chain contract registry: every contract's address-typed view
//! getters should return the address the central address provider records
//! for the contract they point at.
//!
//! `registry-bootstrap` derives the getter -> contract mapping from the ABI
//! directory once; `registry-check` resolves addresses and reports findings.

pub mod abi;
pub mod bootstrap;
pub mod checker;
pub mod contracts;
pub mod error;
pub mod ethers_reader;
pub mod matcher;
pub mod reader;
pub mod settings;

pub use abi::{AbiDirectory, AbiEntry};
pub use bootstrap::{
    bootstrap, build_config, BootstrapConfig, BootstrapOutcome, ReferenceMethod, SnapshotMeta,
};
pub use checker::{AddressTable, Checker, Finding, Report};
pub use contracts::load_contract_names;
pub use error::{AppError, Result};
pub use ethers_reader::EthersReader;
pub use matcher::match_contract;
pub use reader::{CallFailure, CallOutcome, ContractReader};
pub use settings::{Network, NetworkConfig, Settings};

//! The discrepancy sweep: resolve every contract through the address
//! provider, then compare each reference getter against that table.

use std::fmt;

use ethers::types::Address;

use crate::{
    bootstrap::BootstrapConfig,
    reader::{CallOutcome, ContractReader, ADDRESS_PROVIDER_METHOD},
};

/// Method column of a finding that covers a whole contract.
pub const UNLISTED_METHOD: &str = "*";

/// Contract name -> address-provider lookup result for the current run.
#[derive(Debug, Clone, Default)]
pub struct AddressTable {
    entries: Vec<(String, CallOutcome)>,
}

impl AddressTable {
    pub fn get(&self, contract: &str) -> Option<&CallOutcome> {
        self.entries
            .iter()
            .find(|(name, _)| name == contract)
            .map(|(_, outcome)| outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolved(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, outcome)| outcome.address().is_some())
            .count()
    }

    // First lookup per name wins; the table is write-once.
    fn record(&mut self, contract: &str, outcome: CallOutcome) {
        if self.get(contract).is_none() {
            self.entries.push((contract.to_string(), outcome));
        }
    }
}

/// One line of the discrepancy report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// The getter returned an address other than the registered one.
    Mismatch {
        contract: String,
        method: String,
        actual: Address,
        expected: Address,
    },
    /// The comparison could not be made.
    Unverified {
        contract: String,
        method: String,
        reason: String,
    },
}

impl Finding {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Finding::Mismatch { .. })
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Mismatch {
                contract,
                method,
                actual,
                expected,
            } => write!(
                f,
                "contract:{} method:{} address:{:?} correct address:{:?}",
                contract, method, actual, expected
            ),
            Finding::Unverified {
                contract,
                method,
                reason,
            } => write!(f, "contract:{} method:{} unverified:{}", contract, method, reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Report {
    pub findings: Vec<Finding>,
    /// Reference methods examined, including unverified ones.
    pub checked: usize,
}

impl Report {
    pub fn mismatches(&self) -> usize {
        self.findings.iter().filter(|f| f.is_mismatch()).count()
    }

    pub fn unverified(&self) -> usize {
        self.findings.len() - self.mismatches()
    }

    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub struct Checker<R> {
    reader: R,
    address_provider: Address,
}

impl<R: ContractReader> Checker<R> {
    pub fn new(reader: R, address_provider: Address) -> Self {
        Self {
            reader,
            address_provider,
        }
    }

    /// Resolve every contract, one call at a time, in list order.
    pub async fn resolve_addresses<S: AsRef<str>>(&self, contracts: &[S]) -> AddressTable {
        log::info!(
            "Resolving {} contract addresses via {:?}",
            contracts.len(),
            self.address_provider
        );
        let mut table = AddressTable::default();

        for contract in contracts {
            let contract = contract.as_ref();
            let outcome = self
                .reader
                .registered_address(self.address_provider, contract)
                .await;
            match &outcome {
                CallOutcome::Resolved(address) => log::debug!("{} -> {:?}", contract, address),
                CallOutcome::Failed(failure) => log::warn!(
                    "Error calling method {}({}): {}",
                    ADDRESS_PROVIDER_METHOD,
                    contract,
                    failure
                ),
            }
            table.record(contract, outcome);
        }

        table
    }

    /// Compare every reference method against `table`. Never aborts on a
    /// failed call.
    pub async fn verify<S: AsRef<str>>(
        &self,
        contracts: &[S],
        config: &BootstrapConfig,
        table: &AddressTable,
    ) -> Report {
        let mut report = Report::default();

        for contract in contracts {
            let contract = contract.as_ref();
            let Some(methods) = config.methods(contract) else {
                log::warn!(
                    "{} has no entry in the bootstrap config; regenerate it to audit this contract",
                    contract
                );
                report.findings.push(Finding::Unverified {
                    contract: contract.to_string(),
                    method: UNLISTED_METHOD.to_string(),
                    reason: "not in bootstrap config".to_string(),
                });
                continue;
            };

            for method in methods.iter().filter(|m| m.is_checkable()) {
                report.checked += 1;
                let unverified = |reason: String| Finding::Unverified {
                    contract: contract.to_string(),
                    method: method.method_name.clone(),
                    reason,
                };

                let at = match table.get(contract) {
                    Some(CallOutcome::Resolved(at)) => *at,
                    Some(CallOutcome::Failed(failure)) => {
                        report.findings.push(unverified(format!(
                            "address of {} unknown ({})",
                            contract, failure
                        )));
                        continue;
                    }
                    None => {
                        report
                            .findings
                            .push(unverified(format!("{} was not resolved", contract)));
                        continue;
                    }
                };

                let expected = match table.get(&method.value) {
                    Some(CallOutcome::Resolved(expected)) => *expected,
                    Some(CallOutcome::Failed(failure)) => {
                        report.findings.push(unverified(format!(
                            "address of {} unknown ({})",
                            method.value, failure
                        )));
                        continue;
                    }
                    None => {
                        report.findings.push(unverified(format!(
                            "{} is not in the contract list",
                            method.value
                        )));
                        continue;
                    }
                };

                match self
                    .reader
                    .reference_address(contract, at, &method.method_name)
                    .await
                {
                    CallOutcome::Resolved(actual) if actual == expected => {}
                    CallOutcome::Resolved(actual) => report.findings.push(Finding::Mismatch {
                        contract: contract.to_string(),
                        method: method.method_name.clone(),
                        actual,
                        expected,
                    }),
                    CallOutcome::Failed(failure) => {
                        log::warn!(
                            "Error calling method {} on {}: {}",
                            method.method_name,
                            contract,
                            failure
                        );
                        report.findings.push(unverified(failure.to_string()));
                    }
                }
            }
        }

        log::info!(
            "Checked {} reference methods: {} mismatched, {} unverified",
            report.checked,
            report.mismatches(),
            report.unverified()
        );
        report
    }

    /// Full sweep: resolve, then verify.
    pub async fn run<S: AsRef<str>>(&self, contracts: &[S], config: &BootstrapConfig) -> Report {
        for (contract, method) in config.unknown_references(contracts) {
            log::warn!(
                "{}.{} references unknown contract {}",
                contract,
                method.method_name,
                method.value
            );
        }

        let table = self.resolve_addresses(contracts).await;
        log::info!("Resolved {}/{} contract addresses", table.resolved(), table.len());
        self.verify(contracts, config, &table).await
    }
}

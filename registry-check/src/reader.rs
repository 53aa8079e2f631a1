use std::fmt;

use async_trait::async_trait;
use ethers::types::Address;

/// ABI file name of the registry contract.
pub const ADDRESS_PROVIDER_CONTRACT: &str = "AddressProvider";
/// Registry lookup method, `getContractAddress(string) returns (address)`.
pub const ADDRESS_PROVIDER_METHOD: &str = "getContractAddress";

/// Why a remote read did not produce an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFailure {
    /// Transport error, revert, missing contract, or an address that could not
    /// be resolved in the first place.
    CallFailed(String),
    /// The call returned, but not something decodable as an address.
    DecodeError(String),
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallFailure::CallFailed(reason) => write!(f, "call failed: {}", reason),
            CallFailure::DecodeError(reason) => write!(f, "decode error: {}", reason),
        }
    }
}

/// Result of one read-only call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Resolved(Address),
    Failed(CallFailure),
}

impl CallOutcome {
    pub fn address(&self) -> Option<Address> {
        match self {
            CallOutcome::Resolved(address) => Some(*address),
            CallOutcome::Failed(_) => None,
        }
    }
}

impl From<Result<Address, CallFailure>> for CallOutcome {
    fn from(result: Result<Address, CallFailure>) -> Self {
        match result {
            Ok(address) => CallOutcome::Resolved(address),
            Err(failure) => CallOutcome::Failed(failure),
        }
    }
}

/// Read-only access to the contracts under audit.
///
/// Implementations never fail the sweep: every error is folded into
/// [`CallOutcome::Failed`].
#[async_trait]
pub trait ContractReader: Send + Sync {
    /// `getContractAddress(name)` on the address provider.
    async fn registered_address(&self, provider: Address, contract: &str) -> CallOutcome;

    /// Zero-argument getter `method` on `contract`, deployed at `at`.
    async fn reference_address(&self, contract: &str, at: Address, method: &str) -> CallOutcome;
}

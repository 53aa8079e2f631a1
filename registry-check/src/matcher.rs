//! Pairs a getter name with the contract it most plausibly points at.
//!
//! Matching is case-insensitive. An exact name match wins; otherwise the first
//! contract (in list order) whose name contains the method name, or is
//! contained in it, is taken. Overlapping names such as `Oracle` and
//! `OracleAdapter` are resolved purely by list order, so a reordered contract
//! list can change the result. An empty name in the list is contained in
//! every method name and so shadows everything after it.

/// Returns the contract referenced by `method`, if any. The returned name is
/// always borrowed from `contracts`.
pub fn match_contract<'a, S>(method: &str, contracts: &'a [S]) -> Option<&'a str>
where
    S: AsRef<str>,
{
    if method.is_empty() {
        return None;
    }
    let method = method.to_lowercase();

    let exact = contracts
        .iter()
        .map(|contract| contract.as_ref())
        .find(|contract| contract.to_lowercase() == method);
    if exact.is_some() {
        return exact;
    }

    contracts.iter().map(|contract| contract.as_ref()).find(|contract| {
        let contract = contract.to_lowercase();
        method.contains(&contract) || contract.contains(&method)
    })
}

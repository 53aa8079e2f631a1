//! ABI directory access and the reference-method predicate.

use std::{
    fs,
    path::{Path, PathBuf},
};

use ethers::abi::Abi;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};

/// One entry of a contract ABI. Only the fields the reference-method
/// predicate looks at are kept.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiEntry {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub state_mutability: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
}

impl AbiEntry {
    /// Zero-argument view function returning exactly one address.
    ///
    /// Entries without `type` or `stateMutability` (pre-0.5 ABIs) never match.
    pub fn is_reference_candidate(&self) -> bool {
        let (Some(kind), Some(mutability)) = (&self.kind, &self.state_mutability) else {
            return false;
        };
        kind == "function"
            && mutability == "view"
            && self.inputs.is_empty()
            && self.outputs.len() == 1
            && self.outputs[0].kind == "address"
    }
}

/// A flat directory holding one `<Contract>.json` ABI per contract.
#[derive(Debug, Clone)]
pub struct AbiDirectory {
    dir: PathBuf,
}

impl AbiDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Locate `<contract>.json`, comparing file names case-insensitively.
    pub fn find(&self, contract: &str) -> Result<PathBuf> {
        let wanted = format!("{}.json", contract).to_lowercase();
        let entries = fs::read_dir(&self.dir).map_err(|e| AppError::io(&self.dir, e))?;

        for entry in entries {
            let entry = entry.map_err(|e| AppError::io(&self.dir, e))?;
            if entry.file_name().to_string_lossy().to_lowercase() == wanted {
                return Ok(entry.path());
            }
        }

        Err(AppError::AbiNotFound {
            contract: contract.to_string(),
            dir: self.dir.clone(),
        })
    }

    /// Raw file contents for a contract's ABI, as stored on disk.
    pub fn read(&self, contract: &str) -> Result<(PathBuf, Vec<u8>)> {
        let path = self.find(contract)?;
        let bytes = fs::read(&path).map_err(|e| AppError::io(&path, e))?;
        Ok((path, bytes))
    }

    pub fn entries(&self, contract: &str) -> Result<Vec<AbiEntry>> {
        let (path, value) = self.abi_value(contract)?;
        serde_json::from_value(value).map_err(|e| AppError::json(path, e))
    }

    /// The same ABI parsed for `ethers::contract::Contract`.
    pub fn ethers_abi(&self, contract: &str) -> Result<Abi> {
        let (path, value) = self.abi_value(contract)?;
        serde_json::from_value(value).map_err(|e| AppError::json(path, e))
    }

    fn abi_value(&self, contract: &str) -> Result<(PathBuf, Value)> {
        let (path, bytes) = self.read(contract)?;
        let json: Value = serde_json::from_slice(&bytes).map_err(|e| AppError::json(&path, e))?;
        Ok((path, unwrap_artifact(json)))
    }
}

// Compiler artifacts carry the ABI under an "abi" key.
fn unwrap_artifact(json: Value) -> Value {
    match json {
        Value::Object(mut map) if map.get("abi").map_or(false, Value::is_array) => {
            map.remove("abi").unwrap_or(Value::Null)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: Value) -> AbiEntry {
        serde_json::from_value(value).unwrap()
    }

    fn getter(name: &str) -> Value {
        json!({
            "type": "function",
            "stateMutability": "view",
            "name": name,
            "inputs": [],
            "outputs": [{ "name": "", "type": "address" }]
        })
    }

    #[test]
    fn accepts_zero_arg_address_view() {
        assert!(entry(getter("oracleB")).is_reference_candidate());
    }

    #[test]
    fn each_condition_is_required() {
        let mut not_function = getter("x");
        not_function["type"] = json!("event");
        let mut not_view = getter("x");
        not_view["stateMutability"] = json!("nonpayable");
        let mut with_input = getter("x");
        with_input["inputs"] = json!([{ "name": "id", "type": "uint256" }]);
        let mut two_outputs = getter("x");
        two_outputs["outputs"] = json!([{ "type": "address" }, { "type": "address" }]);
        let mut no_outputs = getter("x");
        no_outputs["outputs"] = json!([]);
        let mut not_address = getter("x");
        not_address["outputs"] = json!([{ "type": "uint256" }]);
        let mut legacy = getter("x");
        legacy.as_object_mut().unwrap().remove("stateMutability");
        legacy["constant"] = json!(true);

        for value in [
            not_function,
            not_view,
            with_input,
            two_outputs,
            no_outputs,
            not_address,
            legacy,
        ] {
            assert!(!entry(value.clone()).is_reference_candidate(), "{value}");
        }
    }

    #[test]
    fn finds_abi_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("vaulta.JSON"), "[]").unwrap();

        let abis = AbiDirectory::new(dir.path());
        let found = abis.find("VaultA").unwrap();
        assert_eq!(found.file_name().unwrap(), "vaulta.JSON");

        let err = abis.find("OracleB").unwrap_err();
        assert!(matches!(err, AppError::AbiNotFound { ref contract, .. } if contract == "OracleB"));
    }

    #[test]
    fn reads_bare_arrays_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let abi = json!([getter("oracleB"), { "type": "constructor", "inputs": [] }]);
        fs::write(dir.path().join("VaultA.json"), abi.to_string()).unwrap();
        fs::write(
            dir.path().join("OracleB.json"),
            json!({ "contractName": "OracleB", "abi": [getter("vaultA")] }).to_string(),
        )
        .unwrap();

        let abis = AbiDirectory::new(dir.path());
        let vault = abis.entries("VaultA").unwrap();
        assert_eq!(vault.len(), 2);
        assert_eq!(vault[0].name, "oracleB");

        let oracle = abis.entries("OracleB").unwrap();
        assert_eq!(oracle.len(), 1);
        assert!(oracle[0].is_reference_candidate());

        let parsed = abis.ethers_abi("OracleB").unwrap();
        assert!(parsed.function("vaultA").is_ok());
    }

    #[test]
    fn malformed_abi_is_a_json_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("VaultA.json"), "[{").unwrap();

        let err = AbiDirectory::new(dir.path()).entries("VaultA").unwrap_err();
        assert!(matches!(err, AppError::Json { .. }));
    }
}

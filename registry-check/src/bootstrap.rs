//! Derives the reference-method config from the ABI directory and writes it
//! exactly once.

use std::{
    fmt,
    fs::{self, File},
    io::{ErrorKind, Write},
    path::Path,
};

use chrono::{DateTime, Utc};
use ethers::utils::keccak256;
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use tempfile::NamedTempFile;

use crate::{
    abi::AbiDirectory,
    error::{AppError, Result},
    matcher::match_contract,
    settings::meta_path,
};

/// A getter on one contract and the sibling contract it is expected to
/// return the address of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceMethod {
    pub method_name: String,
    /// Referenced contract name.
    pub value: String,
    pub is_reference: bool,
}

impl ReferenceMethod {
    pub fn new(method_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            value: value.into(),
            is_reference: true,
        }
    }

    /// Entries with an empty target or a cleared flag are not checked.
    pub fn is_checkable(&self) -> bool {
        self.is_reference && !self.value.is_empty()
    }
}

/// Contract name -> reference methods, in contract-list order.
///
/// Serialized as a JSON object; key order is preserved both ways.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootstrapConfig {
    entries: Vec<(String, Vec<ReferenceMethod>)>,
}

impl BootstrapConfig {
    pub fn insert(&mut self, contract: impl Into<String>, methods: Vec<ReferenceMethod>) {
        let contract = contract.into();
        match self.entries.iter_mut().find(|(name, _)| *name == contract) {
            Some((_, existing)) => *existing = methods,
            None => self.entries.push((contract, methods)),
        }
    }

    pub fn methods(&self, contract: &str) -> Option<&[ReferenceMethod]> {
        self.entries
            .iter()
            .find(|(name, _)| name == contract)
            .map(|(_, methods)| methods.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[ReferenceMethod])> {
        self.entries
            .iter()
            .map(|(name, methods)| (name.as_str(), methods.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn method_count(&self) -> usize {
        self.entries.iter().map(|(_, methods)| methods.len()).sum()
    }

    /// References whose target is not in `contracts`.
    pub fn unknown_references<'a, S: AsRef<str>>(
        &'a self,
        contracts: &[S],
    ) -> Vec<(&'a str, &'a ReferenceMethod)> {
        self.iter()
            .flat_map(|(contract, methods)| methods.iter().map(move |m| (contract, m)))
            .filter(|(_, method)| method.is_checkable())
            .filter(|(_, method)| !contracts.iter().any(|c| c.as_ref() == method.value))
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| AppError::io(path, e))?;
        let config: Self = serde_json::from_reader(file).map_err(|e| AppError::json(path, e))?;

        log::info!(
            "Loaded {} reference methods for {} contracts from {}",
            config.method_count(),
            config.len(),
            path.display()
        );
        Ok(config)
    }
}

impl Serialize for BootstrapConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (contract, methods) in &self.entries {
            map.serialize_entry(contract, methods)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BootstrapConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ConfigVisitor;

        impl<'de> Visitor<'de> for ConfigVisitor {
            type Value = BootstrapConfig;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of contract names to reference methods")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut config = BootstrapConfig::default();
                while let Some((contract, methods)) =
                    access.next_entry::<String, Vec<ReferenceMethod>>()?
                {
                    config.insert(contract, methods);
                }
                Ok(config)
            }
        }

        deserializer.deserialize_map(ConfigVisitor)
    }
}

/// Generation record kept next to the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    pub contract_count: usize,
    /// keccak-256 over the contract list and every ABI file read.
    pub content_hash: String,
}

impl SnapshotMeta {
    pub fn new(contract_count: usize, content_hash: String) -> Self {
        Self {
            generated_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            contract_count,
            content_hash,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| AppError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| AppError::json(path, e))
    }
}

/// What a bootstrap invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Written { contracts: usize, methods: usize },
    /// The config was left untouched. `stale` is `Some(true)` when the
    /// recorded hash differs from the current inputs, `None` when it could
    /// not be compared.
    AlreadyExists { stale: Option<bool> },
}

/// Build the config: every reference candidate whose name matches a sibling
/// contract. Unmatched candidates are dropped.
pub fn build_config<S: AsRef<str>>(contracts: &[S], abis: &AbiDirectory) -> Result<BootstrapConfig> {
    let mut config = BootstrapConfig::default();

    for contract in contracts {
        let contract = contract.as_ref();
        let mut methods = Vec::new();
        for entry in abis.entries(contract)? {
            if !entry.is_reference_candidate() {
                continue;
            }
            // An empty target means the getter matched a blank list entry.
            match match_contract(&entry.name, contracts) {
                Some(target) if !target.is_empty() => {
                    methods.push(ReferenceMethod::new(entry.name.clone(), target))
                }
                _ => log::debug!("{}.{}: no matching contract", contract, entry.name),
            }
        }
        log::debug!("{}: {} reference methods", contract, methods.len());
        config.insert(contract, methods);
    }

    Ok(config)
}

/// Hash of the contract list and the ABI bytes of each contract, in order.
pub fn content_hash<S: AsRef<str>>(contracts: &[S], abis: &AbiDirectory) -> Result<String> {
    let mut buf = Vec::new();
    for contract in contracts {
        let contract = contract.as_ref();
        let (_, bytes) = abis.read(contract)?;
        buf.extend_from_slice(contract.as_bytes());
        buf.push(0);
        buf.extend_from_slice(&keccak256(&bytes));
    }
    Ok(format!("0x{}", hex::encode(keccak256(&buf))))
}

/// Write the config to `config_path` unless a file is already there.
pub fn bootstrap<S: AsRef<str>>(
    contracts: &[S],
    abis: &AbiDirectory,
    config_path: &Path,
) -> Result<BootstrapOutcome> {
    let meta_file = meta_path(config_path);

    if config_path.exists() {
        log::info!("File already exists: {}", config_path.display());
        let stale = staleness(contracts, abis, &meta_file);
        if stale == Some(true) {
            log::warn!(
                "{} was generated from different ABIs; remove it to regenerate",
                config_path.display()
            );
        }
        return Ok(BootstrapOutcome::AlreadyExists { stale });
    }

    let config = build_config(contracts, abis)?;
    let meta = SnapshotMeta::new(config.len(), content_hash(contracts, abis)?);

    if !write_once(config_path, &config)? {
        log::info!("File already exists: {}", config_path.display());
        return Ok(BootstrapOutcome::AlreadyExists { stale: None });
    }
    stage_json(&meta_file, &meta)?
        .persist(&meta_file)
        .map_err(|e| AppError::io(&meta_file, e.error))?;

    log::info!(
        "Wrote {} reference methods for {} contracts to {}",
        config.method_count(),
        config.len(),
        config_path.display()
    );
    Ok(BootstrapOutcome::Written {
        contracts: config.len(),
        methods: config.method_count(),
    })
}

/// Serialize `value` into a temporary file next to `path`. Dropping the
/// returned file removes it, so a failed write never leaves a partial file.
fn stage_json<T: Serialize>(path: &Path, value: &T) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir).map_err(|e| AppError::io(dir, e))?;
    serde_json::to_writer_pretty(&mut staged, value).map_err(|e| AppError::json(path, e))?;
    staged
        .write_all(b"\n")
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| AppError::io(path, e))?;
    Ok(staged)
}

/// Move a fully written file to `path`. Returns `false` if `path` already
/// exists; the existing file is never replaced.
fn write_once<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    match stage_json(path, value)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(AppError::io(path, e.error)),
    }
}

fn staleness<S: AsRef<str>>(contracts: &[S], abis: &AbiDirectory, meta_file: &Path) -> Option<bool> {
    let meta = match SnapshotMeta::load(meta_file) {
        Ok(meta) => meta,
        Err(e) => {
            log::debug!("No usable snapshot metadata: {}", e);
            return None;
        }
    };
    match content_hash(contracts, abis) {
        Ok(hash) => Some(hash != meta.content_hash),
        Err(e) => {
            log::warn!("Could not hash current ABIs: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    fn getter(name: &str) -> Value {
        json!({
            "type": "function",
            "stateMutability": "view",
            "name": name,
            "inputs": [],
            "outputs": [{ "name": "", "type": "address" }]
        })
    }

    fn fixture() -> (tempfile::TempDir, AbiDirectory, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let abi_dir = dir.path().join("abis");
        fs::create_dir(&abi_dir).unwrap();

        let mut setter = getter("setOracleB");
        setter["stateMutability"] = json!("nonpayable");
        setter["inputs"] = json!([{ "name": "oracle", "type": "address" }]);
        let vault = json!([getter("oracleB"), getter("owner"), setter]);
        fs::write(abi_dir.join("VaultA.json"), vault.to_string()).unwrap();
        fs::write(abi_dir.join("oracleb.json"), json!([getter("vault")]).to_string()).unwrap();

        let contracts = vec!["VaultA".to_string(), "OracleB".to_string()];
        (dir, AbiDirectory::new(abi_dir), contracts)
    }

    #[test]
    fn derives_reference_methods() {
        let (_dir, abis, contracts) = fixture();
        let config = build_config(&contracts, &abis).unwrap();

        assert_eq!(
            config.methods("VaultA").unwrap(),
            &[ReferenceMethod::new("oracleB", "OracleB")]
        );
        assert_eq!(
            config.methods("OracleB").unwrap(),
            &[ReferenceMethod::new("vault", "VaultA")]
        );
        assert!(config.unknown_references(&contracts).is_empty());
    }

    #[test]
    fn serializes_as_contract_keyed_object() {
        let mut config = BootstrapConfig::default();
        config.insert("VaultA", vec![ReferenceMethod::new("oracleB", "OracleB")]);
        config.insert("OracleB", vec![]);

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            json!({
                "VaultA": [{ "methodName": "oracleB", "value": "OracleB", "isReference": true }],
                "OracleB": []
            })
        );

        let text = serde_json::to_string(&config).unwrap();
        assert!(text.find("VaultA").unwrap() < text.find("\"OracleB\":").unwrap());
        let back: BootstrapConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn writes_config_and_meta() {
        let (dir, abis, contracts) = fixture();
        let path = dir.path().join("addressConfig.json");

        let outcome = bootstrap(&contracts, &abis, &path).unwrap();
        assert_eq!(outcome, BootstrapOutcome::Written { contracts: 2, methods: 2 });

        let written = BootstrapConfig::load(&path).unwrap();
        assert_eq!(written, build_config(&contracts, &abis).unwrap());

        let meta = SnapshotMeta::load(&dir.path().join("addressConfig.meta.json")).unwrap();
        assert_eq!(meta.contract_count, 2);
        assert_eq!(meta.content_hash, content_hash(&contracts, &abis).unwrap());
    }

    #[test]
    fn second_run_leaves_file_untouched() {
        let (dir, abis, contracts) = fixture();
        let path = dir.path().join("addressConfig.json");

        bootstrap(&contracts, &abis, &path).unwrap();
        let before = fs::read(&path).unwrap();

        let outcome = bootstrap(&contracts, &abis, &path).unwrap();
        assert_eq!(outcome, BootstrapOutcome::AlreadyExists { stale: Some(false) });
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn reports_stale_config_without_overwriting() {
        let (dir, abis, contracts) = fixture();
        let path = dir.path().join("addressConfig.json");
        bootstrap(&contracts, &abis, &path).unwrap();
        let before = fs::read(&path).unwrap();

        fs::write(
            abis.path().join("oracleb.json"),
            json!([getter("vault"), getter("vaultA")]).to_string(),
        )
        .unwrap();

        let outcome = bootstrap(&contracts, &abis, &path).unwrap();
        assert_eq!(outcome, BootstrapOutcome::AlreadyExists { stale: Some(true) });
        assert_eq!(fs::read(&path).unwrap(), before);
    }

    #[test]
    fn existing_file_without_meta_is_kept() {
        let (dir, abis, contracts) = fixture();
        let path = dir.path().join("addressConfig.json");
        fs::write(&path, "{}").unwrap();

        let outcome = bootstrap(&contracts, &abis, &path).unwrap();
        assert_eq!(outcome, BootstrapOutcome::AlreadyExists { stale: None });
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn blank_contract_name_discards_the_getter() {
        let (_dir, abis, _) = fixture();
        fs::write(abis.path().join(".json"), "[]").unwrap();
        let contracts = vec![String::new(), "VaultA".to_string(), "OracleB".to_string()];

        let config = build_config(&contracts, &abis).unwrap();
        // "oracleB" is an exact match; "vault" only ever reaches the blank entry.
        assert_eq!(
            config.methods("VaultA").unwrap(),
            &[ReferenceMethod::new("oracleB", "OracleB")]
        );
        assert!(config.methods("OracleB").unwrap().is_empty());
    }

    #[test]
    fn write_once_never_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addressConfig.json");

        assert!(write_once(&path, &json!({ "VaultA": [] })).unwrap());
        let before = fs::read(&path).unwrap();
        assert!(!write_once(&path, &json!({ "OracleB": [] })).unwrap());

        assert_eq!(fs::read(&path).unwrap(), before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_write_leaves_no_file_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("addressConfig.json");
        // JSON object keys must be strings.
        let unserializable: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);

        let err = write_once(&path, &unserializable).unwrap_err();
        assert!(matches!(err, AppError::Json { .. }));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_abi_aborts() {
        let (dir, abis, mut contracts) = fixture();
        contracts.push("Treasury".to_string());

        let err = bootstrap(&contracts, &abis, &dir.path().join("addressConfig.json")).unwrap_err();
        assert!(matches!(err, AppError::AbiNotFound { .. }));
        assert!(!dir.path().join("addressConfig.json").exists());
    }

    #[test]
    fn flags_references_to_unlisted_contracts() {
        let mut config = BootstrapConfig::default();
        config.insert(
            "VaultA",
            vec![
                ReferenceMethod::new("oracleB", "OracleB"),
                ReferenceMethod::new("treasury", "Treasury"),
            ],
        );
        let unknown = config.unknown_references(&["VaultA", "OracleB"]);
        assert_eq!(unknown.len(), 1);
        assert_eq!(unknown[0].0, "VaultA");
        assert_eq!(unknown[0].1.value, "Treasury");
    }
}

use std::{fs::File, path::Path};

use crate::error::{AppError, Result};

/// Load the ordered contract name list (a JSON array of strings).
pub fn load_contract_names(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| AppError::io(path, e))?;
    let names: Vec<String> = serde_json::from_reader(file).map_err(|e| AppError::json(path, e))?;

    log::info!("Loaded {} contract names from {}", names.len(), path.display());
    Ok(names)
}

//! Compiled contract artifacts (`zksolc` / hardhat-zksync JSON output).

use std::{fs, path::Path};

use alloy_primitives::Bytes;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Artifact {
    #[serde(rename = "contractName", default)]
    contract_name: Option<String>,
    bytecode: String,
}

/// A contract's deployable bytecode.
#[derive(Debug, Clone)]
pub struct CompiledContract {
    pub name: String,
    pub bytecode: Bytes,
}

pub fn load(path: &Path) -> Result<CompiledContract> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let artifact: Artifact = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing artifact {}", path.display()))?;

    let bytecode: Bytes = artifact
        .bytecode
        .trim()
        .parse()
        .map_err(|e| anyhow!("invalid bytecode hex in {}: {e}", path.display()))?;
    if bytecode.is_empty() {
        return Err(anyhow!("artifact {} has no bytecode", path.display()));
    }

    let name = artifact.contract_name.unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Ok(CompiledContract { name, bytecode })
}

//! The deployments ledger: one JSON file recording what was deployed where.
//!
//! ```json
//! {
//!   "updated_at": "...",
//!   "networks": {
//!     "testnet": {
//!       "rpc_url": "...",
//!       "chain_id": 300,
//!       "deployments": { "multisig": { "address": "0x...", ... } }
//!     }
//!   }
//! }
//! ```

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Where an entry lands in the ledger.
#[derive(Debug, Clone)]
pub struct LedgerTarget<'a> {
    pub network: &'a str,
    pub rpc_url: &'a str,
    pub chain_id: u64,
}

pub fn record_deployment<T: Serialize>(
    path: &Path,
    target: &LedgerTarget<'_>,
    key: &str,
    details: &T,
) -> Result<()> {
    let now = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    let mut root = read_ledger(path)?;
    root["updated_at"] = json!(now);

    if root.get("networks").and_then(Value::as_object).is_none() {
        root["networks"] = json!({});
    }
    let network = &mut root["networks"][target.network];
    if !network.is_object() {
        *network = json!({});
    }
    network["rpc_url"] = json!(target.rpc_url);
    network["chain_id"] = json!(target.chain_id);
    if network.get("deployments").and_then(Value::as_object).is_none() {
        network["deployments"] = json!({});
    }

    let mut entry = serde_json::to_value(details)
        .with_context(|| format!("failed serialising deployment `{key}`"))?;
    if let Some(fields) = entry.as_object_mut() {
        fields.insert("deployed_at".to_string(), json!(now));
    }
    network["deployments"][key] = entry;

    write_json_atomic(path, &root)
}

/// Address recorded under `network`/`key`, if any.
pub fn recorded_address(path: &Path, network: &str, key: &str) -> Result<Option<String>> {
    let root = read_ledger(path)?;
    Ok(root["networks"][network]["deployments"][key]["address"]
        .as_str()
        .map(str::to_string))
}

fn read_ledger(path: &Path) -> Result<Value> {
    let existing = if path.exists() {
        fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?
    } else {
        String::new()
    };

    let root: Value = if existing.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&existing)
            .with_context(|| format!("failed parsing JSON in {}", path.display()))?
    };

    Ok(if root.is_object() { root } else { json!({}) })
}

fn write_json_atomic(path: &Path, value: &Value) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed creating directory {}", parent.display()))?;
    }

    let serialised =
        serde_json::to_string_pretty(value).context("failed serialising deployments JSON")?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes())
        .with_context(|| format!("failed writing temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed replacing {}", path.display()))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TESTNET: LedgerTarget<'static> = LedgerTarget {
        network: "testnet",
        rpc_url: "https://sepolia.era.zksync.dev",
        chain_id: 300,
    };

    fn read(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn creates_ledger_with_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/deployments.json");

        record_deployment(&path, &TESTNET, "aa-factory", &json!({ "address": "0x01" })).unwrap();

        let root = read(&path);
        assert_eq!(root["networks"]["testnet"]["chain_id"], 300);
        assert_eq!(
            root["networks"]["testnet"]["deployments"]["aa-factory"]["address"],
            "0x01"
        );
        assert!(root["networks"]["testnet"]["deployments"]["aa-factory"]["deployed_at"].is_string());
        assert!(!tmp_path_for(&path).exists());
    }

    #[test]
    fn keeps_other_entries_and_networks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        let local = LedgerTarget {
            network: "local",
            rpc_url: "http://localhost:3050",
            chain_id: 270,
        };

        record_deployment(&path, &TESTNET, "aa-factory", &json!({ "address": "0x01" })).unwrap();
        record_deployment(&path, &TESTNET, "multisig", &json!({ "address": "0x02" })).unwrap();
        record_deployment(&path, &local, "multisig", &json!({ "address": "0x03" })).unwrap();
        record_deployment(&path, &TESTNET, "multisig", &json!({ "address": "0x04" })).unwrap();

        assert_eq!(
            recorded_address(&path, "testnet", "aa-factory").unwrap().as_deref(),
            Some("0x01")
        );
        assert_eq!(
            recorded_address(&path, "testnet", "multisig").unwrap().as_deref(),
            Some("0x04")
        );
        assert_eq!(
            recorded_address(&path, "local", "multisig").unwrap().as_deref(),
            Some("0x03")
        );
    }

    #[test]
    fn replaces_non_object_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        fs::write(&path, "[1, 2, 3]").unwrap();

        record_deployment(&path, &TESTNET, "multisig", &json!({ "address": "0x02" })).unwrap();

        assert!(read(&path).is_object());
    }

    #[test]
    fn rejects_corrupt_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployments.json");
        fs::write(&path, "{ not json").unwrap();

        let err = record_deployment(&path, &TESTNET, "multisig", &json!({})).unwrap_err();
        assert!(err.to_string().contains("failed parsing JSON"));
    }

    #[test]
    fn missing_ledger_has_no_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert_eq!(recorded_address(&path, "testnet", "multisig").unwrap(), None);
    }
}

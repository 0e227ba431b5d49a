// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! YAML layer loading with deep merge.
//!
//! Search order (later overrides earlier):
//! 1. `/etc/aexowork/fabric.yaml`
//! 2. `~/.config/aexowork/fabric.yaml`
//! 3. `.aexowork/fabric.yaml` (workspace-local)
//! 4. Path given to [`load`] explicitly.
//!
//! Scalars and sequences replace; mappings merge key-by-key, so a layer can
//! override only the fields it cares about.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{error::ConfigError, schema::FabricConfig};

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    paths.push(PathBuf::from("/etc/aexowork/fabric.yaml"));
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/aexowork/fabric.yaml"));
    }
    paths.push(PathBuf::from(".aexowork/fabric.yaml"));
    paths
}

fn read_layer(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load the fabric configuration, merging every layer that exists.
pub fn load(extra: Option<&Path>) -> Result<FabricConfig, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading fabric config layer");
            merge_yaml(&mut merged, read_layer(&path)?);
        }
    }

    if let Some(path) = extra {
        debug!(path = %path.display(), "loading explicit fabric config");
        merge_yaml(&mut merged, read_layer(path)?);
    }

    if matches!(&merged, serde_yaml::Value::Mapping(m) if m.is_empty()) {
        return Ok(FabricConfig::default());
    }
    serde_yaml::from_value(merged).map_err(|e| ConfigError::Parse {
        path: "<merged config>".to_string(),
        message: e.to_string(),
    })
}

fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(&dir, "fabric.yaml", "ledger_network: mainnet\nbus_url: nats://bus:4222\n");
        let config = load(Some(&path)).unwrap();
        assert_eq!(config.ledger_network.as_str(), "mainnet");
        assert_eq!(config.bus_url, "nats://bus:4222");
        // Untouched fields keep their defaults.
        assert!(config.use_offchain_messaging);
    }

    #[test]
    fn merge_is_deep_for_mappings() {
        let mut base: serde_yaml::Value =
            serde_yaml::from_str("agent:\n  name: a\n  capabilities: [x]\n").unwrap();
        let layer: serde_yaml::Value = serde_yaml::from_str("agent:\n  name: b\n").unwrap();
        merge_yaml(&mut base, layer);
        let config: FabricConfig = serde_yaml::from_value(base).unwrap();
        assert_eq!(config.agent.name.as_deref(), Some("b"));
        assert_eq!(config.agent.capabilities, vec!["x"]);
    }

    #[test]
    fn missing_explicit_file_is_an_io_error() {
        let err = load(Some(Path::new("/nonexistent/fabric.yaml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(&dir, "bad.yaml", "peers: {no\n");
        assert!(matches!(
            load(Some(&path)).unwrap_err(),
            ConfigError::Parse { .. }
        ));
    }
}

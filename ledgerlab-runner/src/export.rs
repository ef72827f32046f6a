//! Export stage: archive each scenario directory of a symbol and upload it
//! to the extracts bucket as `<symbol>/<scenario>.<ext>`.

use anyhow::{Context, Result};
use ledgerlab_core::storage::Archiver;
use ledgerlab_core::ObjectStore;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Per-scenario export results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Object keys that were uploaded.
    pub uploaded: Vec<String>,
    /// `(scenario, reason)` for every scenario that could not be exported.
    pub failed: Vec<(String, String)>,
}

/// Archive and upload every scenario directory under `symbol_dir`.
///
/// A failure for one scenario is logged and recorded; the rest continue.
/// Only failing to list `symbol_dir` is an error.
pub fn export_symbol(
    store: &dyn ObjectStore,
    archiver: &dyn Archiver,
    bucket: &str,
    symbol_dir: &Path,
) -> Result<ExportSummary> {
    let symbol = symbol_dir
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .with_context(|| format!("symbol directory has no name: {}", symbol_dir.display()))?;

    let mut scenario_dirs: Vec<PathBuf> = fs::read_dir(symbol_dir)
        .with_context(|| format!("listing {}", symbol_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_dir())
        .collect();
    scenario_dirs.sort();

    let mut summary = ExportSummary::default();
    for dir in scenario_dirs {
        let scenario = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let key = format!("{symbol}/{scenario}.{}", archiver.extension());
        match export_scenario(store, archiver, bucket, &dir, &key) {
            Ok(bytes) => {
                info!(bucket, key = %key, bytes, "uploaded scenario archive");
                summary.uploaded.push(key);
            }
            Err(e) => {
                error!(scenario = %scenario, error = %format!("{e:#}"), "scenario export failed");
                summary.failed.push((scenario, format!("{e:#}")));
            }
        }
    }
    Ok(summary)
}

fn export_scenario(
    store: &dyn ObjectStore,
    archiver: &dyn Archiver,
    bucket: &str,
    dir: &Path,
    key: &str,
) -> Result<usize> {
    let bytes = archiver
        .archive_dir(dir)
        .with_context(|| format!("archiving {}", dir.display()))?;
    store
        .put_object(bucket, key, &bytes)
        .with_context(|| format!("uploading {bucket}/{key}"))?;
    Ok(bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerlab_core::storage::{InMemoryObjectStore, ZipArchiver};

    #[test]
    fn each_scenario_becomes_one_archive() {
        let dir = tempfile::tempdir().unwrap();
        let symbol_dir = dir.path().join("ES");
        fs::create_dir_all(symbol_dir.join("s1/raw")).unwrap();
        fs::create_dir_all(symbol_dir.join("s2")).unwrap();
        fs::write(symbol_dir.join("s1/raw/t1.csv"), "x\n").unwrap();
        fs::write(symbol_dir.join("s2/s2.csv"), "y\n").unwrap();
        fs::write(symbol_dir.join("stray.txt"), "z\n").unwrap();

        let store = InMemoryObjectStore::new();
        let summary = export_symbol(&store, &ZipArchiver, "extracts", &symbol_dir).unwrap();
        assert_eq!(summary.uploaded, vec!["ES/s1.zip", "ES/s2.zip"]);
        assert!(summary.failed.is_empty());
        assert!(store.contains("extracts", "ES/s1.zip"));
    }

    #[test]
    fn missing_symbol_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryObjectStore::new();
        assert!(export_symbol(&store, &ZipArchiver, "extracts", &dir.path().join("nope")).is_err());
    }
}

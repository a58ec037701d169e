//! Append-only archive of unit snapshots.
//!
//! Layout:
//!
//! ```text
//! <archive>/
//! └── 20261015T101500.123Z-<op id>/
//!     ├── manifest.json
//!     ├── pdf-tools/...
//!     └── docx-tools/...
//! ```
//!
//! The archive root is created on first use and nothing in it is ever
//! modified or removed.

use crate::models::UnitId;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::instrument;

const MANIFEST_FILE: &str = "manifest.json";

/// One archived file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedFile {
    /// Path relative to the unit directory, `/` separated.
    pub path: String,
    /// SHA-256 of the content, hex encoded.
    pub sha256: String,
    /// Size in bytes.
    pub bytes: u64,
}

/// One archived unit directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedUnit {
    /// Unit identifier.
    pub id: UnitId,
    /// Directory the unit was copied from.
    pub source: PathBuf,
    /// Files, sorted by path.
    pub files: Vec<ArchivedFile>,
}

/// Manifest of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    /// Op that took the snapshot.
    pub op_id: String,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
    /// Snapshot directory.
    pub dir: PathBuf,
    /// Archived units.
    pub units: Vec<ArchivedUnit>,
}

/// Timestamped, checksummed snapshots of unit directories.
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// Creates a store rooted at `root`. Nothing is created until the first snapshot.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the archive root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies every unit directory into a new snapshot and writes its manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if a copy fails or the snapshot directory already exists.
    #[instrument(skip(self, units), fields(op_id, unit_count = units.len()))]
    pub fn snapshot(&self, op_id: &str, units: &[(UnitId, PathBuf)]) -> Result<ArchiveManifest> {
        let created_at = Utc::now();
        let dir = self.root.join(format!(
            "{}-{op_id}",
            created_at.format("%Y%m%dT%H%M%S%.3fZ")
        ));
        if dir.exists() {
            return Err(Error::operation(
                "archive_snapshot",
                format!("snapshot {} already exists", dir.display()),
            ));
        }
        fs::create_dir_all(&dir).map_err(|e| io_error("create_archive_dir", &dir, &e))?;

        let mut archived = Vec::with_capacity(units.len());
        for (id, source) in units {
            let target = dir.join(id.as_str());
            copy_dir(source, &target)?;
            archived.push(ArchivedUnit {
                id: id.clone(),
                source: source.clone(),
                files: checksum_dir(&target)?,
            });
        }

        let manifest = ArchiveManifest {
            op_id: op_id.to_string(),
            created_at,
            dir: dir.clone(),
            units: archived,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Error::operation("serialize_archive_manifest", e))?;
        let manifest_path = dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, json)
            .map_err(|e| io_error("write_archive_manifest", &manifest_path, &e))?;

        tracing::info!(dir = %dir.display(), "Archived units");
        Ok(manifest)
    }

    /// Restores every unit of a snapshot to its original directory and
    /// verifies the restored bytes against the manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if a copy fails or a restored file does not match its checksum.
    #[instrument(skip(self, manifest), fields(op_id = %manifest.op_id))]
    pub fn restore(&self, manifest: &ArchiveManifest) -> Result<()> {
        for unit in &manifest.units {
            let archived = manifest.dir.join(unit.id.as_str());
            if unit.source.exists() {
                fs::remove_dir_all(&unit.source)
                    .map_err(|e| io_error("clear_restore_target", &unit.source, &e))?;
            }
            copy_dir(&archived, &unit.source)?;

            let restored = checksum_dir(&unit.source)?;
            if restored != unit.files {
                return Err(Error::operation(
                    "verify_restore",
                    format!("restored unit '{}' does not match its snapshot", unit.id),
                ));
            }
        }
        tracing::info!(units = manifest.units.len(), "Restored units from archive");
        Ok(())
    }

    /// Loads the manifest of a snapshot directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is missing or malformed.
    pub fn load_manifest(dir: &Path) -> Result<ArchiveManifest> {
        let path = dir.join(MANIFEST_FILE);
        let contents =
            fs::read_to_string(&path).map_err(|e| io_error("read_archive_manifest", &path, &e))?;
        serde_json::from_str(&contents).map_err(|e| Error::operation("parse_archive_manifest", e))
    }
}

fn io_error(operation: &str, path: &Path, e: &std::io::Error) -> Error {
    Error::operation(operation, format!("{}: {e}", path.display()))
}

/// Recursively copies `src` into a new directory `dst`.
pub(crate) fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| io_error("create_dir", dst, &e))?;
    let entries = fs::read_dir(src).map_err(|e| io_error("read_dir", src, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error("read_dir_entry", src, &e))?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            fs::copy(&from, &to).map_err(|e| io_error("copy_file", &from, &e))?;
        }
    }
    Ok(())
}

/// Hashes every file below `dir`, sorted by relative path.
pub(crate) fn checksum_dir(dir: &Path) -> Result<Vec<ArchivedFile>> {
    let mut files = Vec::new();
    collect_files(dir, dir, &mut files)?;
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<ArchivedFile>) -> Result<()> {
    let entries = fs::read_dir(dir).map_err(|e| io_error("read_dir", dir, &e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_error("read_dir_entry", dir, &e))?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
            continue;
        }
        let bytes = fs::read(&path).map_err(|e| io_error("read_file", &path, &e))?;
        let relative = path
            .strip_prefix(base)
            .unwrap_or(&path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        out.push(ArchivedFile {
            path: relative,
            sha256: hex::encode(Sha256::digest(&bytes)),
            bytes: bytes.len() as u64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_unit(root: &Path, id: &str) -> PathBuf {
        let dir = root.join(id);
        fs::create_dir_all(dir.join("scripts")).unwrap();
        fs::write(dir.join("SKILL.md"), format!("---\nname: {id}\n---\nbody")).unwrap();
        fs::write(dir.join("scripts").join("run.sh"), "echo hi\n").unwrap();
        dir
    }

    #[test]
    fn test_snapshot_is_lazy_and_checksummed() {
        let tmp = TempDir::new().unwrap();
        let source = make_unit(tmp.path(), "pdf-tools");
        let store = ArchiveStore::new(tmp.path().join(".archive"));
        assert!(!store.root().exists());

        let manifest = store
            .snapshot("op-1", &[(UnitId::new("pdf-tools"), source)])
            .unwrap();
        assert!(store.root().exists());
        let paths: Vec<&str> = manifest.units[0].files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["SKILL.md", "scripts/run.sh"]);
        assert_eq!(ArchiveStore::load_manifest(&manifest.dir).unwrap(), manifest);
    }

    #[test]
    fn test_restore_is_byte_for_byte() {
        let tmp = TempDir::new().unwrap();
        let source = make_unit(tmp.path(), "pdf-tools");
        let original = fs::read(source.join("SKILL.md")).unwrap();
        let store = ArchiveStore::new(tmp.path().join(".archive"));
        let manifest = store
            .snapshot("op-1", &[(UnitId::new("pdf-tools"), source.clone())])
            .unwrap();

        fs::write(source.join("SKILL.md"), "clobbered").unwrap();
        fs::write(source.join("extra.txt"), "stray").unwrap();
        store.restore(&manifest).unwrap();

        assert_eq!(fs::read(source.join("SKILL.md")).unwrap(), original);
        assert!(!source.join("extra.txt").exists());
    }

    #[test]
    fn test_restore_recreates_removed_unit() {
        let tmp = TempDir::new().unwrap();
        let source = make_unit(tmp.path(), "docx-tools");
        let store = ArchiveStore::new(tmp.path().join(".archive"));
        let manifest = store
            .snapshot("op-2", &[(UnitId::new("docx-tools"), source.clone())])
            .unwrap();
        fs::remove_dir_all(&source).unwrap();

        store.restore(&manifest).unwrap();
        assert!(source.join("scripts").join("run.sh").exists());
    }
}

//! Content-addressed canonical store.
//!
//! One physical copy per distinct payload, at
//! `{root}/{name}/{version}/{fingerprint}`. Entries are created lazily and
//! never garbage-collected here.

use crate::error::{Error, Result};
use crate::platform;
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub struct CanonicalStore {
    root: PathBuf,
    /// Entries known to exist, shared across worker threads so repeated
    /// deduplications of the same payload skip the filesystem check.
    known: DashMap<PathBuf, ()>,
}

impl CanonicalStore {
    /// Open the store, creating the root if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::fs(&root, e))?;
        Ok(Self {
            root,
            known: DashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn canonical_path(&self, name: &str, version: &str, fingerprint: &str) -> PathBuf {
        self.root
            .join(sanitize(name))
            .join(sanitize(version))
            .join(fingerprint)
    }

    /// Ensure the canonical entry for this payload exists, populating it
    /// from `source` if needed. Returns the canonical path.
    ///
    /// Population is race-safe without a lock: files are hard-linked into
    /// a staging directory, which is then renamed to the canonical path.
    /// If the rename loses to a concurrent worker, the staged copy is
    /// discarded and the winner's entry is used.
    pub fn ensure_entry(
        &self,
        source: &Path,
        name: &str,
        version: &str,
        fingerprint: &str,
    ) -> Result<PathBuf> {
        let canonical = self.canonical_path(name, version, fingerprint);
        if self.known.contains_key(&canonical) || canonical.exists() {
            self.known.insert(canonical.clone(), ());
            return Ok(canonical);
        }

        if let Some(parent) = canonical.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::fs(parent, e))?;
        }

        let staging = staging_sibling(&canonical);
        if let Err(e) = link_tree(source, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        match fs::rename(&staging, &canonical) {
            Ok(()) => {
                debug!("canonical entry created: {}", canonical.display());
                self.known.insert(canonical.clone(), ());
                Ok(canonical)
            }
            Err(_) if canonical.exists() => {
                // lost the population race; the winner's entry is as good
                let _ = fs::remove_dir_all(&staging);
                self.known.insert(canonical.clone(), ());
                Ok(canonical)
            }
            Err(e) => {
                let _ = fs::remove_dir_all(&staging);
                Err(Error::fs(&canonical, e))
            }
        }
    }
}

/// Hard-link every file of `src` into `dst`, recreating the directory
/// structure. Cross-volume targets fall back to a full copy, logged as
/// degraded (the space saving is lost, the logical outcome is the same).
fn link_tree(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| Error::fs(dst, e))?;

    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| src.to_path_buf());
            match e.into_io_error() {
                Some(io) => Error::fs(path, io),
                None => Error::fs(
                    path,
                    std::io::Error::new(std::io::ErrorKind::Other, "filesystem loop detected"),
                ),
            }
        })?;
        let src_path = entry.path();
        let rel = match src_path.strip_prefix(src) {
            Ok(rel) if rel.as_os_str().is_empty() => continue,
            Ok(rel) => rel,
            Err(_) => continue,
        };
        let dst_path = dst.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dst_path).map_err(|e| Error::fs(&dst_path, e))?;
        } else if entry.file_type().is_file() {
            match fs::hard_link(src_path, &dst_path) {
                Ok(()) => {}
                Err(e) if platform::is_cross_device(&e) => {
                    warn!(
                        "hard link across volumes unavailable, copying {} (degraded)",
                        src_path.display()
                    );
                    fs::copy(src_path, &dst_path).map_err(|e| Error::fs(&dst_path, e))?;
                }
                Err(e) => return Err(Error::fs(&dst_path, e)),
            }
        }
        // symlinks inside payloads are skipped; the fingerprint ignores
        // them as well
    }
    Ok(())
}

fn staging_sibling(canonical: &Path) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let name = canonical
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "entry".into());
    canonical.with_file_name(format!("{}.partial-{}", name, nonce))
}

// '@' is legal in most filesystems but scoped names ("@babel/core") should
// collapse to one flat component, so it is folded with the separators.
fn sanitize(component: &str) -> String {
    component.replace(['/', '\\', ':', '@'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scoped_names_sanitized() {
        let tmp = tempdir().unwrap();
        let store = CanonicalStore::open(tmp.path()).unwrap();
        let path = store.canonical_path("@babel/core", "7.24.0", "abc123");
        assert!(path.starts_with(tmp.path()));
        assert!(path.to_string_lossy().contains("_babel_core"));
        assert!(!path.to_string_lossy().contains('@'));
    }

    #[test]
    fn test_ensure_entry_idempotent() {
        let tmp = tempdir().unwrap();
        let store = CanonicalStore::open(tmp.path().join("store")).unwrap();
        let payload = tmp.path().join("payload");
        fs::create_dir_all(payload.join("lib")).unwrap();
        fs::write(payload.join("lib/index.js"), "ok").unwrap();

        let first = store.ensure_entry(&payload, "pkg", "1.0.0", "fp1").unwrap();
        let second = store.ensure_entry(&payload, "pkg", "1.0.0", "fp1").unwrap();
        assert_eq!(first, second);
        assert!(first.join("lib/index.js").exists());
        // no staging leftovers
        let siblings: Vec<_> = fs::read_dir(first.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert_eq!(siblings.len(), 1);
    }
}

//! Semantic deduplication: collapse byte-identical package payloads into
//! the canonical store and leave symlinks behind.

pub mod fingerprint;
pub mod store;

pub use fingerprint::{payload_fingerprint, payload_size};
pub use store::CanonicalStore;

use crate::error::{Error, Result};
use crate::platform;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupOutcome {
    /// The payload was replaced by a symlink into the canonical store.
    Linked { canonical: PathBuf },
    /// The path was already a symlink; left untouched.
    AlreadyLinked,
}

pub struct SemanticDeduplication {
    store: CanonicalStore,
}

impl SemanticDeduplication {
    pub fn new(store_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            store: CanonicalStore::open(store_root)?,
        })
    }

    pub fn store(&self) -> &CanonicalStore {
        &self.store
    }

    /// Replace `package_path` with a symlink to its canonical entry,
    /// creating the entry from this payload if it does not exist yet.
    ///
    /// Idempotent: re-running on already-deduplicated content finds the
    /// existing canonical entry, and an existing symlink is left alone.
    pub fn deduplicate(
        &self,
        package_path: &Path,
        name: &str,
        version: &str,
    ) -> Result<DedupOutcome> {
        if platform::is_symlink(package_path) {
            debug!("{} is already a symlink, skipping", package_path.display());
            return Ok(DedupOutcome::AlreadyLinked);
        }
        if !package_path.is_dir() {
            return Err(Error::fs(
                package_path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "package directory not found"),
            ));
        }

        let fp = payload_fingerprint(package_path)?;
        let canonical = self
            .store
            .ensure_entry(package_path, name, version, &fp)?;

        swap_for_symlink(package_path, &canonical)?;
        debug!(
            "{} -> {}",
            package_path.display(),
            canonical.display()
        );
        Ok(DedupOutcome::Linked { canonical })
    }
}

/// Atomically replace a directory with a symlink.
///
/// A symlink cannot be renamed over a non-empty directory, so the swap is
/// sequenced: symlink at a temp sibling, move the directory aside, rename
/// the symlink into place, drop the aside copy. A failure at any step
/// restores the original; no observer ever sees a half-swapped path.
fn swap_for_symlink(package_path: &Path, canonical: &Path) -> Result<()> {
    let tmp_link = sibling(package_path, "lnk");
    if let Err(e) = platform::symlink_dir(canonical, &tmp_link) {
        return if platform::is_privilege_error(&e) {
            Err(Error::SymlinkUnsupported {
                path: package_path.to_path_buf(),
                source: e,
            })
        } else {
            Err(Error::fs(&tmp_link, e))
        };
    }

    let aside = sibling(package_path, "orig");
    if let Err(e) = fs::rename(package_path, &aside) {
        let _ = fs::remove_file(&tmp_link);
        return Err(Error::fs(package_path, e));
    }

    if let Err(e) = fs::rename(&tmp_link, package_path) {
        // put the original back before reporting
        let _ = fs::rename(&aside, package_path);
        let _ = fs::remove_file(&tmp_link);
        return Err(Error::fs(package_path, e));
    }

    if let Err(e) = fs::remove_dir_all(&aside) {
        // the swap itself succeeded; the leftover only wastes space
        warn!(
            "could not remove displaced payload {}: {}",
            aside.display(),
            e
        );
    }
    Ok(())
}

fn sibling(path: &Path, tag: &str) -> PathBuf {
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pkg".into());
    path.with_file_name(format!(".{}.{}-{}", name, tag, nonce))
}

use crate::error::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use walkdir::WalkDir;

/// Content fingerprint of a package payload.
///
/// Per file: blake3 over the normalized relative path and the file bytes.
/// The per-file digests are then sorted and hashed again, so the result is
/// independent of directory traversal order — identical payloads at
/// different locations always fingerprint identically.
pub fn payload_fingerprint(root: &Path) -> Result<String> {
    let mut digests: Vec<[u8; 32]> = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry.map_err(walk_err(root))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| Error::fs(entry.path(), other("path outside payload root")))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(normalize(rel).as_bytes());
        hasher.update(&[0]);
        hash_file_into(entry.path(), &mut hasher)?;
        digests.push(*hasher.finalize().as_bytes());
    }

    digests.sort_unstable();

    let mut outer = blake3::Hasher::new();
    for d in &digests {
        outer.update(d);
    }
    Ok(outer.finalize().to_hex().to_string())
}

/// Total file bytes under `root`. Cheap quota/reporting estimate; unlike
/// the fingerprint it does not read file contents.
pub fn payload_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

fn hash_file_into(path: &Path, hasher: &mut blake3::Hasher) -> Result<()> {
    let mut file = File::open(path).map_err(|e| Error::fs(path, e))?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::fs(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}

// Backslashes would make the same payload fingerprint differently on
// Windows.
fn normalize(rel: &Path) -> String {
    rel.to_string_lossy().replace('\\', "/")
}

fn walk_err(root: &Path) -> impl Fn(walkdir::Error) -> Error + '_ {
    move |e| {
        let path = e
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());
        match e.into_io_error() {
            Some(io) => Error::fs(path, io),
            None => Error::fs(path, other("filesystem loop detected")),
        }
    }
}

fn other(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_identical_trees_fingerprint_identically() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        for root in [a.path(), b.path()] {
            fs::create_dir_all(root.join("lib")).unwrap();
            fs::write(root.join("package.json"), "{\"name\":\"x\"}").unwrap();
            fs::write(root.join("lib/index.js"), "module.exports = 1;").unwrap();
        }
        assert_eq!(
            payload_fingerprint(a.path()).unwrap(),
            payload_fingerprint(b.path()).unwrap()
        );
    }

    #[test]
    fn test_content_change_changes_fingerprint() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("index.js"), "a").unwrap();
        let before = payload_fingerprint(dir.path()).unwrap();
        fs::write(dir.path().join("index.js"), "b").unwrap();
        let after = payload_fingerprint(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn test_path_change_changes_fingerprint() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        fs::write(a.path().join("one.js"), "same").unwrap();
        fs::write(b.path().join("two.js"), "same").unwrap();
        assert_ne!(
            payload_fingerprint(a.path()).unwrap(),
            payload_fingerprint(b.path()).unwrap()
        );
    }

    #[test]
    fn test_payload_size() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a"), "hello").unwrap();
        fs::write(dir.path().join("b"), "world!").unwrap();
        assert_eq!(payload_size(dir.path()), 11);
    }
}

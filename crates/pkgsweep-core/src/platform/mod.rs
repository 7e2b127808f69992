//! OS-specific link semantics, isolated so the dedup algorithm stays
//! platform-agnostic.

#[cfg(target_os = "windows")]
pub mod windows;

use std::io;
use std::path::Path;

/// Create a directory symlink at `link` pointing to `original`.
#[cfg(unix)]
pub fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(target_os = "windows")]
pub fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    windows::symlink_dir(original, link)
}

/// Whether a symlink failure means missing privilege rather than a plain
/// IO problem. Always false on POSIX, where no privilege is needed.
#[cfg(unix)]
pub fn is_privilege_error(_err: &io::Error) -> bool {
    false
}

#[cfg(target_os = "windows")]
pub fn is_privilege_error(err: &io::Error) -> bool {
    windows::is_privilege_error(err)
}

/// Whether an error is the cross-volume failure mode of `rename`/`hard_link`.
pub fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(18) // EXDEV
    }
    #[cfg(target_os = "windows")]
    {
        err.raw_os_error() == Some(17) // ERROR_NOT_SAME_DEVICE
    }
}

/// True for symlinks without following them (a dangling link still counts).
pub fn is_symlink(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

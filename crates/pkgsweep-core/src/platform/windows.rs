use std::io;
use std::path::Path;

const ERROR_PRIVILEGE_NOT_HELD: i32 = 1314;

pub fn symlink_dir(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}

/// Directory symlinks require Developer Mode or an elevated process.
pub fn is_privilege_error(err: &io::Error) -> bool {
    err.raw_os_error() == Some(ERROR_PRIVILEGE_NOT_HELD)
}

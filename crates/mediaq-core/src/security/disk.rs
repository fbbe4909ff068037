//! Disk space and storage quota probes.

use std::fs;
use std::io;
use std::path::Path;

/// Free bytes available to unprivileged users on the filesystem holding `path`.
/// `path` may not exist yet; the nearest existing ancestor is probed.
#[cfg(unix)]
pub fn free_space(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let probe = nearest_existing(path);
    let c_path = CString::new(probe.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL byte"))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is a valid NUL-terminated string and stat is a valid out pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    #[allow(clippy::unnecessary_cast)]
    Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
}

#[cfg(not(unix))]
pub fn free_space(_path: &Path) -> io::Result<u64> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "free space probe is only implemented on unix",
    ))
}

fn nearest_existing(path: &Path) -> &Path {
    let mut current = path;
    while !current.exists() {
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent,
            _ => return Path::new("."),
        }
    }
    current
}

/// Total size of regular files under `dir` (recursive, symlinks not followed).
/// A missing directory counts as empty.
pub fn dir_size(dir: &Path) -> io::Result<u64> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut total = 0u64;
    for entry in entries {
        let entry = entry?;
        let meta = entry.file_type()?;
        if meta.is_dir() {
            total = total.saturating_add(dir_size(&entry.path())?);
        } else if meta.is_file() {
            total = total.saturating_add(entry.metadata()?.len());
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dir_size_counts_nested_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Video/sub")).unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![0u8; 100]).unwrap();
        std::fs::write(dir.path().join("Video/sub/b.bin"), vec![0u8; 23]).unwrap();
        assert_eq!(dir_size(dir.path()).unwrap(), 123);
        assert_eq!(dir_size(&dir.path().join("missing")).unwrap(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn free_space_of_missing_child_uses_parent() {
        let dir = tempdir().unwrap();
        let here = free_space(dir.path()).unwrap();
        let child = free_space(&dir.path().join("not/created/yet")).unwrap();
        assert!(here > 0);
        // Same filesystem; allow for concurrent activity.
        assert!(child.abs_diff(here) < 64 * 1024 * 1024);
    }
}

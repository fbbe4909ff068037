//! Path containment: outputs and deletions must stay under the download root.

use std::io;
use std::path::{Component, Path, PathBuf};

use super::reject::{RejectReason, Rejection};

/// Canonicalize the deepest existing ancestor and re-append the rest, so paths
/// that do not exist yet can still be resolved. `..` in the missing tail is refused.
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(base) => {
                let mut out = base;
                for part in tail.iter().rev() {
                    out.push(part);
                }
                return Ok(out);
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let name = match existing.components().next_back() {
                    Some(Component::Normal(name)) => name.to_os_string(),
                    Some(Component::ParentDir) => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "parent component in unresolved path",
                        ))
                    }
                    _ => return Err(err),
                };
                tail.push(name);
                if !existing.pop() {
                    return Err(err);
                }
                if existing.as_os_str().is_empty() {
                    existing = PathBuf::from(".");
                }
            }
            Err(err) => return Err(err),
        }
    }
}

/// Returns the resolved `path` if it lies under `root`, otherwise a
/// `path_outside_root` rejection. Symlinks are followed before comparing.
pub fn ensure_within(root: &Path, path: &Path) -> Result<PathBuf, Rejection> {
    let outside = |detail: String| Rejection::new(RejectReason::PathOutsideRoot, detail);
    let root = resolve(root).map_err(|e| outside(format!("{}: {}", root.display(), e)))?;
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    let resolved =
        resolve(&candidate).map_err(|e| outside(format!("{}: {}", candidate.display(), e)))?;
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(outside(format!(
            "{} is not under {}",
            resolved.display(),
            root.display()
        )))
    }
}

pub fn is_within(root: &Path, path: &Path) -> bool {
    ensure_within(root, path).is_ok()
}

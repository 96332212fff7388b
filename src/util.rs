use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Validates a partition identifier, a relative path such as `svc/errors.log`,
/// and normalizes `\` separators to `/`.
pub fn sanitize_partition_id(id: &str) -> Result<String> {
  if id.trim().is_empty() {
    return Err(Error::Validation("Partition identifier cannot be empty".into()));
  }
  if id.contains('\0') {
    return Err(Error::Validation(format!("Partition identifier contains NUL: {:?}", id)));
  }

  let normalized = id.replace('\\', "/");
  let path = Path::new(&normalized);

  for component in path.components() {
    match component {
      Component::Normal(_) | Component::CurDir => {}
      // Prevent directory traversal and absolute targets
      Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
        return Err(Error::Validation(format!("Partition identifier escapes the root: {}", id)));
      }
    }
  }

  if normalized.ends_with('/') || path.file_name().is_none() {
    return Err(Error::Validation(format!("Partition identifier names no file: {}", id)));
  }

  Ok(normalized)
}

/// Resolves a partition identifier to a file strictly inside `root`.
pub fn partition_path(root: &Path, id: &str) -> Result<PathBuf> {
  let safe = sanitize_partition_id(id)?;
  Ok(root.join(safe))
}

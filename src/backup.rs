use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::{FormatError, Result};

/// The sibling path a backup copy is written to: the full file name plus a
/// `.bak` suffix (`addon.xml` → `addon.xml.bak`).
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Copy `path` to its backup sibling before it is rewritten.
///
/// The caller snapshots the original bytes with this before invoking the
/// formatter; a failure here means the file must not be rewritten.
pub async fn create_backup(path: &Path) -> Result<PathBuf> {
    let backup_path = backup_path_for(path);
    fs::copy(path, &backup_path)
        .await
        .map_err(|err| FormatError::Backup {
            path: path.to_path_buf(),
            details: err.to_string(),
        })?;
    Ok(backup_path)
}

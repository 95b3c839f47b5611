//! Crash-safe file helpers.
//!
//! Every replace goes through [`atomic_write`]: write a temp file in the same
//! directory, `sync_all`, rename over the target, then fsync the directory.
//! Readers therefore see either the old or the new content, never a torn file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Owner read/write only.
pub const OWNER_ONLY: u32 = 0o600;

fn temp_path(path: &Path) -> PathBuf {
    let file_name = path.file_name().and_then(|s| s.to_str()).unwrap_or("file");
    let temp_name = format!(".{}.tmp.{}", file_name, Uuid::new_v4());
    match path.parent() {
        Some(parent) => parent.join(temp_name),
        None => PathBuf::from(temp_name),
    }
}

#[cfg(unix)]
fn fsync_dir(path: &Path) -> std::io::Result<()> {
    File::open(path)?.sync_all()
}

#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Atomically replace `path` with `data`.
///
/// With `owner_only` the temp file is created 0600 before any byte is
/// written, so the content is never readable by others, even briefly.
pub fn atomic_write(path: &Path, data: &[u8], owner_only: bool) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(StoreError::WriteFailed)?;

    let temp = temp_path(path);
    let written = (|| -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        if owner_only {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(OWNER_ONLY);
        }
        let mut file = options.open(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, path)?;
        fsync_dir(parent)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(StoreError::WriteFailed(e).into());
    }

    if owner_only {
        restrict_permissions(path)?;
    }
    Ok(())
}

/// Set owner-only permissions (Unix only).
pub fn restrict_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(OWNER_ONLY))
            .map_err(StoreError::WriteFailed)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Validate file permissions (Unix only).
///
/// Checks that a file has exactly the expected permission bits.
#[cfg(unix)]
pub fn validate_file_permissions(path: &Path, expected_mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(StoreError::ReadFailed)?;
    let actual_mode = metadata.permissions().mode() & 0o777;

    if actual_mode != expected_mode {
        return Err(StoreError::InsecurePermissions {
            path: path.display().to_string(),
            expected: format!("{:o}", expected_mode),
            actual: format!("{:o}", actual_mode),
        }
        .into());
    }

    Ok(())
}

/// Read a key file, warning when its permissions are looser than 0600.
pub fn read_key_file(path: &Path) -> Result<Vec<u8>> {
    #[cfg(unix)]
    {
        if let Err(e) = validate_file_permissions(path, OWNER_ONLY) {
            warn!(path = %path.display(), error = %e, "insecure key file permissions");
        }
    }
    fs::read(path).map_err(|e| StoreError::ReadFailed(e).into())
}

/// Append one line to `path`, creating it if needed.
///
/// The file is opened in append mode, so earlier lines are never rewritten.
pub fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(OWNER_ONLY);
    }
    let mut file = options.open(path)?;
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    file.write_all(&buf)?;
    file.sync_data()
}

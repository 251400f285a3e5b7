use std::path::{Component, Path};

use crate::TransferError;

/// Validates that a remote filename is a single, plain path segment.
///
/// Rejects:
/// - Empty names
/// - Names containing `/` or `\`
/// - `.` and `..`
/// - Names with control characters (they would corrupt the target URL)
pub fn validate_remote_name(name: &str) -> Result<(), TransferError> {
    if name.trim().is_empty() {
        return Err(TransferError::InvalidRemoteName("empty name".into()));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidRemoteName(format!(
            "path separators not allowed: {name}"
        )));
    }

    if name.chars().any(char::is_control) {
        return Err(TransferError::InvalidRemoteName(format!(
            "control characters not allowed: {name:?}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidRemoteName(format!(
            "not a plain file name: {name}"
        ))),
    }
}

/// Checks that the local source exists, is a regular file and can be opened.
///
/// Returns the file size in bytes.
pub fn validate_local_file(path: &Path) -> Result<u64, TransferError> {
    let metadata = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(TransferError::FileNotFound(path.to_path_buf())),
    };

    // Readability is only known after an open attempt.
    std::fs::File::open(path).map_err(|_| TransferError::FileNotFound(path.to_path_buf()))?;

    Ok(metadata.len())
}

/// Returns `true` if `path` is a regular file the current user may execute.
pub fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    {
        true
    }
}

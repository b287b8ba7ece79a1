//! Validation of object names and metadata keys.
//!
//! Names are relative, `/`-separated paths.  In strict mode every name and
//! metadata key passes through these checks before a backend sees it; in
//! non-strict mode they are skipped entirely.

use crate::error::{DataFsError, Result};

fn invalid(name: &str, why: &str) -> DataFsError {
    DataFsError::InvalidArgument(format!("invalid name {name:?}: {why}"))
}

/// Check that `name` is a well-formed object name.
///
/// A valid name is non-empty, relative, free of NUL bytes and backslashes,
/// and made of non-empty segments other than `.` and `..`.  This keeps every
/// name inside the store's namespace.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "empty"));
    }
    if name.starts_with('/') {
        return Err(invalid(name, "absolute"));
    }
    if name.contains('\0') {
        return Err(invalid(name, "contains NUL"));
    }
    if name.contains('\\') {
        return Err(invalid(name, "contains a backslash"));
    }

    for segment in name.split('/') {
        match segment {
            "" => return Err(invalid(name, "empty path segment")),
            "." | ".." => return Err(invalid(name, "relative path segment")),
            _ => {}
        }
    }

    Ok(())
}

/// Check that `key` is a well-formed metadata key: non-empty and free of
/// control characters.
pub fn validate_meta_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(DataFsError::InvalidArgument(
            "empty metadata key".to_string(),
        ));
    }
    if key.chars().any(char::is_control) {
        return Err(DataFsError::InvalidArgument(format!(
            "metadata key {key:?} contains control characters"
        )));
    }
    Ok(())
}

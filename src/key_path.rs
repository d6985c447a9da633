//! Key and path rules shared by every operation.
//!
//! All functions here are pure. They never touch the network or the local
//! filesystem, so every command validates its whole argument list through
//! this module before the first storage call is made.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

/// Delimiter that imposes a folder-like hierarchy on the flat key namespace.
pub const DELIMITER: char = '/';

/// Validation failures for keys, prefixes and destination paths.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyPathError {
    #[error("key must not be empty")]
    EmptyKey,

    #[error("do not operate on a key starting with '/': {key}")]
    StartsWithDelimiter { key: String },

    #[error("do not operate on a key ending with '/': {key}")]
    EndsWithDelimiter { key: String },

    #[error("Destination path should not end with '/': {path}")]
    TrailingDelimiter { path: String },

    #[error("rename can only be used with a single origin key, but {count} were given")]
    RenameRequiresSingleItem { count: usize },

    #[error("either a destination path or a rename must be given")]
    MissingDestination,

    #[error("prefix does not contain '/' and cannot be treated as a folder: {prefix}")]
    NotAFolder { prefix: String },

    #[error("path has no file name: {path}")]
    MissingFileName { path: String },

    #[error("move destination collides with another key of the request: {origin} -> {destination}")]
    DestinationCollision { origin: String, destination: String },
}

/// Check that `key` is safe to delete.
///
/// A key starting with the delimiter is checked first, so `"/"` reports
/// [`KeyPathError::StartsWithDelimiter`].
pub fn validate_deletable(key: &str) -> Result<(), KeyPathError> {
    validate_movable(key)?;

    if key.ends_with(DELIMITER) {
        return Err(KeyPathError::EndsWithDelimiter {
            key: key.to_string(),
        });
    }

    Ok(())
}

/// Check that `key` can be used as the origin of a move.
pub fn validate_movable(key: &str) -> Result<(), KeyPathError> {
    if key.is_empty() {
        return Err(KeyPathError::EmptyKey);
    }

    if key.starts_with(DELIMITER) {
        return Err(KeyPathError::StartsWithDelimiter {
            key: key.to_string(),
        });
    }

    Ok(())
}

pub fn validate_destination_path(path: &str) -> Result<(), KeyPathError> {
    if path.ends_with(DELIMITER) {
        return Err(KeyPathError::TrailingDelimiter {
            path: path.to_string(),
        });
    }
    Ok(())
}

/// Check that a move request is well formed before any item is dispatched.
pub fn validate_move_request(
    destination_path: Option<&str>,
    rename: Option<&str>,
    origin_count: usize,
) -> Result<(), KeyPathError> {
    match (rename, destination_path) {
        (Some(_), _) if origin_count > 1 => Err(KeyPathError::RenameRequiresSingleItem {
            count: origin_count,
        }),
        (Some(rename), _) if rename.is_empty() => Err(KeyPathError::EmptyKey),
        (Some(_), _) => Ok(()),
        (None, Some(path)) => validate_destination_path(path),
        (None, None) => Err(KeyPathError::MissingDestination),
    }
}

/// Leaf name of a key: everything after the last delimiter.
pub fn basename(key: &str) -> &str {
    match key.rfind(DELIMITER) {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

/// Everything before the last delimiter, or empty when there is none.
pub fn parent(key: &str) -> &str {
    match key.rfind(DELIMITER) {
        Some(idx) => &key[..idx],
        None => "",
    }
}

/// Compute the destination key of a move.
///
/// With `rename`, the origin keeps its parent and only the leaf changes;
/// `destination_path` is ignored. Without it, the origin's leaf is placed
/// under `destination_path`. An empty destination path means the bucket root.
pub fn compose_destination_key(
    origin_key: &str,
    destination_path: Option<&str>,
    rename: Option<&str>,
    origin_count: usize,
) -> Result<String, KeyPathError> {
    validate_move_request(destination_path, rename, origin_count)?;

    if let Some(rename) = rename {
        let parent = parent(origin_key);
        if parent.is_empty() {
            return Ok(rename.to_string());
        }
        return Ok(format!("{parent}{DELIMITER}{rename}"));
    }

    // validate_move_request guarantees a destination path here.
    let destination_path = destination_path.unwrap_or_default();
    let leaf = basename(origin_key);
    if destination_path.is_empty() {
        return Ok(leaf.to_string());
    }

    Ok(format!("{destination_path}{DELIMITER}{leaf}"))
}

/// Reject a move plan that would overwrite one of its own keys.
///
/// A destination must differ from its origin and from every other
/// destination of the same request.
pub fn check_destination_collisions(moves: &[(String, String)]) -> Result<(), KeyPathError> {
    let mut destinations = HashSet::with_capacity(moves.len());
    for (origin, destination) in moves {
        if origin == destination || !destinations.insert(destination.as_str()) {
            return Err(KeyPathError::DestinationCollision {
                origin: origin.clone(),
                destination: destination.clone(),
            });
        }
    }
    Ok(())
}

/// Concatenate the display URL prefix and the key. No validation.
pub fn apply_http_prefix(key: &str, prefix: &str) -> String {
    format!("{prefix}{key}")
}

/// A prefix can only be walked recursively when it contains the delimiter.
pub fn validate_folder_prefix(prefix: &str) -> Result<(), KeyPathError> {
    if !prefix.contains(DELIMITER) {
        return Err(KeyPathError::NotAFolder {
            prefix: prefix.to_string(),
        });
    }
    Ok(())
}

/// Target key of an uploaded file: `upload_path/<file name>`.
pub fn upload_key(upload_path: &str, file_path: &Path) -> Result<String, KeyPathError> {
    let file_name = file_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| KeyPathError::MissingFileName {
            path: file_path.display().to_string(),
        })?;

    if upload_path.is_empty() {
        return Ok(file_name);
    }

    Ok(format!("{upload_path}{DELIMITER}{file_name}"))
}

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use validator::{Validate, ValidationError};

use crate::constants::{CODE_LENGTH, MAX_FILE_SIZE, MAX_NAME_BYTES};

/// New file metadata to insert into database
#[derive(Debug, Clone, Validate)]
pub struct NewFile {
    #[validate(custom(function = "validate_file_name"))]
    pub name: String,
    #[validate(custom(function = "validate_stored_size"))]
    pub size: i64,
    pub path: String,
    #[validate(custom(function = "validate_code"))]
    pub code: String,
    pub expiry: DateTime<Utc>,
    pub owner_id: i64,
}

/// Fields rewritten when an owner replaces a live file.
#[derive(Debug, Clone, Validate)]
pub struct RefreshFile {
    pub id: i64,
    pub owner_id: i64,
    pub path: String,
    #[validate(custom(function = "validate_stored_size"))]
    pub size: i64,
    #[validate(custom(function = "validate_code"))]
    pub code: String,
    pub expiry: DateTime<Utc>,
}

/// What a purge job needs to know about the record it was armed for.
#[derive(Debug, Clone, PartialEq)]
pub struct PurgeTarget {
    pub id: i64,
    pub path: String,
    pub armed_expiry: DateTime<Utc>,
}

/// Result of the conditional row delete at the start of a purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDeletion {
    Deleted,
    /// The row was extended after the job was armed; a newer job owns it.
    Superseded,
    Missing,
}

/// Result of a whole purge, as reported to logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeOutcome {
    Purged,
    AlreadyGone,
    Superseded,
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub storage_root: PathBuf,
    pub upload_lifetime: Duration,
    pub replace_lifetime: Duration,
}

pub fn validate_file_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new("file_name").with_message("must be provided".into()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(ValidationError::new("file_name")
            .with_message("must not be more than 50 bytes long".into()));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(ValidationError::new("file_name")
            .with_message("must not contain path separators".into()));
    }
    Ok(())
}

pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != CODE_LENGTH || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(ValidationError::new("code").with_message("must be 8 alphanumeric bytes".into()));
    }
    Ok(())
}

pub fn validate_size(size: usize) -> Result<(), ValidationError> {
    if size > MAX_FILE_SIZE {
        return Err(ValidationError::new("file_size")
            .with_message(format!("must not be more than {MAX_FILE_SIZE} bytes big").into()));
    }
    Ok(())
}

fn validate_stored_size(size: i64) -> Result<(), ValidationError> {
    let size = usize::try_from(size).map_err(|_| {
        ValidationError::new("file_size").with_message("must not be negative".into())
    })?;
    validate_size(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_file(name: &str, size: i64, code: &str) -> NewFile {
        NewFile {
            name: name.to_string(),
            size,
            path: format!("1/{name}"),
            code: code.to_string(),
            expiry: Utc::now(),
            owner_id: 1,
        }
    }

    #[test]
    fn test_valid_file_passes() {
        assert!(new_file("a.txt", 100, "abcdEFG1").validate().is_ok());
    }

    #[test]
    fn test_name_limit_counts_bytes() {
        // 25 two-byte characters are 50 bytes
        assert!(new_file(&"é".repeat(25), 1, "abcdEFG1").validate().is_ok());
        assert!(new_file(&"é".repeat(26), 1, "abcdEFG1").validate().is_err());
        assert!(new_file(&"a".repeat(51), 1, "abcdEFG1").validate().is_err());
    }

    #[test]
    fn test_name_rejects_path_components() {
        for name in ["", ".", "..", "../etc", "a/b", "a\\b"] {
            assert!(validate_file_name(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_size_limit() {
        assert!(new_file("a.txt", 1_000_000, "abcdEFG1").validate().is_ok());
        assert!(new_file("a.txt", 1_000_001, "abcdEFG1").validate().is_err());
        assert!(new_file("a.txt", -1, "abcdEFG1").validate().is_err());
        assert!(validate_size(MAX_FILE_SIZE + 1).is_err());
        assert!(validate_size(0).is_ok());
    }

    #[test]
    fn test_code_format() {
        assert!(validate_code("abcdEFG1").is_ok());
        assert!(validate_code("abcdEFG").is_err());
        assert!(validate_code("abcdEFG12").is_err());
        assert!(validate_code("abcd-FG1").is_err());
    }
}

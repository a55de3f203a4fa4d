//! Common types used throughout drivekit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a file or folder in remote storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Create a new FileId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or contains a path separator
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "FileId cannot be empty".to_string(),
            ));
        }
        if id.contains('/') {
            return Err(crate::Error::InvalidInput(format!(
                "FileId cannot contain '/': {}",
                id
            )));
        }
        Ok(Self(id))
    }

    /// The well-known alias for the user's top-level folder.
    pub fn root() -> Self {
        Self("root".to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FileId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::new(s)
    }
}

/// Remote operations, used to tag upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Exchanging or refreshing OAuth tokens.
    Authorize,
    /// Downloading file content.
    ReadFile,
    /// Creating a file with content.
    UploadFile,
    /// Listing the children of a folder.
    ListFiles,
    /// Creating a folder.
    CreateFolder,
}

impl Operation {
    /// Human-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorize => "authorize",
            Self::ReadFile => "read file",
            Self::UploadFile => "upload file",
            Self::ListFiles => "list files",
            Self::CreateFolder => "create folder",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_file_id_creation() {
        let id = FileId::new("1AbCdEf").unwrap();
        assert_eq!(id.as_str(), "1AbCdEf");
        assert_eq!(id.to_string(), "1AbCdEf");
    }

    #[test]
    fn test_file_id_empty_fails() {
        assert!(FileId::new("").is_err());
    }

    #[test]
    fn test_file_id_with_separator_fails() {
        assert!("a/b".parse::<FileId>().is_err());
    }

    #[test]
    fn test_file_id_serializes_as_plain_string() {
        let id = FileId::new("xyz").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"xyz\"");
    }

    proptest! {
        #[test]
        fn file_id_accepts_any_nonempty_id_without_slash(id in "[A-Za-z0-9_-]{1,64}") {
            let parsed = FileId::new(id.clone()).unwrap();
            prop_assert_eq!(parsed.as_str(), id.as_str());
        }
    }
}

//! Client-side validation run before any network call
//!
//! Mirrors the checks the upload widgets and comment boxes perform so a bad
//! request is rejected locally with a message the UI can toast.

use thiserror::Error;

/// Maximum upload size: 10 MiB
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of files per upload batch
pub const MAX_FILES_PER_UPLOAD: usize = 10;

/// Maximum comment length in characters
pub const MAX_COMMENT_LENGTH: usize = 1000;

/// MIME types accepted by default
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "application/pdf",
    "text/plain",
    "video/mp4",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{name} is too large ({size} bytes, max {max} bytes)")]
    FileTooLarge { name: String, size: u64, max: u64 },

    #[error("{name} has an unsupported type ({mime})")]
    UnsupportedType { name: String, mime: String },

    #[error("No files selected")]
    NoFiles,

    #[error("Too many files ({count}, max {max})")]
    TooManyFiles { count: usize, max: usize },

    #[error("Please enter some content")]
    EmptyContent,

    #[error("Content is too long ({len} characters, max {max})")]
    TooLong { len: usize, max: usize },
}

/// A file the user picked, before upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }
}

/// Size and MIME allow-list check for uploads
#[derive(Debug, Clone)]
pub struct FileValidator {
    max_size: u64,
    max_files: usize,
    allowed_types: Vec<String>,
}

impl FileValidator {
    pub fn new(max_size: u64, allowed_types: &[&str]) -> Self {
        Self {
            max_size,
            max_files: MAX_FILES_PER_UPLOAD,
            allowed_types: allowed_types.iter().map(|t| t.to_ascii_lowercase()).collect(),
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn is_allowed_type(&self, mime: &str) -> bool {
        // Ignore parameters such as `; charset=utf-8`
        let essence = mime.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        self.allowed_types.iter().any(|t| *t == essence)
    }

    /// Validate a single file
    pub fn validate(&self, file: &FileCandidate) -> Result<(), ValidationError> {
        if file.size > self.max_size {
            return Err(ValidationError::FileTooLarge {
                name: file.name.clone(),
                size: file.size,
                max: self.max_size,
            });
        }

        if !self.is_allowed_type(&file.mime_type) {
            return Err(ValidationError::UnsupportedType {
                name: file.name.clone(),
                mime: file.mime_type.clone(),
            });
        }

        Ok(())
    }

    /// Validate an upload batch; the first failure wins
    pub fn validate_all(&self, files: &[FileCandidate]) -> Result<(), ValidationError> {
        if files.is_empty() {
            return Err(ValidationError::NoFiles);
        }
        if files.len() > self.max_files {
            return Err(ValidationError::TooManyFiles {
                count: files.len(),
                max: self.max_files,
            });
        }
        files.iter().try_for_each(|f| self.validate(f))
    }
}

impl Default for FileValidator {
    fn default() -> Self {
        Self::new(MAX_FILE_SIZE, DEFAULT_ALLOWED_TYPES)
    }
}

/// Validate comment text, returning the trimmed content
pub fn validate_comment(content: &str) -> Result<&str, ValidationError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyContent);
    }

    let len = trimmed.chars().count();
    if len > MAX_COMMENT_LENGTH {
        return Err(ValidationError::TooLong {
            len,
            max: MAX_COMMENT_LENGTH,
        });
    }

    Ok(trimmed)
}

use std::path::Path;

use bytes::Bytes;
use displaydoc::Display;
use thiserror::Error;

/// Errors that may occur while preparing a file upload
#[derive(Debug, Display, Error)]
pub enum UploadError {
    /// could not read file '{path}': {error}
    CannotReadFile {
        path: String,
        error: std::io::Error,
    },
}

/// An opaque binary file handle, sent as a multipart field.
///
/// Cloning is cheap: the content is reference counted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    content: Bytes,
}

impl Upload {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            file_name: None,
            content_type: None,
            content: content.into(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Reads a file from disk, naming the upload after the file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let content =
            tokio::fs::read(path)
                .await
                .map_err(|error| UploadError::CannotReadFile {
                    path: path.display().to_string(),
                    error,
                })?;
        let upload = Self::new(content);
        Ok(match path.file_name() {
            Some(name) => upload.with_file_name(name.to_string_lossy()),
            None => upload,
        })
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"base image").unwrap();

        let upload = Upload::from_path(file.path()).await.unwrap();

        assert_eq!(upload.content(), &Bytes::from_static(b"base image"));
        assert_eq!(upload.len(), 10);
        assert_eq!(
            upload.file_name(),
            file.path().file_name().and_then(|name| name.to_str())
        );
    }

    #[tokio::test]
    async fn missing_file_is_reported() {
        let error = Upload::from_path("/does/not/exist.bin").await.unwrap_err();

        assert!(error
            .to_string()
            .starts_with("could not read file '/does/not/exist.bin'"));
    }
}

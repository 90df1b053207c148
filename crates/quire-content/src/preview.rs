//! Local preview handles
//!
//! A preview is a temporary file holding the staged bytes, addressed by a
//! `file://` URI so the document can show the image before anything is
//! uploaded. Handles are process-local and never sent over the wire.

use percent_encoding::{percent_encode, AsciiSet, CONTROLS};
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tempfile::TempPath;

/// Bytes escaped inside a single path segment of a `file://` URI.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

pub struct PreviewHandle {
    path: Option<TempPath>,
    uri: String,
}

impl PreviewHandle {
    /// Write `data` to a new temporary file inside `dir`.
    pub fn create(dir: &Path, extension: &str, data: &[u8]) -> std::io::Result<Self> {
        let suffix = format!(".{}", extension);
        let mut file = tempfile::Builder::new()
            .prefix("quire-preview-")
            .suffix(&suffix)
            .tempfile_in(dir)?;
        file.write_all(data)?;
        file.flush()?;

        let path = file.into_temp_path();
        let uri = file_uri(&path);

        Ok(Self {
            path: Some(path),
            uri,
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Filesystem path, `None` once released.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_released(&self) -> bool {
        self.path.is_none()
    }

    /// Delete the preview file. Releasing twice is a no-op.
    ///
    /// Returns `true` when this call released the handle.
    pub fn release(&mut self) -> bool {
        match self.path.take() {
            Some(path) => {
                let released_path = path.to_path_buf();
                if let Err(e) = path.close() {
                    tracing::warn!(
                        path = %released_path.display(),
                        error = %e,
                        "Failed to delete preview file"
                    );
                }
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewHandle")
            .field("uri", &self.uri)
            .field("released", &self.is_released())
            .finish()
    }
}

fn file_uri(path: &Path) -> String {
    let absolute: PathBuf = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut uri = String::from("file://");
    for component in absolute.components() {
        match component {
            Component::Prefix(prefix) => {
                uri.push('/');
                uri.push_str(&prefix.as_os_str().to_string_lossy());
            }
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => uri.push_str("/.."),
            Component::Normal(segment) => {
                uri.push('/');
                uri.extend(percent_encode(segment.as_encoded_bytes(), PATH_SEGMENT));
            }
        }
    }
    if uri.len() == "file://".len() {
        uri.push('/');
    }
    uri
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_writes_bytes_and_builds_uri() {
        let dir = tempdir().unwrap();
        let handle = PreviewHandle::create(dir.path(), "jpg", b"preview").unwrap();

        let path = handle.path().unwrap().to_path_buf();
        assert_eq!(std::fs::read(&path).unwrap(), b"preview");
        assert!(handle.uri().starts_with("file://"));
        assert!(handle.uri().ends_with(".jpg"));
    }

    #[cfg(unix)]
    #[test]
    fn test_uri_escapes_reserved_characters_in_directory() {
        let root = tempdir().unwrap();
        let dir = root.path().join("my previews #1");
        std::fs::create_dir(&dir).unwrap();

        let handle = PreviewHandle::create(&dir, "jpg", b"preview").unwrap();
        let uri = handle.uri();

        assert!(uri.contains("/my%20previews%20%231/"), "{}", uri);
        assert!(!uri.contains(' '));
        assert_eq!(uri.matches('#').count(), 0);

        let decoded = percent_encoding::percent_decode_str(&uri["file://".len()..])
            .decode_utf8()
            .unwrap();
        assert_eq!(
            PathBuf::from(decoded.as_ref()),
            handle.path().unwrap().to_path_buf()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_uri_for_plain_absolute_path() {
        assert_eq!(
            file_uri(Path::new("/var/tmp/quire/a.png")),
            "file:///var/tmp/quire/a.png"
        );
        assert_eq!(file_uri(Path::new("/")), "file:///");
    }

    #[test]
    fn test_double_release_is_safe() {
        let dir = tempdir().unwrap();
        let mut handle = PreviewHandle::create(dir.path(), "png", b"x").unwrap();
        let path = handle.path().unwrap().to_path_buf();

        assert!(handle.release());
        assert!(!path.exists());
        assert!(!handle.release());
        assert!(handle.is_released());
    }

    #[test]
    fn test_drop_deletes_file() {
        let dir = tempdir().unwrap();
        let handle = PreviewHandle::create(dir.path(), "webp", b"x").unwrap();
        let path = handle.path().unwrap().to_path_buf();

        drop(handle);
        assert!(!path.exists());
    }
}

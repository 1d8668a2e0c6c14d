use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use super::{validate_key, BlobStore, UploadTarget};
use crate::error::StorageError;

/// Filesystem-backed blob store.
///
/// Blobs live at `<root>/<bucket>/<key>`. Upload targets point at the
/// object endpoint of the HTTP server (`/storage/v1/object/<bucket>/<key>`)
/// and carry the upload key as a bearer credential.
pub struct FsBlobStore {
    root: PathBuf,
    bucket: String,
    public_base_url: String,
    upload_key: SecretString,
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(
        root: P,
        bucket: &str,
        public_base_url: &str,
        upload_key: SecretString,
    ) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            bucket: bucket.to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            upload_key,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        let mut path = self.root.join(&self.bucket);
        for segment in key.split('/') {
            path.push(segment);
        }
        Ok(path)
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}

impl BlobStore for FsBlobStore {
    fn upload_target(&self, key: &str, mime_type: &str) -> Result<UploadTarget, StorageError> {
        validate_key(key)?;
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.public_base_url, self.bucket, key
        );

        let upload_key = self.upload_key.expose_secret();
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", upload_key));
        headers.insert("apikey".to_string(), upload_key.to_string());
        headers.insert("x-upsert".to_string(), "true".to_string());
        headers.insert("Content-Type".to_string(), mime_type.to_string());

        Ok(UploadTarget { url, headers })
    }

    /// Writes to a temporary sibling first and renames it into place, so a
    /// reader never observes a partially written blob.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }

        let tmp = path.with_extension(format!("upload-{}.tmp", uuid::Uuid::new_v4().simple()));
        let write_err = |e| StorageError::WriteFile {
            path: tmp.clone(),
            source: e,
        };
        let mut file = std::fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(StorageError::WriteFile { path, source: e });
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::ReadFile { path, source: e }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FsBlobStore {
        FsBlobStore::new(
            dir.path(),
            "coa_uploads",
            "http://localhost:8080/",
            SecretString::from("upload-key".to_string()),
        )
    }

    #[test]
    fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put("raw/a.pdf", b"%PDF-1.4").unwrap();
        assert_eq!(store.get("raw/a.pdf").unwrap(), b"%PDF-1.4");
        assert!(dir.path().join("coa_uploads/raw/a.pdf").exists());
    }

    #[test]
    fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put("raw/a.txt", b"first").unwrap();
        store.put("raw/a.txt", b"second").unwrap();
        assert_eq!(store.get("raw/a.txt").unwrap(), b"second");

        let leftovers = std::fs::read_dir(dir.path().join("coa_uploads/raw"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.get("raw/missing.pdf"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn test_put_rejects_escaping_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(matches!(
            store.put("raw/../../evil", b"x"),
            Err(StorageError::InvalidKey { .. })
        ));
    }

    #[test]
    fn test_upload_target() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let target = store.upload_target("raw/abc.pdf", "application/pdf").unwrap();
        assert_eq!(
            target.url,
            "http://localhost:8080/storage/v1/object/coa_uploads/raw/abc.pdf"
        );
        assert_eq!(target.headers["Authorization"], "Bearer upload-key");
        assert_eq!(target.headers["apikey"], "upload-key");
        assert_eq!(target.headers["x-upsert"], "true");
        assert_eq!(target.headers["Content-Type"], "application/pdf");
    }
}

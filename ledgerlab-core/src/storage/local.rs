//! Directory-backed object store.
//!
//! Layout: `{root}/{bucket}/{key}` where `/` in the key maps to directories.
//! Used for offline runs against a mirrored bucket and for integration tests.

use super::{paginate, ListPage, ObjectStore, StorageError};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Default number of entries per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

pub struct LocalObjectStore {
    root: PathBuf,
    page_size: usize,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.bucket_dir(bucket);
        for part in key.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Keys under the deepest directory that `prefix` names, sorted.
    ///
    /// Only that subtree is walked; `paginate` applies the exact prefix.
    fn keys_under(&self, bucket: &str, prefix: &str) -> io::Result<Vec<String>> {
        let base = prefix
            .rfind('/')
            .map_or("", |pos| &prefix[..pos])
            .split('/')
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        let dir = self.object_path(bucket, &base);
        let mut keys = Vec::new();
        if dir.is_dir() {
            collect_keys(&dir, &base, &mut keys)?;
        }
        keys.sort();
        Ok(keys)
    }
}

fn collect_keys(dir: &Path, prefix: &str, keys: &mut Vec<String>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        let key = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };
        if entry.file_type()?.is_dir() {
            collect_keys(&entry.path(), &key, keys)?;
        } else {
            keys.push(key);
        }
    }
    Ok(())
}

impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let keys = self.keys_under(bucket, prefix)?;
        Ok(paginate(keys, prefix, delimiter, continuation, self.page_size))
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let path = self.object_path(bucket, key);
        match fs::File::open(&path) {
            Ok(file) if path.is_file() => Ok(Box::new(file)),
            Ok(_) => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(())
    }
}

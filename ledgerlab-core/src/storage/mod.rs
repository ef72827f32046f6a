//! Object storage, decompression, and archive collaborators.
//!
//! The pipeline only talks to storage through [`ObjectStore`], so the real
//! bucket client, a local mirror, and the in-memory test store are
//! interchangeable.

pub mod archive;
pub mod decompress;
pub mod local;
pub mod memory;

pub use archive::{Archiver, ZipArchiver};
pub use decompress::{Compression, Decompressor, Gzip, Passthrough};
pub use local::LocalObjectStore;
pub use memory::InMemoryObjectStore;

use std::collections::BTreeSet;
use std::io::Read;
use thiserror::Error;

/// Errors from an object store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object does not exist. Partition probing treats this as the end
    /// of a year, not as a failure.
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("storage request failed: {0}")]
    Transient(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// "Directory-like" prefixes, each ending with the delimiter.
    pub common_prefixes: Vec<String>,
    /// Pass back to fetch the next page; `None` on the last page.
    pub next_continuation: Option<String>,
}

/// Blocking object-store client.
pub trait ObjectStore: Send + Sync {
    /// Human-readable name of this store.
    fn name(&self) -> &str;

    /// List one page of keys under `prefix`.
    ///
    /// With a delimiter, keys that contain it after the prefix are rolled up
    /// into `common_prefixes`.
    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StorageError>;

    /// Open an object for streaming. Missing objects yield `NotFound`.
    fn get_object(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>, StorageError>;

    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Follow continuation tokens until the listing is exhausted.
    fn list_all(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let mut all = ListPage::default();
        let mut token: Option<String> = None;
        loop {
            let page = self.list_page(bucket, prefix, delimiter, token.as_deref())?;
            all.keys.extend(page.keys);
            all.common_prefixes.extend(page.common_prefixes);
            match page.next_continuation {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(all)
    }

    /// Read a whole object as UTF-8 text.
    fn get_string(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        let mut reader = self.get_object(bucket, key)?;
        let mut content = String::new();
        reader.read_to_string(&mut content)?;
        Ok(content)
    }
}

/// Page through a sorted key set the way a bucket listing does.
///
/// The continuation token is the last entry (key or common prefix) of the
/// previous page; the next page starts strictly after it.
pub(crate) fn paginate<I>(
    sorted_keys: I,
    prefix: &str,
    delimiter: Option<&str>,
    continuation: Option<&str>,
    page_size: usize,
) -> ListPage
where
    I: IntoIterator<Item = String>,
{
    enum Entry {
        Key(String),
        Prefix(String),
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut seen_prefixes: BTreeSet<String> = BTreeSet::new();
    for key in sorted_keys {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        let rolled = delimiter
            .filter(|d| !d.is_empty())
            .and_then(|d| rest.find(d).map(|pos| format!("{prefix}{}", &rest[..pos + d.len()])));
        match rolled {
            Some(common) => {
                if seen_prefixes.insert(common.clone()) {
                    entries.push(Entry::Prefix(common));
                }
            }
            None => entries.push(Entry::Key(key)),
        }
    }

    let name = |e: &Entry| -> String {
        match e {
            Entry::Key(k) | Entry::Prefix(k) => k.clone(),
        }
    };
    entries.sort_by_key(name);

    let mut page = ListPage::default();
    let page_size = page_size.max(1);
    let mut remaining = entries
        .into_iter()
        .filter(|e| continuation.map_or(true, |token| name(e).as_str() > token))
        .peekable();
    while let Some(entry) = remaining.next() {
        let entry_name = name(&entry);
        match entry {
            Entry::Key(k) => page.keys.push(k),
            Entry::Prefix(p) => page.common_prefixes.push(p),
        }
        if page.keys.len() + page.common_prefixes.len() == page_size {
            if remaining.peek().is_some() {
                page.next_continuation = Some(entry_name);
            }
            break;
        }
    }
    page
}

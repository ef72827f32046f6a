//! In-memory object store for tests and dry runs.

use super::{paginate, ListPage, ObjectStore, StorageError};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Read};
use std::sync::Mutex;

#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    failing: Mutex<BTreeSet<(String, String)>>,
    page_size: usize,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            page_size: super::local::DEFAULT_PAGE_SIZE,
            ..Self::default()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Insert an object, replacing any previous content.
    pub fn insert(&self, bucket: &str, key: &str, bytes: impl Into<Vec<u8>>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes.into());
    }

    /// Make every `get_object` for this key fail with a transient error.
    pub fn fail_on(&self, bucket: &str, key: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()));
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        Ok(paginate(keys, prefix, delimiter, continuation, self.page_size))
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Box<dyn Read + Send>, StorageError> {
        let id = (bucket.to_string(), key.to_string());
        if self.failing.lock().unwrap().contains(&id) {
            return Err(StorageError::Transient(format!(
                "injected failure for {bucket}/{key}"
            )));
        }
        match self.objects.lock().unwrap().get(&id) {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(StorageError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
        }
    }

    fn put_object(&self, bucket: &str, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.insert(bucket, key, bytes.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginated_listing_is_complete() {
        let store = InMemoryObjectStore::new().with_page_size(2);
        for i in 0..5 {
            store.insert("b", &format!("k/{i}.csv"), "x");
        }
        store.insert("other", "k/9.csv", "x");
        let first = store.list_page("b", "k/", None, None).unwrap();
        assert_eq!(first.keys.len(), 2);
        assert!(first.next_continuation.is_some());
        assert_eq!(store.list_all("b", "k/", None).unwrap().keys.len(), 5);
    }

    #[test]
    fn injected_failure_is_transient() {
        let store = InMemoryObjectStore::new();
        store.insert("b", "k", "x");
        store.fail_on("b", "k");
        let err = store.get_object("b", "k").err().unwrap();
        assert!(matches!(err, StorageError::Transient(_)));
    }
}

//! Decode results keyed by the content of their input.
//!
//! The same blueprint or sprite container often turns up under several file
//! names.  Keying on a digest of the bytes rather than the path means each
//! distinct input is decoded once.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    pub fn of(data: &[u8]) -> ContentKey {
        let digest = Sha256::digest(data);
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        ContentKey(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ContentKey({})", self)
    }
}

/// Holds every successful decode until it is removed or cleared.  Failed
/// decodes are not remembered.
pub struct DecodeCache<T> {
    entries: HashMap<ContentKey, Arc<T>>,
}

impl<T> DecodeCache<T> {
    pub fn new() -> Self {
        DecodeCache {
            entries: HashMap::new(),
        }
    }

    pub fn get_or_decode<E, F>(&mut self, data: &[u8], decode: F) -> Result<Arc<T>, E>
    where
        F: FnOnce(&[u8]) -> Result<T, E>,
    {
        let key = ContentKey::of(data);
        if let Some(value) = self.entries.get(&key) {
            trace!(%key, "cache hit");
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(decode(data)?);
        trace!(%key, "cache miss");
        self.entries.insert(key, Arc::clone(&value));
        Ok(value)
    }

    pub fn get(&self, key: &ContentKey) -> Option<Arc<T>> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, data: &[u8]) -> bool {
        self.entries.contains_key(&ContentKey::of(data))
    }

    pub fn remove(&mut self, key: &ContentKey) -> Option<Arc<T>> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T> Default for DecodeCache<T> {
    fn default() -> Self {
        DecodeCache::new()
    }
}

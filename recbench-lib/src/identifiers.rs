//! Record key allocation shared by all workers of a run.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use rand::Rng;

/// Key of a record in the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Textual layout of a [`Key`]: a prefix followed by
/// the zero-padded counter, `length` characters in total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFormat {
    prefix: String,
    length: usize,
}

impl Default for KeyFormat {
    fn default() -> Self {
        Self {
            prefix: "ID".to_owned(),
            length: 32,
        }
    }
}

impl KeyFormat {
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            length,
        }
    }

    pub fn encode(&self, index: u64) -> Key {
        let width = self.length.saturating_sub(self.prefix.len());
        Key(format!("{}{index:0width$}", self.prefix))
    }

    /// Inverse of [`KeyFormat::encode`].
    pub fn decode(&self, key: &Key) -> Option<u64> {
        key.as_str().strip_prefix(&self.prefix)?.parse().ok()
    }
}

/// Issues unique keys for new records and picks keys of records assumed to exist.
///
/// The pool of existing records is implicitly `[1, counter]`.
/// Deletions are not tracked, so a sampled key might no longer exist remotely.
#[derive(Debug, Default)]
pub struct IdentifierAllocator {
    counter: AtomicU64,
    format: KeyFormat,
}

impl IdentifierAllocator {
    pub fn new(format: KeyFormat) -> Self {
        Self {
            counter: AtomicU64::new(0),
            format,
        }
    }

    pub fn format(&self) -> &KeyFormat {
        &self.format
    }

    /// Number of keys issued so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Reserve a key never issued before during this run.
    pub fn allocate(&self) -> Key {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        self.format.encode(index)
    }

    /// Pick a key uniformly from all keys issued so far.
    ///
    /// Returns `None` while no key has been allocated yet.
    pub fn sample_existing<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Key> {
        let issued = self.issued();
        if issued == 0 {
            return None;
        }
        Some(self.format.encode(rng.random_range(1..=issued)))
    }
}

//! In-memory store for single-instance mode
//!
//! Mirrors the subset of Redis semantics the session store relies on:
//! string and hash values, per-key expiry checked lazily on access, and
//! `EXPIRE key 0` deleting the key.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::{StoreError, StoreResult};

/// Value held under a key
#[derive(Debug, Clone)]
enum MemoryValue {
    String(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Concurrent in-memory key-value store with expiry
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the entry if it has expired, so callers only see live keys
    fn evict_if_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }

    pub fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.evict_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                MemoryValue::String(value) => Ok(Some(value.clone())),
                MemoryValue::Hash(_) => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(None),
        }
    }

    pub fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) {
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: MemoryValue::String(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
    }

    pub fn exists(&self, key: &str) -> bool {
        self.evict_if_expired(key);
        self.entries.contains_key(key)
    }

    pub fn expire(&self, key: &str, ttl_secs: u64) -> bool {
        self.evict_if_expired(key);
        if ttl_secs == 0 {
            return self.entries.remove(key).is_some();
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
                true
            }
            None => false,
        }
    }

    pub fn ttl(&self, key: &str) -> Option<i64> {
        self.evict_if_expired(key);
        self.entries.get(key).map(|entry| match entry.expires_at {
            Some(at) => at.saturating_duration_since(Instant::now()).as_secs() as i64,
            None => -1,
        })
    }

    pub fn hget_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.evict_if_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                MemoryValue::Hash(fields) => Ok(fields.clone()),
                MemoryValue::String(_) => Err(StoreError::WrongType(key.to_string())),
            },
            None => Ok(HashMap::new()),
        }
    }

    /// Like HSET, creating the hash without expiry when the key is absent
    pub fn hset_multiple(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        self.evict_if_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| MemoryEntry {
                value: MemoryValue::Hash(HashMap::new()),
                expires_at: None,
            });

        match &mut entry.value {
            MemoryValue::Hash(existing) => {
                for (field, value) in fields {
                    existing.insert((*field).to_string(), value.clone());
                }
                Ok(())
            }
            MemoryValue::String(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }
}

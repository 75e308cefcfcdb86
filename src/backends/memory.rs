// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process-local coordination store.
//!
//! One mutex guards the whole keyspace, so every operation is trivially
//! atomic and linearizable. TTLs are honoured lazily on access using the
//! tokio clock, which lets tests drive expiry with a paused runtime.

use crate::errors::StoreError;
use crate::traits::CoordinationStore;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Stored {
    Text(String),
    List(VecDeque<String>),
    /// Fields in first-write order.
    Hash(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` currently holds a live value.
    pub fn contains(&self, key: &str) -> bool {
        self.with_entries(|entries| Ok(live(entries, key).is_some()))
            .unwrap_or(false)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.with_entries(|entries| {
            let now = Instant::now();
            Ok(entries
                .values()
                .filter(|e| e.expires_at.map_or(true, |at| at > now))
                .count())
        })
        .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store poisoned: {}", e)))?;
        f(&mut entries)
    }
}

/// Drops `key` if it has expired, then returns the live entry.
fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let expired = entries
        .get(key)
        .and_then(|e| e.expires_at)
        .map_or(false, |at| at <= Instant::now());
    if expired {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Unavailable(format!("WRONGTYPE operation against key '{}'", key))
}

fn list_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<&'a mut VecDeque<String>, StoreError> {
    if live(entries, key).is_none() {
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::List(VecDeque::new()),
                expires_at: None,
            },
        );
    }
    match entries.get_mut(key).map(|e| &mut e.value) {
        Some(Stored::List(list)) => Ok(list),
        _ => Err(wrong_type(key)),
    }
}

fn incr(entries: &mut HashMap<String, Entry>, key: &str, delta: i64) -> Result<i64, StoreError> {
    let current = match live(entries, key) {
        None => 0,
        Some(Entry {
            value: Stored::Text(text),
            ..
        }) => text
            .parse::<i64>()
            .map_err(|_| StoreError::Unavailable(format!("value at '{}' is not an integer", key)))?,
        Some(_) => return Err(wrong_type(key)),
    };
    let next = current + delta;
    let expires_at = entries.get(key).and_then(|e| e.expires_at);
    entries.insert(
        key.to_string(),
        Entry {
            value: Stored::Text(next.to_string()),
            expires_at,
        },
    );
    Ok(next)
}

fn expire(entries: &mut HashMap<String, Entry>, key: &str, ttl: Duration) {
    if let Some(entry) = entries.get_mut(key) {
        entry.expires_at = Some(Instant::now() + ttl);
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries| {
            if live(entries, key).is_none() {
                return Ok(None);
            }
            match entries.remove(key).map(|e| e.value) {
                Some(Stored::Text(text)) => Ok(Some(text)),
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_entries(|entries| match live(entries, key) {
            None => Ok(None),
            Some(Entry {
                value: Stored::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.remove(key);
            Ok(())
        })
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.with_entries(|entries| incr(entries, key, delta))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.set_many_with_ttl(&[(key.to_string(), value.to_string())], ttl)
            .await
    }

    async fn set_many_with_ttl(
        &self,
        items: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            let expires_at = Some(Instant::now() + ttl);
            for (key, value) in items {
                entries.insert(
                    key.clone(),
                    Entry {
                        value: Stored::Text(value.clone()),
                        expires_at,
                    },
                );
            }
            Ok(())
        })
    }

    async fn list_push(
        &self,
        key: &str,
        values: &[String],
        ttl: Duration,
    ) -> Result<usize, StoreError> {
        self.with_entries(|entries| {
            let list = list_mut(entries, key)?;
            list.extend(values.iter().cloned());
            let len = list.len();
            expire(entries, key, ttl);
            Ok(len)
        })
    }

    async fn list_pop_n(&self, key: &str, n: usize) -> Result<Vec<String>, StoreError> {
        self.with_entries(|entries| {
            let popped = match live(entries, key) {
                None => return Ok(Vec::new()),
                Some(Entry {
                    value: Stored::List(list),
                    ..
                }) => {
                    let take = n.min(list.len());
                    list.drain(..take).collect::<Vec<_>>()
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if matches!(entries.get(key).map(|e| &e.value), Some(Stored::List(l)) if l.is_empty()) {
                entries.remove(key);
            }
            Ok(popped)
        })
    }

    async fn take_list(&self, key: &str) -> Result<Option<Vec<String>>, StoreError> {
        self.with_entries(|entries| {
            if live(entries, key).is_none() {
                return Ok(None);
            }
            match entries.remove(key).map(|e| e.value) {
                Some(Stored::List(list)) => Ok(Some(list.into_iter().collect())),
                _ => Err(wrong_type(key)),
            }
        })
    }

    async fn push_and_decrement(
        &self,
        list_key: &str,
        value: &str,
        counter_key: &str,
        ttl: Duration,
    ) -> Result<i64, StoreError> {
        self.with_entries(|entries| {
            list_mut(entries, list_key)?.push_back(value.to_string());
            expire(entries, list_key, ttl);
            incr(entries, counter_key, -1)
        })
    }

    async fn seed_join(
        &self,
        counter_key: &str,
        count: i64,
        list_key: &str,
        items: &[String],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.with_entries(|entries| {
            entries.insert(
                counter_key.to_string(),
                Entry {
                    value: Stored::Text(count.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            if !items.is_empty() {
                list_mut(entries, list_key)?.extend(items.iter().cloned());
                expire(entries, list_key, ttl);
            }
            Ok(())
        })
    }

    async fn hash_upsert_and_count(
        &self,
        hash: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<usize, StoreError> {
        self.with_entries(|entries| {
            if live(entries, hash).is_none() {
                entries.insert(
                    hash.to_string(),
                    Entry {
                        value: Stored::Hash(Vec::new()),
                        expires_at: None,
                    },
                );
            }
            let count = match entries.get_mut(hash).map(|e| &mut e.value) {
                Some(Stored::Hash(fields)) => {
                    match fields.iter_mut().find(|(name, _)| name == field) {
                        Some(existing) => existing.1 = value.to_string(),
                        None => fields.push((field.to_string(), value.to_string())),
                    }
                    fields.len()
                }
                _ => return Err(wrong_type(hash)),
            };
            expire(entries, hash, ttl);
            Ok(count)
        })
    }

    async fn take_hash(&self, hash: &str) -> Result<Vec<(String, String)>, StoreError> {
        self.with_entries(|entries| {
            if live(entries, hash).is_none() {
                return Ok(Vec::new());
            }
            match entries.remove(hash).map(|e| e.value) {
                Some(Stored::Hash(fields)) => Ok(fields),
                _ => Err(wrong_type(hash)),
            }
        })
    }
}

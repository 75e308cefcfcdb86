// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The coordination store contract.
//!
//! Every operation is a single atomic round trip and must be linearizable per
//! key. Callers never run compare-and-swap loops on top of these; join
//! barriers rely on `push_and_decrement` and `hash_upsert_and_count` being
//! indivisible. Values are opaque strings (JSON in practice).

use crate::errors::StoreError;
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Reads and removes `key`. `None` means it was never there or was already consumed.
    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Non-destructive read.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Adds `delta` to an integer counter, creating it at zero. Returns the new value.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Stores many keys at once, all with the same TTL.
    async fn set_many_with_ttl(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Appends to the tail of a list and refreshes its TTL. Returns the new length.
    async fn list_push(&self, key: &str, values: &[String], ttl: Duration)
        -> Result<usize, StoreError>;

    /// Removes and returns up to `n` items from the head of a list.
    async fn list_pop_n(&self, key: &str, n: usize) -> Result<Vec<String>, StoreError>;

    /// Reads a whole list and deletes it. `None` when the list does not exist.
    async fn take_list(&self, key: &str) -> Result<Option<Vec<String>>, StoreError>;

    /// Fan-in arrival: append `value` to `list_key`, refresh its TTL, and
    /// decrement `counter_key`. Returns the post-decrement counter.
    async fn push_and_decrement(
        &self,
        list_key: &str,
        value: &str,
        counter_key: &str,
        ttl: Duration,
    ) -> Result<i64, StoreError>;

    /// Fan-out seeding: set the join counter and buffer the invocation list.
    async fn seed_join(
        &self,
        counter_key: &str,
        count: i64,
        list_key: &str,
        items: &[String],
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Upserts one field of a hash, refreshes its TTL, and returns the field count.
    async fn hash_upsert_and_count(
        &self,
        hash: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<usize, StoreError>;

    /// Reads every value of a hash in first-write order and deletes the hash.
    async fn take_hash(&self, hash: &str) -> Result<Vec<(String, String)>, StoreError>;
}

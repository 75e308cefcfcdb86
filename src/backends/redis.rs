// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Redis-backed coordination store.
//!
//! Composite operations run as `MULTI/EXEC` pipelines so each is one atomic
//! round trip. Merge hashes keep a companion `<hash>:order` list because
//! Redis hashes do not preserve insertion order.

use crate::config::consts::STORE_BULK_CHUNK_SIZE;
use crate::errors::StoreError;
use crate::traits::CoordinationStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn order_key(hash: &str) -> String {
        format!("{}:order", hash)
    }
}

/// Redis rejects a zero expiry.
fn ttl_secs(ttl: Duration) -> i64 {
    ttl.as_secs().max(1) as i64
}

#[async_trait]
impl CoordinationStore for RedisStore {
    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let (value,): (Option<String>,) = redis::pipe()
            .atomic()
            .get(key)
            .del(key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_many_with_ttl(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(ttl))
                .ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn list_push(
        &self,
        key: &str,
        values: &[String],
        ttl: Duration,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        if values.is_empty() {
            let len: usize = conn.llen(key).await?;
            return Ok(len);
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for chunk in values.chunks(STORE_BULK_CHUNK_SIZE) {
            pipe.rpush(key, chunk).ignore();
        }
        let (len,): (usize,) = pipe
            .llen(key)
            .expire(key, ttl_secs(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }

    async fn list_pop_n(&self, key: &str, n: usize) -> Result<Vec<String>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let (items,): (Vec<String>,) = redis::pipe()
            .atomic()
            .lrange(key, 0, n as isize - 1)
            .ltrim(key, n as isize, -1)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(items)
    }

    async fn take_list(&self, key: &str) -> Result<Option<Vec<String>>, StoreError> {
        let mut conn = self.conn.clone();
        let (exists, items): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .exists(key)
            .lrange(key, 0, -1)
            .del(key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(exists.then_some(items))
    }

    async fn push_and_decrement(
        &self,
        list_key: &str,
        value: &str,
        counter_key: &str,
        ttl: Duration,
    ) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let (counter,): (i64,) = redis::pipe()
            .atomic()
            .rpush(list_key, value)
            .ignore()
            .expire(list_key, ttl_secs(ttl))
            .ignore()
            .decr(counter_key, 1)
            .query_async(&mut conn)
            .await?;
        Ok(counter)
    }

    async fn seed_join(
        &self,
        counter_key: &str,
        count: i64,
        list_key: &str,
        items: &[String],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("SET")
            .arg(counter_key)
            .arg(count)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .ignore();
        if !items.is_empty() {
            for chunk in items.chunks(STORE_BULK_CHUNK_SIZE) {
                pipe.rpush(list_key, chunk).ignore();
            }
            pipe.expire(list_key, ttl_secs(ttl)).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn hash_upsert_and_count(
        &self,
        hash: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let order = Self::order_key(hash);
        let (count,): (usize,) = redis::pipe()
            .atomic()
            .hset(hash, field, value)
            .ignore()
            .rpush(&order, field)
            .ignore()
            .expire(hash, ttl_secs(ttl))
            .ignore()
            .expire(&order, ttl_secs(ttl))
            .ignore()
            .hlen(hash)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn take_hash(&self, hash: &str) -> Result<Vec<(String, String)>, StoreError> {
        let mut conn = self.conn.clone();
        let order = Self::order_key(hash);
        let (arrivals, mut fields): (Vec<String>, HashMap<String, String>) = redis::pipe()
            .atomic()
            .lrange(&order, 0, -1)
            .hgetall(hash)
            .del(hash)
            .ignore()
            .del(&order)
            .ignore()
            .query_async(&mut conn)
            .await?;

        // Redelivered writes append the field again; the first arrival decides its position.
        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(fields.len());
        for field in arrivals {
            if seen.insert(field.clone()) {
                if let Some(value) = fields.remove(&field) {
                    ordered.push((field, value));
                }
            }
        }
        let mut stragglers: Vec<_> = fields.into_iter().collect();
        stragglers.sort();
        ordered.extend(stragglers);
        Ok(ordered)
    }
}

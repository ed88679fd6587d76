use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{StoreResult, TicketStore};
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
    ZSet(HashMap<String, f64>),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

impl Value {
    fn is_empty_collection(&self) -> bool {
        match self {
            Value::Set(s) => s.is_empty(),
            Value::ZSet(z) => z.is_empty(),
            Value::Hash(h) => h.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Str(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Instant::now())
    }
}

/// In-process store. Each key lives in its own `DashMap` shard entry, so every
/// primitive is atomic per key just like a single Redis command.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slots: Arc<DashMap<String, Slot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn wrong_type(key: &str) -> StoreError {
        StoreError::WrongType {
            key: key.to_string(),
        }
    }

    /// Runs `f` against a live slot, dropping it first if it expired.
    fn read<T>(&self, key: &str, f: impl FnOnce(&Value) -> StoreResult<T>) -> StoreResult<Option<T>> {
        let expired = match self.slots.get(key) {
            None => return Ok(None),
            Some(slot) if !slot.is_expired() => return f(&slot.value).map(Some),
            Some(_) => true,
        };
        if expired {
            self.slots.remove_if(key, |_, slot| slot.is_expired());
        }
        Ok(None)
    }

    /// Runs `f` against the slot for `key`, creating it with `init` when
    /// absent or expired. Emptied collections are removed afterwards.
    fn write<T>(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
        f: impl FnOnce(&mut Value) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let result = {
            let mut slot = match self.slots.entry(key.to_string()) {
                Entry::Occupied(mut occupied) => {
                    if occupied.get().is_expired() {
                        occupied.insert(Slot::new(init()));
                    }
                    occupied.into_ref()
                }
                Entry::Vacant(vacant) => vacant.insert(Slot::new(init())),
            };
            f(&mut slot.value)
        };
        self.slots.remove_if(key, |_, slot| slot.value.is_empty_collection());
        result
    }

    /// Like `write`, but a missing key is left missing.
    fn modify(&self, key: &str, f: impl FnOnce(&mut Value) -> StoreResult<()>) -> StoreResult<()> {
        let result = match self.slots.get_mut(key) {
            Some(mut slot) if !slot.is_expired() => f(&mut slot.value),
            _ => return Ok(()),
        };
        self.slots.remove_if(key, |_, slot| slot.value.is_empty_collection());
        result
    }
}

impl TicketStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.read(key, |value| match value {
            Value::Str(s) => Ok(s.clone()),
            _ => Err(Self::wrong_type(key)),
        })
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.slots
            .insert(key.to_string(), Slot::new(Value::Str(value.to_string())));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn set_nx_px(&self, key: &str, value: &str, ttl_ms: u64) -> StoreResult<bool> {
        let slot = Slot {
            value: Value::Str(value.to_string()),
            expires_at: Some(Instant::now() + Duration::from_millis(ttl_ms)),
        };
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(slot);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.slots.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read(key, |_| Ok(()))?.is_some())
    }

    async fn incr(&self, key: &str, by: i64) -> StoreResult<i64> {
        self.write(
            key,
            || Value::Str("0".to_string()),
            |value| match value {
                Value::Str(s) => {
                    let current: i64 = s.trim().parse().map_err(|_| {
                        StoreError::Backend(format!("value at {key} is not an integer"))
                    })?;
                    let next = current + by;
                    *s = next.to_string();
                    Ok(next)
                }
                _ => Err(Self::wrong_type(key)),
            },
        )
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.expires_at = Some(Instant::now() + Duration::from_secs(ttl_secs));
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.write(
            key,
            || Value::Set(BTreeSet::new()),
            |value| match value {
                Value::Set(set) => Ok(set.insert(member.to_string())),
                _ => Err(Self::wrong_type(key)),
            },
        )
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<()> {
        self.modify(key, |value| match value {
            Value::Set(set) => {
                set.remove(member);
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        })
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        Ok(self
            .read(key, |value| match value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(Self::wrong_type(key)),
            })?
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .read(key, |value| match value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(Self::wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.write(
            key,
            || Value::ZSet(HashMap::new()),
            |value| match value {
                Value::ZSet(zset) => {
                    zset.insert(member.to_string(), score);
                    Ok(())
                }
                _ => Err(Self::wrong_type(key)),
            },
        )
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<()> {
        self.modify(key, |value| match value {
            Value::ZSet(zset) => {
                zset.remove(member);
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        })
    }

    async fn zrange_all(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .read(key, |value| match value {
                Value::ZSet(zset) => {
                    let mut members: Vec<(&String, &f64)> = zset.iter().collect();
                    members.sort_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)));
                    Ok(members.into_iter().map(|(m, _)| m.clone()).collect())
                }
                _ => Err(Self::wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.write(
            key,
            || Value::Hash(HashMap::new()),
            |slot| match slot {
                Value::Hash(hash) => {
                    hash.insert(field.to_string(), value.to_string());
                    Ok(())
                }
                _ => Err(Self::wrong_type(key)),
            },
        )
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        Ok(self
            .read(key, |value| match value {
                Value::Hash(hash) => Ok(hash.get(field).cloned()),
                _ => Err(Self::wrong_type(key)),
            })?
            .flatten())
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        Ok(self
            .read(key, |value| match value {
                Value::Hash(hash) => Ok(hash.clone()),
                _ => Err(Self::wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<()> {
        self.modify(key, |value| match value {
            Value::Hash(hash) => {
                hash.remove(field);
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        })
    }

    async fn lpush(&self, key: &str, value: &str) -> StoreResult<()> {
        self.write(
            key,
            || Value::List(VecDeque::new()),
            |slot| match slot {
                Value::List(list) => {
                    list.push_front(value.to_string());
                    Ok(())
                }
                _ => Err(Self::wrong_type(key)),
            },
        )
    }

    async fn ltrim(&self, key: &str, len: usize) -> StoreResult<()> {
        self.modify(key, |value| match value {
            Value::List(list) => {
                list.truncate(len);
                Ok(())
            }
            _ => Err(Self::wrong_type(key)),
        })
    }

    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .read(key, |value| match value {
                Value::List(list) => Ok(list.iter().cloned().collect()),
                _ => Err(Self::wrong_type(key)),
            })?
            .unwrap_or_default())
    }

    async fn scan_delete(&self, prefix: &str) -> StoreResult<u64> {
        let mut removed = 0u64;
        self.slots.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn incr_starts_from_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("c", 1).await.unwrap(), 1);
        assert_eq!(store.incr("c", 1).await.unwrap(), 2);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn sadd_reports_new_members_only() {
        let store = MemoryStore::new();
        assert!(store.sadd("s", "1").await.unwrap());
        assert!(!store.sadd("s", "1").await.unwrap());
        store.srem("s", "1").await.unwrap();
        assert!(!store.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn zrange_orders_by_score() {
        let store = MemoryStore::new();
        store.zadd("q", "10", 10.0).await.unwrap();
        store.zadd("q", "2", 2.0).await.unwrap();
        store.zadd("q", "7", 7.0).await.unwrap();
        assert_eq!(store.zrange_all("q").await.unwrap(), vec!["2", "7", "10"]);
    }

    #[tokio::test]
    async fn lists_are_most_recent_first_and_trimmed() {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.lpush("log", &i.to_string()).await.unwrap();
        }
        store.ltrim("log", 3).await.unwrap();
        assert_eq!(store.lrange_all("log").await.unwrap(), vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.set("k", "v").await.unwrap();
        assert!(matches!(
            store.sadd("k", "x").await,
            Err(StoreError::WrongType { .. })
        ));
    }

    #[tokio::test]
    async fn set_nx_px_respects_existing_and_expired_keys() {
        let store = MemoryStore::new();
        assert!(store.set_nx_px("lock", "a", 10_000).await.unwrap());
        assert!(!store.set_nx_px("lock", "b", 10_000).await.unwrap());

        assert!(store.set_nx_px("short", "a", 1).await.unwrap());
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.set_nx_px("short", "b", 1_000).await.unwrap());
        assert_eq!(store.get("short").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn scan_delete_removes_prefix_only() {
        let store = MemoryStore::new();
        store.set("t:a:1", "x").await.unwrap();
        store.set("t:a:2", "x").await.unwrap();
        store.set("t:b:1", "x").await.unwrap();
        assert_eq!(store.scan_delete("t:a:").await.unwrap(), 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn hash_roundtrip() {
        let store = MemoryStore::new();
        store.hset("h", "1", "Ana").await.unwrap();
        store.hset("h", "2", "Bruno").await.unwrap();
        assert_eq!(store.hget("h", "1").await.unwrap().as_deref(), Some("Ana"));
        store.hdel("h", "1").await.unwrap();
        assert_eq!(store.hgetall("h").await.unwrap().len(), 1);
    }
}

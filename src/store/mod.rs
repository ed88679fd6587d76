//! Contrato do armazenamento chave-valor usado pelo motor de senhas.
//!
//! Cada operação é atômica por chave; nenhuma operação cobre várias chaves.
//! [`MemoryStore`] atende testes e instalações de processo único,
//! [`RedisStore`] atende produção.

mod memory;
mod redis_store;

use std::collections::HashMap;
use std::future::Future;

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;
use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Primitivas de string, contador, conjunto, conjunto ordenado, hash e lista.
///
/// Os métodos devolvem futures `Send` para que handlers genéricos do axum
/// possam ser agendados em qualquer worker do runtime.
pub trait TicketStore: Clone + Send + Sync + 'static {
    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    fn set(&self, key: &str, value: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Grava apenas se a chave não existir. Retorna `true` se gravou.
    fn set_nx_px(
        &self,
        key: &str,
        value: &str,
        ttl_ms: u64,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn del(&self, key: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    fn incr(&self, key: &str, by: i64) -> impl Future<Output = StoreResult<i64>> + Send;

    fn expire(&self, key: &str, ttl_secs: u64) -> impl Future<Output = StoreResult<()>> + Send;

    /// Retorna `true` se o membro não estava no conjunto.
    fn sadd(&self, key: &str, member: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    fn srem(&self, key: &str, member: &str) -> impl Future<Output = StoreResult<()>> + Send;

    fn sismember(&self, key: &str, member: &str)
    -> impl Future<Output = StoreResult<bool>> + Send;

    fn smembers(&self, key: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    fn zadd(
        &self,
        key: &str,
        member: &str,
        score: f64,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn zrem(&self, key: &str, member: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Todos os membros em ordem crescente de score.
    fn zrange_all(&self, key: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    fn hset(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn hget(&self, key: &str, field: &str)
    -> impl Future<Output = StoreResult<Option<String>>> + Send;

    fn hgetall(
        &self,
        key: &str,
    ) -> impl Future<Output = StoreResult<HashMap<String, String>>> + Send;

    fn hdel(&self, key: &str, field: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Insere na cabeça da lista (mais recente primeiro).
    fn lpush(&self, key: &str, value: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Mantém apenas os índices `0..len` da lista.
    fn ltrim(&self, key: &str, len: usize) -> impl Future<Output = StoreResult<()>> + Send;

    fn lrange_all(&self, key: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    /// Apaga todas as chaves que começam com `prefix`. Retorna quantas apagou.
    fn scan_delete(&self, prefix: &str) -> impl Future<Output = StoreResult<u64>> + Send;
}

/// Lê um número gravado como string; ausente ou ilegível vale zero.
pub fn parse_u64(value: Option<String>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}

/// Como [`parse_u64`], para timestamps em milissegundos.
pub fn parse_i64(value: Option<String>) -> Option<i64> {
    value.and_then(|v| v.trim().parse().ok())
}

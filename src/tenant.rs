//! Registro de tenants: credencial, rótulo, horário e configuração do monitor.
//!
//! Um tenant existe enquanto houver hash de credencial ou configuração de
//! monitor gravados. O hash chega pronto; gerar e verificar senhas fica
//! fora deste crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QueueError, Result};
use crate::keys::TenantKeys;
use crate::schedule::Schedule;
use crate::store::TicketStore;

/// Dados de cadastro de um novo tenant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub tenant_id: String,
    pub credential_hash: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

/// Configuração exibida pelos monitores do tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
    #[serde(default)]
    pub label: String,
    /// Guichê preferencial: senhas prioritárias e normais contam posição
    /// em filas separadas.
    #[serde(default)]
    pub preferential_desk: bool,
}

/// Acesso aos registros de tenant no armazenamento.
#[derive(Debug, Clone)]
pub struct TenantRegistry<S> {
    store: S,
}

impl<S: TicketStore> TenantRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Cadastra um tenant. Falha se o id já existir ou o hash estiver vazio.
    pub async fn register(&self, registration: Registration) -> Result<TenantKeys> {
        let keys = TenantKeys::new(&registration.tenant_id)?;
        if registration.credential_hash.trim().is_empty() {
            return Err(QueueError::InvalidArgument("credentialHash is required".into()));
        }
        if let Some(schedule) = &registration.schedule {
            schedule.validate()?;
        }
        if self.exists(&keys).await? {
            return Err(QueueError::InvalidArgument(format!(
                "tenant {} already exists",
                keys.tenant()
            )));
        }

        self.store
            .set(&keys.label(), registration.label.trim())
            .await?;
        if let Some(schedule) = &registration.schedule {
            self.store
                .set(&keys.schedule(), &serde_json::to_string(schedule)?)
                .await?;
        }
        // Gravado por último: é o que torna o tenant visível.
        self.store
            .set(&keys.credential_hash(), &registration.credential_hash)
            .await?;

        tracing::info!(tenant = keys.tenant(), "tenant registered");
        Ok(keys)
    }

    /// Apaga todas as chaves do tenant. Retorna quantas chaves foram removidas.
    pub async fn delete(&self, tenant: &str) -> Result<u64> {
        let keys = self.require(tenant).await?;
        let mut removed = self.store.scan_delete(keys.prefix()).await?;
        if self.store.exists(&keys.monitor()).await? {
            self.store.del(&keys.monitor()).await?;
            removed += 1;
        }
        tracing::info!(tenant = keys.tenant(), removed, "tenant deleted");
        Ok(removed)
    }

    pub async fn exists(&self, keys: &TenantKeys) -> Result<bool> {
        Ok(self.store.exists(&keys.credential_hash()).await?
            || self.store.exists(&keys.monitor()).await?)
    }

    /// Valida o id e confirma que o tenant existe, antes de qualquer escrita.
    pub async fn require(&self, tenant: &str) -> Result<TenantKeys> {
        let keys = TenantKeys::new(tenant)?;
        if !self.exists(&keys).await? {
            return Err(QueueError::InvalidTenant(tenant.to_string()));
        }
        Ok(keys)
    }

    pub async fn label(&self, keys: &TenantKeys) -> Result<String> {
        Ok(self.store.get(&keys.label()).await?.unwrap_or_default())
    }

    /// Horário configurado. Um valor ilegível no armazenamento conta como
    /// ausente.
    pub async fn schedule(&self, keys: &TenantKeys) -> Result<Option<Schedule>> {
        let Some(raw) = self.store.get(&keys.schedule()).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(schedule) => Ok(Some(schedule)),
            Err(e) => {
                tracing::warn!(tenant = keys.tenant(), error = %e, "ignoring unreadable schedule");
                Ok(None)
            }
        }
    }

    pub async fn set_schedule(&self, tenant: &str, schedule: &Schedule) -> Result<()> {
        let keys = self.require(tenant).await?;
        schedule.validate()?;
        self.store
            .set(&keys.schedule(), &serde_json::to_string(schedule)?)
            .await?;
        Ok(())
    }

    /// Sem horário configurado o tenant está sempre aberto.
    pub async fn is_open(&self, keys: &TenantKeys, now: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .schedule(keys)
            .await?
            .is_none_or(|schedule| schedule.is_open(now)))
    }

    pub async fn monitor(&self, keys: &TenantKeys) -> Result<MonitorConfig> {
        let Some(raw) = self.store.get(&keys.monitor()).await? else {
            return Ok(MonitorConfig::default());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_default())
    }

    /// Grava a configuração do monitor. Basta isso para o tenant existir.
    pub async fn set_monitor(&self, tenant: &str, config: &MonitorConfig) -> Result<()> {
        let keys = TenantKeys::new(tenant)?;
        self.store
            .set(&keys.monitor(), &serde_json::to_string(config)?)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    fn registration(id: &str) -> Registration {
        Registration {
            tenant_id: id.into(),
            credential_hash: "$argon2id$v=19$stub".into(),
            label: "Clínica Acme".into(),
            schedule: None,
        }
    }

    #[tokio::test]
    async fn register_then_require() {
        let registry = TenantRegistry::new(MemoryStore::new());
        registry.register(registration("acme")).await.unwrap();

        let keys = registry.require("acme").await.unwrap();
        assert_eq!(registry.label(&keys).await.unwrap(), "Clínica Acme");
        assert!(matches!(
            registry.require("other").await,
            Err(QueueError::InvalidTenant(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = TenantRegistry::new(MemoryStore::new());
        registry.register(registration("acme")).await.unwrap();
        assert!(matches!(
            registry.register(registration("acme")).await,
            Err(QueueError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn empty_hash_is_rejected() {
        let registry = TenantRegistry::new(MemoryStore::new());
        let reg = Registration {
            credential_hash: "  ".into(),
            ..registration("acme")
        };
        assert!(registry.register(reg).await.is_err());
    }

    #[tokio::test]
    async fn monitor_config_alone_makes_a_tenant() {
        let registry = TenantRegistry::new(MemoryStore::new());
        let config = MonitorConfig {
            label: "Recepção".into(),
            preferential_desk: true,
        };
        registry.set_monitor("lobby", &config).await.unwrap();

        let keys = registry.require("lobby").await.unwrap();
        assert_eq!(registry.monitor(&keys).await.unwrap(), config);
    }

    #[tokio::test]
    async fn delete_wipes_every_key() {
        let store = MemoryStore::new();
        let registry = TenantRegistry::new(store.clone());
        let keys = registry.register(registration("acme")).await.unwrap();
        registry.set_monitor("acme", &MonitorConfig::default()).await.unwrap();
        store.incr(&keys.ticket_counter(), 3).await.unwrap();
        registry.register(registration("other")).await.unwrap();

        registry.delete("acme").await.unwrap();
        assert!(!registry.exists(&keys).await.unwrap());
        assert!(!store.exists(&keys.ticket_counter()).await.unwrap());
        assert!(registry.require("other").await.is_ok());
    }

    #[tokio::test]
    async fn no_schedule_means_open() {
        let registry = TenantRegistry::new(MemoryStore::new());
        let keys = registry.register(registration("acme")).await.unwrap();
        let early_monday = Utc.with_ymd_and_hms(2026, 3, 2, 2, 0, 0).unwrap();
        assert!(registry.is_open(&keys, early_monday).await.unwrap());

        let schedule = Schedule {
            enabled: true,
            timezone: "UTC".into(),
            days: vec![1],
            start: "08:00".into(),
            end: "12:00".into(),
        };
        registry.set_schedule("acme", &schedule).await.unwrap();
        assert!(!registry.is_open(&keys, early_monday).await.unwrap());
    }
}

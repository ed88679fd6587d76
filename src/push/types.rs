//! Corpo enviado ao relay de notificações push.

use serde::{Deserialize, Serialize};

/// Notificação de "sua senha foi chamada".
///
/// `subscription` é repassada sem interpretação: é o objeto que o navegador
/// do cliente entregou ao se inscrever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    pub tenant: String,
    pub ticket: u64,
    pub attendant: String,
    pub subscription: serde_json::Value,
}

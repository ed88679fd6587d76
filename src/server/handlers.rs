//! Request handlers. Each one parses its body, calls the engine or the
//! projector, and shapes the JSON answer.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::AppState;
use super::error::ApiError;
use crate::lifecycle::{
    AttendedEvent, BatchEntry, BatchImported, CallOutcome, CancelOutcome, CancelReason,
    CancelTarget, EnterRequest, Entered, TicketClass,
};
use crate::projector::{Cancellations, ClientView, Report, StatusView};
use crate::schedule::Schedule;
use crate::store::TicketStore;
use crate::tenant::{MonitorConfig, Registration};

type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    #[serde(default)]
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ManualRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub priority: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(default)]
    pub attendant: String,
    #[serde(default)]
    pub ticket: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub called_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendant_id: Option<String>,
    /// "normal" or "priority".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tipo: Option<TicketClass>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub repeat: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub empty: bool,
}

#[derive(Debug, Deserialize)]
pub struct TicketRequest {
    #[serde(default)]
    pub ticket: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub ticket: Option<u64>,
    #[serde(default)]
    pub reason: CancelReason,
    #[serde(default)]
    pub duration: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    #[serde(default)]
    pub attendant: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterRequest {
    #[serde(default)]
    pub next_ticket: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub subscription: Value,
}

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

/// POST /api/tenants
pub async fn register<S: TicketStore>(
    State(state): State<AppState<S>>,
    Json(body): Json<Registration>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let keys = state.engine.tenants().register(body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "tenantId": keys.tenant() }))))
}

/// DELETE /api/tenants/{tenant}
pub async fn delete_tenant<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
) -> ApiResult<Value> {
    let removed = state.engine.tenants().delete(&tenant).await?;
    Ok(Json(json!({ "deleted": true, "removedKeys": removed })))
}

/// POST /api/{tenant}/enter
pub async fn enter<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<EnterRequest>,
) -> ApiResult<Entered> {
    Ok(Json(state.engine.enter(&tenant, body).await?))
}

/// POST /api/{tenant}/manual
pub async fn add_manual<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<ManualRequest>,
) -> ApiResult<Entered> {
    Ok(Json(
        state
            .engine
            .add_manual(&tenant, &body.name, body.priority)
            .await?,
    ))
}

/// POST /api/{tenant}/import
pub async fn import<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<ImportRequest>,
) -> ApiResult<BatchImported> {
    Ok(Json(state.engine.enter_batch(&tenant, body.entries).await?))
}

/// POST /api/{tenant}/call
pub async fn call<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<CallRequest>,
) -> ApiResult<CallResponse> {
    let response = match state.engine.call(&tenant, &body.attendant, body.ticket).await? {
        CallOutcome::Called(call) => CallResponse {
            called_number: Some(call.ticket),
            attendant_id: Some(call.attendant),
            tipo: Some(call.class),
            repeat: call.repeat,
            empty: false,
        },
        CallOutcome::Empty => CallResponse {
            called_number: None,
            attendant_id: None,
            tipo: None,
            repeat: false,
            empty: true,
        },
    };
    Ok(Json(response))
}

/// POST /api/{tenant}/attend
pub async fn attend<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<TicketRequest>,
) -> ApiResult<Value> {
    let ticket = body
        .ticket
        .ok_or_else(|| ApiError::bad_request("ticket is required"))?;
    let attended = state.engine.attend(&tenant, ticket).await?;
    Ok(Json(json!({
        "attended": true,
        "ticket": attended.ticket,
        "duration": attended.duration,
        "wait": attended.wait,
    })))
}

/// POST /api/{tenant}/cancel
pub async fn cancel<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<CancelRequest>,
) -> ApiResult<Value> {
    let target = match (body.ticket, body.client_id) {
        (Some(ticket), _) => CancelTarget::Ticket(ticket),
        (None, Some(client_id)) if !client_id.is_empty() => CancelTarget::Client(client_id),
        _ => return Err(ApiError::bad_request("clientId or ticket is required")),
    };

    let body = match state
        .engine
        .cancel(&tenant, target, body.reason, body.duration)
        .await?
    {
        CancelOutcome::Cancelled {
            ticket,
            reason,
            wait,
            duration,
        } => json!({
            "cancelled": true,
            "ticket": ticket,
            "reason": reason,
            "wait": wait,
            "duration": duration,
        }),
        CancelOutcome::AlreadyAttended { ticket } => json!({
            "cancelled": false,
            "alreadyAttended": true,
            "ticket": ticket,
        }),
        CancelOutcome::NotCancelled => json!({ "cancelled": false }),
    };
    Ok(Json(body))
}

/// POST /api/{tenant}/reset
pub async fn reset<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<ResetRequest>,
) -> ApiResult<Value> {
    let outcome = state.engine.reset(&tenant, &body.attendant).await?;
    Ok(Json(json!({ "reset": true, "ts": outcome.ts })))
}

/// POST /api/{tenant}/counter
pub async fn set_counter<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<CounterRequest>,
) -> ApiResult<Value> {
    let next = body
        .next_ticket
        .ok_or_else(|| ApiError::bad_request("nextTicket is required"))?;
    let outcome = state.engine.set_ticket_counter(&tenant, next).await?;
    Ok(Json(json!({
        "ok": true,
        "ticketNumber": outcome.ticket_number,
        "skipped": outcome.skipped,
    })))
}

/// POST /api/{tenant}/push
pub async fn subscribe_push<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<PushRequest>,
) -> ApiResult<Value> {
    if body.subscription.is_null() {
        return Err(ApiError::bad_request("subscription is required"));
    }
    let ticket = state
        .engine
        .subscribe_push(&tenant, &body.client_id, &body.subscription)
        .await?;
    Ok(Json(json!({ "subscribed": true, "ticket": ticket })))
}

/// PUT /api/{tenant}/schedule
pub async fn set_schedule<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<Schedule>,
) -> ApiResult<Value> {
    state.engine.tenants().set_schedule(&tenant, &body).await?;
    Ok(Json(json!({ "ok": true })))
}

/// PUT /api/{tenant}/monitor
pub async fn set_monitor<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
    Json(body): Json<MonitorConfig>,
) -> ApiResult<Value> {
    state.engine.tenants().set_monitor(&tenant, &body).await?;
    Ok(Json(json!({ "ok": true })))
}

/// GET /api/{tenant}/status
pub async fn status<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
) -> ApiResult<StatusView> {
    Ok(Json(state.projector.status(&tenant).await?))
}

/// GET /api/{tenant}/client/{clientId}
pub async fn client_view<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path((tenant, client_id)): Path<(String, String)>,
) -> ApiResult<ClientView> {
    Ok(Json(state.projector.client_view(&tenant, &client_id).await?))
}

/// GET /api/{tenant}/report
pub async fn report<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
) -> ApiResult<Report> {
    Ok(Json(state.projector.report(&tenant).await?))
}

/// GET /api/{tenant}/cancelados
pub async fn cancellations<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
) -> ApiResult<Cancellations> {
    Ok(Json(state.projector.cancellations(&tenant).await?))
}

/// GET /api/{tenant}/atendidos
pub async fn attendances<S: TicketStore>(
    State(state): State<AppState<S>>,
    Path(tenant): Path<String>,
) -> ApiResult<Vec<AttendedEvent>> {
    Ok(Json(state.projector.attendances(&tenant).await?))
}

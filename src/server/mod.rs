//! HTTP surface built on axum.

mod error;
mod handlers;

use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

use crate::error::Result;
use crate::lifecycle::QueueEngine;
use crate::projector::Projector;
use crate::store::TicketStore;

/// Shared state for request handlers.
pub struct AppState<S> {
    pub engine: Arc<QueueEngine<S>>,
    pub projector: Projector<S>,
}

impl<S: TicketStore> AppState<S> {
    pub fn new(engine: QueueEngine<S>, projector: Projector<S>) -> Self {
        Self {
            engine: Arc::new(engine),
            projector,
        }
    }
}

impl<S: TicketStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            projector: self.projector.clone(),
        }
    }
}

/// Every route of the service.
///
/// - `POST /api/tenants`, `DELETE /api/tenants/{tenant}`
/// - `POST /api/{tenant}/{enter,manual,import,call,attend,cancel,reset,counter,push}`
/// - `PUT /api/{tenant}/{schedule,monitor}`
/// - `GET /api/{tenant}/{status,report,cancelados,atendidos}`, `GET /api/{tenant}/client/{clientId}`
/// - `GET /health`
pub fn router<S: TicketStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/tenants", post(handlers::register::<S>))
        .route("/api/tenants/{tenant}", delete(handlers::delete_tenant::<S>))
        .route("/api/{tenant}/enter", post(handlers::enter::<S>))
        .route("/api/{tenant}/manual", post(handlers::add_manual::<S>))
        .route("/api/{tenant}/import", post(handlers::import::<S>))
        .route("/api/{tenant}/call", post(handlers::call::<S>))
        .route("/api/{tenant}/attend", post(handlers::attend::<S>))
        .route("/api/{tenant}/cancel", post(handlers::cancel::<S>))
        .route("/api/{tenant}/reset", post(handlers::reset::<S>))
        .route("/api/{tenant}/counter", post(handlers::set_counter::<S>))
        .route("/api/{tenant}/push", post(handlers::subscribe_push::<S>))
        .route("/api/{tenant}/schedule", put(handlers::set_schedule::<S>))
        .route("/api/{tenant}/monitor", put(handlers::set_monitor::<S>))
        .route("/api/{tenant}/status", get(handlers::status::<S>))
        .route("/api/{tenant}/client/{client_id}", get(handlers::client_view::<S>))
        .route("/api/{tenant}/report", get(handlers::report::<S>))
        .route("/api/{tenant}/cancelados", get(handlers::cancellations::<S>))
        .route("/api/{tenant}/atendidos", get(handlers::attendances::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds `addr` and serves until the process stops.
pub async fn serve<S: TicketStore>(addr: &str, state: AppState<S>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr, "listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

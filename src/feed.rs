//! Status change subscriptions.
//!
//! Clients poll today; [`StatusFeed`] is the seam where a push-based source
//! can replace [`PollingFeed`] without touching the engine.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{QueueError, Result};
use crate::projector::{Projector, StatusView};
use crate::store::TicketStore;

const FEED_BUFFER: usize = 16;

/// A stream of status snapshots for one tenant.
pub trait StatusFeed: Send + Sync {
    /// Starts a subscription. The first snapshot is sent right away, then one
    /// more each time the queue changes. Dropping the receiver ends it.
    fn subscribe(
        &self,
        tenant: &str,
    ) -> impl Future<Output = Result<mpsc::Receiver<StatusView>>> + Send;
}

/// Re-reads the status on a fixed period and forwards it when it changed.
#[derive(Clone)]
pub struct PollingFeed<S> {
    projector: Projector<S>,
    period: Duration,
}

impl<S: TicketStore> PollingFeed<S> {
    pub fn new(projector: Projector<S>, period: Duration) -> Self {
        Self { projector, period }
    }
}

impl<S: TicketStore> StatusFeed for PollingFeed<S> {
    async fn subscribe(&self, tenant: &str) -> Result<mpsc::Receiver<StatusView>> {
        let first = self.projector.status(tenant).await?;
        let (tx, rx) = mpsc::channel(FEED_BUFFER);
        let projector = self.projector.clone();
        let tenant = tenant.to_string();
        let period = self.period;

        tokio::spawn(async move {
            let mut last = first.clone();
            if tx.send(first).await.is_err() {
                return;
            }

            let mut interval = tokio::time::interval(period);
            // The first tick fires immediately.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = tx.closed() => break,
                }
                match projector.status(&tenant).await {
                    Ok(view) if view.differs_from(&last) => {
                        last = view.clone();
                        if tx.send(view).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(QueueError::InvalidTenant(_)) => {
                        tracing::info!(tenant, "tenant gone, closing status feed");
                        break;
                    }
                    Err(e) => tracing::warn!(tenant, error = %e, "status poll failed"),
                }
            }
            tracing::debug!(tenant, "status feed closed");
        });

        Ok(rx)
    }
}

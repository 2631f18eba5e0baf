use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument};

use crate::{
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::order_status::{apply_transition, no_changes, publish_transition},
};

pub const EXPIRED_NOTE: &str = "Reservation expired";

/// Releases the stock held by pending orders whose reservation window has passed.
pub struct ExpiryService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl ExpiryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Cancels `order` if it is still pending past `expires_at`.
    ///
    /// Returns `false` when the order is not expired or another request moved
    /// it first.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn cancel_if_expired(&self, order: &order::Model) -> Result<bool, ServiceError> {
        if !order.is_expired_at(Utc::now()) {
            return Ok(false);
        }

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin expiry transaction");
            ServiceError::DatabaseError(e)
        })?;

        let transition = match apply_transition(
            &txn,
            order,
            OrderStatus::Cancelled,
            no_changes(),
            None,
            Some(EXPIRED_NOTE.to_string()),
        )
        .await
        {
            Ok(transition) => transition,
            Err(ServiceError::Conflict(_)) => {
                debug!(order_id = %order.id, "order changed before it could expire");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order.id, "Failed to commit expiry");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order.id, "Order reservation expired, stock returned");
        metrics::increment_counter("orders_expired_total");
        publish_transition(self.event_sender.as_ref(), &transition).await;
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::OrderExpired(order.id)).await;
        }
        Ok(true)
    }

    /// Sweeps every expired pending order; returns how many were cancelled.
    #[instrument(skip(self))]
    pub async fn cancel_expired_orders(&self) -> Result<u64, ServiceError> {
        let expired = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .filter(order::Column::ExpiresAt.lt(Utc::now()))
            .all(&*self.db)
            .await?;

        let mut cancelled = 0;
        for order in &expired {
            if self.cancel_if_expired(order).await? {
                cancelled += 1;
            }
        }

        if cancelled > 0 {
            info!(cancelled, "Expired orders cancelled");
        }

        let pending = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Pending))
            .count(&*self.db)
            .await?;
        metrics::set_gauge("pending_reservations", pending as i64);
        Ok(cancelled)
    }
}

/// Spawns the periodic sweeper. A zero interval disables it.
pub fn start_expiry_worker(service: Arc<ExpiryService>, every: Duration) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        info!("Expiry sweeper disabled");
        return None;
    }

    info!(interval_secs = every.as_secs(), "Starting expiry sweeper");
    Some(tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = service.cancel_expired_orders().await {
                error!("expiry sweeper error: {}", e);
            }
        }
    }))
}

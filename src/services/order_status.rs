use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::{
        order::{self, OrderStatus},
        order_item, order_status_history, payment, product, user, PaymentStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{expiry::ExpiryService, pickup::pickup_code_matches},
};

impl OrderStatus {
    /// Forward steps only, one at a time; any open order may be cancelled.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Paid) | (Paid, Processing) | (Processing, Ready) | (Ready, Completed) => {
                true
            }
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[validate(length(max = 500))]
    pub note: Option<String>,
    /// Required to complete a ready order unless `release_reason` is given.
    pub pickup_code: Option<String>,
    #[validate(length(max = 1000))]
    pub release_reason: Option<String>,
    pub release_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct VerifyPickupRequest {
    #[validate(length(min = 1, max = 32, message = "Pickup code is required"))]
    pub pickup_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ManualReleaseRequest {
    #[validate(length(max = 1000))]
    pub reason: String,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryEntry {
    pub id: Uuid,
    pub status: OrderStatus,
    pub status_display: String,
    pub changed_by: Option<Uuid>,
    pub changed_by_name: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub(crate) fn from_row(
        row: order_status_history::Model,
        names: &HashMap<Uuid, String>,
    ) -> Self {
        Self {
            id: row.id,
            status: row.status,
            status_display: row.status.label().to_string(),
            changed_by_name: row.changed_by.and_then(|id| names.get(&id).cloned()),
            changed_by: row.changed_by,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

/// Result of a committed status change.
#[derive(Debug, Clone)]
pub struct Transition {
    pub order: order::Model,
    pub from: OrderStatus,
    pub note: Option<String>,
    pub restocked: Vec<(Uuid, i32)>,
}

pub(crate) async fn record_history<C>(
    db: &C,
    order_id: Uuid,
    status: OrderStatus,
    changed_by: Option<Uuid>,
    note: Option<String>,
) -> Result<(), ServiceError>
where
    C: ConnectionTrait,
{
    order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(status),
        changed_by: Set(changed_by),
        note: Set(note),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .map_err(|e| {
        error!(error = %e, order_id = %order_id, "Failed to record status history");
        ServiceError::DatabaseError(e)
    })?;
    Ok(())
}

/// Returns every reserved unit of the order to its product.
pub(crate) async fn restock_order<C>(db: &C, order_id: Uuid) -> Result<Vec<(Uuid, i32)>, ServiceError>
where
    C: ConnectionTrait,
{
    let items = order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(db)
        .await?;

    let mut restocked = Vec::with_capacity(items.len());
    for item in items {
        product::Entity::update_many()
            .col_expr(
                product::Column::Stock,
                sea_orm::sea_query::Expr::col(product::Column::Stock).add(item.quantity),
            )
            .filter(product::Column::Id.eq(item.product_id))
            .exec(db)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %item.product_id, "Failed to restock product");
                ServiceError::DatabaseError(e)
            })?;
        restocked.push((item.product_id, item.quantity));
    }
    Ok(restocked)
}

/// Moves `current` to `to` if nobody changed it since it was read.
///
/// `changes` carries any extra columns to write with the status. Cancelling
/// restocks the order, refunds an approved payment and rejects a pending one.
pub(crate) async fn apply_transition<C>(
    db: &C,
    current: &order::Model,
    to: OrderStatus,
    changes: order::ActiveModel,
    actor: Option<Uuid>,
    note: Option<String>,
) -> Result<Transition, ServiceError>
where
    C: ConnectionTrait,
{
    if !current.status.can_transition_to(to) {
        return Err(ServiceError::InvalidStatus(format!(
            "Cannot change order status from {} to {}",
            current.status.as_str(),
            to.as_str()
        )));
    }

    let mut changes = changes;
    changes.status = Set(to);
    changes.updated_at = Set(Utc::now());

    let result = order::Entity::update_many()
        .set(changes)
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::Status.eq(current.status))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(
            "Order was modified concurrently, reload and retry".to_string(),
        ));
    }

    record_history(db, current.id, to, actor, note.clone()).await?;

    let mut restocked = Vec::new();
    if to == OrderStatus::Cancelled {
        restocked = restock_order(db, current.id).await?;
        // Money already taken is refunded; an unsettled charge can no longer settle.
        let (from, settled) = if current.status.is_paid() {
            (PaymentStatus::Approved, PaymentStatus::Refunded)
        } else {
            (PaymentStatus::Pending, PaymentStatus::Rejected)
        };
        payment::Entity::update_many()
            .col_expr(
                payment::Column::Status,
                sea_orm::sea_query::Expr::value(settled),
            )
            .col_expr(
                payment::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(Utc::now()),
            )
            .filter(payment::Column::OrderId.eq(current.id))
            .filter(payment::Column::Status.eq(from))
            .exec(db)
            .await?;
    }

    let order = order::Entity::find_by_id(current.id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", current.id)))?;

    Ok(Transition {
        order,
        from: current.status,
        note,
        restocked,
    })
}

/// Emits the events for a committed transition.
pub(crate) async fn publish_transition(sender: Option<&Arc<EventSender>>, transition: &Transition) {
    let to = transition.order.status;
    metrics::increment_counter("order_transitions_total");
    if to == OrderStatus::Cancelled {
        metrics::increment_counter("orders_cancelled_total");
    }
    let units: i64 = transition.restocked.iter().map(|(_, q)| i64::from(*q)).sum();
    if units > 0 {
        metrics::increment_counter_by("stock_units_restocked_total", units as u64);
    }

    let Some(sender) = sender else {
        return;
    };
    let order_id = transition.order.id;
    sender
        .send_or_log(Event::OrderStatusChanged {
            order_id,
            old_status: transition.from.as_str().to_string(),
            new_status: to.as_str().to_string(),
        })
        .await;
    if to == OrderStatus::Cancelled {
        sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                reason: transition.note.clone().unwrap_or_default(),
            })
            .await;
    }
    for (product_id, quantity) in &transition.restocked {
        sender
            .send_or_log(Event::StockReturned {
                product_id: *product_id,
                quantity: *quantity,
            })
            .await;
    }
}

/// Resolves history rows into entries with the acting user's name.
pub(crate) async fn history_entries<C>(
    db: &C,
    rows: Vec<order_status_history::Model>,
) -> Result<Vec<StatusHistoryEntry>, ServiceError>
where
    C: ConnectionTrait,
{
    let user_ids: Vec<Uuid> = rows.iter().filter_map(|r| r.changed_by).collect();
    let names: HashMap<Uuid, String> = if user_ids.is_empty() {
        HashMap::new()
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u.username))
            .collect()
    };

    Ok(rows
        .into_iter()
        .map(|row| StatusHistoryEntry::from_row(row, &names))
        .collect())
}

/// An update that touches nothing beyond the status columns.
pub(crate) fn no_changes() -> order::ActiveModel {
    Default::default()
}

pub(crate) async fn find_order<C>(db: &C, order_id: Uuid) -> Result<order::Model, ServiceError>
where
    C: ConnectionTrait,
{
    order::Entity::find_by_id(order_id)
        .one(db)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to fetch order");
            ServiceError::DatabaseError(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
}

/// Staff-side status changes: the state machine, pickup verification and manual release.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
    expiry: Arc<ExpiryService>,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Option<Arc<EventSender>>,
        expiry: Arc<ExpiryService>,
    ) -> Self {
        Self {
            db,
            event_sender,
            expiry,
        }
    }

    /// Updates the status of an order with validation
    #[instrument(skip(self, request, actor), fields(order_id = %order_id, new_status = %request.status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        request: UpdateStatusRequest,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        request.validate()?;
        let target = OrderStatus::from_str(request.status.trim().to_lowercase().as_str())
            .map_err(|_| {
                ServiceError::ValidationError(format!("Unknown order status: {}", request.status))
            })?;

        if target == OrderStatus::Completed {
            if let Some(code) = request.pickup_code.as_deref().filter(|c| !c.trim().is_empty()) {
                return self.verify_pickup(order_id, code, actor).await;
            }
            if let Some(reason) = request.release_reason.clone() {
                return self
                    .manual_release(order_id, reason, request.release_image.clone(), actor)
                    .await;
            }
            return Err(ServiceError::ValidationError(
                "Completing an order requires the pickup code or a manual release reason"
                    .to_string(),
            ));
        }

        let order = self.open_order(order_id).await?;
        if order.status == target {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is already {}",
                target.as_str()
            )));
        }

        let note = if target == OrderStatus::Cancelled && order.status.is_paid() {
            Some(format!(
                "Order cancelled after payment, refund issued at {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
            ))
        } else {
            request
                .note
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
        };

        self.transition(&order, target, no_changes(), actor, note)
            .await
    }

    /// Completes a ready order when the customer's code matches.
    #[instrument(skip(self, code, actor), fields(order_id = %order_id))]
    pub async fn verify_pickup(
        &self,
        order_id: Uuid,
        code: &str,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let order = self.ready_order(order_id).await?;

        if !pickup_code_matches(&order.pickup_code, code) {
            metrics::increment_counter("pickup_code_mismatch_total");
            warn!(order_id = %order_id, "pickup code mismatch");
            return Err(ServiceError::ValidationError("Invalid pickup code".to_string()));
        }

        let changes = order::ActiveModel {
            manual_release: Set(false),
            released_by: Set(Some(actor.user_id)),
            released_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        let updated = self
            .transition(
                &order,
                OrderStatus::Completed,
                changes,
                actor,
                Some("Pickup code verified".to_string()),
            )
            .await?;

        self.publish_release(order_id, actor.user_id, false).await;
        Ok(updated)
    }

    /// Completes a ready order without the code; the reason is kept for audit.
    #[instrument(skip(self, reason, image, actor), fields(order_id = %order_id))]
    pub async fn manual_release(
        &self,
        order_id: Uuid,
        reason: String,
        image: Option<String>,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "A reason is required for manual release".to_string(),
            ));
        }
        let order = self.ready_order(order_id).await?;

        let changes = order::ActiveModel {
            manual_release: Set(true),
            release_reason: Set(Some(reason.clone())),
            release_image: Set(image.filter(|i| !i.trim().is_empty())),
            released_by: Set(Some(actor.user_id)),
            released_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        let updated = self
            .transition(
                &order,
                OrderStatus::Completed,
                changes,
                actor,
                Some(format!("Manual release: {}", reason)),
            )
            .await?;

        info!(order_id = %order_id, released_by = %actor.user_id, "order released manually");
        self.publish_release(order_id, actor.user_id, true).await;
        Ok(updated)
    }

    /// Moves a freshly paid order into processing.
    #[instrument(skip(self, actor), fields(order_id = %order_id))]
    pub async fn auto_process(
        &self,
        order_id: Uuid,
        actor: &AuthUser,
    ) -> Result<order::Model, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        if order.status != OrderStatus::Paid {
            return Err(ServiceError::InvalidStatus(format!(
                "Only paid orders can be processed automatically, order is {}",
                order.status.as_str()
            )));
        }
        self.transition(
            &order,
            OrderStatus::Processing,
            no_changes(),
            actor,
            Some("Automatic transition after payment confirmation".to_string()),
        )
        .await
    }

    /// Full audit trail, newest first.
    #[instrument(skip(self, caller), fields(order_id = %order_id))]
    pub async fn status_history(
        &self,
        order_id: Uuid,
        caller: &AuthUser,
    ) -> Result<Vec<StatusHistoryEntry>, ServiceError> {
        let db = &*self.db;
        let order = find_order(db, order_id).await?;
        if !caller.can_access(order.user_id) {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }

        let rows = order_status_history::Entity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_desc(order_status_history::Column::CreatedAt)
            .all(db)
            .await?;
        history_entries(db, rows).await
    }

    /// Loads the order, cancelling it first when its reservation lapsed.
    async fn open_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        if self.expiry.cancel_if_expired(&order).await? {
            return Err(ServiceError::InvalidStatus(
                "Order reservation has expired and the order was cancelled".to_string(),
            ));
        }
        Ok(order)
    }

    async fn ready_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let order = find_order(&*self.db, order_id).await?;
        if order.status != OrderStatus::Ready {
            return Err(ServiceError::InvalidStatus(format!(
                "Order must be ready for pickup, it is {}",
                order.status.as_str()
            )));
        }
        Ok(order)
    }

    async fn transition(
        &self,
        order: &order::Model,
        to: OrderStatus,
        changes: order::ActiveModel,
        actor: &AuthUser,
        note: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin transaction");
            ServiceError::DatabaseError(e)
        })?;

        let transition =
            apply_transition(&txn, order, to, changes, Some(actor.user_id), note).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order.id, "Failed to commit status change");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order.id,
            from = transition.from.as_str(),
            to = to.as_str(),
            "Order status updated"
        );
        publish_transition(self.event_sender.as_ref(), &transition).await;
        Ok(transition.order)
    }

    async fn publish_release(&self, order_id: Uuid, released_by: Uuid, manual: bool) {
        metrics::increment_counter(if manual {
            "orders_released_manually_total"
        } else {
            "orders_picked_up_total"
        });
        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderReleased {
                    order_id,
                    released_by,
                    manual,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use OrderStatus::*;

    #[rstest]
    #[case(Pending, Paid)]
    #[case(Paid, Processing)]
    #[case(Processing, Ready)]
    #[case(Ready, Completed)]
    #[case(Pending, Cancelled)]
    #[case(Paid, Cancelled)]
    #[case(Processing, Cancelled)]
    #[case(Ready, Cancelled)]
    fn allowed_transitions(#[case] from: OrderStatus, #[case] to: OrderStatus) {
        assert!(from.can_transition_to(to));
    }

    #[rstest]
    #[case(Pending, Processing)]
    #[case(Pending, Ready)]
    #[case(Pending, Completed)]
    #[case(Paid, Pending)]
    #[case(Paid, Ready)]
    #[case(Processing, Paid)]
    #[case(Ready, Processing)]
    #[case(Completed, Cancelled)]
    #[case(Cancelled, Pending)]
    #[case(Cancelled, Cancelled)]
    #[case(Ready, Ready)]
    fn rejected_transitions(#[case] from: OrderStatus, #[case] to: OrderStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[rstest]
    #[case(Pending, "Pending")]
    #[case(Paid, "Paid")]
    #[case(Processing, "Processing")]
    #[case(Ready, "Ready for pickup")]
    #[case(Completed, "Completed")]
    #[case(Cancelled, "Cancelled")]
    fn status_labels(#[case] status: OrderStatus, #[case] label: &str) {
        assert_eq!(status.label(), label);
    }

    #[test]
    fn terminal_statuses_have_no_exit() {
        use sea_orm::Iterable;
        for to in OrderStatus::iter() {
            assert!(!Completed.can_transition_to(to));
            assert!(!Cancelled.can_transition_to(to));
        }
    }
}

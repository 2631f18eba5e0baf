use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::{
        order::{self, OrderStatus, PaymentMethod},
        payment::{self, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        expiry::ExpiryService,
        money,
        order_status::{apply_transition, find_order, no_changes, publish_transition, Transition},
        total_pages,
    },
    PaginatedResponse,
};

/// Outcome reported by a payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentDecision {
    Approved,
    Rejected,
    /// Settles later, e.g. a boleto waiting to be paid at the bank.
    Pending,
}

impl PaymentDecision {
    fn status(self) -> PaymentStatus {
        match self {
            Self::Approved => PaymentStatus::Approved,
            Self::Rejected => PaymentStatus::Rejected,
            Self::Pending => PaymentStatus::Pending,
        }
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(
        &self,
        order: &order::Model,
        method: PaymentMethod,
    ) -> Result<PaymentDecision, ServiceError>;
}

/// Stand-in provider: approves with a fixed probability, boletos stay pending.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    approval_rate: f64,
}

impl SimulatedGateway {
    pub fn new(approval_rate: f64) -> Self {
        Self {
            approval_rate: approval_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn authorize(
        &self,
        _order: &order::Model,
        method: PaymentMethod,
    ) -> Result<PaymentDecision, ServiceError> {
        if method == PaymentMethod::Boleto {
            return Ok(PaymentDecision::Pending);
        }
        let approved = rand::thread_rng().gen_bool(self.approval_rate);
        Ok(if approved {
            PaymentDecision::Approved
        } else {
            PaymentDecision::Rejected
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub order_id: Uuid,
    /// Defaults to the method chosen at checkout.
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub order_id: Uuid,
    pub method: PaymentMethod,
    pub method_display: String,
    pub status: PaymentStatus,
    pub status_display: String,
    pub amount: Decimal,
    pub transaction_id: String,
    pub order_status: Option<OrderStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentResponse {
    fn new(model: payment::Model, order_status: Option<OrderStatus>) -> Self {
        Self {
            id: model.id,
            order_id: model.order_id,
            method: model.method,
            method_display: model.method.label().to_string(),
            status: model.status,
            status_display: model.status.label().to_string(),
            amount: money(model.amount),
            transaction_id: model.transaction_id,
            order_status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

fn transaction_id() -> String {
    format!("TXN-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

/// Payment capture against pending orders
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
    gateway: Arc<dyn PaymentGateway>,
    expiry: Arc<ExpiryService>,
}

impl PaymentService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: Option<Arc<EventSender>>,
        gateway: Arc<dyn PaymentGateway>,
        expiry: Arc<ExpiryService>,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            gateway,
            expiry,
        }
    }

    /// Charges a pending order once; the gateway decides the outcome.
    #[instrument(skip(self, caller, request), fields(order_id = %request.order_id))]
    pub async fn create_payment(
        &self,
        caller: &AuthUser,
        request: CreatePaymentRequest,
    ) -> Result<PaymentResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, request.order_id).await?;
        if !caller.can_access(order.user_id) {
            return Err(ServiceError::Forbidden(
                "You cannot pay for this order".to_string(),
            ));
        }
        if self.expiry.cancel_if_expired(&order).await? {
            return Err(ServiceError::BadRequest(
                "Order reservation has expired and the order was cancelled".to_string(),
            ));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Order is {}, only pending orders can be paid",
                order.status.as_str()
            )));
        }
        let existing = payment::Entity::find()
            .filter(payment::Column::OrderId.eq(order.id))
            .count(db)
            .await?;
        if existing > 0 {
            return Err(ServiceError::Conflict(
                "A payment already exists for this order".to_string(),
            ));
        }

        let method = request.payment_method.unwrap_or(order.payment_method);
        let decision = self.gateway.authorize(&order, method).await?;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin payment transaction");
            ServiceError::DatabaseError(e)
        })?;

        let created = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            method: Set(method),
            status: Set(decision.status()),
            amount: Set(order.total_amount),
            transaction_id: Set(transaction_id()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order.id, "Failed to record payment");
            ServiceError::DatabaseError(e)
        })?;

        let transition = match decision {
            PaymentDecision::Approved => Some(
                apply_transition(
                    &txn,
                    &order,
                    OrderStatus::Paid,
                    no_changes(),
                    Some(caller.user_id),
                    Some("Payment approved".to_string()),
                )
                .await?,
            ),
            PaymentDecision::Rejected => Some(
                apply_transition(
                    &txn,
                    &order,
                    OrderStatus::Cancelled,
                    no_changes(),
                    Some(caller.user_id),
                    Some("Payment rejected".to_string()),
                )
                .await?,
            ),
            PaymentDecision::Pending => None,
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order.id, "Failed to commit payment");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            payment_id = %created.id,
            status = created.status.as_str(),
            "Payment processed"
        );
        self.publish(&created, transition.as_ref()).await;

        let order_status = transition.map(|t| t.order.status).unwrap_or(order.status);
        Ok(PaymentResponse::new(created, Some(order_status)))
    }

    /// Settles a pending payment (boleto) as approved and marks the order paid.
    #[instrument(skip(self, caller), fields(payment_id = %payment_id))]
    pub async fn simulate_approval(
        &self,
        payment_id: Uuid,
        caller: &AuthUser,
    ) -> Result<PaymentResponse, ServiceError> {
        let db = &*self.db_pool;
        let existing = self.find(payment_id).await?;
        let order = find_order(db, existing.order_id).await?;
        if !caller.can_access(order.user_id) {
            return Err(ServiceError::NotFound(format!("Payment {} not found", payment_id)));
        }
        if existing.status != PaymentStatus::Pending {
            return Err(ServiceError::InvalidStatus(format!(
                "Payment is {}, only pending payments can be approved",
                existing.status.as_str()
            )));
        }
        if self.expiry.cancel_if_expired(&order).await? {
            warn!(payment_id = %payment_id, "payment arrived after the reservation expired");
            return Err(ServiceError::BadRequest(
                "Order reservation has expired and the order was cancelled".to_string(),
            ));
        }

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin approval transaction");
            ServiceError::DatabaseError(e)
        })?;

        let transition = apply_transition(
            &txn,
            &order,
            OrderStatus::Paid,
            no_changes(),
            Some(caller.user_id),
            Some("Payment approved".to_string()),
        )
        .await?;

        let mut active: payment::ActiveModel = existing.into();
        active.status = Set(PaymentStatus::Approved);
        let updated = active.update(&txn).await.map_err(|e| {
            error!(error = %e, payment_id = %payment_id, "Failed to approve payment");
            ServiceError::DatabaseError(e)
        })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, payment_id = %payment_id, "Failed to commit approval");
            ServiceError::DatabaseError(e)
        })?;

        info!(payment_id = %payment_id, "Payment approved");
        self.publish(&updated, Some(&transition)).await;
        Ok(PaymentResponse::new(updated, Some(transition.order.status)))
    }

    pub async fn get_payment(
        &self,
        payment_id: Uuid,
        caller: &AuthUser,
    ) -> Result<PaymentResponse, ServiceError> {
        let found = self.find(payment_id).await?;
        let order = find_order(&*self.db_pool, found.order_id).await?;
        if !caller.can_access(order.user_id) {
            return Err(ServiceError::NotFound(format!("Payment {} not found", payment_id)));
        }
        Ok(PaymentResponse::new(found, Some(order.status)))
    }

    /// Staff see every payment; customers only those for their own orders.
    pub async fn list_payments(
        &self,
        caller: &AuthUser,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<PaymentResponse>, ServiceError> {
        let db = &*self.db_pool;
        let mut select = payment::Entity::find().find_also_related(order::Entity);
        if !caller.is_admin() {
            select = select.filter(order::Column::UserId.eq(caller.user_id));
        }
        let paginator = select
            .order_by_desc(payment::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(PaginatedResponse {
            items: rows
                .into_iter()
                .map(|(p, o)| PaymentResponse::new(p, o.map(|o| o.status)))
                .collect(),
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    async fn find(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        payment::Entity::find_by_id(payment_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    async fn publish(&self, payment: &payment::Model, transition: Option<&Transition>) {
        match payment.status {
            PaymentStatus::Approved => metrics::increment_counter("payments_approved_total"),
            PaymentStatus::Rejected => metrics::increment_counter("payments_rejected_total"),
            _ => metrics::increment_counter("payments_pending_total"),
        }
        if let Some(transition) = transition {
            publish_transition(self.event_sender.as_ref(), transition).await;
        }
        let Some(sender) = &self.event_sender else {
            return;
        };
        let event = match payment.status {
            PaymentStatus::Approved => Event::PaymentApproved {
                payment_id: payment.id,
                order_id: payment.order_id,
            },
            PaymentStatus::Rejected => Event::PaymentRejected {
                payment_id: payment.id,
                order_id: payment.order_id,
            },
            _ => return,
        };
        sender.send_or_log(event).await;
    }
}

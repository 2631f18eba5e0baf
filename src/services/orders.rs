use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::{Condition, Expr, Func},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::{
        coupon,
        order::{self, OrderStatus, PaymentMethod},
        order_item, order_status_history, product, user,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    services::{
        coupons::find_by_code,
        expiry::ExpiryService,
        format_money, money,
        order_status::{
            apply_transition, find_order, no_changes, publish_transition, record_history,
            StatusHistoryEntry,
        },
        pickup::unique_pickup_code,
        total_pages, StoreSettings,
    },
    PaginatedResponse,
};

/// History rows embedded in an order payload.
const EMBEDDED_HISTORY: usize = 3;

const CHECKOUT_ATTEMPTS: u32 = 3;

/// Upper bound for the quantity of one product in a single order.
pub const MAX_LINE_QUANTITY: i32 = 999;

fn default_installments() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 999, message = "Quantity must be between 1 and 999"))]
    pub quantity: i32,
}

/// Checkout request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "An order needs at least one item"))]
    pub items: Vec<OrderItemRequest>,
    pub payment_method: PaymentMethod,
    #[serde(default = "default_installments")]
    pub installments: i32,
    pub coupon_code: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct OrderListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    /// Exact status, e.g. `ready`
    pub status: Option<String>,
    /// Matches the pickup code or the customer's username
    pub search: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i32,
    pub price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub username: Option<String>,
    pub status: OrderStatus,
    pub status_display: String,
    pub payment_method: PaymentMethod,
    pub payment_method_display: String,
    pub installments: i32,
    pub installment_value: Decimal,
    pub installment_display: String,
    pub subtotal_amount: Decimal,
    pub discount_amount: Decimal,
    pub total_amount: Decimal,
    pub coupon_id: Option<Uuid>,
    pub pickup_code: String,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub expires_at: DateTime<Utc>,
    pub is_expired: bool,
    /// Seconds left to pay; absent once the order left `pending`.
    pub time_remaining: Option<i64>,
    pub manual_release: bool,
    pub release_reason: Option<String>,
    pub release_image: Option<String>,
    pub released_by: Option<Uuid>,
    pub released_by_name: Option<String>,
    pub released_at: Option<DateTime<Utc>>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Value of each installment, rounded to cents.
pub fn installment_value(total: Decimal, installments: i32) -> Decimal {
    let n = Decimal::from(installments.max(1));
    (total / n).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn installment_display(symbol: &str, total: Decimal, installments: i32) -> String {
    if installments <= 1 {
        format!("Single payment: {}", format_money(symbol, total))
    } else {
        format!(
            "{}x of {}",
            installments,
            format_money(symbol, installment_value(total, installments))
        )
    }
}

/// Collapses repeated products into one line, keeping first-seen order.
pub fn merge_lines(items: &[OrderItemRequest]) -> Result<Vec<(Uuid, i32)>, ServiceError> {
    let mut merged: Vec<(Uuid, i32)> = Vec::with_capacity(items.len());
    for item in items {
        item.validate()?;
        match merged.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => {
                *quantity = quantity
                    .checked_add(item.quantity)
                    .filter(|total| *total <= MAX_LINE_QUANTITY)
                    .ok_or_else(|| {
                        ServiceError::ValidationError(format!(
                            "Quantity for product {} must not exceed {}",
                            item.product_id, MAX_LINE_QUANTITY
                        ))
                    })?;
            }
            None => merged.push((item.product_id, item.quantity)),
        }
    }
    if merged.is_empty() {
        return Err(ServiceError::ValidationError(
            "An order needs at least one item".to_string(),
        ));
    }
    Ok(merged)
}

/// One message per line that the current stock cannot serve.
pub fn unavailable_lines(lines: &[(product::Model, i32)]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|(product, quantity)| {
            if product.stock <= 0 {
                Some(format!("{}: sold out", product.name))
            } else if product.stock < *quantity {
                Some(format!(
                    "{}: requested {}, available {}",
                    product.name, quantity, product.stock
                ))
            } else {
                None
            }
        })
        .collect()
}

pub fn check_installments(
    method: PaymentMethod,
    installments: i32,
    max_installments: i32,
) -> Result<(), ServiceError> {
    if installments < 1 || installments > max_installments {
        return Err(ServiceError::ValidationError(format!(
            "Installments must be between 1 and {}",
            max_installments
        )));
    }
    if installments > 1 && !method.allows_installments() {
        return Err(ServiceError::ValidationError(
            "Installments are only available for credit card payments".to_string(),
        ));
    }
    Ok(())
}

/// Service for checkout and the customer-facing order views
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
    expiry: Arc<ExpiryService>,
    settings: StoreSettings,
}

impl OrderService {
    pub fn new(
        db_pool: Arc<DatabaseConnection>,
        event_sender: Option<Arc<EventSender>>,
        expiry: Arc<ExpiryService>,
        settings: StoreSettings,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            expiry,
            settings,
        }
    }

    /// Reserves stock and opens a pending order in a single transaction.
    ///
    /// A pickup code taken by a concurrent checkout between draw and insert
    /// rolls the whole transaction back and the checkout runs again.
    #[instrument(skip(self, request, customer), fields(user_id = %customer.user_id))]
    pub async fn create_order(
        &self,
        customer: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<OrderResponse, ServiceError> {
        for attempt in 1..=CHECKOUT_ATTEMPTS {
            if let Some(created) = self.try_create_order(customer, request.clone()).await? {
                return Ok(created);
            }
            warn!(attempt, "pickup code claimed concurrently, retrying checkout");
        }
        Err(ServiceError::Conflict(
            "Could not reserve a pickup code, please try again".to_string(),
        ))
    }

    /// `Ok(None)` means the drawn pickup code lost a race with another order.
    async fn try_create_order(
        &self,
        customer: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<Option<OrderResponse>, ServiceError> {
        request.validate()?;
        let lines = merge_lines(&request.items)?;
        check_installments(
            request.payment_method,
            request.installments,
            self.settings.max_installments,
        )?;

        let db = &*self.db_pool;
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let product_ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load products for order");
                ServiceError::DatabaseError(e)
            })?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut resolved = Vec::with_capacity(lines.len());
        for (product_id, quantity) in &lines {
            let product = products
                .get(product_id)
                .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;
            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} is not available",
                    product.name
                )));
            }
            resolved.push((product.clone(), *quantity));
        }

        let unavailable = unavailable_lines(&resolved);
        if !unavailable.is_empty() {
            metrics::increment_counter("orders_rejected_stock_total");
            warn!(lines = ?unavailable, "Order rejected for insufficient stock");
            return Err(ServiceError::InsufficientStock(unavailable.join("; ")));
        }

        // conditional decrement keeps stock >= 0 under concurrent checkouts
        for (product, quantity) in &resolved {
            let result = product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(*quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(now))
                .filter(product::Column::Id.eq(product.id))
                .filter(product::Column::Stock.gte(*quantity))
                .exec(&txn)
                .await?;
            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "{}: stock changed during checkout, please try again",
                    product.name
                )));
            }
        }

        let subtotal: Decimal = resolved
            .iter()
            .map(|(product, quantity)| product.price * Decimal::from(*quantity))
            .sum();

        let (coupon, discount) = match request
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        {
            Some(code) => {
                let coupon = self.redeem_coupon(&txn, code, subtotal, now).await?;
                let discount = coupon.discount_for(subtotal);
                (Some(coupon), discount)
            }
            None => (None, Decimal::ZERO),
        };

        let pickup_code = unique_pickup_code(&txn, self.settings.pickup_code_length).await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(customer.user_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(subtotal - discount),
            discount_amount: Set(discount),
            coupon_id: Set(coupon.as_ref().map(|c| c.id)),
            payment_method: Set(request.payment_method),
            installments: Set(request.installments),
            pickup_code: Set(pickup_code),
            notes: Set(request.notes.filter(|n| !n.trim().is_empty())),
            expires_at: Set(now + self.settings.reservation_window),
            manual_release: Set(false),
            release_reason: Set(None),
            release_image: Set(None),
            released_by: Set(None),
            released_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await;
        let order_model = match order_model {
            Ok(model) => model,
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, order_id = %order_id, "Failed to create order in database");
                return Err(ServiceError::DatabaseError(e));
            }
        };

        for (product, quantity) in &resolved {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                product_name: Set(product.name.clone()),
                product_image: Set(product.image.clone()),
                quantity: Set(*quantity),
                price: Set(product.price),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to create order item");
                ServiceError::DatabaseError(e)
            })?;
        }

        record_history(
            &txn,
            order_id,
            OrderStatus::Pending,
            Some(customer.user_id),
            Some("Order created".to_string()),
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            order_id = %order_id,
            user_id = %customer.user_id,
            total = %order_model.total_amount,
            "Order created successfully"
        );
        metrics::increment_counter("orders_created_total");

        if let Some(sender) = &self.event_sender {
            sender
                .send_or_log(Event::OrderCreated {
                    order_id,
                    user_id: customer.user_id,
                    total_amount: order_model.total_amount,
                })
                .await;
            if let Some(coupon) = &coupon {
                sender
                    .send_or_log(Event::CouponRedeemed {
                        coupon_id: coupon.id,
                        order_id,
                    })
                    .await;
            }
        }

        self.view(order_model).await.map(Some)
    }

    /// Retrieves an order visible to `caller`, expiring it first if due.
    #[instrument(skip(self, caller), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        caller: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let mut order = find_order(db, order_id).await?;
        if !caller.can_access(order.user_id) {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        if self.expiry.cancel_if_expired(&order).await? {
            order = find_order(db, order_id).await?;
        }
        self.view(order).await
    }

    /// Lists orders with pagination; staff see every order.
    #[instrument(skip(self, caller, query))]
    pub async fn list_orders(
        &self,
        caller: &AuthUser,
        query: OrderListQuery,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<OrderResponse>, ServiceError> {
        self.expiry.cancel_expired_orders().await?;
        let db = &*self.db_pool;

        let mut select = order::Entity::find();
        if !caller.is_admin() {
            select = select.filter(order::Column::UserId.eq(caller.user_id));
        }
        if let Some(status) = query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let status = OrderStatus::from_str(&status.to_lowercase()).map_err(|_| {
                ServiceError::ValidationError(format!("Unknown order status: {}", status))
            })?;
            select = select.filter(order::Column::Status.eq(status));
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search.to_lowercase());
            select = select
                .join(JoinType::InnerJoin, order::Relation::User.def())
                .filter(
                    Condition::any()
                        .add(
                            Expr::expr(Func::lower(Expr::col((
                                order::Entity,
                                order::Column::PickupCode,
                            ))))
                            .like(pattern.clone()),
                        )
                        .add(
                            Expr::expr(Func::lower(Expr::col((
                                user::Entity,
                                user::Column::Username,
                            ))))
                            .like(pattern),
                        ),
                );
        }

        let paginator = select
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await.map_err(|e| {
            error!(error = %e, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(PaginatedResponse {
            items: self.views(orders).await?,
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    /// The caller's own orders, newest first.
    #[instrument(skip(self, caller), fields(user_id = %caller.user_id))]
    pub async fn my_orders(&self, caller: &AuthUser) -> Result<Vec<OrderResponse>, ServiceError> {
        self.expiry.cancel_expired_orders().await?;
        let orders = order::Entity::find()
            .filter(order::Column::UserId.eq(caller.user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?;
        self.views(orders).await
    }

    /// Cancels a pending order and returns its stock.
    #[instrument(skip(self, caller), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        caller: &AuthUser,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let order = find_order(db, order_id).await?;
        if !caller.can_access(order.user_id) {
            return Err(ServiceError::NotFound(format!("Order {} not found", order_id)));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidStatus(
                "Only pending orders can be cancelled".to_string(),
            ));
        }

        let note = if caller.user_id == order.user_id {
            "Cancelled by customer"
        } else {
            "Cancelled by staff"
        };

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin cancellation transaction");
            ServiceError::DatabaseError(e)
        })?;
        let transition = apply_transition(
            &txn,
            &order,
            OrderStatus::Cancelled,
            no_changes(),
            Some(caller.user_id),
            Some(note.to_string()),
        )
        .await?;
        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit cancellation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order_id, "Order cancelled, stock returned");
        publish_transition(self.event_sender.as_ref(), &transition).await;
        self.view(transition.order).await
    }

    pub async fn view(&self, order: order::Model) -> Result<OrderResponse, ServiceError> {
        self.views(vec![order])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Order view could not be built".into()))
    }

    pub async fn views(&self, orders: Vec<order::Model>) -> Result<Vec<OrderResponse>, ServiceError> {
        build_order_responses(&*self.db_pool, orders, &self.settings).await
    }

    async fn redeem_coupon<C>(
        &self,
        db: &C,
        code: &str,
        subtotal: Decimal,
        now: DateTime<Utc>,
    ) -> Result<coupon::Model, ServiceError>
    where
        C: ConnectionTrait,
    {
        let coupon = find_by_code(db, code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", code)))?;
        coupon
            .check_validity(now, subtotal)
            .map_err(ServiceError::ValidationError)?;

        let result = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .filter(coupon::Column::Id.eq(coupon.id))
            .filter(
                Condition::any()
                    .add(coupon::Column::MaxUses.is_null())
                    .add(Expr::col(coupon::Column::UsedCount).lt(Expr::col(coupon::Column::MaxUses))),
            )
            .exec(db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ValidationError(
                "Coupon usage limit reached".to_string(),
            ));
        }
        Ok(coupon)
    }
}

/// Loads items, recent history and user names for a batch of orders.
pub(crate) async fn build_order_responses<C>(
    db: &C,
    orders: Vec<order::Model>,
    settings: &StoreSettings,
) -> Result<Vec<OrderResponse>, ServiceError>
where
    C: ConnectionTrait,
{
    if orders.is_empty() {
        return Ok(Vec::new());
    }
    let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

    let mut items: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
    for item in order_item::Entity::find()
        .filter(order_item::Column::OrderId.is_in(order_ids.clone()))
        .all(db)
        .await?
    {
        items.entry(item.order_id).or_default().push(item);
    }

    let mut history: HashMap<Uuid, Vec<order_status_history::Model>> = HashMap::new();
    for row in order_status_history::Entity::find()
        .filter(order_status_history::Column::OrderId.is_in(order_ids))
        .order_by_desc(order_status_history::Column::CreatedAt)
        .all(db)
        .await?
    {
        let rows = history.entry(row.order_id).or_default();
        if rows.len() < EMBEDDED_HISTORY {
            rows.push(row);
        }
    }

    let mut user_ids: Vec<Uuid> = orders
        .iter()
        .flat_map(|o| std::iter::once(o.user_id).chain(o.released_by))
        .chain(history.values().flatten().filter_map(|h| h.changed_by))
        .collect();
    user_ids.sort();
    user_ids.dedup();
    let names: HashMap<Uuid, String> = user::Entity::find()
        .filter(user::Column::Id.is_in(user_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|u| (u.id, u.username))
        .collect();

    let now = Utc::now();
    Ok(orders
        .into_iter()
        .map(|order| {
            let order_items: Vec<OrderItemResponse> = items
                .remove(&order.id)
                .unwrap_or_default()
                .into_iter()
                .map(|item| OrderItemResponse {
                    subtotal: money(item.subtotal()),
                    id: item.id,
                    product_id: item.product_id,
                    product_name: item.product_name,
                    product_image: item.product_image,
                    quantity: item.quantity,
                    price: money(item.price),
                })
                .collect();
            let status_history = history
                .remove(&order.id)
                .unwrap_or_default()
                .into_iter()
                .map(|row| StatusHistoryEntry::from_row(row, &names))
                .collect();
            let total = money(order.total_amount);

            OrderResponse {
                id: order.id,
                user_id: order.user_id,
                username: names.get(&order.user_id).cloned(),
                status: order.status,
                status_display: order.status.label().to_string(),
                payment_method: order.payment_method,
                payment_method_display: order.payment_method.label().to_string(),
                installments: order.installments,
                installment_value: money(installment_value(total, order.installments)),
                installment_display: installment_display(
                    &settings.currency_symbol,
                    total,
                    order.installments,
                ),
                subtotal_amount: money(order.total_amount + order.discount_amount),
                discount_amount: money(order.discount_amount),
                total_amount: total,
                coupon_id: order.coupon_id,
                is_expired: order.is_expired_at(now),
                time_remaining: order.time_remaining_at(now),
                pickup_code: order.pickup_code,
                notes: order.notes,
                items: order_items,
                expires_at: order.expires_at,
                manual_release: order.manual_release,
                release_reason: order.release_reason,
                release_image: order.release_image,
                released_by_name: order.released_by.and_then(|id| names.get(&id).cloned()),
                released_by: order.released_by,
                released_at: order.released_at,
                status_history,
                created_at: order.created_at,
                updated_at: order.updated_at,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    fn product(name: &str, stock: i32) -> product::Model {
        let now = Utc::now();
        product::Model {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            price: dec!(10.00),
            stock,
            category_id: None,
            image: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test_case(dec!(100.00), 1 => "Single payment: R$ 100.00" ; "single")]
    #[test_case(dec!(100.00), 3 => "3x of R$ 33.33" ; "three")]
    #[test_case(dec!(1999.90), 10 => "10x of R$ 199.99" ; "ten")]
    #[test_case(dec!(50), 2 => "2x of R$ 25.00" ; "whole amount")]
    fn installment_text(total: Decimal, n: i32) -> String {
        installment_display("R$", total, n)
    }

    #[test]
    fn installments_require_credit_card() {
        assert!(check_installments(PaymentMethod::CreditCard, 12, 12).is_ok());
        assert!(check_installments(PaymentMethod::Pix, 1, 12).is_ok());
        assert_matches!(
            check_installments(PaymentMethod::Pix, 2, 12),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            check_installments(PaymentMethod::CreditCard, 13, 12),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(
            check_installments(PaymentMethod::CreditCard, 0, 12),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn duplicate_lines_are_merged() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let items = vec![
            OrderItemRequest { product_id: a, quantity: 1 },
            OrderItemRequest { product_id: b, quantity: 2 },
            OrderItemRequest { product_id: a, quantity: 3 },
        ];
        assert_eq!(merge_lines(&items).unwrap(), vec![(a, 4), (b, 2)]);
    }

    #[test]
    fn empty_or_zero_quantity_rejected() {
        assert_matches!(merge_lines(&[]), Err(ServiceError::ValidationError(_)));
        let items = vec![OrderItemRequest {
            product_id: Uuid::new_v4(),
            quantity: 0,
        }];
        assert_matches!(merge_lines(&items), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn merged_quantity_is_bounded() {
        let id = Uuid::new_v4();
        let huge = vec![
            OrderItemRequest { product_id: id, quantity: i32::MAX },
            OrderItemRequest { product_id: id, quantity: i32::MAX },
        ];
        assert_matches!(merge_lines(&huge), Err(ServiceError::ValidationError(_)));

        let split = vec![
            OrderItemRequest { product_id: id, quantity: 600 },
            OrderItemRequest { product_id: id, quantity: 600 },
        ];
        assert_matches!(merge_lines(&split), Err(ServiceError::ValidationError(_)));

        let at_limit = vec![
            OrderItemRequest { product_id: id, quantity: 500 },
            OrderItemRequest { product_id: id, quantity: MAX_LINE_QUANTITY - 500 },
        ];
        assert_eq!(merge_lines(&at_limit).unwrap(), vec![(id, MAX_LINE_QUANTITY)]);
    }

    #[test]
    fn unavailable_lines_name_every_offender() {
        let lines = vec![
            (product("Headphones", 0), 1),
            (product("Notebook", 2), 5),
            (product("Speaker", 9), 9),
        ];
        assert_eq!(
            unavailable_lines(&lines),
            vec![
                "Headphones: sold out".to_string(),
                "Notebook: requested 5, available 2".to_string(),
            ]
        );
    }
}

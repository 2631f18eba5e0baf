use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub total_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub discount_amount: Decimal,
    pub coupon_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    pub installments: i32,
    pub pickup_code: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub manual_release: bool,
    #[sea_orm(column_type = "Text", nullable)]
    pub release_reason: Option<String>,
    pub release_image: Option<String>,
    pub released_by: Option<Uuid>,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// A pending order whose reservation window has elapsed.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Pending && now > self.expires_at
    }

    /// Whole seconds left in the reservation window, `None` once the order left `pending`.
    pub fn time_remaining_at(&self, now: DateTime<Utc>) -> Option<i64> {
        (self.status == OrderStatus::Pending)
            .then(|| (self.expires_at - now).num_seconds().max(0))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id",
        on_delete = "Cascade"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::coupon::Entity",
        from = "Column::CouponId",
        to = "super::coupon::Column::Id",
        on_delete = "SetNull"
    )]
    Coupon,
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::order_status_history::Entity")]
    StatusHistory,
    #[sea_orm(has_one = "super::payment::Entity")]
    Payment,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupon.def()
    }
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            self.updated_at = Set(Utc::now());
        }
        Ok(self)
    }
}

/// Order lifecycle status
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Paid => "Paid",
            Self::Processing => "Processing",
            Self::Ready => "Ready for pickup",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Statuses in which the customer has already paid.
    pub fn is_paid(&self) -> bool {
        matches!(self, Self::Paid | Self::Processing | Self::Ready)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "pix")]
    Pix,
    #[sea_orm(string_value = "credit_card")]
    CreditCard,
    #[sea_orm(string_value = "debit_card")]
    DebitCard,
    #[sea_orm(string_value = "boleto")]
    Boleto,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &str {
        self.as_ref()
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pix => "PIX",
            Self::CreditCard => "Credit card",
            Self::DebitCard => "Debit card",
            Self::Boleto => "Boleto",
        }
    }

    pub fn allows_installments(&self) -> bool {
        matches!(self, Self::CreditCard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn pending_order(expires_at: DateTime<Utc>) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            total_amount: dec!(100.00),
            discount_amount: Decimal::ZERO,
            coupon_id: None,
            payment_method: PaymentMethod::Pix,
            installments: 1,
            pickup_code: "ABC234".into(),
            notes: None,
            expires_at,
            manual_release: false,
            release_reason: None,
            release_image: None,
            released_by: None,
            released_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn time_remaining_counts_down_while_pending() {
        let now = Utc::now();
        let order = pending_order(now + Duration::seconds(90));
        assert_eq!(order.time_remaining_at(now), Some(90));
        assert!(!order.is_expired_at(now));
    }

    #[test]
    fn time_remaining_never_negative() {
        let now = Utc::now();
        let order = pending_order(now - Duration::seconds(5));
        assert_eq!(order.time_remaining_at(now), Some(0));
        assert!(order.is_expired_at(now));
    }

    #[test]
    fn paid_orders_have_no_timer_and_never_expire() {
        let now = Utc::now();
        let mut order = pending_order(now - Duration::minutes(30));
        order.status = OrderStatus::Paid;
        assert_eq!(order.time_remaining_at(now), None);
        assert!(!order.is_expired_at(now));
    }

    #[test]
    fn status_parses_from_wire_value() {
        assert_eq!(OrderStatus::from_str("ready").unwrap(), OrderStatus::Ready);
        assert_eq!(OrderStatus::Ready.as_str(), "ready");
        assert!(OrderStatus::from_str("shipped").is_err());
        assert_eq!(
            PaymentMethod::from_str("credit_card").unwrap(),
            PaymentMethod::CreditCard
        );
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub discount_type: DiscountType,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub discount_value: Decimal,
    #[sea_orm(column_type = "Decimal(Some((10, 2)))")]
    pub min_purchase: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Checks whether the coupon can be applied to a purchase of `total` at `now`.
    /// The error carries the reason shown to the customer.
    pub fn check_validity(&self, now: DateTime<Utc>, total: Decimal) -> Result<(), String> {
        if !self.is_active {
            return Err("Coupon is inactive".to_string());
        }
        if now < self.valid_from {
            return Err("Coupon is not yet valid".to_string());
        }
        if now > self.valid_until {
            return Err("Coupon has expired".to_string());
        }
        if let Some(max_uses) = self.max_uses {
            if self.used_count >= max_uses {
                return Err("Coupon usage limit reached".to_string());
            }
        }
        if total < self.min_purchase {
            return Err(format!(
                "Minimum purchase of {} required",
                self.min_purchase.round_dp(2)
            ));
        }
        Ok(())
    }

    /// Discount for `total`, never more than the total itself.
    pub fn discount_for(&self, total: Decimal) -> Decimal {
        let raw = match self.discount_type {
            DiscountType::Percentage => total * self.discount_value / Decimal::ONE_HUNDRED,
            DiscountType::Fixed => self.discount_value,
        };
        raw.min(total)
            .max(Decimal::ZERO)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

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
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn coupon(discount_type: DiscountType, value: Decimal) -> Model {
        let now = Utc::now();
        Model {
            id: Uuid::new_v4(),
            code: "WELCOME10".into(),
            description: "Welcome".into(),
            discount_type,
            discount_value: value,
            min_purchase: dec!(50.00),
            max_uses: Some(2),
            used_count: 0,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: true,
            created_at: now,
        }
    }

    #[test]
    fn percentage_discount_is_rounded_to_cents() {
        let c = coupon(DiscountType::Percentage, dec!(15));
        assert_eq!(c.discount_for(dec!(99.99)), dec!(15.00));
    }

    #[test]
    fn fixed_discount_is_capped_at_total() {
        let c = coupon(DiscountType::Fixed, dec!(80.00));
        assert_eq!(c.discount_for(dec!(60.00)), dec!(60.00));
    }

    #[test]
    fn validity_reasons() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, dec!(10));
        assert!(c.check_validity(now, dec!(100)).is_ok());

        assert_eq!(
            c.check_validity(now, dec!(10)).unwrap_err(),
            "Minimum purchase of 50.00 required"
        );

        c.used_count = 2;
        assert_eq!(
            c.check_validity(now, dec!(100)).unwrap_err(),
            "Coupon usage limit reached"
        );

        c.used_count = 0;
        c.valid_until = now - Duration::hours(1);
        assert_eq!(
            c.check_validity(now, dec!(100)).unwrap_err(),
            "Coupon has expired"
        );

        c.valid_until = now + Duration::hours(1);
        c.is_active = false;
        assert_eq!(
            c.check_validity(now, dec!(100)).unwrap_err(),
            "Coupon is inactive"
        );
    }
}

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::coupon::{self, DiscountType},
    errors::ServiceError,
    services::{money, total_pages},
    PaginatedResponse,
};

fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must_be_positive"));
    }
    Ok(())
}

fn validate_not_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

/// Codes are stored upper-case so lookups are case-insensitive.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

pub(crate) async fn find_by_code<C>(db: &C, code: &str) -> Result<Option<coupon::Model>, ServiceError>
where
    C: ConnectionTrait,
{
    Ok(coupon::Entity::find()
        .filter(coupon::Column::Code.eq(normalize_code(code)))
        .one(db)
        .await?)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCouponRequest {
    #[validate(length(min = 3, max = 50))]
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    #[validate(custom = "validate_positive")]
    pub discount_value: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_not_negative")]
    pub min_purchase: Decimal,
    #[validate(range(min = 1))]
    pub max_uses: Option<i32>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCouponRequest {
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    #[validate(custom = "validate_positive")]
    pub discount_value: Option<Decimal>,
    #[validate(custom = "validate_not_negative")]
    pub min_purchase: Option<Decimal>,
    #[validate(range(min = 1))]
    pub max_uses: Option<i32>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1))]
    pub code: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponValidation {
    pub valid: bool,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub discount_amount: Decimal,
    pub final_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CouponResponse {
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub min_purchase: Decimal,
    pub max_uses: Option<i32>,
    pub used_count: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub is_valid: bool,
    pub created_at: DateTime<Utc>,
}

impl From<coupon::Model> for CouponResponse {
    fn from(model: coupon::Model) -> Self {
        // validity ignoring the minimum purchase, which depends on the cart
        let is_valid = model.check_validity(Utc::now(), model.min_purchase).is_ok();
        Self {
            id: model.id,
            code: model.code,
            description: model.description,
            discount_type: model.discount_type,
            discount_value: money(model.discount_value),
            min_purchase: money(model.min_purchase),
            max_uses: model.max_uses,
            used_count: model.used_count,
            valid_from: model.valid_from,
            valid_until: model.valid_until,
            is_active: model.is_active,
            is_valid,
            created_at: model.created_at,
        }
    }
}

/// Discount coupon administration and checkout validation
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_coupon(
        &self,
        request: CreateCouponRequest,
    ) -> Result<CouponResponse, ServiceError> {
        request.validate()?;
        check_window(request.valid_from, request.valid_until)?;
        check_percentage(request.discount_type, request.discount_value)?;

        let db = &*self.db;
        let code = normalize_code(&request.code);
        if find_by_code(db, &code).await?.is_some() {
            return Err(ServiceError::Conflict(format!("Coupon {} already exists", code)));
        }

        let created = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            discount_value: Set(request.discount_value),
            min_purchase: Set(request.min_purchase),
            max_uses: Set(request.max_uses),
            used_count: Set(0),
            valid_from: Set(request.valid_from),
            valid_until: Set(request.valid_until),
            is_active: Set(request.is_active),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create coupon");
            ServiceError::DatabaseError(e)
        })?;

        info!(coupon_id = %created.id, "Coupon created");
        Ok(created.into())
    }

    pub async fn get_coupon(&self, id: Uuid) -> Result<CouponResponse, ServiceError> {
        Ok(self.find(id).await?.into())
    }

    pub async fn list_coupons(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<CouponResponse>, ServiceError> {
        let paginator = coupon::Entity::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(PaginatedResponse {
            items: items.into_iter().map(CouponResponse::from).collect(),
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update_coupon(
        &self,
        id: Uuid,
        request: UpdateCouponRequest,
    ) -> Result<CouponResponse, ServiceError> {
        request.validate()?;
        let existing = self.find(id).await?;

        check_window(
            request.valid_from.unwrap_or(existing.valid_from),
            request.valid_until.unwrap_or(existing.valid_until),
        )?;
        check_percentage(
            request.discount_type.unwrap_or(existing.discount_type),
            request.discount_value.unwrap_or(existing.discount_value),
        )?;

        let mut active: coupon::ActiveModel = existing.into();
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(discount_type) = request.discount_type {
            active.discount_type = Set(discount_type);
        }
        if let Some(value) = request.discount_value {
            active.discount_value = Set(value);
        }
        if let Some(min_purchase) = request.min_purchase {
            active.min_purchase = Set(min_purchase);
        }
        if request.max_uses.is_some() {
            active.max_uses = Set(request.max_uses);
        }
        if let Some(valid_from) = request.valid_from {
            active.valid_from = Set(valid_from);
        }
        if let Some(valid_until) = request.valid_until {
            active.valid_until = Set(valid_until);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, coupon_id = %id, "Failed to update coupon");
            ServiceError::DatabaseError(e)
        })?;
        Ok(updated.into())
    }

    pub async fn delete_coupon(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = coupon::Entity::delete_by_id(id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Coupon {} not found", id)));
        }
        info!(coupon_id = %id, "Coupon deleted");
        Ok(())
    }

    pub async fn toggle_active(&self, id: Uuid) -> Result<CouponResponse, ServiceError> {
        let existing = self.find(id).await?;
        let is_active = !existing.is_active;
        let mut active: coupon::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        let updated = active.update(&*self.db).await?;
        info!(coupon_id = %id, is_active, "Coupon toggled");
        Ok(updated.into())
    }

    /// Previews a coupon against a cart total without redeeming it.
    #[instrument(skip(self, request))]
    pub async fn validate_coupon(
        &self,
        request: ValidateCouponRequest,
    ) -> Result<CouponValidation, ServiceError> {
        request.validate()?;
        let coupon = find_by_code(&*self.db, &request.code)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Coupon {} not found", normalize_code(&request.code)))
            })?;

        coupon
            .check_validity(Utc::now(), request.total)
            .map_err(ServiceError::ValidationError)?;

        let discount = coupon.discount_for(request.total);
        Ok(CouponValidation {
            valid: true,
            code: coupon.code,
            discount_type: coupon.discount_type,
            discount_value: money(coupon.discount_value),
            discount_amount: money(discount),
            final_total: money(request.total - discount),
        })
    }

    async fn find(&self, id: Uuid) -> Result<coupon::Model, ServiceError> {
        coupon::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", id)))
    }
}

fn check_window(from: DateTime<Utc>, until: DateTime<Utc>) -> Result<(), ServiceError> {
    if until <= from {
        return Err(ServiceError::ValidationError(
            "valid_until must be after valid_from".to_string(),
        ));
    }
    Ok(())
}

fn check_percentage(discount_type: DiscountType, value: Decimal) -> Result<(), ServiceError> {
    if discount_type == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Percentage discounts cannot exceed 100".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn codes_are_case_insensitive() {
        assert_eq!(normalize_code("  welcome10 "), "WELCOME10");
    }

    #[test]
    fn percentage_above_hundred_rejected() {
        assert!(check_percentage(DiscountType::Percentage, dec!(100)).is_ok());
        assert!(check_percentage(DiscountType::Percentage, dec!(101)).is_err());
        assert!(check_percentage(DiscountType::Fixed, dec!(500)).is_ok());
    }

    #[test]
    fn window_must_be_ordered() {
        let now = Utc::now();
        assert!(check_window(now, now + chrono::Duration::days(1)).is_ok());
        assert!(check_window(now, now).is_err());
    }
}

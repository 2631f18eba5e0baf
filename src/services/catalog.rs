use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::{
    entities::{category, order_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{money, total_pages},
    PaginatedResponse,
};

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    #[default]
    All,
    InStock,
    OutOfStock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActiveStatus {
    All,
    #[default]
    Active,
    Inactive,
}

/// Query filters for the product listing
#[derive(Debug, Clone, Default, Serialize, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductFilter {
    /// Case-insensitive substring of the product name
    pub search: Option<String>,
    pub category: Option<Uuid>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub stock_status: Option<StockStatus>,
    /// Only honored for staff; everyone else sees active products
    pub active_status: Option<ActiveStatus>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductFilter {
    /// Builds the WHERE clause. Non-staff callers are pinned to active products.
    pub fn condition(&self, is_admin: bool) -> Condition {
        let mut condition = Condition::all();

        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            condition = condition.add(
                Expr::expr(Func::lower(Expr::col((product::Entity, product::Column::Name))))
                    .like(format!("%{}%", search.to_lowercase())),
            );
        }
        if let Some(category_id) = self.category {
            condition = condition.add(product::Column::CategoryId.eq(category_id));
        }
        if let Some(min) = self.min_price {
            condition = condition.add(product::Column::Price.gte(min));
        }
        if let Some(max) = self.max_price {
            condition = condition.add(product::Column::Price.lte(max));
        }
        match self.stock_status.unwrap_or_default() {
            StockStatus::All => {}
            StockStatus::InStock => condition = condition.add(product::Column::Stock.gt(0)),
            StockStatus::OutOfStock => condition = condition.add(product::Column::Stock.lte(0)),
        }

        let active = if is_admin {
            self.active_status.unwrap_or(ActiveStatus::All)
        } else {
            ActiveStatus::Active
        };
        match active {
            ActiveStatus::All => {}
            ActiveStatus::Active => condition = condition.add(product::Column::IsActive.eq(true)),
            ActiveStatus::Inactive => {
                condition = condition.add(product::Column::IsActive.eq(false))
            }
        }

        condition
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCategoryRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub product_count: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub category_id: Option<Uuid>,
    pub image: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub category_id: Option<Uuid>,
    pub image: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub stock: i32,
    pub in_stock: bool,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,
    pub image: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductResponse {
    fn new(model: product::Model, category_name: Option<String>) -> Self {
        Self {
            in_stock: model.in_stock(),
            id: model.id,
            name: model.name,
            description: model.description,
            price: money(model.price),
            stock: model.stock,
            category_id: model.category_id,
            category_name,
            image: model.image,
            is_active: model.is_active,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Categories and products
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    pub async fn list_categories(&self) -> Result<Vec<CategoryResponse>, ServiceError> {
        let db = &*self.db;
        let categories = category::Entity::find()
            .order_by_asc(category::Column::Name)
            .all(db)
            .await?;

        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        for p in product::Entity::find()
            .filter(product::Column::CategoryId.is_not_null())
            .filter(product::Column::IsActive.eq(true))
            .all(db)
            .await?
        {
            if let Some(category_id) = p.category_id {
                *counts.entry(category_id).or_default() += 1;
            }
        }

        Ok(categories
            .into_iter()
            .map(|c| CategoryResponse {
                product_count: counts.get(&c.id).copied().unwrap_or(0),
                id: c.id,
                name: c.name,
                description: c.description,
                created_at: c.created_at,
            })
            .collect())
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_category(
        &self,
        request: CreateCategoryRequest,
    ) -> Result<CategoryResponse, ServiceError> {
        request.validate()?;
        let db = &*self.db;
        let name = request.name.trim().to_string();

        let exists = category::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col((category::Entity, category::Column::Name))))
                    .eq(name.to_lowercase()),
            )
            .count(db)
            .await?;
        if exists > 0 {
            return Err(ServiceError::Conflict(format!("Category {} already exists", name)));
        }

        let created = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(request.description),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create category");
            ServiceError::DatabaseError(e)
        })?;

        info!(category_id = %created.id, "Category created");
        Ok(CategoryResponse {
            id: created.id,
            name: created.name,
            description: created.description,
            product_count: 0,
            created_at: created.created_at,
        })
    }

    /// Deletes a category; its products stay in the catalog uncategorized.
    pub async fn delete_category(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        product::Entity::update_many()
            .col_expr(product::Column::CategoryId, Expr::value(Option::<Uuid>::None))
            .filter(product::Column::CategoryId.eq(id))
            .exec(db)
            .await?;
        let result = category::Entity::delete_by_id(id).exec(db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Category {} not found", id)));
        }
        info!(category_id = %id, "Category deleted");
        Ok(())
    }

    #[instrument(skip(self, filter))]
    pub async fn list_products(
        &self,
        filter: &ProductFilter,
        is_admin: bool,
        page: u64,
        limit: u64,
    ) -> Result<PaginatedResponse<ProductResponse>, ServiceError> {
        let paginator = product::Entity::find()
            .filter(filter.condition(is_admin))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count products");
            ServiceError::DatabaseError(e)
        })?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok(PaginatedResponse {
            items: self.with_categories(products).await?,
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        })
    }

    /// Inactive products are hidden from everyone but staff.
    pub async fn get_product(&self, id: Uuid, is_admin: bool) -> Result<ProductResponse, ServiceError> {
        let found = self.find(id).await?;
        if !found.is_active && !is_admin {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }
        self.one_with_category(found).await
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_product(
        &self,
        request: CreateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request.validate()?;
        if let Some(category_id) = request.category_id {
            self.ensure_category(category_id).await?;
        }

        let now = Utc::now();
        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name.trim().to_string()),
            description: Set(request.description),
            price: Set(request.price),
            stock: Set(request.stock),
            category_id: Set(request.category_id),
            image: Set(request.image),
            is_active: Set(request.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = %created.id, "Product created");
        self.changed(created.id).await;
        self.one_with_category(created).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<ProductResponse, ServiceError> {
        request.validate()?;
        let existing = self.find(id).await?;
        if let Some(category_id) = request.category_id {
            self.ensure_category(category_id).await?;
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(stock) = request.stock {
            active.stock = Set(stock);
        }
        if request.category_id.is_some() {
            active.category_id = Set(request.category_id);
        }
        if request.image.is_some() {
            active.image = Set(request.image);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(&*self.db).await.map_err(|e| {
            error!(error = %e, product_id = %id, "Failed to update product");
            ServiceError::DatabaseError(e)
        })?;
        self.changed(id).await;
        self.one_with_category(updated).await
    }

    /// Products that appear on any order are kept for the order history.
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db;
        self.find(id).await?;
        let referenced = order_item::Entity::find()
            .filter(order_item::Column::ProductId.eq(id))
            .count(db)
            .await?;
        if referenced > 0 {
            return Err(ServiceError::Conflict(
                "Product has orders; deactivate it instead".to_string(),
            ));
        }
        product::Entity::delete_by_id(id).exec(db).await?;
        info!(product_id = %id, "Product deleted");
        self.changed(id).await;
        Ok(())
    }

    pub async fn toggle_active(&self, id: Uuid) -> Result<ProductResponse, ServiceError> {
        let existing = self.find(id).await?;
        let is_active = !existing.is_active;
        let mut active: product::ActiveModel = existing.into();
        active.is_active = Set(is_active);
        let updated = active.update(&*self.db).await?;
        info!(product_id = %id, is_active, "Product toggled");
        self.changed(id).await;
        self.one_with_category(updated).await
    }

    async fn find(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    async fn ensure_category(&self, id: Uuid) -> Result<(), ServiceError> {
        category::Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::ValidationError(format!("Category {} does not exist", id)))
    }

    async fn one_with_category(&self, model: product::Model) -> Result<ProductResponse, ServiceError> {
        self.with_categories(vec![model])
            .await?
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Product view could not be built".into()))
    }

    async fn with_categories(
        &self,
        products: Vec<product::Model>,
    ) -> Result<Vec<ProductResponse>, ServiceError> {
        let ids: Vec<Uuid> = products.iter().filter_map(|p| p.category_id).collect();
        let names: HashMap<Uuid, String> = if ids.is_empty() {
            HashMap::new()
        } else {
            category::Entity::find()
                .filter(category::Column::Id.is_in(ids))
                .all(&*self.db)
                .await?
                .into_iter()
                .map(|c| (c.id, c.name))
                .collect()
        };

        Ok(products
            .into_iter()
            .map(|p| {
                let name = p.category_id.and_then(|id| names.get(&id).cloned());
                ProductResponse::new(p, name)
            })
            .collect())
    }

    async fn changed(&self, product_id: Uuid) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(Event::ProductChanged(product_id)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use sea_orm::{DbBackend, QueryTrait};

    fn sql(filter: &ProductFilter, is_admin: bool) -> String {
        product::Entity::find()
            .filter(filter.condition(is_admin))
            .build(DbBackend::Sqlite)
            .to_string()
    }

    #[test]
    fn customers_only_see_active_products() {
        let filter = ProductFilter {
            active_status: Some(ActiveStatus::All),
            ..Default::default()
        };
        assert!(sql(&filter, false).contains(r#""products"."is_active" ="#));
        assert!(!sql(&filter, true).contains(r#""products"."is_active" ="#));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let filter = ProductFilter {
            search: Some("  PhOnE ".into()),
            ..Default::default()
        };
        let query = sql(&filter, false);
        assert!(query.contains("LOWER("));
        assert!(query.contains("LIKE '%phone%'"));
    }

    #[test]
    fn price_range_and_stock_status() {
        let filter = ProductFilter {
            min_price: Some(dec!(10)),
            max_price: Some(dec!(99.90)),
            stock_status: Some(StockStatus::OutOfStock),
            category: Some(Uuid::nil()),
            ..Default::default()
        };
        let query = sql(&filter, true);
        assert!(query.contains(r#""products"."price" >="#));
        assert!(query.contains(r#""products"."price" <="#));
        assert!(query.contains(r#""products"."stock" <= 0"#));
        assert!(query.contains(r#""products"."category_id" ="#));
    }

    #[test]
    fn stock_filter_in_stock() {
        let filter = ProductFilter {
            stock_status: Some(StockStatus::InStock),
            ..Default::default()
        };
        assert!(sql(&filter, false).contains(r#""products"."stock" > 0"#));
    }
}

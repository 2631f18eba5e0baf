//! Operator tasks behind `storefront-cli`: wiping orders and seeding a demo catalog.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        category,
        order::{self, OrderStatus},
        order_item, order_status_history, payment, product,
        user::{self, UserRole},
    },
    errors::ServiceError,
    services::accounts::AccountService,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetSummary {
    pub orders_deleted: u64,
    pub payments_deleted: u64,
    pub history_deleted: u64,
    pub units_restocked: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedSummary {
    pub users_created: Vec<String>,
    pub categories_created: Vec<String>,
    pub products_created: Vec<String>,
}

struct SeedProduct {
    name: &'static str,
    description: &'static str,
    price: Decimal,
    stock: i32,
    category: &'static str,
}

const SEED_CATEGORIES: &[(&str, &str)] = &[
    ("Smartphones", "Phones and smartphones"),
    ("Notebooks", "Notebooks and laptops"),
    ("TVs", "Televisions and smart TVs"),
    ("Audio", "Headphones, speakers and audio"),
    ("Accessories", "Assorted accessories"),
];

fn seed_products() -> Vec<SeedProduct> {
    vec![
        SeedProduct {
            name: "iPhone 15 Pro Max 256GB",
            description: "Apple iPhone 15 Pro Max, 256GB, A17 Pro chip",
            price: dec!(8999.00),
            stock: 15,
            category: "Smartphones",
        },
        SeedProduct {
            name: "Samsung Galaxy S24 Ultra",
            description: "Samsung Galaxy S24 Ultra 512GB, 6.8\" AMOLED, S Pen",
            price: dec!(7499.00),
            stock: 20,
            category: "Smartphones",
        },
        SeedProduct {
            name: "MacBook Pro M3 14\"",
            description: "MacBook Pro 14\" with M3, 16GB RAM, 512GB SSD",
            price: dec!(15999.00),
            stock: 8,
            category: "Notebooks",
        },
        SeedProduct {
            name: "Dell XPS 15",
            description: "Dell XPS 15 Intel i7, 32GB RAM, 1TB SSD, RTX 4050",
            price: dec!(12999.00),
            stock: 12,
            category: "Notebooks",
        },
        SeedProduct {
            name: "Samsung 65\" QLED Smart TV",
            description: "Samsung 65\" QLED 4K, HDR10+",
            price: dec!(4999.00),
            stock: 10,
            category: "TVs",
        },
        SeedProduct {
            name: "LG OLED 55\" C3",
            description: "LG OLED 55\" C3, 4K, 120Hz, HDMI 2.1",
            price: dec!(5999.00),
            stock: 7,
            category: "TVs",
        },
        SeedProduct {
            name: "AirPods Pro (2nd generation)",
            description: "Apple AirPods Pro with active noise cancellation",
            price: dec!(2199.00),
            stock: 30,
            category: "Audio",
        },
        SeedProduct {
            name: "Sony WH-1000XM5",
            description: "Sony WH-1000XM5 noise cancelling headphones",
            price: dec!(2499.00),
            stock: 25,
            category: "Audio",
        },
        SeedProduct {
            name: "JBL Flip 6",
            description: "JBL Flip 6 portable waterproof Bluetooth speaker",
            price: dec!(699.00),
            stock: 40,
            category: "Audio",
        },
        SeedProduct {
            name: "Apple Watch Series 9",
            description: "Apple Watch Series 9 GPS 45mm, aluminium case",
            price: dec!(4299.00),
            stock: 18,
            category: "Accessories",
        },
    ]
}

/// Deletes every order with its payments and history.
///
/// Stock still held by open orders goes back to the shelf; cancelled
/// orders already returned theirs and completed ones left the store.
#[instrument(skip(db))]
pub async fn reset_orders(db: &DatabaseConnection) -> Result<ResetSummary, ServiceError> {
    let txn = db.begin().await.map_err(|e| {
        error!(error = %e, "Failed to begin reset transaction");
        ServiceError::DatabaseError(e)
    })?;

    let open_orders: Vec<Uuid> = order::Entity::find()
        .filter(order::Column::Status.is_not_in([OrderStatus::Cancelled, OrderStatus::Completed]))
        .all(&txn)
        .await?
        .into_iter()
        .map(|o| o.id)
        .collect();

    let mut units_restocked = 0i64;
    if !open_orders.is_empty() {
        for item in order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(open_orders))
            .all(&txn)
            .await?
        {
            product::Entity::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).add(item.quantity),
                )
                .filter(product::Column::Id.eq(item.product_id))
                .exec(&txn)
                .await?;
            units_restocked += i64::from(item.quantity);
        }
    }

    let history_deleted = order_status_history::Entity::delete_many()
        .exec(&txn)
        .await?
        .rows_affected;
    let payments_deleted = payment::Entity::delete_many().exec(&txn).await?.rows_affected;
    order_item::Entity::delete_many().exec(&txn).await?;
    let orders_deleted = order::Entity::delete_many().exec(&txn).await?.rows_affected;

    txn.commit().await.map_err(|e| {
        error!(error = %e, "Failed to commit order reset");
        ServiceError::DatabaseError(e)
    })?;

    let summary = ResetSummary {
        orders_deleted,
        payments_deleted,
        history_deleted,
        units_restocked,
    };
    info!(?summary, "Orders reset");
    Ok(summary)
}

/// Idempotently loads demo users, categories and products.
#[instrument(skip(db))]
pub async fn seed(db: Arc<DatabaseConnection>) -> Result<SeedSummary, ServiceError> {
    let accounts = AccountService::new(db.clone());
    let conn = &*db;
    let mut summary = SeedSummary::default();

    for (username, email, password, role) in [
        ("admin", "admin@example.com", "admin123", UserRole::Admin),
        ("customer", "customer@example.com", "customer123", UserRole::Customer),
    ] {
        let exists = user::Entity::find()
            .filter(user::Column::Username.eq(username))
            .count(conn)
            .await?;
        if exists == 0 {
            accounts
                .create_user(username, email, password, role, None)
                .await?;
            summary.users_created.push(username.to_string());
        }
    }

    let now = Utc::now();
    for (name, description) in SEED_CATEGORIES {
        let exists = category::Entity::find()
            .filter(category::Column::Name.eq(*name))
            .count(conn)
            .await?;
        if exists == 0 {
            category::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name.to_string()),
                description: Set(Some(description.to_string())),
                created_at: Set(now),
            }
            .insert(conn)
            .await?;
            summary.categories_created.push(name.to_string());
        }
    }

    for seed in seed_products() {
        let exists = product::Entity::find()
            .filter(product::Column::Name.eq(seed.name))
            .count(conn)
            .await?;
        if exists > 0 {
            continue;
        }
        let category_id = category::Entity::find()
            .filter(category::Column::Name.eq(seed.category))
            .one(conn)
            .await?
            .map(|c| c.id);

        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(seed.name.to_string()),
            description: Set(seed.description.to_string()),
            price: Set(seed.price),
            stock: Set(seed.stock),
            category_id: Set(category_id),
            image: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await?;
        summary.products_created.push(seed.name.to_string());
    }

    info!(
        users = summary.users_created.len(),
        categories = summary.categories_created.len(),
        products = summary.products_created.len(),
        "Seed data loaded"
    );
    Ok(summary)
}

// Order lifecycle
pub mod expiry;
pub mod order_status;
pub mod orders;
pub mod pickup;

// Checkout side
pub mod coupons;
pub mod payments;

// Catalog and accounts
pub mod accounts;
pub mod catalog;

// Operator tooling shared by the CLI
pub mod maintenance;

use crate::config::AppConfig;
use rust_decimal::Decimal;

/// Store-wide knobs the services read from configuration.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub reservation_window: chrono::Duration,
    pub pickup_code_length: usize,
    pub max_installments: i32,
    pub currency_symbol: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            reservation_window: chrono::Duration::minutes(10),
            pickup_code_length: 6,
            max_installments: 12,
            currency_symbol: "R$".to_string(),
        }
    }
}

impl From<&AppConfig> for StoreSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            reservation_window: cfg.reservation_window(),
            pickup_code_length: cfg.pickup_code_length,
            max_installments: cfg.max_installments,
            currency_symbol: cfg.currency_symbol.clone(),
        }
    }
}

/// Normalizes a money amount to exactly two decimal places.
///
/// SQLite hands decimals back through `f64`, so values read from the
/// database can carry a different scale than the ones written.
pub fn money(value: Decimal) -> Decimal {
    let mut value = value.round_dp(2);
    value.rescale(2);
    value
}

/// Formats an amount with the store currency symbol, e.g. `R$ 49.90`.
pub fn format_money(symbol: &str, value: Decimal) -> String {
    format!("{} {}", symbol, money(value))
}

/// Clamps page and limit query values into a usable window.
pub fn page_window(page: Option<u64>, limit: Option<u64>, default: u64, max: u64) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(default).clamp(1, max.max(1));
    (page, limit)
}

pub fn total_pages(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        0
    } else {
        total.div_ceil(limit)
    }
}

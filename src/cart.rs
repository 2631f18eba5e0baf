//! Client-side shopping cart. Never persisted; it only shapes the checkout request.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::order::PaymentMethod;
use crate::services::catalog::ProductResponse;
use crate::services::orders::{CreateOrderRequest, OrderItemRequest};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub image: Option<String>,
    /// Stock seen when the product was added; caps the quantity.
    pub stock: i32,
    pub quantity: i32,
}

impl CartItem {
    pub fn from_product(product: &ProductResponse, quantity: i32) -> Self {
        Self {
            product_id: product.id,
            name: product.name.clone(),
            price: product.price,
            image: product.image.clone(),
            stock: product.stock,
            quantity,
        }
    }

    pub fn subtotal(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Adds a line, merging with an existing line for the same product.
    pub fn add(&mut self, item: CartItem) {
        if item.quantity <= 0 || item.stock <= 0 {
            return;
        }
        match self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            Some(existing) => {
                existing.stock = item.stock;
                existing.quantity = (existing.quantity + item.quantity).min(item.stock);
            }
            None => {
                let quantity = item.quantity.min(item.stock);
                self.items.push(CartItem { quantity, ..item });
            }
        }
    }

    /// Zero or less removes the line.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: i32) {
        if quantity <= 0 {
            self.remove(product_id);
            return;
        }
        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product_id) {
            item.quantity = quantity.min(item.stock);
        }
    }

    pub fn remove(&mut self, product_id: Uuid) {
        self.items.retain(|i| i.product_id != product_id);
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(CartItem::subtotal).sum()
    }

    /// Number of units across all lines.
    pub fn item_count(&self) -> i32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Installments collapse to one for anything but credit card.
    pub fn into_checkout_request(
        self,
        payment_method: PaymentMethod,
        installments: i32,
        coupon_code: Option<String>,
    ) -> CreateOrderRequest {
        let installments = if payment_method.allows_installments() {
            installments.max(1)
        } else {
            1
        };
        CreateOrderRequest {
            items: self
                .items
                .into_iter()
                .map(|i| OrderItemRequest {
                    product_id: i.product_id,
                    quantity: i.quantity,
                })
                .collect(),
            payment_method,
            installments,
            coupon_code,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(id: Uuid, price: Decimal, stock: i32, quantity: i32) -> CartItem {
        CartItem {
            product_id: id,
            name: "Speaker".into(),
            price,
            image: None,
            stock,
            quantity,
        }
    }

    #[test]
    fn adding_same_product_merges_and_caps_at_stock() {
        let id = Uuid::new_v4();
        let mut cart = Cart::new();
        cart.add(item(id, dec!(10.00), 3, 2));
        cart.add(item(id, dec!(10.00), 3, 2));
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), dec!(30.00));
    }

    #[test]
    fn sold_out_products_are_not_added() {
        let mut cart = Cart::new();
        cart.add(item(Uuid::new_v4(), dec!(5), 0, 1));
        assert!(cart.is_empty());
    }

    #[test]
    fn zero_quantity_removes_line() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut cart = Cart::new();
        cart.add(item(a, dec!(1.50), 10, 1));
        cart.add(item(b, dec!(2.00), 10, 4));
        cart.set_quantity(a, 0);
        assert_eq!(cart.items().len(), 1);
        cart.set_quantity(b, 2);
        assert_eq!(cart.total(), dec!(4.00));
    }

    #[test]
    fn checkout_request_drops_installments_for_pix() {
        let mut cart = Cart::new();
        cart.add(item(Uuid::new_v4(), dec!(100), 5, 2));
        let request = cart
            .clone()
            .into_checkout_request(PaymentMethod::Pix, 6, None);
        assert_eq!(request.installments, 1);
        assert_eq!(request.items[0].quantity, 2);

        let request = cart.into_checkout_request(PaymentMethod::CreditCard, 6, Some("WELCOME".into()));
        assert_eq!(request.installments, 6);
        assert_eq!(request.coupon_code.as_deref(), Some("WELCOME"));
    }
}
